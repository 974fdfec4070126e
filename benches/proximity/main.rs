use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use geospread::proximity::find_proximity_events;
use geospread::rand::rngs::SmallRng;
use geospread::rand::{Rng, SeedableRng};
use geospread::{AgentSeed, Population, Position, Role, Sex};

static SEED: u64 = 123;
static INFECTIOUS_SHARE: f64 = 0.05;
static THRESHOLD: f64 = 0.0005;

/// Agents spread uniformly over a 0.2 x 0.2 degree area.
fn synthetic_population(size: usize) -> Population {
    let mut rng = SmallRng::seed_from_u64(SEED);
    let mut population = Population::new();
    for _ in 0..size {
        let role = if rng.random_bool(INFECTIOUS_SHARE) {
            Role::Infectious
        } else {
            Role::Susceptible
        };
        let seed = AgentSeed {
            role,
            position: Position::new(
                51.4 + rng.random_range(0.0..0.2),
                -0.2 + rng.random_range(0.0..0.2),
            ),
            age: 40,
            sex: Sex::Female,
            speed: 1.0,
        };
        population
            .add(seed.into())
            .expect("synthetic positions are valid");
    }
    population
}

pub fn criterion_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("find_proximity_events");
    for size in [1_000, 10_000] {
        let population = synthetic_population(size);
        for level in [10, 14, 18] {
            group.bench_with_input(
                BenchmarkId::new(format!("level {level}"), size),
                &population,
                |bencher, population| {
                    bencher.iter(|| {
                        find_proximity_events(black_box(population), level, THRESHOLD)
                            .expect("valid configuration")
                    });
                },
            );
        }
    }
    group.finish();
}

criterion_group!(proximity_benches, criterion_benchmark);
criterion_main!(proximity_benches);
