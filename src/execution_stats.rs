// Loss of precision is allowable in this module's use cases.
#![allow(clippy::cast_precision_loss)]

use std::time::{Duration, Instant};

use humantime::format_duration;
use log::info;
use serde::Serialize;

/// Final statistics of a run. Per-step and per-agent values are zero when there were
/// no steps or no agents.
#[derive(Clone, Debug, Serialize)]
pub struct ExecutionStatistics {
    pub wall_time: Duration,
    pub steps: usize,
    pub population: usize,
    pub wall_time_per_step: Duration,
    pub wall_time_per_agent_step: Duration,
}

pub(crate) struct ExecutionProfilingCollector {
    /// Simulation start time, used to compute elapsed wall time for the simulation execution
    start_time: Instant,
}

impl ExecutionProfilingCollector {
    pub fn new() -> ExecutionProfilingCollector {
        ExecutionProfilingCollector {
            start_time: Instant::now(),
        }
    }

    /// Computes the final summary statistics
    pub fn compute_final_statistics(&self, steps: usize, population: usize) -> ExecutionStatistics {
        let wall_time = self.start_time.elapsed();
        let per = |count: usize| {
            if count > 0 {
                Duration::from_secs_f64(wall_time.as_secs_f64() / count as f64)
            } else {
                Duration::ZERO
            }
        };
        ExecutionStatistics {
            wall_time,
            steps,
            population,
            wall_time_per_step: per(steps),
            wall_time_per_agent_step: per(steps.saturating_mul(population)),
        }
    }
}

/// Prints execution statistics to the console.
pub fn print_execution_statistics(summary: &ExecutionStatistics) {
    println!("━━━━ Execution Summary ━━━━");
    println!("{:<25}{}", "Wall time:", format_duration(summary.wall_time));
    println!("{:<25}{}", "Steps:", summary.steps);
    println!("{:<25}{}", "Population:", summary.population);
    if summary.steps > 0 {
        println!(
            "{:<25}{}",
            "Wall time per step:",
            format_duration(summary.wall_time_per_step)
        );
    }
}

/// Logs execution statistics with the logging system.
pub fn log_execution_statistics(stats: &ExecutionStatistics) {
    info!("Execution complete.");
    info!("Wall time: {}", format_duration(stats.wall_time));
    info!("Steps: {}, population: {}", stats.steps, stats.population);
    if stats.steps > 0 {
        info!(
            "Wall time per step: {}",
            format_duration(stats.wall_time_per_step)
        );
        info!(
            "Wall time per agent step: {}",
            format_duration(stats.wall_time_per_agent_step)
        );
    }
}
