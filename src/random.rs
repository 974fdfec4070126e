//! Named, independently seeded random number generators stored on the `Context`.
//!
//! Each stochastic part of the simulation draws from its own generator, declared with
//! `define_rng!`. All generators derive from one base seed set with
//! `ContextRandomExt::init_random`, so a run is reproducible while adding draws to one
//! module never shifts the stream another module sees.
//!
//! The algorithms themselves (`movement::move_one_step`, `duel::resolve_duels`, ...) take
//! any `&mut impl Rng`; `ContextRandomExt::sample` lends them the right generator.
use std::any::{Any, TypeId};
use std::cell::{RefCell, RefMut};

use log::trace;
use rand::distr::uniform::{SampleRange, SampleUniform};
use rand::{Rng, SeedableRng};

use crate::context::Context;
use crate::define_data_plugin;
use crate::hashing::{hash_str, HashMap};

pub trait RngId: Copy + Clone {
    type RngType: SeedableRng + 'static;
    fn get_name() -> &'static str;
}

/// Use this to define a unique type which will be used as a key to retrieve
/// an independent rng instance when calling `Context::sample`.
#[macro_export]
macro_rules! define_rng {
    ($random_id:ident) => {
        #[derive(Copy, Clone)]
        pub struct $random_id;

        impl $crate::random::RngId for $random_id {
            type RngType = $crate::rand::rngs::SmallRng;

            fn get_name() -> &'static str {
                stringify!($random_id)
            }
        }

        // Two generators with the same name would share a seed.
        $crate::paste::paste! {
            #[doc(hidden)]
            #[no_mangle]
            #[allow(non_upper_case_globals)]
            pub static [<rng_name_duplication_guard_ $random_id>]: () = ();
        }
    };
}
pub use define_rng;

struct RngData {
    base_seed: u64,
    rng_holders: RefCell<HashMap<TypeId, Box<dyn Any>>>,
}

define_data_plugin!(
    RngPlugin,
    Option<RngData>,
    None
);

fn get_rng<R: RngId + 'static>(context: &Context) -> RefMut<'_, R::RngType> {
    let data = context
        .get_data::<RngPlugin>()
        .and_then(Option::as_ref)
        .expect("random numbers were requested before init_random was called");

    let rng_holders = data
        .rng_holders
        .try_borrow_mut()
        .expect("a generator is already borrowed; nested sample calls are not supported");
    RefMut::map(rng_holders, |holders| {
        holders
            .entry(TypeId::of::<R>())
            .or_insert_with(|| {
                let seed = data.base_seed.wrapping_add(hash_str(R::get_name()));
                trace!("creating rng {} (seed={seed})", R::get_name());
                Box::new(R::RngType::seed_from_u64(seed)) as Box<dyn Any>
            })
            .downcast_mut::<R::RngType>()
            // Keyed by `TypeId::of::<R>()`, which fixes the stored type.
            .unwrap()
    })
}

pub trait ContextRandomExt {
    /// Sets the base seed for all generators. Generators are created lazily, so any
    /// generator used before this call is discarded and re-seeded.
    fn init_random(&mut self, base_seed: u64);

    /// Runs `sampler` with the generator associated with `R`.
    ///
    /// # Panics
    ///
    /// Panics if `init_random` was not called, or if called from inside another `sample`.
    fn sample<R: RngId + 'static, T>(
        &self,
        rng_id: R,
        sampler: impl FnOnce(&mut R::RngType) -> T,
    ) -> T;

    /// Gets a random sample within `range` using the generator associated with `R`.
    fn sample_range<R: RngId + 'static, S, T>(&self, rng_id: R, range: S) -> T
    where
        R::RngType: Rng,
        S: SampleRange<T>,
        T: SampleUniform,
    {
        self.sample(rng_id, |rng| rng.random_range(range))
    }

    /// Gets a random boolean which is true with probability `p`.
    fn sample_bool<R: RngId + 'static>(&self, rng_id: R, p: f64) -> bool
    where
        R::RngType: Rng,
    {
        self.sample(rng_id, |rng| rng.random_bool(p))
    }
}

impl ContextRandomExt for Context {
    fn init_random(&mut self, base_seed: u64) {
        trace!("initializing random module (base_seed={base_seed})");
        *self.get_data_mut::<RngPlugin>() = Some(RngData {
            base_seed,
            rng_holders: RefCell::new(HashMap::default()),
        });
    }

    fn sample<R: RngId + 'static, T>(
        &self,
        _rng_id: R,
        sampler: impl FnOnce(&mut R::RngType) -> T,
    ) -> T {
        let mut rng = get_rng::<R>(self);
        sampler(&mut rng)
    }
}
