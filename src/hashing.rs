//! Deterministic hashing. The hashing data structures in the standard library use a randomly
//! seeded hasher, so iteration order differs from run to run. A simulation seeded with the same
//! base seed must replay exactly, so every map and set in this crate uses the `rustc-hash`
//! variants re-exported here.
//!
//! The `hash_str` free function is used to derive per-generator seeds in `crate::random`.

use xxhash_rust::xxh3::xxh3_64;

pub use rustc_hash::{FxHashMap as HashMap, FxHashSet as HashSet};

/// A convenience method to compute a stable hash of a `&str`.
pub fn hash_str(data: &str) -> u64 {
    xxh3_64(data.as_bytes())
}
