//! Content hashing helpers for shader sources and cache keys.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Content hash of a shader source text.
///
/// Used as the stage-cache key together with the stage kind, so two
/// identical source strings always map to the same compiled stage.
#[must_use]
pub fn hash_source(source: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    source.hash(&mut hasher);
    hasher.finish()
}

/// Hash of a uniform name, as stored in a linked program's location map.
#[must_use]
pub fn hash_uniform_name(name: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    // Domain-separate from source hashes.
    0xA5_u8.hash(&mut hasher);
    name.hash(&mut hasher);
    hasher.finish()
}
