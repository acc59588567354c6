//! Shared utilities: monotonic clocks, content hashing, and lock helpers.

pub mod clock;
pub mod hash;
pub(crate) mod sync;
