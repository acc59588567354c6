//! Context sharing, texture memory budgeting, and format helpers.

/// Growable pool of share-group contexts.
pub mod context_pool;
/// Pixel-format sizing and naming.
pub mod format;
/// Texture memory budget policy and the VRAM counter.
pub mod vram;
