//! Reference-counted pools of GPU objects.
//!
//! - [`buffer::BufferPool`]: buffers keyed by `(kind, byte_size)`.
//! - [`texture::TexturePool`]: textures keyed by `(target, format, size)`,
//!   with a VRAM guard and per-bucket idle eviction.
//! - [`surface::SurfacePool`]: cross-process shared surfaces with the
//!   quarantine handshake.
//! - [`sweeper::Sweeper`]: the background thread driving eviction.
//!
//! Every pool hands out plain GL names; 0 means "no object" and is
//! accepted (as a no-op) everywhere a name is taken back.

pub mod buffer;
pub mod descriptor;
pub mod handle_table;
pub mod surface;
pub mod sweeper;
pub mod texture;

pub use buffer::BufferPool;
pub use descriptor::{BufferDescriptor, BufferKind, TextureDescriptor};
pub use handle_table::{FreeCallback, HandleTable, Ownership, Released};
pub use surface::{SharedSurface, SurfacePool, SurfaceSweep, SURFACE_DONE_KEY};
pub use sweeper::Sweeper;
pub use texture::{TextureAllocation, TexturePool};
