//! Pool of GL buffer objects keyed by `(kind, byte_size)`.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};

use super::descriptor::{BufferDescriptor, BufferKind};
use super::handle_table::{FreeCallback, HandleTable, Ownership, Released};
use crate::driver::{ContextId, Driver, GlEnum, GlName};
use crate::gpu::format;
use crate::gpu::vram::VramStats;
use crate::util::sync::lock;

/// Exact-size buffer reuse with shared-ownership reference counts.
///
/// Idle buffers are reused oldest-first. Contents are never cleared:
/// a caller that acquires a recycled buffer must overwrite it fully.
pub struct BufferPool {
    driver: Arc<dyn Driver>,
    stats: Arc<VramStats>,
    idle: Mutex<BTreeMap<BufferDescriptor, VecDeque<GlName>>>,
    refs: HandleTable<BufferDescriptor>,
    verbose: bool,
}

impl BufferPool {
    /// Create an empty pool that reports allocations to `stats`.
    #[must_use]
    pub fn new(driver: Arc<dyn Driver>, stats: Arc<VramStats>, verbose: bool) -> Self {
        Self {
            driver,
            stats,
            idle: Mutex::new(BTreeMap::new()),
            refs: HandleTable::new("buffer"),
            verbose,
        }
    }

    /// Get a buffer of exactly `byte_size` bytes on `target`.
    ///
    /// Reuses an idle buffer with the same descriptor if one exists,
    /// otherwise allocates uninitialized stream-draw storage. Returns 0 for
    /// an unsupported target (no GPU call is made) or a failed allocation.
    pub fn acquire(&self, ctx: ContextId, target: GlEnum, byte_size: usize) -> GlName {
        let Some(kind) = BufferKind::from_target(target) else {
            log::error!("Unknown buffer type {}", format::name(target));
            return 0;
        };
        let descriptor = BufferDescriptor { kind, byte_size };

        let reused = lock(&self.idle)
            .get_mut(&descriptor)
            .and_then(VecDeque::pop_front);
        if let Some(name) = reused {
            log::trace!("Reusing buffer {name} ({descriptor})");
            return name;
        }

        let name = self.driver.create_buffer(ctx, target, byte_size);
        if name == 0 {
            log::error!("Couldn't allocate buffer ({descriptor})");
            return 0;
        }
        self.stats.add(byte_size as u64);
        if self.verbose {
            log::debug!(
                "Allocated buffer {name} ({descriptor}); pooled VRAM now {} bytes",
                self.stats.allocated()
            );
        }
        name
    }

    /// Return a buffer to the idle queue for `(target, byte_size)`.
    pub fn release(&self, target: GlEnum, byte_size: usize, name: GlName) {
        if name == 0 {
            return;
        }
        let Some(kind) = BufferKind::from_target(target) else {
            log::error!("Unknown buffer type {}", format::name(target));
            return;
        };
        let descriptor = BufferDescriptor { kind, byte_size };
        let mut idle = lock(&self.idle);
        let queue = idle.entry(descriptor).or_default();
        if queue.contains(&name) {
            drop(idle);
            log::error!("Buffer {name} ({descriptor}) released twice");
            return;
        }
        queue.push_back(name);
    }

    /// Add an owner to a pool-owned buffer.
    pub fn retain(&self, name: GlName, descriptor: BufferDescriptor) -> u32 {
        self.refs.retain(name, Ownership::PoolOwned(descriptor))
    }

    /// Add an owner to a buffer the client frees itself.
    pub fn retain_client_owned(&self, name: GlName, free: FreeCallback) -> u32 {
        self.refs.retain(name, Ownership::ClientOwned(free))
    }

    /// Drop an owner; the last one returns the buffer to the pool (or
    /// calls the client's free callback).
    pub fn release_retained(&self, name: GlName) {
        match self.refs.release(name) {
            Released::Dispose(Ownership::PoolOwned(descriptor)) => {
                self.release(descriptor.kind.target(), descriptor.byte_size, name);
            }
            Released::Dispose(Ownership::ClientOwned(free)) => free(name),
            Released::Retained(_) | Released::Untracked => {}
        }
    }

    /// Owners currently holding `name`.
    #[must_use]
    pub fn retain_count(&self, name: GlName) -> u32 {
        self.refs.count(name)
    }

    /// Idle buffers across all descriptors.
    #[must_use]
    pub fn idle_count(&self) -> usize {
        lock(&self.idle).values().map(VecDeque::len).sum()
    }

    /// Delete every idle buffer.
    pub fn drain(&self, ctx: ContextId) {
        let drained = std::mem::take(&mut *lock(&self.idle));
        for (descriptor, queue) in drained {
            for name in queue {
                self.driver.delete_buffer(ctx, name);
                self.stats.sub(descriptor.byte_size as u64);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::gl;
    use crate::driver::headless::HeadlessDriver;

    fn pool() -> (Arc<HeadlessDriver>, ContextId, BufferPool) {
        let driver = Arc::new(HeadlessDriver::default());
        let ctx = driver.create_context(None).unwrap();
        let pool = BufferPool::new(driver.clone(), Arc::new(VramStats::default()), true);
        (driver, ctx, pool)
    }

    #[test]
    fn release_then_acquire_returns_same_buffer() {
        let (driver, ctx, pool) = pool();
        let x = pool.acquire(ctx, gl::ARRAY_BUFFER, 1024);
        assert_ne!(x, 0);
        pool.release(gl::ARRAY_BUFFER, 1024, x);
        assert_eq!(pool.acquire(ctx, gl::ARRAY_BUFFER, 1024), x);
        assert_eq!(driver.stats().buffers_created, 1);
    }

    #[test]
    fn different_descriptor_never_reuses() {
        let (driver, ctx, pool) = pool();
        let x = pool.acquire(ctx, gl::ARRAY_BUFFER, 1024);
        pool.release(gl::ARRAY_BUFFER, 1024, x);
        let y = pool.acquire(ctx, gl::ARRAY_BUFFER, 2048);
        let z = pool.acquire(ctx, gl::ELEMENT_ARRAY_BUFFER, 1024);
        assert_ne!(y, x);
        assert_ne!(z, x);
        assert_eq!(driver.stats().buffers_created, 3);
    }

    #[test]
    fn unknown_kind_makes_no_gpu_call() {
        let (driver, ctx, pool) = pool();
        assert_eq!(pool.acquire(ctx, 0x1234, 16), 0);
        assert_eq!(driver.stats().buffers_created, 0);
    }

    #[test]
    fn idle_reuse_is_fifo() {
        let (_driver, ctx, pool) = pool();
        let a = pool.acquire(ctx, gl::ARRAY_BUFFER, 64);
        let b = pool.acquire(ctx, gl::ARRAY_BUFFER, 64);
        pool.release(gl::ARRAY_BUFFER, 64, a);
        pool.release(gl::ARRAY_BUFFER, 64, b);
        assert_eq!(pool.acquire(ctx, gl::ARRAY_BUFFER, 64), a);
        assert_eq!(pool.acquire(ctx, gl::ARRAY_BUFFER, 64), b);
    }

    #[test]
    fn shared_ownership_returns_on_last_release() {
        let (_driver, ctx, pool) = pool();
        let descriptor = BufferDescriptor {
            kind: BufferKind::Array,
            byte_size: 256,
        };
        let x = pool.acquire(ctx, gl::ARRAY_BUFFER, 256);
        assert_eq!(pool.retain(x, descriptor), 1);
        assert_eq!(pool.retain(x, descriptor), 2);
        pool.release_retained(x);
        assert_eq!(pool.idle_count(), 0);
        pool.release_retained(x);
        assert_eq!(pool.idle_count(), 1);
        // A third release is a reported no-op.
        pool.release_retained(x);
        assert_eq!(pool.idle_count(), 1);
    }

    #[test]
    fn drain_deletes_idle_buffers() {
        let (driver, ctx, pool) = pool();
        let x = pool.acquire(ctx, gl::ARRAY_BUFFER, 32);
        pool.release(gl::ARRAY_BUFFER, 32, x);
        pool.drain(ctx);
        assert_eq!(driver.live_buffers(), 0);
        assert_eq!(pool.idle_count(), 0);
    }
}
