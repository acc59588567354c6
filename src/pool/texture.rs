//! Pool of GL textures keyed by `(target, internal_format, width, height)`.
//!
//! Each descriptor owns one bucket: a FIFO of idle texture names plus a
//! single last-used timestamp. Eviction works per bucket, so a sweep is
//! one timestamp comparison per descriptor regardless of how many
//! textures sit idle in it.
//!
//! Owners that have no context at hand (an image handle being dropped, a
//! client free callback) queue deletions with
//! [`delete_later`](TexturePool::delete_later); the queue is flushed by
//! the next [`sweep`](TexturePool::sweep) or [`drain`](TexturePool::drain).

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::descriptor::TextureDescriptor;
use super::handle_table::{FreeCallback, HandleTable, Ownership, Released};
use crate::driver::{gl, ContextId, Driver, GlEnum, GlName, SurfaceId, TextureStorage};
use crate::gpu::format;
use crate::gpu::vram::{VramGuard, VramStats};
use crate::util::clock::{Clock, Timestamp};
use crate::util::sync::lock;

/// How [`TexturePool::acquire`] may satisfy a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureAllocation {
    /// Only return an idle pooled texture; never allocate.
    LookupOnly,
    /// Reuse an idle texture or allocate empty storage.
    Allocate,
    /// Create a rectangle texture backed by a shared surface. Never
    /// pooled: released surface-backed textures are deleted.
    SurfaceBacked(SurfaceId),
}

struct Bucket {
    idle: VecDeque<GlName>,
    last_used: Timestamp,
}

/// Texture pool with a VRAM guard and periodic per-bucket eviction.
pub struct TexturePool {
    driver: Arc<dyn Driver>,
    clock: Arc<dyn Clock>,
    guard: VramGuard,
    stats: Arc<VramStats>,
    buckets: Mutex<BTreeMap<TextureDescriptor, Bucket>>,
    pending: Mutex<Vec<(TextureDescriptor, GlName)>>,
    refs: HandleTable<TextureDescriptor>,
    sweep_interval: Duration,
    verbose: bool,
}

impl TexturePool {
    /// Create an empty pool.
    #[must_use]
    pub fn new(
        driver: Arc<dyn Driver>,
        clock: Arc<dyn Clock>,
        guard: VramGuard,
        stats: Arc<VramStats>,
        sweep_interval: Duration,
        verbose: bool,
    ) -> Self {
        Self {
            driver,
            clock,
            guard,
            stats,
            buckets: Mutex::new(BTreeMap::new()),
            pending: Mutex::new(Vec::new()),
            refs: HandleTable::new("texture"),
            sweep_interval,
            verbose,
        }
    }

    /// The driver textures are created through.
    #[must_use]
    pub fn driver(&self) -> &Arc<dyn Driver> {
        &self.driver
    }

    /// The guard deciding whether new storage fits.
    #[must_use]
    pub fn guard(&self) -> &VramGuard {
        &self.guard
    }

    /// Get a texture matching `descriptor`.
    ///
    /// `format` is the client pixel format used when allocating storage
    /// (0 picks one from the internal format). Returns 0 when nothing
    /// matches in [`TextureAllocation::LookupOnly`] mode, when the request
    /// is over the VRAM budget or the maximum dimension, or when the
    /// driver fails; callers should skip the work rather than fail.
    pub fn acquire(
        &self,
        ctx: ContextId,
        allocation: TextureAllocation,
        descriptor: TextureDescriptor,
        format: GlEnum,
    ) -> GlName {
        if let TextureAllocation::SurfaceBacked(surface) = allocation {
            return self.allocate_surface_backed(ctx, descriptor, surface);
        }

        let reused = lock(&self.buckets)
            .get_mut(&descriptor)
            .and_then(|bucket| bucket.idle.pop_front());
        if let Some(name) = reused {
            self.driver.bind_texture(ctx, descriptor.target, name);
            self.apply_sampling(ctx, descriptor.target);
            self.driver.bind_texture(ctx, descriptor.target, 0);
            log::trace!("Reusing texture {name} ({descriptor})");
            return name;
        }

        if allocation == TextureAllocation::LookupOnly {
            return 0;
        }
        if !self.guard.admit(
            self.driver.as_ref(),
            ctx,
            descriptor.internal_format,
            descriptor.width,
            descriptor.height,
        ) {
            return 0;
        }

        let name = self.driver.create_texture(ctx);
        if name == 0 {
            log::error!("Couldn't create texture ({descriptor})");
            return 0;
        }
        let (default_format, component_type) =
            format::upload_layout(descriptor.internal_format);
        self.driver.bind_texture(ctx, descriptor.target, name);
        self.driver.texture_image(
            ctx,
            &TextureStorage {
                target: descriptor.target,
                internal_format: descriptor.internal_format,
                width: descriptor.width,
                height: descriptor.height,
                format: if format == 0 { default_format } else { format },
                component_type,
                pixels: None,
            },
        );
        self.apply_sampling(ctx, descriptor.target);
        self.driver.bind_texture(ctx, descriptor.target, 0);
        self.note_allocation(name, descriptor);
        name
    }

    /// Upload `pixels` into texture `name`, replacing its storage.
    ///
    /// Returns `false` (and uploads nothing) when `pixels` is shorter than
    /// the descriptor's size in the given client layout.
    pub fn fill(
        &self,
        ctx: ContextId,
        name: GlName,
        descriptor: TextureDescriptor,
        format: GlEnum,
        component_type: GlEnum,
        pixels: &[u8],
    ) -> bool {
        let per_channel: u64 = match component_type {
            gl::FLOAT => 4,
            gl::HALF_FLOAT | gl::UNSIGNED_SHORT => 2,
            _ => 1,
        };
        let needed = u64::from(format::channels(format))
            * per_channel
            * u64::from(descriptor.width)
            * u64::from(descriptor.height);
        if name == 0 || (pixels.len() as u64) < needed {
            log::error!(
                "Can't upload {} bytes of {} into texture {name} ({descriptor}); {needed} needed",
                pixels.len(),
                format::name(format)
            );
            return false;
        }
        self.driver.bind_texture(ctx, descriptor.target, name);
        self.driver.texture_image(
            ctx,
            &TextureStorage {
                target: descriptor.target,
                internal_format: descriptor.internal_format,
                width: descriptor.width,
                height: descriptor.height,
                format,
                component_type,
                pixels: Some(pixels),
            },
        );
        self.driver.bind_texture(ctx, descriptor.target, 0);
        true
    }

    fn allocate_surface_backed(
        &self,
        ctx: ContextId,
        descriptor: TextureDescriptor,
        surface: SurfaceId,
    ) -> GlName {
        if descriptor.target != gl::TEXTURE_RECTANGLE {
            log::error!(
                "Surface-backed textures must use GL_TEXTURE_RECTANGLE, not {}",
                format::name(descriptor.target)
            );
            return 0;
        }
        if !self.guard.admit(
            self.driver.as_ref(),
            ctx,
            descriptor.internal_format,
            descriptor.width,
            descriptor.height,
        ) {
            return 0;
        }
        let name = self.driver.create_texture(ctx);
        if name == 0 {
            log::error!("Couldn't create texture for {surface}");
            return 0;
        }
        self.driver.bind_texture(ctx, descriptor.target, name);
        let bound = self.driver.texture_from_surface(
            ctx,
            descriptor.target,
            descriptor.internal_format,
            descriptor.width,
            descriptor.height,
            surface,
        );
        if bound {
            self.apply_sampling(ctx, descriptor.target);
        }
        self.driver.bind_texture(ctx, descriptor.target, 0);
        if !bound {
            log::error!("Couldn't bind {surface} to texture {name} ({descriptor})");
            self.driver.delete_textures(ctx, &[name]);
            return 0;
        }
        self.note_allocation(name, descriptor);
        name
    }

    fn apply_sampling(&self, ctx: ContextId, target: GlEnum) {
        let clamp = gl::CLAMP_TO_EDGE as i32;
        let linear = gl::LINEAR as i32;
        self.driver.texture_parameter(ctx, target, gl::TEXTURE_WRAP_S, clamp);
        self.driver.texture_parameter(ctx, target, gl::TEXTURE_WRAP_T, clamp);
        self.driver.texture_parameter(ctx, target, gl::TEXTURE_MIN_FILTER, linear);
        self.driver.texture_parameter(ctx, target, gl::TEXTURE_MAG_FILTER, linear);
    }

    fn note_allocation(&self, name: GlName, descriptor: TextureDescriptor) {
        self.stats.add(descriptor.bytes());
        if self.verbose {
            log::debug!(
                "Allocated texture {name} ({descriptor}); pooled VRAM now {} bytes (peak {})",
                self.stats.allocated(),
                self.stats.peak()
            );
        }
    }

    /// Give a texture back.
    ///
    /// Surface-backed textures and textures with an unknown (0) internal
    /// format are deleted immediately; everything else goes to its
    /// bucket's idle queue.
    pub fn release(
        &self,
        ctx: ContextId,
        allocation: TextureAllocation,
        descriptor: TextureDescriptor,
        name: GlName,
    ) {
        if name == 0 {
            return;
        }
        if let TextureAllocation::SurfaceBacked(_) = allocation {
            self.delete_batch(ctx, &[(descriptor, name)]);
            return;
        }
        if descriptor.internal_format == 0 {
            log::error!(
                "Texture {name} has an unknown internal format; deleting instead of pooling"
            );
            self.delete_batch(ctx, &[(descriptor, name)]);
            return;
        }
        self.recycle(descriptor, name);
    }

    fn recycle(&self, descriptor: TextureDescriptor, name: GlName) {
        let now = self.clock.now();
        let mut buckets = lock(&self.buckets);
        let bucket = buckets.entry(descriptor).or_insert_with(|| Bucket {
            idle: VecDeque::new(),
            last_used: now,
        });
        if bucket.idle.contains(&name) {
            drop(buckets);
            log::error!("Texture {name} ({descriptor}) released twice");
            return;
        }
        bucket.idle.push_back(name);
        bucket.last_used = now;
    }

    /// Queue a texture for deletion on the next sweep or drain.
    pub fn delete_later(&self, descriptor: TextureDescriptor, name: GlName) {
        if name != 0 {
            lock(&self.pending).push((descriptor, name));
        }
    }

    /// Textures queued by [`delete_later`](Self::delete_later).
    #[must_use]
    pub fn pending_deletions(&self) -> usize {
        lock(&self.pending).len()
    }

    /// Delete textures in one driver call and update the VRAM counter.
    pub(crate) fn delete_batch(&self, ctx: ContextId, textures: &[(TextureDescriptor, GlName)]) {
        if textures.is_empty() {
            return;
        }
        let names: Vec<GlName> = textures.iter().map(|(_, name)| *name).collect();
        self.driver.delete_textures(ctx, &names);
        for (descriptor, _) in textures {
            self.stats.sub(descriptor.bytes());
        }
        if self.verbose {
            log::debug!(
                "Deleted {} texture(s); pooled VRAM now {} bytes",
                names.len(),
                self.stats.allocated()
            );
        }
    }

    /// Evict every bucket idle for longer than the sweep interval, and
    /// delete anything queued with [`delete_later`](Self::delete_later).
    ///
    /// Expired buckets are detached under the lock; their textures are
    /// deleted after it is released. Returns the number deleted.
    pub fn sweep(&self, ctx: ContextId) -> usize {
        let now = self.clock.now();
        let mut expired = std::mem::take(&mut *lock(&self.pending));
        {
            let mut buckets = lock(&self.buckets);
            buckets.retain(|descriptor, bucket| {
                if now.saturating_sub(bucket.last_used) <= self.sweep_interval {
                    return true;
                }
                expired.extend(bucket.idle.drain(..).map(|name| (*descriptor, name)));
                false
            });
        }
        self.delete_batch(ctx, &expired);
        expired.len()
    }

    /// Delete every idle and queued texture regardless of age.
    pub fn drain(&self, ctx: ContextId) {
        let drained = std::mem::take(&mut *lock(&self.buckets));
        let mut textures = std::mem::take(&mut *lock(&self.pending));
        textures.extend(drained.into_iter().flat_map(|(descriptor, bucket)| {
            bucket.idle.into_iter().map(move |name| (descriptor, name))
        }));
        self.delete_batch(ctx, &textures);
    }

    /// Add an owner to a pool-owned texture.
    pub fn retain(&self, name: GlName, descriptor: TextureDescriptor) -> u32 {
        self.refs.retain(name, Ownership::PoolOwned(descriptor))
    }

    /// Add an owner to a texture whose storage the client frees.
    pub fn retain_client_owned(&self, name: GlName, free: FreeCallback) -> u32 {
        self.refs.retain(name, Ownership::ClientOwned(free))
    }

    /// Drop an owner. The last one returns a pool-owned texture to its
    /// bucket, or calls a client-owned texture's free callback. Needs no
    /// context: a pool-owned texture that can't be pooled is queued for
    /// deletion instead.
    pub fn release_retained(&self, name: GlName) {
        match self.refs.release(name) {
            Released::Dispose(Ownership::PoolOwned(descriptor)) => {
                if descriptor.internal_format == 0 {
                    log::error!(
                        "Texture {name} has an unknown internal format; deleting instead of pooling"
                    );
                    self.delete_later(descriptor, name);
                } else {
                    self.recycle(descriptor, name);
                }
            }
            Released::Dispose(Ownership::ClientOwned(free)) => free(name),
            Released::Retained(_) | Released::Untracked => {}
        }
    }

    /// Stop tracking a texture held by exactly one owner, without
    /// returning or freeing it. Returns whether it was disowned.
    pub fn disown(&self, name: GlName) -> bool {
        self.refs.disown(name).is_some()
    }

    /// Owners currently holding `name`.
    #[must_use]
    pub fn retain_count(&self, name: GlName) -> u32 {
        self.refs.count(name)
    }

    /// Idle textures in `descriptor`'s bucket.
    #[must_use]
    pub fn idle_count(&self, descriptor: &TextureDescriptor) -> usize {
        lock(&self.buckets)
            .get(descriptor)
            .map_or(0, |bucket| bucket.idle.len())
    }

    /// Idle textures across all buckets.
    #[must_use]
    pub fn total_idle(&self) -> usize {
        lock(&self.buckets).values().map(|b| b.idle.len()).sum()
    }
}
