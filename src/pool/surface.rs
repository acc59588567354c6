//! Cross-process shared surfaces with a quarantine handshake.
//!
//! A surface handed to another process must not be reused until that
//! process says it is done. The sender calls [`SurfacePool::disuse`] with
//! `quarantine = true`; the receiver calls [`signal`] when finished, which
//! sets [`SURFACE_DONE_KEY`] on the surface; the next sweep sees the flag
//! and moves the surface back to the active pool. Active surfaces idle
//! for longer than the expiry window are released.
//!
//! All three collections sit behind one mutex. Texture deletion for
//! expired surfaces runs after it is released, in one batch.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rustc_hash::FxHashMap;

use super::descriptor::TextureDescriptor;
use super::texture::{TextureAllocation, TexturePool};
use crate::driver::{gl, ContextId, GlEnum, GlName, SurfaceHost, SurfaceId, TextureCopy};
use crate::util::clock::{Clock, Timestamp};
use crate::util::sync::lock;

/// Surface value a consumer sets to 1 when it no longer reads the surface.
pub const SURFACE_DONE_KEY: &str = "glpool.consumerDone";

/// Mark `surface` as released by its consumer.
pub fn signal(host: &dyn SurfaceHost, surface: SurfaceId) {
    host.set_surface_value(surface, SURFACE_DONE_KEY, 1);
}

/// A checked-out shared surface and its backing rectangle texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SharedSurface {
    /// Surface identifier (what goes on the wire).
    pub id: SurfaceId,
    /// Backing `GL_TEXTURE_RECTANGLE` texture.
    pub texture: GlName,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    surface: SharedSurface,
    last_used: Timestamp,
}

#[derive(Default)]
struct SurfaceState {
    active: VecDeque<Entry>,
    quarantine: Vec<Entry>,
    checked_out: FxHashMap<SurfaceId, SharedSurface>,
}

/// What one [`SurfacePool::sweep`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SurfaceSweep {
    /// Surfaces moved from quarantine to the active pool.
    pub promoted: usize,
    /// Surfaces released after sitting idle too long.
    pub expired: usize,
}

/// Pool of shared surfaces.
pub struct SurfacePool {
    host: Arc<dyn SurfaceHost>,
    textures: Arc<TexturePool>,
    clock: Arc<dyn Clock>,
    internal_format: GlEnum,
    expiry: Duration,
    state: Mutex<SurfaceState>,
}

impl SurfacePool {
    /// Create an empty pool whose backing textures come from `textures`.
    #[must_use]
    pub fn new(
        host: Arc<dyn SurfaceHost>,
        textures: Arc<TexturePool>,
        clock: Arc<dyn Clock>,
        internal_format: GlEnum,
        expiry: Duration,
    ) -> Self {
        Self {
            host,
            textures,
            clock,
            internal_format,
            expiry,
            state: Mutex::new(SurfaceState::default()),
        }
    }

    /// The host the surfaces live on.
    #[must_use]
    pub fn host(&self) -> &Arc<dyn SurfaceHost> {
        &self.host
    }

    fn descriptor(&self, width: u32, height: u32) -> TextureDescriptor {
        TextureDescriptor::rectangle(self.internal_format, width, height)
    }

    /// Check out a `width`×`height` surface, reusing an active one if
    /// possible. `None` if the surface or its texture can't be created.
    ///
    /// A reused surface starts with its done flag cleared, so a consumer
    /// signal from an earlier handoff can't promote it after the next
    /// quarantine.
    pub fn acquire(&self, ctx: ContextId, width: u32, height: u32) -> Option<SharedSurface> {
        let reused = {
            let mut state = lock(&self.state);
            let index = state
                .active
                .iter()
                .position(|e| e.surface.width == width && e.surface.height == height);
            let entry = index.and_then(|index| state.active.remove(index));
            if let Some(entry) = entry {
                let _ = state.checked_out.insert(entry.surface.id, entry.surface);
            }
            entry
        };
        if let Some(entry) = reused {
            self.host.set_surface_value(entry.surface.id, SURFACE_DONE_KEY, 0);
            return Some(entry.surface);
        }

        let Some(id) = self.host.create_surface(width, height) else {
            log::error!("Couldn't create a {width}x{height} shared surface");
            return None;
        };
        let texture = self.textures.acquire(
            ctx,
            TextureAllocation::SurfaceBacked(id),
            self.descriptor(width, height),
            gl::BGRA,
        );
        if texture == 0 {
            self.host.release_surface(id);
            return None;
        }
        let surface = SharedSurface {
            id,
            texture,
            width,
            height,
        };
        let _ = lock(&self.state).checked_out.insert(id, surface);
        log::trace!("Created {id} ({width}x{height}) on texture {texture}");
        Some(surface)
    }

    /// Copy `width`×`height` of `texture` (bound on `target`) into a
    /// checked-out surface and flush, so another process can read it as
    /// soon as it receives the surface.
    pub fn publish(
        &self,
        ctx: ContextId,
        texture: GlName,
        target: GlEnum,
        width: u32,
        height: u32,
    ) -> Option<SharedSurface> {
        let surface = self.acquire(ctx, width, height)?;
        let driver = self.textures.driver();
        driver.copy_texture(
            ctx,
            &TextureCopy {
                source: texture,
                source_target: target,
                destination: surface.texture,
                destination_target: gl::TEXTURE_RECTANGLE,
                width,
                height,
            },
        );
        driver.flush(ctx);
        Some(surface)
    }

    /// Return a checked-out surface.
    ///
    /// With `quarantine` the surface waits for its consumer's [`signal`]
    /// before it can be reused. Without it the surface is immediately
    /// reusable; only do that for same-process handoffs, and the consumer
    /// must still signal before the next recipient relies on exclusive
    /// access.
    pub fn disuse(&self, surface: SurfaceId, quarantine: bool) {
        let now = self.clock.now();
        let mut state = lock(&self.state);
        let Some(checked_out) = state.checked_out.remove(&surface) else {
            drop(state);
            log::error!("{surface} is not checked out of this pool");
            return;
        };
        let entry = Entry {
            surface: checked_out,
            last_used: now,
        };
        if quarantine {
            state.quarantine.push(entry);
        } else {
            state.active.push_back(entry);
        }
    }

    /// Mark `surface` as released by its consumer.
    pub fn signal(&self, surface: SurfaceId) {
        signal(self.host.as_ref(), surface);
    }

    /// Promote signalled quarantined surfaces, then release active ones
    /// idle for longer than the expiry window.
    pub fn sweep(&self, ctx: ContextId) -> SurfaceSweep {
        let now = self.clock.now();
        let mut expired = Vec::new();
        let mut promoted = 0;
        {
            let mut state = lock(&self.state);
            let SurfaceState {
                active, quarantine, ..
            } = &mut *state;

            let mut waiting = Vec::with_capacity(quarantine.len());
            for mut entry in quarantine.drain(..) {
                if self.host.surface_value(entry.surface.id, SURFACE_DONE_KEY) != 0 {
                    self.host.set_surface_value(entry.surface.id, SURFACE_DONE_KEY, 0);
                    entry.last_used = now;
                    active.push_back(entry);
                    promoted += 1;
                } else {
                    waiting.push(entry);
                }
            }
            *quarantine = waiting;

            active.retain(|entry| {
                if now.saturating_sub(entry.last_used) > self.expiry {
                    expired.push(entry.surface);
                    false
                } else {
                    true
                }
            });
        }

        if !expired.is_empty() {
            let textures: Vec<(TextureDescriptor, GlName)> = expired
                .iter()
                .map(|s| (self.descriptor(s.width, s.height), s.texture))
                .collect();
            self.textures.delete_batch(ctx, &textures);
            for surface in &expired {
                self.host.release_surface(surface.id);
            }
        }
        SurfaceSweep {
            promoted,
            expired: expired.len(),
        }
    }

    /// Release every active and quarantined surface.
    pub fn drain(&self, ctx: ContextId) {
        let entries: Vec<Entry> = {
            let mut state = lock(&self.state);
            let mut all: Vec<Entry> = state.active.drain(..).collect();
            all.append(&mut state.quarantine);
            all
        };
        let textures: Vec<(TextureDescriptor, GlName)> = entries
            .iter()
            .map(|e| (self.descriptor(e.surface.width, e.surface.height), e.surface.texture))
            .collect();
        self.textures.delete_batch(ctx, &textures);
        for entry in &entries {
            self.host.release_surface(entry.surface.id);
        }
    }

    /// Surfaces available for reuse.
    #[must_use]
    pub fn active_count(&self) -> usize {
        lock(&self.state).active.len()
    }

    /// Surfaces waiting for a consumer signal.
    #[must_use]
    pub fn quarantined_count(&self) -> usize {
        lock(&self.state).quarantine.len()
    }

    /// Surfaces currently checked out.
    #[must_use]
    pub fn checked_out_count(&self) -> usize {
        lock(&self.state).checked_out.len()
    }
}
