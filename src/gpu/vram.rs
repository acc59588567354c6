//! Texture memory budget and the process-wide VRAM counter.
//!
//! The budget comes from a pluggable [`VramPolicy`], evaluated once per
//! [`VramGuard`] on the first allocation and cached afterwards. The
//! default [`HeadroomPolicy`] holds back a fixed reserve from the driver's
//! reported texture memory and then keeps only a fraction of the rest,
//! with tighter fractions for renderers known to take the whole machine
//! down when over-allocated.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;

use crate::driver::{ContextId, Driver, GlEnum};
use crate::gpu::format;
use crate::options::VramOptions;

const MEGABYTE: u64 = 1024 * 1024;

/// Allocation limits for new texture storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VramLimits {
    /// Largest single texture allocation, in bytes.
    pub budget_bytes: u64,
    /// Largest texture width or height.
    pub max_dimension: u32,
}

/// Source of [`VramLimits`].
pub trait VramPolicy: Send + Sync {
    /// Compute limits for the GPU behind `driver`.
    fn limits(&self, driver: &dyn Driver, ctx: ContextId) -> VramLimits;
}

/// Reserve-then-fraction policy driven by [`VramOptions`].
#[derive(Debug, Clone)]
pub struct HeadroomPolicy {
    options: VramOptions,
}

impl HeadroomPolicy {
    /// Create a policy from options.
    #[must_use]
    pub fn new(options: VramOptions) -> Self {
        Self { options }
    }
}

impl VramPolicy for HeadroomPolicy {
    fn limits(&self, driver: &dyn Driver, ctx: ContextId) -> VramLimits {
        let renderer = driver.renderer(ctx);
        let budget_bytes = match driver.texture_memory_megabytes(ctx) {
            Some(reported) => {
                let usable = reported.saturating_sub(self.options.reserve_megabytes);
                let fraction =
                    f64::from(self.options.headroom_for(&renderer).clamp(0.0, 1.0));
                ((usable * MEGABYTE) as f64 * fraction) as u64
            }
            None => {
                log::warn!(
                    "Renderer '{renderer}' did not report texture memory; \
                     texture allocations are not budgeted"
                );
                u64::MAX
            }
        };
        let mut max_dimension = driver.max_texture_size(ctx);
        if let Some(cap) = self.options.max_dimension_override {
            max_dimension = max_dimension.min(cap);
        }
        log::debug!(
            "Texture budget for '{renderer}': {} MB, max dimension {max_dimension}",
            budget_bytes / MEGABYTE
        );
        VramLimits {
            budget_bytes,
            max_dimension,
        }
    }
}

/// Policy returning fixed limits, for tests and constrained deployments.
#[derive(Debug, Clone, Copy)]
pub struct FixedPolicy(pub VramLimits);

impl VramPolicy for FixedPolicy {
    fn limits(&self, _driver: &dyn Driver, _ctx: ContextId) -> VramLimits {
        self.0
    }
}

/// Pre-allocation check against cached [`VramLimits`].
pub struct VramGuard {
    policy: Box<dyn VramPolicy>,
    cached: OnceLock<VramLimits>,
}

impl VramGuard {
    /// Wrap a policy; it is evaluated on first use.
    #[must_use]
    pub fn new(policy: Box<dyn VramPolicy>) -> Self {
        Self {
            policy,
            cached: OnceLock::new(),
        }
    }

    /// Cached limits, computing them on first call.
    pub fn limits(&self, driver: &dyn Driver, ctx: ContextId) -> VramLimits {
        *self.cached.get_or_init(|| self.policy.limits(driver, ctx))
    }

    /// Whether a new `width`×`height` texture of `internal_format` fits.
    /// Refusals are logged.
    pub fn admit(
        &self,
        driver: &dyn Driver,
        ctx: ContextId,
        internal_format: GlEnum,
        width: u32,
        height: u32,
    ) -> bool {
        let limits = self.limits(driver, ctx);
        let bytes = format::texture_bytes(internal_format, width, height);
        if bytes > limits.budget_bytes {
            log::error!(
                "Not enough graphics memory for a {width}x{height} {} texture \
                 (requested {bytes} bytes, budget {} bytes)",
                format::name(internal_format),
                limits.budget_bytes
            );
            return false;
        }
        if width > limits.max_dimension || height > limits.max_dimension {
            log::error!(
                "Requested texture size {width}x{height} is larger than the \
                 GPU's maximum of {}x{}",
                limits.max_dimension,
                limits.max_dimension
            );
            return false;
        }
        true
    }
}

/// Running total of pooled GPU memory (buffers and textures).
#[derive(Debug, Default)]
pub struct VramStats {
    allocated: AtomicU64,
    peak: AtomicU64,
}

impl VramStats {
    /// Record `bytes` of new storage.
    pub fn add(&self, bytes: u64) {
        let now = self.allocated.fetch_add(bytes, Ordering::Relaxed) + bytes;
        let _ = self.peak.fetch_max(now, Ordering::Relaxed);
    }

    /// Record `bytes` of freed storage.
    pub fn sub(&self, bytes: u64) {
        let _ = self
            .allocated
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| {
                Some(v.saturating_sub(bytes))
            });
    }

    /// Bytes currently allocated.
    #[must_use]
    pub fn allocated(&self) -> u64 {
        self.allocated.load(Ordering::Relaxed)
    }

    /// Highest value [`allocated`](Self::allocated) has reached.
    #[must_use]
    pub fn peak(&self) -> u64 {
        self.peak.load(Ordering::Relaxed)
    }
}
