//! The explicitly constructed owner of every pool and cache.
//!
//! Construction order (each step may use the ones before it):
//!
//! 1. clock
//! 2. context pool
//! 3. VRAM guard and statistics
//! 4. buffer and texture pools
//! 5. shared-surface pool (backed by the texture pool)
//! 6. shader and program caches
//! 7. noise lookup textures (created lazily, on first use)
//! 8. background sweeper
//!
//! Teardown runs the other way: the sweeper is stopped and joined first,
//! then idle surfaces, textures, and buffers are deleted on a pooled
//! context. Objects still checked out at teardown are the caller's to
//! free.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::driver::{ContextId, Driver, SurfaceHost};
use crate::error::GlPoolError;
use crate::gpu::context_pool::ContextPool;
use crate::gpu::vram::{HeadroomPolicy, VramGuard, VramPolicy, VramStats};
use crate::image::Image;
use crate::options::Options;
use crate::pool::{BufferPool, SurfacePool, SurfaceSweep, Sweeper, TexturePool};
use crate::shader::noise::NoiseTextures;
use crate::shader::{DiagnosticFilter, IncludeResolver, ProgramCache, ShaderCache};
use crate::util::clock::{Clock, SystemClock};
use crate::util::sync::lock;

/// Outcome of one sweep pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Shared-surface promotions and expiries.
    pub surfaces: SurfaceSweep,
    /// Idle or queued textures deleted.
    pub textures_deleted: usize,
}

fn sweep_pools(
    contexts: &ContextPool,
    surfaces: &SurfacePool,
    textures: &TexturePool,
) -> Option<SweepReport> {
    let Some(guard) = contexts.use_context() else {
        log::error!("Couldn't get a context to sweep the pools");
        return None;
    };
    let ctx = guard.id();
    let surfaces = surfaces.sweep(ctx);
    let textures_deleted = textures.sweep(ctx);
    Some(SweepReport {
        surfaces,
        textures_deleted,
    })
}

/// Configures and builds a [`GpuRuntime`].
pub struct GpuRuntimeBuilder {
    driver: Arc<dyn Driver>,
    host: Arc<dyn SurfaceHost>,
    options: Options,
    clock: Option<Arc<dyn Clock>>,
    vram_policy: Option<Box<dyn VramPolicy>>,
    root_context: Option<ContextId>,
    background_sweep: bool,
}

impl GpuRuntimeBuilder {
    /// Use `options` instead of the defaults.
    #[must_use]
    pub fn options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    /// Use `clock` for last-used timestamps (defaults to [`SystemClock`]).
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Replace the default [`HeadroomPolicy`].
    #[must_use]
    pub fn vram_policy(mut self, policy: Box<dyn VramPolicy>) -> Self {
        self.vram_policy = Some(policy);
        self
    }

    /// Share every pooled context with an existing context.
    #[must_use]
    pub fn root_context(mut self, root: ContextId) -> Self {
        self.root_context = Some(root);
        self
    }

    /// Whether to start the sweeper thread (default `true`). Without it,
    /// call [`GpuRuntime::sweep_now`] yourself.
    #[must_use]
    pub fn background_sweep(mut self, enabled: bool) -> Self {
        self.background_sweep = enabled;
        self
    }

    /// Build the runtime.
    ///
    /// # Errors
    ///
    /// [`GlPoolError::ThreadSpawn`] if the sweeper thread can't start.
    pub fn build(self) -> Result<GpuRuntime, GlPoolError> {
        let Self {
            driver,
            host,
            options,
            clock,
            vram_policy,
            root_context,
            background_sweep,
        } = self;
        let verbose = options.debug.verbose_pools;

        let clock = clock.unwrap_or_else(|| Arc::new(SystemClock::new()));

        let contexts = Arc::new(ContextPool::new(Arc::clone(&driver)));
        if let Some(root) = root_context {
            let _ = contexts.set_root_context(root);
        }

        let policy = vram_policy
            .unwrap_or_else(|| Box::new(HeadroomPolicy::new(options.vram.clone())));
        let guard = VramGuard::new(policy);
        let vram = Arc::new(VramStats::default());

        let buffers = Arc::new(BufferPool::new(
            Arc::clone(&driver),
            Arc::clone(&vram),
            verbose,
        ));
        let textures = Arc::new(TexturePool::new(
            Arc::clone(&driver),
            Arc::clone(&clock),
            guard,
            Arc::clone(&vram),
            options.pool.sweep_interval(),
            verbose,
        ));

        let surfaces = Arc::new(SurfacePool::new(
            host,
            Arc::clone(&textures),
            Arc::clone(&clock),
            options.pool.surface_internal_format,
            options.pool.surface_expiry(),
        ));

        let filter = DiagnosticFilter::new(
            options.shader.benign_diagnostics.clone(),
            options.shader.generated_line_threshold,
        );
        let shaders = ShaderCache::new(
            Arc::clone(&driver),
            IncludeResolver::from_options(&options.shader),
            filter.clone(),
        );
        let programs =
            ProgramCache::new(Arc::clone(&driver), filter, options.debug.validate_programs);

        let noise = NoiseTextures::new(Arc::clone(&textures));

        let sweeper = if background_sweep {
            let contexts = Arc::clone(&contexts);
            let surfaces = Arc::clone(&surfaces);
            let textures = Arc::clone(&textures);
            Some(Sweeper::spawn(options.pool.sweep_interval(), move || {
                if let Some(report) = sweep_pools(&contexts, &surfaces, &textures) {
                    if verbose && report != SweepReport::default() {
                        log::debug!("Sweep: {report:?}");
                    }
                }
            })?)
        } else {
            None
        };

        log::debug!(
            "GPU runtime ready (sweep every {} ms, background sweep {})",
            options.pool.sweep_interval_ms,
            if sweeper.is_some() { "on" } else { "off" }
        );

        Ok(GpuRuntime {
            options,
            driver,
            clock,
            contexts,
            vram,
            buffers,
            textures,
            surfaces,
            shaders,
            programs,
            noise,
            sweeper: Mutex::new(sweeper),
            shut_down: AtomicBool::new(false),
        })
    }
}

/// Every pool and cache, wired together.
pub struct GpuRuntime {
    options: Options,
    driver: Arc<dyn Driver>,
    clock: Arc<dyn Clock>,
    contexts: Arc<ContextPool>,
    vram: Arc<VramStats>,
    buffers: Arc<BufferPool>,
    textures: Arc<TexturePool>,
    surfaces: Arc<SurfacePool>,
    shaders: ShaderCache,
    programs: ProgramCache,
    noise: NoiseTextures,
    sweeper: Mutex<Option<Sweeper>>,
    shut_down: AtomicBool,
}

impl GpuRuntime {
    /// Start configuring a runtime on `driver`, with shared surfaces
    /// from `host`.
    #[must_use]
    pub fn builder(driver: Arc<dyn Driver>, host: Arc<dyn SurfaceHost>) -> GpuRuntimeBuilder {
        GpuRuntimeBuilder {
            driver,
            host,
            options: Options::default(),
            clock: None,
            vram_policy: None,
            root_context: None,
            background_sweep: true,
        }
    }

    /// Options the runtime was built with.
    #[must_use]
    pub fn options(&self) -> &Options {
        &self.options
    }

    /// The GL driver.
    #[must_use]
    pub fn driver(&self) -> &Arc<dyn Driver> {
        &self.driver
    }

    /// The shared-surface host.
    #[must_use]
    pub fn host(&self) -> &Arc<dyn SurfaceHost> {
        self.surfaces.host()
    }

    /// The clock used for last-used timestamps.
    #[must_use]
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// The context pool.
    #[must_use]
    pub fn contexts(&self) -> &ContextPool {
        &self.contexts
    }

    /// The buffer pool.
    #[must_use]
    pub fn buffers(&self) -> &Arc<BufferPool> {
        &self.buffers
    }

    /// The texture pool.
    #[must_use]
    pub fn textures(&self) -> &Arc<TexturePool> {
        &self.textures
    }

    /// The shared-surface pool.
    #[must_use]
    pub fn surfaces(&self) -> &Arc<SurfacePool> {
        &self.surfaces
    }

    /// The compiled-stage cache.
    #[must_use]
    pub fn shaders(&self) -> &ShaderCache {
        &self.shaders
    }

    /// The linked-program cache.
    #[must_use]
    pub fn programs(&self) -> &ProgramCache {
        &self.programs
    }

    /// Noise lookup textures.
    #[must_use]
    pub fn noise(&self) -> &NoiseTextures {
        &self.noise
    }

    /// Bytes currently allocated through the buffer and texture pools,
    /// and the peak.
    #[must_use]
    pub fn vram_stats(&self) -> &VramStats {
        &self.vram
    }

    /// Receive a shared surface from its JSON descriptor.
    ///
    /// # Errors
    ///
    /// [`GlPoolError::Descriptor`] for malformed JSON.
    pub fn receive_surface(
        &self,
        ctx: ContextId,
        json: &str,
    ) -> Result<Option<Image>, GlPoolError> {
        Image::from_json(
            &self.textures,
            self.surfaces.host(),
            ctx,
            json,
            self.options.pool.surface_internal_format,
        )
    }

    /// Whether the background sweeper is running.
    #[must_use]
    pub fn is_sweeping(&self) -> bool {
        lock(&self.sweeper).as_ref().is_some_and(Sweeper::is_running)
    }

    /// Sweep surfaces, then textures, on a pooled context. `None` when no
    /// context could be obtained.
    pub fn sweep_now(&self) -> Option<SweepReport> {
        sweep_pools(&self.contexts, &self.surfaces, &self.textures)
    }

    /// Stop the sweeper and delete every idle object. Later calls do
    /// nothing; the runtime's pools stay usable but are no longer swept.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        let sweeper = lock(&self.sweeper).take();
        if let Some(mut sweeper) = sweeper {
            sweeper.shutdown();
        }
        let Some(guard) = self.contexts.use_context() else {
            log::error!("Couldn't get a context to free pooled objects at shutdown");
            return;
        };
        let ctx = guard.id();
        self.noise.release(ctx);
        self.programs.cleanup_context(ctx);
        self.surfaces.drain(ctx);
        self.textures.drain(ctx);
        self.buffers.drain(ctx);
        if self.options.debug.verbose_pools {
            log::debug!(
                "GPU runtime shut down; {} bytes still allocated (peak {})",
                self.vram.allocated(),
                self.vram.peak()
            );
        }
    }
}

impl Drop for GpuRuntime {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::driver::gl;
    use crate::driver::headless::HeadlessDriver;
    use crate::pool::{TextureAllocation, TextureDescriptor};
    use crate::util::clock::ManualClock;

    const RGBA_16: TextureDescriptor = TextureDescriptor {
        target: gl::TEXTURE_2D,
        internal_format: gl::RGBA8,
        width: 16,
        height: 16,
    };

    fn manual() -> (Arc<HeadlessDriver>, Arc<ManualClock>, GpuRuntime) {
        let driver = Arc::new(HeadlessDriver::default());
        let clock = Arc::new(ManualClock::new());
        let runtime = GpuRuntime::builder(driver.clone(), driver.clone())
            .clock(clock.clone())
            .background_sweep(false)
            .build()
            .unwrap();
        (driver, clock, runtime)
    }

    #[test]
    fn sweep_now_evicts_stale_textures() {
        let (driver, clock, runtime) = manual();
        let guard = runtime.contexts().use_context().unwrap();
        let name = runtime
            .textures()
            .acquire(guard.id(), TextureAllocation::Allocate, RGBA_16, 0);
        runtime
            .textures()
            .release(guard.id(), TextureAllocation::Allocate, RGBA_16, name);
        drop(guard);

        assert_eq!(runtime.sweep_now().unwrap().textures_deleted, 0);
        clock.advance(Duration::from_millis(150));
        assert_eq!(runtime.sweep_now().unwrap().textures_deleted, 1);
        assert!(driver.texture_info(name).is_none());
        assert_eq!(runtime.vram_stats().allocated(), 0);
    }

    #[test]
    fn shutdown_drains_idle_objects_once() {
        let (driver, _clock, runtime) = manual();
        let guard = runtime.contexts().use_context().unwrap();
        let ctx = guard.id();
        let texture = runtime
            .textures()
            .acquire(ctx, TextureAllocation::Allocate, RGBA_16, 0);
        runtime
            .textures()
            .release(ctx, TextureAllocation::Allocate, RGBA_16, texture);
        let buffer = runtime.buffers().acquire(ctx, gl::ARRAY_BUFFER, 64);
        runtime.buffers().release(gl::ARRAY_BUFFER, 64, buffer);
        let surface = runtime.surfaces().acquire(ctx, 8, 8).unwrap();
        runtime.surfaces().disuse(surface.id, false);
        drop(guard);

        runtime.shutdown();
        assert_eq!(driver.live_textures(), 0);
        assert_eq!(driver.live_buffers(), 0);
        assert_eq!(driver.live_surfaces(), 0);
        runtime.shutdown();
    }

    #[test]
    fn runtime_options_flow_into_pools() {
        let driver = Arc::new(HeadlessDriver::default());
        let mut options = Options::default();
        options.vram.max_dimension_override = Some(64);
        options.debug.validate_programs = true;
        let runtime = GpuRuntime::builder(driver.clone(), driver.clone())
            .options(options)
            .background_sweep(false)
            .build()
            .unwrap();
        let ctx = runtime.contexts().acquire().unwrap();
        let wide = TextureDescriptor::texture_2d(gl::RGBA8, 128, 1);
        assert_eq!(
            runtime
                .textures()
                .acquire(ctx, TextureAllocation::Allocate, wide, 0),
            0
        );
        runtime.contexts().release(ctx);
    }

    #[test]
    fn receive_surface_round_trip() {
        let (driver, _clock, runtime) = manual();
        let guard = runtime.contexts().use_context().unwrap();
        let shared = runtime.surfaces().acquire(guard.id(), 32, 16).unwrap();
        runtime.surfaces().disuse(shared.id, true);
        let json = crate::image::SurfaceDescriptor::for_surface(&shared, 1.0)
            .to_json()
            .unwrap();

        let image = runtime.receive_surface(guard.id(), &json).unwrap().unwrap();
        assert_eq!((image.width(), image.height()), (32, 16));
        drop(guard);
        assert_eq!(runtime.sweep_now().unwrap().surfaces.promoted, 0);
        drop(image);
        assert_eq!(runtime.sweep_now().unwrap().surfaces.promoted, 1);
        assert_eq!(runtime.surfaces().active_count(), 1);
        assert_eq!(driver.live_surfaces(), 1);
    }

    #[test]
    fn background_sweeper_evicts_and_stops() {
        let driver = Arc::new(HeadlessDriver::default());
        let mut options = Options::default();
        options.pool.sweep_interval_ms = 10;
        let runtime = GpuRuntime::builder(driver.clone(), driver.clone())
            .options(options)
            .build()
            .unwrap();
        assert!(runtime.is_sweeping());
        {
            let guard = runtime.contexts().use_context().unwrap();
            let name = runtime
                .textures()
                .acquire(guard.id(), TextureAllocation::Allocate, RGBA_16, 0);
            runtime
                .textures()
                .release(guard.id(), TextureAllocation::Allocate, RGBA_16, name);
        }
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while driver.live_textures() > 0 && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(driver.live_textures(), 0);
        runtime.shutdown();
        assert!(!runtime.is_sweeping());
    }
}
