//! Reference-counted texture handles.
//!
//! An [`Image`] retains its texture in the [`TexturePool`]'s handle table
//! for as long as any clone is alive. Dropping the last clone releases
//! that retain: a pool-owned texture goes back to its bucket, a
//! client-owned one runs its free callback. Neither needs a current
//! context, so images can be dropped anywhere (including inside a
//! shader's uniform list). A client-owned image outliving its pool runs
//! its callback itself.

mod descriptor;

pub use descriptor::{ImageJson, SurfaceDescriptor, TextureJson};

use std::fmt;
use std::sync::{Arc, Mutex, Weak};

use crate::driver::{gl, ContextId, GlEnum, GlName, SurfaceHost};
use crate::error::GlPoolError;
use crate::gpu::format;
use crate::pool::surface::signal;
use crate::pool::{FreeCallback, SurfacePool, TextureAllocation, TextureDescriptor, TexturePool};
use crate::util::sync::lock;

/// A free callback shared between the pool's handle table and the image,
/// run by whichever releases last.
type SharedFree = Arc<Mutex<Option<FreeCallback>>>;

fn run_once(free: &SharedFree, name: GlName) {
    let callback = lock(free).take();
    if let Some(callback) = callback {
        callback(name);
    }
}

struct ImageInner {
    texture: GlName,
    descriptor: TextureDescriptor,
    pool: Weak<TexturePool>,
    free: Option<SharedFree>,
}

impl Drop for ImageInner {
    fn drop(&mut self) {
        if let Some(pool) = self.pool.upgrade() {
            pool.release_retained(self.texture);
        } else if let Some(free) = &self.free {
            log::debug!("Texture pool is gone; freeing texture {} directly", self.texture);
            run_once(free, self.texture);
        }
    }
}

/// A texture plus its shape, shared by cloning.
#[derive(Clone)]
pub struct Image {
    inner: Arc<ImageInner>,
    scale_factor: f32,
}

impl Image {
    /// Wrap a texture obtained from `pool`. It returns to its bucket when
    /// the last clone drops. `None` for the 0 name.
    #[must_use]
    pub fn pooled(
        pool: &Arc<TexturePool>,
        texture: GlName,
        descriptor: TextureDescriptor,
    ) -> Option<Self> {
        if texture == 0 {
            return None;
        }
        let _ = pool.retain(texture, descriptor);
        Some(Self::wrap(pool, texture, descriptor, None))
    }

    /// Wrap a texture whose storage the caller manages; `free` runs once
    /// the last clone drops.
    #[must_use]
    pub fn client_owned(
        pool: &Arc<TexturePool>,
        texture: GlName,
        descriptor: TextureDescriptor,
        free: FreeCallback,
    ) -> Option<Self> {
        if texture == 0 {
            return None;
        }
        let shared: SharedFree = Arc::new(Mutex::new(Some(free)));
        let shared_free = Arc::clone(&shared);
        let table_free: FreeCallback = Box::new(move |name| run_once(&shared_free, name));
        let _ = pool.retain_client_owned(texture, table_free);
        Some(Self::wrap(pool, texture, descriptor, Some(shared)))
    }

    /// Upload client pixels into a pooled 2D texture.
    ///
    /// The internal format is derived from `pixel_format` and
    /// `component_type` (RGB, RGBA, BGRA, luminance, luminance-alpha, in
    /// 8-bit, half-float or float). `None` when the pool refuses the
    /// allocation or `pixels` is too short.
    #[must_use]
    pub fn from_pixels(
        pool: &Arc<TexturePool>,
        ctx: ContextId,
        pixels: &[u8],
        pixel_format: GlEnum,
        component_type: GlEnum,
        width: u32,
        height: u32,
    ) -> Option<Self> {
        let internal_format = format::internal_format_for(pixel_format, component_type);
        let descriptor = TextureDescriptor::texture_2d(internal_format, width, height);
        let texture = pool.acquire(ctx, TextureAllocation::Allocate, descriptor, pixel_format);
        if texture == 0 {
            return None;
        }
        if !pool.fill(ctx, texture, descriptor, pixel_format, component_type, pixels) {
            pool.release(ctx, TextureAllocation::Allocate, descriptor, texture);
            return None;
        }
        Self::pooled(pool, texture, descriptor)
    }

    /// Receive a shared surface described by `descriptor`.
    ///
    /// The surface is bound to a new rectangle texture. When the last
    /// clone drops, the texture is queued for deletion and the surface is
    /// signalled back to its producer.
    #[must_use]
    pub fn from_surface_descriptor(
        pool: &Arc<TexturePool>,
        host: &Arc<dyn SurfaceHost>,
        ctx: ContextId,
        descriptor: &SurfaceDescriptor,
        internal_format: GlEnum,
    ) -> Option<Self> {
        let surface = descriptor.surface_id();
        let texture_descriptor = TextureDescriptor::rectangle(
            internal_format,
            descriptor.pixels_wide,
            descriptor.pixels_high,
        );
        let texture = pool.acquire(
            ctx,
            TextureAllocation::SurfaceBacked(surface),
            texture_descriptor,
            gl::BGRA,
        );
        if texture == 0 {
            log::error!("Couldn't receive {surface}");
            signal(host.as_ref(), surface);
            return None;
        }
        let weak = Arc::downgrade(pool);
        let host = Arc::clone(host);
        let free: FreeCallback = Box::new(move |name| {
            if let Some(pool) = weak.upgrade() {
                pool.delete_later(texture_descriptor, name);
            }
            signal(host.as_ref(), surface);
        });
        let image = Self::client_owned(pool, texture, texture_descriptor, free)?;
        Some(image.with_scale_factor(descriptor.scale_factor))
    }

    /// Parse either JSON form and build an image from it.
    ///
    /// A texture name becomes a pooled 2D image sharing the texture's
    /// retain count; a shared surface is received as with
    /// [`from_surface_descriptor`](Self::from_surface_descriptor), using
    /// `internal_format`.
    ///
    /// # Errors
    ///
    /// Returns [`GlPoolError::Descriptor`] for malformed JSON; a
    /// well-formed descriptor that can't be bound (or names texture 0)
    /// yields `Ok(None)`.
    pub fn from_json(
        pool: &Arc<TexturePool>,
        host: &Arc<dyn SurfaceHost>,
        ctx: ContextId,
        json: &str,
        internal_format: GlEnum,
    ) -> Result<Option<Self>, GlPoolError> {
        Ok(match ImageJson::from_json(json)? {
            ImageJson::Texture(texture) => Self::pooled(
                pool,
                texture.gl_texture_name,
                TextureDescriptor::texture_2d(
                    texture.gl_internal_format,
                    texture.pixels_wide,
                    texture.pixels_high,
                ),
            ),
            ImageJson::Surface(descriptor) => {
                Self::from_surface_descriptor(pool, host, ctx, &descriptor, internal_format)
            }
        })
    }

    /// In-process JSON form: the texture name, internal format, and size.
    ///
    /// # Errors
    ///
    /// Returns [`GlPoolError::Descriptor`] if serialization fails.
    pub fn to_json(&self) -> Result<String, GlPoolError> {
        Ok(serde_json::to_string(&TextureJson {
            gl_texture_name: self.texture(),
            gl_internal_format: self.internal_format(),
            pixels_wide: self.width(),
            pixels_high: self.height(),
        })?)
    }

    /// Cross-process JSON form.
    ///
    /// Copies the image into a surface from `surfaces` and quarantines
    /// it until the receiver signals. `Ok(None)` when no surface could be
    /// checked out.
    ///
    /// # Errors
    ///
    /// Returns [`GlPoolError::Descriptor`] if serialization fails.
    pub fn to_interprocess_json(
        &self,
        surfaces: &SurfacePool,
        ctx: ContextId,
    ) -> Result<Option<String>, GlPoolError> {
        let Some(surface) =
            surfaces.publish(ctx, self.texture(), self.target(), self.width(), self.height())
        else {
            log::error!("Couldn't publish {self}");
            return Ok(None);
        };
        surfaces.disuse(surface.id, true);
        SurfaceDescriptor::for_surface(&surface, self.scale_factor)
            .to_json()
            .map(Some)
    }

    fn wrap(
        pool: &Arc<TexturePool>,
        texture: GlName,
        descriptor: TextureDescriptor,
        free: Option<SharedFree>,
    ) -> Self {
        Self {
            inner: Arc::new(ImageInner {
                texture,
                descriptor,
                pool: Arc::downgrade(pool),
                free,
            }),
            scale_factor: 1.0,
        }
    }

    /// Same image with a different points-to-pixels ratio.
    #[must_use]
    pub fn with_scale_factor(mut self, scale_factor: f32) -> Self {
        self.scale_factor = scale_factor;
        self
    }

    /// GL texture name.
    #[must_use]
    pub fn texture(&self) -> GlName {
        self.inner.texture
    }

    /// Texture target.
    #[must_use]
    pub fn target(&self) -> GlEnum {
        self.inner.descriptor.target
    }

    /// Internal format.
    #[must_use]
    pub fn internal_format(&self) -> GlEnum {
        self.inner.descriptor.internal_format
    }

    /// Width in pixels.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.inner.descriptor.width
    }

    /// Height in pixels.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.inner.descriptor.height
    }

    /// Points-to-pixels ratio.
    #[must_use]
    pub fn scale_factor(&self) -> f32 {
        self.scale_factor
    }

    /// Pool descriptor of the texture.
    #[must_use]
    pub fn descriptor(&self) -> TextureDescriptor {
        self.inner.descriptor
    }
}

impl PartialEq for Image {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner) && self.scale_factor == other.scale_factor
    }
}

impl fmt::Debug for Image {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Image")
            .field("texture", &self.inner.texture)
            .field("descriptor", &self.inner.descriptor)
            .field("scale_factor", &self.scale_factor)
            .finish()
    }
}

impl fmt::Display for Image {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "texture {} ({})", self.inner.texture, self.inner.descriptor)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::driver::headless::HeadlessDriver;
    use crate::driver::Driver;
    use crate::gpu::vram::{FixedPolicy, VramGuard, VramLimits, VramStats};
    use crate::pool::surface::SURFACE_DONE_KEY;
    use crate::util::clock::ManualClock;

    fn pool() -> (Arc<HeadlessDriver>, ContextId, Arc<TexturePool>) {
        let driver = Arc::new(HeadlessDriver::default());
        let ctx = driver.create_context(None).unwrap();
        let pool = Arc::new(TexturePool::new(
            driver.clone(),
            Arc::new(ManualClock::new()),
            VramGuard::new(Box::new(FixedPolicy(VramLimits {
                budget_bytes: u64::MAX,
                max_dimension: 4096,
            }))),
            Arc::new(VramStats::default()),
            Duration::from_millis(100),
            false,
        ));
        (driver, ctx, pool)
    }

    #[test]
    fn last_clone_returns_texture_to_pool() {
        let (driver, ctx, pool) = pool();
        let pixels = [255_u8; 4 * 4 * 4];
        let image =
            Image::from_pixels(&pool, ctx, &pixels, gl::RGBA, gl::UNSIGNED_BYTE, 4, 4).unwrap();
        assert_eq!(image.internal_format(), gl::RGBA8);
        assert_eq!(driver.texture_info(image.texture()).unwrap().width, 4);

        let clone = image.clone();
        assert_eq!(pool.retain_count(image.texture()), 1);
        drop(image);
        assert_eq!(pool.total_idle(), 0);
        let descriptor = clone.descriptor();
        drop(clone);
        assert_eq!(pool.idle_count(&descriptor), 1);
    }

    #[test]
    fn short_pixel_buffer_is_refused() {
        let (_driver, ctx, pool) = pool();
        let pixels = [0_u8; 3];
        assert!(Image::from_pixels(&pool, ctx, &pixels, gl::BGRA, gl::UNSIGNED_BYTE, 2, 2)
            .is_none());
        assert_eq!(pool.total_idle(), 1);
    }

    #[test]
    fn client_owned_image_runs_callback_once() {
        use std::sync::atomic::{AtomicU32, Ordering};
        let (_driver, _ctx, pool) = pool();
        let calls = Arc::new(AtomicU32::new(0));
        let seen = calls.clone();
        let image = Image::client_owned(
            &pool,
            77,
            TextureDescriptor::texture_2d(gl::RGBA8, 1, 1),
            Box::new(move |_| {
                let _ = seen.fetch_add(1, Ordering::SeqCst);
            }),
        )
        .unwrap();
        let clone = image.clone();
        drop(image);
        drop(clone);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn received_surface_signals_on_drop() {
        let (driver, ctx, pool) = pool();
        let surface = driver.create_surface(16, 8).unwrap();
        let host: Arc<dyn SurfaceHost> = driver.clone();
        let json = format!(
            r#"{{"ioSurface":{},"pixelsWide":16,"pixelsHigh":8,"scaleFactor":2}}"#,
            surface.0
        );

        let image = Image::from_json(&pool, &host, ctx, &json, gl::RGBA8).unwrap().unwrap();
        assert_eq!(image.target(), gl::TEXTURE_RECTANGLE);
        assert!((image.scale_factor() - 2.0).abs() < f32::EPSILON);
        assert_eq!(driver.surface_value(surface, SURFACE_DONE_KEY), 0);

        let texture = image.texture();
        drop(image);
        assert_eq!(driver.surface_value(surface, SURFACE_DONE_KEY), 1);
        assert_eq!(pool.pending_deletions(), 1);
        let _ = pool.sweep(ctx);
        assert!(driver.texture_info(texture).is_none());
    }

    #[test]
    fn client_callback_runs_when_pool_is_gone() {
        use std::sync::atomic::{AtomicU32, Ordering};
        let (_driver, _ctx, pool) = pool();
        let calls = Arc::new(AtomicU32::new(0));
        let seen = calls.clone();
        let image = Image::client_owned(
            &pool,
            9,
            TextureDescriptor::texture_2d(gl::RGBA8, 1, 1),
            Box::new(move |name| {
                assert_eq!(name, 9);
                let _ = seen.fetch_add(1, Ordering::SeqCst);
            }),
        )
        .unwrap();
        drop(pool);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        drop(image);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn received_surface_signals_even_after_pool_drops() {
        let (driver, ctx, pool) = pool();
        let surface = driver.create_surface(4, 4).unwrap();
        let host: Arc<dyn SurfaceHost> = driver.clone();
        let descriptor = SurfaceDescriptor {
            surface: surface.0,
            pixels_wide: 4,
            pixels_high: 4,
            scale_factor: 1.0,
        };
        let image = Image::from_surface_descriptor(&pool, &host, ctx, &descriptor, gl::RGBA8)
            .unwrap();
        drop(pool);
        drop(image);
        assert_eq!(driver.surface_value(surface, SURFACE_DONE_KEY), 1);
    }

    #[test]
    fn in_process_json_shares_the_texture() {
        let (driver, ctx, pool) = pool();
        let host: Arc<dyn SurfaceHost> = driver;
        let pixels = [0_u8; 2 * 2 * 4];
        let image =
            Image::from_pixels(&pool, ctx, &pixels, gl::RGBA, gl::UNSIGNED_BYTE, 2, 2).unwrap();
        let json = image.to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["glTextureName"], image.texture());
        assert_eq!(value["glInternalFormat"], gl::RGBA8);

        let received = Image::from_json(&pool, &host, ctx, &json, gl::RGBA8)
            .unwrap()
            .unwrap();
        assert_eq!(received.texture(), image.texture());
        assert_eq!(received.descriptor(), image.descriptor());
        assert_eq!(pool.retain_count(image.texture()), 2);

        let descriptor = image.descriptor();
        drop(image);
        assert_eq!(pool.idle_count(&descriptor), 0);
        drop(received);
        assert_eq!(pool.idle_count(&descriptor), 1);
    }

    #[test]
    fn interprocess_json_round_trips_through_a_surface() {
        let (driver, ctx, pool) = pool();
        let host: Arc<dyn SurfaceHost> = driver.clone();
        let surfaces = SurfacePool::new(
            host.clone(),
            pool.clone(),
            Arc::new(ManualClock::new()),
            gl::RGBA8,
            Duration::from_secs(1),
        );
        let pixels = [0_u8; 8 * 4 * 4];
        let image = Image::from_pixels(&pool, ctx, &pixels, gl::RGBA, gl::UNSIGNED_BYTE, 8, 4)
            .unwrap()
            .with_scale_factor(2.0);

        let json = image.to_interprocess_json(&surfaces, ctx).unwrap().unwrap();
        let descriptor = SurfaceDescriptor::from_json(&json).unwrap();
        assert_eq!((descriptor.pixels_wide, descriptor.pixels_high), (8, 4));
        assert!((descriptor.scale_factor - 2.0).abs() < f32::EPSILON);
        assert_eq!(surfaces.quarantined_count(), 1);
        let copies = driver.texture_copies();
        assert_eq!(copies.len(), 1);
        assert_eq!(copies[0].1.source, image.texture());

        let received = Image::from_json(&pool, &host, ctx, &json, gl::RGBA8)
            .unwrap()
            .unwrap();
        assert_eq!(received.target(), gl::TEXTURE_RECTANGLE);
        assert_eq!((received.width(), received.height()), (8, 4));
        assert_eq!(surfaces.sweep(ctx).promoted, 0);
        drop(received);
        assert_eq!(surfaces.sweep(ctx).promoted, 1);
    }

    #[test]
    fn malformed_descriptor_is_an_error() {
        let (driver, ctx, pool) = pool();
        let host: Arc<dyn SurfaceHost> = driver;
        assert!(Image::from_json(&pool, &host, ctx, "{", gl::RGBA8).is_err());
    }
}
