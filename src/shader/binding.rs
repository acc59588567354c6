//! Uploading a shader's uniform list to a linked program.
//!
//! Samplers take texture units in binding order starting at 0. Units
//! with a real texture are reported back so they can be unbound on
//! deactivation; a `None` image still takes its unit but leaves nothing
//! to unbind.
//!
//! A program that declares `colorBuffer` (without an explicit image bound
//! to it) or `depthBuffer` gets a copy of the current framebuffer, taken
//! at viewport size into pooled textures on the units after noise.

use std::sync::Arc;

use super::noise::{NoiseTextures, GRADIENT_UNIFORM, PERLIN_UNIFORM};
use super::program_cache::LinkedProgram;
use super::uniform::UniformValue;
use crate::driver::{gl, ContextId, Driver, FramebufferCopy, GlEnum, GlName, UniformData};
use crate::image::Image;
use crate::pool::{TextureAllocation, TextureDescriptor, TexturePool};

/// Sampler receiving a copy of the framebuffer's color.
pub const COLOR_BUFFER_UNIFORM: &str = "colorBuffer";
/// Sampler receiving a copy of the framebuffer's depth.
pub const DEPTH_BUFFER_UNIFORM: &str = "depthBuffer";

/// A texture unit and the target bound on it.
pub type BoundUnit = (u32, GlEnum);

/// What [`bind_uniforms`] left bound.
#[derive(Debug, Default)]
pub struct Bindings {
    /// Units holding a texture, in bind order.
    pub units: Vec<BoundUnit>,
    /// Framebuffer copies for `colorBuffer` and `depthBuffer`. Dropping
    /// them returns their textures to the pool.
    pub captures: Vec<Image>,
}

struct Capture {
    location: i32,
    descriptor: TextureDescriptor,
    texture: GlName,
}

/// Acquire viewport-sized textures for the framebuffer copies `program`
/// asks for.
fn plan_captures(
    driver: &dyn Driver,
    ctx: ContextId,
    program: &LinkedProgram,
    bindings: &[(String, UniformValue)],
    textures: &TexturePool,
) -> Vec<Capture> {
    let explicit_color = bindings.iter().any(|(name, value)| {
        name == COLOR_BUFFER_UNIFORM && matches!(value, UniformValue::Image(_))
    });
    let color = program
        .location(COLOR_BUFFER_UNIFORM)
        .filter(|_| !explicit_color);
    let depth = program.location(DEPTH_BUFFER_UNIFORM);
    if color.is_none() && depth.is_none() {
        return Vec::new();
    }
    let (width, height) = driver.viewport_size(ctx);
    if width == 0 || height == 0 {
        log::warn!("Viewport is empty; not capturing the framebuffer");
        return Vec::new();
    }
    let requests = [
        (color, gl::RGBA, gl::BGRA),
        (depth, gl::DEPTH_COMPONENT16, gl::DEPTH_COMPONENT),
    ];
    let mut captures = Vec::new();
    for (location, internal_format, format) in requests {
        let Some(location) = location else {
            continue;
        };
        let descriptor = TextureDescriptor::texture_2d(internal_format, width, height);
        let texture = textures.acquire(ctx, TextureAllocation::Allocate, descriptor, format);
        if texture == 0 {
            log::warn!("Couldn't capture the framebuffer ({descriptor})");
            continue;
        }
        captures.push(Capture {
            location,
            descriptor,
            texture,
        });
    }
    captures
}

struct Binder<'a> {
    driver: &'a dyn Driver,
    ctx: ContextId,
    next_unit: u32,
    bound: Vec<BoundUnit>,
}

impl Binder<'_> {
    fn bind_image(&mut self, image: Option<&Image>) -> i32 {
        let unit = self.next_unit;
        self.next_unit += 1;
        self.driver.active_texture(self.ctx, unit);
        match image {
            Some(image) => {
                self.driver.bind_texture(self.ctx, image.target(), image.texture());
                self.bound.push((unit, image.target()));
            }
            None => {
                self.driver.bind_texture(self.ctx, gl::TEXTURE_2D, 0);
                self.driver.bind_texture(self.ctx, gl::TEXTURE_RECTANGLE, 0);
            }
        }
        unit as i32
    }

    fn bind_texture_2d(&mut self, texture: u32) -> i32 {
        let unit = self.next_unit;
        self.next_unit += 1;
        self.driver.active_texture(self.ctx, unit);
        self.driver.bind_texture(self.ctx, gl::TEXTURE_2D, texture);
        self.bound.push((unit, gl::TEXTURE_2D));
        unit as i32
    }

    fn capture(&mut self, textures: &Arc<TexturePool>, capture: &Capture) -> Option<Image> {
        let unit = self.bind_texture_2d(capture.texture);
        self.driver.copy_framebuffer(
            self.ctx,
            &FramebufferCopy {
                texture: capture.texture,
                target: gl::TEXTURE_2D,
                internal_format: capture.descriptor.internal_format,
                width: capture.descriptor.width,
                height: capture.descriptor.height,
            },
        );
        self.upload(capture.location, UniformData::Ints(&[unit]));
        Image::pooled(textures, capture.texture, capture.descriptor)
    }

    fn upload(&self, location: i32, data: UniformData<'_>) {
        self.driver.upload_uniform(self.ctx, location, data);
    }

    fn floats(&self, location: i32, components: u8, values: &[f32]) {
        self.upload(location, UniformData::Floats { components, values });
    }

    fn matrices(&self, location: i32, dim: u8, values: &[f32]) {
        self.upload(location, UniformData::Matrices { dim, values });
    }

    fn value(&mut self, location: i32, value: &UniformValue) {
        match value {
            UniformValue::Bool(v) => self.upload(location, UniformData::Ints(&[i32::from(*v)])),
            UniformValue::Int(v) => self.upload(location, UniformData::Ints(&[*v])),
            UniformValue::Float(v) => self.floats(location, 1, &[*v]),
            UniformValue::Vec2(v) => self.floats(location, 2, &v.to_array()),
            UniformValue::Vec3(v) => self.floats(location, 3, &v.to_array()),
            UniformValue::Vec4(v) => self.floats(location, 4, &v.to_array()),
            UniformValue::Color(c) => self.floats(location, 4, &c.premultiplied().to_array()),
            UniformValue::Mat2(m) => self.matrices(location, 2, &m.to_cols_array()),
            UniformValue::Mat3(m) => self.matrices(location, 3, &m.to_cols_array()),
            UniformValue::Mat4(m) => self.matrices(location, 4, &m.to_cols_array()),
            UniformValue::Image(image) => {
                let unit = self.bind_image(image.as_ref());
                self.upload(location, UniformData::Ints(&[unit]));
            }
            UniformValue::IntList(v) => self.upload(location, UniformData::Ints(v)),
            UniformValue::FloatList(v) => self.floats(location, 1, v),
            UniformValue::Vec2List(v) => self.floats(location, 2, bytemuck::cast_slice(v)),
            UniformValue::Vec3List(v) => self.floats(location, 3, bytemuck::cast_slice(v)),
            UniformValue::Vec4List(v) => self.floats(location, 4, bytemuck::cast_slice(v)),
            UniformValue::ColorList(v) => {
                let premultiplied: Vec<glam::Vec4> = v.iter().map(|&c| c.premultiplied()).collect();
                self.floats(location, 4, bytemuck::cast_slice(&premultiplied));
            }
            UniformValue::ImageList(images) => {
                let units: Vec<i32> = images.iter().map(|i| self.bind_image(i.as_ref())).collect();
                self.upload(location, UniformData::Ints(&units));
            }
        }
    }
}

/// Upload `bindings` (in order) to `program`, which must be current on
/// `ctx`. Names the program doesn't use are skipped. An empty list
/// uploads only its `<name>Count` of 0.
/// Noise lookup textures follow on the next units if the program samples
/// them, then framebuffer copies taken from `textures`.
pub fn bind_uniforms(
    driver: &dyn Driver,
    ctx: ContextId,
    program: &LinkedProgram,
    bindings: &[(String, UniformValue)],
    noise: &NoiseTextures,
    textures: &Arc<TexturePool>,
) -> Bindings {
    // Creating the noise textures and acquiring capture textures binds on
    // the active unit, so both happen before any sampler is bound.
    let perlin = program.location(PERLIN_UNIFORM);
    let gradient = program.location(GRADIENT_UNIFORM);
    let noise_names = if perlin.is_some() || gradient.is_some() {
        noise.get(ctx)
    } else {
        None
    };
    let pending = plan_captures(driver, ctx, program, bindings, textures);

    let mut binder = Binder {
        driver,
        ctx,
        next_unit: 0,
        bound: Vec::new(),
    };

    for (name, value) in bindings {
        let Some(location) = program.location(name) else {
            continue;
        };
        let count = value.list_len();
        if count != Some(0) {
            binder.value(location, value);
        }
        if let Some(count) = count {
            if let Some(count_location) = program.location(&format!("{name}Count")) {
                binder.upload(count_location, UniformData::Ints(&[count as i32]));
            }
        }
    }

    if let Some(names) = noise_names {
        for (location, texture) in [(perlin, names.perlin), (gradient, names.gradient)] {
            if let Some(location) = location {
                let unit = binder.bind_texture_2d(texture);
                binder.upload(location, UniformData::Ints(&[unit]));
            }
        }
    }

    let captures = pending
        .iter()
        .filter_map(|capture| binder.capture(textures, capture))
        .collect();

    if binder.next_unit > 0 {
        driver.active_texture(ctx, 0);
    }
    Bindings {
        units: binder.bound,
        captures,
    }
}

/// Unbind `units` in order and select unit 0 again.
pub fn unbind_units(driver: &dyn Driver, ctx: ContextId, units: &[BoundUnit]) {
    if units.is_empty() {
        return;
    }
    for &(unit, target) in units {
        driver.active_texture(ctx, unit);
        driver.bind_texture(ctx, target, 0);
    }
    driver.active_texture(ctx, 0);
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use glam::{Mat2, Vec3};

    use super::*;
    use crate::driver::headless::{HeadlessDriver, UploadedValue};
    use crate::gpu::vram::{FixedPolicy, VramGuard, VramLimits, VramStats};
    use crate::shader::issues::DiagnosticFilter;
    use crate::shader::program_cache::{PrimitiveClass, ProgramCache, ProgramKey};
    use crate::shader::uniform::Color;
    use crate::shader::GENERATED_LINE_THRESHOLD;
    use crate::util::clock::ManualClock;

    struct Fixture {
        driver: Arc<HeadlessDriver>,
        ctx: ContextId,
        textures: Arc<TexturePool>,
        noise: NoiseTextures,
        programs: ProgramCache,
    }

    fn fixture() -> Fixture {
        let driver = Arc::new(HeadlessDriver::default());
        let ctx = driver.create_context(None).unwrap();
        let textures = Arc::new(TexturePool::new(
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
        let programs = ProgramCache::new(
            driver.clone(),
            DiagnosticFilter::new(Vec::new(), GENERATED_LINE_THRESHOLD),
            false,
        );
        Fixture {
            noise: NoiseTextures::new(textures.clone()),
            driver,
            ctx,
            textures,
            programs,
        }
    }

    impl Fixture {
        fn program(&self, fragment: &str) -> Arc<LinkedProgram> {
            let v = self
                .driver
                .compile_shader(self.ctx, gl::VERTEX_SHADER, "void main(){}")
                .name;
            let f = self
                .driver
                .compile_shader(self.ctx, gl::FRAGMENT_SHADER, fragment)
                .name;
            let key = ProgramKey {
                vertex: v,
                geometry: 0,
                fragment: f,
                class: PrimitiveClass::Triangles,
                expected_output_count: 1,
            };
            let program = self.programs.link(self.ctx, key, "test", None).unwrap();
            self.programs.use_program(self.ctx, program.name());
            program
        }

        fn image(&self) -> Image {
            let descriptor = TextureDescriptor::texture_2d(gl::RGBA8, 4, 4);
            let name = self.textures.acquire(
                self.ctx,
                TextureAllocation::Allocate,
                descriptor,
                0,
            );
            Image::pooled(&self.textures, name, descriptor).unwrap()
        }

        fn bind(&self, program: &LinkedProgram, bindings: &[(String, UniformValue)]) -> Bindings {
            bind_uniforms(
                self.driver.as_ref(),
                self.ctx,
                program,
                bindings,
                &self.noise,
                &self.textures,
            )
        }

        fn upload(&self, name: &str) -> UploadedValue {
            self.driver
                .uniform_uploads()
                .into_iter()
                .rev()
                .find(|u| u.name.as_deref() == Some(name))
                .unwrap()
                .value
        }
    }

    #[test]
    fn images_take_units_in_order_and_null_unbinds_both_targets() {
        let f = fixture();
        let program = f.program(
            "uniform sampler2D a;\nuniform sampler2D b;\nuniform sampler2D c;\nvoid main(){}",
        );
        let a = f.image();
        let c = f.image();
        let bindings = vec![
            ("a".to_owned(), UniformValue::from(a.clone())),
            ("b".to_owned(), UniformValue::Image(None)),
            ("c".to_owned(), UniformValue::from(c.clone())),
        ];
        let bound = f.bind(&program, &bindings).units;
        assert_eq!(bound, vec![(0, gl::TEXTURE_2D), (2, gl::TEXTURE_2D)]);
        assert_eq!(f.upload("a"), UploadedValue::Ints(vec![0]));
        assert_eq!(f.upload("b"), UploadedValue::Ints(vec![1]));
        assert_eq!(f.upload("c"), UploadedValue::Ints(vec![2]));
        assert_eq!(f.driver.bound_texture(f.ctx, 0, gl::TEXTURE_2D), a.texture());
        assert_eq!(f.driver.bound_texture(f.ctx, 2, gl::TEXTURE_2D), c.texture());
        let null_unit: Vec<_> = f
            .driver
            .bind_events()
            .into_iter()
            .filter(|e| e.unit == 1)
            .map(|e| (e.target, e.texture))
            .collect();
        assert_eq!(
            null_unit,
            vec![(gl::TEXTURE_2D, 0), (gl::TEXTURE_RECTANGLE, 0)]
        );

        unbind_units(f.driver.as_ref(), f.ctx, &bound);
        assert_eq!(f.driver.bound_texture(f.ctx, 0, gl::TEXTURE_2D), 0);
        assert_eq!(f.driver.bound_texture(f.ctx, 2, gl::TEXTURE_2D), 0);
    }

    const WEIGHTS: &str = "uniform float weights[4];\nuniform int weightsCount;\nvoid main(){}";

    #[test]
    fn undeclared_names_are_skipped_and_empty_lists_upload_only_count() {
        let f = fixture();
        let program = f.program(WEIGHTS);
        let bindings = vec![
            ("unused".to_owned(), UniformValue::Float(1.0)),
            ("weights".to_owned(), UniformValue::FloatList(Vec::new())),
        ];
        let _ = f.bind(&program, &bindings);
        let uploads = f.driver.uniform_uploads();
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].name.as_deref(), Some("weightsCount"));
        assert_eq!(uploads[0].value, UploadedValue::Ints(vec![0]));
    }

    #[test]
    fn emptied_list_resets_stale_count() {
        let f = fixture();
        let program = f.program(WEIGHTS);
        let full = vec![("weights".to_owned(), UniformValue::FloatList(vec![1.0, 2.0]))];
        let _ = f.bind(&program, &full);
        assert_eq!(f.upload("weightsCount"), UploadedValue::Ints(vec![2]));

        let empty = vec![("weights".to_owned(), UniformValue::FloatList(Vec::new()))];
        let _ = f.bind(&program, &empty);
        assert_eq!(f.upload("weightsCount"), UploadedValue::Ints(vec![0]));
        let weight_uploads = f
            .driver
            .uniform_uploads()
            .iter()
            .filter(|u| u.name.as_deref() == Some("weights"))
            .count();
        assert_eq!(weight_uploads, 1);
    }

    #[test]
    fn lists_upload_elements_and_count() {
        let f = fixture();
        let program = f.program(
            "uniform vec3 points[4];\nuniform int pointsCount;\n\
             uniform vec4 tint[2];\nvoid main(){}",
        );
        let bindings = vec![
            (
                "points".to_owned(),
                UniformValue::Vec3List(vec![Vec3::X, Vec3::Y]),
            ),
            (
                "tint".to_owned(),
                UniformValue::ColorList(vec![Color::new(1.0, 1.0, 1.0, 0.5)]),
            ),
        ];
        let _ = f.bind(&program, &bindings);
        assert_eq!(
            f.upload("points"),
            UploadedValue::Floats {
                components: 3,
                values: vec![1.0, 0.0, 0.0, 0.0, 1.0, 0.0],
            }
        );
        assert_eq!(f.upload("pointsCount"), UploadedValue::Ints(vec![2]));
        assert_eq!(
            f.upload("tint"),
            UploadedValue::Floats {
                components: 4,
                values: vec![0.5, 0.5, 0.5, 0.5],
            }
        );
    }

    #[test]
    fn scalars_and_matrices_upload_directly() {
        let f = fixture();
        let program = f.program(
            "uniform bool enabled;\nuniform mat2 basis;\nuniform vec4 color;\nvoid main(){}",
        );
        let bindings = vec![
            ("enabled".to_owned(), UniformValue::Bool(true)),
            ("basis".to_owned(), UniformValue::Mat2(Mat2::IDENTITY)),
            (
                "color".to_owned(),
                UniformValue::Color(Color::new(1.0, 0.0, 0.0, 0.25)),
            ),
        ];
        let _ = f.bind(&program, &bindings);
        assert_eq!(f.upload("enabled"), UploadedValue::Ints(vec![1]));
        assert_eq!(
            f.upload("basis"),
            UploadedValue::Matrices {
                dim: 2,
                values: vec![1.0, 0.0, 0.0, 1.0],
            }
        );
        assert_eq!(
            f.upload("color"),
            UploadedValue::Floats {
                components: 4,
                values: vec![0.25, 0.0, 0.0, 0.25],
            }
        );
    }

    #[test]
    fn noise_textures_follow_user_samplers() {
        let f = fixture();
        let program = f.program(
            "uniform sampler2D image;\nuniform sampler2D perlinTexture;\n\
             uniform sampler2D gradTexture;\nvoid main(){}",
        );
        let image = f.image();
        let image_name = image.texture();
        let bindings = vec![("image".to_owned(), UniformValue::from(image))];
        let bound = f.bind(&program, &bindings).units;
        assert_eq!(bound.len(), 3);
        assert_eq!(f.upload("perlinTexture"), UploadedValue::Ints(vec![1]));
        assert_eq!(f.upload("gradTexture"), UploadedValue::Ints(vec![2]));
        assert_eq!(f.driver.bound_texture(f.ctx, 0, gl::TEXTURE_2D), image_name);
        assert!(f.noise.is_created());
    }

    #[test]
    fn programs_without_noise_never_create_it() {
        let f = fixture();
        let program = f.program("uniform float x;\nvoid main(){}");
        let _ = f.bind(&program, &[]);
        assert!(!f.noise.is_created());
    }

    #[test]
    fn declared_buffers_capture_the_framebuffer_after_noise() {
        let f = fixture();
        f.driver.set_viewport(f.ctx, 64, 32);
        let program = f.program(
            "uniform sampler2D perlinTexture;\nuniform sampler2D colorBuffer;\n\
             uniform sampler2D depthBuffer;\nvoid main(){}",
        );
        let bindings = f.bind(&program, &[]);
        assert_eq!(bindings.units.len(), 3);
        assert_eq!(f.upload("perlinTexture"), UploadedValue::Ints(vec![0]));
        assert_eq!(f.upload("colorBuffer"), UploadedValue::Ints(vec![1]));
        assert_eq!(f.upload("depthBuffer"), UploadedValue::Ints(vec![2]));

        assert_eq!(bindings.captures.len(), 2);
        let (color, depth) = (&bindings.captures[0], &bindings.captures[1]);
        assert_eq!((color.internal_format(), color.width(), color.height()), (gl::RGBA, 64, 32));
        assert_eq!(depth.internal_format(), gl::DEPTH_COMPONENT16);
        assert_eq!(f.driver.bound_texture(f.ctx, 1, gl::TEXTURE_2D), color.texture());
        assert_eq!(f.driver.bound_texture(f.ctx, 2, gl::TEXTURE_2D), depth.texture());
        let copied: Vec<_> = f
            .driver
            .framebuffer_copies()
            .into_iter()
            .map(|(_, copy)| (copy.texture, copy.internal_format))
            .collect();
        assert_eq!(
            copied,
            vec![
                (color.texture(), gl::RGBA),
                (depth.texture(), gl::DEPTH_COMPONENT16),
            ]
        );

        let descriptor = color.descriptor();
        unbind_units(f.driver.as_ref(), f.ctx, &bindings.units);
        drop(bindings);
        assert_eq!(f.textures.idle_count(&descriptor), 1);
        assert_eq!(f.driver.bound_texture(f.ctx, 1, gl::TEXTURE_2D), 0);
    }

    #[test]
    fn explicit_color_buffer_image_skips_capture() {
        let f = fixture();
        let program = f.program("uniform sampler2D colorBuffer;\nvoid main(){}");
        let image = f.image();
        let bindings = vec![("colorBuffer".to_owned(), UniformValue::from(image.clone()))];
        let bound = f.bind(&program, &bindings);
        assert!(bound.captures.is_empty());
        assert_eq!(f.driver.stats().framebuffer_copies, 0);
        assert_eq!(f.driver.bound_texture(f.ctx, 0, gl::TEXTURE_2D), image.texture());
    }
}
