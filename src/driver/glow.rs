//! [`Driver`] over a real OpenGL context through `glow`.
//!
//! Window-system work (creating share-group contexts, making them
//! current, binding shared surfaces to textures) is platform specific and
//! lives behind [`GlPlatform`]. Everything else is plain GL.
//!
//! Two calls have no `glow` entry point and are reduced accordingly:
//! geometry topology comes from the stage's `layout` qualifiers, and
//! validation reports the program's current info log.

use std::num::NonZeroU32;
use std::sync::Arc;

use glow::HasContext;

use super::{
    ActiveUniform, ContextId, Driver, FramebufferCopy, GeometryTopology, GlEnum,
    GlName, LinkStatus, StageCompile, SurfaceId, TextureCopy, TextureStorage, UniformData,
};

/// Window-system half of [`GlowDriver`].
pub trait GlPlatform: Send + Sync {
    /// Create a context sharing objects with `share_with`.
    fn create_context(&self, share_with: Option<ContextId>) -> Option<ContextId>;
    /// Make `ctx` current on the calling thread, or clear the binding.
    fn make_current(&self, ctx: Option<ContextId>);
    /// Function table for `ctx`. Only called while `ctx` is current.
    fn gl(&self, ctx: ContextId) -> Option<&glow::Context>;
    /// Texture memory in megabytes, when the platform can report it.
    fn texture_memory_megabytes(&self, _ctx: ContextId) -> Option<u64> {
        None
    }
    /// Back the texture bound to `target` with `surface`.
    fn texture_from_surface(
        &self,
        _ctx: ContextId,
        _target: GlEnum,
        _internal_format: GlEnum,
        _width: u32,
        _height: u32,
        _surface: SurfaceId,
    ) -> bool {
        false
    }
}

fn texture(name: GlName) -> Option<glow::NativeTexture> {
    NonZeroU32::new(name).map(glow::NativeTexture)
}

fn buffer(name: GlName) -> Option<glow::NativeBuffer> {
    NonZeroU32::new(name).map(glow::NativeBuffer)
}

fn shader(name: GlName) -> Option<glow::NativeShader> {
    NonZeroU32::new(name).map(glow::NativeShader)
}

fn program(name: GlName) -> Option<glow::NativeProgram> {
    NonZeroU32::new(name).map(glow::NativeProgram)
}

fn is_depth(internal_format: GlEnum) -> bool {
    matches!(
        internal_format,
        glow::DEPTH_COMPONENT
            | glow::DEPTH_COMPONENT16
            | glow::DEPTH_COMPONENT24
            | glow::DEPTH_COMPONENT32F
    )
}

/// Resolve the multisampled read framebuffer into `copy.texture` through
/// a temporary draw framebuffer.
fn resolve_into(gl: &glow::Context, copy: &FramebufferCopy) {
    let (width, height) = (copy.width as i32, copy.height as i32);
    unsafe {
        gl.tex_image_2d(
            copy.target,
            0,
            copy.internal_format as i32,
            width,
            height,
            0,
            glow::BGRA,
            glow::UNSIGNED_BYTE,
            None,
        );
        let previous = gl.get_parameter_framebuffer(glow::DRAW_FRAMEBUFFER_BINDING);
        let resolved = match gl.create_framebuffer() {
            Ok(resolved) => resolved,
            Err(e) => {
                log::error!("glCreateFramebuffer failed: {e}");
                return;
            }
        };
        gl.bind_framebuffer(glow::DRAW_FRAMEBUFFER, Some(resolved));
        gl.framebuffer_texture_2d(
            glow::DRAW_FRAMEBUFFER,
            glow::COLOR_ATTACHMENT0,
            copy.target,
            texture(copy.texture),
            0,
        );
        gl.blit_framebuffer(
            0,
            0,
            width,
            height,
            0,
            0,
            width,
            height,
            glow::COLOR_BUFFER_BIT,
            glow::NEAREST,
        );
        gl.bind_framebuffer(glow::DRAW_FRAMEBUFFER, previous);
        gl.delete_framebuffer(resolved);
    }
}

/// OpenGL driver.
pub struct GlowDriver<P: GlPlatform> {
    platform: Arc<P>,
}

impl<P: GlPlatform> GlowDriver<P> {
    /// Drive GL through `platform`'s contexts.
    #[must_use]
    pub fn new(platform: Arc<P>) -> Self {
        Self { platform }
    }

    /// The platform layer.
    #[must_use]
    pub fn platform(&self) -> &Arc<P> {
        &self.platform
    }

    /// Run `f` on `ctx`'s function table, or return `fallback` if the
    /// platform has none.
    ///
    /// Every call in this module goes through here, on a context the
    /// caller holds current, with names this share group created.
    fn with_gl<R>(&self, ctx: ContextId, fallback: R, f: impl FnOnce(&glow::Context) -> R) -> R {
        match self.platform.gl(ctx) {
            Some(gl) => f(gl),
            None => {
                log::error!("No GL function table for {ctx}");
                fallback
            }
        }
    }
}

impl<P: GlPlatform> Driver for GlowDriver<P> {
    fn create_context(&self, share_with: Option<ContextId>) -> Option<ContextId> {
        self.platform.create_context(share_with)
    }

    fn make_current(&self, ctx: Option<ContextId>) {
        self.platform.make_current(ctx);
    }

    fn flush(&self, ctx: ContextId) {
        self.with_gl(ctx, (), |gl| unsafe { gl.flush() });
    }

    fn renderer(&self, ctx: ContextId) -> String {
        self.with_gl(ctx, String::new(), |gl| unsafe {
            gl.get_parameter_string(glow::RENDERER)
        })
    }

    fn texture_memory_megabytes(&self, ctx: ContextId) -> Option<u64> {
        self.platform.texture_memory_megabytes(ctx)
    }

    fn max_texture_size(&self, ctx: ContextId) -> u32 {
        self.with_gl(ctx, 0, |gl| unsafe {
            gl.get_parameter_i32(glow::MAX_TEXTURE_SIZE).max(0) as u32
        })
    }

    fn create_buffer(&self, ctx: ContextId, target: GlEnum, size: usize) -> GlName {
        self.with_gl(ctx, 0, |gl| unsafe {
            match gl.create_buffer() {
                Ok(created) => {
                    gl.bind_buffer(target, Some(created));
                    gl.buffer_data_size(target, size as i32, glow::STREAM_DRAW);
                    gl.bind_buffer(target, None);
                    created.0.get()
                }
                Err(e) => {
                    log::error!("glCreateBuffer failed: {e}");
                    0
                }
            }
        })
    }

    fn delete_buffer(&self, ctx: ContextId, name: GlName) {
        if let Some(name) = buffer(name) {
            self.with_gl(ctx, (), |gl| unsafe { gl.delete_buffer(name) });
        }
    }

    fn create_texture(&self, ctx: ContextId) -> GlName {
        self.with_gl(ctx, 0, |gl| unsafe {
            gl.create_texture().map_or_else(
                |e| {
                    log::error!("glCreateTexture failed: {e}");
                    0
                },
                |created| created.0.get(),
            )
        })
    }

    fn bind_texture(&self, ctx: ContextId, target: GlEnum, name: GlName) {
        self.with_gl(ctx, (), |gl| unsafe { gl.bind_texture(target, texture(name)) });
    }

    fn active_texture(&self, ctx: ContextId, unit: u32) {
        self.with_gl(ctx, (), |gl| unsafe { gl.active_texture(glow::TEXTURE0 + unit) });
    }

    fn texture_image(&self, ctx: ContextId, storage: &TextureStorage<'_>) {
        self.with_gl(ctx, (), |gl| unsafe {
            gl.tex_image_2d(
                storage.target,
                0,
                storage.internal_format as i32,
                storage.width as i32,
                storage.height as i32,
                0,
                storage.format,
                storage.component_type,
                storage.pixels,
            );
        });
    }

    fn texture_parameter(&self, ctx: ContextId, target: GlEnum, pname: GlEnum, value: i32) {
        self.with_gl(ctx, (), |gl| unsafe { gl.tex_parameter_i32(target, pname, value) });
    }

    fn texture_from_surface(
        &self,
        ctx: ContextId,
        target: GlEnum,
        internal_format: GlEnum,
        width: u32,
        height: u32,
        surface: SurfaceId,
    ) -> bool {
        self.platform
            .texture_from_surface(ctx, target, internal_format, width, height, surface)
    }

    fn delete_textures(&self, ctx: ContextId, names: &[GlName]) {
        self.with_gl(ctx, (), |gl| {
            for name in names.iter().filter_map(|&n| texture(n)) {
                unsafe { gl.delete_texture(name) };
            }
        });
    }

    fn viewport_size(&self, ctx: ContextId) -> (u32, u32) {
        self.with_gl(ctx, (0, 0), |gl| unsafe {
            let mut viewport = [0_i32; 4];
            gl.get_parameter_i32_slice(glow::VIEWPORT, &mut viewport);
            (viewport[2].max(0) as u32, viewport[3].max(0) as u32)
        })
    }

    fn copy_framebuffer(&self, ctx: ContextId, copy: &FramebufferCopy) {
        self.with_gl(ctx, (), |gl| unsafe {
            if !is_depth(copy.internal_format) && gl.get_parameter_i32(glow::SAMPLES) > 0 {
                resolve_into(gl, copy);
            } else {
                gl.copy_tex_image_2d(
                    copy.target,
                    0,
                    copy.internal_format,
                    0,
                    0,
                    copy.width as i32,
                    copy.height as i32,
                    0,
                );
            }
        });
    }

    fn copy_texture(&self, ctx: ContextId, copy: &TextureCopy) {
        self.with_gl(ctx, (), |gl| unsafe {
            let previous = gl.get_parameter_framebuffer(glow::READ_FRAMEBUFFER_BINDING);
            let source = match gl.create_framebuffer() {
                Ok(source) => source,
                Err(e) => {
                    log::error!("glCreateFramebuffer failed: {e}");
                    return;
                }
            };
            gl.bind_framebuffer(glow::READ_FRAMEBUFFER, Some(source));
            gl.framebuffer_texture_2d(
                glow::READ_FRAMEBUFFER,
                glow::COLOR_ATTACHMENT0,
                copy.source_target,
                texture(copy.source),
                0,
            );
            gl.bind_texture(copy.destination_target, texture(copy.destination));
            gl.copy_tex_sub_image_2d(
                copy.destination_target,
                0,
                0,
                0,
                0,
                0,
                copy.width as i32,
                copy.height as i32,
            );
            gl.bind_texture(copy.destination_target, None);
            gl.bind_framebuffer(glow::READ_FRAMEBUFFER, previous);
            gl.delete_framebuffer(source);
        });
    }

    fn compile_shader(&self, ctx: ContextId, stage: GlEnum, source: &str) -> StageCompile {
        let failed = |log: String| StageCompile {
            name: 0,
            compiled: false,
            log,
        };
        self.with_gl(ctx, failed(String::new()), |gl| unsafe {
            let created = match gl.create_shader(stage) {
                Ok(created) => created,
                Err(e) => return failed(e),
            };
            gl.shader_source(created, source);
            gl.compile_shader(created);
            StageCompile {
                name: created.0.get(),
                compiled: gl.get_shader_compile_status(created),
                log: gl.get_shader_info_log(created),
            }
        })
    }

    fn delete_shader(&self, ctx: ContextId, name: GlName) {
        if let Some(name) = shader(name) {
            self.with_gl(ctx, (), |gl| unsafe { gl.delete_shader(name) });
        }
    }

    fn create_program(&self, ctx: ContextId) -> GlName {
        self.with_gl(ctx, 0, |gl| unsafe {
            gl.create_program().map_or_else(
                |e| {
                    log::error!("glCreateProgram failed: {e}");
                    0
                },
                |created| created.0.get(),
            )
        })
    }

    fn attach_shader(&self, ctx: ContextId, target: GlName, stage: GlName) {
        if let (Some(target), Some(stage)) = (program(target), shader(stage)) {
            self.with_gl(ctx, (), |gl| unsafe { gl.attach_shader(target, stage) });
        }
    }

    fn bind_attrib_location(&self, ctx: ContextId, target: GlName, index: u32, name: &str) {
        if let Some(target) = program(target) {
            self.with_gl(ctx, (), |gl| unsafe { gl.bind_attrib_location(target, index, name) });
        }
    }

    fn geometry_topology(&self, _ctx: ContextId, target: GlName, topology: GeometryTopology) {
        log::trace!(
            "Program {target}: geometry topology {:#x} -> {:#x} ({} vertices) \
             is taken from the stage's layout qualifiers",
            topology.input,
            topology.output,
            topology.max_vertices
        );
    }

    fn transform_feedback_varyings(&self, ctx: ContextId, target: GlName, varyings: &[&str]) {
        if let Some(target) = program(target) {
            self.with_gl(ctx, (), |gl| unsafe {
                gl.transform_feedback_varyings(target, varyings, glow::INTERLEAVED_ATTRIBS);
            });
        }
    }

    fn link_program(&self, ctx: ContextId, target: GlName) -> LinkStatus {
        let missing = LinkStatus {
            ok: false,
            log: format!("program {target} does not exist"),
        };
        let Some(linked) = program(target) else {
            return missing;
        };
        self.with_gl(ctx, missing, |gl| unsafe {
            gl.link_program(linked);
            LinkStatus {
                ok: gl.get_program_link_status(linked),
                log: gl.get_program_info_log(linked),
            }
        })
    }

    fn validate_program(&self, ctx: ContextId, target: GlName) -> LinkStatus {
        let Some(linked) = program(target) else {
            return LinkStatus {
                ok: false,
                log: format!("program {target} does not exist"),
            };
        };
        self.with_gl(
            ctx,
            LinkStatus {
                ok: false,
                log: String::new(),
            },
            |gl| unsafe {
                LinkStatus {
                    ok: gl.get_program_link_status(linked),
                    log: gl.get_program_info_log(linked),
                }
            },
        )
    }

    fn delete_program(&self, ctx: ContextId, target: GlName) {
        if let Some(target) = program(target) {
            self.with_gl(ctx, (), |gl| unsafe { gl.delete_program(target) });
        }
    }

    fn active_uniforms(&self, ctx: ContextId, target: GlName) -> Vec<ActiveUniform> {
        let Some(linked) = program(target) else {
            return Vec::new();
        };
        self.with_gl(ctx, Vec::new(), |gl| unsafe {
            (0..gl.get_active_uniforms(linked))
                .filter_map(|index| gl.get_active_uniform(linked, index))
                .map(|uniform| ActiveUniform {
                    name: uniform.name,
                    size: uniform.size.max(1) as u32,
                })
                .collect()
        })
    }

    fn uniform_location(&self, ctx: ContextId, target: GlName, name: &str) -> Option<i32> {
        let linked = program(target)?;
        self.with_gl(ctx, None, |gl| unsafe {
            gl.get_uniform_location(linked, name)
                .map(|location| location.0 as i32)
        })
    }

    fn attrib_location(&self, ctx: ContextId, target: GlName, name: &str) -> Option<i32> {
        let linked = program(target)?;
        self.with_gl(ctx, None, |gl| unsafe {
            gl.get_attrib_location(linked, name)
                .map(|location| location as i32)
        })
    }

    fn use_program(&self, ctx: ContextId, target: GlName) {
        self.with_gl(ctx, (), |gl| unsafe { gl.use_program(program(target)) });
    }

    fn upload_uniform(&self, ctx: ContextId, location: i32, data: UniformData<'_>) {
        if location < 0 {
            return;
        }
        let location = glow::NativeUniformLocation(location as u32);
        let at = Some(&location);
        self.with_gl(ctx, (), |gl| unsafe {
            match data {
                UniformData::Ints(values) => gl.uniform_1_i32_slice(at, values),
                UniformData::Floats { components, values } => match components {
                    1 => gl.uniform_1_f32_slice(at, values),
                    2 => gl.uniform_2_f32_slice(at, values),
                    3 => gl.uniform_3_f32_slice(at, values),
                    4 => gl.uniform_4_f32_slice(at, values),
                    other => log::error!("Can't upload a {other}-component float uniform"),
                },
                UniformData::Matrices { dim, values } => match dim {
                    2 => gl.uniform_matrix_2_f32_slice(at, false, values),
                    3 => gl.uniform_matrix_3_f32_slice(at, false, values),
                    4 => gl.uniform_matrix_4_f32_slice(at, false, values),
                    other => log::error!("Can't upload a {other}x{other} matrix uniform"),
                },
            }
        });
    }
}
