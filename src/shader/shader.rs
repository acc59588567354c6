//! Named shaders with per-primitive subshaders and a uniform list.
//!
//! A [`Shader`] holds up to three subshaders (points, lines, triangles).
//! Each one moves through
//!
//! ```text
//! SourceOnly ──compile──► Compiled ──link──► Linked
//!      │                      │
//!      └───────── failure ────┴─────────────► Failed
//! ```
//!
//! under the shader's lock. Changing a subshader's source or its expected
//! output count puts it back to `SourceOnly`; nothing else retries a
//! failed subshader. Compiled stages and linked programs live in the
//! runtime's caches, so dropping a shader deletes nothing.

use std::fmt::Write as _;
use std::sync::{Arc, Mutex, MutexGuard};

use super::binding::{bind_uniforms, unbind_units, Bindings, BoundUnit};
use super::issues::Issues;
use super::program_cache::{LinkedProgram, PrimitiveClass, ProgramKey};
use super::source::{glsl_source, StageKind, DEFAULT_VERTEX_SOURCE};
use super::uniform::{Color, UniformValue};
use crate::driver::{ContextId, GlName};
use crate::image::Image;
use crate::runtime::GpuRuntime;
use crate::util::sync::lock;

const COLOR_FRAGMENT: &str = "\
uniform vec4 color;
void main()
{
    gl_FragColor = color;
}
";

const IMAGE_FRAGMENT: &str = "\
varying vec2 fragmentTextureCoordinate;
uniform sampler2D texture;
uniform float alpha;
void main()
{
    gl_FragColor = texture2D(texture, fragmentTextureCoordinate) * alpha;
}
";

/// How vertices are assembled into primitives at draw time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssemblyMode {
    /// Every three vertices form a triangle.
    IndividualTriangles,
    /// Triangle strip.
    TriangleStrip,
    /// Triangle fan.
    TriangleFan,
    /// Every two vertices form a line.
    IndividualLines,
    /// Line strip.
    LineStrip,
    /// Points.
    Points,
}

impl AssemblyMode {
    /// The subshader class that draws this mode.
    #[must_use]
    pub fn class(self) -> PrimitiveClass {
        match self {
            Self::IndividualTriangles | Self::TriangleStrip | Self::TriangleFan => {
                PrimitiveClass::Triangles
            }
            Self::IndividualLines | Self::LineStrip => PrimitiveClass::Lines,
            Self::Points => PrimitiveClass::Points,
        }
    }
}

/// Vertex attribute locations of a linked subshader.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AttributeLocations {
    /// `position` (always 0 when present).
    pub position: Option<i32>,
    /// `normal`.
    pub normal: Option<i32>,
    /// `tangent`.
    pub tangent: Option<i32>,
    /// `bitangent`.
    pub bitangent: Option<i32>,
    /// `textureCoordinate`.
    pub texture_coordinate: Option<i32>,
}

#[derive(Debug, Clone)]
enum SubshaderState {
    SourceOnly,
    Compiled(ProgramKey),
    Linked(Arc<LinkedProgram>),
    Failed,
}

#[derive(Debug, Clone)]
struct Subshader {
    vertex: String,
    geometry: Option<String>,
    fragment: Option<String>,
    expected_output_count: u32,
    may_change_output_count: bool,
    state: SubshaderState,
}

impl Subshader {
    fn stages(&self) -> String {
        let mut stages = String::from("vertex");
        if self.geometry.is_some() {
            stages.push_str("+geometry");
        }
        if self.fragment.is_some() {
            stages.push_str("+fragment");
        }
        stages
    }
}

#[derive(Debug, Default)]
struct ShaderState {
    subshaders: [Option<Subshader>; 3],
    uniforms: Vec<(String, UniformValue)>,
}

impl ShaderState {
    fn subshader(&self, class: PrimitiveClass) -> Option<&Subshader> {
        self.subshaders[class.index()].as_ref()
    }

    fn subshader_mut(&mut self, class: PrimitiveClass) -> Option<&mut Subshader> {
        self.subshaders[class.index()].as_mut()
    }
}

/// A named set of subshaders plus the uniforms to bind when drawing.
///
/// Share a shader between owners with `Arc<Shader>`; all methods take
/// `&self`.
#[derive(Debug)]
pub struct Shader {
    name: String,
    state: Mutex<ShaderState>,
}

impl Shader {
    /// An empty shader. `name` appears in logs and summaries.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            state: Mutex::new(ShaderState::default()),
        }
    }

    /// An unlit shader filling every primitive class with `color`.
    #[must_use]
    pub fn color(color: Color) -> Self {
        let shader = Self::new("Color Shader");
        shader.add_fragment_everywhere(&glsl_source(120, COLOR_FRAGMENT));
        shader.set_uniform("color", color);
        shader
    }

    /// An unlit shader texturing every primitive class with `image`, its
    /// premultiplied color scaled by `alpha`.
    #[must_use]
    pub fn image(image: Image, alpha: f32) -> Self {
        let shader = Self::new("Image Shader");
        shader.add_fragment_everywhere(&glsl_source(120, IMAGE_FRAGMENT));
        shader.set_uniform("texture", image);
        shader.set_uniform("alpha", alpha);
        shader
    }

    fn add_fragment_everywhere(&self, fragment: &str) {
        for class in PrimitiveClass::ALL {
            self.add_source(class, None, None, Some(fragment));
        }
    }

    /// The shader's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Set the sources used to draw `class` primitives.
    ///
    /// A missing vertex source selects [`DEFAULT_VERTEX_SOURCE`]. A
    /// missing fragment source makes the subshader a transform-feedback
    /// one. The output-count parameters carry over from a previous
    /// registration.
    pub fn add_source(
        &self,
        class: PrimitiveClass,
        vertex: Option<&str>,
        geometry: Option<&str>,
        fragment: Option<&str>,
    ) {
        let mut state = lock(&self.state);
        let slot = &mut state.subshaders[class.index()];
        let (expected_output_count, may_change_output_count) = slot
            .as_ref()
            .map_or((1, false), |s| (s.expected_output_count, s.may_change_output_count));
        *slot = Some(Subshader {
            vertex: vertex.unwrap_or(DEFAULT_VERTEX_SOURCE).to_owned(),
            geometry: geometry.map(str::to_owned),
            fragment: fragment.map(str::to_owned),
            expected_output_count,
            may_change_output_count,
            state: SubshaderState::SourceOnly,
        });
    }

    /// Whether a subshader exists for `class`.
    #[must_use]
    pub fn has_source(&self, class: PrimitiveClass) -> bool {
        lock(&self.state).subshader(class).is_some()
    }

    /// Set how many primitives the geometry stage emits per input
    /// primitive. Ignored when no subshader exists for `class`.
    pub fn set_expected_output_count(&self, class: PrimitiveClass, count: u32) {
        let mut state = lock(&self.state);
        match state.subshader_mut(class) {
            Some(sub) if sub.expected_output_count != count => {
                sub.expected_output_count = count;
                sub.state = SubshaderState::SourceOnly;
            }
            Some(_) => {}
            None => log::error!(
                "Shader '{}' has no {class} subshader to set an output count on",
                self.name
            ),
        }
    }

    /// Expected output primitive count for `class` (1 if unset).
    #[must_use]
    pub fn expected_output_count(&self, class: PrimitiveClass) -> u32 {
        lock(&self.state)
            .subshader(class)
            .map_or(1, |s| s.expected_output_count)
    }

    /// Mark whether the geometry stage may emit a varying number of
    /// primitives (so callers must query the emitted count).
    pub fn set_may_change_output_count(&self, class: PrimitiveClass, may_change: bool) {
        if let Some(sub) = lock(&self.state).subshader_mut(class) {
            sub.may_change_output_count = may_change;
        }
    }

    /// See [`set_may_change_output_count`](Self::set_may_change_output_count).
    #[must_use]
    pub fn may_change_output_count(&self, class: PrimitiveClass) -> bool {
        lock(&self.state)
            .subshader(class)
            .is_some_and(|s| s.may_change_output_count)
    }

    /// Whether drawing with `mode` captures transform feedback (the
    /// subshader has no fragment stage).
    #[must_use]
    pub fn is_transform_feedback(&self, mode: AssemblyMode) -> bool {
        lock(&self.state)
            .subshader(mode.class())
            .is_some_and(|s| s.fragment.is_none())
    }

    /// Bind `value` to `name`, replacing an earlier binding in place.
    pub fn set_uniform(&self, name: &str, value: impl Into<UniformValue>) {
        let value = value.into();
        let mut state = lock(&self.state);
        match state.uniforms.iter_mut().find(|(n, _)| n == name) {
            Some((_, existing)) => *existing = value,
            None => state.uniforms.push((name.to_owned(), value)),
        }
    }

    /// The value bound to `name`.
    #[must_use]
    pub fn uniform(&self, name: &str) -> Option<UniformValue> {
        lock(&self.state)
            .uniforms
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.clone())
    }

    /// The image bound to `name`, if it is a non-null image binding.
    #[must_use]
    pub fn image_uniform(&self, name: &str) -> Option<Image> {
        match self.uniform(name)? {
            UniformValue::Image(image) => image,
            _ => None,
        }
    }

    /// Compile and link the subshader for `mode` now.
    ///
    /// With a collector, stages are compiled fresh so every diagnostic is
    /// reported, even for a subshader that failed before. Returns whether
    /// the subshader is linked.
    pub fn upload(
        &self,
        runtime: &GpuRuntime,
        mode: AssemblyMode,
        ctx: ContextId,
        issues: Option<&mut Issues>,
    ) -> bool {
        let mut state = lock(&self.state);
        self.program(&mut state, runtime, mode.class(), ctx, issues)
            .is_some()
    }

    /// Attribute locations of the linked subshader for `mode`.
    #[must_use]
    pub fn attribute_locations(
        &self,
        runtime: &GpuRuntime,
        mode: AssemblyMode,
        ctx: ContextId,
    ) -> Option<AttributeLocations> {
        let mut state = lock(&self.state);
        let program = self.program(&mut state, runtime, mode.class(), ctx, None)?;
        let driver = runtime.driver();
        let find = |name: &str| driver.attrib_location(ctx, program.name(), name);
        Some(AttributeLocations {
            position: find("position"),
            normal: find("normal"),
            tangent: find("tangent"),
            bitangent: find("bitangent"),
            texture_coordinate: find("textureCoordinate"),
        })
    }

    /// Make the subshader for `mode` current on `ctx` and bind every
    /// uniform.
    ///
    /// The returned guard keeps the shader locked until it is dropped or
    /// [`deactivated`](ActiveShader::deactivate); activating the same
    /// shader again on this thread before then deadlocks. `None` when the
    /// subshader is missing or fails to build.
    #[must_use]
    pub fn activate<'a>(
        &'a self,
        runtime: &'a GpuRuntime,
        mode: AssemblyMode,
        ctx: ContextId,
    ) -> Option<ActiveShader<'a>> {
        let mut state = lock(&self.state);
        let program = self.program(&mut state, runtime, mode.class(), ctx, None)?;
        runtime.programs().use_program(ctx, program.name());
        let bindings = bind_uniforms(
            runtime.driver().as_ref(),
            ctx,
            &program,
            &state.uniforms,
            runtime.noise(),
            runtime.textures(),
        );
        Some(ActiveShader {
            _state: state,
            runtime,
            ctx,
            program,
            bindings,
        })
    }

    /// Human-readable description of subshaders and uniforms.
    #[must_use]
    pub fn summary(&self) -> String {
        let state = lock(&self.state);
        let mut out = format!("shader '{}'\n", self.name);
        for class in PrimitiveClass::ALL {
            let Some(sub) = state.subshader(class) else {
                continue;
            };
            let status = match &sub.state {
                SubshaderState::SourceOnly => "source only".to_owned(),
                SubshaderState::Compiled(_) => "compiled".to_owned(),
                SubshaderState::Linked(program) => format!("linked (program {})", program.name()),
                SubshaderState::Failed => "failed".to_owned(),
            };
            let feedback = if sub.fragment.is_none() {
                " (transform feedback)"
            } else {
                ""
            };
            let _ = writeln!(
                out,
                "  {class}: {}{feedback}, {} output(s){}, {status}",
                sub.stages(),
                sub.expected_output_count,
                if sub.may_change_output_count { " or fewer" } else { "" },
            );
        }
        if !state.uniforms.is_empty() {
            let uniforms: Vec<String> = state
                .uniforms
                .iter()
                .map(|(name, value)| format!("{name} ({})", value.type_name()))
                .collect();
            let _ = writeln!(out, "  uniforms: {}", uniforms.join(", "));
        }
        out
    }

    /// Drive the subshader for `class` to `Linked` (or `Failed`).
    fn program(
        &self,
        state: &mut ShaderState,
        runtime: &GpuRuntime,
        class: PrimitiveClass,
        ctx: ContextId,
        mut issues: Option<&mut Issues>,
    ) -> Option<Arc<LinkedProgram>> {
        let Some(sub) = state.subshader_mut(class) else {
            log::error!("Shader '{}' has no {class} subshader", self.name);
            return None;
        };

        let compiled = match &sub.state {
            SubshaderState::Linked(program) => return Some(Arc::clone(program)),
            SubshaderState::Failed if issues.is_none() => return None,
            SubshaderState::Compiled(key) if issues.is_none() => Some(*key),
            _ => None,
        };
        let key = match compiled {
            Some(key) => key,
            None => {
                let Some(key) = compile_stages(runtime, ctx, class, sub, issues.as_deref_mut())
                else {
                    log::debug!("Shader '{}' ({class}) failed to compile", self.name);
                    sub.state = SubshaderState::Failed;
                    return None;
                };
                sub.state = SubshaderState::Compiled(key);
                key
            }
        };

        let label = format!("{} ({class})", self.name);
        match runtime.programs().link(ctx, key, &label, issues) {
            Some(program) => {
                sub.state = SubshaderState::Linked(Arc::clone(&program));
                Some(program)
            }
            None => {
                sub.state = SubshaderState::Failed;
                None
            }
        }
    }
}

fn compile_stages(
    runtime: &GpuRuntime,
    ctx: ContextId,
    class: PrimitiveClass,
    sub: &Subshader,
    mut issues: Option<&mut Issues>,
) -> Option<ProgramKey> {
    let cache = runtime.shaders();
    let mut compile = |stage: StageKind, source: Option<&str>| -> Option<GlName> {
        match source {
            None => Some(0),
            Some(source) => {
                let name = cache.compile(ctx, stage, source, issues.as_deref_mut());
                (name != 0).then_some(name)
            }
        }
    };
    let vertex = compile(StageKind::Vertex, Some(&sub.vertex));
    let geometry = compile(StageKind::Geometry, sub.geometry.as_deref());
    let fragment = compile(StageKind::Fragment, sub.fragment.as_deref());
    Some(ProgramKey {
        vertex: vertex?,
        geometry: geometry?,
        fragment: fragment?,
        class,
        expected_output_count: sub.expected_output_count,
    })
}

/// A shader made current by [`Shader::activate`].
///
/// Holds the shader's lock. Dropping it (or calling
/// [`deactivate`](Self::deactivate)) unbinds the texture units the
/// activation bound, in the order it bound them, then returns any
/// framebuffer copies to the texture pool.
pub struct ActiveShader<'a> {
    _state: MutexGuard<'a, ShaderState>,
    runtime: &'a GpuRuntime,
    ctx: ContextId,
    program: Arc<LinkedProgram>,
    bindings: Bindings,
}

impl ActiveShader<'_> {
    /// The current program.
    #[must_use]
    pub fn program(&self) -> &LinkedProgram {
        &self.program
    }

    /// Texture units bound for this activation.
    #[must_use]
    pub fn bound_units(&self) -> &[BoundUnit] {
        &self.bindings.units
    }

    /// Framebuffer copies bound to `colorBuffer` and `depthBuffer`.
    #[must_use]
    pub fn framebuffer_captures(&self) -> &[Image] {
        &self.bindings.captures
    }

    /// Unbind textures and release the shader.
    pub fn deactivate(self) {
        drop(self);
    }
}

impl Drop for ActiveShader<'_> {
    fn drop(&mut self) {
        unbind_units(self.runtime.driver().as_ref(), self.ctx, &self.bindings.units);
        self.bindings.captures.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::headless::HeadlessDriver;
    use crate::driver::{gl, Driver};
    use crate::pool::TextureDescriptor;
    use crate::shader::issues::Severity;

    const FRAGMENT: &str = "uniform sampler2D image;\nuniform vec4 tint;\nvoid main(){}";

    fn runtime() -> (Arc<HeadlessDriver>, GpuRuntime, ContextId) {
        let driver = Arc::new(HeadlessDriver::default());
        let runtime = GpuRuntime::builder(driver.clone(), driver.clone())
            .background_sweep(false)
            .build()
            .unwrap();
        let ctx = driver.create_context(None).unwrap();
        (driver, runtime, ctx)
    }

    #[test]
    fn vertex_only_subshader_is_transform_feedback() {
        let (_driver, runtime, ctx) = runtime();
        let shader = Shader::new("capture");
        shader.add_source(PrimitiveClass::Triangles, Some("void main(){}"), None, None);
        assert!(shader.is_transform_feedback(AssemblyMode::IndividualTriangles));
        assert!(!shader.is_transform_feedback(AssemblyMode::Points));
        assert!(shader.upload(&runtime, AssemblyMode::TriangleStrip, ctx, None));
        let active = shader
            .activate(&runtime, AssemblyMode::TriangleFan, ctx)
            .unwrap();
        assert!(active.program().is_transform_feedback());

        let drawn = Shader::new("drawn");
        drawn.add_source(PrimitiveClass::Triangles, None, None, Some(FRAGMENT));
        assert!(!drawn.is_transform_feedback(AssemblyMode::IndividualTriangles));
    }

    #[test]
    fn missing_vertex_source_uses_default() {
        let (driver, runtime, ctx) = runtime();
        let shader = Shader::new("default vertex");
        shader.add_source(PrimitiveClass::Triangles, None, None, Some(FRAGMENT));
        let locations = shader
            .attribute_locations(&runtime, AssemblyMode::IndividualTriangles, ctx)
            .unwrap();
        assert_eq!(locations.position, Some(0));
        assert!(locations.texture_coordinate.is_some());
        assert_eq!(locations.normal, None);
        assert!(driver.stats().shaders_compiled >= 2);
    }

    #[test]
    fn activation_binds_uniforms_and_deactivation_unbinds() {
        let (driver, runtime, ctx) = runtime();
        let shader = Shader::new("tinted");
        shader.add_source(PrimitiveClass::Triangles, None, None, Some(FRAGMENT));

        let descriptor = TextureDescriptor::texture_2d(gl::RGBA8, 8, 8);
        let name = runtime.textures().acquire(
            ctx,
            crate::pool::TextureAllocation::Allocate,
            descriptor,
            0,
        );
        let image = Image::pooled(runtime.textures(), name, descriptor).unwrap();
        shader.set_uniform("image", image);
        shader.set_uniform("tint", glam::Vec4::ONE);
        shader.set_uniform("unused", 3);

        let active = shader
            .activate(&runtime, AssemblyMode::IndividualTriangles, ctx)
            .unwrap();
        assert_eq!(active.bound_units(), &[(0, gl::TEXTURE_2D)]);
        assert_eq!(driver.bound_texture(ctx, 0, gl::TEXTURE_2D), name);
        assert_eq!(driver.current_program(ctx), active.program().name());
        active.deactivate();
        assert_eq!(driver.bound_texture(ctx, 0, gl::TEXTURE_2D), 0);

        // The lock was released: activation works again.
        assert!(shader
            .activate(&runtime, AssemblyMode::IndividualTriangles, ctx)
            .is_some());
    }

    #[test]
    fn framebuffer_captures_return_to_pool_on_deactivation() {
        let (driver, runtime, ctx) = runtime();
        driver.set_viewport(ctx, 40, 30);
        let shader = Shader::new("feedback");
        shader.add_source(
            PrimitiveClass::Triangles,
            None,
            None,
            Some("uniform sampler2D colorBuffer;\nuniform sampler2D depthBuffer;\nvoid main(){}"),
        );
        let active = shader
            .activate(&runtime, AssemblyMode::IndividualTriangles, ctx)
            .unwrap();
        let captures: Vec<TextureDescriptor> = active
            .framebuffer_captures()
            .iter()
            .map(Image::descriptor)
            .collect();
        assert_eq!(captures.len(), 2);
        assert_eq!((captures[0].width, captures[0].height), (40, 30));
        assert_eq!(active.bound_units(), &[(0, gl::TEXTURE_2D), (1, gl::TEXTURE_2D)]);
        assert_eq!(driver.stats().framebuffer_copies, 2);

        active.deactivate();
        assert_eq!(driver.bound_texture(ctx, 1, gl::TEXTURE_2D), 0);
        for descriptor in &captures {
            assert_eq!(runtime.textures().idle_count(descriptor), 1);
        }
    }

    #[test]
    fn color_shader_links_every_class_and_binds_color() {
        let (driver, runtime, ctx) = runtime();
        let shader = Shader::color(Color::new(1.0, 0.5, 0.0, 0.5));
        for mode in [AssemblyMode::TriangleFan, AssemblyMode::LineStrip, AssemblyMode::Points] {
            assert!(shader.upload(&runtime, mode, ctx, None));
        }
        let active = shader.activate(&runtime, AssemblyMode::IndividualTriangles, ctx).unwrap();
        let color = driver
            .uniform_uploads()
            .into_iter()
            .find(|u| u.name.as_deref() == Some("color"))
            .unwrap();
        assert_eq!(
            color.value,
            crate::driver::headless::UploadedValue::Floats {
                components: 4,
                values: vec![0.5, 0.25, 0.0, 0.5],
            }
        );
        assert!(active.bound_units().is_empty());
    }

    #[test]
    fn image_shader_samples_its_image() {
        let (driver, runtime, ctx) = runtime();
        let descriptor = TextureDescriptor::texture_2d(gl::RGBA8, 2, 2);
        let name = runtime.textures().acquire(
            ctx,
            crate::pool::TextureAllocation::Allocate,
            descriptor,
            0,
        );
        let image = Image::pooled(runtime.textures(), name, descriptor).unwrap();
        let shader = Shader::image(image.clone(), 0.75);
        assert_eq!(shader.image_uniform("texture"), Some(image));
        assert!(!shader.is_transform_feedback(AssemblyMode::Points));

        let active = shader.activate(&runtime, AssemblyMode::TriangleStrip, ctx).unwrap();
        assert_eq!(active.bound_units(), &[(0, gl::TEXTURE_2D)]);
        assert_eq!(driver.bound_texture(ctx, 0, gl::TEXTURE_2D), name);
        let alpha = driver
            .uniform_uploads()
            .into_iter()
            .find(|u| u.name.as_deref() == Some("alpha"))
            .unwrap();
        assert_eq!(
            alpha.value,
            crate::driver::headless::UploadedValue::Floats {
                components: 1,
                values: vec![0.75],
            }
        );
    }

    #[test]
    fn set_uniform_overwrites_in_place() {
        let shader = Shader::new("u");
        shader.set_uniform("a", 1.0_f32);
        shader.set_uniform("b", 2);
        shader.set_uniform("a", 3.0_f32);
        assert_eq!(shader.uniform("a"), Some(UniformValue::Float(3.0)));
        assert!(shader.summary().contains("uniforms: a (float), b (int)"));
        assert!(shader.image_uniform("a").is_none());
    }

    #[test]
    fn failed_subshader_is_not_retried_until_source_changes() {
        let (driver, runtime, ctx) = runtime();
        driver.fail_compile_when("broken", "ERROR: 0:{line}: 'broken' : undeclared identifier");
        let shader = Shader::new("bad");
        shader.add_source(
            PrimitiveClass::Points,
            None,
            None,
            Some("void main(){ broken; }"),
        );
        assert!(shader
            .activate(&runtime, AssemblyMode::Points, ctx)
            .is_none());
        let compiled = driver.stats().shaders_compiled;
        assert!(shader
            .activate(&runtime, AssemblyMode::Points, ctx)
            .is_none());
        assert_eq!(driver.stats().shaders_compiled, compiled);
        assert!(shader.summary().contains("failed"));

        let mut issues = Issues::new();
        assert!(!shader.upload(&runtime, AssemblyMode::Points, ctx, Some(&mut issues)));
        let error = issues.iter().find(|i| i.severity == Severity::Error).unwrap();
        assert_eq!(error.message, "undeclared identifier (near 'broken')");

        shader.add_source(PrimitiveClass::Points, None, None, Some("void main(){}"));
        assert!(shader
            .activate(&runtime, AssemblyMode::Points, ctx)
            .is_some());
    }

    #[test]
    fn output_count_changes_relink() {
        let (driver, runtime, ctx) = runtime();
        let shader = Shader::new("geom");
        shader.add_source(
            PrimitiveClass::Triangles,
            None,
            Some("void main(){}"),
            Some("void main(){}"),
        );
        assert!(shader.upload(&runtime, AssemblyMode::IndividualTriangles, ctx, None));
        shader.set_expected_output_count(PrimitiveClass::Triangles, 2);
        shader.set_may_change_output_count(PrimitiveClass::Triangles, true);
        assert!(shader.upload(&runtime, AssemblyMode::IndividualTriangles, ctx, None));
        assert_eq!(driver.stats().programs_linked, 2);
        assert_eq!(shader.expected_output_count(PrimitiveClass::Triangles), 2);
        assert!(shader.may_change_output_count(PrimitiveClass::Triangles));
        assert_eq!(shader.expected_output_count(PrimitiveClass::Lines), 1);
    }

    #[test]
    fn missing_subshader_fails_cleanly() {
        let (_driver, runtime, ctx) = runtime();
        let shader = Shader::new("empty");
        assert!(!shader.has_source(PrimitiveClass::Lines));
        assert!(shader
            .activate(&runtime, AssemblyMode::LineStrip, ctx)
            .is_none());
    }
}
