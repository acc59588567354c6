//! In-memory share group for tests, benches, and offline checks.
//!
//! [`HeadlessDriver`] implements [`Driver`] and [`SurfaceHost`] without a
//! GPU. It hands out GL names from one counter (so every context shares
//! every object), tracks per-context texture bindings and current program,
//! records uniform uploads, and counts every call in [`HeadlessStats`].
//!
//! Shader compilation is simulated: a stage compiles unless it lacks a
//! `main` function or matches an injected failure rule. Linking parses
//! `uniform` declarations out of the attached sources, assigning
//! consecutive locations (arrays take one location per element and are
//! reported as `name[0]`, the way desktop drivers do).

use std::thread::ThreadId;

use rustc_hash::FxHashMap;

use super::{
    gl, ActiveUniform, ContextId, Driver, FramebufferCopy, GeometryTopology,
    GlEnum, GlName, LinkStatus, StageCompile, SurfaceHost, SurfaceId,
    TextureCopy, TextureStorage, UniformData,
};
use crate::util::sync::lock;

/// Static properties the headless GPU reports.
#[derive(Debug, Clone)]
pub struct HeadlessConfig {
    /// Renderer string.
    pub renderer: String,
    /// Reported texture memory in megabytes (`None` = unknown).
    pub texture_memory_megabytes: Option<u64>,
    /// Maximum texture dimension.
    pub max_texture_size: u32,
    /// Viewport size of every new context.
    pub viewport: (u32, u32),
}

impl Default for HeadlessConfig {
    fn default() -> Self {
        Self {
            renderer: "glpool headless".to_owned(),
            texture_memory_megabytes: Some(2048),
            max_texture_size: 16_384,
            viewport: (640, 480),
        }
    }
}

/// Call counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeadlessStats {
    /// Contexts created.
    pub contexts_created: u64,
    /// `flush` calls.
    pub flushes: u64,
    /// Buffers created.
    pub buffers_created: u64,
    /// Buffers deleted.
    pub buffers_deleted: u64,
    /// Texture names created.
    pub textures_created: u64,
    /// Textures deleted.
    pub textures_deleted: u64,
    /// Texture storage allocations (`texture_image` calls).
    pub texture_allocations: u64,
    /// Textures bound to shared surfaces.
    pub surface_bindings: u64,
    /// Shared surfaces created.
    pub surfaces_created: u64,
    /// Shader stages compiled (successful or not).
    pub shaders_compiled: u64,
    /// Programs linked (successful or not).
    pub programs_linked: u64,
    /// Programs deleted.
    pub programs_deleted: u64,
    /// `use_program` calls.
    pub use_program_calls: u64,
    /// `validate_program` calls.
    pub validations: u64,
    /// Uniform uploads.
    pub uniform_uploads: u64,
    /// Framebuffer-to-texture copies.
    pub framebuffer_copies: u64,
    /// Texture-to-texture copies.
    pub texture_copies: u64,
}

/// A recorded uniform upload.
#[derive(Debug, Clone, PartialEq)]
pub struct UniformUpload {
    /// Context the upload ran on.
    pub ctx: ContextId,
    /// Program current at upload time.
    pub program: GlName,
    /// Target location.
    pub location: i32,
    /// Name the location belongs to in that program, if known.
    pub name: Option<String>,
    /// Uploaded value.
    pub value: UploadedValue,
}

/// Owned copy of a [`UniformData`] payload.
#[derive(Debug, Clone, PartialEq)]
pub enum UploadedValue {
    /// Integer values.
    Ints(Vec<i32>),
    /// Float vector values.
    Floats {
        /// Components per element.
        components: u8,
        /// Flattened values.
        values: Vec<f32>,
    },
    /// Matrix values.
    Matrices {
        /// Matrix dimension.
        dim: u8,
        /// Flattened column-major values.
        values: Vec<f32>,
    },
}

/// A recorded texture bind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindEvent {
    /// Context.
    pub ctx: ContextId,
    /// Active unit at bind time.
    pub unit: u32,
    /// Target.
    pub target: GlEnum,
    /// Bound texture (0 = unbind).
    pub texture: GlName,
}

/// Snapshot of a texture's simulated state.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TextureInfo {
    /// Target the storage was allocated for (0 before allocation).
    pub target: GlEnum,
    /// Internal format.
    pub internal_format: GlEnum,
    /// Width.
    pub width: u32,
    /// Height.
    pub height: u32,
    /// Backing surface, for surface-backed textures.
    pub surface: Option<SurfaceId>,
    /// Integer parameters set on the texture, in call order.
    pub parameters: Vec<(GlEnum, i32)>,
}

/// Snapshot of a program's simulated state.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProgramInfo {
    /// Attached shader names.
    pub stages: Vec<GlName>,
    /// Explicit attribute bindings.
    pub attrib_bindings: Vec<(u32, String)>,
    /// Geometry topology, if set.
    pub geometry: Option<GeometryTopology>,
    /// Transform-feedback varyings.
    pub varyings: Vec<String>,
    /// Whether the last link succeeded.
    pub linked: bool,
}

struct CompileRule {
    pattern: String,
    log: String,
    fails: bool,
}

#[derive(Default)]
struct ContextRecord {
    active_unit: u32,
    bound: FxHashMap<(u32, GlEnum), GlName>,
    current_program: GlName,
    viewport: (u32, u32),
}

struct ShaderRecord {
    stage: GlEnum,
    source: String,
    compiled: bool,
}

#[derive(Default)]
struct ProgramRecord {
    info: ProgramInfo,
    uniforms: Vec<ActiveUniform>,
    locations: FxHashMap<String, i32>,
    attributes: FxHashMap<String, i32>,
}

struct SurfaceRecord {
    width: u32,
    height: u32,
    values: FxHashMap<String, i64>,
}

#[derive(Default)]
struct State {
    next_name: GlName,
    next_context: u64,
    next_surface: u32,
    fail_context_creations: u32,
    contexts: FxHashMap<ContextId, ContextRecord>,
    current: FxHashMap<ThreadId, ContextId>,
    buffers: FxHashMap<GlName, (GlEnum, usize)>,
    textures: FxHashMap<GlName, TextureInfo>,
    shaders: FxHashMap<GlName, ShaderRecord>,
    programs: FxHashMap<GlName, ProgramRecord>,
    surfaces: FxHashMap<SurfaceId, SurfaceRecord>,
    compile_rules: Vec<CompileRule>,
    link_rules: Vec<(String, String)>,
    uploads: Vec<UniformUpload>,
    binds: Vec<BindEvent>,
    framebuffer_copies: Vec<(ContextId, FramebufferCopy)>,
    texture_copies: Vec<(ContextId, TextureCopy)>,
    stats: HeadlessStats,
}

impl State {
    fn name(&mut self) -> GlName {
        self.next_name += 1;
        self.next_name
    }

    fn context(&mut self, ctx: ContextId) -> &mut ContextRecord {
        if !self.contexts.contains_key(&ctx) {
            log::warn!("headless: call on unknown context {ctx}");
        }
        self.contexts.entry(ctx).or_default()
    }

    fn bound_texture(&mut self, ctx: ContextId, target: GlEnum) -> GlName {
        let record = self.context(ctx);
        let unit = record.active_unit;
        record.bound.get(&(unit, target)).copied().unwrap_or(0)
    }
}

/// Software stand-in for an OpenGL share group.
pub struct HeadlessDriver {
    config: HeadlessConfig,
    state: std::sync::Mutex<State>,
}

impl Default for HeadlessDriver {
    fn default() -> Self {
        Self::new(HeadlessConfig::default())
    }
}

impl HeadlessDriver {
    /// Create a headless driver with the given reported properties.
    #[must_use]
    pub fn new(config: HeadlessConfig) -> Self {
        Self {
            config,
            state: std::sync::Mutex::new(State::default()),
        }
    }

    /// Make the next `count` context creations fail.
    pub fn fail_context_creations(&self, count: u32) {
        lock(&self.state).fail_context_creations = count;
    }

    /// Fail compilation of any stage containing `pattern`, appending
    /// `log` to the info log. `{line}` in `log` is replaced with the
    /// 1-based line of the first match.
    pub fn fail_compile_when(&self, pattern: &str, log: &str) {
        lock(&self.state).compile_rules.push(CompileRule {
            pattern: pattern.to_owned(),
            log: log.to_owned(),
            fails: true,
        });
    }

    /// Like [`fail_compile_when`](Self::fail_compile_when) but the stage
    /// still compiles; the log carries a warning.
    pub fn warn_compile_when(&self, pattern: &str, log: &str) {
        lock(&self.state).compile_rules.push(CompileRule {
            pattern: pattern.to_owned(),
            log: log.to_owned(),
            fails: false,
        });
    }

    /// Fail linking of any program with a stage containing `pattern`.
    pub fn fail_link_when(&self, pattern: &str, log: &str) {
        lock(&self.state)
            .link_rules
            .push((pattern.to_owned(), log.to_owned()));
    }

    /// Call counters so far.
    #[must_use]
    pub fn stats(&self) -> HeadlessStats {
        lock(&self.state).stats
    }

    /// Recorded uniform uploads, oldest first.
    #[must_use]
    pub fn uniform_uploads(&self) -> Vec<UniformUpload> {
        lock(&self.state).uploads.clone()
    }

    /// Recorded texture binds, oldest first.
    #[must_use]
    pub fn bind_events(&self) -> Vec<BindEvent> {
        lock(&self.state).binds.clone()
    }

    /// Recorded framebuffer copies, oldest first.
    #[must_use]
    pub fn framebuffer_copies(&self) -> Vec<(ContextId, FramebufferCopy)> {
        lock(&self.state).framebuffer_copies.clone()
    }

    /// Recorded texture copies, oldest first.
    #[must_use]
    pub fn texture_copies(&self) -> Vec<(ContextId, TextureCopy)> {
        lock(&self.state).texture_copies.clone()
    }

    /// Forget recorded uploads, binds, and copies.
    pub fn clear_recordings(&self) {
        let mut state = lock(&self.state);
        state.uploads.clear();
        state.binds.clear();
        state.framebuffer_copies.clear();
        state.texture_copies.clear();
    }

    /// Resize the viewport of `ctx`.
    pub fn set_viewport(&self, ctx: ContextId, width: u32, height: u32) {
        lock(&self.state).context(ctx).viewport = (width, height);
    }

    /// Number of live (undeleted) textures.
    #[must_use]
    pub fn live_textures(&self) -> usize {
        lock(&self.state).textures.len()
    }

    /// Number of live buffers.
    #[must_use]
    pub fn live_buffers(&self) -> usize {
        lock(&self.state).buffers.len()
    }

    /// Number of live shared surfaces.
    #[must_use]
    pub fn live_surfaces(&self) -> usize {
        lock(&self.state).surfaces.len()
    }

    /// Simulated state of a texture, if it exists.
    #[must_use]
    pub fn texture_info(&self, name: GlName) -> Option<TextureInfo> {
        lock(&self.state).textures.get(&name).cloned()
    }

    /// Simulated state of a program, if it exists.
    #[must_use]
    pub fn program_info(&self, program: GlName) -> Option<ProgramInfo> {
        lock(&self.state)
            .programs
            .get(&program)
            .map(|p| p.info.clone())
    }

    /// Program current on `ctx`.
    #[must_use]
    pub fn current_program(&self, ctx: ContextId) -> GlName {
        lock(&self.state)
            .contexts
            .get(&ctx)
            .map_or(0, |c| c.current_program)
    }

    /// Texture bound to `target` on `unit` of `ctx`.
    #[must_use]
    pub fn bound_texture(
        &self,
        ctx: ContextId,
        unit: u32,
        target: GlEnum,
    ) -> GlName {
        lock(&self.state)
            .contexts
            .get(&ctx)
            .and_then(|c| c.bound.get(&(unit, target)).copied())
            .unwrap_or(0)
    }

    /// Context current on the calling thread.
    #[must_use]
    pub fn current_context(&self) -> Option<ContextId> {
        lock(&self.state)
            .current
            .get(&std::thread::current().id())
            .copied()
    }
}

/// Parse `uniform` declarations out of GLSL sources.
///
/// Returns `(name, element_count)` pairs in declaration order, first
/// declaration wins across stages.
fn declared_uniforms<'a>(
    sources: impl Iterator<Item = &'a str>,
) -> Vec<(String, u32)> {
    let mut found: Vec<(String, u32)> = Vec::new();
    for source in sources {
        for line in source.lines() {
            let code = line.split("//").next().unwrap_or_default();
            for statement in code.split(';') {
                let mut tokens = statement.split_whitespace();
                if tokens.next() != Some("uniform") {
                    continue;
                }
                let mut rest: Vec<&str> = tokens
                    .skip_while(|t| matches!(*t, "lowp" | "mediump" | "highp"))
                    .collect();
                if rest.len() < 2 {
                    continue;
                }
                let declarators = rest.split_off(1).join(" ");
                for declarator in declarators.split(',') {
                    let declarator: String =
                        declarator.chars().filter(|c| !c.is_whitespace()).collect();
                    let (name, count) = match declarator.split_once('[') {
                        Some((name, size)) => (
                            name.to_owned(),
                            size.trim_end_matches(']').parse().unwrap_or(1),
                        ),
                        None => (declarator, 1),
                    };
                    if !name.is_empty() && !found.iter().any(|(n, _)| *n == name) {
                        found.push((name, count));
                    }
                }
            }
        }
    }
    found
}

/// Vertex inputs declared with `in` or `attribute`, in order.
fn declared_attributes(source: &str) -> Vec<String> {
    let mut found = Vec::new();
    for line in source.lines() {
        let code = line.split("//").next().unwrap_or_default();
        for statement in code.split(';') {
            let tokens: Vec<&str> = statement.split_whitespace().collect();
            if let [qualifier, _ty, name] = tokens.as_slice() {
                if matches!(*qualifier, "in" | "attribute") {
                    found.push((*name).to_owned());
                }
            }
        }
    }
    found
}

fn line_of(source: &str, pattern: &str) -> usize {
    source
        .lines()
        .position(|l| l.contains(pattern))
        .map_or(1, |i| i + 1)
}

impl Driver for HeadlessDriver {
    fn create_context(
        &self,
        share_with: Option<ContextId>,
    ) -> Option<ContextId> {
        let mut state = lock(&self.state);
        if state.fail_context_creations > 0 {
            state.fail_context_creations -= 1;
            return None;
        }
        if let Some(root) = share_with {
            if !state.contexts.contains_key(&root) {
                log::warn!("headless: sharing with unknown context {root}");
            }
        }
        state.next_context += 1;
        let ctx = ContextId(state.next_context);
        let record = ContextRecord {
            viewport: self.config.viewport,
            ..ContextRecord::default()
        };
        drop(state.contexts.insert(ctx, record));
        state.stats.contexts_created += 1;
        Some(ctx)
    }

    fn make_current(&self, ctx: Option<ContextId>) {
        let thread = std::thread::current().id();
        let mut state = lock(&self.state);
        match ctx {
            Some(ctx) => drop(state.current.insert(thread, ctx)),
            None => drop(state.current.remove(&thread)),
        }
    }

    fn flush(&self, _ctx: ContextId) {
        lock(&self.state).stats.flushes += 1;
    }

    fn renderer(&self, _ctx: ContextId) -> String {
        self.config.renderer.clone()
    }

    fn texture_memory_megabytes(&self, _ctx: ContextId) -> Option<u64> {
        self.config.texture_memory_megabytes
    }

    fn max_texture_size(&self, _ctx: ContextId) -> u32 {
        self.config.max_texture_size
    }

    fn create_buffer(
        &self,
        _ctx: ContextId,
        target: GlEnum,
        size: usize,
    ) -> GlName {
        let mut state = lock(&self.state);
        let name = state.name();
        drop(state.buffers.insert(name, (target, size)));
        state.stats.buffers_created += 1;
        name
    }

    fn delete_buffer(&self, _ctx: ContextId, name: GlName) {
        let mut state = lock(&self.state);
        if state.buffers.remove(&name).is_some() {
            state.stats.buffers_deleted += 1;
        }
    }

    fn create_texture(&self, _ctx: ContextId) -> GlName {
        let mut state = lock(&self.state);
        let name = state.name();
        drop(state.textures.insert(name, TextureInfo::default()));
        state.stats.textures_created += 1;
        name
    }

    fn bind_texture(&self, ctx: ContextId, target: GlEnum, name: GlName) {
        let mut state = lock(&self.state);
        let record = state.context(ctx);
        let unit = record.active_unit;
        drop(record.bound.insert((unit, target), name));
        state.binds.push(BindEvent {
            ctx,
            unit,
            target,
            texture: name,
        });
    }

    fn active_texture(&self, ctx: ContextId, unit: u32) {
        lock(&self.state).context(ctx).active_unit = unit;
    }

    fn texture_image(&self, ctx: ContextId, storage: &TextureStorage<'_>) {
        let mut state = lock(&self.state);
        let name = state.bound_texture(ctx, storage.target);
        state.stats.texture_allocations += 1;
        if let Some(info) = state.textures.get_mut(&name) {
            info.target = storage.target;
            info.internal_format = storage.internal_format;
            info.width = storage.width;
            info.height = storage.height;
        } else {
            log::warn!("headless: texture_image with nothing bound");
        }
    }

    fn texture_parameter(
        &self,
        ctx: ContextId,
        target: GlEnum,
        pname: GlEnum,
        value: i32,
    ) {
        let mut state = lock(&self.state);
        let name = state.bound_texture(ctx, target);
        if let Some(info) = state.textures.get_mut(&name) {
            info.parameters.push((pname, value));
        }
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
        let mut state = lock(&self.state);
        if target != gl::TEXTURE_RECTANGLE
            || !state.surfaces.contains_key(&surface)
        {
            return false;
        }
        let name = state.bound_texture(ctx, target);
        let Some(info) = state.textures.get_mut(&name) else {
            return false;
        };
        info.target = target;
        info.internal_format = internal_format;
        info.width = width;
        info.height = height;
        info.surface = Some(surface);
        state.stats.surface_bindings += 1;
        true
    }

    fn delete_textures(&self, _ctx: ContextId, names: &[GlName]) {
        let mut state = lock(&self.state);
        for name in names {
            if state.textures.remove(name).is_some() {
                state.stats.textures_deleted += 1;
            }
        }
    }

    fn viewport_size(&self, ctx: ContextId) -> (u32, u32) {
        lock(&self.state).context(ctx).viewport
    }

    fn copy_framebuffer(&self, ctx: ContextId, copy: &FramebufferCopy) {
        let mut state = lock(&self.state);
        if state.bound_texture(ctx, copy.target) != copy.texture {
            log::warn!("headless: copy into texture {} while it isn't bound", copy.texture);
        }
        let Some(info) = state.textures.get_mut(&copy.texture) else {
            log::warn!("headless: copy into unknown texture {}", copy.texture);
            return;
        };
        info.target = copy.target;
        info.internal_format = copy.internal_format;
        info.width = copy.width;
        info.height = copy.height;
        state.framebuffer_copies.push((ctx, *copy));
        state.stats.framebuffer_copies += 1;
    }

    fn copy_texture(&self, ctx: ContextId, copy: &TextureCopy) {
        let mut state = lock(&self.state);
        for name in [copy.source, copy.destination] {
            if !state.textures.contains_key(&name) {
                log::warn!("headless: texture copy with unknown texture {name}");
                return;
            }
        }
        let record = state.context(ctx);
        let unit = record.active_unit;
        drop(record.bound.insert((unit, copy.destination_target), 0));
        state.texture_copies.push((ctx, *copy));
        state.stats.texture_copies += 1;
    }

    fn compile_shader(
        &self,
        _ctx: ContextId,
        stage: GlEnum,
        source: &str,
    ) -> StageCompile {
        let mut state = lock(&self.state);
        state.stats.shaders_compiled += 1;
        let mut log = String::new();
        let mut compiled = true;
        if !source.contains("main") {
            compiled = false;
            log.push_str("ERROR: 0:1: 'main' : function is not defined\n");
        }
        for rule in &state.compile_rules {
            if source.contains(&rule.pattern) {
                let line = line_of(source, &rule.pattern).to_string();
                log.push_str(&rule.log.replace("{line}", &line));
                if !log.ends_with('\n') {
                    log.push('\n');
                }
                compiled &= !rule.fails;
            }
        }
        let name = state.name();
        drop(state.shaders.insert(
            name,
            ShaderRecord {
                stage,
                source: source.to_owned(),
                compiled,
            },
        ));
        StageCompile {
            name,
            compiled,
            log,
        }
    }

    fn delete_shader(&self, _ctx: ContextId, name: GlName) {
        drop(lock(&self.state).shaders.remove(&name));
    }

    fn create_program(&self, _ctx: ContextId) -> GlName {
        let mut state = lock(&self.state);
        let name = state.name();
        drop(state.programs.insert(name, ProgramRecord::default()));
        name
    }

    fn attach_shader(&self, _ctx: ContextId, program: GlName, shader: GlName) {
        if let Some(p) = lock(&self.state).programs.get_mut(&program) {
            p.info.stages.push(shader);
        }
    }

    fn bind_attrib_location(
        &self,
        _ctx: ContextId,
        program: GlName,
        index: u32,
        name: &str,
    ) {
        if let Some(p) = lock(&self.state).programs.get_mut(&program) {
            p.info.attrib_bindings.push((index, name.to_owned()));
        }
    }

    fn geometry_topology(
        &self,
        _ctx: ContextId,
        program: GlName,
        topology: GeometryTopology,
    ) {
        if let Some(p) = lock(&self.state).programs.get_mut(&program) {
            p.info.geometry = Some(topology);
        }
    }

    fn transform_feedback_varyings(
        &self,
        _ctx: ContextId,
        program: GlName,
        varyings: &[&str],
    ) {
        if let Some(p) = lock(&self.state).programs.get_mut(&program) {
            p.info.varyings =
                varyings.iter().map(|v| (*v).to_owned()).collect();
        }
    }

    fn link_program(&self, _ctx: ContextId, program: GlName) -> LinkStatus {
        let mut state = lock(&self.state);
        state.stats.programs_linked += 1;
        let State {
            programs,
            shaders,
            link_rules,
            ..
        } = &mut *state;
        let Some(record) = programs.get_mut(&program) else {
            return LinkStatus {
                ok: false,
                log: "ERROR: invalid program name\n".to_owned(),
            };
        };
        let stages: Vec<&ShaderRecord> = record
            .info
            .stages
            .iter()
            .filter_map(|s| shaders.get(s))
            .collect();

        let mut log = String::new();
        if !stages.iter().any(|s| s.stage == gl::VERTEX_SHADER) {
            log.push_str("ERROR: no vertex shader attached\n");
        }
        if stages.iter().any(|s| !s.compiled) {
            log.push_str("ERROR: one or more attached shaders not compiled\n");
        }
        for (pattern, message) in link_rules.iter() {
            if stages.iter().any(|s| s.source.contains(pattern.as_str())) {
                log.push_str(message);
                log.push('\n');
            }
        }
        if !log.is_empty() {
            record.info.linked = false;
            return LinkStatus { ok: false, log };
        }

        let mut next = 0_i32;
        record.uniforms.clear();
        record.locations.clear();
        for (name, count) in declared_uniforms(stages.iter().map(|s| s.source.as_str())) {
            let reported = if count > 1 {
                format!("{name}[0]")
            } else {
                name.clone()
            };
            record.uniforms.push(ActiveUniform {
                name: reported,
                size: count,
            });
            drop(record.locations.insert(name.clone(), next));
            for i in 0..count {
                drop(record.locations.insert(format!("{name}[{i}]"), next + i as i32));
            }
            next += count as i32;
        }

        record.attributes.clear();
        for (index, name) in &record.info.attrib_bindings {
            drop(record.attributes.insert(name.clone(), *index as i32));
        }
        let mut next_attrib = record.attributes.values().max().map_or(0, |m| m + 1);
        for stage in stages.iter().filter(|s| s.stage == gl::VERTEX_SHADER) {
            for name in declared_attributes(&stage.source) {
                if !record.attributes.contains_key(&name) {
                    drop(record.attributes.insert(name, next_attrib));
                    next_attrib += 1;
                }
            }
        }
        record.info.linked = true;
        LinkStatus {
            ok: true,
            log: String::new(),
        }
    }

    fn validate_program(
        &self,
        _ctx: ContextId,
        program: GlName,
    ) -> LinkStatus {
        let mut state = lock(&self.state);
        state.stats.validations += 1;
        let linked = state.programs.get(&program).is_some_and(|p| p.info.linked);
        LinkStatus {
            ok: linked,
            log: if linked {
                String::new()
            } else {
                "Validation Failed: Program is not successfully linked.\n"
                    .to_owned()
            },
        }
    }

    fn delete_program(&self, _ctx: ContextId, program: GlName) {
        let mut state = lock(&self.state);
        if state.programs.remove(&program).is_some() {
            state.stats.programs_deleted += 1;
        }
    }

    fn active_uniforms(
        &self,
        _ctx: ContextId,
        program: GlName,
    ) -> Vec<ActiveUniform> {
        lock(&self.state)
            .programs
            .get(&program)
            .map(|p| p.uniforms.clone())
            .unwrap_or_default()
    }

    fn uniform_location(
        &self,
        _ctx: ContextId,
        program: GlName,
        name: &str,
    ) -> Option<i32> {
        lock(&self.state)
            .programs
            .get(&program)
            .and_then(|p| p.locations.get(name).copied())
    }

    fn attrib_location(
        &self,
        _ctx: ContextId,
        program: GlName,
        name: &str,
    ) -> Option<i32> {
        lock(&self.state)
            .programs
            .get(&program)
            .and_then(|p| p.attributes.get(name).copied())
    }

    fn use_program(&self, ctx: ContextId, program: GlName) {
        let mut state = lock(&self.state);
        state.stats.use_program_calls += 1;
        state.context(ctx).current_program = program;
    }

    fn upload_uniform(
        &self,
        ctx: ContextId,
        location: i32,
        data: UniformData<'_>,
    ) {
        let mut state = lock(&self.state);
        state.stats.uniform_uploads += 1;
        let program = state.context(ctx).current_program;
        let name = state.programs.get(&program).and_then(|p| {
            p.locations
                .iter()
                .filter(|(_, l)| **l == location)
                .map(|(n, _)| n.clone())
                .min_by_key(String::len)
        });
        let value = match data {
            UniformData::Ints(v) => UploadedValue::Ints(v.to_vec()),
            UniformData::Floats { components, values } => {
                UploadedValue::Floats {
                    components,
                    values: values.to_vec(),
                }
            }
            UniformData::Matrices { dim, values } => UploadedValue::Matrices {
                dim,
                values: values.to_vec(),
            },
        };
        state.uploads.push(UniformUpload {
            ctx,
            program,
            location,
            name,
            value,
        });
    }
}

impl SurfaceHost for HeadlessDriver {
    fn create_surface(&self, width: u32, height: u32) -> Option<SurfaceId> {
        let mut state = lock(&self.state);
        state.next_surface += 1;
        let id = SurfaceId(state.next_surface);
        drop(state.surfaces.insert(
            id,
            SurfaceRecord {
                width,
                height,
                values: FxHashMap::default(),
            },
        ));
        state.stats.surfaces_created += 1;
        Some(id)
    }

    fn release_surface(&self, surface: SurfaceId) {
        drop(lock(&self.state).surfaces.remove(&surface));
    }

    fn surface_size(&self, surface: SurfaceId) -> Option<(u32, u32)> {
        lock(&self.state)
            .surfaces
            .get(&surface)
            .map(|s| (s.width, s.height))
    }

    fn surface_value(&self, surface: SurfaceId, key: &str) -> i64 {
        lock(&self.state)
            .surfaces
            .get(&surface)
            .and_then(|s| s.values.get(key).copied())
            .unwrap_or(0)
    }

    fn set_surface_value(&self, surface: SurfaceId, key: &str, value: i64) {
        if let Some(s) = lock(&self.state).surfaces.get_mut(&surface) {
            drop(s.values.insert(key.to_owned(), value));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_scalar_array_and_multi_declarations() {
        let src = "uniform vec4 color;\n\
                   uniform highp float weights[3]; // comment\n\
                   uniform sampler2D a, b;\n\
                   in vec3 position;";
        let found = declared_uniforms(std::iter::once(src));
        assert_eq!(
            found,
            vec![
                ("color".to_owned(), 1),
                ("weights".to_owned(), 3),
                ("a".to_owned(), 1),
                ("b".to_owned(), 1),
            ]
        );
    }

    #[test]
    fn link_assigns_consecutive_array_locations() {
        let driver = HeadlessDriver::default();
        let ctx = driver.create_context(None).unwrap();
        let vs = driver.compile_shader(
            ctx,
            gl::VERTEX_SHADER,
            "uniform float w[4];\nuniform vec2 offset;\nvoid main(){}",
        );
        assert!(vs.compiled);
        let program = driver.create_program(ctx);
        driver.attach_shader(ctx, program, vs.name);
        assert!(driver.link_program(ctx, program).ok);

        let uniforms = driver.active_uniforms(ctx, program);
        assert_eq!(uniforms[0].name, "w[0]");
        assert_eq!(uniforms[0].size, 4);
        assert_eq!(driver.uniform_location(ctx, program, "w[3]"), Some(3));
        assert_eq!(driver.uniform_location(ctx, program, "offset"), Some(4));
        assert_eq!(driver.uniform_location(ctx, program, "missing"), None);
    }

    #[test]
    fn compile_rules_inject_failures_and_line_numbers() {
        let driver = HeadlessDriver::default();
        let ctx = driver.create_context(None).unwrap();
        driver.fail_compile_when("oops", "ERROR: 0:{line}: 'oops' : syntax error");
        let result = driver.compile_shader(
            ctx,
            gl::FRAGMENT_SHADER,
            "void main()\n{\n oops;\n}",
        );
        assert!(!result.compiled);
        assert!(result.log.contains("0:3:"));
    }

    #[test]
    fn framebuffer_copy_allocates_bound_texture() {
        let driver = HeadlessDriver::default();
        let ctx = driver.create_context(None).unwrap();
        assert_eq!(driver.viewport_size(ctx), (640, 480));
        driver.set_viewport(ctx, 32, 16);
        let texture = driver.create_texture(ctx);
        driver.bind_texture(ctx, gl::TEXTURE_2D, texture);
        let (width, height) = driver.viewport_size(ctx);
        driver.copy_framebuffer(
            ctx,
            &FramebufferCopy {
                texture,
                target: gl::TEXTURE_2D,
                internal_format: gl::DEPTH_COMPONENT16,
                width,
                height,
            },
        );
        let info = driver.texture_info(texture).unwrap();
        assert_eq!(
            (info.internal_format, info.width, info.height),
            (gl::DEPTH_COMPONENT16, 32, 16)
        );
        assert_eq!(driver.stats().framebuffer_copies, 1);
    }

    #[test]
    fn context_creation_failure_is_injectable() {
        let driver = HeadlessDriver::default();
        driver.fail_context_creations(1);
        assert!(driver.create_context(None).is_none());
        assert!(driver.create_context(None).is_some());
    }
}
