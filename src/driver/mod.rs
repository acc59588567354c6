//! The GPU driver seam.
//!
//! Everything above this module talks to the GPU through [`Driver`] (GL
//! object calls, always naming the context they run on) and
//! [`SurfaceHost`] (cross-process shared surfaces). Two backends exist:
//!
//! - [`headless::HeadlessDriver`]: an in-memory share group that hands out
//!   names, parses uniform declarations, and counts every call. Used by the
//!   tests, the benches, and the `glpool check` command.
//! - `glow::GlowDriver` (feature `glow`): real OpenGL through the `glow`
//!   crate, with context creation delegated to a `GlPlatform`.

pub mod gl;
#[cfg(feature = "glow")]
pub mod glow;
pub mod headless;

use std::fmt;

/// A GL object name. Zero is the "no object" sentinel everywhere.
pub type GlName = u32;

/// A GL enum value.
pub type GlEnum = u32;

/// Opaque identifier of a GPU context in the share group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(pub u64);

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx#{}", self.0)
    }
}

/// Identifier of a cross-process shared surface.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default,
)]
pub struct SurfaceId(pub u32);

impl fmt::Display for SurfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "surface#{}", self.0)
    }
}

/// One entry of a linked program's active-uniform list.
///
/// Array uniforms are reported once, usually as `name[0]`, with `size`
/// holding the element count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveUniform {
    /// Name as reported by the driver.
    pub name: String,
    /// Element count (1 for non-arrays).
    pub size: u32,
}

/// Result of compiling one shader stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageCompile {
    /// Shader object name; 0 if the driver could not create one.
    pub name: GlName,
    /// Whether compilation succeeded.
    pub compiled: bool,
    /// Compiler info log (may carry warnings on success).
    pub log: String,
}

/// Result of linking or validating a program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkStatus {
    /// Whether the operation succeeded.
    pub ok: bool,
    /// Driver info log.
    pub log: String,
}

/// Uniform payload for one upload call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformData<'a> {
    /// `int`, `bool`, and sampler uniforms (one component each).
    Ints(&'a [i32]),
    /// `float` / `vecN` uniforms; `components` is 1..=4.
    Floats {
        /// Components per element.
        components: u8,
        /// Flattened element values.
        values: &'a [f32],
    },
    /// Column-major `matN` uniforms; `dim` is 2..=4.
    Matrices {
        /// Matrix dimension.
        dim: u8,
        /// Flattened column-major values.
        values: &'a [f32],
    },
}

impl UniformData<'_> {
    /// Number of array elements this payload covers.
    #[must_use]
    pub fn count(&self) -> usize {
        match self {
            Self::Ints(v) => v.len(),
            Self::Floats { components, values } => {
                values.len() / usize::from((*components).max(1))
            }
            Self::Matrices { dim, values } => {
                let d = usize::from((*dim).max(1));
                values.len() / (d * d)
            }
        }
    }
}

/// Parameters for allocating (and optionally filling) texture storage.
#[derive(Debug, Clone, Copy)]
pub struct TextureStorage<'a> {
    /// Texture target.
    pub target: GlEnum,
    /// Internal (GPU-side) format.
    pub internal_format: GlEnum,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Client pixel format.
    pub format: GlEnum,
    /// Client component type.
    pub component_type: GlEnum,
    /// Pixel data, or `None` for uninitialized storage.
    pub pixels: Option<&'a [u8]>,
}

/// Parameters for copying the read framebuffer into a texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramebufferCopy {
    /// Destination texture, bound to `target` on the active unit.
    pub texture: GlName,
    /// Texture target.
    pub target: GlEnum,
    /// Internal format the destination storage is (re)allocated as.
    pub internal_format: GlEnum,
    /// Width in pixels, from the lower-left corner.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

/// Parameters for copying one texture's contents into another.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureCopy {
    /// Source texture.
    pub source: GlName,
    /// Source texture target.
    pub source_target: GlEnum,
    /// Destination texture, whose storage already exists.
    pub destination: GlName,
    /// Destination texture target.
    pub destination_target: GlEnum,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

/// Geometry-stage topology applied before linking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeometryTopology {
    /// Input primitive type.
    pub input: GlEnum,
    /// Output primitive type.
    pub output: GlEnum,
    /// Maximum emitted vertices per invocation.
    pub max_vertices: u32,
}

/// OpenGL calls used by the pools and caches.
///
/// Every object call names the context it runs on. Contexts created by
/// [`create_context`](Self::create_context) share object names with each
/// other, so a texture created on one context is valid on every other.
pub trait Driver: Send + Sync {
    // -- Contexts --------------------------------------------------------

    /// Create a context sharing objects with `share_with` (or a fresh
    /// share group when `None`). Returns `None` on failure.
    fn create_context(&self, share_with: Option<ContextId>)
        -> Option<ContextId>;
    /// Make `ctx` current on the calling thread, or clear the binding.
    fn make_current(&self, ctx: Option<ContextId>);
    /// Flush pending commands on `ctx`.
    fn flush(&self, ctx: ContextId);

    // -- Queries ---------------------------------------------------------

    /// Renderer identification string.
    fn renderer(&self, ctx: ContextId) -> String;
    /// Texture memory reported by the driver, in megabytes, if known.
    fn texture_memory_megabytes(&self, ctx: ContextId) -> Option<u64>;
    /// Maximum texture width/height.
    fn max_texture_size(&self, ctx: ContextId) -> u32;

    // -- Buffers ---------------------------------------------------------

    /// Create a buffer on `target` with `size` bytes of uninitialized
    /// stream-draw storage. Returns 0 on failure.
    fn create_buffer(&self, ctx: ContextId, target: GlEnum, size: usize)
        -> GlName;
    /// Delete a buffer.
    fn delete_buffer(&self, ctx: ContextId, name: GlName);

    // -- Textures --------------------------------------------------------

    /// Create an unbound texture name. Returns 0 on failure.
    fn create_texture(&self, ctx: ContextId) -> GlName;
    /// Bind `name` (or 0) to `target` on the active unit.
    fn bind_texture(&self, ctx: ContextId, target: GlEnum, name: GlName);
    /// Select texture unit `unit` (0-based).
    fn active_texture(&self, ctx: ContextId, unit: u32);
    /// Allocate storage for the texture bound to `storage.target`.
    fn texture_image(&self, ctx: ContextId, storage: &TextureStorage<'_>);
    /// Set an integer parameter on the texture bound to `target`.
    fn texture_parameter(
        &self,
        ctx: ContextId,
        target: GlEnum,
        pname: GlEnum,
        value: i32,
    );
    /// Back the texture bound to `target` with a shared surface.
    /// Returns `false` if the platform cannot do so.
    fn texture_from_surface(
        &self,
        ctx: ContextId,
        target: GlEnum,
        internal_format: GlEnum,
        width: u32,
        height: u32,
        surface: SurfaceId,
    ) -> bool;
    /// Delete a batch of textures.
    fn delete_textures(&self, ctx: ContextId, names: &[GlName]);

    // -- Framebuffers -----------------------------------------------------

    /// Width and height of the current viewport on `ctx`.
    fn viewport_size(&self, ctx: ContextId) -> (u32, u32);
    /// Copy the lower-left region of the read framebuffer into
    /// `copy.texture`. A multisampled color buffer is resolved first;
    /// depth formats copy the depth buffer.
    fn copy_framebuffer(&self, ctx: ContextId, copy: &FramebufferCopy);
    /// Copy the lower-left region of one texture into another. The
    /// active unit's `destination_target` binding is cleared afterwards.
    fn copy_texture(&self, ctx: ContextId, copy: &TextureCopy);

    // -- Shaders and programs --------------------------------------------

    /// Compile one stage.
    fn compile_shader(
        &self,
        ctx: ContextId,
        stage: GlEnum,
        source: &str,
    ) -> StageCompile;
    /// Delete a shader object.
    fn delete_shader(&self, ctx: ContextId, name: GlName);
    /// Create an empty program. Returns 0 on failure.
    fn create_program(&self, ctx: ContextId) -> GlName;
    /// Attach a compiled stage.
    fn attach_shader(&self, ctx: ContextId, program: GlName, shader: GlName);
    /// Bind an attribute name to a location before linking.
    fn bind_attrib_location(
        &self,
        ctx: ContextId,
        program: GlName,
        index: u32,
        name: &str,
    );
    /// Apply geometry-stage topology before linking.
    fn geometry_topology(
        &self,
        ctx: ContextId,
        program: GlName,
        topology: GeometryTopology,
    );
    /// Declare interleaved transform-feedback outputs before linking.
    fn transform_feedback_varyings(
        &self,
        ctx: ContextId,
        program: GlName,
        varyings: &[&str],
    );
    /// Link a program.
    fn link_program(&self, ctx: ContextId, program: GlName) -> LinkStatus;
    /// Validate a program against the current state.
    fn validate_program(&self, ctx: ContextId, program: GlName)
        -> LinkStatus;
    /// Delete a program.
    fn delete_program(&self, ctx: ContextId, program: GlName);
    /// Active uniforms of a linked program.
    fn active_uniforms(
        &self,
        ctx: ContextId,
        program: GlName,
    ) -> Vec<ActiveUniform>;
    /// Location of a uniform (or array element) by name.
    fn uniform_location(
        &self,
        ctx: ContextId,
        program: GlName,
        name: &str,
    ) -> Option<i32>;
    /// Location of a vertex attribute by name.
    fn attrib_location(
        &self,
        ctx: ContextId,
        program: GlName,
        name: &str,
    ) -> Option<i32>;
    /// Make `program` (or 0) current on `ctx`.
    fn use_program(&self, ctx: ContextId, program: GlName);
    /// Upload a uniform value to the current program.
    fn upload_uniform(
        &self,
        ctx: ContextId,
        location: i32,
        data: UniformData<'_>,
    );
}

/// Key-value flag store and lifecycle for cross-process shared surfaces.
pub trait SurfaceHost: Send + Sync {
    /// Create a surface of the given size. `None` on failure.
    fn create_surface(&self, width: u32, height: u32) -> Option<SurfaceId>;
    /// Drop this process's reference to a surface.
    fn release_surface(&self, surface: SurfaceId);
    /// Size of a live surface.
    fn surface_size(&self, surface: SurfaceId) -> Option<(u32, u32)>;
    /// Read an integer value attached to a surface (0 if absent).
    fn surface_value(&self, surface: SurfaceId, key: &str) -> i64;
    /// Attach an integer value to a surface.
    fn set_surface_value(&self, surface: SurfaceId, key: &str, value: i64);
}
