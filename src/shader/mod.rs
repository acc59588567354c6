//! Shader compilation, program linking, and uniform binding.
//!
//! - [`source`]: stage kinds, the default vertex shader, and the
//!   `include(Name)` dialect helper.
//! - [`include`]: `#include` expansion against the configured search path.
//! - [`issues`]: compiler/linker logs parsed into structured diagnostics.
//! - [`stage_cache`] / [`program_cache`]: process-lifetime caches of
//!   compiled stages and linked programs.
//! - [`uniform`], [`binding`], [`noise`]: uniform values and how they
//!   reach a program, including texture units and noise lookups.
//! - [`shader::Shader`]: the user-facing object tying these together.

pub mod binding;
pub mod include;
pub mod issues;
pub mod noise;
pub mod program_cache;
#[allow(clippy::module_inception)]
pub mod shader;
pub mod source;
pub mod stage_cache;
pub mod uniform;

pub use include::{Expansion, IncludeResolver};
pub use issues::{DiagnosticFilter, Issue, IssueLine, IssueStage, Issues, Severity};
pub use program_cache::{
    LinkedProgram, PrimitiveClass, ProgramCache, ProgramKey, TRANSFORM_FEEDBACK_VARYINGS,
};
pub use shader::{ActiveShader, AssemblyMode, AttributeLocations, Shader};
pub use source::{glsl_source, StageKind, DEFAULT_VERTEX_SOURCE};
pub use stage_cache::ShaderCache;
pub use uniform::{Color, UniformValue};

/// Reported line numbers at or above this point fall in generated
/// preamble code rather than the author's source.
pub const GENERATED_LINE_THRESHOLD: u32 = 1_000_000;
