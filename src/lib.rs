// -- Lint policy ---------------------------------------------------------
// This is the single source of truth for crate-wide lints.

// Broad lint groups
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![deny(clippy::nursery)]
// Documentation
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(rustdoc::private_intra_doc_links)]
#![deny(rustdoc::bare_urls)]
// No panicking in library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]
// No debug/print artifacts
#![deny(clippy::dbg_macro)]
#![deny(clippy::print_stdout)]
#![deny(clippy::print_stderr)]
// Import hygiene
#![deny(clippy::wildcard_imports)]
// Complexity limits (thresholds in clippy.toml)
#![deny(clippy::cognitive_complexity)]
#![deny(clippy::too_many_lines)]
#![deny(clippy::excessive_nesting)]
// Function signature hygiene
#![deny(clippy::too_many_arguments)]
#![deny(clippy::fn_params_excessive_bools)]
// Clone / pass-by-value hygiene
#![deny(clippy::needless_pass_by_value)]
#![deny(clippy::implicit_clone)]
// String hygiene
#![deny(clippy::inefficient_to_string)]
#![deny(clippy::redundant_closure_for_method_calls)]
#![deny(clippy::manual_string_new)]
#![deny(clippy::str_to_string)]
// Cargo lints (warn, not deny since cargo lints can be noisy)
#![warn(clippy::cargo)]
// Unused / redundant code
#![deny(unused_results)]
#![deny(unused_qualifications)]
// Cast hygiene
#![deny(trivial_casts)]
#![deny(trivial_numeric_casts)]

//! Pooled OpenGL resources and shader/program caching for dataflow
//! graphics runtimes.
//!
//! glpool keeps GPU objects alive between frames so node graphs don't
//! pay for allocation on every evaluation, and compiles each distinct
//! shader stage and program once per process.
//!
//! # Key entry points
//!
//! - [`runtime::GpuRuntime`] - owns every pool and cache; build one per
//!   process
//! - [`pool`] - buffer, texture, and shared-surface pools
//! - [`shader::Shader`] - user-facing shader with per-primitive-class
//!   programs and named uniforms
//! - [`image::Image`] - reference-counted texture handle
//! - [`options::Options`] - pool cadence, VRAM headroom, include paths
//!
//! # Architecture
//!
//! Every GL call goes through the [`driver::Driver`] trait, so the pools
//! and caches run against [`driver::headless::HeadlessDriver`] in tests
//! and against a real context in production. A background
//! [`pool::Sweeper`] thread evicts idle textures and recycles shared
//! surfaces their consumers have signalled.

pub mod driver;
pub mod error;
pub mod gpu;
pub mod image;
pub mod options;
pub mod pool;
pub mod runtime;
pub mod shader;
pub mod util;

pub use error::GlPoolError;
pub use runtime::{GpuRuntime, GpuRuntimeBuilder};
