use std::path::PathBuf;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Shader preprocessing and diagnostics settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[schemars(title = "Shaders", inline)]
#[serde(default)]
pub struct ShaderOptions {
    /// Root that relative `include_dirs` are resolved against. Defaults to
    /// the directory containing the running executable.
    #[schemars(skip)]
    pub install_root: Option<PathBuf>,
    /// Installation-relative directories searched for `#include` files
    /// after the working directory, in order.
    #[schemars(title = "Include Directories")]
    pub include_dirs: Vec<PathBuf>,
    /// Compiler diagnostics containing any of these substrings are
    /// dropped. Driver message wording changes between versions, so the
    /// list is expected to need updates.
    #[schemars(title = "Benign Diagnostics")]
    pub benign_diagnostics: Vec<String>,
    /// Line numbers at or above this value come from generated preamble
    /// code rather than the author's source.
    #[schemars(skip)]
    pub generated_line_threshold: u32,
}

impl Default for ShaderOptions {
    fn default() -> Self {
        Self {
            install_root: None,
            include_dirs: vec![
                PathBuf::from("shaders"),
                PathBuf::from("resources/shaders"),
            ],
            benign_diagnostics: vec!["not read by fragment shader".to_owned()],
            generated_line_threshold: crate::shader::GENERATED_LINE_THRESHOLD,
        }
    }
}
