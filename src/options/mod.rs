//! Runtime configuration with TOML file support.
//!
//! Every tunable the pools and caches read is consolidated here: sweep
//! cadence, the VRAM headroom policy inputs, `#include` search paths,
//! benign-diagnostic patterns, and debug toggles. Options serialize to and
//! from TOML; partial files fill the rest with defaults.

mod debug;
mod pool;
mod shader;
mod vram;

use std::path::Path;

pub use debug::DebugOptions;
pub use pool::PoolOptions;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
pub use shader::ShaderOptions;
pub use vram::{RendererOverride, VramOptions};

use crate::error::GlPoolError;

/// Top-level options container. All sub-structs use `#[serde(default)]` so
/// partial TOML files (e.g. only overriding `[vram]`) work correctly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default, JsonSchema)]
#[serde(default)]
pub struct Options {
    /// Sweep cadence and shared-surface lifetime.
    pub pool: PoolOptions,
    /// Texture memory budget inputs.
    pub vram: VramOptions,
    /// Shader preprocessing and diagnostics.
    pub shader: ShaderOptions,
    /// Diagnostics toggles.
    pub debug: DebugOptions,
}

impl Options {
    /// Generate JSON Schema describing the options file.
    #[must_use]
    pub fn json_schema() -> schemars::Schema {
        schemars::schema_for!(Options)
    }

    /// Load options from a TOML file. Missing fields use defaults.
    ///
    /// # Errors
    ///
    /// [`GlPoolError::Io`] if the file cannot be read,
    /// [`GlPoolError::OptionsParse`] if it is not valid options TOML.
    pub fn load(path: &Path) -> Result<Self, GlPoolError> {
        let content = std::fs::read_to_string(path).map_err(GlPoolError::Io)?;
        Self::from_toml(&content)
    }

    /// Parse options from TOML text. Missing fields use defaults.
    ///
    /// # Errors
    ///
    /// [`GlPoolError::OptionsParse`] if the text is not valid options TOML.
    pub fn from_toml(content: &str) -> Result<Self, GlPoolError> {
        toml::from_str(content)
            .map_err(|e| GlPoolError::OptionsParse(e.to_string()))
    }

    /// Save options to a TOML file (pretty-printed).
    ///
    /// # Errors
    ///
    /// [`GlPoolError::OptionsParse`] on serialization failure,
    /// [`GlPoolError::Io`] if the file or its parent cannot be written.
    pub fn save(&self, path: &Path) -> Result<(), GlPoolError> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| GlPoolError::OptionsParse(e.to_string()))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(GlPoolError::Io)?;
        }
        std::fs::write(path, content).map_err(GlPoolError::Io)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_round_trips_through_toml() {
        let opts = Options::default();
        let toml_str = toml::to_string_pretty(&opts).unwrap();
        let parsed: Options = toml::from_str(&toml_str).unwrap();
        assert_eq!(opts, parsed);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let toml_str = r"
[vram]
reserve_megabytes = 512
";
        let opts = Options::from_toml(toml_str).unwrap();
        assert_eq!(opts.vram.reserve_megabytes, 512);
        // Everything else should be default
        assert_eq!(opts.vram.headroom_fraction, 0.75);
        assert_eq!(opts.pool.sweep_interval_ms, 100);
        assert_eq!(
            opts.shader.benign_diagnostics,
            vec!["not read by fragment shader".to_owned()]
        );
    }

    #[test]
    fn bad_toml_is_an_options_error() {
        let err = Options::from_toml("[pool]\nsweep_interval_ms = \"soon\"")
            .unwrap_err();
        assert!(matches!(err, GlPoolError::OptionsParse(_)));
    }

    #[test]
    fn save_then_load_via_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/glpool.toml");
        let mut opts = Options::default();
        opts.debug.verbose_pools = true;
        opts.pool.surface_expiry_intervals = 3;
        opts.save(&path).unwrap();
        assert_eq!(Options::load(&path).unwrap(), opts);
    }

    #[test]
    fn schema_has_expected_properties() {
        let schema_value =
            serde_json::to_value(Options::json_schema()).unwrap();
        let props = schema_value["properties"].as_object().unwrap();

        assert!(props.contains_key("pool"));
        assert!(props.contains_key("vram"));
        assert!(props.contains_key("shader"));
        assert!(props.contains_key("debug"));

        let vram = &props["vram"]["properties"];
        assert!(vram.get("reserve_megabytes").is_some());
        assert!(vram.get("renderer_overrides").is_none());
    }
}
