use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Diagnostics toggles.
#[derive(
    Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default, JsonSchema,
)]
#[schemars(title = "Debug", inline)]
#[serde(default)]
pub struct DebugOptions {
    /// Log VRAM and pool statistics at `debug` level on every change.
    #[schemars(title = "Verbose Pools")]
    pub verbose_pools: bool,
    /// Validate each program the first time a context uses it and log
    /// the validation output.
    #[schemars(title = "Validate Programs")]
    pub validate_programs: bool,
}
