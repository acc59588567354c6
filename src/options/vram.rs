use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Headroom override for renderers whose driver misbehaves near the limit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct RendererOverride {
    /// Case-insensitive substring matched against the renderer string.
    pub pattern: String,
    /// Fraction of (reported memory − reserve) usable for textures.
    #[schemars(range(min = 0.0, max = 1.0))]
    pub headroom_fraction: f32,
}

/// Texture memory budget used by the texture pool's allocation guard.
///
/// The budget is `(reported_mb - reserve_megabytes) * headroom_fraction`,
/// where the first matching [`RendererOverride`] replaces the default
/// fraction. Integrated GPUs that share system memory get a tighter
/// fraction by default.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
#[schemars(title = "VRAM", inline)]
#[serde(default)]
pub struct VramOptions {
    /// Megabytes always held back from the reported texture memory.
    #[schemars(title = "Reserve (MB)", range(min = 0, max = 4096))]
    pub reserve_megabytes: u64,
    /// Fraction of the remainder that pooled textures may use.
    #[schemars(
        title = "Headroom",
        range(min = 0.05, max = 1.0),
        extend("step" = 0.05)
    )]
    pub headroom_fraction: f32,
    /// Per-renderer headroom overrides, first match wins.
    #[schemars(skip)]
    pub renderer_overrides: Vec<RendererOverride>,
    /// Clamp on the driver's maximum texture dimension, if set.
    #[schemars(title = "Max Dimension Override")]
    pub max_dimension_override: Option<u32>,
}

impl VramOptions {
    /// Headroom fraction for the given renderer string.
    #[must_use]
    pub fn headroom_for(&self, renderer: &str) -> f32 {
        let renderer = renderer.to_lowercase();
        self.renderer_overrides
            .iter()
            .find(|o| renderer.contains(&o.pattern.to_lowercase()))
            .map_or(self.headroom_fraction, |o| o.headroom_fraction)
    }
}

impl Default for VramOptions {
    fn default() -> Self {
        Self {
            reserve_megabytes: 256,
            headroom_fraction: 0.75,
            renderer_overrides: vec![
                RendererOverride {
                    pattern: "Intel HD Graphics".to_owned(),
                    headroom_fraction: 0.4,
                },
                RendererOverride {
                    pattern: "Intel Iris".to_owned(),
                    headroom_fraction: 0.5,
                },
            ],
            max_dimension_override: None,
        }
    }
}
