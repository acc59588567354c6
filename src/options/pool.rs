use std::time::Duration;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::driver::gl;

/// Background sweep cadence and shared-surface lifetime.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[schemars(title = "Pools", inline)]
#[serde(default)]
pub struct PoolOptions {
    /// Milliseconds between sweeper wake-ups. A texture bucket idle for
    /// longer than one interval is evicted on the next sweep.
    #[schemars(title = "Sweep Interval (ms)", range(min = 10, max = 10_000))]
    pub sweep_interval_ms: u64,
    /// Shared surfaces idle in the active pool for more than this many
    /// sweep intervals are released.
    #[schemars(title = "Surface Expiry (intervals)", range(min = 1, max = 100))]
    pub surface_expiry_intervals: u32,
    /// Internal format of the rectangle textures backing shared surfaces.
    #[schemars(skip)]
    pub surface_internal_format: u32,
}

impl PoolOptions {
    /// Sweep interval as a [`Duration`].
    #[must_use]
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms.max(1))
    }

    /// Idle time after which an active shared surface is released.
    #[must_use]
    pub fn surface_expiry(&self) -> Duration {
        self.sweep_interval() * self.surface_expiry_intervals.max(1)
    }
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            sweep_interval_ms: 100,
            surface_expiry_intervals: 2,
            surface_internal_format: gl::RGBA8,
        }
    }
}
