//! Crate-level error types.
//!
//! Pool and cache hot paths never return these: they report through `log`
//! and hand back a zero handle or `None`. [`GlPoolError`] covers the setup
//! surface (options files, shared-surface descriptors, runtime start-up).

use std::fmt;

/// Errors produced by the glpool crate.
#[derive(Debug)]
pub enum GlPoolError {
    /// Generic I/O failure.
    Io(std::io::Error),
    /// TOML options parsing/serialization failure.
    OptionsParse(String),
    /// A shared-surface descriptor could not be parsed or serialized.
    Descriptor(serde_json::Error),
    /// Failed to spawn the background sweeper thread.
    ThreadSpawn(std::io::Error),
}

impl fmt::Display for GlPoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::OptionsParse(msg) => {
                write!(f, "options parse error: {msg}")
            }
            Self::Descriptor(e) => {
                write!(f, "shared-surface descriptor error: {e}")
            }
            Self::ThreadSpawn(e) => {
                write!(f, "failed to spawn thread: {e}")
            }
        }
    }
}

impl std::error::Error for GlPoolError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) | Self::ThreadSpawn(e) => Some(e),
            Self::Descriptor(e) => Some(e),
            Self::OptionsParse(_) => None,
        }
    }
}

impl From<std::io::Error> for GlPoolError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<serde_json::Error> for GlPoolError {
    fn from(e: serde_json::Error) -> Self {
        Self::Descriptor(e)
    }
}
