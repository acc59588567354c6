//! JSON forms of an image.
//!
//! Within one process an image travels as its texture name
//! ([`TextureJson`]); across processes as a shared surface
//! ([`SurfaceDescriptor`]). [`ImageJson`] accepts either.

use serde::{Deserialize, Serialize};

use crate::driver::SurfaceId;
use crate::error::GlPoolError;
use crate::pool::SharedSurface;

fn unit_scale() -> f32 {
    1.0
}

/// Wire form of a shared surface.
///
/// ```json
/// {"ioSurface": 7, "pixelsWide": 640, "pixelsHigh": 480, "scaleFactor": 2.0}
/// ```
///
/// `scaleFactor` is optional on input and defaults to 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SurfaceDescriptor {
    /// Global surface id.
    #[serde(rename = "ioSurface")]
    pub surface: u32,
    /// Width in pixels.
    pub pixels_wide: u32,
    /// Height in pixels.
    pub pixels_high: u32,
    /// Points-to-pixels ratio.
    #[serde(default = "unit_scale")]
    pub scale_factor: f32,
}

impl SurfaceDescriptor {
    /// Describe a checked-out surface.
    #[must_use]
    pub fn for_surface(surface: &SharedSurface, scale_factor: f32) -> Self {
        Self {
            surface: surface.id.0,
            pixels_wide: surface.width,
            pixels_high: surface.height,
            scale_factor,
        }
    }

    /// The surface id.
    #[must_use]
    pub fn surface_id(&self) -> SurfaceId {
        SurfaceId(self.surface)
    }

    /// Serialize to JSON.
    ///
    /// # Errors
    ///
    /// Returns [`GlPoolError::Descriptor`] if serialization fails.
    pub fn to_json(&self) -> Result<String, GlPoolError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse from JSON.
    ///
    /// # Errors
    ///
    /// Returns [`GlPoolError::Descriptor`] for malformed input or missing
    /// required keys.
    pub fn from_json(json: &str) -> Result<Self, GlPoolError> {
        Ok(serde_json::from_str(json)?)
    }
}

/// In-process wire form: a texture name in this share group.
///
/// ```json
/// {"glTextureName": 42, "glInternalFormat": 32856, "pixelsWide": 640, "pixelsHigh": 480}
/// ```
///
/// `glInternalFormat` is optional on input and defaults to 0 (unknown).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextureJson {
    /// GL texture name.
    pub gl_texture_name: u32,
    /// Internal format.
    #[serde(default)]
    pub gl_internal_format: u32,
    /// Width in pixels.
    pub pixels_wide: u32,
    /// Height in pixels.
    pub pixels_high: u32,
}

/// Either JSON form of an image. A texture name takes precedence.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ImageJson {
    /// Texture in this process's share group.
    Texture(TextureJson),
    /// Shared surface from another process.
    Surface(SurfaceDescriptor),
}

impl ImageJson {
    /// Parse either form.
    ///
    /// # Errors
    ///
    /// Returns [`GlPoolError::Descriptor`] when the input is malformed or
    /// matches neither form.
    pub fn from_json(json: &str) -> Result<Self, GlPoolError> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uses_wire_key_names() {
        let descriptor = SurfaceDescriptor {
            surface: 7,
            pixels_wide: 640,
            pixels_high: 480,
            scale_factor: 2.0,
        };
        let json = descriptor.to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["ioSurface"], 7);
        assert_eq!(value["pixelsWide"], 640);
        assert_eq!(value["pixelsHigh"], 480);
        assert_eq!(value["scaleFactor"], 2.0);
    }

    #[test]
    fn scale_factor_defaults_to_one() {
        let parsed =
            SurfaceDescriptor::from_json(r#"{"ioSurface":3,"pixelsWide":8,"pixelsHigh":4}"#)
                .unwrap();
        assert_eq!(parsed.surface_id(), SurfaceId(3));
        assert_eq!((parsed.pixels_wide, parsed.pixels_high), (8, 4));
        assert!((parsed.scale_factor - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn missing_keys_are_an_error() {
        let err = SurfaceDescriptor::from_json(r#"{"ioSurface":3}"#).unwrap_err();
        assert!(matches!(err, GlPoolError::Descriptor(_)));
    }

    #[test]
    fn texture_name_selects_in_process_form() {
        let parsed = ImageJson::from_json(
            r#"{"glTextureName":42,"glInternalFormat":6407,"pixelsWide":640,"pixelsHigh":480}"#,
        )
        .unwrap();
        assert_eq!(
            parsed,
            ImageJson::Texture(TextureJson {
                gl_texture_name: 42,
                gl_internal_format: 6407,
                pixels_wide: 640,
                pixels_high: 480,
            })
        );
        let surface =
            ImageJson::from_json(r#"{"ioSurface":5,"pixelsWide":2,"pixelsHigh":2}"#).unwrap();
        assert!(matches!(surface, ImageJson::Surface(d) if d.surface == 5));
        assert!(ImageJson::from_json(r#"{"pixelsWide":2,"pixelsHigh":2}"#).is_err());
    }
}
