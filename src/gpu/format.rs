//! Sizing and naming helpers for GL pixel formats.
//!
//! Unknown values are reported with their hex rendering and a
//! conservative fallback (one channel, one byte) is returned, so a caller
//! with an unusual format can keep going.

use crate::driver::{gl, GlEnum};

/// Channel count of an internal or client format.
#[must_use]
pub fn channels(format: GlEnum) -> u32 {
    match format {
        gl::RED
        | gl::ALPHA
        | gl::LUMINANCE
        | gl::DEPTH_COMPONENT
        | gl::R8
        | gl::R16F
        | gl::R32F
        | gl::LUMINANCE8
        | gl::LUMINANCE16F
        | gl::LUMINANCE32F
        | gl::DEPTH_COMPONENT16
        | gl::DEPTH_COMPONENT24
        | gl::DEPTH_COMPONENT32F => 1,
        gl::RG
        | gl::RG8
        | gl::LUMINANCE_ALPHA
        | gl::LUMINANCE8_ALPHA8
        | gl::LUMINANCE_ALPHA16F
        | gl::LUMINANCE_ALPHA32F => 2,
        gl::RGB | gl::BGR | gl::RGB8 | gl::RGB16F | gl::RGB32F => 3,
        gl::RGBA | gl::BGRA | gl::RGBA8 | gl::RGBA16F | gl::RGBA32F => 4,
        other => {
            log::error!("Unknown format {}", name(other));
            1
        }
    }
}

/// Bytes per channel of an internal format.
#[must_use]
pub fn bytes_per_channel(internal_format: GlEnum) -> u32 {
    match internal_format {
        gl::R16F
        | gl::RGB16F
        | gl::RGBA16F
        | gl::LUMINANCE16F
        | gl::LUMINANCE_ALPHA16F
        | gl::DEPTH_COMPONENT16 => 2,
        gl::DEPTH_COMPONENT24 => 3,
        gl::R32F
        | gl::RGB32F
        | gl::RGBA32F
        | gl::LUMINANCE32F
        | gl::LUMINANCE_ALPHA32F
        | gl::DEPTH_COMPONENT32F => 4,
        gl::RED
        | gl::RG
        | gl::RGB
        | gl::RGBA
        | gl::BGR
        | gl::BGRA
        | gl::ALPHA
        | gl::LUMINANCE
        | gl::LUMINANCE_ALPHA
        | gl::R8
        | gl::RG8
        | gl::RGB8
        | gl::RGBA8
        | gl::LUMINANCE8
        | gl::LUMINANCE8_ALPHA8 => 1,
        other => {
            log::error!("Unknown internal format {}", name(other));
            1
        }
    }
}

/// Bytes per pixel of an internal format.
#[must_use]
pub fn bytes_per_pixel(internal_format: GlEnum) -> u32 {
    channels(internal_format) * bytes_per_channel(internal_format)
}

/// Bytes of storage a `width`×`height` texture of `internal_format` needs.
#[must_use]
pub fn texture_bytes(internal_format: GlEnum, width: u32, height: u32) -> u64 {
    u64::from(bytes_per_pixel(internal_format))
        * u64::from(width)
        * u64::from(height)
}

/// Client format and component type for allocating empty storage of
/// `internal_format`.
#[must_use]
pub fn upload_layout(internal_format: GlEnum) -> (GlEnum, GlEnum) {
    let component_type = match internal_format {
        gl::DEPTH_COMPONENT16 => gl::UNSIGNED_SHORT,
        gl::DEPTH_COMPONENT24 | gl::DEPTH_COMPONENT32F => gl::FLOAT,
        _ => match bytes_per_channel(internal_format) {
            2 => gl::HALF_FLOAT,
            4 => gl::FLOAT,
            _ => gl::UNSIGNED_BYTE,
        },
    };
    let format = match internal_format {
        gl::DEPTH_COMPONENT16 | gl::DEPTH_COMPONENT24 | gl::DEPTH_COMPONENT32F => {
            gl::DEPTH_COMPONENT
        }
        _ => match channels(internal_format) {
            1 => gl::LUMINANCE,
            2 => gl::LUMINANCE_ALPHA,
            3 => gl::RGB,
            _ => gl::BGRA,
        },
    };
    (format, component_type)
}

/// Internal format to use when uploading client pixels of `format` with
/// component type `component_type`.
#[must_use]
pub fn internal_format_for(format: GlEnum, component_type: GlEnum) -> GlEnum {
    let float = matches!(component_type, gl::FLOAT);
    let half = matches!(component_type, gl::HALF_FLOAT);
    match (format, float, half) {
        (gl::RGBA | gl::BGRA, false, false) => gl::RGBA8,
        (gl::RGBA | gl::BGRA, true, _) => gl::RGBA32F,
        (gl::RGBA | gl::BGRA, _, true) => gl::RGBA16F,
        (gl::RGB | gl::BGR, false, false) => gl::RGB8,
        (gl::RGB | gl::BGR, true, _) => gl::RGB32F,
        (gl::RGB | gl::BGR, _, true) => gl::RGB16F,
        (gl::LUMINANCE | gl::RED, false, false) => gl::LUMINANCE8,
        (gl::LUMINANCE | gl::RED, true, _) => gl::LUMINANCE32F,
        (gl::LUMINANCE | gl::RED, _, true) => gl::LUMINANCE16F,
        (gl::LUMINANCE_ALPHA | gl::RG, false, false) => gl::LUMINANCE8_ALPHA8,
        (gl::LUMINANCE_ALPHA | gl::RG, true, _) => gl::LUMINANCE_ALPHA32F,
        (gl::LUMINANCE_ALPHA | gl::RG, _, true) => gl::LUMINANCE_ALPHA16F,
        (gl::DEPTH_COMPONENT, _, _) => gl::DEPTH_COMPONENT16,
        (other, _, _) => {
            log::error!("Unknown pixel format {}", name(other));
            gl::RGBA8
        }
    }
}

/// Readable name of a GL enum value, or its hex rendering.
#[must_use]
pub fn name(value: GlEnum) -> String {
    let known = match value {
        gl::TEXTURE_2D => "GL_TEXTURE_2D",
        gl::TEXTURE_RECTANGLE => "GL_TEXTURE_RECTANGLE",
        gl::RED => "GL_RED",
        gl::RG => "GL_RG",
        gl::RGB => "GL_RGB",
        gl::RGBA => "GL_RGBA",
        gl::BGR => "GL_BGR",
        gl::BGRA => "GL_BGRA",
        gl::ALPHA => "GL_ALPHA",
        gl::LUMINANCE => "GL_LUMINANCE",
        gl::LUMINANCE_ALPHA => "GL_LUMINANCE_ALPHA",
        gl::DEPTH_COMPONENT => "GL_DEPTH_COMPONENT",
        gl::R8 => "GL_R8",
        gl::RG8 => "GL_RG8",
        gl::RGB8 => "GL_RGB8",
        gl::RGBA8 => "GL_RGBA8",
        gl::R16F => "GL_R16F",
        gl::R32F => "GL_R32F",
        gl::RGB16F => "GL_RGB16F",
        gl::RGBA16F => "GL_RGBA16F",
        gl::RGB32F => "GL_RGB32F",
        gl::RGBA32F => "GL_RGBA32F",
        gl::LUMINANCE8 => "GL_LUMINANCE8",
        gl::LUMINANCE8_ALPHA8 => "GL_LUMINANCE8_ALPHA8",
        gl::LUMINANCE16F => "GL_LUMINANCE16F_ARB",
        gl::LUMINANCE32F => "GL_LUMINANCE32F_ARB",
        gl::LUMINANCE_ALPHA16F => "GL_LUMINANCE_ALPHA16F_ARB",
        gl::LUMINANCE_ALPHA32F => "GL_LUMINANCE_ALPHA32F_ARB",
        gl::DEPTH_COMPONENT16 => "GL_DEPTH_COMPONENT16",
        gl::DEPTH_COMPONENT24 => "GL_DEPTH_COMPONENT24",
        gl::DEPTH_COMPONENT32F => "GL_DEPTH_COMPONENT32F",
        gl::ARRAY_BUFFER => "GL_ARRAY_BUFFER",
        gl::ELEMENT_ARRAY_BUFFER => "GL_ELEMENT_ARRAY_BUFFER",
        gl::TRANSFORM_FEEDBACK_BUFFER => "GL_TRANSFORM_FEEDBACK_BUFFER",
        gl::UNIFORM_BUFFER => "GL_UNIFORM_BUFFER",
        gl::PIXEL_PACK_BUFFER => "GL_PIXEL_PACK_BUFFER",
        gl::PIXEL_UNPACK_BUFFER => "GL_PIXEL_UNPACK_BUFFER",
        gl::UNSIGNED_BYTE => "GL_UNSIGNED_BYTE",
        gl::FLOAT => "GL_FLOAT",
        gl::HALF_FLOAT => "GL_HALF_FLOAT",
        0 => "(none)",
        _ => return format!("(unknown 0x{value:04X})"),
    };
    known.to_owned()
}
