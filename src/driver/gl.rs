//! OpenGL enum values used by the pools and caches.
//!
//! Kept as plain `u32` constants so the core never depends on a GL binding
//! crate; the values match the Khronos registry.

#![allow(missing_docs)]

use super::GlEnum;

// Texture targets and units
pub const TEXTURE_2D: GlEnum = 0x0DE1;
pub const TEXTURE_RECTANGLE: GlEnum = 0x84F5;
pub const TEXTURE0: GlEnum = 0x84C0;

// Sampling parameters
pub const TEXTURE_MAG_FILTER: GlEnum = 0x2800;
pub const TEXTURE_MIN_FILTER: GlEnum = 0x2801;
pub const TEXTURE_WRAP_S: GlEnum = 0x2802;
pub const TEXTURE_WRAP_T: GlEnum = 0x2803;
pub const LINEAR: GlEnum = 0x2601;
pub const CLAMP_TO_EDGE: GlEnum = 0x812F;
pub const REPEAT: GlEnum = 0x2901;

// Pixel formats
pub const DEPTH_COMPONENT: GlEnum = 0x1902;
pub const RED: GlEnum = 0x1903;
pub const ALPHA: GlEnum = 0x1906;
pub const RGB: GlEnum = 0x1907;
pub const RGBA: GlEnum = 0x1908;
pub const LUMINANCE: GlEnum = 0x1909;
pub const LUMINANCE_ALPHA: GlEnum = 0x190A;
pub const BGR: GlEnum = 0x80E0;
pub const BGRA: GlEnum = 0x80E1;
pub const RG: GlEnum = 0x8227;

// Internal formats
pub const LUMINANCE8: GlEnum = 0x8040;
pub const LUMINANCE8_ALPHA8: GlEnum = 0x8045;
pub const RGB8: GlEnum = 0x8051;
pub const RGBA8: GlEnum = 0x8058;
pub const DEPTH_COMPONENT16: GlEnum = 0x81A5;
pub const DEPTH_COMPONENT24: GlEnum = 0x81A6;
pub const R8: GlEnum = 0x8229;
pub const RG8: GlEnum = 0x822B;
pub const R16F: GlEnum = 0x822D;
pub const R32F: GlEnum = 0x822E;
pub const RGBA32F: GlEnum = 0x8814;
pub const RGB32F: GlEnum = 0x8815;
pub const LUMINANCE32F: GlEnum = 0x8818;
pub const LUMINANCE_ALPHA32F: GlEnum = 0x8819;
pub const RGBA16F: GlEnum = 0x881A;
pub const RGB16F: GlEnum = 0x881B;
pub const LUMINANCE16F: GlEnum = 0x881E;
pub const LUMINANCE_ALPHA16F: GlEnum = 0x881F;
pub const DEPTH_COMPONENT32F: GlEnum = 0x8CAC;

// Component types
pub const UNSIGNED_BYTE: GlEnum = 0x1401;
pub const UNSIGNED_SHORT: GlEnum = 0x1403;
pub const FLOAT: GlEnum = 0x1406;
pub const HALF_FLOAT: GlEnum = 0x140B;
pub const UNSIGNED_INT_8_8_8_8_REV: GlEnum = 0x8367;

// Buffer targets and usage
pub const ARRAY_BUFFER: GlEnum = 0x8892;
pub const ELEMENT_ARRAY_BUFFER: GlEnum = 0x8893;
pub const PIXEL_PACK_BUFFER: GlEnum = 0x88EB;
pub const PIXEL_UNPACK_BUFFER: GlEnum = 0x88EC;
pub const UNIFORM_BUFFER: GlEnum = 0x8A11;
pub const TRANSFORM_FEEDBACK_BUFFER: GlEnum = 0x8C8E;
pub const STREAM_DRAW: GlEnum = 0x88E0;

// Shader stages
pub const FRAGMENT_SHADER: GlEnum = 0x8B30;
pub const VERTEX_SHADER: GlEnum = 0x8B31;
pub const GEOMETRY_SHADER: GlEnum = 0x8DD9;

// Primitive topologies
pub const POINTS: GlEnum = 0x0000;
pub const LINES: GlEnum = 0x0001;
pub const LINE_STRIP: GlEnum = 0x0003;
pub const TRIANGLES: GlEnum = 0x0004;
pub const TRIANGLE_STRIP: GlEnum = 0x0005;
pub const TRIANGLE_FAN: GlEnum = 0x0006;

pub const INTERLEAVED_ATTRIBS: GlEnum = 0x8C8C;
