//! Value-type keys identifying pool buckets.

use std::fmt;

use crate::driver::{gl, GlEnum};
use crate::gpu::format;

/// Buffer targets the buffer pool knows how to allocate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BufferKind {
    /// Vertex attribute data.
    Array,
    /// Index data.
    ElementArray,
    /// Transform-feedback capture.
    TransformFeedback,
    /// Uniform blocks.
    Uniform,
    /// Pixel read-back.
    PixelPack,
    /// Pixel upload staging.
    PixelUnpack,
}

impl BufferKind {
    /// Kind for a GL buffer target, or `None` if unsupported.
    #[must_use]
    pub fn from_target(target: GlEnum) -> Option<Self> {
        Some(match target {
            gl::ARRAY_BUFFER => Self::Array,
            gl::ELEMENT_ARRAY_BUFFER => Self::ElementArray,
            gl::TRANSFORM_FEEDBACK_BUFFER => Self::TransformFeedback,
            gl::UNIFORM_BUFFER => Self::Uniform,
            gl::PIXEL_PACK_BUFFER => Self::PixelPack,
            gl::PIXEL_UNPACK_BUFFER => Self::PixelUnpack,
            _ => return None,
        })
    }

    /// GL buffer target.
    #[must_use]
    pub fn target(self) -> GlEnum {
        match self {
            Self::Array => gl::ARRAY_BUFFER,
            Self::ElementArray => gl::ELEMENT_ARRAY_BUFFER,
            Self::TransformFeedback => gl::TRANSFORM_FEEDBACK_BUFFER,
            Self::Uniform => gl::UNIFORM_BUFFER,
            Self::PixelPack => gl::PIXEL_PACK_BUFFER,
            Self::PixelUnpack => gl::PIXEL_UNPACK_BUFFER,
        }
    }
}

/// Buffer bucket key: `(kind, byte_size)`, exact match only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferDescriptor {
    /// Buffer kind.
    pub kind: BufferKind,
    /// Size in bytes.
    pub byte_size: usize,
}

impl fmt::Display for BufferDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} bytes",
            format::name(self.kind.target()),
            self.byte_size
        )
    }
}

/// Texture bucket key: `(target, internal_format, width, height)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureDescriptor {
    /// Texture target.
    pub target: GlEnum,
    /// Internal format (0 means unknown; such textures are never pooled).
    pub internal_format: GlEnum,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl TextureDescriptor {
    /// A `GL_TEXTURE_2D` descriptor.
    #[must_use]
    pub fn texture_2d(internal_format: GlEnum, width: u32, height: u32) -> Self {
        Self {
            target: gl::TEXTURE_2D,
            internal_format,
            width,
            height,
        }
    }

    /// A `GL_TEXTURE_RECTANGLE` descriptor.
    #[must_use]
    pub fn rectangle(internal_format: GlEnum, width: u32, height: u32) -> Self {
        Self {
            target: gl::TEXTURE_RECTANGLE,
            internal_format,
            width,
            height,
        }
    }

    /// Storage size in bytes.
    #[must_use]
    pub fn bytes(&self) -> u64 {
        format::texture_bytes(self.internal_format, self.width, self.height)
    }
}

impl fmt::Display for TextureDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}x{}",
            format::name(self.target),
            format::name(self.internal_format),
            self.width,
            self.height
        )
    }
}
