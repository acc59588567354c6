//! Uniform values a [`Shader`](super::Shader) carries between activations.

use glam::{Mat2, Mat3, Mat4, Vec2, Vec3, Vec4};

use crate::image::Image;

/// Straight-alpha RGBA color.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    /// Red.
    pub r: f32,
    /// Green.
    pub g: f32,
    /// Blue.
    pub b: f32,
    /// Alpha.
    pub a: f32,
}

impl Color {
    /// A color from components.
    #[must_use]
    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// RGB multiplied by alpha, as shaders expect.
    #[must_use]
    pub fn premultiplied(self) -> Vec4 {
        Vec4::new(self.r * self.a, self.g * self.a, self.b * self.a, self.a)
    }
}

/// A value bound to a uniform name.
///
/// List variants upload as arrays; the shader may also declare
/// `<name>Count` to receive the element count.
#[derive(Debug, Clone, PartialEq)]
pub enum UniformValue {
    /// `bool`, uploaded as 0/1.
    Bool(bool),
    /// `int`.
    Int(i32),
    /// `float`.
    Float(f32),
    /// `vec2`.
    Vec2(Vec2),
    /// `vec3`.
    Vec3(Vec3),
    /// `vec4`.
    Vec4(Vec4),
    /// `vec4`, premultiplied on upload.
    Color(Color),
    /// `mat2`.
    Mat2(Mat2),
    /// `mat3`.
    Mat3(Mat3),
    /// `mat4`.
    Mat4(Mat4),
    /// A sampler. `None` binds nothing to the unit it occupies.
    Image(Option<Image>),
    /// `int[]`.
    IntList(Vec<i32>),
    /// `float[]`.
    FloatList(Vec<f32>),
    /// `vec2[]`.
    Vec2List(Vec<Vec2>),
    /// `vec3[]`.
    Vec3List(Vec<Vec3>),
    /// `vec4[]`.
    Vec4List(Vec<Vec4>),
    /// `vec4[]` of premultiplied colors.
    ColorList(Vec<Color>),
    /// Sampler array; one unit per element.
    ImageList(Vec<Option<Image>>),
}

impl UniformValue {
    /// Short type name for summaries.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Vec2(_) => "vec2",
            Self::Vec3(_) => "vec3",
            Self::Vec4(_) | Self::Color(_) => "vec4",
            Self::Mat2(_) => "mat2",
            Self::Mat3(_) => "mat3",
            Self::Mat4(_) => "mat4",
            Self::Image(_) => "sampler",
            Self::IntList(_) => "int[]",
            Self::FloatList(_) => "float[]",
            Self::Vec2List(_) => "vec2[]",
            Self::Vec3List(_) => "vec3[]",
            Self::Vec4List(_) | Self::ColorList(_) => "vec4[]",
            Self::ImageList(_) => "sampler[]",
        }
    }

    /// Element count for list values, `None` for scalars.
    #[must_use]
    pub fn list_len(&self) -> Option<usize> {
        match self {
            Self::IntList(v) => Some(v.len()),
            Self::FloatList(v) => Some(v.len()),
            Self::Vec2List(v) => Some(v.len()),
            Self::Vec3List(v) => Some(v.len()),
            Self::Vec4List(v) => Some(v.len()),
            Self::ColorList(v) => Some(v.len()),
            Self::ImageList(v) => Some(v.len()),
            _ => None,
        }
    }
}

macro_rules! uniform_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for UniformValue {
                fn from(value: $ty) -> Self {
                    Self::$variant(value)
                }
            }
        )*
    };
}

uniform_from! {
    bool => Bool,
    i32 => Int,
    f32 => Float,
    Vec2 => Vec2,
    Vec3 => Vec3,
    Vec4 => Vec4,
    Color => Color,
    Mat2 => Mat2,
    Mat3 => Mat3,
    Mat4 => Mat4,
    Option<Image> => Image,
    Vec<i32> => IntList,
    Vec<f32> => FloatList,
    Vec<Vec2> => Vec2List,
    Vec<Vec3> => Vec3List,
    Vec<Vec4> => Vec4List,
    Vec<Color> => ColorList,
    Vec<Option<Image>> => ImageList,
}

impl From<Image> for UniformValue {
    fn from(image: Image) -> Self {
        Self::Image(Some(image))
    }
}
