//! Stage kinds and the shading-dialect front end.
//!
//! Authored shaders are plain GLSL with one convenience: a bare
//! `include(Name)` token (as written inside [`glsl_source`] bodies)
//! becomes an `#include "Name.glsl"` directive on its own line. Directive
//! expansion itself happens in [`super::include`].

use std::fmt;

use crate::driver::{gl, GlEnum};

/// Shader pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StageKind {
    /// Vertex stage.
    Vertex,
    /// Geometry stage.
    Geometry,
    /// Fragment stage.
    Fragment,
}

impl StageKind {
    /// GL shader type.
    #[must_use]
    pub fn gl_enum(self) -> GlEnum {
        match self {
            Self::Vertex => gl::VERTEX_SHADER,
            Self::Geometry => gl::GEOMETRY_SHADER,
            Self::Fragment => gl::FRAGMENT_SHADER,
        }
    }

    /// Lower-case stage name.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Vertex => "vertex",
            Self::Geometry => "geometry",
            Self::Fragment => "fragment",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Vertex shader used when a subshader is registered without one.
///
/// Passes the texture coordinate through and projects `position`.
pub const DEFAULT_VERTEX_SOURCE: &str = "#version 120
uniform mat4 projectionMatrix;
uniform mat4 modelviewMatrix;
attribute vec3 position;
attribute vec2 textureCoordinate;
varying vec2 fragmentTextureCoordinate;
void main()
{
    fragmentTextureCoordinate = textureCoordinate;
    gl_Position = projectionMatrix * modelviewMatrix * vec4(position, 1.);
}
";

fn is_ident(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Build GLSL text: a `#version` line followed by `body` with every
/// `include(Name)` token rewritten to an `#include "Name.glsl"` line.
#[must_use]
pub fn glsl_source(version: u32, body: &str) -> String {
    const TOKEN: &str = "include(";
    let mut out = format!("#version {version}\n");
    let mut rest = body;
    while let Some(at) = rest.find(TOKEN) {
        let preceded_by_ident = rest[..at]
            .chars()
            .next_back()
            .is_some_and(|c| is_ident(c) || c == '#');
        let after = &rest[at + TOKEN.len()..];
        let name_len = after.chars().take_while(|c| is_ident(*c)).count();
        let closed = after[name_len..].starts_with(')');
        if preceded_by_ident || name_len == 0 || !closed {
            out.push_str(&rest[..at + TOKEN.len()]);
            rest = after;
            continue;
        }
        out.push_str(&rest[..at]);
        out.push_str("\n#include \"");
        out.push_str(&after[..name_len]);
        out.push_str(".glsl\"\n");
        rest = &after[name_len + 1..];
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rewrites_include_tokens() {
        let src = glsl_source(120, "include(noise3D) void main(){}");
        assert_eq!(
            src,
            "#version 120\n\n#include \"noise3D.glsl\"\n void main(){}"
        );
    }

    #[test]
    fn leaves_lookalikes_alone() {
        let body = "float myinclude(x) ; include( ) ; #include(x)";
        let src = glsl_source(330, body);
        assert_eq!(src, format!("#version 330\n{body}"));
    }

    #[test]
    fn stage_enums_match_gl() {
        assert_eq!(StageKind::Fragment.gl_enum(), gl::FRAGMENT_SHADER);
        assert_eq!(StageKind::Geometry.to_string(), "geometry");
    }
}
