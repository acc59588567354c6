//! Lookup textures for improved Perlin noise in shaders.
//!
//! Two textures, created on first use and kept for the runtime's
//! lifetime:
//!
//! - `perlinTexture` (256×256 RGBA8): texel `(x, y)` holds the four
//!   hashed corners `AA, AB, BA, BB` of the permutation lookup.
//! - `gradTexture` (256×1 RGBA8): texel `i` holds one of the 16 edge
//!   gradients, mapped from `[-1, 1]` to `[0, 255]`.

use std::sync::{Arc, Mutex};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::driver::{gl, ContextId, GlName};
use crate::pool::{TextureAllocation, TextureDescriptor, TexturePool};
use crate::util::sync::lock;

/// Uniform name receiving the permutation texture.
pub const PERLIN_UNIFORM: &str = "perlinTexture";
/// Uniform name receiving the gradient texture.
pub const GRADIENT_UNIFORM: &str = "gradTexture";

const PERLIN: TextureDescriptor = TextureDescriptor {
    target: gl::TEXTURE_2D,
    internal_format: gl::RGBA8,
    width: 256,
    height: 256,
};

const GRADIENT: TextureDescriptor = TextureDescriptor {
    target: gl::TEXTURE_2D,
    internal_format: gl::RGBA8,
    width: 256,
    height: 1,
};

const PERMUTATION_SEED: u64 = 0x2545_f491;

const GRADIENTS: [[i8; 3]; 16] = [
    [1, 1, 0],
    [-1, 1, 0],
    [1, -1, 0],
    [-1, -1, 0],
    [1, 0, 1],
    [-1, 0, 1],
    [1, 0, -1],
    [-1, 0, -1],
    [0, 1, 1],
    [0, -1, 1],
    [0, 1, -1],
    [0, -1, -1],
    [1, 1, 0],
    [0, -1, 1],
    [-1, 1, 0],
    [0, -1, -1],
];

/// The two lookup textures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoiseNames {
    /// Permutation texture.
    pub perlin: GlName,
    /// Gradient texture.
    pub gradient: GlName,
}

/// Lazily created noise lookup textures.
pub struct NoiseTextures {
    textures: Arc<TexturePool>,
    names: Mutex<Option<NoiseNames>>,
}

impl NoiseTextures {
    /// Nothing is created until [`get`](Self::get).
    #[must_use]
    pub fn new(textures: Arc<TexturePool>) -> Self {
        Self {
            textures,
            names: Mutex::new(None),
        }
    }

    /// The textures, creating them on first call. `None` if the pool
    /// refused either allocation; the next call tries again.
    pub fn get(&self, ctx: ContextId) -> Option<NoiseNames> {
        let mut names = lock(&self.names);
        if let Some(existing) = *names {
            return Some(existing);
        }

        let permutation = permutation();
        let perlin = self.upload(ctx, PERLIN, &perlin_texels(&permutation))?;
        let Some(gradient) = self.upload(ctx, GRADIENT, &gradient_texels(&permutation)) else {
            self.textures
                .release(ctx, TextureAllocation::Allocate, PERLIN, perlin);
            return None;
        };
        log::trace!("Created noise textures {perlin} and {gradient}");
        let created = NoiseNames { perlin, gradient };
        *names = Some(created);
        Some(created)
    }

    /// Whether the textures exist.
    #[must_use]
    pub fn is_created(&self) -> bool {
        lock(&self.names).is_some()
    }

    /// Hand the textures back to the pool.
    pub fn release(&self, ctx: ContextId) {
        let taken = lock(&self.names).take();
        if let Some(names) = taken {
            self.textures
                .release(ctx, TextureAllocation::Allocate, PERLIN, names.perlin);
            self.textures
                .release(ctx, TextureAllocation::Allocate, GRADIENT, names.gradient);
        }
    }

    fn upload(
        &self,
        ctx: ContextId,
        descriptor: TextureDescriptor,
        texels: &[u8],
    ) -> Option<GlName> {
        let name = self
            .textures
            .acquire(ctx, TextureAllocation::Allocate, descriptor, gl::RGBA);
        if name == 0 {
            return None;
        }
        if !self
            .textures
            .fill(ctx, name, descriptor, gl::RGBA, gl::UNSIGNED_BYTE, texels)
        {
            self.textures
                .release(ctx, TextureAllocation::Allocate, descriptor, name);
            return None;
        }
        Some(name)
    }
}

/// Deterministic shuffle of `0..=255`.
fn permutation() -> [u8; 256] {
    let mut table: [u8; 256] = std::array::from_fn(|i| i as u8);
    table.shuffle(&mut StdRng::seed_from_u64(PERMUTATION_SEED));
    table
}

fn perlin_texels(perm: &[u8; 256]) -> Vec<u8> {
    let p = |i: usize| usize::from(perm[i & 255]);
    let mut texels = Vec::with_capacity(256 * 256 * 4);
    for y in 0..256 {
        for x in 0..256 {
            let a = p(x) + y;
            let b = p(x + 1) + y;
            texels.extend([p(a), p(a + 1), p(b), p(b + 1)].map(|v| v as u8));
        }
    }
    texels
}

fn gradient_texels(perm: &[u8; 256]) -> Vec<u8> {
    perm.iter()
        .flat_map(|&i| {
            let [x, y, z] = GRADIENTS[usize::from(i) % GRADIENTS.len()];
            let scale = |v: i8| ((f32::from(v) + 1.0) * 127.5) as u8;
            [scale(x), scale(y), scale(z), 255]
        })
        .collect()
}
