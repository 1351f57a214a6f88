//! Views of the GPU objects held by the cache.

use crate::format::TextureDescriptor;
use crate::gfx::{ProgramId, TextureId};
use serde::Serialize;

/// A texture owned by the cache.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CachedTexture {
    pub id: TextureId,
    pub descriptor: TextureDescriptor,
    pub render_target: bool,
}

/// A linked shader program owned by the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CachedShader {
    pub id: ProgramId,
}

/// Cache table value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum CachedObject {
    Texture(CachedTexture),
    Shader(CachedShader),
}

impl CachedObject {
    pub fn as_texture(&self) -> Option<&CachedTexture> {
        match self {
            CachedObject::Texture(texture) => Some(texture),
            CachedObject::Shader(_) => None,
        }
    }

    pub fn as_shader(&self) -> Option<&CachedShader> {
        match self {
            CachedObject::Shader(shader) => Some(shader),
            CachedObject::Texture(_) => None,
        }
    }

    /// Estimated VRAM footprint. Shaders count as zero.
    pub fn estimated_bytes(&self) -> u64 {
        match self {
            CachedObject::Texture(texture) => texture.descriptor.estimated_bytes(),
            CachedObject::Shader(_) => 0,
        }
    }
}
