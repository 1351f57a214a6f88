//! Resource descriptors used as cache keys.
//!
//! A handle is an immutable value: two equal handles always address the same
//! cache slot, no matter which thread built them.

use crate::format::WrapMode;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Width and height in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const ZERO: Size = Size { width: 0, height: 0 };

    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Smallest power-of-two size that covers this one on both axes.
    pub fn next_power_of_two(self) -> Self {
        Self { width: self.width.next_power_of_two(), height: self.height.next_power_of_two() }
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Describes a texture to be uploaded, and how.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TextureResource {
    pub name: String,
    /// Where the pixels come from. `None` produces a blank texture.
    pub path: Option<PathBuf>,
    /// Explicit size; source images are scaled to it.
    pub size: Option<Size>,
    pub height_map: bool,
    pub normal_map: bool,
    pub not_alpha: bool,
    pub not_compressible: bool,
    pub not_mipmapped: bool,
    pub forced_nearest: bool,
    pub render_target: bool,
    /// Render targets with the same depth id share one depth buffer.
    pub depth_id: i32,
    pub border: u32,
    pub wrap_s: WrapMode,
    pub wrap_t: WrapMode,
}

impl TextureResource {
    fn base(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: None,
            size: None,
            height_map: false,
            normal_map: false,
            not_alpha: false,
            not_compressible: false,
            not_mipmapped: false,
            forced_nearest: false,
            render_target: false,
            depth_id: 0,
            border: 0,
            wrap_s: WrapMode::Tile,
            wrap_t: WrapMode::Tile,
        }
    }

    /// A texture read from `path`.
    pub fn file(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self { path: Some(path.into()), ..Self::base(name) }
    }

    /// A texture read from `path`, named after it.
    ///
    /// The name is the path without its extension, using `/` separators, so
    /// `textures\wall.png` and `textures/wall.png` both become `textures/wall`.
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        Self::file(resource_name(path), path)
    }

    /// A blank texture of the given size.
    pub fn blank(name: impl Into<String>, size: Size) -> Self {
        Self { size: Some(size), ..Self::base(name) }
    }

    /// A render-target texture in depth group `depth_id`.
    ///
    /// Without an explicit size it covers the canvas, rounded up to powers of two.
    pub fn render_target(name: impl Into<String>, depth_id: i32) -> Self {
        Self { render_target: true, depth_id, ..Self::base(name) }
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.size = Some(Size::new(width, height));
        self
    }

    pub fn with_height_map(mut self) -> Self {
        self.height_map = true;
        self
    }

    pub fn with_normal_map(mut self) -> Self {
        self.normal_map = true;
        self
    }

    pub fn without_alpha(mut self) -> Self {
        self.not_alpha = true;
        self
    }

    pub fn uncompressed(mut self) -> Self {
        self.not_compressible = true;
        self
    }

    pub fn without_mipmaps(mut self) -> Self {
        self.not_mipmapped = true;
        self
    }

    pub fn with_nearest(mut self) -> Self {
        self.forced_nearest = true;
        self
    }

    pub fn with_border(mut self, border: u32) -> Self {
        self.border = border;
        self
    }

    pub fn with_wrap(mut self, wrap_s: WrapMode, wrap_t: WrapMode) -> Self {
        self.wrap_s = wrap_s;
        self.wrap_t = wrap_t;
        self
    }
}

/// Constant value bound to a shader uniform once the program links.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UniformValue {
    Int(i32),
    Float(f32),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
}

impl UniformValue {
    /// Variant tag plus raw float bits, so equal values hash equally and NaN equals itself.
    fn bits(&self) -> (u8, [u32; 4]) {
        let pad = |values: &[f32]| {
            let mut out = [0; 4];
            for (slot, value) in out.iter_mut().zip(values) {
                *slot = value.to_bits();
            }
            out
        };
        match self {
            UniformValue::Int(value) => (0, [*value as u32, 0, 0, 0]),
            UniformValue::Float(value) => (1, pad(&[*value])),
            UniformValue::Vec2(values) => (2, pad(values)),
            UniformValue::Vec3(values) => (3, pad(values)),
            UniformValue::Vec4(values) => (4, pad(values)),
        }
    }
}

impl PartialEq for UniformValue {
    fn eq(&self, other: &Self) -> bool {
        self.bits() == other.bits()
    }
}

impl Eq for UniformValue {}

impl Hash for UniformValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.bits().hash(state);
    }
}

/// Describes a shader program assembled from up to three stage sources.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShaderResource {
    pub name: String,
    pub vertex: Option<PathBuf>,
    pub geometry: Option<PathBuf>,
    pub fragment: Option<PathBuf>,
    /// Set on the program after it links, in this order.
    pub uniforms: Vec<(String, UniformValue)>,
}

impl ShaderResource {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), vertex: None, geometry: None, fragment: None, uniforms: Vec::new() }
    }

    pub fn with_vertex(mut self, path: impl Into<PathBuf>) -> Self {
        self.vertex = Some(path.into());
        self
    }

    pub fn with_geometry(mut self, path: impl Into<PathBuf>) -> Self {
        self.geometry = Some(path.into());
        self
    }

    pub fn with_fragment(mut self, path: impl Into<PathBuf>) -> Self {
        self.fragment = Some(path.into());
        self
    }

    pub fn with_uniform(mut self, name: impl Into<String>, value: UniformValue) -> Self {
        self.uniforms.push((name.into(), value));
        self
    }
}

/// Which kind of resource a handle names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Texture,
    Shader,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ResourceKind::Texture => "texture",
            ResourceKind::Shader => "shader",
        })
    }
}

/// Cache key. Cloning shares the descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResourceHandle {
    Texture(Arc<TextureResource>),
    Shader(Arc<ShaderResource>),
}

impl ResourceHandle {
    pub fn kind(&self) -> ResourceKind {
        match self {
            ResourceHandle::Texture(_) => ResourceKind::Texture,
            ResourceHandle::Shader(_) => ResourceKind::Shader,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            ResourceHandle::Texture(texture) => &texture.name,
            ResourceHandle::Shader(shader) => &shader.name,
        }
    }

    pub fn as_texture(&self) -> Option<&Arc<TextureResource>> {
        match self {
            ResourceHandle::Texture(texture) => Some(texture),
            ResourceHandle::Shader(_) => None,
        }
    }

    pub fn as_shader(&self) -> Option<&Arc<ShaderResource>> {
        match self {
            ResourceHandle::Shader(shader) => Some(shader),
            ResourceHandle::Texture(_) => None,
        }
    }

    pub fn is_render_target(&self) -> bool {
        self.as_texture().is_some_and(|texture| texture.render_target)
    }
}

impl fmt::Display for ResourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind(), self.name())
    }
}

impl From<TextureResource> for ResourceHandle {
    fn from(texture: TextureResource) -> Self {
        ResourceHandle::Texture(Arc::new(texture))
    }
}

impl From<Arc<TextureResource>> for ResourceHandle {
    fn from(texture: Arc<TextureResource>) -> Self {
        ResourceHandle::Texture(texture)
    }
}

impl From<ShaderResource> for ResourceHandle {
    fn from(shader: ShaderResource) -> Self {
        ResourceHandle::Shader(Arc::new(shader))
    }
}

impl From<Arc<ShaderResource>> for ResourceHandle {
    fn from(shader: Arc<ShaderResource>) -> Self {
        ResourceHandle::Shader(shader)
    }
}

/// Path without its extension, with `/` separators.
pub fn resource_name(path: &Path) -> String {
    let text = path.to_string_lossy().replace('\\', "/");
    match text.rfind('.') {
        Some(dot) if !text[dot..].contains('/') => text[..dot].to_string(),
        _ => text,
    }
}
