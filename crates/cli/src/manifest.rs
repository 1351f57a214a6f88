//! TOML description of a headless frame-loop run.
//!
//! ```toml
//! frames = 4
//! reload_frames = [2]
//!
//! [[texture]]
//! name = "wall"
//! path = "textures/wall.png"
//! size = [64, 64]
//! destroy_frame = 3
//!
//! [[texture]]
//! name = "shadow"
//! render_target = true
//! depth_id = 1
//!
//! [[shader]]
//! name = "sprite"
//! vertex = "shaders/sprite.vert"
//! fragment = "shaders/sprite.frag"
//!
//! [[option]]
//! frame = 1
//! name = "forceNearest"
//! value = "true"
//! ```

use anyhow::{Context, Result};
use rookgl_loader::{
    ResourceHandle, ShaderResource, Size, TextureResource, UniformValue, WrapMode,
};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    /// Directory asset paths are relative to. Defaults to the manifest's own directory.
    pub root: Option<PathBuf>,
    /// Number of frames to run when `--frames` is not given.
    pub frames: Option<u32>,
    #[serde(default)]
    pub reload_frames: Vec<u32>,
    #[serde(default, rename = "texture")]
    pub textures: Vec<TextureEntry>,
    #[serde(default, rename = "shader")]
    pub shaders: Vec<ShaderEntry>,
    #[serde(default, rename = "option")]
    pub options: Vec<OptionChange>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TextureEntry {
    pub name: Option<String>,
    pub path: Option<PathBuf>,
    pub size: Option<[u32; 2]>,
    #[serde(default)]
    pub height_map: bool,
    #[serde(default)]
    pub normal_map: bool,
    #[serde(default)]
    pub not_alpha: bool,
    #[serde(default)]
    pub not_compressible: bool,
    #[serde(default)]
    pub not_mipmapped: bool,
    #[serde(default)]
    pub forced_nearest: bool,
    #[serde(default)]
    pub render_target: bool,
    #[serde(default)]
    pub depth_id: i32,
    #[serde(default)]
    pub border: u32,
    #[serde(default)]
    pub wrap_s: WrapMode,
    #[serde(default)]
    pub wrap_t: WrapMode,
    /// Frame on which the texture is enqueued.
    #[serde(default)]
    pub frame: u32,
    /// Frame on which the texture is scheduled for destruction.
    pub destroy_frame: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ShaderEntry {
    pub name: String,
    pub vertex: Option<PathBuf>,
    pub geometry: Option<PathBuf>,
    pub fragment: Option<PathBuf>,
    /// Constant uniforms set after linking, e.g. `uniforms = { tint = [1.0, 0.5, 0.5, 1.0] }`.
    #[serde(default)]
    pub uniforms: BTreeMap<String, UniformValue>,
    #[serde(default)]
    pub frame: u32,
    pub destroy_frame: Option<u32>,
}

/// An option change applied at the start of a frame.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OptionChange {
    pub frame: u32,
    pub name: String,
    /// Written as a string or a bare TOML value.
    pub value: toml::Value,
}

impl OptionChange {
    pub fn value_text(&self) -> String {
        match &self.value {
            toml::Value::String(text) => text.clone(),
            other => other.to_string(),
        }
    }
}

impl Manifest {
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            anyhow::bail!("manifest does not exist: {}", path.display());
        }
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read manifest {}", path.display()))?;
        let mut manifest = Self::from_toml(&contents)
            .with_context(|| format!("failed to parse manifest {}", path.display()))?;

        let base = path.parent().unwrap_or_else(|| Path::new("."));
        manifest.root = Some(match manifest.root.take() {
            Some(root) if root.is_absolute() => root,
            Some(root) => base.join(root),
            None => base.to_path_buf(),
        });
        Ok(manifest)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    pub fn root(&self) -> &Path {
        self.root.as_deref().unwrap_or_else(|| Path::new("."))
    }
}

impl TextureEntry {
    pub fn to_resource(&self) -> Result<TextureResource> {
        let name = match (&self.name, &self.path) {
            (Some(name), _) => name.clone(),
            (None, Some(path)) => rookgl_loader::handle::resource_name(path),
            (None, None) => anyhow::bail!("texture entries need a name or a path"),
        };
        Ok(TextureResource {
            name,
            path: self.path.clone(),
            size: self.size.map(|[width, height]| Size::new(width, height)),
            height_map: self.height_map,
            normal_map: self.normal_map,
            not_alpha: self.not_alpha,
            not_compressible: self.not_compressible,
            not_mipmapped: self.not_mipmapped,
            forced_nearest: self.forced_nearest,
            render_target: self.render_target,
            depth_id: self.depth_id,
            border: self.border,
            wrap_s: self.wrap_s,
            wrap_t: self.wrap_t,
        })
    }
}

impl ShaderEntry {
    pub fn to_resource(&self) -> ShaderResource {
        ShaderResource {
            name: self.name.clone(),
            vertex: self.vertex.clone(),
            geometry: self.geometry.clone(),
            fragment: self.fragment.clone(),
            uniforms: self.uniforms.iter().map(|(name, value)| (name.clone(), *value)).collect(),
        }
    }
}

/// A manifest entry resolved into a handle plus its schedule.
pub struct ScheduledResource {
    pub handle: ResourceHandle,
    pub frame: u32,
    pub destroy_frame: Option<u32>,
}

impl Manifest {
    /// All resources in manifest order, textures first.
    pub fn scheduled_resources(&self) -> Result<Vec<ScheduledResource>> {
        let mut resources = Vec::with_capacity(self.textures.len() + self.shaders.len());
        for entry in &self.textures {
            resources.push(ScheduledResource {
                handle: entry.to_resource()?.into(),
                frame: entry.frame,
                destroy_frame: entry.destroy_frame,
            });
        }
        for entry in &self.shaders {
            resources.push(ScheduledResource {
                handle: entry.to_resource().into(),
                frame: entry.frame,
                destroy_frame: entry.destroy_frame,
            });
        }
        Ok(resources)
    }
}
