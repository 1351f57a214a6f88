//! Engine-wide texture options.
//!
//! Options can be built programmatically, read from `ROOKGL_*` environment
//! variables, or loaded from a TOML file. Changing an option on a running
//! loader never touches existing GPU objects; it schedules a full reload.

use crate::error::{ConfigError, LoaderError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

const ENV_COMPRESS: &str = "ROOKGL_COMPRESS_TEXTURES";
const ENV_FORCE_32BIT: &str = "ROOKGL_FORCE_32BIT_TEXTURES";
const ENV_NO_MIPMAPS: &str = "ROOKGL_FORCE_NO_MIPMAPS";
const ENV_NEAREST: &str = "ROOKGL_FORCE_NEAREST";
const ENV_ANISOTROPY: &str = "ROOKGL_TEXTURE_ANISOTROPY";
const ENV_BEST_FILTERING: &str = "ROOKGL_TEXTURE_BEST_FILTERING";

/// Global texture creation options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoaderOptions {
    /// Upload compressible textures as DXT1/DXT5.
    pub compress_textures: bool,
    /// Upload uncompressed textures as RGBA8 regardless of alpha.
    pub force_32bit_textures: bool,
    /// Never build mip chains.
    pub force_no_mipmaps: bool,
    /// Nearest-neighbour filtering everywhere.
    pub force_nearest: bool,
    /// Anisotropic filtering level, `0.0` disables it.
    pub texture_anisotropy: f32,
    /// Trilinear instead of bilinear minification.
    pub texture_best_filtering: bool,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            compress_textures: false,
            force_32bit_textures: false,
            force_no_mipmaps: false,
            force_nearest: false,
            texture_anisotropy: 0.0,
            texture_best_filtering: false,
        }
    }
}

impl LoaderOptions {
    pub fn with_compression(mut self, value: bool) -> Self {
        self.compress_textures = value;
        self
    }

    pub fn with_32bit(mut self, value: bool) -> Self {
        self.force_32bit_textures = value;
        self
    }

    pub fn with_no_mipmaps(mut self, value: bool) -> Self {
        self.force_no_mipmaps = value;
        self
    }

    pub fn with_nearest(mut self, value: bool) -> Self {
        self.force_nearest = value;
        self
    }

    pub fn with_anisotropy(mut self, value: f32) -> Self {
        self.texture_anisotropy = value;
        self
    }

    pub fn with_best_filtering(mut self, value: bool) -> Self {
        self.texture_best_filtering = value;
        self
    }

    /// Loads options from environment variables on top of the defaults.
    ///
    /// Environment variables:
    /// - `ROOKGL_COMPRESS_TEXTURES`
    /// - `ROOKGL_FORCE_32BIT_TEXTURES`
    /// - `ROOKGL_FORCE_NO_MIPMAPS`
    /// - `ROOKGL_FORCE_NEAREST`
    /// - `ROOKGL_TEXTURE_ANISOTROPY` (non-negative number)
    /// - `ROOKGL_TEXTURE_BEST_FILTERING`
    ///
    /// Booleans accept `true`/`false`/`1`/`0`/`yes`/`no`.
    ///
    /// # Errors
    /// Returns an error if any variable holds an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_env_overrides()
    }

    /// Overrides fields with any `ROOKGL_*` variables that are set.
    pub fn with_env_overrides(mut self) -> Result<Self, ConfigError> {
        if let Some(value) = env_bool(ENV_COMPRESS)? {
            self.compress_textures = value;
        }
        if let Some(value) = env_bool(ENV_FORCE_32BIT)? {
            self.force_32bit_textures = value;
        }
        if let Some(value) = env_bool(ENV_NO_MIPMAPS)? {
            self.force_no_mipmaps = value;
        }
        if let Some(value) = env_bool(ENV_NEAREST)? {
            self.force_nearest = value;
        }
        if let Ok(raw) = std::env::var(ENV_ANISOTROPY) {
            self.texture_anisotropy = raw
                .trim()
                .parse::<f32>()
                .ok()
                .filter(|value| is_valid_anisotropy(*value))
                .ok_or_else(|| ConfigError::InvalidValue(ENV_ANISOTROPY.to_string()))?;
        }
        if let Some(value) = env_bool(ENV_BEST_FILTERING)? {
            self.texture_best_filtering = value;
        }
        Ok(self)
    }

    /// Loads options from a TOML file.
    ///
    /// Expected file format (every key optional):
    /// ```toml
    /// compress_textures = true
    /// force_32bit_textures = false
    /// force_no_mipmaps = false
    /// force_nearest = false
    /// texture_anisotropy = 4.0
    /// texture_best_filtering = true
    /// ```
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path.as_ref())?;
        Self::from_toml(&contents)
    }

    /// Parses options from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let options: Self = toml::from_str(toml_str)?;
        options.validate()?;
        Ok(options)
    }

    /// Saves options to a TOML file.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        fs::write(path.as_ref(), self.to_toml()?)?;
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !is_valid_anisotropy(self.texture_anisotropy) {
            return Err(ConfigError::InvalidValue("texture_anisotropy".to_string()));
        }
        Ok(())
    }

    /// Applies one option. Returns `true` if the stored value changed.
    pub fn apply(&mut self, option: LoaderOption) -> bool {
        fn swap<T: PartialEq>(slot: &mut T, value: T) -> bool {
            if *slot == value {
                false
            } else {
                *slot = value;
                true
            }
        }

        match option {
            LoaderOption::CompressTextures(value) => swap(&mut self.compress_textures, value),
            LoaderOption::Force32Bit(value) => swap(&mut self.force_32bit_textures, value),
            LoaderOption::ForceNoMipmap(value) => swap(&mut self.force_no_mipmaps, value),
            LoaderOption::ForceNearest(value) => swap(&mut self.force_nearest, value),
            LoaderOption::TextureAnisotropy(value) => swap(&mut self.texture_anisotropy, value),
            LoaderOption::TextureBestFiltering(value) => {
                swap(&mut self.texture_best_filtering, value)
            }
        }
    }

    /// The options as individual settings, in declaration order.
    pub fn to_settings(&self) -> [LoaderOption; 6] {
        [
            LoaderOption::CompressTextures(self.compress_textures),
            LoaderOption::Force32Bit(self.force_32bit_textures),
            LoaderOption::ForceNoMipmap(self.force_no_mipmaps),
            LoaderOption::ForceNearest(self.force_nearest),
            LoaderOption::TextureAnisotropy(self.texture_anisotropy),
            LoaderOption::TextureBestFiltering(self.texture_best_filtering),
        ]
    }
}

/// A single engine-wide option and its new value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LoaderOption {
    CompressTextures(bool),
    Force32Bit(bool),
    ForceNoMipmap(bool),
    ForceNearest(bool),
    TextureAnisotropy(f32),
    TextureBestFiltering(bool),
}

impl LoaderOption {
    /// Parses `name=value` style settings.
    ///
    /// Names are accepted in camelCase (`compressTextures`) or as the
    /// snake_case field names of [`LoaderOptions`].
    pub fn parse(name: &str, value: &str) -> Result<Self, LoaderError> {
        let invalid =
            || LoaderError::InvalidOption { name: name.to_string(), value: value.to_string() };
        let flag = || parse_bool(value).ok_or_else(invalid);

        let option = match name {
            "compressTextures" | "compress_textures" => LoaderOption::CompressTextures(flag()?),
            "force32Bit" | "force_32bit" | "force_32bit_textures" => {
                LoaderOption::Force32Bit(flag()?)
            }
            "forceNoMipmap" | "force_no_mipmap" | "force_no_mipmaps" => {
                LoaderOption::ForceNoMipmap(flag()?)
            }
            "forceNearest" | "force_nearest" => LoaderOption::ForceNearest(flag()?),
            "textureAnisotropy" | "texture_anisotropy" => {
                LoaderOption::TextureAnisotropy(value.trim().parse().map_err(|_| invalid())?)
            }
            "textureBestFiltering" | "texture_best_filtering" => {
                LoaderOption::TextureBestFiltering(flag()?)
            }
            _ => return Err(invalid()),
        };
        option.validate()?;
        Ok(option)
    }

    pub fn name(&self) -> &'static str {
        match self {
            LoaderOption::CompressTextures(_) => "compressTextures",
            LoaderOption::Force32Bit(_) => "force32Bit",
            LoaderOption::ForceNoMipmap(_) => "forceNoMipmap",
            LoaderOption::ForceNearest(_) => "forceNearest",
            LoaderOption::TextureAnisotropy(_) => "textureAnisotropy",
            LoaderOption::TextureBestFiltering(_) => "textureBestFiltering",
        }
    }

    /// Rejects negative or non-finite anisotropy.
    pub fn validate(&self) -> Result<(), LoaderError> {
        match self {
            LoaderOption::TextureAnisotropy(value) if !is_valid_anisotropy(*value) => {
                Err(LoaderError::InvalidOption {
                    name: self.name().to_string(),
                    value: value.to_string(),
                })
            }
            _ => Ok(()),
        }
    }
}

fn is_valid_anisotropy(value: f32) -> bool {
    value.is_finite() && value >= 0.0
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn env_bool(key: &str) -> Result<Option<bool>, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => parse_bool(&raw)
            .map(Some)
            .ok_or_else(|| ConfigError::InvalidValue(key.to_string())),
        Err(_) => Ok(None),
    }
}
