//! Texture format and filtering decisions.
//!
//! Every texture upload goes through [`TextureDescriptor::decide`], which
//! combines the per-handle hints with the engine-wide [`LoaderOptions`].

use crate::config::LoaderOptions;
use crate::handle::{Size, TextureResource};
use serde::{Deserialize, Serialize};

/// GPU-side storage format of a texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InternalFormat {
    Luminance,
    Intensity,
    Rgb,
    Rgba,
    Rgba8,
    Dxt1,
    Dxt5,
}

impl InternalFormat {
    /// Approximate storage cost of `pixels` texels, in bytes.
    pub fn storage_bytes(self, pixels: u64) -> u64 {
        match self {
            InternalFormat::Luminance | InternalFormat::Intensity | InternalFormat::Dxt5 => pixels,
            InternalFormat::Rgb => pixels * 3,
            InternalFormat::Rgba | InternalFormat::Rgba8 => pixels * 4,
            InternalFormat::Dxt1 => pixels.div_ceil(2),
        }
    }

    pub fn is_compressed(self) -> bool {
        matches!(self, InternalFormat::Dxt1 | InternalFormat::Dxt5)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MinFilter {
    Nearest,
    Linear,
    Bilinear,
    Trilinear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MagFilter {
    Nearest,
    Linear,
}

/// Sampling used when a decoder has to resize a source image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScaleFilter {
    Nearest,
    Bilinear,
    Trilinear,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WrapMode {
    #[default]
    Tile,
    Clamp,
    ClampToEdge,
}

/// Creation parameters for a texture object.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextureDescriptor {
    pub size: Size,
    pub format: InternalFormat,
    pub min_filter: MinFilter,
    pub mag_filter: MagFilter,
    pub mipmaps: bool,
    pub anisotropy: f32,
    pub border: u32,
    pub wrap_s: WrapMode,
    pub wrap_t: WrapMode,
}

impl TextureDescriptor {
    /// Builds the descriptor for uploading `resource` at `size`.
    pub fn decide(resource: &TextureResource, options: &LoaderOptions, size: Size) -> Self {
        let min_filter = decide_min_filter(resource, options);
        Self {
            size,
            format: decide_format(resource, options),
            min_filter,
            mag_filter: decide_mag_filter(resource, options),
            mipmaps: !resource.not_mipmapped
                && !matches!(min_filter, MinFilter::Nearest | MinFilter::Linear),
            anisotropy: options.texture_anisotropy,
            border: resource.border,
            wrap_s: resource.wrap_s,
            wrap_t: resource.wrap_t,
        }
    }

    /// Estimated VRAM footprint including the mip chain.
    pub fn estimated_bytes(&self) -> u64 {
        let base = self
            .format
            .storage_bytes(u64::from(self.size.width) * u64::from(self.size.height));
        if self.mipmaps {
            base + base / 3
        } else {
            base
        }
    }
}

pub fn decide_format(resource: &TextureResource, options: &LoaderOptions) -> InternalFormat {
    if resource.height_map {
        if resource.not_alpha {
            InternalFormat::Luminance
        } else {
            InternalFormat::Intensity
        }
    } else if resource.not_compressible || resource.render_target || !options.compress_textures {
        if options.force_32bit_textures {
            InternalFormat::Rgba8
        } else if resource.not_alpha {
            InternalFormat::Rgb
        } else {
            InternalFormat::Rgba
        }
    } else if resource.not_alpha {
        InternalFormat::Dxt1
    } else {
        InternalFormat::Dxt5
    }
}

pub fn decide_min_filter(resource: &TextureResource, options: &LoaderOptions) -> MinFilter {
    if options.force_nearest || resource.forced_nearest {
        MinFilter::Nearest
    } else if options.force_no_mipmaps || resource.not_mipmapped || resource.render_target {
        MinFilter::Linear
    } else if options.texture_best_filtering {
        MinFilter::Trilinear
    } else {
        MinFilter::Bilinear
    }
}

pub fn decide_mag_filter(resource: &TextureResource, options: &LoaderOptions) -> MagFilter {
    if options.force_nearest || resource.forced_nearest {
        MagFilter::Nearest
    } else {
        MagFilter::Linear
    }
}

/// Sampling for resizing a source image to an explicit texture size.
pub fn decide_scale_filter(resource: &TextureResource, options: &LoaderOptions) -> ScaleFilter {
    if options.force_nearest || resource.forced_nearest {
        ScaleFilter::Nearest
    } else if options.texture_best_filtering {
        ScaleFilter::Trilinear
    } else {
        ScaleFilter::Bilinear
    }
}
