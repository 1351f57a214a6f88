//! Filesystem decoder backed by the `image` crate.

use image::imageops::FilterType;
use image::ImageError;
use rookgl_loader::{
    DecodeError, Decoder, ImageData, ScaleFilter, ShaderResource, ShaderSources, Size,
    TextureRequest,
};
use std::fs;
use std::path::{Path, PathBuf};

/// Reads textures and shader stages relative to a root directory.
pub struct FsDecoder {
    root: PathBuf,
}

impl FsDecoder {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        self.root.join(path)
    }

    fn read_stage(&self, path: Option<&PathBuf>) -> Result<Option<String>, DecodeError> {
        let Some(path) = path else {
            return Ok(None);
        };
        let full = self.resolve(path);
        fs::read_to_string(&full).map(Some).map_err(|source| DecodeError::Io { path: full, source })
    }
}

impl Decoder for FsDecoder {
    fn decode_texture(&self, request: &TextureRequest<'_>) -> Result<ImageData, DecodeError> {
        let full = self.resolve(request.path);
        let image = image::open(&full).map_err(|error| match error {
            ImageError::IoError(source) => DecodeError::Io { path: full.clone(), source },
            other => DecodeError::Unsupported { path: full.clone(), reason: other.to_string() },
        })?;
        let mut rgba = image.to_rgba8();

        if let Some(size) = request.target_size {
            if (rgba.width(), rgba.height()) != (size.width, size.height) {
                rgba = image::imageops::resize(&rgba, size.width, size.height, filter(request.scale_filter));
            }
        }

        let size = Size::new(rgba.width(), rgba.height());
        Ok(ImageData::new(size, rgba.into_raw()))
    }

    fn decode_shader(&self, shader: &ShaderResource) -> Result<ShaderSources, DecodeError> {
        Ok(ShaderSources {
            vertex: self.read_stage(shader.vertex.as_ref())?,
            geometry: self.read_stage(shader.geometry.as_ref())?,
            fragment: self.read_stage(shader.fragment.as_ref())?,
        })
    }
}

fn filter(scale: ScaleFilter) -> FilterType {
    match scale {
        ScaleFilter::Nearest => FilterType::Nearest,
        ScaleFilter::Bilinear => FilterType::Triangle,
        ScaleFilter::Trilinear => FilterType::CatmullRom,
    }
}
