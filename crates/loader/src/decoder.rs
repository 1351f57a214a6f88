//! Decoding of resource locators into pixel data and shader text.

use crate::error::DecodeError;
use crate::format::ScaleFilter;
use crate::gfx::{ImageData, ShaderSources};
use crate::handle::{ShaderResource, Size, TextureResource};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Everything a decoder needs to produce the pixels for one texture.
#[derive(Debug, Clone, Copy)]
pub struct TextureRequest<'a> {
    pub resource: &'a TextureResource,
    pub path: &'a Path,
    /// When set, the decoded image must be resized to exactly this size.
    pub target_size: Option<Size>,
    pub scale_filter: ScaleFilter,
}

/// Supplies decoded data to the loader.
///
/// Decoders are shared between the frame thread and producers, so they must
/// be `Send + Sync`. Decoding happens on the frame thread inside the loader's
/// critical section.
pub trait Decoder: Send + Sync {
    fn decode_texture(&self, request: &TextureRequest<'_>) -> Result<ImageData, DecodeError>;
    fn decode_shader(&self, shader: &ShaderResource) -> Result<ShaderSources, DecodeError>;
}

impl<D: Decoder + ?Sized> Decoder for std::sync::Arc<D> {
    fn decode_texture(&self, request: &TextureRequest<'_>) -> Result<ImageData, DecodeError> {
        (**self).decode_texture(request)
    }

    fn decode_shader(&self, shader: &ShaderResource) -> Result<ShaderSources, DecodeError> {
        (**self).decode_shader(shader)
    }
}

/// In-memory decoder keyed by path.
///
/// Useful for tests and tools that already hold their assets in memory.
/// Paths can be marked as failing to simulate unreadable files.
#[derive(Default)]
pub struct MemoryDecoder {
    images: Mutex<HashMap<PathBuf, ImageData>>,
    sources: Mutex<HashMap<PathBuf, String>>,
    failing: Mutex<HashMap<PathBuf, String>>,
    texture_calls: AtomicUsize,
    shader_calls: AtomicUsize,
}

impl MemoryDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_image(&self, path: impl Into<PathBuf>, image: ImageData) {
        self.images.lock().insert(path.into(), image);
    }

    /// Registers a solid-colour image.
    pub fn insert_solid(&self, path: impl Into<PathBuf>, size: Size, rgba: [u8; 4]) {
        let pixels = rgba.repeat(size.width as usize * size.height as usize);
        self.insert_image(path, ImageData::new(size, pixels));
    }

    pub fn insert_source(&self, path: impl Into<PathBuf>, text: impl Into<String>) {
        self.sources.lock().insert(path.into(), text.into());
    }

    /// Makes reads of `path` fail with an I/O error until [`heal`](Self::heal) is called.
    pub fn fail(&self, path: impl Into<PathBuf>, reason: impl Into<String>) {
        self.failing.lock().insert(path.into(), reason.into());
    }

    pub fn heal(&self, path: impl AsRef<Path>) {
        self.failing.lock().remove(path.as_ref());
    }

    pub fn texture_calls(&self) -> usize {
        self.texture_calls.load(Ordering::SeqCst)
    }

    pub fn shader_calls(&self) -> usize {
        self.shader_calls.load(Ordering::SeqCst)
    }

    fn check(&self, path: &Path) -> Result<(), DecodeError> {
        match self.failing.lock().get(path) {
            Some(reason) => Err(DecodeError::Io {
                path: path.to_path_buf(),
                source: std::io::Error::other(reason.clone()),
            }),
            None => Ok(()),
        }
    }

    fn read_source(&self, path: Option<&PathBuf>) -> Result<Option<String>, DecodeError> {
        let Some(path) = path else {
            return Ok(None);
        };
        self.check(path)?;
        self.sources.lock().get(path).cloned().map(Some).ok_or_else(|| DecodeError::Io {
            path: path.clone(),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        })
    }
}

impl Decoder for MemoryDecoder {
    fn decode_texture(&self, request: &TextureRequest<'_>) -> Result<ImageData, DecodeError> {
        self.texture_calls.fetch_add(1, Ordering::SeqCst);
        self.check(request.path)?;
        let image = self.images.lock().get(request.path).cloned().ok_or_else(|| {
            DecodeError::Io {
                path: request.path.to_path_buf(),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            }
        })?;
        if !image.is_complete() {
            return Err(DecodeError::Unsupported {
                path: request.path.to_path_buf(),
                reason: format!(
                    "{} image needs {} bytes, has {}",
                    image.size,
                    ImageData::byte_len(image.size),
                    image.pixels.len()
                ),
            });
        }
        Ok(match request.target_size {
            Some(size) if size != image.size => resample(&image, size, request.scale_filter),
            _ => image,
        })
    }

    fn decode_shader(&self, shader: &ShaderResource) -> Result<ShaderSources, DecodeError> {
        self.shader_calls.fetch_add(1, Ordering::SeqCst);
        Ok(ShaderSources {
            vertex: self.read_source(shader.vertex.as_ref())?,
            geometry: self.read_source(shader.geometry.as_ref())?,
            fragment: self.read_source(shader.fragment.as_ref())?,
        })
    }
}

/// Resizes a complete RGBA8 image.
///
/// Trilinear sampling resamples bilinearly: a single image has no mip chain
/// to blend between.
pub fn resample(image: &ImageData, size: Size, filter: ScaleFilter) -> ImageData {
    match filter {
        ScaleFilter::Nearest => resample_nearest(image, size),
        ScaleFilter::Bilinear | ScaleFilter::Trilinear => resample_bilinear(image, size),
    }
}

fn resample_nearest(image: &ImageData, size: Size) -> ImageData {
    let mut pixels = vec![0; ImageData::byte_len(size)];
    if image.size.width == 0 || image.size.height == 0 {
        return ImageData::new(size, pixels);
    }
    for y in 0..size.height {
        let sy = (u64::from(y) * u64::from(image.size.height) / u64::from(size.height)) as usize;
        for x in 0..size.width {
            let sx = (u64::from(x) * u64::from(image.size.width) / u64::from(size.width)) as usize;
            let src = (sy * image.size.width as usize + sx) * 4;
            let dst = (y as usize * size.width as usize + x as usize) * 4;
            pixels[dst..dst + 4].copy_from_slice(&image.pixels[src..src + 4]);
        }
    }
    ImageData::new(size, pixels)
}

/// Source coordinate of destination texel `dst` (centre-aligned), split into
/// the two neighbouring source texels and the weight of the second.
fn sample_axis(dst: u32, dst_len: u32, src_len: u32) -> (usize, usize, f32) {
    let max = (src_len - 1) as f32;
    let pos = ((dst as f32 + 0.5) * src_len as f32 / dst_len as f32 - 0.5).clamp(0.0, max);
    let low = pos.floor();
    let high = (low + 1.0).min(max);
    (low as usize, high as usize, pos - low)
}

fn resample_bilinear(image: &ImageData, size: Size) -> ImageData {
    let mut pixels = vec![0; ImageData::byte_len(size)];
    if image.size.width == 0 || image.size.height == 0 {
        return ImageData::new(size, pixels);
    }
    let width = image.size.width as usize;
    let texel = |x: usize, y: usize, channel: usize| f32::from(image.pixels[(y * width + x) * 4 + channel]);
    for y in 0..size.height {
        let (y0, y1, ty) = sample_axis(y, size.height, image.size.height);
        for x in 0..size.width {
            let (x0, x1, tx) = sample_axis(x, size.width, image.size.width);
            let dst = (y as usize * size.width as usize + x as usize) * 4;
            for channel in 0..4 {
                let top = texel(x0, y0, channel) * (1.0 - tx) + texel(x1, y0, channel) * tx;
                let bottom = texel(x0, y1, channel) * (1.0 - tx) + texel(x1, y1, channel) * tx;
                pixels[dst + channel] = (top * (1.0 - ty) + bottom * ty).round() as u8;
            }
        }
    }
    ImageData::new(size, pixels)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request<'a>(resource: &'a TextureResource, path: &'a Path) -> TextureRequest<'a> {
        TextureRequest { resource, path, target_size: None, scale_filter: ScaleFilter::Bilinear }
    }

    #[test]
    fn test_memory_decoder_returns_registered_image() {
        let decoder = MemoryDecoder::new();
        decoder.insert_solid("a.png", Size::new(2, 2), [255, 0, 0, 255]);
        let resource = TextureResource::file("a", "a.png");

        let image = decoder.decode_texture(&request(&resource, Path::new("a.png"))).unwrap();
        assert_eq!(image.size, Size::new(2, 2));
        assert_eq!(&image.pixels[..4], &[255, 0, 0, 255]);
        assert_eq!(decoder.texture_calls(), 1);
    }

    #[test]
    fn test_memory_decoder_missing_and_failing_paths_are_io_errors() {
        let decoder = MemoryDecoder::new();
        decoder.insert_solid("b.png", Size::new(1, 1), [0; 4]);
        decoder.fail("b.png", "disk on fire");
        let resource = TextureResource::file("b", "b.png");

        let err = decoder.decode_texture(&request(&resource, Path::new("b.png"))).unwrap_err();
        assert!(err.is_io());
        decoder.heal("b.png");
        assert!(decoder.decode_texture(&request(&resource, Path::new("b.png"))).is_ok());

        let missing = decoder.decode_texture(&request(&resource, Path::new("c.png")));
        assert!(missing.unwrap_err().is_io());
    }

    #[test]
    fn test_memory_decoder_scales_to_target() {
        let decoder = MemoryDecoder::new();
        decoder.insert_solid("s.png", Size::new(2, 2), [1, 2, 3, 4]);
        let resource = TextureResource::file("s", "s.png").with_size(4, 8);
        let req = TextureRequest { target_size: Some(Size::new(4, 8)), ..request(&resource, Path::new("s.png")) };

        let image = decoder.decode_texture(&req).unwrap();
        assert_eq!(image.size, Size::new(4, 8));
        assert_eq!(image.pixels.len(), 4 * 8 * 4);
        assert_eq!(&image.pixels[124..128], &[1, 2, 3, 4]);
    }

    #[test]
    fn test_memory_decoder_honours_scale_filter() {
        let decoder = MemoryDecoder::new();
        let mut pixels = vec![0, 0, 0, 255];
        pixels.extend([255, 255, 255, 255]);
        decoder.insert_image("ramp.png", ImageData::new(Size::new(2, 1), pixels));
        let resource = TextureResource::file("ramp", "ramp.png").with_size(4, 1);
        let scaled = |filter| {
            let req = TextureRequest {
                target_size: Some(Size::new(4, 1)),
                scale_filter: filter,
                ..request(&resource, Path::new("ramp.png"))
            };
            decoder.decode_texture(&req).unwrap()
        };

        let nearest = scaled(ScaleFilter::Nearest);
        assert_eq!(nearest.pixels[4], 0);
        assert_eq!(nearest.pixels[8], 255);

        let bilinear = scaled(ScaleFilter::Bilinear);
        assert_eq!(bilinear.pixels[0], 0);
        assert_eq!(bilinear.pixels[4], 64);
        assert_eq!(bilinear.pixels[8], 191);
        assert_eq!(bilinear.pixels[12], 255);
        assert_eq!(bilinear.pixels[7], 255);
    }

    #[test]
    fn test_memory_decoder_rejects_truncated_pixels() {
        let decoder = MemoryDecoder::new();
        decoder.insert_image("short.png", ImageData::new(Size::new(4, 4), vec![0; 10]));
        let resource = TextureResource::file("short", "short.png").with_size(8, 8);
        let req = TextureRequest { target_size: Some(Size::new(8, 8)), ..request(&resource, Path::new("short.png")) };

        let err = decoder.decode_texture(&req).unwrap_err();
        assert!(matches!(err, DecodeError::Unsupported { .. }));
        assert!(!err.is_io());
    }

    #[test]
    fn test_memory_decoder_reads_shader_stages() {
        let decoder = MemoryDecoder::new();
        decoder.insert_source("s.vert", "void main() {}");
        decoder.insert_source("s.frag", "void main() {}");
        let shader = ShaderResource::new("s").with_vertex("s.vert").with_fragment("s.frag");

        let sources = decoder.decode_shader(&shader).unwrap();
        assert!(sources.vertex.is_some());
        assert!(sources.geometry.is_none());
        assert!(sources.fragment.is_some());

        let broken = ShaderResource::new("x").with_vertex("missing.vert");
        assert!(decoder.decode_shader(&broken).unwrap_err().is_io());
        assert_eq!(decoder.shader_calls(), 2);
    }
}
