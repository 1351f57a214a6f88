//! The graphics-context abstraction the loader drives.
//!
//! Implementations wrap a real GPU API. The loader only ever calls them from
//! the thread that runs [`ResourceLoader::per_frame_cycle`], and always
//! through a `&mut` borrow, so implementations need not be thread-safe.
//!
//! [`ResourceLoader::per_frame_cycle`]: crate::ResourceLoader::per_frame_cycle

use crate::error::GraphicsError;
use crate::format::TextureDescriptor;
use crate::handle::{Size, UniformValue};
use serde::Serialize;
use std::fmt;

macro_rules! gpu_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
        pub struct $name(pub u32);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "#{}"), self.0)
            }
        }
    };
}

gpu_id!(
    /// Texture object name.
    TextureId,
    "texture"
);
gpu_id!(
    /// Linked shader program name.
    ProgramId,
    "program"
);
gpu_id!(
    /// Framebuffer object name.
    FramebufferId,
    "framebuffer"
);
gpu_id!(
    /// Depth render buffer name.
    DepthBufferId,
    "depthbuffer"
);

/// Decoded RGBA8 pixels, row-major, top row first.
#[derive(Clone, PartialEq, Eq)]
pub struct ImageData {
    pub size: Size,
    pub pixels: Vec<u8>,
}

impl ImageData {
    pub fn new(size: Size, pixels: Vec<u8>) -> Self {
        Self { size, pixels }
    }

    /// Byte length of a tightly packed RGBA8 image of `size`.
    pub fn byte_len(size: Size) -> usize {
        size.width as usize * size.height as usize * 4
    }

    /// True when `pixels` holds exactly one RGBA8 texel per pixel of `size`.
    pub fn is_complete(&self) -> bool {
        self.pixels.len() == Self::byte_len(self.size)
    }
}

impl fmt::Debug for ImageData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageData")
            .field("size", &self.size)
            .field("bytes", &self.pixels.len())
            .finish()
    }
}

/// Source text for each stage of a shader program.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShaderSources {
    pub vertex: Option<String>,
    pub geometry: Option<String>,
    pub fragment: Option<String>,
}

/// Operations the loader needs from a GPU context.
pub trait GraphicsContext {
    /// Allocates storage for `desc`. With no `image` the contents are undefined,
    /// as for a render target that is drawn before it is read.
    fn create_texture(
        &mut self,
        desc: &TextureDescriptor,
        image: Option<&ImageData>,
    ) -> Result<TextureId, GraphicsError>;
    fn destroy_texture(&mut self, id: TextureId);

    fn compile_program(&mut self, sources: &ShaderSources) -> Result<ProgramId, GraphicsError>;
    fn destroy_program(&mut self, id: ProgramId);
    /// Binds constant uniform values on a linked program.
    fn set_uniforms(
        &mut self,
        program: ProgramId,
        uniforms: &[(String, UniformValue)],
    ) -> Result<(), GraphicsError>;

    fn create_framebuffer(&mut self) -> Result<FramebufferId, GraphicsError>;
    fn destroy_framebuffer(&mut self, id: FramebufferId);
    fn attach_color(&mut self, framebuffer: FramebufferId, texture: TextureId);
    fn attach_depth(&mut self, framebuffer: FramebufferId, depth: DepthBufferId);
    fn detach_all(&mut self, framebuffer: FramebufferId);
    /// `Err` carries the driver's reason for an incomplete framebuffer.
    fn check_framebuffer(&mut self, framebuffer: FramebufferId) -> Result<(), GraphicsError>;
    fn bind_framebuffer(&mut self, framebuffer: FramebufferId);
    fn unbind_framebuffer(&mut self);
    fn bound_framebuffer(&self) -> Option<FramebufferId>;

    fn create_depth_buffer(&mut self, size: Size) -> Result<DepthBufferId, GraphicsError>;
    fn destroy_depth_buffer(&mut self, id: DepthBufferId);

    /// Saves viewport and enable state.
    fn push_attributes(&mut self);
    fn pop_attributes(&mut self);
    fn set_viewport(&mut self, x: i32, y: i32, size: Size);

    /// Current drawable size.
    fn canvas_size(&self) -> Size;
    /// Seconds since the context started.
    fn time(&self) -> f64;
}
