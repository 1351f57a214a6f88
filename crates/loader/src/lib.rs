//! RookGL Resource Loader
//!
//! GPU resource cache for a real-time frame loop.
//!
//! The loader shares textures and shader programs between every part of a
//! renderer, loads them on the graphics thread once per frame, and destroys
//! or rebuilds them on request. Render-target textures get their own
//! framebuffers, with depth buffers shared by depth-group id.
//!
//! Any thread may submit, fetch or schedule destruction; only the thread
//! that owns the [`GraphicsContext`] runs [`ResourceLoader::per_frame_cycle`].
//!
//! # Example
//!
//! ```
//! use rookgl_loader::{
//!     HeadlessContext, MemoryDecoder, ResourceHandle, ResourceLoader, Size, TextureResource,
//! };
//!
//! let decoder = MemoryDecoder::new();
//! decoder.insert_solid("textures/wall.png", Size::new(16, 16), [128, 128, 128, 255]);
//!
//! let loader = ResourceLoader::new(decoder);
//! let mut gfx = HeadlessContext::new(Size::new(800, 600));
//!
//! let wall: ResourceHandle = TextureResource::from_path("textures/wall.png").into();
//! loader.enqueue([wall.clone()]);
//!
//! // Once per frame, on the graphics thread.
//! loader.per_frame_cycle(&mut gfx);
//!
//! let cached = loader.fetch(&wall).expect("wall should be cached");
//! assert_eq!(cached.as_texture().map(|t| t.descriptor.size), Some(Size::new(16, 16)));
//!
//! // Changing a global option rebuilds every texture on the next frame.
//! loader.set_force_nearest(true);
//! loader.per_frame_cycle(&mut gfx);
//! ```

mod cached;
pub mod config;
pub mod decoder;
pub mod error;
pub mod format;
pub mod gfx;
pub mod handle;
pub mod headless;
pub mod listener;
mod loader;
pub mod pending;
pub mod render_target;
mod stats;
pub mod table;

pub use cached::{CachedObject, CachedShader, CachedTexture};
pub use config::{LoaderOption, LoaderOptions};
pub use decoder::{Decoder, MemoryDecoder, TextureRequest};
pub use error::{ConfigError, DecodeError, GraphicsError, LoaderError, ShaderStage};
pub use format::{InternalFormat, MagFilter, MinFilter, ScaleFilter, TextureDescriptor, WrapMode};
pub use gfx::{
    DepthBufferId, FramebufferId, GraphicsContext, ImageData, ProgramId, ShaderSources, TextureId,
};
pub use handle::{ResourceHandle, ResourceKind, ShaderResource, Size, TextureResource, UniformValue};
pub use headless::{HeadlessContext, HeadlessCounters};
pub use listener::{EventKind, EventRecorder, LoaderEvent, LoaderListener, RecordedEvent, TracingListener};
pub use loader::{RenderTargetPass, ResourceLoader};
pub use render_target::{DepthBuffer, RenderTarget};
pub use stats::{CycleReport, LoaderCounters, LoaderStats};
