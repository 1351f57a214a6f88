//! A software [`GraphicsContext`] that tracks objects without a GPU.
//!
//! Used by the test suite and the command-line driver. It keeps every live
//! object in a table, counts creations and deletions, and can be told to
//! fail in the ways a real driver does.

use crate::error::{GraphicsError, ShaderStage};
use crate::format::TextureDescriptor;
use crate::gfx::{
    DepthBufferId, FramebufferId, GraphicsContext, ImageData, ProgramId, ShaderSources, TextureId,
};
use crate::handle::{Size, UniformValue};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

/// Largest texture edge accepted, like `GL_MAX_TEXTURE_SIZE`.
pub const DEFAULT_MAX_TEXTURE_SIZE: u32 = 8192;

/// Source marker that makes compilation fail, as a GLSL `#error` directive would.
const COMPILE_ERROR_MARKER: &str = "#error";

#[derive(Debug, Default, Clone, Copy)]
struct Attachments {
    color: Option<TextureId>,
    depth: Option<DepthBufferId>,
}

/// Object counts, for reports and assertions.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HeadlessCounters {
    pub textures_created: u64,
    pub textures_destroyed: u64,
    pub programs_created: u64,
    pub programs_destroyed: u64,
    pub uniform_updates: u64,
    pub framebuffers_created: u64,
    pub framebuffers_destroyed: u64,
    pub depth_buffers_created: u64,
    pub depth_buffers_destroyed: u64,
    /// Deletions of ids that were not live.
    pub invalid_deletes: u64,
}

#[derive(Debug)]
pub struct HeadlessContext {
    canvas: Size,
    viewport: Size,
    attributes: Vec<Size>,
    bound: Option<FramebufferId>,
    time: f64,
    next_id: u32,
    max_texture_size: u32,
    textures: BTreeMap<TextureId, TextureDescriptor>,
    /// Live programs with the uniforms last set on them.
    programs: BTreeMap<ProgramId, Vec<(String, UniformValue)>>,
    framebuffers: BTreeMap<FramebufferId, Attachments>,
    depth_buffers: BTreeMap<DepthBufferId, Size>,
    fail_texture: Option<String>,
    fail_framebuffer: Option<String>,
    counters: HeadlessCounters,
}

impl Default for HeadlessContext {
    fn default() -> Self {
        Self::new(Size::new(640, 480))
    }
}

impl HeadlessContext {
    pub fn new(canvas: Size) -> Self {
        Self {
            canvas,
            viewport: canvas,
            attributes: Vec::new(),
            bound: None,
            time: 0.0,
            next_id: 1,
            max_texture_size: DEFAULT_MAX_TEXTURE_SIZE,
            textures: BTreeMap::new(),
            programs: BTreeMap::new(),
            framebuffers: BTreeMap::new(),
            depth_buffers: BTreeMap::new(),
            fail_texture: None,
            fail_framebuffer: None,
            counters: HeadlessCounters::default(),
        }
    }

    pub fn with_max_texture_size(mut self, edge: u32) -> Self {
        self.max_texture_size = edge;
        self
    }

    pub fn set_canvas_size(&mut self, size: Size) {
        self.canvas = size;
        if self.attributes.is_empty() {
            self.viewport = size;
        }
    }

    /// Moves the clock forward.
    pub fn advance(&mut self, seconds: f64) {
        self.time += seconds;
    }

    /// Makes the next texture creation fail.
    pub fn fail_next_texture(&mut self, reason: impl Into<String>) {
        self.fail_texture = Some(reason.into());
    }

    /// Makes the next framebuffer completeness check fail.
    pub fn fail_next_framebuffer_check(&mut self, reason: impl Into<String>) {
        self.fail_framebuffer = Some(reason.into());
    }

    pub fn counters(&self) -> HeadlessCounters {
        self.counters
    }

    pub fn texture(&self, id: TextureId) -> Option<&TextureDescriptor> {
        self.textures.get(&id)
    }

    /// Uniforms bound on a live program, in the order they were set.
    pub fn program_uniforms(&self, id: ProgramId) -> Option<&[(String, UniformValue)]> {
        self.programs.get(&id).map(Vec::as_slice)
    }

    /// Ids of every live program, ascending.
    pub fn program_ids(&self) -> Vec<ProgramId> {
        self.programs.keys().copied().collect()
    }

    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    pub fn live_programs(&self) -> usize {
        self.programs.len()
    }

    pub fn live_framebuffers(&self) -> usize {
        self.framebuffers.len()
    }

    pub fn live_depth_buffers(&self) -> usize {
        self.depth_buffers.len()
    }

    pub fn depth_buffers_created(&self) -> u64 {
        self.counters.depth_buffers_created
    }

    pub fn depth_buffers_destroyed(&self) -> u64 {
        self.counters.depth_buffers_destroyed
    }

    pub fn viewport(&self) -> Size {
        self.viewport
    }

    /// Number of unmatched `push_attributes` calls.
    pub fn attribute_depth(&self) -> usize {
        self.attributes.len()
    }

    fn allocate(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn invalid_delete(&mut self, what: &str, id: u32) {
        debug!(what, id, "deleting an object that is not live");
        self.counters.invalid_deletes += 1;
    }
}

impl GraphicsContext for HeadlessContext {
    fn create_texture(
        &mut self,
        desc: &TextureDescriptor,
        image: Option<&ImageData>,
    ) -> Result<TextureId, GraphicsError> {
        if let Some(reason) = self.fail_texture.take() {
            return Err(GraphicsError::Creation { object: "texture", reason });
        }
        if desc.size.width > self.max_texture_size || desc.size.height > self.max_texture_size {
            return Err(GraphicsError::Creation {
                object: "texture",
                reason: format!("{} exceeds maximum edge {}", desc.size, self.max_texture_size),
            });
        }
        if let Some(image) = image {
            let expected = ImageData::byte_len(desc.size);
            if image.size != desc.size || image.pixels.len() != expected {
                return Err(GraphicsError::Creation {
                    object: "texture",
                    reason: format!(
                        "expected {} image with {expected} bytes, got {} with {}",
                        desc.size,
                        image.size,
                        image.pixels.len()
                    ),
                });
            }
        }
        let id = TextureId(self.allocate());
        self.textures.insert(id, desc.clone());
        self.counters.textures_created += 1;
        Ok(id)
    }

    fn destroy_texture(&mut self, id: TextureId) {
        if self.textures.remove(&id).is_some() {
            self.counters.textures_destroyed += 1;
        } else {
            self.invalid_delete("texture", id.0);
        }
    }

    fn compile_program(&mut self, sources: &ShaderSources) -> Result<ProgramId, GraphicsError> {
        let stages = [
            (ShaderStage::Vertex, &sources.vertex),
            (ShaderStage::Geometry, &sources.geometry),
            (ShaderStage::Fragment, &sources.fragment),
        ];
        if stages.iter().all(|(_, source)| source.is_none()) {
            return Err(GraphicsError::Compile {
                stage: ShaderStage::Link,
                log: "program has no attached shaders".to_string(),
            });
        }
        for (stage, source) in stages {
            if let Some(line) = source
                .as_deref()
                .and_then(|text| text.lines().find(|line| line.trim_start().starts_with(COMPILE_ERROR_MARKER)))
            {
                return Err(GraphicsError::Compile { stage, log: line.trim().to_string() });
            }
        }
        let id = ProgramId(self.allocate());
        self.programs.insert(id, Vec::new());
        self.counters.programs_created += 1;
        Ok(id)
    }

    fn destroy_program(&mut self, id: ProgramId) {
        if self.programs.remove(&id).is_some() {
            self.counters.programs_destroyed += 1;
        } else {
            self.invalid_delete("program", id.0);
        }
    }

    fn set_uniforms(
        &mut self,
        program: ProgramId,
        uniforms: &[(String, UniformValue)],
    ) -> Result<(), GraphicsError> {
        let Some(bound) = self.programs.get_mut(&program) else {
            return Err(GraphicsError::Uniform {
                name: uniforms.first().map(|(name, _)| name.clone()).unwrap_or_default(),
                reason: format!("{program} does not exist"),
            });
        };
        if let Some((name, _)) = uniforms.iter().find(|(name, _)| name.trim().is_empty()) {
            return Err(GraphicsError::Uniform {
                name: name.clone(),
                reason: "uniform names must not be empty".to_string(),
            });
        }
        bound.extend(uniforms.iter().cloned());
        self.counters.uniform_updates += 1;
        Ok(())
    }

    fn create_framebuffer(&mut self) -> Result<FramebufferId, GraphicsError> {
        let id = FramebufferId(self.allocate());
        self.framebuffers.insert(id, Attachments::default());
        self.counters.framebuffers_created += 1;
        Ok(id)
    }

    fn destroy_framebuffer(&mut self, id: FramebufferId) {
        if self.framebuffers.remove(&id).is_some() {
            self.counters.framebuffers_destroyed += 1;
            if self.bound == Some(id) {
                self.bound = None;
            }
        } else {
            self.invalid_delete("framebuffer", id.0);
        }
    }

    fn attach_color(&mut self, framebuffer: FramebufferId, texture: TextureId) {
        if let Some(attachments) = self.framebuffers.get_mut(&framebuffer) {
            attachments.color = Some(texture);
        }
    }

    fn attach_depth(&mut self, framebuffer: FramebufferId, depth: DepthBufferId) {
        if let Some(attachments) = self.framebuffers.get_mut(&framebuffer) {
            attachments.depth = Some(depth);
        }
    }

    fn detach_all(&mut self, framebuffer: FramebufferId) {
        if let Some(attachments) = self.framebuffers.get_mut(&framebuffer) {
            *attachments = Attachments::default();
        }
    }

    fn check_framebuffer(&mut self, framebuffer: FramebufferId) -> Result<(), GraphicsError> {
        if let Some(reason) = self.fail_framebuffer.take() {
            return Err(GraphicsError::IncompleteFramebuffer(reason));
        }
        let attachments = self.framebuffers.get(&framebuffer).ok_or_else(|| {
            GraphicsError::IncompleteFramebuffer(format!("{framebuffer} does not exist"))
        })?;
        match attachments.color {
            Some(texture) if self.textures.contains_key(&texture) => {}
            _ => return Err(GraphicsError::IncompleteFramebuffer("missing color attachment".into())),
        }
        match attachments.depth {
            Some(depth) if self.depth_buffers.contains_key(&depth) => Ok(()),
            _ => Err(GraphicsError::IncompleteFramebuffer("missing depth attachment".into())),
        }
    }

    fn bind_framebuffer(&mut self, framebuffer: FramebufferId) {
        self.bound = Some(framebuffer);
    }

    fn unbind_framebuffer(&mut self) {
        self.bound = None;
    }

    fn bound_framebuffer(&self) -> Option<FramebufferId> {
        self.bound
    }

    fn create_depth_buffer(&mut self, size: Size) -> Result<DepthBufferId, GraphicsError> {
        let id = DepthBufferId(self.allocate());
        self.depth_buffers.insert(id, size);
        self.counters.depth_buffers_created += 1;
        Ok(id)
    }

    fn destroy_depth_buffer(&mut self, id: DepthBufferId) {
        if self.depth_buffers.remove(&id).is_some() {
            self.counters.depth_buffers_destroyed += 1;
        } else {
            self.invalid_delete("depth buffer", id.0);
        }
    }

    fn push_attributes(&mut self) {
        self.attributes.push(self.viewport);
    }

    fn pop_attributes(&mut self) {
        match self.attributes.pop() {
            Some(viewport) => self.viewport = viewport,
            None => debug!("attribute stack underflow"),
        }
    }

    fn set_viewport(&mut self, _x: i32, _y: i32, size: Size) {
        self.viewport = size;
    }

    fn canvas_size(&self) -> Size {
        self.canvas
    }

    fn time(&self) -> f64 {
        self.time
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::TextureResource;
    use crate::LoaderOptions;

    fn descriptor(size: Size) -> TextureDescriptor {
        TextureDescriptor::decide(&TextureResource::blank("t", size), &LoaderOptions::default(), size)
    }

    #[test]
    fn test_texture_lifecycle_counts() {
        let mut gfx = HeadlessContext::default();
        let size = Size::new(4, 4);
        let id = gfx.create_texture(&descriptor(size), None).unwrap();
        assert_eq!(gfx.live_textures(), 1);

        gfx.destroy_texture(id);
        gfx.destroy_texture(id);
        let counters = gfx.counters();
        assert_eq!(counters.textures_created, 1);
        assert_eq!(counters.textures_destroyed, 1);
        assert_eq!(counters.invalid_deletes, 1);
    }

    #[test]
    fn test_texture_creation_failures() {
        let mut gfx = HeadlessContext::default().with_max_texture_size(16);
        let big = Size::new(32, 4);
        assert!(gfx.create_texture(&descriptor(big), None).is_err());

        let size = Size::new(4, 4);
        gfx.fail_next_texture("out of memory");
        assert!(gfx.create_texture(&descriptor(size), None).is_err());
        assert!(gfx.create_texture(&descriptor(size), None).is_ok());

        let short = ImageData::new(size, vec![0; 3]);
        assert!(gfx.create_texture(&descriptor(size), Some(&short)).is_err());
        let full = ImageData::new(size, vec![0; ImageData::byte_len(size)]);
        assert!(gfx.create_texture(&descriptor(size), Some(&full)).is_ok());
    }

    #[test]
    fn test_compile_reports_failing_stage() {
        let mut gfx = HeadlessContext::default();
        let sources = ShaderSources {
            vertex: Some("void main() {}".into()),
            geometry: None,
            fragment: Some("#error broken\nvoid main() {}".into()),
        };
        let error = gfx.compile_program(&sources).unwrap_err();
        assert_eq!(error, GraphicsError::Compile { stage: ShaderStage::Fragment, log: "#error broken".into() });

        let empty = gfx.compile_program(&ShaderSources::default()).unwrap_err();
        assert!(matches!(empty, GraphicsError::Compile { stage: ShaderStage::Link, .. }));
        assert_eq!(gfx.live_programs(), 0);
    }

    #[test]
    fn test_uniforms_recorded_per_program() {
        let mut gfx = HeadlessContext::default();
        let sources = ShaderSources { vertex: Some("void main() {}".into()), ..Default::default() };
        let id = gfx.compile_program(&sources).unwrap();
        let uniforms = vec![("alpha".to_string(), UniformValue::Float(0.5))];

        gfx.set_uniforms(id, &uniforms).unwrap();
        assert_eq!(gfx.program_uniforms(id), Some(uniforms.as_slice()));
        assert_eq!(gfx.counters().uniform_updates, 1);

        let unnamed = vec![(" ".to_string(), UniformValue::Int(1))];
        assert!(matches!(gfx.set_uniforms(id, &unnamed), Err(GraphicsError::Uniform { .. })));

        gfx.destroy_program(id);
        assert!(gfx.set_uniforms(id, &uniforms).is_err());
        assert_eq!(gfx.program_uniforms(id), None);
    }

    #[test]
    fn test_attribute_stack_restores_viewport() {
        let mut gfx = HeadlessContext::new(Size::new(100, 50));
        gfx.push_attributes();
        gfx.set_viewport(0, 0, Size::new(8, 8));
        assert_eq!(gfx.viewport(), Size::new(8, 8));
        gfx.pop_attributes();
        assert_eq!(gfx.viewport(), Size::new(100, 50));
        assert_eq!(gfx.attribute_depth(), 0);
    }

    #[test]
    fn test_clock_advances() {
        let mut gfx = HeadlessContext::default();
        gfx.advance(0.5);
        gfx.advance(0.25);
        assert_eq!(gfx.time(), 0.75);
    }
}
