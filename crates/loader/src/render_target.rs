//! Render-target framebuffers and their shared depth buffers.
//!
//! Every render-target texture gets its own framebuffer. Depth buffers are
//! shared by depth-group id: the first target of a group creates one, later
//! targets attach to it, and it is destroyed when the last owner goes away.

use crate::error::{GraphicsError, LoaderError};
use crate::gfx::{DepthBufferId, FramebufferId, GraphicsContext, TextureId};
use crate::handle::{Size, TextureResource};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, trace};

/// A framebuffer bound to one colour texture and one shared depth buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderTarget {
    pub framebuffer: FramebufferId,
    pub color: TextureId,
    pub size: Size,
    pub depth_id: i32,
}

/// A depth attachment shared by every render target of one depth group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepthBuffer {
    pub id: DepthBufferId,
    pub size: Size,
    owners: Vec<FramebufferId>,
}

impl DepthBuffer {
    /// Framebuffers currently attached to this depth buffer.
    pub fn owners(&self) -> &[FramebufferId] {
        &self.owners
    }
}

#[derive(Debug, Default)]
pub struct RenderTargetRegistry {
    targets: HashMap<Arc<TextureResource>, RenderTarget>,
    depth_buffers: BTreeMap<i32, DepthBuffer>,
    /// Targets with an open pass, innermost last.
    active: Vec<Arc<TextureResource>>,
}

impl RenderTargetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps an already created colour texture in a framebuffer.
    ///
    /// On failure every object created here is released again and the
    /// caller still owns `color`.
    pub fn register<G: GraphicsContext + ?Sized>(
        &mut self,
        gfx: &mut G,
        resource: &Arc<TextureResource>,
        color: TextureId,
        size: Size,
    ) -> Result<RenderTarget, GraphicsError> {
        let depth_id = resource.depth_id;
        let (depth, fresh_depth) = match self.depth_buffers.get(&depth_id) {
            Some(existing) => (existing.id, false),
            None => (gfx.create_depth_buffer(size)?, true),
        };

        let framebuffer = match gfx.create_framebuffer() {
            Ok(framebuffer) => framebuffer,
            Err(error) => {
                if fresh_depth {
                    gfx.destroy_depth_buffer(depth);
                }
                return Err(error);
            }
        };

        gfx.attach_color(framebuffer, color);
        gfx.attach_depth(framebuffer, depth);
        if let Err(error) = gfx.check_framebuffer(framebuffer) {
            gfx.detach_all(framebuffer);
            gfx.destroy_framebuffer(framebuffer);
            if fresh_depth {
                gfx.destroy_depth_buffer(depth);
            }
            return Err(error);
        }

        self.depth_buffers
            .entry(depth_id)
            .or_insert_with(|| DepthBuffer { id: depth, size, owners: Vec::new() })
            .owners
            .push(framebuffer);

        let target = RenderTarget { framebuffer, color, size, depth_id };
        self.targets.insert(Arc::clone(resource), target);
        trace!(name = %resource.name, %framebuffer, depth_id, "render target registered");
        Ok(target)
    }

    /// Tears down the framebuffer of `resource` and drops its depth-buffer share.
    ///
    /// Returns the removed target so the caller can destroy its colour
    /// texture. Open passes on the target are ended first.
    pub fn release<G: GraphicsContext + ?Sized>(
        &mut self,
        gfx: &mut G,
        resource: &TextureResource,
    ) -> Option<RenderTarget> {
        while self.active.iter().any(|open| open.as_ref() == resource) {
            self.end(gfx);
        }

        let target = self.targets.remove(resource)?;

        let now_empty = match self.depth_buffers.get_mut(&target.depth_id) {
            Some(depth) => {
                depth.owners.retain(|owner| *owner != target.framebuffer);
                depth.owners.is_empty()
            }
            None => {
                debug!(depth_id = target.depth_id, "render target had no registered depth buffer");
                false
            }
        };
        if now_empty {
            if let Some(depth) = self.depth_buffers.remove(&target.depth_id) {
                gfx.destroy_depth_buffer(depth.id);
                trace!(depth_id = target.depth_id, "depth buffer destroyed");
            }
        }

        if gfx.bound_framebuffer().is_some() {
            gfx.unbind_framebuffer();
        }
        gfx.detach_all(target.framebuffer);
        gfx.destroy_framebuffer(target.framebuffer);
        // Re-bind the enclosing pass, if any.
        if let Some(open) = self.active.last().and_then(|open| self.targets.get(open)) {
            gfx.bind_framebuffer(open.framebuffer);
        }
        Some(target)
    }

    /// Opens a render pass on `resource`.
    pub fn begin<G: GraphicsContext + ?Sized>(
        &mut self,
        gfx: &mut G,
        resource: &Arc<TextureResource>,
    ) -> Result<RenderTarget, LoaderError> {
        if !resource.render_target {
            return Err(LoaderError::Consistency(format!("{} is not a render target", resource.name)));
        }
        if self.active.iter().any(|open| open == resource) {
            return Err(LoaderError::Consistency(format!(
                "render target {} already has an open pass",
                resource.name
            )));
        }
        let target = *self.targets.get(resource).ok_or_else(|| {
            LoaderError::Consistency(format!("render target {} is not cached", resource.name))
        })?;

        gfx.push_attributes();
        gfx.bind_framebuffer(target.framebuffer);
        gfx.set_viewport(0, 0, target.size);
        self.active.push(Arc::clone(resource));
        Ok(target)
    }

    /// Closes the innermost open pass. Returns `None` if no pass was open.
    pub fn end<G: GraphicsContext + ?Sized>(&mut self, gfx: &mut G) -> Option<Arc<TextureResource>> {
        let closed = self.active.pop()?;
        gfx.unbind_framebuffer();
        gfx.pop_attributes();
        if let Some(outer) = self.active.last().and_then(|open| self.targets.get(open)) {
            gfx.bind_framebuffer(outer.framebuffer);
        }
        Some(closed)
    }

    pub fn target(&self, resource: &TextureResource) -> Option<&RenderTarget> {
        self.targets.get(resource)
    }

    pub fn depth_buffer(&self, depth_id: i32) -> Option<&DepthBuffer> {
        self.depth_buffers.get(&depth_id)
    }

    /// Number of live render targets sharing `depth_id`'s depth buffer.
    pub fn owner_count(&self, depth_id: i32) -> usize {
        self.depth_buffers.get(&depth_id).map_or(0, |depth| depth.owners.len())
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn depth_buffer_count(&self) -> usize {
        self.depth_buffers.len()
    }

    pub fn active(&self) -> Option<&Arc<TextureResource>> {
        self.active.last()
    }
}
