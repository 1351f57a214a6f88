//! The resource cache engine.
//!
//! [`ResourceLoader`] owns every GPU object it creates. Producers on any
//! thread submit handles with [`enqueue`](ResourceLoader::enqueue) and read
//! results with [`fetch`](ResourceLoader::fetch); the thread that owns the
//! graphics context calls [`per_frame_cycle`](ResourceLoader::per_frame_cycle)
//! once per frame to do the actual work:
//!
//! 1. if a reload was requested, every cached handle of the requested kinds
//!    is queued for destruction and re-queued for loading;
//! 2. the destroy queue is drained;
//! 3. the pending queue is drained in FIFO order.
//!
//! The cache table, the pending set and the destroy queue share one mutex.
//! Listener events are collected while it is held and delivered after it is
//! released, so listeners may call back into the loader.

use crate::cached::{CachedObject, CachedShader, CachedTexture};
use crate::config::{LoaderOption, LoaderOptions};
use crate::decoder::{Decoder, TextureRequest};
use crate::error::{DecodeError, GraphicsError, LoaderError};
use crate::format::{decide_scale_filter, TextureDescriptor};
use crate::gfx::{GraphicsContext, ImageData};
use crate::handle::{ResourceHandle, ShaderResource, Size, TextureResource};
use crate::listener::{ListenerBus, LoaderEvent, LoaderListener};
use crate::pending::PendingQueue;
use crate::render_target::{RenderTarget, RenderTargetRegistry};
use crate::stats::{CycleReport, LoaderCounters, LoaderStats};
use crate::table::CacheTable;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use tracing::{debug, info, trace};

struct LoaderState {
    table: CacheTable<ResourceHandle, CachedObject>,
    pending: PendingQueue<ResourceHandle>,
    destroy_queue: VecDeque<ResourceHandle>,
    targets: RenderTargetRegistry,
    options: LoaderOptions,
    texture_reload: bool,
    shader_reload: bool,
    counters: LoaderCounters,
}

enum Outcome {
    Touched,
    Cached,
    Failed,
}

/// Loads, shares and destroys GPU textures and shader programs.
pub struct ResourceLoader<D: Decoder> {
    state: Mutex<LoaderState>,
    /// Signalled whenever a handle leaves the pending set.
    loaded: Condvar,
    decoder: D,
    listeners: ListenerBus,
}

impl<D: Decoder> ResourceLoader<D> {
    /// Creates an empty loader with default options.
    pub fn new(decoder: D) -> Self {
        Self::with_options(decoder, LoaderOptions::default())
    }

    /// Creates an empty loader. Options given here apply to the first load,
    /// so no reload is scheduled.
    pub fn with_options(decoder: D, options: LoaderOptions) -> Self {
        Self {
            state: Mutex::new(LoaderState {
                table: CacheTable::new(),
                pending: PendingQueue::new(),
                destroy_queue: VecDeque::new(),
                targets: RenderTargetRegistry::new(),
                options,
                texture_reload: false,
                shader_reload: false,
                counters: LoaderCounters::default(),
            }),
            loaded: Condvar::new(),
            decoder,
            listeners: ListenerBus::new(),
        }
    }

    /// The decoder this loader reads pixels and shader sources through.
    pub fn decoder(&self) -> &D {
        &self.decoder
    }

    /// Subscribes `listener` to every event from now on.
    ///
    /// Listeners run on the thread that produced the event, after the
    /// loader's lock is released.
    pub fn add_listener(&self, listener: Arc<dyn LoaderListener>) {
        self.listeners.subscribe(listener);
    }

    /// Unsubscribes a listener previously passed to [`add_listener`](Self::add_listener).
    ///
    /// Returns `false` if it was not subscribed.
    pub fn remove_listener(&self, listener: &Arc<dyn LoaderListener>) -> bool {
        self.listeners.unsubscribe(listener)
    }

    /// Submits handles for loading on the next frame.
    ///
    /// Handles that are already cached are touched instead: their unwanted
    /// flag is cleared and a touched event is sent, without decoding.
    pub fn enqueue<I, H>(&self, handles: I)
    where
        I: IntoIterator<Item = H>,
        H: Into<ResourceHandle>,
    {
        let mut events = Vec::new();
        {
            let mut state = self.state.lock();
            for handle in handles {
                let handle = handle.into();
                if state.table.touch(&handle) {
                    state.counters.touches += 1;
                    events.push(touched_event(&handle));
                } else {
                    trace!(%handle, "queued for loading");
                    events.push(added_event(&handle));
                    state.pending.push(handle);
                }
            }
        }
        self.listeners.publish(&events);
    }

    /// Loads `handle` right now, on the calling (graphics) thread.
    ///
    /// Returns the cached object, or `None` if loading failed. Failures are
    /// reported to listeners.
    pub fn cache_now<G: GraphicsContext + ?Sized>(
        &self,
        gfx: &mut G,
        handle: impl Into<ResourceHandle>,
    ) -> Option<CachedObject> {
        let handle = handle.into();
        let mut events = Vec::new();
        let cached = {
            let mut state = self.state.lock();
            self.cache_locked(&mut state, gfx, &handle, &mut events);
            state.table.get(&handle).cloned()
        };
        self.listeners.publish(&events);
        cached
    }

    /// Returns the cached object for `handle`, waiting while it is pending.
    ///
    /// Must not be called on the thread that runs the frame cycle while the
    /// handle is pending, or it will wait forever.
    pub fn fetch(&self, handle: &ResourceHandle) -> Option<CachedObject> {
        let mut state = self.state.lock();
        while state.pending.contains(handle) {
            self.loaded.wait(&mut state);
        }
        state.table.get(handle).cloned()
    }

    /// [`fetch`](Self::fetch) for a texture, returning its cached texture.
    pub fn fetch_texture(&self, texture: &Arc<TextureResource>) -> Option<CachedTexture> {
        match self.fetch(&ResourceHandle::Texture(Arc::clone(texture)))? {
            CachedObject::Texture(cached) => Some(cached),
            CachedObject::Shader(_) => None,
        }
    }

    /// [`fetch`](Self::fetch) for a shader, returning its linked program.
    pub fn fetch_shader(&self, shader: &Arc<ShaderResource>) -> Option<CachedShader> {
        match self.fetch(&ResourceHandle::Shader(Arc::clone(shader)))? {
            CachedObject::Shader(cached) => Some(cached),
            CachedObject::Texture(_) => None,
        }
    }

    /// Non-blocking variant of [`fetch`](Self::fetch).
    pub fn try_fetch(&self, handle: &ResourceHandle) -> Option<CachedObject> {
        self.state.lock().table.get(handle).cloned()
    }

    /// Queues handles for destruction on the next frame.
    pub fn schedule_destroy<I, H>(&self, handles: I)
    where
        I: IntoIterator<Item = H>,
        H: Into<ResourceHandle>,
    {
        let mut state = self.state.lock();
        state.destroy_queue.extend(handles.into_iter().map(Into::into));
    }

    /// Requests that every cached texture and shader be destroyed and rebuilt
    /// on the next frame.
    pub fn trigger_reload(&self) {
        let mut state = self.state.lock();
        state.texture_reload = true;
        state.shader_reload = true;
    }

    /// Requests that every cached texture be rebuilt on the next frame.
    /// Shader programs are left alone.
    pub fn trigger_texture_reload(&self) {
        self.state.lock().texture_reload = true;
    }

    /// Requests that every cached shader program be rebuilt on the next frame.
    pub fn trigger_shader_reload(&self) {
        self.state.lock().shader_reload = true;
    }

    /// Runs one frame of loader work. Call exactly once per frame on the
    /// thread that owns `gfx`.
    pub fn per_frame_cycle<G: GraphicsContext + ?Sized>(&self, gfx: &mut G) -> CycleReport {
        let mut report = CycleReport::default();
        let mut events = Vec::new();

        {
            let mut state = self.state.lock();
            state.counters.cycles += 1;

            if state.texture_reload || state.shader_reload {
                let (textures, shaders) = (state.texture_reload, state.shader_reload);
                let handles: Vec<_> = state
                    .table
                    .keys()
                    .into_iter()
                    .filter(|handle| match handle {
                        ResourceHandle::Texture(_) => textures,
                        ResourceHandle::Shader(_) => shaders,
                    })
                    .collect();
                info!(count = handles.len(), textures, shaders, "reloading cached resources");
                for handle in handles {
                    state.destroy_queue.push_back(handle.clone());
                    events.push(added_event(&handle));
                    state.pending.push(handle);
                }
                state.texture_reload = false;
                state.shader_reload = false;
                state.counters.reloads += 1;
                report.reloaded = true;
            }

            while let Some(handle) = state.destroy_queue.pop_front() {
                if self.purge(&mut state, gfx, &handle, &mut events) {
                    report.destroyed += 1;
                }
            }
        }
        self.listeners.publish(&events);

        loop {
            events.clear();
            let outcome = {
                let mut state = self.state.lock();
                let Some(handle) = state.pending.pop_front() else {
                    break;
                };
                self.cache_locked(&mut state, gfx, &handle, &mut events)
            };
            self.listeners.publish(&events);

            report.attempted += 1;
            match outcome {
                Outcome::Touched => report.touched += 1,
                Outcome::Cached => report.cached += 1,
                Outcome::Failed => report.failed += 1,
            }
        }

        if !report.is_idle() {
            debug!(?report, "frame cycle finished");
        }
        report
    }

    /// Changes one engine-wide option.
    ///
    /// Returns `Ok(true)` and schedules a texture reload if the value changed;
    /// setting the current value again does nothing. Options only shape
    /// textures, so shader programs are not rebuilt.
    pub fn set_option(&self, option: LoaderOption) -> Result<bool, LoaderError> {
        option.validate()?;
        let mut state = self.state.lock();
        let changed = state.options.apply(option);
        if changed {
            info!(option = option.name(), ?option, "loader option changed; texture reload scheduled");
            state.texture_reload = true;
        }
        Ok(changed)
    }

    /// Applies a whole option set, scheduling at most one texture reload.
    pub fn apply_options(&self, options: &LoaderOptions) -> Result<bool, LoaderError> {
        let settings = options.to_settings();
        for setting in &settings {
            setting.validate()?;
        }
        let mut state = self.state.lock();
        let mut changed = false;
        for setting in settings {
            changed |= state.options.apply(setting);
        }
        if changed {
            info!("loader options replaced; texture reload scheduled");
            state.texture_reload = true;
        }
        Ok(changed)
    }

    /// Upload textures in a compressed format where allowed.
    pub fn set_compress_textures(&self, value: bool) -> bool {
        self.set_flag(LoaderOption::CompressTextures(value))
    }

    /// Store uncompressed textures as 32-bit RGBA.
    pub fn set_force_32bit(&self, value: bool) -> bool {
        self.set_flag(LoaderOption::Force32Bit(value))
    }

    /// Never generate mipmaps.
    pub fn set_force_no_mipmap(&self, value: bool) -> bool {
        self.set_flag(LoaderOption::ForceNoMipmap(value))
    }

    /// Sample every texture with nearest filtering.
    pub fn set_force_nearest(&self, value: bool) -> bool {
        self.set_flag(LoaderOption::ForceNearest(value))
    }

    /// Anisotropic filtering level. Fails for negative or non-finite values.
    pub fn set_texture_anisotropy(&self, value: f32) -> Result<bool, LoaderError> {
        self.set_option(LoaderOption::TextureAnisotropy(value))
    }

    /// Use trilinear rather than bilinear minification.
    pub fn set_texture_best_filtering(&self, value: bool) -> bool {
        self.set_flag(LoaderOption::TextureBestFiltering(value))
    }

    fn set_flag(&self, option: LoaderOption) -> bool {
        // Boolean options cannot fail validation.
        self.set_option(option).unwrap_or(false)
    }

    /// Snapshot of the current option values.
    pub fn options(&self) -> LoaderOptions {
        self.state.lock().options.clone()
    }

    /// True if the next frame will reload textures, shaders or both.
    pub fn reload_requested(&self) -> bool {
        let state = self.state.lock();
        state.texture_reload || state.shader_reload
    }

    /// True if `handle` is cached right now. Never blocks on pending loads.
    pub fn contains(&self, handle: &ResourceHandle) -> bool {
        self.state.lock().table.contains(handle)
    }

    /// True if `handle` is waiting for the frame cycle.
    pub fn is_pending(&self, handle: &ResourceHandle) -> bool {
        self.state.lock().pending.contains(handle)
    }

    /// Cached handles in the order they were loaded.
    pub fn cached_handles(&self) -> Vec<ResourceHandle> {
        self.state.lock().table.keys()
    }

    /// Cached handles with their objects, in load order.
    pub fn cached_entries(&self) -> Vec<(ResourceHandle, CachedObject)> {
        let state = self.state.lock();
        state.table.iter().map(|(handle, cached)| (handle.clone(), cached.clone())).collect()
    }

    /// Marks every cached entry unwanted until it is enqueued again.
    ///
    /// Nothing is destroyed; see [`unwanted_handles`](Self::unwanted_handles).
    pub fn flag_all_unwanted(&self) {
        self.state.lock().table.flag_all();
    }

    /// Entries not touched since the last [`flag_all_unwanted`](Self::flag_all_unwanted).
    pub fn unwanted_handles(&self) -> Vec<ResourceHandle> {
        self.state.lock().table.flagged_keys()
    }

    /// Framebuffer and depth binding of a cached render target.
    pub fn render_target(&self, texture: &TextureResource) -> Option<RenderTarget> {
        self.state.lock().targets.target(texture).copied()
    }

    /// Number of live render targets sharing the depth buffer of `depth_id`.
    pub fn depth_owner_count(&self, depth_id: i32) -> usize {
        self.state.lock().targets.owner_count(depth_id)
    }

    /// Point-in-time counts and totals.
    pub fn stats(&self) -> LoaderStats {
        let state = self.state.lock();
        let (mut cached_textures, mut cached_shaders) = (0, 0);
        let mut estimated_texture_bytes = 0;
        for cached in state.table.values() {
            match cached {
                CachedObject::Texture(_) => cached_textures += 1,
                CachedObject::Shader(_) => cached_shaders += 1,
            }
            estimated_texture_bytes += cached.estimated_bytes();
        }
        LoaderStats {
            cached_textures,
            cached_shaders,
            pending: state.pending.pending_count(),
            queued_destroys: state.destroy_queue.len(),
            render_targets: state.targets.len(),
            depth_buffers: state.targets.depth_buffer_count(),
            estimated_texture_bytes,
            reload_requested: state.texture_reload || state.shader_reload,
            counters: state.counters,
        }
    }

    /// Opens a render pass on a render-target texture, caching it first if needed.
    ///
    /// Returns `false` and does nothing for plain textures, for targets that
    /// fail to load, and for targets that already have an open pass.
    pub fn start_render_target<G: GraphicsContext + ?Sized>(
        &self,
        gfx: &mut G,
        texture: &Arc<TextureResource>,
    ) -> bool {
        if !texture.render_target {
            debug!(name = %texture.name, "start_render_target on a plain texture ignored");
            return false;
        }
        let handle = ResourceHandle::Texture(Arc::clone(texture));
        let mut events = Vec::new();
        let started = {
            let mut state = self.state.lock();
            if !state.table.contains(&handle) {
                self.cache_locked(&mut state, gfx, &handle, &mut events);
            }
            match state.targets.begin(gfx, texture) {
                Ok(_) => true,
                Err(error) => {
                    debug!(%error, "render pass not started");
                    false
                }
            }
        };
        self.listeners.publish(&events);
        started
    }

    /// Closes the innermost render pass. Returns `false` if none was open.
    pub fn end_render_target<G: GraphicsContext + ?Sized>(&self, gfx: &mut G) -> bool {
        let closed = self.state.lock().targets.end(gfx);
        if closed.is_none() {
            debug!("end_render_target without an open pass");
        }
        closed.is_some()
    }

    /// Scoped version of [`start_render_target`](Self::start_render_target).
    ///
    /// The pass ends when the returned guard is dropped. Drawing goes through
    /// the guard, which dereferences to the graphics context.
    pub fn render_target_pass<'a, G: GraphicsContext + ?Sized>(
        &'a self,
        gfx: &'a mut G,
        texture: &Arc<TextureResource>,
    ) -> Option<RenderTargetPass<'a, D, G>> {
        if self.start_render_target(gfx, texture) {
            Some(RenderTargetPass { loader: self, gfx })
        } else {
            None
        }
    }

    /// Destroys every cached object immediately, for context teardown.
    ///
    /// Pending and queued-destroy handles are dropped and waiters released.
    pub fn destroy_all<G: GraphicsContext + ?Sized>(&self, gfx: &mut G) -> usize {
        let mut events = Vec::new();
        let destroyed = {
            let mut state = self.state.lock();
            while state.targets.end(gfx).is_some() {}
            let mut destroyed = 0;
            for handle in state.table.keys() {
                if self.purge(&mut state, gfx, &handle, &mut events) {
                    destroyed += 1;
                }
            }
            state.destroy_queue.clear();
            while let Some(handle) = state.pending.pop_front() {
                state.pending.settle(&handle);
            }
            state.texture_reload = false;
            state.shader_reload = false;
            destroyed
        };
        self.loaded.notify_all();
        self.listeners.publish(&events);
        destroyed
    }

    /// Reports a graphics failure that is not tied to one resource.
    pub fn report_graphic_error(&self, error: GraphicsError) {
        self.listeners.publish(&[LoaderEvent::OtherGraphicError(error)]);
    }

    /// Reports an I/O failure that is not tied to one resource.
    pub fn report_io_error(&self, error: DecodeError) {
        self.listeners.publish(&[LoaderEvent::OtherIoError(error)]);
    }

    /// Load procedure. Runs with the state lock held, so loads are single-flight.
    fn cache_locked<G: GraphicsContext + ?Sized>(
        &self,
        state: &mut LoaderState,
        gfx: &mut G,
        handle: &ResourceHandle,
        events: &mut Vec<LoaderEvent>,
    ) -> Outcome {
        let outcome = if state.table.touch(handle) {
            state.counters.touches += 1;
            events.push(touched_event(handle));
            Outcome::Touched
        } else {
            state.counters.loads_attempted += 1;
            let loaded = match handle {
                ResourceHandle::Texture(texture) => self
                    .load_texture(state, gfx, texture, events)
                    .map(CachedObject::Texture),
                ResourceHandle::Shader(shader) => self
                    .load_shader(state, gfx, shader, events)
                    .map(CachedObject::Shader),
            };
            match loaded {
                Some(cached) => {
                    state.table.insert(handle.clone(), cached);
                    Outcome::Cached
                }
                None => Outcome::Failed,
            }
        };

        if state.pending.settle(handle) {
            self.loaded.notify_all();
        }
        outcome
    }

    fn load_texture<G: GraphicsContext + ?Sized>(
        &self,
        state: &mut LoaderState,
        gfx: &mut G,
        texture: &Arc<TextureResource>,
        events: &mut Vec<LoaderEvent>,
    ) -> Option<CachedTexture> {
        let (size, image) = match self.texture_image(state, gfx, texture) {
            Ok(loaded) => loaded,
            Err(error) => {
                debug!(name = %texture.name, %error, "texture failed to decode");
                state.counters.load_errors += 1;
                events.push(LoaderEvent::TextureLoadError(Arc::clone(texture), error));
                return None;
            }
        };

        let descriptor = TextureDescriptor::decide(texture, &state.options, size);
        let created = gfx.create_texture(&descriptor, image.as_ref()).and_then(|id| {
            if !texture.render_target {
                return Ok(id);
            }
            match state.targets.register(gfx, texture, id, size) {
                Ok(_) => Ok(id),
                Err(error) => {
                    gfx.destroy_texture(id);
                    Err(error)
                }
            }
        });

        match created {
            Ok(id) => {
                let cached =
                    CachedTexture { id, descriptor, render_target: texture.render_target };
                debug!(name = %texture.name, %id, format = ?cached.descriptor.format, "texture cached");
                state.counters.textures_cached += 1;
                events.push(LoaderEvent::TextureCached(Arc::clone(texture), cached.clone()));
                Some(cached)
            }
            Err(error) => {
                debug!(name = %texture.name, %error, "texture failed to upload");
                state.counters.graphic_errors += 1;
                events.push(LoaderEvent::TextureGraphicError(Arc::clone(texture), error));
                None
            }
        }
    }

    /// Size and pixel data for a texture. Textures without a path get no
    /// pixels; the context allocates blank storage of the returned size.
    fn texture_image<G: GraphicsContext + ?Sized>(
        &self,
        state: &LoaderState,
        gfx: &G,
        texture: &TextureResource,
    ) -> Result<(Size, Option<ImageData>), DecodeError> {
        let Some(path) = texture.path.as_deref() else {
            let size = match texture.size {
                Some(size) => size,
                None if texture.render_target => gfx.canvas_size().next_power_of_two(),
                None => Size::ZERO,
            };
            return Ok((size, None));
        };
        let image = self.decoder.decode_texture(&TextureRequest {
            resource: texture,
            path,
            target_size: texture.size,
            scale_filter: decide_scale_filter(texture, &state.options),
        })?;
        Ok((image.size, Some(image)))
    }

    fn load_shader<G: GraphicsContext + ?Sized>(
        &self,
        state: &mut LoaderState,
        gfx: &mut G,
        shader: &Arc<ShaderResource>,
        events: &mut Vec<LoaderEvent>,
    ) -> Option<CachedShader> {
        let sources = match self.decoder.decode_shader(shader) {
            Ok(sources) => sources,
            Err(error) => {
                debug!(name = %shader.name, %error, "shader failed to read");
                state.counters.load_errors += 1;
                events.push(LoaderEvent::ShaderLoadError(Arc::clone(shader), error));
                return None;
            }
        };
        let linked = gfx.compile_program(&sources).and_then(|id| {
            if shader.uniforms.is_empty() {
                return Ok(id);
            }
            match gfx.set_uniforms(id, &shader.uniforms) {
                Ok(()) => Ok(id),
                Err(error) => {
                    gfx.destroy_program(id);
                    Err(error)
                }
            }
        });
        match linked {
            Ok(id) => {
                let cached = CachedShader { id };
                debug!(name = %shader.name, %id, "shader cached");
                state.counters.shaders_cached += 1;
                events.push(LoaderEvent::ShaderCached(Arc::clone(shader), cached));
                Some(cached)
            }
            Err(error) => {
                debug!(name = %shader.name, %error, "shader failed to compile");
                state.counters.graphic_errors += 1;
                events.push(LoaderEvent::ShaderGraphicError(Arc::clone(shader), error));
                None
            }
        }
    }

    /// Removes `handle` from the table and destroys its GPU objects.
    ///
    /// Returns `false` if the handle was not cached.
    fn purge<G: GraphicsContext + ?Sized>(
        &self,
        state: &mut LoaderState,
        gfx: &mut G,
        handle: &ResourceHandle,
        events: &mut Vec<LoaderEvent>,
    ) -> bool {
        let Some(cached) = state.table.remove(handle) else {
            trace!(%handle, "destroy requested for a handle that is not cached");
            return false;
        };
        match (handle, cached) {
            (ResourceHandle::Texture(texture), CachedObject::Texture(cached)) => {
                if cached.render_target {
                    state.targets.release(gfx, texture);
                }
                gfx.destroy_texture(cached.id);
                events.push(LoaderEvent::TextureDestroyed(Arc::clone(texture)));
            }
            (ResourceHandle::Shader(shader), CachedObject::Shader(cached)) => {
                gfx.destroy_program(cached.id);
                events.push(LoaderEvent::ShaderDestroyed(Arc::clone(shader)));
            }
            (handle, cached) => {
                debug!(%handle, ?cached, "cache entry kind does not match its handle");
                return false;
            }
        }
        state.counters.destroyed += 1;
        debug!(%handle, "destroyed");
        true
    }
}

fn added_event(handle: &ResourceHandle) -> LoaderEvent {
    match handle {
        ResourceHandle::Texture(texture) => LoaderEvent::TextureAdded(Arc::clone(texture)),
        ResourceHandle::Shader(shader) => LoaderEvent::ShaderAdded(Arc::clone(shader)),
    }
}

fn touched_event(handle: &ResourceHandle) -> LoaderEvent {
    match handle {
        ResourceHandle::Texture(texture) => LoaderEvent::TextureTouched(Arc::clone(texture)),
        ResourceHandle::Shader(shader) => LoaderEvent::ShaderTouched(Arc::clone(shader)),
    }
}

/// An open render pass. Ends the pass when dropped.
pub struct RenderTargetPass<'a, D: Decoder, G: GraphicsContext + ?Sized> {
    loader: &'a ResourceLoader<D>,
    gfx: &'a mut G,
}

impl<D: Decoder, G: GraphicsContext + ?Sized> RenderTargetPass<'_, D, G> {
    /// Ends the pass now.
    pub fn finish(self) {}
}

impl<D: Decoder, G: GraphicsContext + ?Sized> Deref for RenderTargetPass<'_, D, G> {
    type Target = G;

    fn deref(&self) -> &G {
        self.gfx
    }
}

impl<D: Decoder, G: GraphicsContext + ?Sized> DerefMut for RenderTargetPass<'_, D, G> {
    fn deref_mut(&mut self) -> &mut G {
        self.gfx
    }
}

impl<D: Decoder, G: GraphicsContext + ?Sized> Drop for RenderTargetPass<'_, D, G> {
    fn drop(&mut self) {
        self.loader.end_render_target(self.gfx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::MemoryDecoder;
    use crate::handle::UniformValue;
    use crate::headless::HeadlessContext;
    use crate::listener::{EventKind, EventRecorder};

    fn setup() -> (ResourceLoader<MemoryDecoder>, HeadlessContext, Arc<EventRecorder>) {
        let decoder = MemoryDecoder::new();
        decoder.insert_solid("wall.png", Size::new(8, 8), [200, 10, 10, 255]);
        decoder.insert_solid("floor.png", Size::new(4, 4), [10, 200, 10, 255]);
        decoder.insert_source("basic.vert", "void main() {}");
        decoder.insert_source("basic.frag", "void main() {}");
        let loader = ResourceLoader::new(decoder);
        let recorder = Arc::new(EventRecorder::new());
        loader.add_listener(recorder.clone());
        (loader, HeadlessContext::new(Size::new(800, 600)), recorder)
    }

    fn wall() -> ResourceHandle {
        TextureResource::file("wall", "wall.png").into()
    }

    #[test]
    fn test_enqueue_then_cycle_caches() {
        let (loader, mut gfx, recorder) = setup();
        loader.enqueue([wall()]);
        assert!(loader.is_pending(&wall()));
        assert!(!loader.contains(&wall()));

        let report = loader.per_frame_cycle(&mut gfx);
        assert_eq!(report.cached, 1);
        assert!(!loader.is_pending(&wall()));
        assert!(loader.contains(&wall()));
        assert_eq!(recorder.kinds(), vec![EventKind::TextureAdded, EventKind::TextureCached]);
    }

    #[test]
    fn test_enqueue_cached_handle_touches() {
        let (loader, mut gfx, recorder) = setup();
        loader.cache_now(&mut gfx, wall()).unwrap();
        recorder.clear();

        loader.enqueue([wall()]);
        assert!(!loader.is_pending(&wall()));
        assert_eq!(recorder.kinds(), vec![EventKind::TextureTouched]);
        assert_eq!(loader.decoder().texture_calls(), 1);
    }

    #[test]
    fn test_cache_now_is_idempotent() {
        let (loader, mut gfx, _) = setup();
        let first = loader.cache_now(&mut gfx, wall()).unwrap();
        let second = loader.cache_now(&mut gfx, wall()).unwrap();
        assert_eq!(first, second);
        assert_eq!(gfx.live_textures(), 1);
        assert_eq!(loader.stats().counters.touches, 1);
    }

    #[test]
    fn test_blank_texture_sizes() {
        let (loader, mut gfx, _) = setup();
        let sized = loader
            .cache_now(&mut gfx, TextureResource::blank("sized", Size::new(32, 16)))
            .unwrap();
        assert_eq!(sized.as_texture().unwrap().descriptor.size, Size::new(32, 16));

        let rt = loader.cache_now(&mut gfx, TextureResource::render_target("rt", 0)).unwrap();
        assert_eq!(rt.as_texture().unwrap().descriptor.size, Size::new(1024, 1024));

        let mut empty = TextureResource::blank("empty", Size::ZERO);
        empty.size = None;
        let empty = loader.cache_now(&mut gfx, empty).unwrap();
        assert_eq!(empty.as_texture().unwrap().descriptor.size, Size::ZERO);
    }

    #[test]
    fn test_located_texture_scaled_to_explicit_size() {
        let (loader, mut gfx, _) = setup();
        let scaled = TextureResource::file("wall-small", "wall.png").with_size(2, 2);
        let cached = loader.cache_now(&mut gfx, scaled).unwrap();
        assert_eq!(cached.as_texture().unwrap().descriptor.size, Size::new(2, 2));
    }

    #[test]
    fn test_shader_load_and_compile_error() {
        let (loader, mut gfx, recorder) = setup();
        loader.decoder().insert_source("bad.frag", "#error nope");
        let good = ShaderResource::new("basic").with_vertex("basic.vert").with_fragment("basic.frag");
        let bad = ShaderResource::new("bad").with_vertex("basic.vert").with_fragment("bad.frag");
        let missing = ShaderResource::new("missing").with_vertex("missing.vert");

        loader.enqueue([good.clone(), bad.clone(), missing.clone()]);
        let report = loader.per_frame_cycle(&mut gfx);

        assert_eq!(report.cached, 1);
        assert_eq!(report.failed, 2);
        assert!(loader.fetch_shader(&Arc::new(good)).is_some());
        assert!(loader.fetch_shader(&Arc::new(bad)).is_none());
        assert_eq!(recorder.names(EventKind::ShaderGraphicError), vec!["bad"]);
        assert_eq!(recorder.names(EventKind::ShaderLoadError), vec!["missing"]);
    }

    #[test]
    fn test_graphic_error_leaves_table_unmodified() {
        let (loader, mut gfx, recorder) = setup();
        gfx.fail_next_texture("out of memory");
        assert!(loader.cache_now(&mut gfx, wall()).is_none());
        assert!(!loader.contains(&wall()));
        assert_eq!(recorder.count(EventKind::TextureGraphicError), 1);
        assert_eq!(loader.stats().counters.graphic_errors, 1);
    }

    #[test]
    fn test_render_target_failure_releases_everything() {
        let (loader, mut gfx, recorder) = setup();
        gfx.fail_next_framebuffer_check("unsupported");
        let rt = TextureResource::render_target("rt", 4).with_size(16, 16);

        assert!(loader.cache_now(&mut gfx, rt).is_none());
        assert_eq!(gfx.live_textures(), 0);
        assert_eq!(gfx.live_framebuffers(), 0);
        assert_eq!(gfx.live_depth_buffers(), 0);
        assert_eq!(loader.depth_owner_count(4), 0);
        assert_eq!(recorder.count(EventKind::TextureGraphicError), 1);
    }

    #[test]
    fn test_schedule_destroy_is_deferred() {
        let (loader, mut gfx, recorder) = setup();
        loader.cache_now(&mut gfx, wall()).unwrap();
        loader.schedule_destroy([wall()]);
        assert!(loader.contains(&wall()));

        let report = loader.per_frame_cycle(&mut gfx);
        assert_eq!(report.destroyed, 1);
        assert!(!loader.contains(&wall()));
        assert_eq!(gfx.live_textures(), 0);
        assert_eq!(recorder.count(EventKind::TextureDestroyed), 1);
    }

    #[test]
    fn test_destroying_uncached_handle_is_silent() {
        let (loader, mut gfx, recorder) = setup();
        loader.schedule_destroy([wall()]);
        let report = loader.per_frame_cycle(&mut gfx);
        assert_eq!(report.destroyed, 0);
        assert!(recorder.events().is_empty());
    }

    #[test]
    fn test_reload_rebuilds_with_new_options() {
        let (loader, mut gfx, recorder) = setup();
        loader.cache_now(&mut gfx, wall()).unwrap();
        let before = loader.try_fetch(&wall()).unwrap();
        recorder.clear();

        assert!(loader.set_force_nearest(true));
        assert!(loader.reload_requested());
        let report = loader.per_frame_cycle(&mut gfx);

        assert!(report.reloaded);
        assert_eq!(report.destroyed, 1);
        assert_eq!(report.cached, 1);
        let after = loader.try_fetch(&wall()).unwrap();
        assert_ne!(before, after);
        assert!(!after.as_texture().unwrap().descriptor.mipmaps);
        assert_eq!(
            recorder.kinds(),
            vec![EventKind::TextureAdded, EventKind::TextureDestroyed, EventKind::TextureCached]
        );
        assert_eq!(gfx.live_textures(), 1);
    }

    fn basic_shader() -> ShaderResource {
        ShaderResource::new("basic").with_vertex("basic.vert").with_fragment("basic.frag")
    }

    #[test]
    fn test_option_change_keeps_shader_programs() {
        let (loader, mut gfx, recorder) = setup();
        loader.cache_now(&mut gfx, wall()).unwrap();
        loader.cache_now(&mut gfx, basic_shader()).unwrap();
        let programs = gfx.program_ids();
        recorder.clear();

        assert!(loader.set_force_nearest(true));
        let report = loader.per_frame_cycle(&mut gfx);

        assert_eq!(report.destroyed, 1);
        assert_eq!(report.cached, 1);
        assert_eq!(gfx.program_ids(), programs);
        assert_eq!(gfx.counters().programs_created, 1);
        assert_eq!(recorder.count(EventKind::ShaderDestroyed), 0);
        assert_eq!(recorder.count(EventKind::TextureAdded), 1);
    }

    #[test]
    fn test_reload_kinds_are_independent() {
        let (loader, mut gfx, recorder) = setup();
        loader.cache_now(&mut gfx, wall()).unwrap();
        loader.cache_now(&mut gfx, basic_shader()).unwrap();
        recorder.clear();

        loader.trigger_shader_reload();
        assert!(loader.reload_requested());
        let report = loader.per_frame_cycle(&mut gfx);
        assert!(report.reloaded);
        assert_eq!(
            recorder.kinds(),
            vec![EventKind::ShaderAdded, EventKind::ShaderDestroyed, EventKind::ShaderCached]
        );
        assert_eq!(gfx.counters().textures_created, 1);

        recorder.clear();
        loader.trigger_reload();
        let report = loader.per_frame_cycle(&mut gfx);
        assert_eq!(report.destroyed, 2);
        assert_eq!(report.cached, 2);
        assert_eq!(recorder.count(EventKind::TextureAdded), 1);
        assert_eq!(recorder.count(EventKind::ShaderAdded), 1);
        assert_eq!(loader.stats().counters.reloads, 2);
    }

    #[test]
    fn test_shader_uniforms_bound_after_link() {
        let (loader, mut gfx, recorder) = setup();
        let tinted = basic_shader()
            .with_uniform("tint", UniformValue::Vec4([1.0, 0.5, 0.5, 1.0]))
            .with_uniform("layer", UniformValue::Int(2));
        let cached = loader.cache_now(&mut gfx, tinted.clone()).unwrap();
        let id = cached.as_shader().unwrap().id;
        assert_eq!(gfx.program_uniforms(id), Some(tinted.uniforms.as_slice()));

        let unnamed = basic_shader().with_uniform("", UniformValue::Float(1.0));
        assert!(loader.cache_now(&mut gfx, unnamed).is_none());
        assert_eq!(recorder.count(EventKind::ShaderGraphicError), 1);
        assert_eq!(gfx.live_programs(), 1);
    }

    #[test]
    fn test_oversized_blank_texture_fails_without_allocating() {
        let (loader, mut gfx, recorder) = setup();
        let huge = TextureResource::render_target("huge", 2).with_size(65_536, 65_536);
        assert!(loader.cache_now(&mut gfx, huge).is_none());
        assert_eq!(recorder.count(EventKind::TextureGraphicError), 1);
        assert_eq!(gfx.live_textures(), 0);
        assert_eq!(gfx.live_depth_buffers(), 0);
    }

    #[test]
    fn test_set_option_rejects_negative_anisotropy() {
        let (loader, _, _) = setup();
        assert!(loader.set_texture_anisotropy(-1.0).is_err());
        assert!(!loader.reload_requested());
        assert!(loader.set_texture_anisotropy(2.0).unwrap());
        assert_eq!(loader.options().texture_anisotropy, 2.0);
    }

    #[test]
    fn test_apply_options_schedules_single_reload() {
        let (loader, mut gfx, _) = setup();
        let options = LoaderOptions::default().with_compression(true).with_best_filtering(true);
        assert!(loader.apply_options(&options).unwrap());
        assert!(!loader.apply_options(&options).unwrap());
        loader.per_frame_cycle(&mut gfx);
        assert_eq!(loader.stats().counters.reloads, 1);
        assert_eq!(loader.options(), options);
    }

    #[test]
    fn test_unwanted_bookkeeping() {
        let (loader, mut gfx, _) = setup();
        let floor: ResourceHandle = TextureResource::file("floor", "floor.png").into();
        loader.cache_now(&mut gfx, wall()).unwrap();
        loader.cache_now(&mut gfx, floor.clone()).unwrap();

        loader.flag_all_unwanted();
        loader.enqueue([wall()]);
        assert_eq!(loader.unwanted_handles(), vec![floor]);
        // Flagging never evicts.
        assert_eq!(loader.cached_handles().len(), 2);
    }

    #[test]
    fn test_render_target_pass_guard() {
        let (loader, mut gfx, _) = setup();
        let rt = Arc::new(TextureResource::render_target("rt", 0).with_size(128, 64));

        {
            let pass = loader.render_target_pass(&mut gfx, &rt).unwrap();
            assert!(pass.bound_framebuffer().is_some());
            assert_eq!(pass.viewport(), Size::new(128, 64));
        }
        assert_eq!(gfx.bound_framebuffer(), None);
        assert_eq!(gfx.viewport(), Size::new(800, 600));
        assert!(loader.contains(&ResourceHandle::Texture(rt)));
    }

    #[test]
    fn test_start_render_target_misuse() {
        let (loader, mut gfx, _) = setup();
        let plain = Arc::new(TextureResource::blank("plain", Size::new(4, 4)));
        assert!(!loader.start_render_target(&mut gfx, &plain));
        assert!(!loader.contains(&ResourceHandle::Texture(plain)));

        let rt = Arc::new(TextureResource::render_target("rt", 0));
        assert!(loader.start_render_target(&mut gfx, &rt));
        assert!(!loader.start_render_target(&mut gfx, &rt));
        assert!(loader.end_render_target(&mut gfx));
        assert!(!loader.end_render_target(&mut gfx));
        assert_eq!(gfx.attribute_depth(), 0);
    }

    #[test]
    fn test_destroy_all_releases_gpu_objects() {
        let (loader, mut gfx, _) = setup();
        loader.cache_now(&mut gfx, wall()).unwrap();
        loader.cache_now(&mut gfx, TextureResource::render_target("rt", 1)).unwrap();
        loader.cache_now(&mut gfx, basic_shader());
        loader.enqueue([TextureResource::file("floor", "floor.png")]);

        assert_eq!(loader.destroy_all(&mut gfx), 3);
        assert_eq!(gfx.live_textures(), 0);
        assert_eq!(gfx.live_programs(), 0);
        assert_eq!(gfx.live_framebuffers(), 0);
        assert_eq!(gfx.live_depth_buffers(), 0);
        assert_eq!(loader.stats().pending, 0);
        assert_eq!(gfx.counters().invalid_deletes, 0);
    }

    #[test]
    fn test_other_errors_reach_listeners() {
        let (loader, _, recorder) = setup();
        loader.report_graphic_error(GraphicsError::IncompleteFramebuffer("lost context".into()));
        loader.report_io_error(DecodeError::MissingLocator("atlas".into()));
        assert_eq!(recorder.kinds(), vec![EventKind::OtherGraphicError, EventKind::OtherIoError]);
    }
}
