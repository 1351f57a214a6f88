//! Lifecycle and error notifications.
//!
//! Subscribers implement [`LoaderListener`]; every method has an empty
//! default so a listener only overrides what it cares about. The
//! [`ListenerBus`] delivers events in subscription order and keeps going
//! when a subscriber panics.

use crate::cached::{CachedShader, CachedTexture};
use crate::error::{DecodeError, GraphicsError};
use crate::handle::{ShaderResource, TextureResource};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, warn};

/// Receives loader events. Called on whichever thread produced the event,
/// after the loader has released its lock.
#[allow(unused_variables)]
pub trait LoaderListener: Send + Sync {
    fn texture_added(&self, texture: &TextureResource) {}
    fn texture_cached(&self, texture: &TextureResource, cached: &CachedTexture) {}
    fn texture_touched(&self, texture: &TextureResource) {}
    fn texture_destroyed(&self, texture: &TextureResource) {}
    fn texture_load_error(&self, texture: &TextureResource, error: &DecodeError) {}
    fn texture_graphic_error(&self, texture: &TextureResource, error: &GraphicsError) {}

    fn shader_added(&self, shader: &ShaderResource) {}
    fn shader_cached(&self, shader: &ShaderResource, cached: &CachedShader) {}
    fn shader_touched(&self, shader: &ShaderResource) {}
    fn shader_destroyed(&self, shader: &ShaderResource) {}
    fn shader_load_error(&self, shader: &ShaderResource, error: &DecodeError) {}
    fn shader_graphic_error(&self, shader: &ShaderResource, error: &GraphicsError) {}

    /// A graphics failure not tied to a single resource.
    fn other_graphic_error(&self, error: &GraphicsError) {}
    /// An I/O failure not tied to a single resource.
    fn other_io_error(&self, error: &DecodeError) {}
}

/// An event waiting to be delivered.
#[derive(Debug)]
pub enum LoaderEvent {
    TextureAdded(Arc<TextureResource>),
    TextureCached(Arc<TextureResource>, CachedTexture),
    TextureTouched(Arc<TextureResource>),
    TextureDestroyed(Arc<TextureResource>),
    TextureLoadError(Arc<TextureResource>, DecodeError),
    TextureGraphicError(Arc<TextureResource>, GraphicsError),
    ShaderAdded(Arc<ShaderResource>),
    ShaderCached(Arc<ShaderResource>, CachedShader),
    ShaderTouched(Arc<ShaderResource>),
    ShaderDestroyed(Arc<ShaderResource>),
    ShaderLoadError(Arc<ShaderResource>, DecodeError),
    ShaderGraphicError(Arc<ShaderResource>, GraphicsError),
    OtherGraphicError(GraphicsError),
    OtherIoError(DecodeError),
}

impl LoaderEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            LoaderEvent::TextureAdded(_) => EventKind::TextureAdded,
            LoaderEvent::TextureCached(..) => EventKind::TextureCached,
            LoaderEvent::TextureTouched(_) => EventKind::TextureTouched,
            LoaderEvent::TextureDestroyed(_) => EventKind::TextureDestroyed,
            LoaderEvent::TextureLoadError(..) => EventKind::TextureLoadError,
            LoaderEvent::TextureGraphicError(..) => EventKind::TextureGraphicError,
            LoaderEvent::ShaderAdded(_) => EventKind::ShaderAdded,
            LoaderEvent::ShaderCached(..) => EventKind::ShaderCached,
            LoaderEvent::ShaderTouched(_) => EventKind::ShaderTouched,
            LoaderEvent::ShaderDestroyed(_) => EventKind::ShaderDestroyed,
            LoaderEvent::ShaderLoadError(..) => EventKind::ShaderLoadError,
            LoaderEvent::ShaderGraphicError(..) => EventKind::ShaderGraphicError,
            LoaderEvent::OtherGraphicError(_) => EventKind::OtherGraphicError,
            LoaderEvent::OtherIoError(_) => EventKind::OtherIoError,
        }
    }

    /// Name of the resource the event concerns, if any.
    pub fn resource_name(&self) -> Option<&str> {
        match self {
            LoaderEvent::TextureAdded(t)
            | LoaderEvent::TextureCached(t, _)
            | LoaderEvent::TextureTouched(t)
            | LoaderEvent::TextureDestroyed(t)
            | LoaderEvent::TextureLoadError(t, _)
            | LoaderEvent::TextureGraphicError(t, _) => Some(&t.name),
            LoaderEvent::ShaderAdded(s)
            | LoaderEvent::ShaderCached(s, _)
            | LoaderEvent::ShaderTouched(s)
            | LoaderEvent::ShaderDestroyed(s)
            | LoaderEvent::ShaderLoadError(s, _)
            | LoaderEvent::ShaderGraphicError(s, _) => Some(&s.name),
            LoaderEvent::OtherGraphicError(_) | LoaderEvent::OtherIoError(_) => None,
        }
    }

    /// Error text for error events.
    pub fn error_message(&self) -> Option<String> {
        match self {
            LoaderEvent::TextureLoadError(_, e)
            | LoaderEvent::ShaderLoadError(_, e)
            | LoaderEvent::OtherIoError(e) => Some(e.to_string()),
            LoaderEvent::TextureGraphicError(_, e)
            | LoaderEvent::ShaderGraphicError(_, e)
            | LoaderEvent::OtherGraphicError(e) => Some(e.to_string()),
            _ => None,
        }
    }

    fn dispatch(&self, listener: &dyn LoaderListener) {
        match self {
            LoaderEvent::TextureAdded(t) => listener.texture_added(t),
            LoaderEvent::TextureCached(t, c) => listener.texture_cached(t, c),
            LoaderEvent::TextureTouched(t) => listener.texture_touched(t),
            LoaderEvent::TextureDestroyed(t) => listener.texture_destroyed(t),
            LoaderEvent::TextureLoadError(t, e) => listener.texture_load_error(t, e),
            LoaderEvent::TextureGraphicError(t, e) => listener.texture_graphic_error(t, e),
            LoaderEvent::ShaderAdded(s) => listener.shader_added(s),
            LoaderEvent::ShaderCached(s, c) => listener.shader_cached(s, c),
            LoaderEvent::ShaderTouched(s) => listener.shader_touched(s),
            LoaderEvent::ShaderDestroyed(s) => listener.shader_destroyed(s),
            LoaderEvent::ShaderLoadError(s, e) => listener.shader_load_error(s, e),
            LoaderEvent::ShaderGraphicError(s, e) => listener.shader_graphic_error(s, e),
            LoaderEvent::OtherGraphicError(e) => listener.other_graphic_error(e),
            LoaderEvent::OtherIoError(e) => listener.other_io_error(e),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    TextureAdded,
    TextureCached,
    TextureTouched,
    TextureDestroyed,
    TextureLoadError,
    TextureGraphicError,
    ShaderAdded,
    ShaderCached,
    ShaderTouched,
    ShaderDestroyed,
    ShaderLoadError,
    ShaderGraphicError,
    OtherGraphicError,
    OtherIoError,
}

/// Ordered set of subscribers.
#[derive(Default)]
pub struct ListenerBus {
    listeners: RwLock<Vec<Arc<dyn LoaderListener>>>,
}

impl ListenerBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, listener: Arc<dyn LoaderListener>) {
        self.listeners.write().push(listener);
    }

    /// Removes a subscriber by identity. Returns `false` if it was not subscribed.
    pub fn unsubscribe(&self, listener: &Arc<dyn LoaderListener>) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|existing| !Arc::ptr_eq(existing, listener));
        listeners.len() != before
    }

    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.read().is_empty()
    }

    /// Delivers events in order to every subscriber.
    ///
    /// The subscriber list is snapshotted first, so listeners may subscribe
    /// or unsubscribe from inside a callback.
    pub fn publish(&self, events: &[LoaderEvent]) {
        if events.is_empty() {
            return;
        }
        let listeners = self.listeners.read().clone();
        for event in events {
            for (index, listener) in listeners.iter().enumerate() {
                let delivered = catch_unwind(AssertUnwindSafe(|| event.dispatch(listener.as_ref())));
                if delivered.is_err() {
                    warn!(listener = index, event = ?event.kind(), "listener panicked; continuing delivery");
                }
            }
        }
    }
}

/// Mirrors every event into `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingListener;

impl LoaderListener for TracingListener {
    fn texture_added(&self, texture: &TextureResource) {
        debug!(name = %texture.name, "texture added");
    }

    fn texture_cached(&self, texture: &TextureResource, cached: &CachedTexture) {
        debug!(
            name = %texture.name,
            id = %cached.id,
            format = ?cached.descriptor.format,
            size = %cached.descriptor.size,
            "texture cached"
        );
    }

    fn texture_touched(&self, texture: &TextureResource) {
        debug!(name = %texture.name, "texture touched");
    }

    fn texture_destroyed(&self, texture: &TextureResource) {
        debug!(name = %texture.name, "texture destroyed");
    }

    fn texture_load_error(&self, texture: &TextureResource, error: &DecodeError) {
        warn!(name = %texture.name, %error, "texture load error");
    }

    fn texture_graphic_error(&self, texture: &TextureResource, error: &GraphicsError) {
        warn!(name = %texture.name, %error, "texture graphic error");
    }

    fn shader_added(&self, shader: &ShaderResource) {
        debug!(name = %shader.name, "shader added");
    }

    fn shader_cached(&self, shader: &ShaderResource, cached: &CachedShader) {
        debug!(name = %shader.name, id = %cached.id, "shader cached");
    }

    fn shader_touched(&self, shader: &ShaderResource) {
        debug!(name = %shader.name, "shader touched");
    }

    fn shader_destroyed(&self, shader: &ShaderResource) {
        debug!(name = %shader.name, "shader destroyed");
    }

    fn shader_load_error(&self, shader: &ShaderResource, error: &DecodeError) {
        warn!(name = %shader.name, %error, "shader load error");
    }

    fn shader_graphic_error(&self, shader: &ShaderResource, error: &GraphicsError) {
        warn!(name = %shader.name, %error, "shader graphic error");
    }

    fn other_graphic_error(&self, error: &GraphicsError) {
        warn!(%error, "graphic error");
    }

    fn other_io_error(&self, error: &DecodeError) {
        warn!(%error, "I/O error");
    }
}

/// One entry in an [`EventRecorder`] log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordedEvent {
    pub kind: EventKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Keeps an ordered log of every event it receives.
#[derive(Debug, Default)]
pub struct EventRecorder {
    log: Mutex<Vec<RecordedEvent>>,
}

impl EventRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RecordedEvent> {
        self.log.lock().clone()
    }

    pub fn kinds(&self) -> Vec<EventKind> {
        self.log.lock().iter().map(|event| event.kind).collect()
    }

    pub fn count(&self, kind: EventKind) -> usize {
        self.log.lock().iter().filter(|event| event.kind == kind).count()
    }

    /// Names carried by events of `kind`, in arrival order.
    pub fn names(&self, kind: EventKind) -> Vec<String> {
        self.log
            .lock()
            .iter()
            .filter(|event| event.kind == kind)
            .filter_map(|event| event.name.clone())
            .collect()
    }

    pub fn clear(&self) {
        self.log.lock().clear();
    }

    fn record(&self, kind: EventKind, name: Option<&str>, error: Option<String>) {
        self.log.lock().push(RecordedEvent { kind, name: name.map(str::to_owned), error });
    }
}

impl LoaderListener for EventRecorder {
    fn texture_added(&self, texture: &TextureResource) {
        self.record(EventKind::TextureAdded, Some(&texture.name), None);
    }

    fn texture_cached(&self, texture: &TextureResource, _cached: &CachedTexture) {
        self.record(EventKind::TextureCached, Some(&texture.name), None);
    }

    fn texture_touched(&self, texture: &TextureResource) {
        self.record(EventKind::TextureTouched, Some(&texture.name), None);
    }

    fn texture_destroyed(&self, texture: &TextureResource) {
        self.record(EventKind::TextureDestroyed, Some(&texture.name), None);
    }

    fn texture_load_error(&self, texture: &TextureResource, error: &DecodeError) {
        self.record(EventKind::TextureLoadError, Some(&texture.name), Some(error.to_string()));
    }

    fn texture_graphic_error(&self, texture: &TextureResource, error: &GraphicsError) {
        self.record(EventKind::TextureGraphicError, Some(&texture.name), Some(error.to_string()));
    }

    fn shader_added(&self, shader: &ShaderResource) {
        self.record(EventKind::ShaderAdded, Some(&shader.name), None);
    }

    fn shader_cached(&self, shader: &ShaderResource, _cached: &CachedShader) {
        self.record(EventKind::ShaderCached, Some(&shader.name), None);
    }

    fn shader_touched(&self, shader: &ShaderResource) {
        self.record(EventKind::ShaderTouched, Some(&shader.name), None);
    }

    fn shader_destroyed(&self, shader: &ShaderResource) {
        self.record(EventKind::ShaderDestroyed, Some(&shader.name), None);
    }

    fn shader_load_error(&self, shader: &ShaderResource, error: &DecodeError) {
        self.record(EventKind::ShaderLoadError, Some(&shader.name), Some(error.to_string()));
    }

    fn shader_graphic_error(&self, shader: &ShaderResource, error: &GraphicsError) {
        self.record(EventKind::ShaderGraphicError, Some(&shader.name), Some(error.to_string()));
    }

    fn other_graphic_error(&self, error: &GraphicsError) {
        self.record(EventKind::OtherGraphicError, None, Some(error.to_string()));
    }

    fn other_io_error(&self, error: &DecodeError) {
        self.record(EventKind::OtherIoError, None, Some(error.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::Size;

    struct Panicky;

    impl LoaderListener for Panicky {
        fn texture_added(&self, _texture: &TextureResource) {
            panic!("listener bug");
        }
    }

    fn texture(name: &str) -> Arc<TextureResource> {
        Arc::new(TextureResource::blank(name, Size::new(1, 1)))
    }

    #[test]
    fn test_delivery_in_subscription_order() {
        let bus = ListenerBus::new();
        let first = Arc::new(EventRecorder::new());
        let second = Arc::new(EventRecorder::new());
        bus.subscribe(first.clone());
        bus.subscribe(second.clone());

        bus.publish(&[
            LoaderEvent::TextureAdded(texture("a")),
            LoaderEvent::ShaderAdded(Arc::new(ShaderResource::new("s"))),
        ]);

        assert_eq!(first.kinds(), vec![EventKind::TextureAdded, EventKind::ShaderAdded]);
        assert_eq!(second.kinds(), first.kinds());
    }

    #[test]
    fn test_panicking_listener_does_not_block_others() {
        let bus = ListenerBus::new();
        let recorder = Arc::new(EventRecorder::new());
        bus.subscribe(Arc::new(Panicky));
        bus.subscribe(recorder.clone());

        bus.publish(&[LoaderEvent::TextureAdded(texture("a")), LoaderEvent::TextureAdded(texture("b"))]);

        assert_eq!(recorder.names(EventKind::TextureAdded), vec!["a", "b"]);
    }

    #[test]
    fn test_unsubscribe_by_identity() {
        let bus = ListenerBus::new();
        let recorder = Arc::new(EventRecorder::new());
        let as_listener: Arc<dyn LoaderListener> = recorder.clone();
        bus.subscribe(as_listener.clone());
        assert_eq!(bus.len(), 1);

        assert!(bus.unsubscribe(&as_listener));
        assert!(!bus.unsubscribe(&as_listener));
        bus.publish(&[LoaderEvent::TextureAdded(texture("a"))]);
        assert!(recorder.events().is_empty());
        assert!(bus.is_empty());
    }

    #[test]
    fn test_recorder_keeps_error_text() {
        let recorder = EventRecorder::new();
        let error = GraphicsError::IncompleteFramebuffer("missing attachment".into());
        recorder.other_graphic_error(&error);

        let events = recorder.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::OtherGraphicError);
        assert!(events[0].error.as_deref().unwrap().contains("missing attachment"));
        assert_eq!(events[0].name, None);
    }

    #[test]
    fn test_event_accessors() {
        let event = LoaderEvent::TextureLoadError(
            texture("wall"),
            DecodeError::MissingLocator("wall".into()),
        );
        assert_eq!(event.kind(), EventKind::TextureLoadError);
        assert_eq!(event.resource_name(), Some("wall"));
        assert!(event.error_message().is_some());
        assert!(LoaderEvent::TextureAdded(texture("x")).error_message().is_none());
    }
}
