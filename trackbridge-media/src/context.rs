//! Shared collaborators every track, sink and source is built against

use crate::engine::NativeMediaEngine;
use crate::graphics::GraphicsBackend;
use crate::validation::ValidationPolicy;
use std::sync::Arc;
use trackbridge_core::{DispatcherHandle, HandleRegistry};

/// Default capacity of each track's frame event channel
pub const DEFAULT_EVENT_CAPACITY: usize = 16;

/// Handle to the engine, graphics backend, registry and dispatcher
///
/// Cheap to clone; every wrapper keeps its own copy.
#[derive(Clone)]
pub struct MediaContext {
    engine: Arc<dyn NativeMediaEngine>,
    graphics: Arc<dyn GraphicsBackend>,
    registry: Arc<HandleRegistry>,
    dispatcher: DispatcherHandle,
    policy: ValidationPolicy,
    event_capacity: usize,
}

impl MediaContext {
    /// Create a context
    pub fn new(
        engine: Arc<dyn NativeMediaEngine>,
        graphics: Arc<dyn GraphicsBackend>,
        registry: Arc<HandleRegistry>,
        dispatcher: DispatcherHandle,
        policy: ValidationPolicy,
    ) -> Self {
        Self {
            engine,
            graphics,
            registry,
            dispatcher,
            policy,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }

    /// Set the capacity of frame event channels created from this context
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }

    /// Native media engine
    pub fn engine(&self) -> &Arc<dyn NativeMediaEngine> {
        &self.engine
    }

    /// Graphics backend
    pub fn graphics(&self) -> &Arc<dyn GraphicsBackend> {
        &self.graphics
    }

    /// Handle registry
    pub fn registry(&self) -> &Arc<HandleRegistry> {
        &self.registry
    }

    /// Dispatcher producer handle
    pub fn dispatcher(&self) -> &DispatcherHandle {
        &self.dispatcher
    }

    /// Encoder validation policy
    pub fn policy(&self) -> &ValidationPolicy {
        &self.policy
    }

    /// Frame event channel capacity
    pub fn event_capacity(&self) -> usize {
        self.event_capacity
    }
}

impl std::fmt::Debug for MediaContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaContext")
            .field("backend", &self.graphics.kind())
            .field("registry", &self.registry)
            .field("policy", &self.policy)
            .finish()
    }
}
