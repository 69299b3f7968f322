//! Encoder-side native sources

use crate::context::MediaContext;
use crate::engine::TrackKind;
use crate::error::MediaResult;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};
use trackbridge_core::NativeHandle;

/// Wrapper around a reference-counted native source
///
/// The engine keeps its own reference for every track fed by the source, so
/// disposing the wrapper only drops the managed side's reference.
pub struct TrackSource {
    handle: NativeHandle,
    kind: TrackKind,
    ctx: MediaContext,
    disposed: AtomicBool,
}

impl TrackSource {
    /// Create a native source and register it
    pub fn create(ctx: &MediaContext, kind: TrackKind) -> MediaResult<Arc<Self>> {
        let handle = ctx.engine().create_source(kind)?;
        let source = Arc::new(Self {
            handle,
            kind,
            ctx: ctx.clone(),
            disposed: AtomicBool::new(false),
        });

        if let Err(e) = ctx.registry().register(handle, &source) {
            ctx.engine().release(handle);
            source.disposed.store(true, Ordering::Release);
            return Err(e.into());
        }

        debug!("Created {:?} source {}", kind, handle);
        Ok(source)
    }

    /// Native source handle
    pub fn handle(&self) -> NativeHandle {
        self.handle
    }

    /// Media kind
    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    /// Whether `dispose` has run
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Drop the managed reference to the native source
    ///
    /// Once the engine itself is torn down the source is left untouched,
    /// neither released nor unregistered.
    /// Idempotent.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) || self.handle.is_null() {
            return;
        }

        if self.ctx.engine().is_torn_down() {
            debug!("Engine torn down, leaving source {} as is", self.handle);
            return;
        }
        self.ctx.engine().release(self.handle);
        self.ctx.registry().unregister(self.handle);
        debug!("Source {} disposed", self.handle);
    }
}

impl Drop for TrackSource {
    fn drop(&mut self) {
        if !self.is_disposed() {
            warn!(
                "TrackSource {} dropped without dispose, native reference leaked",
                self.handle
            );
        }
    }
}

impl std::fmt::Debug for TrackSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackSource")
            .field("handle", &self.handle)
            .field("kind", &self.kind)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
