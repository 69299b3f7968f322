//! Decode-side frame sinks
//!
//! A [`FrameSink`] wraps a native renderer attached to a receiving track. The
//! engine reports frame sizes from its decode threads; the sink turns those
//! reports into dispatched actions, and on the main thread reallocates its
//! output buffer whenever the size changes.

use crate::context::MediaContext;
use crate::engine::ResizeCallback;
use crate::error::MediaResult;
use crate::graphics::{release_on_main, GpuBuffer};
use crate::track::VideoTrack;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use tracing::{debug, info, warn};
use trackbridge_core::NativeHandle;

#[derive(Default)]
struct SinkState {
    buffer: Option<GpuBuffer>,
    width: u32,
    height: u32,
    attached: bool,
    disposed: bool,
}

/// Renderer-side buffer owner for one receiving video track
pub struct FrameSink {
    renderer: NativeHandle,
    track: NativeHandle,
    owner: Weak<VideoTrack>,
    ctx: MediaContext,
    need_flip: bool,
    state: Mutex<SinkState>,
    allocations: AtomicU64,
}

impl FrameSink {
    /// Create a renderer, register it and attach it to `track`
    pub(crate) fn attach(
        ctx: &MediaContext,
        track: NativeHandle,
        owner: Weak<VideoTrack>,
        need_flip: bool,
    ) -> MediaResult<Arc<Self>> {
        let dispatcher = ctx.dispatcher().clone();
        let registry = Arc::clone(ctx.registry());
        let on_resize: ResizeCallback = Arc::new(move |renderer, width, height| {
            // Engine thread: only enqueue, never touch graphics here
            let posted = dispatcher.post_resolved::<FrameSink, _>(&registry, renderer, move |sink| {
                if let Err(e) = sink.on_frame_dimensions(width, height) {
                    warn!(
                        "Resize of renderer {} to {}x{} failed: {}",
                        sink.renderer, width, height, e
                    );
                }
            });
            if let Err(e) = posted {
                debug!("Resize of renderer {} to {}x{} dropped: {}", renderer, width, height, e);
            }
        });

        let renderer = ctx.engine().create_renderer(need_flip, on_resize)?;
        let sink = Arc::new(Self {
            renderer,
            track,
            owner,
            ctx: ctx.clone(),
            need_flip,
            state: Mutex::new(SinkState::default()),
            allocations: AtomicU64::new(0),
        });

        if let Err(e) = ctx.registry().register(renderer, &sink) {
            ctx.engine().delete_renderer(renderer);
            sink.state.lock().disposed = true;
            return Err(e.into());
        }

        if let Err(e) = ctx.engine().add_or_update_sink(track, renderer) {
            sink.dispose();
            return Err(e.into());
        }
        sink.state.lock().attached = true;

        info!("Frame sink {} attached to track {}", renderer, track);
        Ok(sink)
    }

    /// Native renderer handle
    pub fn renderer_handle(&self) -> NativeHandle {
        self.renderer
    }

    /// Handle of the track this sink is attached to
    pub fn track_handle(&self) -> NativeHandle {
        self.track
    }

    /// Whether uploads flip rows
    pub fn need_flip(&self) -> bool {
        self.need_flip
    }

    /// Current output buffer
    pub fn buffer(&self) -> Option<GpuBuffer> {
        self.state.lock().buffer.clone()
    }

    /// Size of the current output buffer
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        let state = self.state.lock();
        state.buffer.as_ref().map(|_| (state.width, state.height))
    }

    /// Number of buffers allocated over the sink's lifetime
    pub fn allocations(&self) -> u64 {
        self.allocations.load(Ordering::Relaxed)
    }

    /// Whether `dispose` has run
    pub fn is_disposed(&self) -> bool {
        self.state.lock().disposed
    }

    /// Handle a frame size reported by the engine
    ///
    /// Must run on the main thread. Does nothing when the size matches the
    /// current buffer; otherwise releases the old buffer, allocates one of
    /// the new size in the device format and notifies the owning track.
    pub fn on_frame_dimensions(&self, width: u32, height: u32) -> MediaResult<()> {
        let dispatcher = self.ctx.dispatcher();
        if !dispatcher.is_consumer_thread() {
            warn!(
                "Renderer {} resized from {:?}, off the main thread",
                self.renderer,
                thread::current().id()
            );
        }

        {
            let state = self.state.lock();
            if state.disposed {
                return Ok(());
            }
            if state.buffer.is_some() && state.width == width && state.height == height {
                return Ok(());
            }
        }

        // Allocate unlocked; a disposal racing with the allocation wins
        let graphics = self.ctx.graphics();
        let new = graphics.create_buffer(width, height, graphics.supported_format())?;
        let old = {
            let mut state = self.state.lock();
            if state.disposed {
                drop(state);
                release_on_main(dispatcher, graphics, self.renderer, new);
                return Ok(());
            }
            let old = state.buffer.replace(new.clone());
            state.width = width;
            state.height = height;
            old
        };
        self.allocations.fetch_add(1, Ordering::Relaxed);

        if let Some(old) = old {
            release_on_main(dispatcher, graphics, self.renderer, old);
        }
        debug!("Renderer {} buffer resized to {}x{}", self.renderer, width, height);

        if let Some(track) = self.owner.upgrade() {
            track.notify_buffer_replaced(new, width, height);
        }
        Ok(())
    }

    /// Ask the engine to upload the latest decoded frame into the buffer
    ///
    /// No-op until a buffer exists.
    pub fn update(&self) -> MediaResult<()> {
        let texture = {
            let state = self.state.lock();
            if state.disposed {
                return Ok(());
            }
            match &state.buffer {
                Some(buffer) => buffer.native_handle(),
                None => return Ok(()),
            }
        };

        self.ctx
            .engine()
            .update_renderer_texture(self.renderer, texture, self.need_flip)?;
        Ok(())
    }

    /// Detach from the track, release the buffer and the renderer
    ///
    /// Idempotent and never fails; native errors are logged.
    pub fn dispose(&self) {
        let (buffer, attached) = {
            let mut state = self.state.lock();
            if state.disposed {
                return;
            }
            state.disposed = true;
            (state.buffer.take(), state.attached)
        };

        let engine = self.ctx.engine();
        let engine_alive = !engine.is_torn_down();
        if engine_alive && attached && !self.track.is_null() {
            if let Err(e) = engine.remove_sink(self.track, self.renderer) {
                warn!("Removing sink {} from {} failed: {}", self.renderer, self.track, e);
            }
        }

        if let Some(buffer) = buffer {
            release_on_main(
                self.ctx.dispatcher(),
                self.ctx.graphics(),
                self.renderer,
                buffer,
            );
        }

        if engine_alive {
            engine.delete_renderer(self.renderer);
        }
        self.ctx.registry().unregister(self.renderer);
        debug!("Frame sink {} disposed", self.renderer);
    }
}

impl Drop for FrameSink {
    fn drop(&mut self) {
        if !self.state.get_mut().disposed {
            warn!(
                "FrameSink {} dropped without dispose, renderer leaked",
                self.renderer
            );
        }
    }
}

impl std::fmt::Debug for FrameSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameSink")
            .field("renderer", &self.renderer)
            .field("track", &self.track)
            .field("dimensions", &self.dimensions())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
