//! Video and audio track wrappers
//!
//! A track owns its native handle exclusively. Send tracks additionally own
//! a [`TrackSource`] and, when fed from a caller buffer, a destination buffer
//! the encoder reads. Receive tracks own a [`FrameSink`] holding the decoded
//! buffer.
//!
//! Tracks are always handled through `Arc` so native callbacks can reach them
//! through the [`HandleRegistry`](trackbridge_core::HandleRegistry). Dropping
//! the last `Arc` does not dispose anything; call
//! [`dispose`](MediaStreamTrack::dispose) explicitly.

use crate::context::MediaContext;
use crate::engine::{CodecInitializationResult, EncoderParameters, TrackKind};
use crate::error::{MediaError, MediaResult};
use crate::frame_sink::FrameSink;
use crate::graphics::{release_on_main, BlitTransform, GpuBuffer, PixelFormat};
use crate::source::TrackSource;
use crate::validation::validate;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use trackbridge_core::NativeHandle;
use uuid::Uuid;

/// Operations shared by every track wrapper
pub trait MediaStreamTrack: Send + Sync {
    /// Native track handle
    fn handle(&self) -> NativeHandle;

    /// Track label
    fn id(&self) -> &str;

    /// Media kind
    fn kind(&self) -> TrackKind;

    /// Whether the track has been disposed
    fn is_disposed(&self) -> bool;

    /// Release every native and graphics resource of the track
    ///
    /// Idempotent and never fails.
    fn dispose(&self);
}

/// Direction of a track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TrackDirection {
    /// Locally originated, encoded and sent
    Send,
    /// Received and decoded
    Receive,
}

/// Lifecycle of a video track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TrackLifecycle {
    /// Receive track awaiting `initialize_receiver`
    Uninitialized,
    /// Encoder configured
    SendConfigured,
    /// Frame sink attached
    ReceiveConfigured,
    /// Disposed
    Disposed,
}

/// Notification that a receive track's buffer was replaced
///
/// Any buffer reference taken from an earlier event may be released once a
/// new event fires.
#[derive(Debug, Clone)]
pub struct FrameEvent {
    /// Track whose buffer changed
    pub track: NativeHandle,
    /// New buffer
    pub buffer: GpuBuffer,
    /// Buffer width
    pub width: u32,
    /// Buffer height
    pub height: u32,
}

enum SendInput {
    /// Caller buffer blitted into an owned destination every frame
    Blit {
        source: GpuBuffer,
        destination: GpuBuffer,
    },
    /// Caller texture read directly by the encoder
    Texture,
}

struct VideoState {
    lifecycle: TrackLifecycle,
    registered: bool,
    source: Option<Arc<TrackSource>>,
    input: Option<SendInput>,
    sink: Option<Arc<FrameSink>>,
}

/// Video track wrapper
pub struct VideoTrack {
    handle: NativeHandle,
    id: String,
    direction: TrackDirection,
    need_flip: bool,
    ctx: MediaContext,
    events: broadcast::Sender<FrameEvent>,
    state: Mutex<VideoState>,
}

fn new_label() -> String {
    Uuid::new_v4().to_string()
}

impl VideoTrack {
    fn build(
        ctx: &MediaContext,
        handle: NativeHandle,
        id: String,
        direction: TrackDirection,
        need_flip: bool,
        state: VideoState,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(ctx.event_capacity().max(1));
        Arc::new(Self {
            handle,
            id,
            direction,
            need_flip,
            ctx: ctx.clone(),
            events,
            state: Mutex::new(state),
        })
    }

    /// Register a freshly built track; on conflict, tear it down without
    /// touching the entry that is already there.
    fn register(self: &Arc<Self>) -> MediaResult<()> {
        match self.ctx.registry().register(self.handle, self) {
            Ok(()) => self.mark_registered(),
            Err(e) => {
                self.dispose();
                Err(e.into())
            }
        }
    }

    /// Record a successful registration, undoing it if a disposal already
    /// ran and skipped the unregister
    fn mark_registered(&self) -> MediaResult<()> {
        let mut state = self.state.lock();
        if state.lifecycle == TrackLifecycle::Disposed {
            drop(state);
            self.ctx.registry().unregister(self.handle);
            return Err(MediaError::invalid_state("track was disposed during setup"));
        }
        state.registered = true;
        Ok(())
    }

    /// Store a freshly attached sink unless the track was disposed or got a
    /// sink of its own in the meantime
    fn install_sink(&self, sink: Arc<FrameSink>) -> MediaResult<()> {
        let mut state = self.state.lock();
        let rejected = if state.lifecycle == TrackLifecycle::Disposed {
            Some("track was disposed while its frame sink was attached")
        } else if state.sink.is_some() {
            Some("receiver already initialized, use buffer()")
        } else {
            None
        };

        if let Some(reason) = rejected {
            drop(state);
            sink.dispose();
            return Err(MediaError::invalid_state(reason));
        }
        state.sink = Some(sink);
        state.lifecycle = TrackLifecycle::ReceiveConfigured;
        Ok(())
    }

    /// Create a send track fed from `source`
    ///
    /// Allocates a destination buffer of the same size in the device format,
    /// creates the native source and track, and initializes the encoder.
    /// Every frame, [`push_frame`](Self::push_frame) copies `source` into the
    /// destination, flipping rows when `need_flip` is set.
    ///
    /// Validation runs before any native resource is created. On failure,
    /// everything created so far is released and nothing stays registered.
    pub fn from_buffer(ctx: &MediaContext, source: GpuBuffer, need_flip: bool) -> MediaResult<Arc<Self>> {
        let (width, height) = source.dimensions();
        validate(&ctx.policy().request(width, height, source.format()))?;

        let graphics = ctx.graphics();
        let destination = graphics.create_buffer(width, height, graphics.supported_format())?;

        let track_source = match TrackSource::create(ctx, TrackKind::Video) {
            Ok(track_source) => track_source,
            Err(e) => {
                graphics.destroy(destination);
                return Err(e);
            }
        };

        let id = new_label();
        let handle = match ctx
            .engine()
            .create_track(TrackKind::Video, &id, track_source.handle())
        {
            Ok(handle) => handle,
            Err(e) => {
                track_source.dispose();
                graphics.destroy(destination);
                return Err(e.into());
            }
        };

        let params = EncoderParameters {
            width,
            height,
            format: destination.format(),
            buffer: destination.native_handle(),
        };
        let track = Self::build(
            ctx,
            handle,
            id,
            TrackDirection::Send,
            need_flip,
            VideoState {
                lifecycle: TrackLifecycle::Uninitialized,
                registered: false,
                source: Some(track_source),
                input: Some(SendInput::Blit {
                    source,
                    destination,
                }),
                sink: None,
            },
        );
        track.register()?;
        track.initialize_encoder(params)?;

        info!(
            "📹 Send track {} created from {}x{} buffer (flip: {})",
            handle, width, height, need_flip
        );
        Ok(track)
    }

    /// Create a send track whose encoder reads `texture` directly
    ///
    /// The caller keeps ownership of the texture and must keep it alive
    /// until the track is disposed.
    pub fn from_texture_handle(
        ctx: &MediaContext,
        texture: NativeHandle,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> MediaResult<Arc<Self>> {
        validate(&ctx.policy().request(width, height, format))?;
        if texture.is_null() {
            return Err(MediaError::invalid_state("texture handle is null"));
        }

        let track_source = TrackSource::create(ctx, TrackKind::Video)?;
        let id = new_label();
        let handle = match ctx
            .engine()
            .create_track(TrackKind::Video, &id, track_source.handle())
        {
            Ok(handle) => handle,
            Err(e) => {
                track_source.dispose();
                return Err(e.into());
            }
        };

        let track = Self::build(
            ctx,
            handle,
            id,
            TrackDirection::Send,
            false,
            VideoState {
                lifecycle: TrackLifecycle::Uninitialized,
                registered: false,
                source: Some(track_source),
                input: Some(SendInput::Texture),
                sink: None,
            },
        );
        track.register()?;
        track.initialize_encoder(EncoderParameters {
            width,
            height,
            format,
            buffer: texture,
        })?;

        info!("📹 Send track {} created from texture {}", handle, texture);
        Ok(track)
    }

    fn initialize_encoder(&self, params: EncoderParameters) -> MediaResult<()> {
        let engine = self.ctx.engine();
        let result = engine
            .set_encoder_parameters(self.handle, params)
            .and_then(|()| engine.initialize_encoder(self.handle));

        if let Err(e) = result {
            warn!("Encoder setup for track {} failed: {}", self.handle, e);
            self.dispose();
            return Err(e.into());
        }

        let mut state = self.state.lock();
        if state.lifecycle == TrackLifecycle::Disposed {
            return Err(MediaError::invalid_state(
                "track was disposed during encoder setup",
            ));
        }
        state.lifecycle = TrackLifecycle::SendConfigured;
        Ok(())
    }

    /// Create a receive track with no decoder yet
    ///
    /// Call [`initialize_receiver`](Self::initialize_receiver) before frames
    /// can be pulled.
    pub fn new_receiver(ctx: &MediaContext, need_flip: bool) -> MediaResult<Arc<Self>> {
        let id = new_label();
        let handle = ctx
            .engine()
            .create_track(TrackKind::Video, &id, NativeHandle::NULL)?;
        let track = Self::build(
            ctx,
            handle,
            id,
            TrackDirection::Receive,
            need_flip,
            VideoState {
                lifecycle: TrackLifecycle::Uninitialized,
                registered: false,
                source: None,
                input: None,
                sink: None,
            },
        );
        track.register()?;
        debug!("Receive track {} created", handle);
        Ok(track)
    }

    /// Attach a frame sink with an initial `width`x`height` buffer
    ///
    /// Fails with [`MediaError::InvalidState`] if the track is disposed or
    /// the decoder is already initialized.
    pub fn initialize_receiver(self: &Arc<Self>, width: u32, height: u32) -> MediaResult<GpuBuffer> {
        {
            let state = self.state.lock();
            if state.lifecycle == TrackLifecycle::Disposed {
                return Err(MediaError::invalid_state("track is disposed"));
            }
            if self.direction != TrackDirection::Receive {
                return Err(MediaError::invalid_state("track is not a receive track"));
            }
            if state.sink.is_some() {
                return Err(MediaError::invalid_state(
                    "receiver already initialized, use buffer()",
                ));
            }
        }

        let sink = FrameSink::attach(&self.ctx, self.handle, Arc::downgrade(self), self.need_flip)?;
        if let Err(e) = sink.on_frame_dimensions(width, height) {
            sink.dispose();
            return Err(e);
        }
        let buffer = match sink.buffer() {
            Some(buffer) => buffer,
            None => {
                sink.dispose();
                return Err(MediaError::invalid_state("frame sink has no buffer"));
            }
        };
        self.install_sink(sink)?;

        info!("Receiver {} initialized at {}x{}", self.handle, width, height);
        Ok(buffer)
    }

    /// Wrap a track that arrived from negotiation with a remote peer
    ///
    /// Takes ownership of `handle` and attaches a frame sink straight away;
    /// its buffer is allocated when the first frame size is reported.
    pub fn wrap_remote(ctx: &MediaContext, handle: NativeHandle, need_flip: bool) -> MediaResult<Arc<Self>> {
        let track = Self::build(
            ctx,
            handle,
            new_label(),
            TrackDirection::Receive,
            need_flip,
            VideoState {
                lifecycle: TrackLifecycle::Uninitialized,
                registered: false,
                source: None,
                input: None,
                sink: None,
            },
        );
        if let Err(e) = ctx.registry().register(handle, &track) {
            // The handle belongs to whoever registered it first
            track.state.lock().lifecycle = TrackLifecycle::Disposed;
            return Err(e.into());
        }
        track.mark_registered()?;

        let sink = match FrameSink::attach(ctx, handle, Arc::downgrade(&track), need_flip) {
            Ok(sink) => sink,
            Err(e) => {
                track.dispose();
                return Err(e);
            }
        };
        if let Err(e) = track.install_sink(sink) {
            track.dispose();
            return Err(e);
        }

        info!("📺 Remote video track {} wrapped", handle);
        Ok(track)
    }

    /// Direction of the track
    pub fn direction(&self) -> TrackDirection {
        self.direction
    }

    /// Whether frames are flipped between the host and transport row order
    pub fn need_flip(&self) -> bool {
        self.need_flip
    }

    /// Current lifecycle state
    pub fn lifecycle(&self) -> TrackLifecycle {
        self.state.lock().lifecycle
    }

    /// Whether the encoder reports successful initialization
    pub fn is_encoder_initialized(&self) -> bool {
        !self.is_disposed()
            && self.direction == TrackDirection::Send
            && self.ctx.engine().initialization_result(self.handle) == CodecInitializationResult::Success
    }

    /// Whether a frame sink is attached
    pub fn is_decoder_initialized(&self) -> bool {
        self.state.lock().sink.is_some()
    }

    /// Attached frame sink, if any
    pub fn frame_sink(&self) -> Option<Arc<FrameSink>> {
        self.state.lock().sink.clone()
    }

    /// Buffer consumers should display
    ///
    /// For receive tracks, the sink's current decoded buffer. For send
    /// tracks fed from a buffer, the destination the encoder reads.
    pub fn buffer(&self) -> Option<GpuBuffer> {
        let state = self.state.lock();
        if let Some(sink) = &state.sink {
            return sink.buffer();
        }
        match &state.input {
            Some(SendInput::Blit { destination, .. }) => Some(destination.clone()),
            _ => None,
        }
    }

    /// Subscribe to buffer replacement events
    pub fn subscribe(&self) -> broadcast::Receiver<FrameEvent> {
        self.events.subscribe()
    }

    pub(crate) fn notify_buffer_replaced(&self, buffer: GpuBuffer, width: u32, height: u32) {
        let event = FrameEvent {
            track: self.handle,
            buffer,
            width,
            height,
        };
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    /// Copy the source buffer into the destination and encode it
    ///
    /// No-op for tracks without a source. Must run on the main thread.
    /// Errors are returned to the caller; the track stays usable.
    pub fn push_frame(&self) -> MediaResult<()> {
        let blit = {
            let state = self.state.lock();
            if state.lifecycle == TrackLifecycle::Disposed {
                return Err(MediaError::invalid_state("track is disposed"));
            }
            if state.source.is_none() {
                return Ok(());
            }
            match &state.input {
                Some(SendInput::Blit {
                    source,
                    destination,
                }) => Some((source.clone(), destination.clone())),
                _ => None,
            }
        };

        if let Some((source, destination)) = blit {
            self.ctx
                .graphics()
                .blit(&source, &destination, BlitTransform::for_flip(self.need_flip))?;
        }
        self.ctx.engine().encode(self.handle)?;
        Ok(())
    }

    /// Upload the latest decoded frame into the receive buffer
    ///
    /// No-op until a frame sink is attached. Must run on the main thread.
    pub fn pull_frame(&self) -> MediaResult<()> {
        let sink = {
            let state = self.state.lock();
            if state.lifecycle == TrackLifecycle::Disposed {
                return Err(MediaError::invalid_state("track is disposed"));
            }
            state.sink.clone()
        };

        match sink {
            Some(sink) => sink.update(),
            None => Ok(()),
        }
    }
}

impl MediaStreamTrack for VideoTrack {
    fn handle(&self) -> NativeHandle {
        self.handle
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> TrackKind {
        TrackKind::Video
    }

    fn is_disposed(&self) -> bool {
        self.state.lock().lifecycle == TrackLifecycle::Disposed
    }

    fn dispose(&self) {
        let (source, input, sink, registered) = {
            let mut state = self.state.lock();
            if state.lifecycle == TrackLifecycle::Disposed {
                return;
            }
            state.lifecycle = TrackLifecycle::Disposed;
            (
                state.source.take(),
                state.input.take(),
                state.sink.take(),
                state.registered,
            )
        };

        let engine = self.ctx.engine();
        let engine_alive = !engine.is_torn_down();

        if source.is_some()
            && engine_alive
            && engine.initialization_result(self.handle) == CodecInitializationResult::Success
        {
            if let Err(e) = engine.finalize_encoder(self.handle) {
                warn!("Finalizing encoder of {} failed: {}", self.handle, e);
            }
        }

        if let Some(SendInput::Blit { destination, .. }) = input {
            release_on_main(
                self.ctx.dispatcher(),
                self.ctx.graphics(),
                self.handle,
                destination,
            );
        }

        if let Some(sink) = sink {
            sink.dispose();
        }
        if let Some(source) = source {
            source.dispose();
        }

        if engine_alive {
            engine.release(self.handle);
        }
        if registered {
            self.ctx.registry().unregister(self.handle);
        }
        info!("Video track {} disposed", self.handle);
    }
}

impl Drop for VideoTrack {
    fn drop(&mut self) {
        if self.state.get_mut().lifecycle != TrackLifecycle::Disposed {
            warn!(
                "VideoTrack {} dropped without dispose, native resources leaked",
                self.handle
            );
        }
    }
}

impl std::fmt::Debug for VideoTrack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoTrack")
            .field("handle", &self.handle)
            .field("id", &self.id)
            .field("direction", &self.direction)
            .field("need_flip", &self.need_flip)
            .field("lifecycle", &self.lifecycle())
            .finish()
    }
}

struct AudioState {
    disposed: bool,
    registered: bool,
    source: Option<Arc<TrackSource>>,
}

/// Audio track wrapper
///
/// Audio frames never cross into the host's graphics context, so an audio
/// track is only a handle, an optional source and the disposal contract.
pub struct AudioTrack {
    handle: NativeHandle,
    id: String,
    direction: TrackDirection,
    ctx: MediaContext,
    state: Mutex<AudioState>,
}

impl AudioTrack {
    /// Create a locally originated audio track with its own source
    pub fn local(ctx: &MediaContext) -> MediaResult<Arc<Self>> {
        let source = TrackSource::create(ctx, TrackKind::Audio)?;
        let id = new_label();
        let handle = match ctx
            .engine()
            .create_track(TrackKind::Audio, &id, source.handle())
        {
            Ok(handle) => handle,
            Err(e) => {
                source.dispose();
                return Err(e.into());
            }
        };

        let track = Self::build(ctx, handle, id, TrackDirection::Send, Some(source));
        track.register()?;
        info!("🎤 Audio track {} created", handle);
        Ok(track)
    }

    /// Wrap a remote audio track, taking ownership of `handle`
    pub fn wrap_remote(ctx: &MediaContext, handle: NativeHandle) -> MediaResult<Arc<Self>> {
        let track = Self::build(ctx, handle, new_label(), TrackDirection::Receive, None);
        if let Err(e) = ctx.registry().register(handle, &track) {
            track.state.lock().disposed = true;
            return Err(e.into());
        }
        track.mark_registered()?;
        info!("🔊 Remote audio track {} wrapped", handle);
        Ok(track)
    }

    fn build(
        ctx: &MediaContext,
        handle: NativeHandle,
        id: String,
        direction: TrackDirection,
        source: Option<Arc<TrackSource>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            handle,
            id,
            direction,
            ctx: ctx.clone(),
            state: Mutex::new(AudioState {
                disposed: false,
                registered: false,
                source,
            }),
        })
    }

    fn register(self: &Arc<Self>) -> MediaResult<()> {
        match self.ctx.registry().register(self.handle, self) {
            Ok(()) => self.mark_registered(),
            Err(e) => {
                self.dispose();
                Err(e.into())
            }
        }
    }

    fn mark_registered(&self) -> MediaResult<()> {
        let mut state = self.state.lock();
        if state.disposed {
            drop(state);
            self.ctx.registry().unregister(self.handle);
            return Err(MediaError::invalid_state("track was disposed during setup"));
        }
        state.registered = true;
        Ok(())
    }

    /// Direction of the track
    pub fn direction(&self) -> TrackDirection {
        self.direction
    }

    /// Source feeding the track, for local tracks
    pub fn source(&self) -> Option<Arc<TrackSource>> {
        self.state.lock().source.clone()
    }
}

impl MediaStreamTrack for AudioTrack {
    fn handle(&self) -> NativeHandle {
        self.handle
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> TrackKind {
        TrackKind::Audio
    }

    fn is_disposed(&self) -> bool {
        self.state.lock().disposed
    }

    fn dispose(&self) {
        let (source, registered) = {
            let mut state = self.state.lock();
            if state.disposed {
                return;
            }
            state.disposed = true;
            (state.source.take(), state.registered)
        };

        if let Some(source) = source {
            source.dispose();
        }
        if !self.ctx.engine().is_torn_down() {
            self.ctx.engine().release(self.handle);
        }
        if registered {
            self.ctx.registry().unregister(self.handle);
        }
        info!("Audio track {} disposed", self.handle);
    }
}

impl Drop for AudioTrack {
    fn drop(&mut self) {
        if !self.state.get_mut().disposed {
            warn!(
                "AudioTrack {} dropped without dispose, native resources leaked",
                self.handle
            );
        }
    }
}

impl std::fmt::Debug for AudioTrack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioTrack")
            .field("handle", &self.handle)
            .field("id", &self.id)
            .field("direction", &self.direction)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
