//! Native media engine interface
//!
//! The engine owns tracks, sources, renderers and codecs on its own threads
//! and is reached only through opaque [`NativeHandle`]s. [`SoftwareEngine`]
//! is an in-process implementation used for headless runs and tests: it keeps
//! the same handle and reference-count discipline as a real engine and can
//! simulate decode-thread callbacks and error codes.

use crate::graphics::PixelFormat;
use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, trace, warn};
use trackbridge_core::NativeHandle;

/// Callback fired on an engine thread when a renderer sees a frame
/// of the given size: `(renderer, width, height)`
pub type ResizeCallback = Arc<dyn Fn(NativeHandle, u32, u32) + Send + Sync>;

/// Error code reported by the engine
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("{operation} failed with code {code}")]
pub struct EngineError {
    /// Engine operation name
    pub operation: &'static str,
    /// Engine-defined error code
    pub code: i32,
}

impl EngineError {
    /// Create an engine error
    pub fn new(operation: &'static str, code: i32) -> Self {
        Self { operation, code }
    }
}

/// Result type alias for engine calls
pub type EngineResult<T> = Result<T, EngineError>;

/// Error codes used by [`SoftwareEngine`]
pub mod codes {
    /// Handle unknown to the engine
    pub const INVALID_HANDLE: i32 = -2;
    /// Object exists but is in the wrong state for the call
    pub const INVALID_STATE: i32 = -4;
    /// Engine has been torn down
    pub const ENGINE_SHUT_DOWN: i32 = -100;
}

/// Media kind of a track or source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TrackKind {
    /// Audio
    Audio,
    /// Video
    Video,
}

/// Outcome of encoder initialization for a track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CodecInitializationResult {
    /// Encoder not initialized yet
    NotInitialized,
    /// Encoder ready
    Success,
    /// Hardware driver missing
    DriverNotInstalled,
    /// Encoder rejected its parameters
    EncoderInitializationFailed,
}

/// Frame parameters the encoder reads from a buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderParameters {
    /// Frame width
    pub width: u32,
    /// Frame height
    pub height: u32,
    /// Pixel format of the buffer
    pub format: PixelFormat,
    /// Native texture handle the encoder reads
    pub buffer: NativeHandle,
}

/// External native media engine
///
/// Calls may be made from the main thread; the engine invokes
/// [`ResizeCallback`]s from its own threads.
pub trait NativeMediaEngine: Send + Sync {
    /// Create an encoder-side source
    fn create_source(&self, kind: TrackKind) -> EngineResult<NativeHandle>;

    /// Create a track, optionally fed by `source` (null for receive tracks)
    fn create_track(&self, kind: TrackKind, label: &str, source: NativeHandle) -> EngineResult<NativeHandle>;

    /// Drop one reference to a track or source
    fn release(&self, handle: NativeHandle);

    /// Create a decode-side renderer
    fn create_renderer(&self, need_flip: bool, on_resize: ResizeCallback) -> EngineResult<NativeHandle>;

    /// Destroy a renderer
    fn delete_renderer(&self, renderer: NativeHandle);

    /// Attach a renderer to a track, or refresh an existing attachment
    fn add_or_update_sink(&self, track: NativeHandle, renderer: NativeHandle) -> EngineResult<()>;

    /// Detach a renderer from a track
    fn remove_sink(&self, track: NativeHandle, renderer: NativeHandle) -> EngineResult<()>;

    /// Tell the encoder where and how to read frames
    fn set_encoder_parameters(&self, track: NativeHandle, params: EncoderParameters) -> EngineResult<()>;

    /// Initialize the encoder of a track
    fn initialize_encoder(&self, track: NativeHandle) -> EngineResult<()>;

    /// Finalize the encoder of a track
    fn finalize_encoder(&self, track: NativeHandle) -> EngineResult<()>;

    /// Encode the current contents of the track's buffer
    fn encode(&self, track: NativeHandle) -> EngineResult<()>;

    /// Encoder initialization outcome
    fn initialization_result(&self, track: NativeHandle) -> CodecInitializationResult;

    /// Upload the latest decoded frame into `texture`
    fn update_renderer_texture(
        &self,
        renderer: NativeHandle,
        texture: NativeHandle,
        need_flip: bool,
    ) -> EngineResult<()>;

    /// Whether the whole engine has been torn down
    fn is_torn_down(&self) -> bool;

    /// Tear the engine down
    fn shutdown(&self);
}

/// Engine operations that can be made to fail in [`SoftwareEngine`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineOp {
    /// `create_source`
    CreateSource,
    /// `create_track`
    CreateTrack,
    /// `create_renderer`
    CreateRenderer,
    /// `add_or_update_sink`
    AddSink,
    /// `remove_sink`
    RemoveSink,
    /// `set_encoder_parameters`
    SetEncoderParameters,
    /// `initialize_encoder`
    InitializeEncoder,
    /// `finalize_encoder`
    FinalizeEncoder,
    /// `encode`
    Encode,
    /// `update_renderer_texture`
    UpdateRendererTexture,
}

impl EngineOp {
    fn name(self) -> &'static str {
        match self {
            EngineOp::CreateSource => "create_source",
            EngineOp::CreateTrack => "create_track",
            EngineOp::CreateRenderer => "create_renderer",
            EngineOp::AddSink => "add_or_update_sink",
            EngineOp::RemoveSink => "remove_sink",
            EngineOp::SetEncoderParameters => "set_encoder_parameters",
            EngineOp::InitializeEncoder => "initialize_encoder",
            EngineOp::FinalizeEncoder => "finalize_encoder",
            EngineOp::Encode => "encode",
            EngineOp::UpdateRendererTexture => "update_renderer_texture",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EncoderState {
    Unconfigured,
    Configured(EncoderParameters),
    Initialized(EncoderParameters),
    Finalized,
}

struct TrackRecord {
    kind: TrackKind,
    label: String,
    source: NativeHandle,
    encoder: EncoderState,
    sinks: Vec<NativeHandle>,
    encoded_frames: u64,
}

struct RendererRecord {
    need_flip: bool,
    on_resize: ResizeCallback,
    uploads: u64,
    last_texture: NativeHandle,
}

enum EngineObject {
    Source { kind: TrackKind, refs: u32 },
    Track(TrackRecord),
    Renderer(RendererRecord),
}

/// Texture upload statistics of one renderer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RendererUploads {
    /// Number of uploads
    pub count: u64,
    /// Texture of the latest upload
    pub last_texture: NativeHandle,
    /// Flip convention the renderer was created with
    pub need_flip: bool,
}

/// In-process media engine
pub struct SoftwareEngine {
    next_handle: AtomicU64,
    objects: DashMap<NativeHandle, EngineObject>,
    failures: DashMap<EngineOp, i32>,
    torn_down: AtomicBool,
    stale_releases: AtomicU64,
}

impl SoftwareEngine {
    /// First handle handed out
    pub const FIRST_HANDLE: u64 = 0x1000;
    /// Distance between consecutive handles
    pub const HANDLE_STRIDE: u64 = 0x10;

    /// Create an engine
    pub fn new() -> Self {
        Self {
            next_handle: AtomicU64::new(Self::FIRST_HANDLE),
            objects: DashMap::new(),
            failures: DashMap::new(),
            torn_down: AtomicBool::new(false),
            stale_releases: AtomicU64::new(0),
        }
    }

    fn allocate(&self, object: EngineObject) -> NativeHandle {
        let handle = NativeHandle::from_raw(
            self.next_handle
                .fetch_add(Self::HANDLE_STRIDE, Ordering::Relaxed),
        );
        self.objects.insert(handle, object);
        handle
    }

    fn check(&self, op: EngineOp) -> EngineResult<()> {
        if self.is_torn_down() {
            return Err(EngineError::new(op.name(), codes::ENGINE_SHUT_DOWN));
        }
        if let Some(code) = self.failures.get(&op) {
            return Err(EngineError::new(op.name(), *code));
        }
        Ok(())
    }

    fn with_track<R>(
        &self,
        op: EngineOp,
        track: NativeHandle,
        f: impl FnOnce(&mut TrackRecord) -> EngineResult<R>,
    ) -> EngineResult<R> {
        self.check(op)?;
        let mut object = self
            .objects
            .get_mut(&track)
            .ok_or(EngineError::new(op.name(), codes::INVALID_HANDLE))?;
        match &mut *object {
            EngineObject::Track(record) => f(record),
            _ => Err(EngineError::new(op.name(), codes::INVALID_HANDLE)),
        }
    }

    fn add_source_ref(&self, source: NativeHandle, op: EngineOp) -> EngineResult<()> {
        let mut object = self
            .objects
            .get_mut(&source)
            .ok_or(EngineError::new(op.name(), codes::INVALID_HANDLE))?;
        match &mut *object {
            EngineObject::Source { refs, .. } => {
                *refs += 1;
                Ok(())
            }
            _ => Err(EngineError::new(op.name(), codes::INVALID_HANDLE)),
        }
    }

    fn drop_source_ref(&self, source: NativeHandle) {
        let remove = match self.objects.get_mut(&source) {
            Some(mut object) => match &mut *object {
                EngineObject::Source { refs, .. } => {
                    *refs = refs.saturating_sub(1);
                    *refs == 0
                }
                _ => false,
            },
            None => false,
        };
        if remove {
            self.objects.remove(&source);
            trace!("Source {} destroyed", source);
        }
    }

    /// Make every call of `op` fail with `code` until cleared
    pub fn inject_failure(&self, op: EngineOp, code: i32) {
        self.failures.insert(op, code);
    }

    /// Stop failing `op`
    pub fn clear_failure(&self, op: EngineOp) {
        self.failures.remove(&op);
    }

    /// Simulate a track arriving from negotiation with a remote peer
    pub fn create_remote_track(&self, kind: TrackKind) -> NativeHandle {
        let handle = self.allocate(EngineObject::Track(TrackRecord {
            kind,
            label: "remote".to_string(),
            source: NativeHandle::NULL,
            encoder: EncoderState::Unconfigured,
            sinks: Vec::new(),
            encoded_frames: 0,
        }));
        debug!("Remote {:?} track {} arrived", kind, handle);
        handle
    }

    /// Simulate a decoded frame of `width`x`height` arriving on `track`
    ///
    /// Fires the resize callback of every attached renderer on the calling
    /// thread and returns how many were notified.
    pub fn deliver_frame(&self, track: NativeHandle, width: u32, height: u32) -> usize {
        let sinks = match self.objects.get(&track).as_deref() {
            Some(EngineObject::Track(record)) => record.sinks.clone(),
            _ => return 0,
        };

        // Collect callbacks first so no shard lock is held while they run
        let callbacks: Vec<(NativeHandle, ResizeCallback)> = sinks
            .into_iter()
            .filter_map(|renderer| match self.objects.get(&renderer).as_deref() {
                Some(EngineObject::Renderer(record)) => {
                    Some((renderer, Arc::clone(&record.on_resize)))
                }
                _ => None,
            })
            .collect();

        for (renderer, callback) in &callbacks {
            callback(*renderer, width, height);
        }
        callbacks.len()
    }

    /// Whether the engine still holds an object for `handle`
    pub fn is_live(&self, handle: NativeHandle) -> bool {
        self.objects.contains_key(&handle)
    }

    /// Number of objects the engine still holds
    pub fn live_objects(&self) -> usize {
        self.objects.len()
    }

    /// Reference count of a source, `None` once destroyed
    pub fn source_refs(&self, source: NativeHandle) -> Option<u32> {
        match self.objects.get(&source).as_deref() {
            Some(EngineObject::Source { refs, .. }) => Some(*refs),
            _ => None,
        }
    }

    /// Renderers attached to a track
    pub fn sinks_of(&self, track: NativeHandle) -> Vec<NativeHandle> {
        match self.objects.get(&track).as_deref() {
            Some(EngineObject::Track(record)) => record.sinks.clone(),
            _ => Vec::new(),
        }
    }

    /// Frames encoded on a track
    pub fn encoded_frames(&self, track: NativeHandle) -> u64 {
        match self.objects.get(&track).as_deref() {
            Some(EngineObject::Track(record)) => record.encoded_frames,
            _ => 0,
        }
    }

    /// Label a track was created with
    pub fn track_label(&self, track: NativeHandle) -> Option<String> {
        match self.objects.get(&track).as_deref() {
            Some(EngineObject::Track(record)) => Some(record.label.clone()),
            _ => None,
        }
    }

    /// Encoder parameters of a track, once set
    pub fn encoder_parameters(&self, track: NativeHandle) -> Option<EncoderParameters> {
        match self.objects.get(&track).as_deref() {
            Some(EngineObject::Track(record)) => match record.encoder {
                EncoderState::Configured(params) | EncoderState::Initialized(params) => {
                    Some(params)
                }
                _ => None,
            },
            _ => None,
        }
    }

    /// Texture uploads performed by a renderer
    pub fn renderer_uploads(&self, renderer: NativeHandle) -> Option<RendererUploads> {
        match self.objects.get(&renderer).as_deref() {
            Some(EngineObject::Renderer(record)) => Some(RendererUploads {
                count: record.uploads,
                last_texture: record.last_texture,
                need_flip: record.need_flip,
            }),
            _ => None,
        }
    }

    /// Releases of handles the engine no longer knew about
    pub fn stale_releases(&self) -> u64 {
        self.stale_releases.load(Ordering::Relaxed)
    }
}

impl Default for SoftwareEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SoftwareEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SoftwareEngine")
            .field("live_objects", &self.objects.len())
            .field("torn_down", &self.is_torn_down())
            .finish()
    }
}

impl NativeMediaEngine for SoftwareEngine {
    fn create_source(&self, kind: TrackKind) -> EngineResult<NativeHandle> {
        self.check(EngineOp::CreateSource)?;
        let handle = self.allocate(EngineObject::Source { kind, refs: 1 });
        trace!("Created {:?} source {}", kind, handle);
        Ok(handle)
    }

    fn create_track(&self, kind: TrackKind, label: &str, source: NativeHandle) -> EngineResult<NativeHandle> {
        self.check(EngineOp::CreateTrack)?;
        if !source.is_null() {
            match self.objects.get(&source).as_deref() {
                Some(EngineObject::Source { kind: source_kind, .. }) if *source_kind == kind => {}
                _ => {
                    return Err(EngineError::new(
                        EngineOp::CreateTrack.name(),
                        codes::INVALID_HANDLE,
                    ))
                }
            }
            self.add_source_ref(source, EngineOp::CreateTrack)?;
        }

        let handle = self.allocate(EngineObject::Track(TrackRecord {
            kind,
            label: label.to_string(),
            source,
            encoder: EncoderState::Unconfigured,
            sinks: Vec::new(),
            encoded_frames: 0,
        }));
        trace!("Created {:?} track {} ({})", kind, handle, label);
        Ok(handle)
    }

    fn release(&self, handle: NativeHandle) {
        let object = match self.objects.get(&handle).as_deref() {
            Some(EngineObject::Track(record)) => Some(Some(record.source)),
            Some(EngineObject::Source { .. }) => Some(None),
            Some(EngineObject::Renderer(_)) => None,
            None => None,
        };

        match object {
            Some(Some(source)) => {
                self.objects.remove(&handle);
                if !source.is_null() {
                    self.drop_source_ref(source);
                }
                trace!("Track {} released", handle);
            }
            Some(None) => self.drop_source_ref(handle),
            None => {
                warn!("Release of unknown native handle {}", handle);
                self.stale_releases.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    fn create_renderer(&self, need_flip: bool, on_resize: ResizeCallback) -> EngineResult<NativeHandle> {
        self.check(EngineOp::CreateRenderer)?;
        let handle = self.allocate(EngineObject::Renderer(RendererRecord {
            need_flip,
            on_resize,
            uploads: 0,
            last_texture: NativeHandle::NULL,
        }));
        trace!("Created renderer {}", handle);
        Ok(handle)
    }

    fn delete_renderer(&self, renderer: NativeHandle) {
        let is_renderer = matches!(
            self.objects.get(&renderer).as_deref(),
            Some(EngineObject::Renderer(_))
        );
        if !is_renderer {
            warn!("Delete of unknown renderer {}", renderer);
            self.stale_releases.fetch_add(1, Ordering::Relaxed);
            return;
        }

        self.objects.remove(&renderer);
        for mut object in self.objects.iter_mut() {
            if let EngineObject::Track(record) = object.value_mut() {
                record.sinks.retain(|sink| *sink != renderer);
            }
        }
        trace!("Renderer {} deleted", renderer);
    }

    fn add_or_update_sink(&self, track: NativeHandle, renderer: NativeHandle) -> EngineResult<()> {
        if !matches!(
            self.objects.get(&renderer).as_deref(),
            Some(EngineObject::Renderer(_))
        ) {
            return Err(EngineError::new(EngineOp::AddSink.name(), codes::INVALID_HANDLE));
        }
        self.with_track(EngineOp::AddSink, track, |record| {
            if !record.sinks.contains(&renderer) {
                record.sinks.push(renderer);
            }
            Ok(())
        })
    }

    fn remove_sink(&self, track: NativeHandle, renderer: NativeHandle) -> EngineResult<()> {
        self.with_track(EngineOp::RemoveSink, track, |record| {
            let before = record.sinks.len();
            record.sinks.retain(|sink| *sink != renderer);
            if record.sinks.len() == before {
                return Err(EngineError::new(
                    EngineOp::RemoveSink.name(),
                    codes::INVALID_HANDLE,
                ));
            }
            Ok(())
        })
    }

    fn set_encoder_parameters(&self, track: NativeHandle, params: EncoderParameters) -> EngineResult<()> {
        self.with_track(EngineOp::SetEncoderParameters, track, |record| {
            if record.source.is_null() || record.kind != TrackKind::Video {
                return Err(EngineError::new(
                    EngineOp::SetEncoderParameters.name(),
                    codes::INVALID_STATE,
                ));
            }
            record.encoder = EncoderState::Configured(params);
            Ok(())
        })
    }

    fn initialize_encoder(&self, track: NativeHandle) -> EngineResult<()> {
        self.with_track(EngineOp::InitializeEncoder, track, |record| match record.encoder {
            EncoderState::Configured(params) => {
                record.encoder = EncoderState::Initialized(params);
                info!(
                    "Encoder for {} initialized at {}x{}",
                    track, params.width, params.height
                );
                Ok(())
            }
            _ => Err(EngineError::new(
                EngineOp::InitializeEncoder.name(),
                codes::INVALID_STATE,
            )),
        })
    }

    fn finalize_encoder(&self, track: NativeHandle) -> EngineResult<()> {
        self.with_track(EngineOp::FinalizeEncoder, track, |record| {
            record.encoder = EncoderState::Finalized;
            Ok(())
        })
    }

    fn encode(&self, track: NativeHandle) -> EngineResult<()> {
        self.with_track(EngineOp::Encode, track, |record| match record.encoder {
            EncoderState::Initialized(_) => {
                record.encoded_frames += 1;
                Ok(())
            }
            _ => Err(EngineError::new(EngineOp::Encode.name(), codes::INVALID_STATE)),
        })
    }

    fn initialization_result(&self, track: NativeHandle) -> CodecInitializationResult {
        match self.objects.get(&track).as_deref() {
            Some(EngineObject::Track(record)) => match record.encoder {
                EncoderState::Initialized(_) => CodecInitializationResult::Success,
                _ => CodecInitializationResult::NotInitialized,
            },
            _ => CodecInitializationResult::NotInitialized,
        }
    }

    fn update_renderer_texture(
        &self,
        renderer: NativeHandle,
        texture: NativeHandle,
        need_flip: bool,
    ) -> EngineResult<()> {
        self.check(EngineOp::UpdateRendererTexture)?;
        let mut object = self.objects.get_mut(&renderer).ok_or(EngineError::new(
            EngineOp::UpdateRendererTexture.name(),
            codes::INVALID_HANDLE,
        ))?;
        match &mut *object {
            EngineObject::Renderer(record) => {
                record.uploads += 1;
                record.last_texture = texture;
                record.need_flip = need_flip;
                Ok(())
            }
            _ => Err(EngineError::new(
                EngineOp::UpdateRendererTexture.name(),
                codes::INVALID_HANDLE,
            )),
        }
    }

    fn is_torn_down(&self) -> bool {
        self.torn_down.load(Ordering::Acquire)
    }

    fn shutdown(&self) {
        if !self.torn_down.swap(true, Ordering::AcqRel) {
            info!(
                "Software engine torn down with {} live objects",
                self.objects.len()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn params() -> EncoderParameters {
        EncoderParameters {
            width: 640,
            height: 480,
            format: PixelFormat::Rgba8Unorm,
            buffer: NativeHandle::from_raw(0x7000_0000),
        }
    }

    #[test]
    fn test_handles_start_at_base() {
        let engine = SoftwareEngine::new();
        let first = engine.create_remote_track(TrackKind::Video);
        let second = engine.create_source(TrackKind::Video).unwrap();
        assert_eq!(first, NativeHandle::from_raw(0x1000));
        assert_eq!(second, NativeHandle::from_raw(0x1010));
    }

    #[test]
    fn test_source_reference_counting() {
        let engine = SoftwareEngine::new();
        let source = engine.create_source(TrackKind::Video).unwrap();
        let track = engine.create_track(TrackKind::Video, "cam", source).unwrap();
        assert_eq!(engine.source_refs(source), Some(2));

        engine.release(source);
        assert_eq!(engine.source_refs(source), Some(1));
        engine.release(track);
        assert_eq!(engine.source_refs(source), None);
        assert_eq!(engine.live_objects(), 0);

        engine.release(source);
        assert_eq!(engine.stale_releases(), 1);
    }

    #[test]
    fn test_encoder_lifecycle() {
        let engine = SoftwareEngine::new();
        let source = engine.create_source(TrackKind::Video).unwrap();
        let track = engine.create_track(TrackKind::Video, "cam", source).unwrap();

        assert_eq!(
            engine.encode(track).unwrap_err().code,
            codes::INVALID_STATE
        );
        engine.set_encoder_parameters(track, params()).unwrap();
        engine.initialize_encoder(track).unwrap();
        assert_eq!(
            engine.initialization_result(track),
            CodecInitializationResult::Success
        );

        engine.encode(track).unwrap();
        engine.encode(track).unwrap();
        assert_eq!(engine.encoded_frames(track), 2);

        engine.finalize_encoder(track).unwrap();
        assert!(engine.encode(track).is_err());
    }

    #[test]
    fn test_deliver_frame_reaches_sinks() {
        let engine = SoftwareEngine::new();
        let track = engine.create_remote_track(TrackKind::Video);
        let seen = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&seen);
        let renderer = engine
            .create_renderer(
                true,
                Arc::new(move |_, w, h| {
                    assert_eq!((w, h), (320, 240));
                    counter.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();
        engine.add_or_update_sink(track, renderer).unwrap();
        engine.add_or_update_sink(track, renderer).unwrap();

        assert_eq!(engine.deliver_frame(track, 320, 240), 1);
        assert_eq!(seen.load(Ordering::SeqCst), 1);

        engine.remove_sink(track, renderer).unwrap();
        assert_eq!(engine.deliver_frame(track, 320, 240), 0);
    }

    #[test]
    fn test_injected_failure_and_shutdown() {
        let engine = SoftwareEngine::new();
        engine.inject_failure(EngineOp::CreateSource, -7);
        assert_eq!(
            engine.create_source(TrackKind::Audio).unwrap_err(),
            EngineError::new("create_source", -7)
        );
        engine.clear_failure(EngineOp::CreateSource);
        assert!(engine.create_source(TrackKind::Audio).is_ok());

        engine.shutdown();
        assert!(engine.is_torn_down());
        assert_eq!(
            engine.create_source(TrackKind::Audio).unwrap_err().code,
            codes::ENGINE_SHUT_DOWN
        );
    }
}
