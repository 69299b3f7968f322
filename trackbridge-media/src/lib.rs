//! # TrackBridge Media
//!
//! Track lifecycle, frame sinks and buffer hand-off between a native media
//! engine and a host graphics context. This crate owns everything that
//! touches a native track: encoder setup and per-frame encode for send
//! tracks, renderer attachment and buffer resizing for receive tracks, and
//! the disposal order across both.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod context;
pub mod engine;
pub mod error;
pub mod frame_sink;
pub mod graphics;
pub mod source;
pub mod track;
pub mod validation;

// Re-export main types
pub use context::{MediaContext, DEFAULT_EVENT_CAPACITY};
pub use engine::{
    CodecInitializationResult, EncoderParameters, EngineError, EngineOp, EngineResult,
    NativeMediaEngine, RendererUploads, ResizeCallback, SoftwareEngine, TrackKind,
};
pub use error::{ErrorCategory, MediaError, MediaResult};
pub use frame_sink::FrameSink;
pub use graphics::{
    release_on_main, BackendKind, BlitTransform, BufferId, GpuBuffer, GraphicsBackend,
    NativeTextureBackend, PixelFormat, SoftwareBackend, TextureDevice,
};
pub use source::TrackSource;
pub use track::{
    AudioTrack, FrameEvent, MediaStreamTrack, TrackDirection, TrackLifecycle, VideoTrack,
};
pub use validation::{
    validate, CapabilityRequest, EncoderType, Platform, ValidationError, ValidationErrorKind,
    ValidationPolicy, VideoCodec,
};
