//! # TrackBridge - native media tracks on a host's main thread
//!
//! TrackBridge connects a native media engine, whose encoder and decoder run
//! on their own threads, to a host that owns every graphics resource on a
//! single main thread.
//!
//! ## Key Features
//!
//! - **Weak handle registry**: native callbacks find their wrapper without
//!   keeping it alive
//! - **Cross-thread dispatch**: decoder notifications are queued and run on
//!   the main thread during [`TrackBridge::update`]
//! - **Buffer ownership**: receive buffers are reallocated on resize and the
//!   old buffer is released before anyone sees the new one
//! - **Explicit disposal**: deterministic, idempotent teardown with a leak
//!   report at shutdown
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use trackbridge::{BridgeConfig, MediaStreamTrack, PixelFormat, TrackBridge};
//!
//! # fn main() -> Result<(), trackbridge::MediaError> {
//! let mut bridge = TrackBridge::init(BridgeConfig::default())?;
//!
//! // Send a host buffer, flipping rows on the way out
//! let frame = bridge.create_buffer(1280, 720, PixelFormat::Rgba8Unorm)?;
//! let track = bridge.video_from_buffer(frame, true)?;
//!
//! // Once per frame, on the main thread
//! let report = bridge.update();
//! assert!(report.errors.is_empty());
//!
//! track.dispose();
//! bridge.shutdown();
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]
#![warn(clippy::all)]

use std::sync::Arc;
use tracing::{debug, info, warn};

// Re-export core types for easy access
pub use trackbridge_core::{
    CoreError, Dispatcher, DispatcherHandle, DispatcherStats, HandleRegistry, NativeHandle,
};

pub use trackbridge_media::{
    AudioTrack, BackendKind, EncoderType, EngineOp, ErrorCategory, FrameEvent, FrameSink,
    GpuBuffer, GraphicsBackend, MediaContext, MediaError, MediaResult, MediaStreamTrack,
    NativeMediaEngine, NativeTextureBackend, PixelFormat, Platform, SoftwareBackend,
    SoftwareEngine, TextureDevice, TrackDirection, TrackKind, TrackLifecycle, TrackSource,
    ValidationError, ValidationPolicy, VideoCodec, VideoTrack,
};

#[cfg(feature = "diagnostics")]
pub use trackbridge_diagnostics::{BridgeStats, DebugLogger, LeakReport, LeakedHandle};

// Public API modules
pub mod config;
pub mod event;

// Re-export main API types
pub use config::BridgeConfig;
pub use event::EventStream;

/// Error raised by one track during [`TrackBridge::update`]
#[derive(Debug, Clone, PartialEq)]
pub struct TrackError {
    /// Track that failed
    pub handle: NativeHandle,
    /// What went wrong
    pub error: MediaError,
}

/// Outcome of one per-frame tick
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    /// Dispatched actions run
    pub dispatched: usize,
    /// Send tracks encoded
    pub pushed: usize,
    /// Receive tracks uploaded
    pub pulled: usize,
    /// Per-track failures; the tracks stay alive
    pub errors: Vec<TrackError>,
}

/// Outcome of [`TrackBridge::shutdown`]
#[derive(Debug, Clone)]
pub struct ShutdownReport {
    /// Tracks disposed by the shutdown itself
    pub disposed_tracks: usize,
    /// Dispatched actions discarded without running
    pub discarded_actions: usize,
    /// Handles left in the registry
    #[cfg(feature = "diagnostics")]
    pub leaks: LeakReport,
}

/// Main entry point for TrackBridge
///
/// Owns the dispatcher consumer and must stay on the thread that created it.
pub struct TrackBridge {
    config: BridgeConfig,
    dispatcher: Dispatcher,
    ctx: MediaContext,
    shut_down: bool,
}

impl TrackBridge {
    /// Initialize with the in-process software engine
    ///
    /// The calling thread becomes the main thread. The native texture backend
    /// needs a device and is only available through
    /// [`init_with`](Self::init_with).
    pub fn init(config: BridgeConfig) -> MediaResult<Self> {
        let graphics: Arc<dyn GraphicsBackend> = match config.backend {
            BackendKind::Software => Arc::new(SoftwareBackend::new()),
            BackendKind::NativeTexture => {
                return Err(MediaError::Initialization {
                    reason: "native texture backend requires a texture device, use init_with"
                        .to_string(),
                })
            }
        };
        Self::init_with(config, Arc::new(SoftwareEngine::new()), graphics)
    }

    /// Initialize with external collaborators
    pub fn init_with(
        config: BridgeConfig,
        engine: Arc<dyn NativeMediaEngine>,
        graphics: Arc<dyn GraphicsBackend>,
    ) -> MediaResult<Self> {
        #[cfg(feature = "diagnostics")]
        if config.debug_logging {
            DebugLogger::init_logging(true).map_err(|e| MediaError::Initialization {
                reason: format!("Failed to initialize logging: {}", e),
            })?;
        }

        if graphics.kind() != config.backend {
            warn!(
                "Configured backend {:?} but {:?} was supplied",
                config.backend,
                graphics.kind()
            );
        }

        let dispatcher = Dispatcher::new();
        let registry = Arc::new(HandleRegistry::new());
        let ctx = MediaContext::new(
            engine,
            graphics,
            registry,
            dispatcher.handle(),
            config.validation_policy(),
        )
        .with_event_capacity(config.event_capacity);

        info!("🚀 TrackBridge initialized with {:?} backend", config.backend);
        Ok(Self {
            config,
            dispatcher,
            ctx,
            shut_down: false,
        })
    }

    /// Active configuration
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Shared context tracks are created against
    pub fn context(&self) -> &MediaContext {
        &self.ctx
    }

    /// Handle registry
    pub fn registry(&self) -> &Arc<HandleRegistry> {
        self.ctx.registry()
    }

    /// Producer handle for posting work onto the main thread
    pub fn dispatcher(&self) -> DispatcherHandle {
        self.dispatcher.handle()
    }

    /// Allocate a buffer on the configured graphics backend
    pub fn create_buffer(&self, width: u32, height: u32, format: PixelFormat) -> MediaResult<GpuBuffer> {
        self.ctx.graphics().create_buffer(width, height, format)
    }

    /// Create a send track fed from `source`, see [`VideoTrack::from_buffer`]
    pub fn video_from_buffer(&self, source: GpuBuffer, need_flip: bool) -> MediaResult<Arc<VideoTrack>> {
        VideoTrack::from_buffer(&self.ctx, source, need_flip)
    }

    /// Create a send track reading a caller texture, see
    /// [`VideoTrack::from_texture_handle`]
    pub fn video_from_texture(
        &self,
        texture: NativeHandle,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> MediaResult<Arc<VideoTrack>> {
        VideoTrack::from_texture_handle(&self.ctx, texture, width, height, format)
    }

    /// Create an uninitialized receive track
    pub fn video_receiver(&self, need_flip: bool) -> MediaResult<Arc<VideoTrack>> {
        VideoTrack::new_receiver(&self.ctx, need_flip)
    }

    /// Wrap a remote video track arriving from negotiation
    pub fn wrap_remote_video(&self, handle: NativeHandle, need_flip: bool) -> MediaResult<Arc<VideoTrack>> {
        VideoTrack::wrap_remote(&self.ctx, handle, need_flip)
    }

    /// Create a local audio track
    pub fn local_audio(&self) -> MediaResult<Arc<AudioTrack>> {
        AudioTrack::local(&self.ctx)
    }

    /// Wrap a remote audio track arriving from negotiation
    pub fn wrap_remote_audio(&self, handle: NativeHandle) -> MediaResult<Arc<AudioTrack>> {
        AudioTrack::wrap_remote(&self.ctx, handle)
    }

    /// Buffer replacement events of `track`
    pub fn events(&self, track: &VideoTrack) -> EventStream {
        EventStream::new(track.subscribe())
    }

    /// Per-frame tick
    ///
    /// Runs dispatched actions, then encodes every send track and uploads
    /// into every receive track. A failing track is reported and left alive.
    pub fn update(&mut self) -> TickReport {
        let mut report = TickReport {
            dispatched: self.dispatcher.drain(),
            ..TickReport::default()
        };
        if self.shut_down {
            return report;
        }

        for track in self.ctx.registry().live::<VideoTrack>() {
            if track.is_disposed() {
                continue;
            }
            let result = match track.direction() {
                TrackDirection::Send => track.push_frame().map(|()| report.pushed += 1),
                TrackDirection::Receive => track.pull_frame().map(|()| report.pulled += 1),
            };
            if let Err(error) = result {
                debug!("Track {} failed this tick: {}", track.handle(), error);
                report.errors.push(TrackError {
                    handle: track.handle(),
                    error,
                });
            }
        }
        report
    }

    /// Current registry and dispatcher statistics
    #[cfg(feature = "diagnostics")]
    pub fn stats(&self) -> BridgeStats {
        BridgeStats::capture(self.ctx.registry(), self.dispatcher.stats())
    }

    /// Dispose every live track, tear down the engine and the dispatcher
    ///
    /// Actions queued before the call still run once, after the tracks are
    /// disposed, so deferred buffer releases complete. Anything queued while
    /// the engine tears down is discarded and later posts are rejected.
    /// Calling it again only reports what is left.
    pub fn shutdown(&mut self) -> ShutdownReport {
        let mut disposed_tracks = 0;
        let mut discarded_actions = 0;

        if !self.shut_down {
            self.shut_down = true;

            let video = self.ctx.registry().live::<VideoTrack>();
            let audio = self.ctx.registry().live::<AudioTrack>();
            for track in video.iter().filter(|t| !t.is_disposed()) {
                track.dispose();
                disposed_tracks += 1;
            }
            for track in audio.iter().filter(|t| !t.is_disposed()) {
                track.dispose();
                disposed_tracks += 1;
            }

            // Buffer releases deferred from other threads still run
            self.dispatcher.drain();
            self.ctx.engine().shutdown();
            discarded_actions = self.dispatcher.shutdown();
            info!(
                "TrackBridge shut down: {} tracks disposed, {} actions discarded",
                disposed_tracks, discarded_actions
            );
        }

        #[cfg(feature = "diagnostics")]
        let leaks = {
            let leaks = LeakReport::collect(self.ctx.registry(), self.dispatcher.stats());
            leaks.log();
            leaks
        };

        ShutdownReport {
            disposed_tracks,
            discarded_actions,
            #[cfg(feature = "diagnostics")]
            leaks,
        }
    }

    /// Whether `shutdown` has run
    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }
}

impl Drop for TrackBridge {
    fn drop(&mut self) {
        if !self.shut_down {
            warn!(
                "TrackBridge dropped without shutdown, {} registry entries left",
                self.ctx.registry().len()
            );
        }
    }
}

impl std::fmt::Debug for TrackBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackBridge")
            .field("config", &self.config)
            .field("dispatcher", &self.dispatcher)
            .field("shut_down", &self.shut_down)
            .finish()
    }
}
