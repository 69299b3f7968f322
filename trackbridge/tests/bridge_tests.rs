//! Integration tests for the per-frame loop and shutdown

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use trackbridge::*;

fn bridge_with_engine() -> (TrackBridge, Arc<SoftwareEngine>, Arc<SoftwareBackend>) {
    let engine = Arc::new(SoftwareEngine::new());
    let backend = Arc::new(SoftwareBackend::new());
    let engine_dyn: Arc<dyn NativeMediaEngine> = engine.clone();
    let graphics: Arc<dyn GraphicsBackend> = backend.clone();
    let bridge = TrackBridge::init_with(BridgeConfig::default(), engine_dyn, graphics).unwrap();
    (bridge, engine, backend)
}

// ============================================================================
// INITIALIZATION
// ============================================================================

#[test]
fn test_init_with_software_backend() {
    let mut bridge = TrackBridge::init(BridgeConfig::default()).unwrap();
    assert_eq!(bridge.context().graphics().kind(), BackendKind::Software);
    assert!(bridge.registry().is_empty());
    assert!(!bridge.is_shut_down());
    bridge.shutdown();
}

#[test]
fn test_native_texture_backend_needs_device() {
    let config = BridgeConfig {
        backend: BackendKind::NativeTexture,
        ..BridgeConfig::default()
    };
    assert!(matches!(
        TrackBridge::init(config),
        Err(MediaError::Initialization { .. })
    ));
}

#[test]
fn test_validation_policy_from_facade_types() {
    let config = BridgeConfig {
        platform: Platform::Android,
        encoder: EncoderType::Hardware,
        codec: VideoCodec::H264,
        ..BridgeConfig::default()
    };
    let mut bridge = TrackBridge::init(config).unwrap();

    // Hardware H.264 on Android needs 16-aligned frames of at least 145x49
    let small = bridge.create_buffer(64, 32, PixelFormat::Rgba8Unorm).unwrap();
    assert!(matches!(
        bridge.video_from_buffer(small, false),
        Err(MediaError::Validation(_))
    ));
    assert!(bridge.registry().is_empty());
    bridge.shutdown();
}

// ============================================================================
// PER-FRAME UPDATE
// ============================================================================

#[test]
fn test_update_drives_send_and_receive_tracks() {
    let (mut bridge, engine, _backend) = bridge_with_engine();

    let frame = bridge.create_buffer(64, 64, PixelFormat::Rgba8Unorm).unwrap();
    let sender = bridge.video_from_buffer(frame, true).unwrap();
    let remote = engine.create_remote_track(TrackKind::Video);
    let receiver = bridge.wrap_remote_video(remote, true).unwrap();
    let mut events = bridge.events(&receiver);

    let decoder = Arc::clone(&engine);
    thread::spawn(move || decoder.deliver_frame(remote, 320, 240))
        .join()
        .unwrap();

    let report = bridge.update();
    assert_eq!(report.dispatched, 1);
    assert_eq!(report.pushed, 1);
    assert_eq!(report.pulled, 1);
    assert!(report.errors.is_empty());

    let event = events.try_next().unwrap().unwrap();
    assert_eq!((event.width, event.height), (320, 240));
    assert_eq!(engine.encoded_frames(sender.handle()), 1);

    let renderer = receiver.frame_sink().unwrap().renderer_handle();
    let uploads = engine.renderer_uploads(renderer).unwrap();
    assert_eq!(uploads.last_texture, event.buffer.native_handle());

    sender.dispose();
    receiver.dispose();
    bridge.shutdown();
}

#[test]
fn test_update_reports_errors_without_disposing() {
    let (mut bridge, engine, _backend) = bridge_with_engine();
    let frame = bridge.create_buffer(16, 16, PixelFormat::Rgba8Unorm).unwrap();
    let sender = bridge.video_from_buffer(frame, false).unwrap();

    engine.inject_failure(EngineOp::Encode, -5);
    let report = bridge.update();
    assert_eq!(report.pushed, 0);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].handle, sender.handle());
    assert_eq!(report.errors[0].error.category(), ErrorCategory::Native);
    assert!(!sender.is_disposed());

    engine.clear_failure(EngineOp::Encode);
    assert_eq!(bridge.update().pushed, 1);

    sender.dispose();
    bridge.shutdown();
}

#[test]
fn test_update_skips_disposed_tracks() {
    let (mut bridge, engine, _backend) = bridge_with_engine();
    let frame = bridge.create_buffer(16, 16, PixelFormat::Rgba8Unorm).unwrap();
    let sender = bridge.video_from_buffer(frame, false).unwrap();
    let handle = sender.handle();

    sender.dispose();
    let report = bridge.update();
    assert_eq!(report.pushed, 0);
    assert!(report.errors.is_empty());
    assert_eq!(engine.encoded_frames(handle), 0);
    bridge.shutdown();
}

// ============================================================================
// SHUTDOWN
// ============================================================================

#[test]
fn test_shutdown_disposes_live_tracks() {
    let (mut bridge, engine, backend) = bridge_with_engine();
    let frame = bridge.create_buffer(16, 16, PixelFormat::Rgba8Unorm).unwrap();
    let sender = bridge.video_from_buffer(frame.clone(), false).unwrap();
    let audio = bridge.local_audio().unwrap();
    let receiver = bridge.video_receiver(true).unwrap();
    receiver.initialize_receiver(32, 32).unwrap();

    let report = bridge.shutdown();

    assert_eq!(report.disposed_tracks, 3);
    assert!(sender.is_disposed());
    assert!(audio.is_disposed());
    assert!(receiver.is_disposed());
    assert!(bridge.registry().is_empty());
    assert!(engine.is_torn_down());
    assert_eq!(engine.live_objects(), 0);
    // Only the caller's frame remains
    assert_eq!(backend.live_buffers(), 1);
    assert!(!frame.is_destroyed());

    assert!(report.leaks.is_clean());

    // A second shutdown only reports
    assert_eq!(bridge.shutdown().disposed_tracks, 0);
}

#[test]
fn test_shutdown_runs_queued_actions_then_rejects_posts() {
    let (mut bridge, engine, backend) = bridge_with_engine();
    let remote = engine.create_remote_track(TrackKind::Video);
    let receiver = bridge.wrap_remote_video(remote, false).unwrap();

    let decoder = Arc::clone(&engine);
    thread::spawn(move || decoder.deliver_frame(remote, 640, 480))
        .join()
        .unwrap();

    let ran = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&ran);
    bridge
        .dispatcher()
        .post(remote, move || flag.store(true, Ordering::SeqCst))
        .unwrap();

    let report = bridge.shutdown();
    // Queued work still runs in the final drain; the resize found its sink
    // already disposed and did nothing
    assert!(ran.load(Ordering::SeqCst));
    assert_eq!(report.discarded_actions, 0);
    assert!(receiver.is_disposed());
    assert_eq!(backend.live_buffers(), 0);

    // Posting after shutdown is rejected and counted as dropped
    assert_eq!(
        bridge.dispatcher().post(remote, || {}),
        Err(CoreError::DispatcherClosed)
    );
    assert_eq!(bridge.update().dispatched, 0);
    assert_eq!(bridge.dispatcher().stats().dropped, 1);
}

#[test]
fn test_leak_report_lists_dropped_wrappers() {
    let (mut bridge, _engine, _backend) = bridge_with_engine();
    let dropped = bridge.video_receiver(false).unwrap();
    let handle = dropped.handle();
    drop(dropped);

    let stats = bridge.stats();
    assert_eq!(stats.dead_entries, 1);

    let report = bridge.shutdown();
    assert_eq!(report.disposed_tracks, 0);
    let undisposed: Vec<NativeHandle> = report.leaks.undisposed().map(|leak| leak.handle).collect();
    assert_eq!(undisposed, vec![handle]);
}

#[tokio::test]
async fn test_event_stream_awaits_resize() {
    let (mut bridge, engine, _backend) = bridge_with_engine();
    let remote = engine.create_remote_track(TrackKind::Video);
    let receiver = bridge.wrap_remote_video(remote, true).unwrap();
    let mut events = bridge.events(&receiver);

    let decoder = Arc::clone(&engine);
    tokio::task::spawn_blocking(move || decoder.deliver_frame(remote, 1920, 1080))
        .await
        .unwrap();
    bridge.update();

    let event = events.next().await.unwrap();
    assert_eq!(event.buffer.dimensions(), (1920, 1080));
    assert!(event.buffer.same_buffer(&receiver.buffer().unwrap()));

    receiver.dispose();
    bridge.shutdown();
}
