//! Send/Receive Demo
//!
//! This example sends a host buffer through the software engine and receives
//! a simulated remote track whose decoder reports frame sizes from its own
//! thread. The main loop ticks the bridge the way a host's per-frame update
//! would.

use std::sync::Arc;
use std::thread;
use trackbridge::{
    BridgeConfig, GraphicsBackend, MediaStreamTrack, NativeMediaEngine, PixelFormat,
    SoftwareBackend, SoftwareEngine, TrackBridge, TrackKind,
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    println!("📡 TrackBridge Send/Receive Demo");
    println!("================================");

    let engine = Arc::new(SoftwareEngine::new());
    let engine_dyn: Arc<dyn NativeMediaEngine> = engine.clone();
    let graphics: Arc<dyn GraphicsBackend> = Arc::new(SoftwareBackend::new());
    let mut bridge = TrackBridge::init_with(BridgeConfig::default(), engine_dyn, graphics)?;

    // Send path
    println!("\n📹 Send track");
    let frame = bridge.create_buffer(1280, 720, PixelFormat::Bgra8Unorm)?;
    let camera = bridge.video_from_buffer(frame.clone(), true)?;
    println!("  Track {} ({})", camera.handle(), camera.id());
    println!("  Encoder initialized: {}", camera.is_encoder_initialized());

    // Receive path
    println!("\n📺 Remote track");
    let remote_handle = engine.create_remote_track(TrackKind::Video);
    let remote = bridge.wrap_remote_video(remote_handle, true)?;
    let mut events = bridge.events(&remote);

    let sizes = [(640, 480), (640, 480), (1280, 720)];
    for (tick, (width, height)) in sizes.into_iter().enumerate() {
        // The decoder lives on its own thread
        let decoder = Arc::clone(&engine);
        thread::spawn(move || decoder.deliver_frame(remote_handle, width, height))
            .join()
            .map_err(|_| anyhow::anyhow!("decoder thread panicked"))?;

        let report = bridge.update();
        println!(
            "  Tick {}: {} dispatched, {} pushed, {} pulled, {} errors",
            tick,
            report.dispatched,
            report.pushed,
            report.pulled,
            report.errors.len()
        );

        while let Some(event) = events.try_next()? {
            println!(
                "  🖼️  New buffer {:?} at {}x{}",
                event.buffer.id(),
                event.width,
                event.height
            );
        }
    }

    println!("\n📊 Engine counters");
    println!("  Frames encoded: {}", engine.encoded_frames(camera.handle()));
    println!("  Live native objects: {}", engine.live_objects());

    camera.dispose();
    remote.dispose();

    let report = bridge.shutdown();
    println!(
        "\n✨ Shut down: {} tracks disposed by shutdown, {} actions discarded",
        report.disposed_tracks, report.discarded_actions
    );
    Ok(())
}
