//! Leak Report Demo
//!
//! This example forgets to dispose one track and drops another without
//! disposing it, then prints the statistics and the leak report produced at
//! shutdown.

use trackbridge::{BridgeConfig, DebugLogger, MediaStreamTrack, TrackBridge};

fn main() -> anyhow::Result<()> {
    let config = BridgeConfig {
        debug_logging: true,
        ..BridgeConfig::default()
    };
    DebugLogger::init_logging(config.debug_logging)?;

    println!("🔍 TrackBridge Leak Report Demo");
    println!("===============================");

    let mut bridge = TrackBridge::init(config)?;

    let disposed = bridge.local_audio()?;
    let forgotten = bridge.video_receiver(true)?;
    let dropped = bridge.video_receiver(false)?;
    forgotten.initialize_receiver(320, 240)?;

    disposed.dispose();
    drop(dropped);

    println!("\n📊 Statistics before shutdown:");
    println!("{}", bridge.stats().to_json()?);

    // Shutdown disposes `forgotten`; the dropped receiver stays behind
    let report = bridge.shutdown();
    println!("\n🧹 Tracks disposed by shutdown: {}", report.disposed_tracks);
    println!("\n📋 Leak report:");
    println!("{}", report.leaks.to_json()?);

    for leak in report.leaks.undisposed() {
        println!("  ⚠️  {} {} was never disposed", leak.wrapper, leak.handle);
    }
    Ok(())
}
