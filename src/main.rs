/// `listen` binary
///
/// Captures microphone audio and prints WAKE! on every wake-word detection.
/// Pass --debug for verbose logging.

use anyhow::Context;
use std::path::Path;
use tokio::sync::mpsc;
use tracing::{debug, error, info};
use wake_listener::{
    frame_channel, AudioCapture, ListenConfig, Pipeline, RingBuffer, WakeWordDetector,
    FRAME_SIZE, SAMPLE_RATE,
};

#[tokio::main]
async fn main() {
    let debug_enabled = std::env::args().any(|arg| arg == "--debug");

    let directive = if debug_enabled {
        "wake_listener=debug"
    } else {
        "wake_listener=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(directive.parse().unwrap()),
        )
        .init();

    if let Err(e) = run().await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let config = load_config().context("failed to load configuration")?;

    let detector = WakeWordDetector::new(&config.detector)
        .context("failed to create wake-word detector")?;
    let ring = RingBuffer::new(config.capacity_seconds, SAMPLE_RATE, FRAME_SIZE)
        .context("failed to create ring buffer")?;

    let (frame_tx, mut frame_rx) = frame_channel();
    let (event_tx, mut event_rx) = mpsc::unbounded_channel();

    let mut pipeline = Pipeline::new(ring, detector, event_tx);
    if let Some(dir) = config.save_audio_dir.clone() {
        pipeline = pipeline.save_audio_to(dir);
    }

    // Holding the guard keeps the device open; dropping it on any exit path
    // below stops and releases it.
    let capture = AudioCapture::start(frame_tx).context("failed to open audio input")?;

    println!("Listening for wake-word... Press Ctrl+C to stop.");

    let printer = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            println!("WAKE!");
            debug!("Detection at frame {}", event.frame_index);
        }
    });

    tokio::select! {
        result = pipeline.run(&mut frame_rx) => {
            result.context("pipeline terminated")?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupt received, shutting down");
        }
    }

    drop(capture);
    printer.abort();

    info!(
        "Stopped after {} frames, {} detections",
        pipeline.frames_processed(),
        pipeline.detections()
    );
    Ok(())
}

/// Load configuration from the file named by LISTEN_CONFIG, if set, then
/// apply environment overrides.
fn load_config() -> anyhow::Result<ListenConfig> {
    let base = match std::env::var("LISTEN_CONFIG") {
        Ok(path) => ListenConfig::from_file(Path::new(&path))
            .with_context(|| format!("config file {}", path))?,
        Err(_) => ListenConfig::default(),
    };

    Ok(base.apply_env()?)
}
