/// Microphone frame producer
///
/// Owns the platform audio input device and pushes one frame per hardware
/// block onto an unbounded hand-off channel. The cpal data callback runs on
/// the driver's own real-time thread and must never block, so the channel
/// send is the only thing it does besides copying the block out.

use crate::frame::{AudioSample, Frame, CHANNELS, FRAME_SIZE, SAMPLE_RATE};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("no audio input device available")]
    NoDevice,

    #[error("failed to build input stream: {0}")]
    Build(String),

    #[error("failed to start input stream: {0}")]
    Play(String),

    #[error("audio device failed: {0}")]
    Device(String),
}

/// Producer side of the frame hand-off channel.
pub type FrameSender = mpsc::UnboundedSender<Result<Frame, CaptureError>>;

/// Consumer side of the frame hand-off channel.
pub type FrameReceiver = mpsc::UnboundedReceiver<Result<Frame, CaptureError>>;

/// Create the hand-off channel between the hardware callback and the
/// consumer task.
///
/// The sender never blocks, so the callback thread is never stalled by a
/// slow consumer; a stalled consumer instead grows the queue without bound.
/// Frames arrive at the receiver in exactly the order they were sent.
pub fn frame_channel() -> (FrameSender, FrameReceiver) {
    mpsc::unbounded_channel()
}

/// Guard owning the live input stream.
///
/// The underlying device handle is held exclusively for the lifetime of this
/// value and released on drop, which covers cancellation and error exits.
/// Dropping the guard also drops the callback's channel senders, so the
/// consumer observes end-of-stream.
pub struct AudioCapture {
    stream: cpal::Stream,
}

impl AudioCapture {
    /// Open the default input device at 16 kHz mono i16 with frame-sized
    /// blocks and start delivering frames into `tx`.
    pub fn start(tx: FrameSender) -> Result<Self, CaptureError> {
        let host = cpal::default_host();
        let device = host.default_input_device().ok_or(CaptureError::NoDevice)?;

        info!(
            "Using input device: {}",
            device.name().unwrap_or_else(|_| "<unknown>".to_string())
        );

        let config = cpal::StreamConfig {
            channels: CHANNELS,
            sample_rate: cpal::SampleRate(SAMPLE_RATE as u32),
            buffer_size: cpal::BufferSize::Fixed(FRAME_SIZE as u32),
        };

        let data_tx = tx.clone();
        let error_tx = tx;

        let stream = device
            .build_input_stream(
                &config,
                move |data: &[AudioSample], _: &cpal::InputCallbackInfo| {
                    // The hardware buffer is only valid for the duration of
                    // the callback; copy the block before handing it off.
                    let _ = data_tx.send(Ok(data.to_vec()));
                },
                move |err| match err {
                    cpal::StreamError::DeviceNotAvailable => {
                        error!("Input device no longer available, ending stream");
                        let _ = error_tx.send(Err(CaptureError::Device(err.to_string())));
                    }
                    other => {
                        // Overruns and other transient conditions do not stop
                        // the stream.
                        warn!("Input stream status: {}", other);
                    }
                },
                None,
            )
            .map_err(|e| CaptureError::Build(e.to_string()))?;

        stream.play().map_err(|e| CaptureError::Play(e.to_string()))?;

        info!(
            "Audio capture started: {} Hz, {} channel(s), {} samples/frame",
            SAMPLE_RATE, CHANNELS, FRAME_SIZE
        );

        Ok(Self { stream })
    }
}

impl Drop for AudioCapture {
    fn drop(&mut self) {
        if let Err(e) = self.stream.pause() {
            warn!("Failed to stop input stream: {}", e);
        }
        info!("Audio capture stopped");
    }
}
