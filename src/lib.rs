/// Wake-word listening library
///
/// Streams microphone audio in fixed 20 ms frames, keeps a bounded ring of
/// recent audio history, and scores every frame against a keyword model.

pub mod capture;
pub mod config;
pub mod detector;
pub mod frame;
pub mod pipeline;
pub mod ring_buffer;

// Re-export main types
pub use capture::{frame_channel, AudioCapture, CaptureError, FrameReceiver, FrameSender};
pub use config::{ConfigError, ListenConfig};
pub use detector::{
    DetectorConfig, DetectorError, EnergyScorer, KeywordScorer, WakeWordDetector,
    FALLBACK_KEYWORD,
};
pub use frame::{AudioSample, Frame, CHANNELS, FRAME_DURATION_MS, FRAME_SIZE, SAMPLE_RATE};
pub use pipeline::{Pipeline, PipelineError, WakeWordEvent};
pub use ring_buffer::{RingBuffer, RingBufferError};
