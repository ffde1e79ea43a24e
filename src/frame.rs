/// Audio frame primitives
///
/// Every component in the crate exchanges audio as fixed-size frames of
/// 16-bit mono PCM. A frame of any other length is a validation error at
/// the receiving operation, never silently truncated or padded.

/// Audio sample format (16-bit PCM)
pub type AudioSample = i16;

/// A single captured frame of audio samples.
pub type Frame = Vec<AudioSample>;

pub const SAMPLE_RATE: usize = 16000;
pub const CHANNELS: u16 = 1;
pub const FRAME_DURATION_MS: usize = 20;

/// Samples per frame: 320 at 16 kHz / 20 ms.
pub const FRAME_SIZE: usize = SAMPLE_RATE * FRAME_DURATION_MS / 1000;
