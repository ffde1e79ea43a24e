/// Driver loop
///
/// The single consumer task: pulls frames off the hand-off channel in
/// strict FIFO order and routes each one through the ring buffer and the
/// detector. All ring and detector mutation happens here, sequentially, so
/// neither needs synchronization of its own.

use crate::capture::{CaptureError, FrameReceiver};
use crate::detector::{DetectorError, WakeWordDetector};
use crate::frame::{AudioSample, SAMPLE_RATE};
use crate::ring_buffer::{RingBuffer, RingBufferError};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    RingBuffer(#[from] RingBufferError),

    #[error(transparent)]
    Detector(#[from] DetectorError),
}

/// Emitted once per positive wake-word decision.
#[derive(Debug, Clone)]
pub struct WakeWordEvent {
    /// Zero-based index of the frame that triggered the detection
    pub frame_index: u64,

    /// Timestamp of the detection (microseconds since epoch)
    pub timestamp_micros: i64,

    /// Buffered audio history at the time of detection, oldest first
    pub audio_context: Vec<AudioSample>,
}

/// Frame consumer driving the ring buffer and detector.
pub struct Pipeline {
    ring: RingBuffer,
    detector: WakeWordDetector,
    event_tx: mpsc::UnboundedSender<WakeWordEvent>,
    save_audio_dir: Option<PathBuf>,
    frames_processed: u64,
    detections: u64,
}

impl Pipeline {
    pub fn new(
        ring: RingBuffer,
        detector: WakeWordDetector,
        event_tx: mpsc::UnboundedSender<WakeWordEvent>,
    ) -> Self {
        Self {
            ring,
            detector,
            event_tx,
            save_audio_dir: None,
            frames_processed: 0,
            detections: 0,
        }
    }

    /// Dump the buffered audio context to a WAV file in `dir` on every
    /// detection. Write failures are logged, never fatal.
    pub fn save_audio_to(mut self, dir: PathBuf) -> Self {
        self.save_audio_dir = Some(dir);
        self
    }

    /// Consume frames until the stream ends.
    ///
    /// Frames are processed one at a time in arrival order, none skipped.
    /// A fatal capture error received over the channel ends the loop with
    /// that error; framing and scoring errors propagate immediately. A
    /// closed channel (producer dropped) ends the loop cleanly. The caller
    /// cancels by dropping this future, e.g. from a `select!` on an
    /// interrupt signal.
    pub async fn run(&mut self, frames: &mut FrameReceiver) -> Result<(), PipelineError> {
        info!("Pipeline running");

        while let Some(next) = frames.recv().await {
            let frame = next?;

            self.ring.extend(frame.clone())?;

            if self.detector.check(&frame)? {
                self.detections += 1;

                let event = WakeWordEvent {
                    frame_index: self.frames_processed,
                    timestamp_micros: current_timestamp_micros(),
                    audio_context: self.ring.get_all(),
                };

                info!("Wake-word detected at frame {}", event.frame_index);

                if let Some(dir) = &self.save_audio_dir {
                    if let Err(e) = save_context_wav(dir, &event.audio_context) {
                        warn!("Failed to save detection audio: {}", e);
                    }
                }

                if self.event_tx.send(event).is_err() {
                    debug!("Event receiver dropped, stopping pipeline");
                    return Ok(());
                }
            }

            self.frames_processed += 1;

            if self.frames_processed % 1000 == 0 {
                debug!(
                    "Processed {} frames, {} detections, ring at {}/{} frames",
                    self.frames_processed,
                    self.detections,
                    self.ring.len(),
                    self.ring.capacity_frames()
                );
            }
        }

        info!("Frame stream ended after {} frames", self.frames_processed);
        Ok(())
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    pub fn detections(&self) -> u64 {
        self.detections
    }

    pub fn ring(&self) -> &RingBuffer {
        &self.ring
    }
}

/// Write the detection context as 16-bit mono PCM at the capture rate.
fn save_context_wav(dir: &Path, samples: &[AudioSample]) -> Result<(), hound::Error> {
    std::fs::create_dir_all(dir)?;

    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: SAMPLE_RATE as u32,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let ts = current_timestamp_micros();
    let path = dir.join(format!("detection_{}.wav", ts));

    let mut writer = hound::WavWriter::create(&path, spec)?;
    for &sample in samples {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;

    debug!("Saved detection audio to {}", path.display());
    Ok(())
}

fn current_timestamp_micros() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};

    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::frame_channel;
    use crate::detector::{DetectorConfig, DetectorError, KeywordScorer};
    use crate::frame::FRAME_SIZE;
    use std::collections::HashMap;

    /// Scorer returning a fixed score for one chosen frame index and zero
    /// everywhere else.
    struct ScriptedScorer {
        keyword: String,
        hot_frame: usize,
        hot_score: f32,
        calls: usize,
    }

    impl KeywordScorer for ScriptedScorer {
        fn predict(
            &mut self,
            _samples: &[i16],
        ) -> Result<HashMap<String, f32>, DetectorError> {
            let score = if self.calls == self.hot_frame {
                self.hot_score
            } else {
                0.0
            };
            self.calls += 1;
            Ok([(self.keyword.clone(), score)].into_iter().collect())
        }
    }

    fn test_pipeline(
        capacity_seconds: usize,
        hot_frame: usize,
    ) -> (Pipeline, mpsc::UnboundedReceiver<WakeWordEvent>) {
        let config = DetectorConfig {
            model_path: "models/hey_robot.onnx".to_string(),
            ..Default::default()
        };
        let scorer = ScriptedScorer {
            keyword: "hey_robot".to_string(),
            hot_frame,
            hot_score: 0.95,
            calls: 0,
        };
        let detector = WakeWordDetector::with_scorer(&config, Box::new(scorer)).unwrap();
        let ring = RingBuffer::new(capacity_seconds, SAMPLE_RATE, FRAME_SIZE).unwrap();

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        (Pipeline::new(ring, detector, event_tx), event_rx)
    }

    #[tokio::test]
    async fn test_clean_end_on_channel_close() {
        let (mut pipeline, _events) = test_pipeline(2, usize::MAX);
        let (tx, mut rx) = frame_channel();

        for _ in 0..10 {
            tx.send(Ok(vec![0; FRAME_SIZE])).unwrap();
        }
        drop(tx);

        pipeline.run(&mut rx).await.unwrap();
        assert_eq!(pipeline.frames_processed(), 10);
        assert_eq!(pipeline.detections(), 0);
        assert_eq!(pipeline.ring().len(), 10);
    }

    #[tokio::test]
    async fn test_capture_error_terminates_loop() {
        let (mut pipeline, _events) = test_pipeline(2, usize::MAX);
        let (tx, mut rx) = frame_channel();

        tx.send(Ok(vec![0; FRAME_SIZE])).unwrap();
        tx.send(Err(CaptureError::Device("gone".to_string()))).unwrap();
        drop(tx);

        let result = pipeline.run(&mut rx).await;
        assert!(matches!(result, Err(PipelineError::Capture(_))));
        assert_eq!(pipeline.frames_processed(), 1);
    }

    #[tokio::test]
    async fn test_short_frame_rejected() {
        let (mut pipeline, _events) = test_pipeline(2, usize::MAX);
        let (tx, mut rx) = frame_channel();

        tx.send(Ok(vec![0; FRAME_SIZE - 1])).unwrap();
        drop(tx);

        let result = pipeline.run(&mut rx).await;
        assert!(matches!(
            result,
            Err(PipelineError::RingBuffer(
                RingBufferError::FrameSizeMismatch { .. }
            ))
        ));
    }

    #[tokio::test]
    async fn test_detection_event_carries_ring_context() {
        let (mut pipeline, mut events) = test_pipeline(2, 4);
        let (tx, mut rx) = frame_channel();

        for i in 0..5i16 {
            tx.send(Ok(vec![i; FRAME_SIZE])).unwrap();
        }
        drop(tx);

        pipeline.run(&mut rx).await.unwrap();
        assert_eq!(pipeline.detections(), 1);

        let event = events.recv().await.unwrap();
        assert_eq!(event.frame_index, 4);
        // All five frames still fit in the 100-frame ring
        assert_eq!(event.audio_context.len(), 5 * FRAME_SIZE);
        assert_eq!(event.audio_context[0], 0);
        assert_eq!(event.audio_context[4 * FRAME_SIZE], 4);
    }

    #[tokio::test]
    async fn test_wav_dump_on_detection() {
        let dir = tempfile::tempdir().unwrap();
        let (pipeline, mut events) = test_pipeline(2, 0);
        let mut pipeline = pipeline.save_audio_to(dir.path().to_path_buf());
        let (tx, mut rx) = frame_channel();

        tx.send(Ok(vec![42; FRAME_SIZE])).unwrap();
        drop(tx);

        pipeline.run(&mut rx).await.unwrap();
        assert!(events.recv().await.is_some());

        let wavs: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "wav"))
            .collect();
        assert_eq!(wavs.len(), 1);

        let mut reader = hound::WavReader::open(&wavs[0]).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.sample_rate, SAMPLE_RATE as u32);
        assert_eq!(spec.bits_per_sample, 16);

        let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(samples, vec![42; FRAME_SIZE]);
    }
}
