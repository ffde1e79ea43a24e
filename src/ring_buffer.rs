/// Bounded ring of recent audio frames
///
/// Holds the most recent N seconds of audio as a fixed-capacity FIFO of
/// whole frames. Only the single consumer task mutates it, so the mutexed
/// producer/consumer halves are never contended.

use crate::frame::{AudioSample, Frame};
use cache_padded::CachePadded;
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::HeapRb;
use std::sync::Mutex;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum RingBufferError {
    #[error("invalid frame size: expected {expected} samples, got {actual}")]
    FrameSizeMismatch { expected: usize, actual: usize },

    #[error("invalid capacity: {0}")]
    InvalidCapacity(String),
}

type FrameRb = HeapRb<Frame>;
type RingProducer = <FrameRb as Split>::Prod;
type RingConsumer = <FrameRb as Split>::Cons;

/// Fixed-capacity FIFO of audio frames with oldest-first eviction.
pub struct RingBuffer {
    producer: CachePadded<Mutex<RingProducer>>,
    consumer: CachePadded<Mutex<RingConsumer>>,
    capacity_frames: usize,
    frame_size: usize,
    sample_rate: usize,
}

impl RingBuffer {
    /// Create a buffer holding `capacity_seconds` of audio.
    ///
    /// Capacity in frames is `(capacity_seconds * sample_rate) / frame_size`
    /// with integer division: a sub-frame remainder of the requested window
    /// is intentionally truncated, not rounded up.
    pub fn new(
        capacity_seconds: usize,
        sample_rate: usize,
        frame_size: usize,
    ) -> Result<Self, RingBufferError> {
        if frame_size == 0 {
            return Err(RingBufferError::InvalidCapacity(
                "frame_size must be greater than 0".to_string(),
            ));
        }

        let capacity_frames = capacity_seconds * sample_rate / frame_size;
        if capacity_frames == 0 {
            return Err(RingBufferError::InvalidCapacity(format!(
                "{} s at {} Hz holds no complete {}-sample frame",
                capacity_seconds, sample_rate, frame_size
            )));
        }

        debug!(
            "Creating ring buffer: {} frames ({} s at {} Hz)",
            capacity_frames, capacity_seconds, sample_rate
        );

        let rb = FrameRb::new(capacity_frames);
        let (producer, consumer) = rb.split();

        Ok(Self {
            producer: CachePadded::new(Mutex::new(producer)),
            consumer: CachePadded::new(Mutex::new(consumer)),
            capacity_frames,
            frame_size,
            sample_rate,
        })
    }

    /// Append a frame, evicting the single oldest frame when at capacity.
    ///
    /// The frame must be exactly `frame_size` samples long; anything else is
    /// rejected rather than coerced.
    pub fn extend(&mut self, frame: Frame) -> Result<(), RingBufferError> {
        if frame.len() != self.frame_size {
            return Err(RingBufferError::FrameSizeMismatch {
                expected: self.frame_size,
                actual: frame.len(),
            });
        }

        let mut producer = self.producer.lock().unwrap();

        if producer.vacant_len() == 0 {
            let mut consumer = self.consumer.lock().unwrap();
            consumer.skip(1);
            debug!("Ring full, evicted oldest frame");
        }

        let _ = producer.try_push(frame);
        Ok(())
    }

    /// Concatenate all buffered frames' samples in arrival order.
    ///
    /// Defined for empty and partially-filled buffers; returns whatever is
    /// present.
    pub fn get_all(&self) -> Vec<AudioSample> {
        let consumer = self.consumer.lock().unwrap();
        let mut samples = Vec::with_capacity(consumer.occupied_len() * self.frame_size);

        for frame in consumer.iter() {
            samples.extend_from_slice(frame);
        }

        samples
    }

    /// Number of frames currently buffered.
    pub fn len(&self) -> usize {
        let consumer = self.consumer.lock().unwrap();
        consumer.occupied_len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True iff the buffer holds exactly `capacity_frames` frames.
    pub fn is_full(&self) -> bool {
        self.len() == self.capacity_frames
    }

    pub fn capacity_frames(&self) -> usize {
        self.capacity_frames
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Duration of audio currently buffered, in seconds.
    pub fn duration_secs(&self) -> f32 {
        (self.len() * self.frame_size) as f32 / self.sample_rate as f32
    }
}
