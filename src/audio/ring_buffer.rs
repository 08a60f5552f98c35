//! Jitter-absorbing ring buffer between the network receiver and the
//! playback device callback.
//!
//! Exactly two parties touch the buffer: the network task writes whole
//! frames, the device callback drains samples. The split producer/consumer
//! halves of a lock-free SPSC ring give torn-free access without ever
//! blocking the callback.

use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};

/// Fill ratio above which a [`PushOutcome::Pressure`] warning is raised,
/// surfacing backpressure before any audio is lost.
const PRESSURE_THRESHOLD: f64 = 0.8;

/// Result of pushing one inbound frame into the playback buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// The whole frame was buffered.
    Accepted,
    /// The whole frame was buffered, and fill is now above the pressure
    /// threshold.
    Pressure {
        /// Samples buffered after the push.
        fill: usize,
        /// Buffer capacity in samples.
        capacity: usize,
    },
    /// The frame did not fit and was dropped whole; buffer state unchanged.
    Rejected {
        /// Samples in the rejected frame.
        dropped_samples: usize,
    },
}

/// Creates a playback buffer with the given capacity in samples.
///
/// Returns the writer (network side) and reader (device callback side).
#[must_use]
pub fn playback_buffer(capacity: usize) -> (FrameWriter, SampleReader) {
    let ring = HeapRb::<f32>::new(capacity);
    let (producer, consumer) = ring.split();
    (
        FrameWriter {
            producer,
            capacity,
        },
        SampleReader { consumer },
    )
}

/// Write half of the playback buffer. Owned by the network-receiving task.
pub struct FrameWriter {
    producer: HeapProd<f32>,
    capacity: usize,
}

impl FrameWriter {
    /// Pushes a decoded frame, all-or-nothing.
    ///
    /// A frame that would exceed capacity is rejected in full - no partial
    /// write, no eviction of already-buffered audio.
    pub fn push_frame(&mut self, samples: &[f32]) -> PushOutcome {
        // vacant_len can only grow concurrently (the consumer pops), so the
        // check-then-push below never partially writes.
        if self.producer.vacant_len() < samples.len() {
            return PushOutcome::Rejected {
                dropped_samples: samples.len(),
            };
        }
        self.producer.push_slice(samples);

        let fill = self.producer.occupied_len();
        if (fill as f64) > (self.capacity as f64) * PRESSURE_THRESHOLD {
            PushOutcome::Pressure {
                fill,
                capacity: self.capacity,
            }
        } else {
            PushOutcome::Accepted
        }
    }

    /// Samples currently buffered.
    #[must_use]
    pub fn fill(&self) -> usize {
        self.producer.occupied_len()
    }

    /// Buffer capacity in samples.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Read half of the playback buffer. Owned by the device render callback.
pub struct SampleReader {
    consumer: HeapCons<f32>,
}

impl SampleReader {
    /// Fills `out` with buffered samples, zero-filling any shortfall.
    ///
    /// Always writes every slot of `out`: an empty buffer yields pure
    /// silence of the requested length, never stale data. Returns the
    /// number of real samples delivered. Lock-free and allocation-free,
    /// safe inside the render callback.
    pub fn fill(&mut self, out: &mut [f32]) -> usize {
        let popped = self.consumer.pop_slice(out);
        out[popped..].fill(0.0);
        popped
    }

    /// Samples currently buffered.
    #[must_use]
    pub fn available(&self) -> usize {
        self.consumer.occupied_len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_within_capacity_succeeds() {
        let (mut writer, _reader) = playback_buffer(100);
        assert_eq!(writer.push_frame(&[0.1; 40]), PushOutcome::Accepted);
        assert_eq!(writer.push_frame(&[0.1; 40]), PushOutcome::Accepted);
        assert_eq!(writer.fill(), 80);
    }

    #[test]
    fn test_overflow_rejects_whole_frame() {
        let (mut writer, _reader) = playback_buffer(100);
        assert_eq!(writer.push_frame(&[0.5; 90]), PushOutcome::Accepted);

        let outcome = writer.push_frame(&[0.5; 20]);
        assert_eq!(outcome, PushOutcome::Rejected { dropped_samples: 20 });
        // Buffer state unchanged by the rejected push
        assert_eq!(writer.fill(), 90);
    }

    #[test]
    fn test_pressure_threshold() {
        let (mut writer, _reader) = playback_buffer(100);
        assert_eq!(writer.push_frame(&[0.0; 70]), PushOutcome::Accepted);
        match writer.push_frame(&[0.0; 20]) {
            PushOutcome::Pressure { fill, capacity } => {
                assert_eq!(fill, 90);
                assert_eq!(capacity, 100);
            }
            other => panic!("expected pressure warning, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_read_is_pure_silence() {
        let (_writer, mut reader) = playback_buffer(100);
        let mut out = [0.7f32; 32];
        let delivered = reader.fill(&mut out);
        assert_eq!(delivered, 0);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_shortfall_padded_with_silence() {
        let (mut writer, mut reader) = playback_buffer(100);
        writer.push_frame(&[0.5; 10]);

        let mut out = [0.9f32; 32];
        let delivered = reader.fill(&mut out);
        assert_eq!(delivered, 10);
        assert!(out[..10].iter().all(|&s| s == 0.5));
        assert!(out[10..].iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_samples_delivered_in_order() {
        let (mut writer, mut reader) = playback_buffer(16);
        writer.push_frame(&[1.0, 2.0, 3.0]);
        writer.push_frame(&[4.0, 5.0]);

        let mut out = [0.0f32; 5];
        reader.fill(&mut out);
        assert_eq!(out, [1.0, 2.0, 3.0, 4.0, 5.0]);
    }

    #[test]
    fn test_recovers_after_drain() {
        let (mut writer, mut reader) = playback_buffer(10);
        assert_eq!(writer.push_frame(&[0.1; 8]), PushOutcome::Pressure { fill: 8, capacity: 10 });
        assert_eq!(
            writer.push_frame(&[0.2; 4]),
            PushOutcome::Rejected { dropped_samples: 4 }
        );

        // Drain frees space, then the same frame fits.
        let mut out = [0.0f32; 8];
        reader.fill(&mut out);
        assert_eq!(writer.push_frame(&[0.2; 4]), PushOutcome::Accepted);
        assert_eq!(reader.available(), 4);
    }
}
