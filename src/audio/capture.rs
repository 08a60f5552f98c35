//! Capture framing task.
//!
//! The device callback pushes raw samples into an SPSC ring; this task polls
//! the consumer side, assembles fixed-size frames, encodes them and sends
//! them over the transport in capture order. Polling at half the frame
//! period keeps worst-case added latency under one frame without spinning.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use ringbuf::traits::{Consumer, Observer};
use ringbuf::HeapCons;

use crate::audio::codec;
use crate::audio::transport::FrameSink;
use crate::TransportError;

pub(crate) struct CapturePipeline {
    consumer: HeapCons<f32>,
    frame_samples: usize,
    poll_interval: Duration,
    running: Arc<AtomicBool>,
    frames_sent: Arc<AtomicU64>,
}

impl CapturePipeline {
    pub(crate) fn new(
        consumer: HeapCons<f32>,
        frame_samples: usize,
        frame_duration: Duration,
        running: Arc<AtomicBool>,
        frames_sent: Arc<AtomicU64>,
    ) -> Self {
        Self {
            consumer,
            frame_samples,
            poll_interval: frame_duration / 2,
            running,
            frames_sent,
        }
    }

    /// Drains the ring into fixed-size frames until stopped.
    ///
    /// A trailing partial frame at shutdown is discarded; the wire only ever
    /// carries whole frames. The scratch buffer is reused across frames and
    /// each handoff to the sink is a freshly owned encoding, so sent bytes
    /// are never aliased by later capture.
    ///
    /// # Errors
    ///
    /// Returns the send failure that ended the pipeline; the caller owes the
    /// session a teardown in that case.
    pub(crate) async fn run(
        mut self,
        mut sink: Box<dyn FrameSink>,
    ) -> Result<(), TransportError> {
        let mut scratch = vec![0.0f32; self.frame_samples];
        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        while self.running.load(Ordering::SeqCst) {
            interval.tick().await;

            while self.consumer.occupied_len() >= self.frame_samples {
                let popped = self.consumer.pop_slice(&mut scratch);
                debug_assert_eq!(popped, self.frame_samples);

                let frame = Bytes::from(codec::encode_frame(&scratch));
                if let Err(e) = sink.send(frame).await {
                    tracing::debug!("capture send failed, stopping: {e}");
                    self.running.store(false, Ordering::SeqCst);
                    return Err(e);
                }
                self.frames_sent.fetch_add(1, Ordering::Relaxed);
            }
        }

        if let Err(e) = sink.close().await {
            tracing::debug!("capture sink close failed: {e}");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use ringbuf::traits::{Producer, Split};
    use ringbuf::HeapRb;

    struct RecordingSink {
        frames: Arc<Mutex<Vec<Bytes>>>,
        closed: Arc<AtomicBool>,
    }

    #[async_trait]
    impl FrameSink for RecordingSink {
        async fn send(&mut self, frame: Bytes) -> Result<(), TransportError> {
            self.frames.lock().push(frame);
            Ok(())
        }

        async fn close(&mut self) -> Result<(), TransportError> {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_frames_are_fixed_size_and_in_order() {
        let ring = HeapRb::<f32>::new(64);
        let (mut producer, consumer) = ring.split();

        // Two and a half frames of a ramp.
        let samples: Vec<f32> = (0..20).map(|i| i as f32 / 100.0).collect();
        producer.push_slice(&samples);

        let running = Arc::new(AtomicBool::new(true));
        let frames_sent = Arc::new(AtomicU64::new(0));
        let pipeline = CapturePipeline::new(
            consumer,
            8,
            Duration::from_millis(100),
            running.clone(),
            frames_sent.clone(),
        );

        let frames = Arc::new(Mutex::new(Vec::new()));
        let closed = Arc::new(AtomicBool::new(false));
        let sink = Box::new(RecordingSink {
            frames: frames.clone(),
            closed: closed.clone(),
        });

        let task = tokio::spawn(pipeline.run(sink));
        tokio::time::sleep(Duration::from_millis(500)).await;
        running.store(false, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(200)).await;
        task.await.unwrap().unwrap();

        let frames = frames.lock();
        assert_eq!(frames.len(), 2, "partial trailing frame must be dropped");
        assert_eq!(frames_sent.load(Ordering::SeqCst), 2);
        assert!(frames.iter().all(|f| f.len() == 16), "8 samples x 2 bytes");
        assert!(closed.load(Ordering::SeqCst), "sink closed at shutdown");

        // First frame decodes back to the start of the ramp, in order.
        let decoded = codec::decode_frame(&frames[0]).unwrap();
        for (i, sample) in decoded.iter().enumerate() {
            assert!((sample - i as f32 / 100.0).abs() < 1.0 / 32_767.0);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_failure_stops_pipeline() {
        struct FailingSink;
        #[async_trait]
        impl FrameSink for FailingSink {
            async fn send(&mut self, _frame: Bytes) -> Result<(), TransportError> {
                Err(TransportError::Closed)
            }
            async fn close(&mut self) -> Result<(), TransportError> {
                Ok(())
            }
        }

        let ring = HeapRb::<f32>::new(64);
        let (mut producer, consumer) = ring.split();
        producer.push_slice(&[0.0; 16]);

        let running = Arc::new(AtomicBool::new(true));
        let pipeline = CapturePipeline::new(
            consumer,
            8,
            Duration::from_millis(100),
            running.clone(),
            Arc::new(AtomicU64::new(0)),
        );

        let task = tokio::spawn(pipeline.run(Box::new(FailingSink)));
        tokio::time::sleep(Duration::from_millis(500)).await;
        let result = task.await.unwrap();
        assert!(matches!(result, Err(TransportError::Closed)));
        assert!(!running.load(Ordering::SeqCst));
    }
}
