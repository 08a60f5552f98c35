//! Audio device backends.
//!
//! `cpal::Stream` is `!Send` on some platforms, so the CPAL backend confines
//! each stream to a dedicated OS thread and hands back a `Send + Sync`
//! [`StreamHandle`]. That lets the bridge tear devices down from async
//! context (an incoming network close) as easily as from `disconnect()`.

use std::sync::mpsc;
use std::thread;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, SampleFormat, SampleRate, StreamConfig};
use ringbuf::traits::{Producer, Split};
use ringbuf::{HeapCons, HeapRb};

use crate::audio::codec;
use crate::audio::ring_buffer::SampleReader;
use crate::BridgeError;

/// Opens capture and playback devices at fixed rates.
///
/// Two production-shaped implementations exist behind this trait: the CPAL
/// backend here and, on desktop builds, a native-IPC sibling. Which one a
/// bridge uses is decided at composition time - business logic never
/// inspects the variant. Tests plug in counting mocks.
///
/// Capture must be raw: no echo cancellation, noise suppression or automatic
/// gain - downstream processing expects unmodified microphone samples.
pub trait AudioBackend: Send + Sync {
    /// Pure capability probe: no device is opened, no permission prompted.
    ///
    /// # Errors
    ///
    /// Returns why the platform cannot run the bridge.
    fn probe(&self) -> Result<(), BridgeError>;

    /// Opens the input device at exactly `sample_rate` Hz mono and starts
    /// capturing into an SPSC ring of `ring_capacity` samples.
    ///
    /// # Errors
    ///
    /// Fails closed if the device cannot honor the exact rate.
    fn start_capture(
        &self,
        sample_rate: u32,
        ring_capacity: usize,
    ) -> Result<(StreamHandle, HeapCons<f32>), BridgeError>;

    /// Opens the output device at exactly `sample_rate` Hz mono, draining
    /// `reader` each render quantum and writing silence for any shortfall.
    ///
    /// # Errors
    ///
    /// Fails closed if the device cannot honor the exact rate.
    fn start_playback(
        &self,
        sample_rate: u32,
        reader: SampleReader,
    ) -> Result<StreamHandle, BridgeError>;
}

/// `Send + Sync` handle to a running device stream.
///
/// The stream lives on its own thread; `stop()` (or drop) shuts the device
/// down, which also turns off any OS-level capture indicator.
pub struct StreamHandle {
    stop_tx: Option<mpsc::Sender<()>>,
    thread: Option<thread::JoinHandle<()>>,
}

impl StreamHandle {
    /// Wraps a stream thread that parks on `stop_tx`'s receiver.
    #[must_use]
    pub fn new(stop_tx: mpsc::Sender<()>, thread: thread::JoinHandle<()>) -> Self {
        Self {
            stop_tx: Some(stop_tx),
            thread: Some(thread),
        }
    }

    /// Handle with no backing thread, for backends that tie stream lifetime
    /// to something else.
    #[must_use]
    pub fn unmanaged() -> Self {
        Self {
            stop_tx: None,
            thread: None,
        }
    }

    /// Stops the stream and releases the device. Idempotent.
    pub fn stop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            // The thread exits when the channel yields or disconnects.
            let _ = stop_tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::warn!("audio stream thread panicked during shutdown");
            }
        }
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// CPAL-based production backend using the default host devices.
#[derive(Debug, Default)]
pub struct CpalBackend;

impl CpalBackend {
    /// Creates the backend. Cheap; no devices are touched.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Spawns the device-owning thread and waits for it to report readiness.
    fn spawn_stream_thread<F>(
        name: &str,
        build: F,
    ) -> Result<StreamHandle, BridgeError>
    where
        F: FnOnce() -> Result<cpal::Stream, BridgeError> + Send + 'static,
    {
        let (ready_tx, ready_rx) = mpsc::channel::<Result<(), BridgeError>>();
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let thread = thread::Builder::new()
            .name(name.to_owned())
            .spawn(move || match build() {
                Ok(stream) => {
                    let started = stream
                        .play()
                        .map_err(|e| BridgeError::BackendError(e.to_string()));
                    let ok = started.is_ok();
                    let _ = ready_tx.send(started);
                    if ok {
                        // Park until stopped; dropping the stream releases
                        // the device.
                        let _ = stop_rx.recv();
                    }
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                }
            })
            .map_err(|e| BridgeError::BackendError(format!("failed to spawn audio thread: {e}")))?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(StreamHandle::new(stop_tx, thread)),
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => Err(BridgeError::BackendError(
                "audio thread exited before reporting readiness".to_owned(),
            )),
        }
    }
}

/// Verifies the device supports exactly `rate` Hz, collecting the supported
/// rates for the error message when it doesn't.
fn validate_rate<I>(rate: u32, supported: I) -> Result<(), BridgeError>
where
    I: Iterator<Item = (u32, u32)>, // (min_rate, max_rate) per config range
{
    let mut available = Vec::new();
    for (min, max) in supported {
        if (min..=max).contains(&rate) {
            return Ok(());
        }
        available.push(max);
    }
    available.sort_unstable();
    available.dedup();
    Err(BridgeError::UnsupportedSampleRate {
        requested: rate,
        available,
    })
}

fn mono_config(rate: u32) -> StreamConfig {
    StreamConfig {
        channels: 1,
        sample_rate: SampleRate(rate),
        buffer_size: BufferSize::Default,
    }
}

impl AudioBackend for CpalBackend {
    fn probe(&self) -> Result<(), BridgeError> {
        let host = cpal::default_host();
        if host.default_input_device().is_none() {
            return Err(BridgeError::NoInputDevice);
        }
        if host.default_output_device().is_none() {
            return Err(BridgeError::NoOutputDevice);
        }
        Ok(())
    }

    fn start_capture(
        &self,
        sample_rate: u32,
        ring_capacity: usize,
    ) -> Result<(StreamHandle, HeapCons<f32>), BridgeError> {
        let ring = HeapRb::<f32>::new(ring_capacity);
        let (mut producer, consumer) = ring.split();

        let handle = Self::spawn_stream_thread("relay-capture", move || {
            let host = cpal::default_host();
            let device = host
                .default_input_device()
                .ok_or(BridgeError::NoInputDevice)?;

            let configs: Vec<_> = device
                .supported_input_configs()
                .map_err(|e| BridgeError::BackendError(e.to_string()))?
                .collect();
            validate_rate(
                sample_rate,
                configs
                    .iter()
                    .map(|c| (c.min_sample_rate().0, c.max_sample_rate().0)),
            )?;

            let sample_format = device
                .default_input_config()
                .map_err(|e| BridgeError::BackendError(e.to_string()))?
                .sample_format();
            let config = mono_config(sample_rate);

            let err_fn = |err| tracing::error!("capture stream error: {err}");
            let stream = match sample_format {
                SampleFormat::F32 => device
                    .build_input_stream(
                        &config,
                        move |data: &[f32], _: &cpal::InputCallbackInfo| {
                            // Non-blocking; drops samples if the framing
                            // task falls behind.
                            let _ = producer.push_slice(data);
                        },
                        err_fn,
                        None,
                    )
                    .map_err(|e| BridgeError::BackendError(e.to_string()))?,
                SampleFormat::I16 => device
                    .build_input_stream(
                        &config,
                        move |data: &[i16], _: &cpal::InputCallbackInfo| {
                            for &sample in data {
                                let _ = producer.try_push(codec::i16_to_sample(sample));
                            }
                        },
                        err_fn,
                        None,
                    )
                    .map_err(|e| BridgeError::BackendError(e.to_string()))?,
                format => {
                    return Err(BridgeError::UnsupportedFormat {
                        format: format!("{format:?}"),
                    });
                }
            };
            Ok(stream)
        })?;

        Ok((handle, consumer))
    }

    fn start_playback(
        &self,
        sample_rate: u32,
        mut reader: SampleReader,
    ) -> Result<StreamHandle, BridgeError> {
        Self::spawn_stream_thread("relay-playback", move || {
            let host = cpal::default_host();
            let device = host
                .default_output_device()
                .ok_or(BridgeError::NoOutputDevice)?;

            let configs: Vec<_> = device
                .supported_output_configs()
                .map_err(|e| BridgeError::BackendError(e.to_string()))?
                .collect();
            validate_rate(
                sample_rate,
                configs
                    .iter()
                    .map(|c| (c.min_sample_rate().0, c.max_sample_rate().0)),
            )?;

            let config = mono_config(sample_rate);
            device
                .build_output_stream(
                    &config,
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        // Drains what's buffered, zero-fills the rest; never
                        // blocks, never stalls on an empty buffer.
                        reader.fill(data);
                    },
                    |err| tracing::error!("playback stream error: {err}"),
                    None,
                )
                .map_err(|e| BridgeError::BackendError(e.to_string()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rate_accepts_in_range() {
        let supported = vec![(8_000u32, 48_000u32)];
        assert!(validate_rate(16_000, supported.into_iter()).is_ok());
    }

    #[test]
    fn test_validate_rate_rejects_out_of_range() {
        let supported = vec![(44_100u32, 44_100u32), (48_000, 48_000)];
        match validate_rate(16_000, supported.into_iter()) {
            Err(BridgeError::UnsupportedSampleRate {
                requested,
                available,
            }) => {
                assert_eq!(requested, 16_000);
                assert_eq!(available, vec![44_100, 48_000]);
            }
            other => panic!("expected rate error, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_rate_no_configs() {
        assert!(validate_rate(16_000, std::iter::empty()).is_err());
    }

    #[test]
    fn test_stream_handle_stops_parked_thread() {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let thread = thread::spawn(move || {
            let _ = stop_rx.recv();
        });
        let mut handle = StreamHandle::new(stop_tx, thread);
        handle.stop();
        handle.stop(); // idempotent
    }

    // Device tests require hardware and are skipped in CI.
    #[test]
    #[ignore = "requires audio hardware"]
    fn test_probe_real_host() {
        CpalBackend::new().probe().unwrap();
    }
}
