//! Configuration types for the event channel and the audio bridge.

use std::time::Duration;

/// Configuration for the real-time audio data plane.
///
/// The capture and playback rates are wire constants: they must match the
/// server's expected input format and its synthesis output format exactly.
/// The bridge refuses to run at any other rate rather than resampling.
///
/// # Example
///
/// ```
/// use stream_relay::AudioConfig;
///
/// let config = AudioConfig::default();
/// assert_eq!(config.frame_samples(), 1600); // 100ms at 16kHz
/// ```
#[derive(Debug, Clone)]
pub struct AudioConfig {
    /// Microphone capture rate in Hz. Default: 16000 (mono).
    pub capture_rate: u32,

    /// Server audio playback rate in Hz. Default: 24000 (mono).
    pub playback_rate: u32,

    /// Duration of each outbound capture frame.
    ///
    /// Determines the fixed sample count per frame at the capture rate.
    /// Default: 100ms (1600 samples, 3200 bytes on the wire).
    pub frame_duration: Duration,

    /// Amount of inbound audio the playback ring buffer can hold.
    ///
    /// This buffer absorbs network jitter. Frames that would overflow it
    /// are dropped whole and reported via
    /// [`RelayEvent::BufferOverflow`](crate::RelayEvent::BufferOverflow).
    /// Default: 2 seconds
    pub buffer_duration: Duration,

    /// Amount of raw capture audio buffered between the device callback
    /// and the framing task. Default: 2 seconds
    pub capture_buffer_duration: Duration,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            capture_rate: 16_000,
            playback_rate: 24_000,
            frame_duration: Duration::from_millis(100),
            buffer_duration: Duration::from_secs(2),
            capture_buffer_duration: Duration::from_secs(2),
        }
    }
}

impl AudioConfig {
    /// Number of samples in one outbound capture frame.
    #[must_use]
    pub fn frame_samples(&self) -> usize {
        (f64::from(self.capture_rate) * self.frame_duration.as_secs_f64()) as usize
    }

    /// Capacity of the playback ring buffer in samples.
    #[must_use]
    pub fn playback_capacity(&self) -> usize {
        (f64::from(self.playback_rate) * self.buffer_duration.as_secs_f64()) as usize
    }

    /// Capacity of the capture ring buffer in samples.
    #[must_use]
    pub fn capture_capacity(&self) -> usize {
        (f64::from(self.capture_rate) * self.capture_buffer_duration.as_secs_f64()) as usize
    }
}

/// Configuration for the reconnecting event channel.
#[derive(Debug, Clone)]
pub struct EventConfig {
    /// Initial (and post-reset) reconnection delay. Default: 500ms
    pub min_delay: Duration,

    /// Upper bound for the reconnection delay. Default: 30 seconds
    pub max_delay: Duration,

    /// Jitter bound added to each emitted delay, drawn uniformly from
    /// `[0, jitter)`. Default: 250ms
    pub jitter: Duration,
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            min_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            jitter: Duration::from_millis(250),
        }
    }
}
