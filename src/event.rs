//! Runtime events for monitoring transport health.
//!
//! Events are non-fatal notifications. The event channel keeps reconnecting
//! and the audio bridge keeps playing after any of these are emitted -
//! they're for logging/metrics, not error handling.

use std::sync::Arc;
use std::time::Duration;

use crate::events::Category;

/// Runtime events emitted by the event channel and the audio bridge.
///
/// These are informational, not errors. Register a [`RelayCallback`] to log
/// them or feed metrics.
#[derive(Debug, Clone)]
pub enum RelayEvent {
    /// A category's connection entered backoff and will retry.
    Reconnecting {
        /// The affected category.
        category: Category,
        /// How long until the next attempt (jitter included).
        delay: Duration,
        /// Why the previous attempt ended.
        reason: String,
    },

    /// A category's connection completed its handshake and is streaming.
    ChannelOpened {
        /// The connected category.
        category: Category,
    },

    /// A category's connection was stopped (last subscriber cancelled).
    ChannelClosed {
        /// The stopped category.
        category: Category,
    },

    /// The playback ring buffer rejected an inbound frame.
    ///
    /// The frame is dropped whole; already-buffered audio is untouched and
    /// playback continues uninterrupted.
    BufferOverflow {
        /// Samples in the rejected frame.
        dropped_samples: usize,
    },

    /// The playback ring buffer crossed its pressure threshold.
    ///
    /// Emitted before any data is lost, once fill exceeds 80% of capacity.
    BufferPressure {
        /// Samples currently buffered.
        fill: usize,
        /// Ring buffer capacity in samples.
        capacity: usize,
    },

    /// The bridge session ended (explicit disconnect or network close).
    BridgeClosed {
        /// Why the session ended.
        reason: String,
    },
}

/// Callback type for receiving runtime events.
///
/// Both [`EventMultiplexer`](crate::EventMultiplexer) and
/// [`AudioBridge`](crate::AudioBridge) accept one of these at construction.
///
/// # Example
///
/// ```
/// use stream_relay::{relay_callback, RelayEvent};
///
/// let callback = relay_callback(|event| {
///     tracing::warn!(?event, "relay event");
/// });
/// callback(RelayEvent::BufferOverflow { dropped_samples: 2400 });
/// ```
pub type RelayCallback = Arc<dyn Fn(RelayEvent) + Send + Sync>;

/// Creates a [`RelayCallback`] from a closure without manual `Arc` wrapping.
pub fn relay_callback<F>(f: F) -> RelayCallback
where
    F: Fn(RelayEvent) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Emits an event through an optional callback.
pub(crate) fn emit(callback: Option<&RelayCallback>, event: RelayEvent) {
    if let Some(callback) = callback {
        callback(event);
    }
}
