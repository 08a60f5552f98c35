//! Error types for stream-relay.
//!
//! Errors are split into two categories:
//! - **Fatal errors** ([`BridgeError`]): reject the current `connect()` call
//! - **Recoverable conditions**: transient connectivity, buffer overflow and
//!   contract drift are handled internally and surfaced via
//!   [`RelayCallback`](crate::RelayCallback), never as errors

/// Fatal errors that prevent an audio bridge session from starting.
///
/// These are capability/environment failures: they reject the `connect()`
/// call that observed them and nothing else. The event channel is unaffected,
/// and a later `connect()` may succeed (for example after the user grants
/// microphone access).
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// The endpoint does not use a secure scheme and is not loopback.
    #[error("insecure endpoint: {url} (use wss:// or connect to loopback)")]
    InsecureEndpoint {
        /// The rejected endpoint URL.
        url: String,
    },

    /// The platform cannot run the bridge at all (no audio host, missing
    /// device APIs). Detected by the backend probe without touching devices.
    #[error("audio bridge unsupported: {reason}")]
    Unsupported {
        /// Why the platform cannot run the bridge.
        reason: String,
    },

    /// No default input device is configured on this system.
    #[error("no default input device configured")]
    NoInputDevice,

    /// No default output device is configured on this system.
    #[error("no default output device configured")]
    NoOutputDevice,

    /// The device cannot capture or render at the exact required rate.
    ///
    /// The bridge fails closed here: running at a silently-substituted rate
    /// would corrupt perceived pitch and degrade recognition accuracy.
    #[error("sample rate {requested}Hz not supported (available: {available:?})")]
    UnsupportedSampleRate {
        /// The rate the wire format requires.
        requested: u32,
        /// Rates the device reports supporting.
        available: Vec<u32>,
    },

    /// The device produces a sample format the bridge cannot consume.
    #[error("unsupported sample format: {format}")]
    UnsupportedFormat {
        /// The format that wasn't supported.
        format: String,
    },

    /// The binary connection handshake failed.
    #[error("transport connect failed: {reason}")]
    TransportFailed {
        /// Description of the handshake failure.
        reason: String,
    },

    /// An error from the underlying audio library (CPAL).
    #[error("audio backend error: {0}")]
    BackendError(String),
}

/// Errors on an established binary frame connection.
///
/// These end the current bridge session via the normal teardown path; they
/// are never surfaced as a rejected operation.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The peer closed the connection.
    #[error("connection closed")]
    Closed,

    /// An I/O error on the connection.
    #[error("transport I/O error: {0}")]
    Io(String),
}

/// Transient failures on the event channel.
///
/// Handled by the reconnect loop: every variant is recovered automatically
/// via backoff and never reaches a subscriber. Public only so alternative
/// [`EventSource`](crate::events::EventSource) implementations can produce
/// them.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// The server answered the handshake with a non-success status.
    #[error("handshake rejected with status {status}")]
    HandshakeRejected {
        /// HTTP status code of the rejection.
        status: u16,
    },

    /// Connection or read failure on the stream.
    #[error("stream I/O error: {0}")]
    Io(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bridge_error_display() {
        let err = BridgeError::UnsupportedSampleRate {
            requested: 16_000,
            available: vec![44_100, 48_000],
        };
        let msg = err.to_string();
        assert!(msg.contains("16000"));
        assert!(msg.contains("44100"));
    }

    #[test]
    fn test_insecure_endpoint_display() {
        let err = BridgeError::InsecureEndpoint {
            url: "ws://example.com/audio".to_string(),
        };
        assert!(err.to_string().contains("ws://example.com/audio"));
    }

    #[test]
    fn test_transport_error_display() {
        assert_eq!(TransportError::Closed.to_string(), "connection closed");
    }
}
