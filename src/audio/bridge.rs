//! Full-duplex audio bridge.
//!
//! One [`AudioBridge`] owns at most one live session: microphone capture
//! framed and sent over the transport, inbound frames decoded into the
//! playback ring. Teardown runs the same path whether the caller hangs up
//! or the network does, and both are idempotent.

use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::audio::backend::{AudioBackend, StreamHandle};
use crate::audio::capture::CapturePipeline;
use crate::audio::codec;
use crate::audio::ring_buffer::{playback_buffer, FrameWriter, PushOutcome};
use crate::audio::transport::{FrameConnector, FrameSource};
use crate::event::{emit, RelayCallback, RelayEvent};
use crate::{AudioConfig, BridgeError};

/// Counters for one bridge session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BridgeStats {
    /// Capture frames sent over the transport.
    pub frames_sent: u64,
    /// Inbound frames successfully decoded.
    pub frames_received: u64,
    /// Inbound frames dropped whole because the playback ring was full.
    pub frames_dropped: u64,
}

/// State shared between the bridge handle and its session tasks.
struct SessionShared {
    running: Arc<AtomicBool>,
    torn_down: AtomicBool,
    capture: Mutex<Option<StreamHandle>>,
    playback: Mutex<Option<StreamHandle>>,
    frames_sent: Arc<AtomicU64>,
    frames_received: AtomicU64,
    frames_dropped: AtomicU64,
    callback: Option<RelayCallback>,
}

impl SessionShared {
    /// Shuts the session down: stop producing frames, then release the
    /// capture device (OS indicator off), then the output device.
    ///
    /// Idempotent; safe to race between `disconnect` and a network close.
    fn teardown(&self, reason: &str) {
        if self.torn_down.swap(true, Ordering::SeqCst) {
            return;
        }
        self.running.store(false, Ordering::SeqCst);

        if let Some(mut handle) = self.capture.lock().take() {
            handle.stop();
        }
        if let Some(mut handle) = self.playback.lock().take() {
            handle.stop();
        }

        tracing::info!(reason, "audio bridge closed");
        emit(
            self.callback.as_ref(),
            RelayEvent::BridgeClosed {
                reason: reason.to_owned(),
            },
        );
    }
}

struct Session {
    shared: Arc<SessionShared>,
    send_task: JoinHandle<()>,
    recv_task: JoinHandle<()>,
}

/// Real-time microphone-to-server, server-to-speaker bridge.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use stream_relay::{AudioBridge, AudioConfig, CpalBackend, WsConnector};
///
/// # async fn demo() -> Result<(), stream_relay::BridgeError> {
/// let bridge = AudioBridge::new(
///     "wss://example.com/api/voice",
///     AudioConfig::default(),
///     Arc::new(CpalBackend::new()),
///     Arc::new(WsConnector::new()),
///     None,
/// );
/// bridge.connect().await?;
/// // ... conversation ...
/// bridge.disconnect().await;
/// # Ok(())
/// # }
/// ```
pub struct AudioBridge {
    url: String,
    audio: AudioConfig,
    backend: Arc<dyn AudioBackend>,
    connector: Arc<dyn FrameConnector>,
    callback: Option<RelayCallback>,
    session: tokio::sync::Mutex<Option<Session>>,
}

impl AudioBridge {
    /// Creates a bridge. No devices or sockets are touched until
    /// [`connect`](Self::connect).
    #[must_use]
    pub fn new(
        url: impl Into<String>,
        audio: AudioConfig,
        backend: Arc<dyn AudioBackend>,
        connector: Arc<dyn FrameConnector>,
        callback: Option<RelayCallback>,
    ) -> Self {
        Self {
            url: url.into(),
            audio,
            backend,
            connector,
            callback,
            session: tokio::sync::Mutex::new(None),
        }
    }

    /// Pure capability check: endpoint acceptable and devices present.
    ///
    /// Opens nothing and prompts for nothing, so it is safe to call from a
    /// UI deciding whether to show the voice control at all.
    #[must_use]
    pub fn is_supported(&self) -> bool {
        validate_endpoint(&self.url).is_ok() && self.backend.probe().is_ok()
    }

    /// Whether a session is currently live.
    pub async fn is_connected(&self) -> bool {
        self.session
            .lock()
            .await
            .as_ref()
            .is_some_and(|s| !s.shared.torn_down.load(Ordering::SeqCst))
    }

    /// Session counters; zeroes when no session has run.
    pub async fn stats(&self) -> BridgeStats {
        match self.session.lock().await.as_ref() {
            Some(session) => BridgeStats {
                frames_sent: session.shared.frames_sent.load(Ordering::Relaxed),
                frames_received: session.shared.frames_received.load(Ordering::Relaxed),
                frames_dropped: session.shared.frames_dropped.load(Ordering::Relaxed),
            },
            None => BridgeStats::default(),
        }
    }

    /// Establishes the session: validates the endpoint, opens playback and
    /// capture at their exact rates, dials the transport and starts the
    /// send and receive tasks.
    ///
    /// A no-op when a session is already live, so double-clicks and racing
    /// callers cannot open duplicate device or network resources.
    ///
    /// # Errors
    ///
    /// Fails closed without side effects left behind: any device or socket
    /// opened before the failing step is released on the way out.
    pub async fn connect(&self) -> Result<(), BridgeError> {
        let mut session = self.session.lock().await;
        if let Some(existing) = session.as_ref() {
            if !existing.shared.torn_down.load(Ordering::SeqCst) {
                tracing::debug!("bridge already connected, ignoring connect");
                return Ok(());
            }
            // Previous session ended from the network side; reap it.
            *session = None;
        }

        validate_endpoint(&self.url)?;
        self.backend.probe()?;

        let (sink, source) = self.connector.connect(&self.url).await?;

        // Output first so the first inbound frame is never dropped on the
        // floor; the RAII handles release devices if a later step fails.
        let (writer, reader) = playback_buffer(self.audio.playback_capacity());
        let playback = self
            .backend
            .start_playback(self.audio.playback_rate, reader)?;
        let (capture, consumer) = self
            .backend
            .start_capture(self.audio.capture_rate, self.audio.capture_capacity())?;

        let shared = Arc::new(SessionShared {
            running: Arc::new(AtomicBool::new(true)),
            torn_down: AtomicBool::new(false),
            capture: Mutex::new(Some(capture)),
            playback: Mutex::new(Some(playback)),
            frames_sent: Arc::new(AtomicU64::new(0)),
            frames_received: AtomicU64::new(0),
            frames_dropped: AtomicU64::new(0),
            callback: self.callback.clone(),
        });

        let pipeline = CapturePipeline::new(
            consumer,
            self.audio.frame_samples(),
            self.audio.frame_duration,
            Arc::clone(&shared.running),
            Arc::clone(&shared.frames_sent),
        );
        // A send failure ends the session the same way a remote close does.
        let send_task = tokio::spawn({
            let shared = Arc::clone(&shared);
            async move {
                if pipeline.run(sink).await.is_err() {
                    shared.teardown("transport send failed");
                }
            }
        });
        let recv_task = tokio::spawn(recv_loop(source, writer, Arc::clone(&shared)));

        tracing::info!(url = %self.url, "audio bridge connected");
        *session = Some(Session {
            shared,
            send_task,
            recv_task,
        });
        Ok(())
    }

    /// Hangs up. A no-op when nothing is connected.
    pub async fn disconnect(&self) {
        let Some(session) = self.session.lock().await.take() else {
            return;
        };
        session.shared.teardown("disconnect");

        // The send task notices the stopped flag within one poll interval
        // and closes the sink on its way out.
        let drain = tokio::time::timeout(self.audio.frame_duration * 2, session.send_task);
        if drain.await.is_err() {
            tracing::debug!("send task did not drain in time");
        }
        session.recv_task.abort();
    }
}

/// Receive loop: decode inbound frames into the playback ring until the
/// transport closes, then tear the whole session down.
async fn recv_loop(
    mut source: Box<dyn FrameSource>,
    mut writer: FrameWriter,
    shared: Arc<SessionShared>,
) {
    while shared.running.load(Ordering::SeqCst) {
        let Some(frame) = source.next_frame().await else {
            break;
        };
        let Some(samples) = codec::decode_frame(&frame) else {
            tracing::debug!(len = frame.len(), "dropping malformed audio frame");
            continue;
        };
        shared.frames_received.fetch_add(1, Ordering::Relaxed);

        match writer.push_frame(&samples) {
            PushOutcome::Accepted => {}
            PushOutcome::Pressure { fill, capacity } => {
                emit(
                    shared.callback.as_ref(),
                    RelayEvent::BufferPressure { fill, capacity },
                );
            }
            PushOutcome::Rejected { dropped_samples } => {
                shared.frames_dropped.fetch_add(1, Ordering::Relaxed);
                emit(
                    shared.callback.as_ref(),
                    RelayEvent::BufferOverflow { dropped_samples },
                );
            }
        }
    }
    shared.teardown("connection closed");
}

/// Accepts encrypted endpoints anywhere, plaintext only on loopback.
fn validate_endpoint(url: &str) -> Result<(), BridgeError> {
    let parsed = reqwest::Url::parse(url).map_err(|e| BridgeError::TransportFailed {
        reason: format!("invalid endpoint url: {e}"),
    })?;

    match parsed.scheme() {
        "wss" | "https" => Ok(()),
        "ws" | "http" => {
            let host = parsed.host_str().unwrap_or("");
            let host = host.trim_start_matches('[').trim_end_matches(']');
            let loopback = host == "localhost"
                || host
                    .parse::<IpAddr>()
                    .map_or(false, |ip| ip.is_loopback());
            if loopback {
                Ok(())
            } else {
                Err(BridgeError::InsecureEndpoint {
                    url: url.to_owned(),
                })
            }
        }
        _ => Err(BridgeError::InsecureEndpoint {
            url: url.to_owned(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_encrypted_anywhere() {
        assert!(validate_endpoint("wss://example.com/voice").is_ok());
        assert!(validate_endpoint("https://example.com/voice").is_ok());
    }

    #[test]
    fn test_endpoint_plaintext_loopback_only() {
        assert!(validate_endpoint("ws://localhost:8080/voice").is_ok());
        assert!(validate_endpoint("ws://127.0.0.1:8080/voice").is_ok());
        assert!(validate_endpoint("http://[::1]:8080/voice").is_ok());
        assert!(matches!(
            validate_endpoint("ws://example.com/voice"),
            Err(BridgeError::InsecureEndpoint { .. })
        ));
        assert!(matches!(
            validate_endpoint("http://10.0.0.5/voice"),
            Err(BridgeError::InsecureEndpoint { .. })
        ));
    }

    #[test]
    fn test_endpoint_unknown_scheme_rejected() {
        assert!(validate_endpoint("ftp://localhost/voice").is_err());
    }

    #[test]
    fn test_endpoint_garbage_rejected() {
        assert!(validate_endpoint("not a url").is_err());
    }
}
