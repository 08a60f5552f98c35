//! Resilient transport data plane: a reconnecting event channel and a
//! real-time full-duplex audio bridge.
//!
//! # Features
//!
//! - **Event multiplexer**: one logical server-sent-event endpoint fanned
//!   out into per-category subscriptions with reference-counted connection
//!   lifecycle and exponential backoff with jitter
//! - **Audio bridge**: microphone capture framed into fixed-size 16-bit PCM
//!   and streamed over a binary connection, inbound audio buffered through
//!   a jitter-absorbing ring into the output device
//! - **Fail-closed audio**: exact sample rates or no session; encrypted
//!   endpoints or loopback only
//! - **Hardware-free testing**: [`events::EventSource`], [`AudioBackend`]
//!   and [`FrameConnector`] seams accept mock implementations
//!
//! # Architecture
//!
//! ```text
//! events:  SSE endpoint --> reconnect loop --> router --> subscriptions
//! capture: mic callback --> SPSC ring --> framing task --> binary socket
//! playback: binary socket --> decoder --> SPSC ring --> device callback
//! ```
//!
//! Device callbacks never block and never allocate: they exchange samples
//! with the async side exclusively through lock-free SPSC rings.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use stream_relay::{
//!     relay_callback, AudioBridge, AudioConfig, Category, CpalBackend,
//!     EventConfig, EventMultiplexer, WsConnector,
//! };
//!
//! # async fn demo() -> Result<(), stream_relay::BridgeError> {
//! let callback = relay_callback(|event| tracing::info!(?event, "relay"));
//!
//! let mux = EventMultiplexer::sse(
//!     "https://localhost:8080/api/events",
//!     None,
//!     EventConfig::default(),
//!     Some(callback.clone()),
//! );
//! let _logs = mux.subscribe(Category::Log, |payload| {
//!     tracing::info!(?payload, "server log");
//! });
//!
//! let bridge = AudioBridge::new(
//!     "wss://localhost:8080/api/voice",
//!     AudioConfig::default(),
//!     Arc::new(CpalBackend::new()),
//!     Arc::new(WsConnector::new()),
//!     Some(callback),
//! );
//! bridge.connect().await?;
//! # Ok(())
//! # }
//! ```

pub mod audio;
mod backoff;
mod config;
mod error;
mod event;
pub mod events;

pub use audio::{
    AudioBackend, AudioBridge, BridgeStats, CpalBackend, FrameConnector, FrameSink, FrameSource,
    PushOutcome, SampleReader, StreamHandle, WsConnector,
};
pub use backoff::Backoff;
pub use config::{AudioConfig, EventConfig};
pub use error::{BridgeError, StreamError, TransportError};
pub use event::{relay_callback, RelayCallback, RelayEvent};
pub use events::{
    Category, DownloadEvent, DownloadStatus, DownloadSummary, EventHandler, EventMultiplexer,
    EventPayload, LogEvent, OverallHealth, ServerEntry, ServerHealthStatus, ServerStateEvent,
    ShardInfo, Subscription, VerificationEvent,
};
