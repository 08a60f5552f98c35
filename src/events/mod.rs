//! Reconnecting event multiplexer: one logical endpoint, per-category
//! subscriptions with reference-counted connection lifecycle.

mod connection;
mod registry;
mod router;
mod sse;
mod wire;

pub use registry::{EventHandler, EventMultiplexer, Subscription};
pub use router::route;
pub use sse::{EnvelopeStream, EventSource, SseParser, SseSource};
pub use wire::{
    Category, DownloadEvent, DownloadStatus, DownloadSummary, EventPayload, LogEvent,
    OverallHealth, ServerEntry, ServerHealthStatus, ServerStateEvent, ShardInfo,
    VerificationEvent,
};
