//! Reconnecting event connection: one long-lived stream per category.
//!
//! Drives the state machine
//! `Idle -> Connecting -> Streaming -> BackingOff -> Connecting -> ...`
//! with `Stopped` reachable from any state through the cancellation token.
//! Every transient failure (rejected handshake, I/O error, end-of-stream) is
//! absorbed here; subscribers only ever see decoded payloads.

use std::sync::Arc;

use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::backoff::Backoff;
use crate::event::{emit, RelayCallback, RelayEvent};
use crate::events::router::route;
use crate::events::sse::EventSource;
use crate::events::wire::{Category, EventPayload};

/// Delivery function invoked for each decoded payload of this connection's
/// category.
pub(crate) type DeliverFn = Arc<dyn Fn(&EventPayload) + Send + Sync>;

/// Attempt state, for lifecycle logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnectionState {
    Connecting,
    Streaming,
    BackingOff,
}

/// One category's physical connection. Runs until cancelled.
pub(crate) struct EventConnection {
    category: Category,
    source: Arc<dyn EventSource>,
    backoff: Backoff,
    deliver: DeliverFn,
    callback: Option<RelayCallback>,
    cancel: CancellationToken,
}

impl EventConnection {
    pub(crate) fn new(
        category: Category,
        source: Arc<dyn EventSource>,
        backoff: Backoff,
        deliver: DeliverFn,
        callback: Option<RelayCallback>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            category,
            source,
            backoff,
            deliver,
            callback,
            cancel,
        }
    }

    fn transition(&self, state: ConnectionState) {
        tracing::debug!(category = ?self.category, ?state, "event connection");
    }

    /// Runs the connect/stream/backoff loop until the token is cancelled.
    ///
    /// Cancellation wins every await point, including the backoff sleep:
    /// stopping a connection asleep in backoff wakes and aborts it
    /// immediately.
    pub(crate) async fn run(mut self) {
        loop {
            if self.cancel.is_cancelled() {
                return;
            }

            self.transition(ConnectionState::Connecting);
            let opened = tokio::select! {
                () = self.cancel.cancelled() => return,
                opened = self.source.open() => opened,
            };

            let reason = match opened {
                Ok(stream) => {
                    // Successful handshake resets the policy.
                    self.backoff.reset();
                    self.transition(ConnectionState::Streaming);
                    emit(
                        self.callback.as_ref(),
                        RelayEvent::ChannelOpened {
                            category: self.category,
                        },
                    );
                    match self.stream(stream).await {
                        Some(reason) => reason,
                        None => return, // cancelled mid-stream
                    }
                }
                Err(err) => err.to_string(),
            };

            self.transition(ConnectionState::BackingOff);
            if !self.back_off(reason).await {
                return;
            }
        }
    }

    /// Consumes the stream until it ends or errors.
    ///
    /// Returns the failure reason, or `None` if cancelled.
    async fn stream(&mut self, mut stream: crate::events::sse::EnvelopeStream) -> Option<String> {
        loop {
            let item = tokio::select! {
                () = self.cancel.cancelled() => return None,
                item = stream.next() => item,
            };

            match item {
                Some(Ok(raw)) => {
                    if let Some(payload) = route(&raw) {
                        // Any successfully decoded message means the link is
                        // healthy enough to forget past failures.
                        self.backoff.reset();
                        if payload.category() == self.category {
                            (self.deliver)(&payload);
                        }
                    }
                }
                Some(Err(err)) => return Some(err.to_string()),
                None => return Some("stream ended".to_owned()),
            }
        }
    }

    /// Sleeps out one backoff delay. Returns `false` if cancelled first.
    async fn back_off(&mut self, reason: String) -> bool {
        let delay = self.backoff.next();
        tracing::debug!(category = ?self.category, ?delay, reason, "reconnecting after delay");
        emit(
            self.callback.as_ref(),
            RelayEvent::Reconnecting {
                category: self.category,
                delay,
                reason,
            },
        );

        tokio::select! {
            () = self.cancel.cancelled() => false,
            () = tokio::time::sleep(delay) => true,
        }
    }
}
