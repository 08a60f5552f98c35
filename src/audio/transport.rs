//! Binary frame transport.
//!
//! The bridge speaks fixed-size binary frames over a full-duplex connection.
//! [`FrameConnector`] abstracts the dial so tests can substitute in-memory
//! channels; the production implementation is a WebSocket client sending and
//! receiving binary messages only.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::{BridgeError, TransportError};

/// Outbound half: encoded capture frames go here, in order.
#[async_trait]
pub trait FrameSink: Send {
    /// Sends one binary frame.
    ///
    /// # Errors
    ///
    /// Fails once the connection is closed or broken.
    async fn send(&mut self, frame: Bytes) -> Result<(), TransportError>;

    /// Closes the outbound half. Idempotent best-effort.
    ///
    /// # Errors
    ///
    /// Fails if the close handshake cannot be sent.
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Inbound half: one binary frame per `next_frame`, `None` once closed.
#[async_trait]
pub trait FrameSource: Send {
    async fn next_frame(&mut self) -> Option<Bytes>;
}

/// Dials the remote endpoint, producing the two transport halves.
#[async_trait]
pub trait FrameConnector: Send + Sync {
    /// Establishes the connection.
    ///
    /// # Errors
    ///
    /// Fails if the endpoint is unreachable or rejects the handshake.
    async fn connect(
        &self,
        url: &str,
    ) -> Result<(Box<dyn FrameSink>, Box<dyn FrameSource>), BridgeError>;
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Production WebSocket connector.
#[derive(Debug, Default)]
pub struct WsConnector;

impl WsConnector {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl FrameConnector for WsConnector {
    async fn connect(
        &self,
        url: &str,
    ) -> Result<(Box<dyn FrameSink>, Box<dyn FrameSource>), BridgeError> {
        let (ws, _response) =
            connect_async(url)
                .await
                .map_err(|e| BridgeError::TransportFailed {
                    reason: e.to_string(),
                })?;
        tracing::debug!(url, "audio transport connected");

        let (sink, stream) = ws.split();
        Ok((Box::new(WsSink { sink }), Box::new(WsSource { stream })))
    }
}

struct WsSink {
    sink: SplitSink<WsStream, Message>,
}

#[async_trait]
impl FrameSink for WsSink {
    async fn send(&mut self, frame: Bytes) -> Result<(), TransportError> {
        self.sink
            .send(Message::Binary(frame.to_vec()))
            .await
            .map_err(|e| TransportError::Io(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.sink
            .send(Message::Close(None))
            .await
            .map_err(|e| TransportError::Io(e.to_string()))
    }
}

struct WsSource {
    stream: SplitStream<WsStream>,
}

#[async_trait]
impl FrameSource for WsSource {
    async fn next_frame(&mut self) -> Option<Bytes> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Binary(data))) => return Some(Bytes::from(data)),
                // Control frames and stray text are not audio.
                Some(Ok(Message::Close(_))) | None => return None,
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    tracing::debug!("audio transport read failed: {e}");
                    return None;
                }
            }
        }
    }
}
