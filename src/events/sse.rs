//! Server-sent-events source for the event channel.
//!
//! The production [`EventSource`]: one GET request per connection attempt
//! with bearer-token auth, yielding the `data:` payload of each server-sent
//! event. The incremental parser is a pure struct so the wire handling is
//! testable without a server.

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;

use crate::StreamError;

/// A stream of raw envelope strings, one per server-sent event.
pub type EnvelopeStream = BoxStream<'static, Result<String, StreamError>>;

/// Something that can open one attempt's worth of envelope stream.
///
/// The reconnect loop calls [`open`](Self::open) once per attempt; the
/// returned stream ending (or erroring) sends the loop into backoff. Mock
/// implementations drive the test suites.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Opens the stream, performing the handshake.
    async fn open(&self) -> Result<EnvelopeStream, StreamError>;
}

/// Incremental parser for the `text/event-stream` format.
///
/// Accumulates raw bytes, splits on newlines, collects `data:` lines and
/// dispatches one event per blank line. Comment lines (`:` prefix) and
/// fields other than `data` are ignored.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: Vec<u8>,
    data_lines: Vec<String>,
}

impl SseParser {
    /// Creates an empty parser.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a chunk of bytes, returning any events completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(newline) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim_end_matches(['\n', '\r']);

            if line.is_empty() {
                if !self.data_lines.is_empty() {
                    events.push(self.data_lines.join("\n"));
                    self.data_lines.clear();
                }
            } else if let Some(data) = line.strip_prefix("data:") {
                self.data_lines.push(data.trim_start().to_owned());
            }
            // Other fields (event:, id:, retry:) and comments are ignored.
        }
        events
    }
}

/// SSE-over-HTTP event source.
pub struct SseSource {
    client: reqwest::Client,
    url: String,
    bearer_token: Option<String>,
}

impl SseSource {
    /// Creates a source for the given endpoint.
    #[must_use]
    pub fn new(url: impl Into<String>, bearer_token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            bearer_token,
        }
    }
}

#[async_trait]
impl EventSource for SseSource {
    async fn open(&self) -> Result<EnvelopeStream, StreamError> {
        let mut request = self
            .client
            .get(&self.url)
            .header(reqwest::header::ACCEPT, "text/event-stream");
        if let Some(token) = &self.bearer_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| StreamError::Io(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(StreamError::HandshakeRejected {
                status: status.as_u16(),
            });
        }

        tracing::debug!(url = %self.url, "event stream connected");

        let mut parser = SseParser::new();
        let stream = response
            .bytes_stream()
            .map(move |chunk| match chunk {
                Ok(bytes) => Ok(parser.push(&bytes)),
                Err(e) => Err(StreamError::Io(e.to_string())),
            })
            .flat_map(|result| match result {
                Ok(events) => futures_util::stream::iter(
                    events.into_iter().map(Ok).collect::<Vec<_>>(),
                ),
                Err(e) => futures_util::stream::iter(vec![Err(e)]),
            });

        Ok(stream.boxed())
    }
}
