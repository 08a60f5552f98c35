//! Real-time audio data plane: capture, codec, ring buffer, transport and
//! the bridge that composes them.

mod backend;
mod bridge;
mod capture;
pub mod codec;
mod ring_buffer;
mod transport;

pub use backend::{AudioBackend, CpalBackend, StreamHandle};
pub use bridge::{AudioBridge, BridgeStats};
pub use ring_buffer::{playback_buffer, FrameWriter, PushOutcome, SampleReader};
pub use transport::{FrameConnector, FrameSink, FrameSource, WsConnector};
