/// NATS JetStream integration module
///
/// Provides the change-event envelope, cursor-based stream retrieval and the
/// JetStream-backed reader

pub mod message_envelope;
pub mod client;
pub mod stream;

pub use message_envelope::{InvocationResponse, MessageHeaders, RawMessage, StreamMessage};
pub use client::{JetStreamReader, NatsConfig, StreamError};
pub use stream::{MemoryMessageStream, MessageStream, StreamCursor};
