/// NATS JetStream reader for governance change events
///
/// Reads bounded batches from the change-event stream starting at a given
/// sequence. Each fetch uses a short-lived ephemeral pull consumer, so the
/// read position lives entirely in the offset tracker, never in the broker.

use std::fmt;
use std::time::Duration;

use async_nats::jetstream::{self, consumer::AckPolicy, consumer::DeliverPolicy};
use async_trait::async_trait;
use futures::StreamExt;

use crate::nats::message_envelope::RawMessage;
use crate::nats::stream::{MessageStream, StreamCursor};

/// Error type for stream retrieval
#[derive(Debug)]
pub enum StreamError {
    Connect(async_nats::Error),
    Fetch(async_nats::Error),
    /// The cursor points at a position the stream no longer retains
    InvalidCursor(String),
    Decode(String),
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamError::Connect(e) => write!(f, "Failed to connect to stream: {}", e),
            StreamError::Fetch(e) => write!(f, "Failed to fetch messages: {}", e),
            StreamError::InvalidCursor(msg) => write!(f, "Invalid stream cursor: {}", msg),
            StreamError::Decode(msg) => write!(f, "Cannot decode stream message: {}", msg),
        }
    }
}

impl std::error::Error for StreamError {}

impl StreamError {
    pub fn is_invalid_cursor(&self) -> bool {
        matches!(self, StreamError::InvalidCursor(_))
    }
}

#[derive(Clone)]
pub struct NatsConfig {
    pub url: String,
    pub stream_name: String,
    /// Subject filter for change events
    pub subject: String,
    pub max_age: Duration,
    pub max_bytes: i64,
    /// Upper bound on the wait for one fetch
    pub fetch_timeout: Duration,
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            url: std::env::var("NATS_URL")
                .unwrap_or_else(|_| "nats://localhost:4222".to_string()),
            stream_name: std::env::var("NATS_STREAM")
                .unwrap_or_else(|_| "GOVERNANCE_EVENTS".to_string()),
            subject: "governance.events.>".to_string(),
            max_age: Duration::from_secs(7 * 24 * 60 * 60), // 7 days
            max_bytes: 1024 * 1024 * 1024, // 1GB
            fetch_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Clone)]
pub struct JetStreamReader {
    client: async_nats::Client,
    jetstream: jetstream::Context,
    config: NatsConfig,
}

impl JetStreamReader {
    /// Connect to NATS and make sure the change-event stream exists
    pub async fn connect(config: NatsConfig) -> Result<Self, StreamError> {
        let client = async_nats::connect(&config.url)
            .await
            .map_err(|e| StreamError::Connect(e.into()))?;
        tracing::info!("Connected to NATS at {}", config.url);

        let jetstream = jetstream::new(client.clone());

        jetstream
            .get_or_create_stream(jetstream::stream::Config {
                name: config.stream_name.clone(),
                subjects: vec![config.subject.clone()],
                max_age: config.max_age,
                max_bytes: config.max_bytes,
                storage: jetstream::stream::StorageType::File,
                num_replicas: 1,
                ..Default::default()
            })
            .await
            .map_err(|e| StreamError::Connect(e.into()))?;

        tracing::info!("JetStream stream '{}' ready", config.stream_name);

        Ok(Self {
            client,
            jetstream,
            config,
        })
    }

    /// Check if the NATS connection is active
    pub fn is_connected(&self) -> bool {
        self.client.connection_state() == async_nats::connection::State::Connected
    }

    fn deliver_policy(cursor: StreamCursor) -> DeliverPolicy {
        match cursor {
            StreamCursor::Earliest => DeliverPolicy::All,
            StreamCursor::At(start_sequence) => DeliverPolicy::ByStartSequence { start_sequence },
        }
    }
}

#[async_trait]
impl MessageStream for JetStreamReader {
    async fn get_messages_since(
        &self,
        cursor: StreamCursor,
        limit: usize,
    ) -> Result<Vec<RawMessage>, StreamError> {
        let mut stream = self
            .jetstream
            .get_stream(&self.config.stream_name)
            .await
            .map_err(|e| StreamError::Fetch(e.into()))?;

        let info = stream.info().await.map_err(|e| StreamError::Fetch(e.into()))?;
        let state = &info.state;
        if let StreamCursor::At(sequence) = cursor {
            if state.messages > 0 && sequence < state.first_sequence {
                return Err(StreamError::InvalidCursor(format!(
                    "sequence {} is below the first retained sequence {}",
                    sequence, state.first_sequence
                )));
            }
            if sequence > state.last_sequence {
                tracing::debug!("Cursor {} is past the stream tail, nothing to read", sequence);
                return Ok(Vec::new());
            }
        }

        let consumer = stream
            .create_consumer(jetstream::consumer::pull::Config {
                deliver_policy: Self::deliver_policy(cursor),
                ack_policy: AckPolicy::None,
                filter_subject: self.config.subject.clone(),
                ..Default::default()
            })
            .await
            .map_err(|e| StreamError::Fetch(e.into()))?;

        let mut messages = consumer
            .fetch()
            .max_messages(limit)
            .expires(self.config.fetch_timeout)
            .messages()
            .await
            .map_err(|e| StreamError::Fetch(e.into()))?;

        let mut batch = Vec::with_capacity(limit);
        while let Some(msg) = messages.next().await {
            let msg = msg.map_err(|e| StreamError::Fetch(e.into()))?;
            let sequence = msg
                .info()
                .map(|info| info.stream_sequence)
                .map_err(|e| StreamError::Decode(e.to_string()))?;
            batch.push(RawMessage::new(sequence, msg.payload.to_vec()));
        }

        tracing::debug!(
            "Fetched {} messages from '{}' starting at {}",
            batch.len(),
            self.config.stream_name,
            cursor
        );
        Ok(batch)
    }
}
