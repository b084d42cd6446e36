// Copyright 2025 Cowboy AI, LLC.

//! Message bus abstraction
//!
//! Two tiers of service: [`PubSub`] is fire-and-forget publish/subscribe,
//! [`PullBasedPubSub`] adds durable streams with acknowledgement-based pull
//! consumption. Payloads are opaque bytes; topics are dot-delimited and may
//! use the broker's wildcard tokens (`*` for one segment, `>` for a
//! suffix).

use async_trait::async_trait;
use bytes::Bytes;
use futures::future::BoxFuture;
use std::sync::Arc;
use thiserror::Error;

pub mod nats;

pub use nats::NatsPubSub;

/// Errors from the message bus client
#[derive(Debug, Error)]
pub enum PubSubError {
    /// Failed to establish the broker connection
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Publish was rejected or the broker is unreachable
    #[error("publish failed: {0}")]
    PublishFailed(String),

    /// Subscription could not be established
    #[error("subscribe failed: {0}")]
    SubscribeFailed(String),

    /// Stream setup failed
    #[error("stream error: {0}")]
    StreamError(String),

    /// Consumer setup failed
    #[error("consumer error: {0}")]
    ConsumerError(String),

    /// Malformed stream/consumer configuration
    #[error("configuration error: {0}")]
    ConfigurationError(String),

    /// The message carries no reply address
    #[error("message expects no reply")]
    NoReply,
}

/// Callback used to answer a request message
pub type Replier =
    Arc<dyn Fn(Bytes) -> BoxFuture<'static, Result<(), PubSubError>> + Send + Sync>;

/// A message delivered by the bus.
///
/// A message with a reply callback is a request expecting exactly one
/// reply payload.
#[derive(Clone)]
pub struct Message {
    /// Subject the message was published to
    pub topic: String,
    /// Raw payload
    pub data: Bytes,
    replier: Option<Replier>,
}

impl Message {
    /// Create a plain message with no reply channel
    pub fn new(topic: impl Into<String>, data: Bytes) -> Self {
        Self {
            topic: topic.into(),
            data,
            replier: None,
        }
    }

    /// Attach a reply callback, turning the message into a request
    pub fn with_replier(mut self, replier: Replier) -> Self {
        self.replier = Some(replier);
        self
    }

    /// Whether this message expects a reply
    pub fn expects_reply(&self) -> bool {
        self.replier.is_some()
    }

    /// Answer the request. Fails with [`PubSubError::NoReply`] when the
    /// message was not a request.
    pub async fn respond(&self, data: Bytes) -> Result<(), PubSubError> {
        match &self.replier {
            Some(replier) => replier(data).await,
            None => Err(PubSubError::NoReply),
        }
    }
}

impl std::fmt::Debug for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Message")
            .field("topic", &self.topic)
            .field("len", &self.data.len())
            .field("reply", &self.replier.is_some())
            .finish()
    }
}

/// Handler invoked for each delivered message.
///
/// For push subscriptions the returned error is logged and swallowed; for
/// pull subscriptions an error suppresses the acknowledgement, leaving the
/// message to the broker's redelivery policy.
pub type MessageHandler =
    Arc<dyn Fn(Message) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Build a [`MessageHandler`] from an async closure
pub fn handler<F, Fut>(f: F) -> MessageHandler
where
    F: Fn(Message) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(move |msg| Box::pin(f(msg)))
}

/// Unique key for an active pull subscription. At most one live fetch
/// loop may exist per key at any time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConsumerStream {
    /// Durable consumer name
    pub consumer: String,
    /// Stream the consumer is bound to
    pub stream: String,
}

/// Fire-and-forget publish/subscribe over a message broker
#[async_trait]
pub trait PubSub: Send + Sync {
    /// Publish a payload to a topic. At-most-once from the client's
    /// perspective; the broker may provide stronger guarantees.
    async fn publish(&self, topic: &str, data: Bytes) -> Result<(), PubSubError>;

    /// Register a push-style handler for a topic. The handler runs on the
    /// broker dispatch task; its errors are logged, never surfaced here.
    async fn subscribe(&self, topic: &str, handler: MessageHandler) -> Result<(), PubSubError>;

    /// Drain all subscriptions, then release the underlying connection.
    /// In-flight messages are not dropped.
    async fn close(&self) -> Result<(), PubSubError>;
}

/// Durable, acknowledgement-based consumption on top of [`PubSub`]
#[async_trait]
pub trait PullBasedPubSub: PubSub {
    /// Create or update a named durable stream. `config` is broker-level
    /// configuration, opaque to this layer.
    async fn add_stream(&self, name: &str, config: serde_json::Value)
        -> Result<(), PubSubError>;

    /// Create or update a named durable consumer bound to a stream
    async fn add_consumer(
        &self,
        name: &str,
        stream: &str,
        config: serde_json::Value,
    ) -> Result<(), PubSubError>;

    /// Start a cancellable background fetch loop for `(consumer, stream)`.
    /// Re-invoking with the same key cancels the prior loop before the new
    /// one starts, so duplicate concurrent consumption of one durable
    /// cursor is impossible.
    async fn pull_subscribe(
        &self,
        consumer: &str,
        stream: &str,
        handler: MessageHandler,
    ) -> Result<(), PubSubError>;
}
