// Copyright 2025 Cowboy AI, LLC.

//! NATS-backed message bus client
//!
//! Plain publish/subscribe runs over core NATS; durable streams and
//! acknowledgement-based pull consumption run over JetStream. Stream and
//! consumer configuration is passed through as raw JSON and deserialized
//! into the broker's own config types, so retention, ack and redelivery
//! policy stay broker-level concerns.

use async_nats::jetstream::{self, consumer::pull};
use async_nats::Client;
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use super::{ConsumerStream, Message, MessageHandler, PubSub, PubSubError, PullBasedPubSub, Replier};

/// Batch bound for one pull-fetch round trip
const FETCH_BATCH: usize = 100;

/// How long one fetch waits for messages before returning empty
const FETCH_EXPIRES: Duration = Duration::from_secs(1);

struct Subscription {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Message bus client over NATS with JetStream durability
pub struct NatsPubSub {
    client: Client,
    jetstream: jetstream::Context,
    subscriptions: Mutex<HashMap<String, Subscription>>,
    cancels: Mutex<HashMap<ConsumerStream, watch::Sender<bool>>>,
}

impl NatsPubSub {
    /// Connect to a NATS server
    pub async fn connect(url: &str) -> Result<Self, PubSubError> {
        let client = async_nats::connect(url)
            .await
            .map_err(|e| PubSubError::ConnectionFailed(format!("{url}: {e}")))?;

        Ok(Self::new(client))
    }

    /// Wrap an established NATS connection
    pub fn new(client: Client) -> Self {
        let jetstream = jetstream::new(client.clone());

        Self {
            client,
            jetstream,
            subscriptions: Mutex::new(HashMap::new()),
            cancels: Mutex::new(HashMap::new()),
        }
    }

    /// The underlying NATS client
    pub fn client(&self) -> &Client {
        &self.client
    }

    fn subscriptions(&self) -> std::sync::MutexGuard<'_, HashMap<String, Subscription>> {
        self.subscriptions.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn cancels(&self) -> std::sync::MutexGuard<'_, HashMap<ConsumerStream, watch::Sender<bool>>> {
        self.cancels.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn pull_loop(
        consumer: jetstream::consumer::PullConsumer,
        handler: MessageHandler,
        mut stop: watch::Receiver<bool>,
        key: ConsumerStream,
    ) {
        loop {
            let batch = tokio::select! {
                _ = stop.changed() => {
                    info!(consumer = %key.consumer, stream = %key.stream, "pull loop done");
                    return;
                }
                batch = consumer
                    .batch()
                    .max_messages(FETCH_BATCH)
                    .expires(FETCH_EXPIRES)
                    .messages() => batch,
            };

            let mut messages = match batch {
                Ok(messages) => messages,
                Err(e) => {
                    // transient; the broker keeps undelivered messages
                    error!(
                        consumer = %key.consumer,
                        stream = %key.stream,
                        error = %e,
                        "fetch failed"
                    );
                    continue;
                }
            };

            while let Some(next) = messages.next().await {
                let delivered = match next {
                    Ok(delivered) => delivered,
                    Err(e) => {
                        error!(
                            consumer = %key.consumer,
                            stream = %key.stream,
                            error = %e,
                            "fetch stream error"
                        );
                        break;
                    }
                };

                let msg = Message::new(delivered.subject.to_string(), delivered.payload.clone());

                if let Err(e) = handler(msg).await {
                    // not acked: left to the broker's redelivery policy
                    match delivered.info() {
                        Ok(meta) => error!(
                            topic = %delivered.subject,
                            stream_seq = meta.stream_sequence,
                            consumer_seq = meta.consumer_sequence,
                            error = %e,
                            "handler failed"
                        ),
                        Err(meta_err) => error!(
                            topic = %delivered.subject,
                            error = %meta_err,
                            "handler failed, metadata unavailable"
                        ),
                    }
                    continue;
                }

                if let Err(e) = delivered.ack().await {
                    error!(topic = %delivered.subject, error = %e, "ack failed");
                }
            }
        }
    }
}

#[async_trait]
impl PubSub for NatsPubSub {
    async fn publish(&self, topic: &str, data: Bytes) -> Result<(), PubSubError> {
        self.client
            .publish(topic.to_string(), data)
            .await
            .map_err(|e| PubSubError::PublishFailed(e.to_string()))
    }

    async fn subscribe(&self, topic: &str, handler: MessageHandler) -> Result<(), PubSubError> {
        let mut subscriber = self
            .client
            .subscribe(topic.to_string())
            .await
            .map_err(|e| PubSubError::SubscribeFailed(e.to_string()))?;

        let client = self.client.clone();
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let subject = topic.to_string();

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = stop_rx.changed() => {
                        // stop new deliveries, then drain what the broker
                        // already handed us
                        let _ = subscriber.unsubscribe().await;
                        while let Some(incoming) = subscriber.next().await {
                            dispatch(&client, &handler, incoming).await;
                        }
                        return;
                    }
                    next = subscriber.next() => {
                        let Some(incoming) = next else { return };
                        dispatch(&client, &handler, incoming).await;
                    }
                }
            }
        });

        let replaced = self.subscriptions().insert(
            subject.clone(),
            Subscription {
                stop: stop_tx,
                task,
            },
        );

        if let Some(previous) = replaced {
            debug!(topic = %subject, "replacing subscription");
            let _ = previous.stop.send(true);
        }

        Ok(())
    }

    async fn close(&self) -> Result<(), PubSubError> {
        for (_, cancel) in self.cancels().drain() {
            let _ = cancel.send(true);
        }

        let drained: Vec<Subscription> =
            self.subscriptions().drain().map(|(_, sub)| sub).collect();

        for sub in drained {
            let _ = sub.stop.send(true);
            let _ = sub.task.await;
        }

        self.client
            .drain()
            .await
            .map_err(|e| PubSubError::ConnectionFailed(e.to_string()))
    }
}

#[async_trait]
impl PullBasedPubSub for NatsPubSub {
    async fn add_stream(
        &self,
        name: &str,
        config: serde_json::Value,
    ) -> Result<(), PubSubError> {
        let mut cfg: jetstream::stream::Config = serde_json::from_value(config)
            .map_err(|e| PubSubError::ConfigurationError(e.to_string()))?;
        cfg.name = name.to_string();

        self.jetstream
            .get_or_create_stream(cfg)
            .await
            .map_err(|e| PubSubError::StreamError(e.to_string()))?;

        Ok(())
    }

    async fn add_consumer(
        &self,
        name: &str,
        stream: &str,
        config: serde_json::Value,
    ) -> Result<(), PubSubError> {
        let mut cfg: pull::Config = serde_json::from_value(config)
            .map_err(|e| PubSubError::ConfigurationError(e.to_string()))?;
        cfg.durable_name = Some(name.to_string());

        let stream = self
            .jetstream
            .get_stream(stream)
            .await
            .map_err(|e| PubSubError::StreamError(e.to_string()))?;

        stream
            .create_consumer(cfg)
            .await
            .map_err(|e| PubSubError::ConsumerError(e.to_string()))?;

        Ok(())
    }

    async fn pull_subscribe(
        &self,
        consumer: &str,
        stream: &str,
        handler: MessageHandler,
    ) -> Result<(), PubSubError> {
        let js_stream = self
            .jetstream
            .get_stream(stream)
            .await
            .map_err(|e| PubSubError::StreamError(e.to_string()))?;

        let pull_consumer: jetstream::consumer::PullConsumer = js_stream
            .get_consumer(consumer)
            .await
            .map_err(|e| PubSubError::ConsumerError(e.to_string()))?;

        let key = ConsumerStream {
            consumer: consumer.to_string(),
            stream: stream.to_string(),
        };

        let (stop_tx, stop_rx) = watch::channel(false);

        // at most one live fetch loop per (consumer, stream): the
        // superseded loop is cancelled before the new one starts
        if let Some(previous) = self.cancels().insert(key.clone(), stop_tx) {
            let _ = previous.send(true);
        }

        tokio::spawn(Self::pull_loop(pull_consumer, handler, stop_rx, key));

        Ok(())
    }
}

async fn dispatch(client: &Client, handler: &MessageHandler, incoming: async_nats::Message) {
    let mut msg = Message::new(incoming.subject.to_string(), incoming.payload);
    if let Some(reply) = incoming.reply {
        msg = msg.with_replier(make_replier(client.clone(), reply));
    }

    if let Err(e) = handler(msg).await {
        // fire-and-forget contract: never surfaced to the subscriber
        error!(topic = %incoming.subject, error = %e, "handler failed");
    }
}

fn make_replier(client: Client, reply: async_nats::Subject) -> Replier {
    Arc::new(move |data| {
        let client = client.clone();
        let reply = reply.clone();
        Box::pin(async move {
            client
                .publish(reply, data)
                .await
                .map_err(|e| PubSubError::PublishFailed(e.to_string()))
        })
    })
}
