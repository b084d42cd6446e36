// Copyright 2025 Cowboy AI, LLC.

//! Domain events and the per-aggregate event buffer
//!
//! Aggregates raise events through mutation methods; the events sit in the
//! aggregate's [`EventStore`] until [`EventStore::notify`] drains them onto
//! the message bus. Delivery guarantees come from the bus layer, not from
//! the events themselves.

use bytes::Bytes;
use serde::Serialize;
use std::sync::Mutex;

use crate::errors::Result;
use crate::pubsub::PubSub;

/// A fact raised by an aggregate. Immutable after creation.
pub trait DomainEvent: Serialize + Send + Sync {
    /// Canonical event name, e.g. `user_registered`
    fn name(&self) -> &'static str;

    /// Bus subject this event publishes to,
    /// e.g. `users.<aggregate_id>.registered`
    fn topic(&self) -> String;
}

/// Append-only buffer of domain events owned by a single aggregate
/// instance.
///
/// Insertion order is significant: `notify` publishes events in the order
/// they were raised. The internal mutex guards the case where an aggregate
/// read from a repository is mutated across task boundaries.
#[derive(Debug)]
pub struct EventStore<E> {
    events: Mutex<Vec<E>>,
}

impl<E> Default for EventStore<E> {
    fn default() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
        }
    }
}

impl<E: Clone> Clone for EventStore<E> {
    fn clone(&self) -> Self {
        Self {
            events: Mutex::new(self.buffer().clone()),
        }
    }
}

impl<E> EventStore<E> {
    /// Create an empty event buffer
    pub fn new() -> Self {
        Self::default()
    }

    fn buffer(&self) -> std::sync::MutexGuard<'_, Vec<E>> {
        self.events.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Append events to the buffer. Non-blocking.
    pub fn add_event(&self, event: E) {
        self.buffer().push(event);
    }

    /// Number of buffered events
    pub fn len(&self) -> usize {
        self.buffer().len()
    }

    /// Whether the buffer is empty
    pub fn is_empty(&self) -> bool {
        self.buffer().is_empty()
    }
}

impl<E: DomainEvent + Clone> EventStore<E> {
    /// Current buffer contents. Debug/test accessor.
    pub fn events(&self) -> Vec<E> {
        self.buffer().clone()
    }

    /// Drain the buffer onto the bus.
    ///
    /// Publishes every buffered event, in insertion order, to its topic.
    /// The buffer is cleared only if all publishes succeed; on the first
    /// failure the error is returned and the buffer is left intact, so the
    /// caller retries the whole mutation+notify unit (at-least-once).
    pub async fn notify(&self, bus: &dyn PubSub) -> Result<()> {
        let pending = self.buffer().clone();

        for event in &pending {
            let payload = serde_json::to_vec(event)?;
            bus.publish(&event.topic(), Bytes::from(payload)).await?;
        }

        self.buffer().drain(..pending.len());
        Ok(())
    }
}
