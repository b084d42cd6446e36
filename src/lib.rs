// Copyright 2025 Cowboy AI, LLC.

//! # CIM Identity
//!
//! Coordination substrate for a decentralized identity service: multiple
//! interchangeable instances discover each other through a coordination
//! store, route capability calls to peers over a NATS message bus, and
//! propagate domain events with at-least-once, ordered-per-aggregate
//! delivery.
//!
//! The moving parts, leaf first:
//! - **Events**: per-aggregate append-only event buffer, drained onto the
//!   bus after a successful mutation
//! - **PubSub**: fire-and-forget publish/subscribe plus durable,
//!   acknowledgement-based pull consumption over NATS JetStream
//! - **Transport**: request/reply RPC encoded as bus messages with a
//!   `{status, msg, data, time}` reply envelope
//! - **Discovery**: a registry heartbeat advertising this instance and a
//!   poller turning the store's membership view into live peer updates
//! - **Proxy**: a load-balancing middleware round-robining the sign-in
//!   capability across discovered peers, falling back to the local
//!   implementation
//!
//! There are no ambient globals: the bus, repository and catalog are
//! constructed once and passed to every component that needs them.

#![warn(missing_docs)]

pub mod config;
pub mod discovery;
mod errors;
pub mod events;
pub mod proxy;
pub mod pubsub;
mod reply;
mod service;
pub mod transport;
pub mod user;

pub use config::Config;
pub use discovery::{Catalog, Discovery, InMemoryCatalog, Registry};
pub use errors::{Error, Result};
pub use events::{DomainEvent, EventStore};
pub use proxy::{EndpointSet, Instance, ProxyingService, SignInEndpoint};
pub use pubsub::{ConsumerStream, Message, NatsPubSub, PubSub, PubSubError, PullBasedPubSub};
pub use reply::{Reply, ReplyStatus};
pub use service::{
    CredentialVerifier, IdentityClaims, IdentityService, LoggingService, Policy, PolicyInput,
    SignInRequest, UserService,
};
pub use user::{SocialAccount, SocialId, SocialProvider, Status, User, UserId, UserRepository};
