// Copyright 2025 Cowboy AI, LLC.

//! Transports for the identity capabilities
//!
//! The bus transport carries both the request/reply RPC encoding used to
//! invoke a capability on a peer and the server-side handlers that answer
//! those requests and consume published domain events.

use thiserror::Error;

pub mod pubsub;

pub use pubsub::{check_health_handler, event_handler, sign_in_handler, SignInFactory};

/// Errors from remote capability invocation
#[derive(Debug, Error)]
pub enum TransportError {
    /// No reply arrived in time: the peer is unreachable or slow.
    /// Distinct from [`TransportError::Remote`], so callers can decide to
    /// retry against a possibly different peer set.
    #[error("request timed out")]
    RequestTimeout,

    /// The peer decoded and rejected the request; carries the peer's
    /// message verbatim
    #[error("{0}")]
    Remote(String),

    /// Could not reach the peer's broker
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// The request could not be sent
    #[error("request failed: {0}")]
    RequestFailed(String),

    /// The request could not be encoded
    #[error("encode error: {0}")]
    Encode(String),

    /// The reply envelope or payload could not be decoded
    #[error("decode error: {0}")]
    Decode(String),
}
