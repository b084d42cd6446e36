// Copyright 2025 Cowboy AI, LLC.

//! Error types for identity operations

use thiserror::Error;

/// Errors that can occur in identity domain operations
#[derive(Debug, Error)]
pub enum Error {
    /// User not found in the repository
    #[error("user not found")]
    UserNotFound,

    /// Username already taken
    #[error("user exists")]
    UserExists,

    /// Social account already bound to a user
    #[error("account exists")]
    AccountExists,

    /// Sign-in provider is not supported
    #[error("provider not supported")]
    ProviderNotSupported,

    /// Required claim missing from a verified credential
    #[error("{0} not found")]
    ClaimNotFound(&'static str),

    /// Validation error
    #[error("validation error: {0}")]
    Validation(String),

    /// Repository failure
    #[error("repository error: {0}")]
    Repository(String),

    /// Credential verification failure
    #[error("credential verification failed: {0}")]
    CredentialVerification(String),

    /// Message bus failure
    #[error(transparent)]
    PubSub(#[from] crate::pubsub::PubSubError),

    /// Remote invocation failure
    #[error(transparent)]
    Transport(#[from] crate::transport::TransportError),

    /// Serialization failure
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for identity operations
pub type Result<T> = std::result::Result<T, Error>;
