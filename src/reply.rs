// Copyright 2025 Cowboy AI, LLC.

//! Request/reply envelope for bus RPC
//!
//! Every reply on the bus is `{status, msg, data, time}`. A `failure`
//! status carries the peer's error message verbatim; a `success` status
//! carries the response payload in `data`.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::transport::TransportError;

/// Outcome discriminator of a [`Reply`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyStatus {
    /// The peer accepted and processed the request
    Success,
    /// The peer rejected the request
    Failure,
}

/// Wire envelope decoded from (or encoded into) a reply payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reply {
    /// Outcome of the request
    pub status: ReplyStatus,
    /// Human-readable message; the error text on failure
    pub msg: String,
    /// Response payload, `null` when absent
    pub data: Option<serde_json::Value>,
    /// When the peer produced the reply
    pub time: DateTime<Utc>,
}

impl Reply {
    /// Successful reply with no payload
    pub fn success(msg: impl Into<String>) -> Self {
        Self {
            status: ReplyStatus::Success,
            msg: msg.into(),
            data: None,
            time: Utc::now(),
        }
    }

    /// Failed reply carrying the error message
    pub fn failure(msg: impl std::fmt::Display) -> Self {
        Self {
            status: ReplyStatus::Failure,
            msg: msg.to_string(),
            data: None,
            time: Utc::now(),
        }
    }

    /// Attach a response payload
    pub fn with_data(mut self, data: impl Serialize) -> Result<Self, serde_json::Error> {
        self.data = Some(serde_json::to_value(data)?);
        Ok(self)
    }

    /// Encode the envelope for the wire
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Apply the decoding rule: a failure becomes a remote error built
    /// from `msg`, a success decodes `data` into the expected type.
    pub fn decode<T: DeserializeOwned>(self) -> Result<T, TransportError> {
        match self.status {
            ReplyStatus::Failure => Err(TransportError::Remote(self.msg)),
            ReplyStatus::Success => {
                let data = self.data.unwrap_or(serde_json::Value::Null);
                serde_json::from_value(data).map_err(|e| TransportError::Decode(e.to_string()))
            }
        }
    }
}
