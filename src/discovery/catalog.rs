// Copyright 2025 Cowboy AI, LLC.

//! Coordination-store seam
//!
//! The external store (a Consul-style agent) keeps the membership view:
//! service registrations with health checks, sessions that lease cached
//! query results to the liveness of their holder, and prepared queries
//! over healthy instances. [`Catalog`] is the slice of that store the
//! registry and discovery loops require; [`InMemoryCatalog`] backs tests
//! and single-process deployments.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Errors from the coordination store
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The session does not exist or has expired
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// The prepared query does not exist
    #[error("query not found: {0}")]
    QueryNotFound(String),

    /// Store-level failure
    #[error("catalog error: {0}")]
    Store(String),
}

/// Address/port pair advertised for one transport scheme
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceAddress {
    /// Reachable address
    pub address: String,
    /// Reachable port
    pub port: u16,
}

/// Health probe the store runs against a registered instance.
///
/// Either an HTTP probe (`http` set) or a script probe (`args` set) for
/// transports the store cannot probe natively. Timings are the store's
/// duration strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheck {
    /// Probe interval, e.g. `10s`
    pub interval: String,
    /// Probe timeout, e.g. `1s`
    pub timeout: String,
    /// HTTP probe URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http: Option<String>,
    /// Script probe command and arguments
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    /// Deregister the instance after this long in critical state,
    /// e.g. `60s`
    pub deregister_critical_service_after: String,
}

impl HealthCheck {
    /// HTTP probe with the standard timings
    pub fn http(url: impl Into<String>) -> Self {
        Self {
            interval: "10s".to_string(),
            timeout: "1s".to_string(),
            http: Some(url.into()),
            args: Vec::new(),
            deregister_critical_service_after: "60s".to_string(),
        }
    }

    /// Script probe with the standard timings
    pub fn script(args: Vec<String>) -> Self {
        Self {
            interval: "10s".to_string(),
            timeout: "1s".to_string(),
            http: None,
            args,
            deregister_critical_service_after: "60s".to_string(),
        }
    }
}

/// Service descriptor written by the registry and returned by queries
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRegistration {
    /// Unique instance id
    pub id: String,
    /// Logical service name shared by all instances
    pub name: String,
    /// Default address
    pub address: String,
    /// Default port
    pub port: u16,
    /// Transport tags, one per enabled transport
    pub tags: Vec<String>,
    /// Per-scheme reachable addresses
    pub tagged_addresses: HashMap<String, ServiceAddress>,
    /// Free-form metadata, e.g. `nats_request_prefix`
    pub meta: HashMap<String, String>,
    /// Health probes the store runs
    pub checks: Vec<HealthCheck>,
}

/// One healthy instance returned by a prepared query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceNode {
    /// The instance's registration as the store sees it
    pub service: ServiceRegistration,
}

/// The coordination-store operations the loops require
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Write (or overwrite) a service registration
    async fn register(&self, service: &ServiceRegistration) -> Result<(), CatalogError>;

    /// Remove a service registration
    async fn deregister(&self, service_id: &str) -> Result<(), CatalogError>;

    /// Fetch one registration by instance id, `None` when absent
    async fn service(&self, service_id: &str)
        -> Result<Option<ServiceRegistration>, CatalogError>;

    /// Create a session with the given TTL; returns the session id
    async fn create_session(&self, ttl: Duration) -> Result<String, CatalogError>;

    /// Extend a session's lease
    async fn renew_session(&self, session: &str) -> Result<(), CatalogError>;

    /// Destroy a session
    async fn destroy_session(&self, session: &str) -> Result<(), CatalogError>;

    /// Prepare a query for all healthy instances of a service, tied to a
    /// session; returns the query id
    async fn create_query(
        &self,
        session: &str,
        service_name: &str,
    ) -> Result<String, CatalogError>;

    /// Execute a prepared query
    async fn execute_query(&self, query: &str) -> Result<Vec<ServiceNode>, CatalogError>;
}

#[derive(Debug, Clone)]
struct Session {
    ttl: Duration,
    expires_at: DateTime<Utc>,
}

#[derive(Default)]
struct CatalogState {
    services: HashMap<String, ServiceRegistration>,
    sessions: HashMap<String, Session>,
    queries: HashMap<String, String>, // query id -> service name
}

/// In-memory [`Catalog`]
#[derive(Default)]
pub struct InMemoryCatalog {
    state: RwLock<CatalogState>,
}

impl InMemoryCatalog {
    /// Create an empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered services, for inspection
    pub async fn service_count(&self) -> usize {
        self.state.read().await.services.len()
    }
}

#[async_trait]
impl Catalog for InMemoryCatalog {
    async fn register(&self, service: &ServiceRegistration) -> Result<(), CatalogError> {
        let mut state = self.state.write().await;
        state.services.insert(service.id.clone(), service.clone());
        Ok(())
    }

    async fn deregister(&self, service_id: &str) -> Result<(), CatalogError> {
        let mut state = self.state.write().await;
        state.services.remove(service_id);
        Ok(())
    }

    async fn service(
        &self,
        service_id: &str,
    ) -> Result<Option<ServiceRegistration>, CatalogError> {
        let state = self.state.read().await;
        Ok(state.services.get(service_id).cloned())
    }

    async fn create_session(&self, ttl: Duration) -> Result<String, CatalogError> {
        let id = Uuid::new_v4().to_string();
        let session = Session {
            ttl,
            expires_at: Utc::now() + ttl,
        };

        let mut state = self.state.write().await;
        state.sessions.insert(id.clone(), session);
        Ok(id)
    }

    async fn renew_session(&self, session: &str) -> Result<(), CatalogError> {
        let mut state = self.state.write().await;
        let entry = state
            .sessions
            .get_mut(session)
            .ok_or_else(|| CatalogError::SessionNotFound(session.to_string()))?;

        entry.expires_at = Utc::now() + entry.ttl;
        Ok(())
    }

    async fn destroy_session(&self, session: &str) -> Result<(), CatalogError> {
        let mut state = self.state.write().await;
        state.sessions.remove(session);
        Ok(())
    }

    async fn create_query(
        &self,
        session: &str,
        service_name: &str,
    ) -> Result<String, CatalogError> {
        let mut state = self.state.write().await;
        let live = state
            .sessions
            .get(session)
            .is_some_and(|s| s.expires_at > Utc::now());
        if !live {
            return Err(CatalogError::SessionNotFound(session.to_string()));
        }

        let id = Uuid::new_v4().to_string();
        state.queries.insert(id.clone(), service_name.to_string());
        Ok(id)
    }

    async fn execute_query(&self, query: &str) -> Result<Vec<ServiceNode>, CatalogError> {
        let state = self.state.read().await;
        let service_name = state
            .queries
            .get(query)
            .ok_or_else(|| CatalogError::QueryNotFound(query.to_string()))?;

        let nodes = state
            .services
            .values()
            .filter(|s| &s.name == service_name)
            .cloned()
            .map(|service| ServiceNode { service })
            .collect();

        Ok(nodes)
    }
}
