// Copyright 2025 Cowboy AI, LLC.

//! Proxying load-balancer middleware
//!
//! Wraps the local [`IdentityService`] and, for the sign-in capability,
//! round-robins calls across the peer instances reported by service
//! discovery. Sign-in is the only proxy-eligible capability: it is the
//! one with cross-instance session-affinity concerns. Every other call
//! passes straight through to the local implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::debug;

use crate::errors::Result;
use crate::service::{IdentityService, SignInRequest};
use crate::user::{
    SocialProvider, User, UserActivatedEvent, UserId, UserRegisteredEvent,
    UserSocialAccountAddedEvent,
};

/// Remote sign-in capability of one peer instance
#[async_trait]
pub trait SignInEndpoint: Send + Sync {
    /// Invoke sign-in on the peer
    async fn call(&self, request: SignInRequest) -> Result<User>;
}

/// Named remote operations resolved for one instance. Built whenever the
/// instance's observable fields change, superseded wholesale by
/// rebuilding, never mutated.
#[derive(Clone, Default)]
pub struct EndpointSet {
    /// Sign-in, the only proxy-eligible capability
    pub sign_in: Option<Arc<dyn SignInEndpoint>>,
}

impl std::fmt::Debug for EndpointSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EndpointSet")
            .field("sign_in", &self.sign_in.is_some())
            .finish()
    }
}

impl EndpointSet {
    /// Whether no operation is resolvable
    pub fn is_empty(&self) -> bool {
        self.sign_in.is_none()
    }
}

/// One discovered peer, reachable over one protocol.
///
/// Identity is `(id, protocol)`; the same logical instance reachable over
/// two protocols is two records.
#[derive(Debug, Clone)]
pub struct Instance {
    /// Service instance id as registered in the coordination store
    pub id: String,
    /// Transport protocol tag (e.g. `nats`)
    pub protocol: String,
    /// Reachable address for this protocol
    pub address: String,
    /// Reachable port for this protocol
    pub port: u16,
    /// Per-instance topic namespace for direct requests
    pub request_prefix: String,
    /// Last-write-wins conflict stamp
    pub modified_time: DateTime<Utc>,
    /// Whether the last discovery poll still saw this instance
    pub is_alive: bool,
    /// Remote operations resolved for this instance
    pub endpoints: EndpointSet,
}

impl Instance {
    /// Fresh, alive instance with no extracted fields yet
    pub fn new(id: impl Into<String>, protocol: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            protocol: protocol.into(),
            address: String::new(),
            port: 0,
            request_prefix: String::new(),
            modified_time: Utc::now(),
            is_alive: true,
            endpoints: EndpointSet::default(),
        }
    }
}

/// Merge one discovery update into the instance table.
///
/// A dead update removes the matching entry (finalizing the eviction the
/// poller started); a live update replaces the entry only when strictly
/// newer (stale updates are silently dropped); an unknown live instance
/// is appended.
fn apply_update(instances: &mut Vec<Instance>, incoming: Instance) {
    if let Some(pos) = instances.iter().position(|i| i.id == incoming.id) {
        if !incoming.is_alive || !instances[pos].is_alive {
            debug!(id = %incoming.id, "instance evicted");
            instances.remove(pos);
        } else if incoming.modified_time > instances[pos].modified_time {
            instances[pos] = incoming;
        }
        return;
    }

    if incoming.is_alive {
        debug!(id = %incoming.id, protocol = %incoming.protocol, "instance added");
        instances.push(incoming);
    }
}

/// Load-balancing middleware over [`IdentityService`]
pub struct ProxyingService<S> {
    next: S,
    instances: Arc<RwLock<Vec<Instance>>>,
    cursor: AtomicUsize,
}

impl<S: IdentityService> ProxyingService<S> {
    /// Wrap the local service and start consuming discovery updates from
    /// `updates`. The updater task ends when the sending side is dropped.
    pub fn new(next: S, mut updates: mpsc::Receiver<Instance>) -> Arc<Self> {
        let proxy = Arc::new(Self {
            next,
            instances: Arc::new(RwLock::new(Vec::new())),
            cursor: AtomicUsize::new(0),
        });

        let instances = Arc::clone(&proxy.instances);
        tokio::spawn(async move {
            while let Some(incoming) = updates.recv().await {
                let mut table = instances.write().await;
                apply_update(&mut table, incoming);
            }
        });

        proxy
    }

    /// Current table contents, for inspection
    pub async fn instances(&self) -> Vec<Instance> {
        self.instances.read().await.clone()
    }

    /// Round-robin selection of the sign-in endpoint.
    ///
    /// Selection rotates over *instances*, not over instances supporting
    /// the capability: when the selected instance lacks sign-in, the
    /// caller falls back to the local implementation instead of scanning
    /// for another peer.
    async fn sign_in_endpoint(&self) -> Option<Arc<dyn SignInEndpoint>> {
        let instances = self.instances.read().await;
        if instances.is_empty() {
            return None;
        }

        let n = self.cursor.fetch_add(1, Ordering::Relaxed);
        instances[n % instances.len()].endpoints.sign_in.clone()
    }
}

#[async_trait]
impl<S: IdentityService> IdentityService for ProxyingService<S> {
    async fn register(&self, username: &str, name: &str, email: &str) -> Result<User> {
        self.next.register(username, name, email).await
    }

    async fn otp_verify(&self, otp: &str, id: UserId) -> Result<User> {
        self.next.otp_verify(otp, id).await
    }

    async fn sign_in(&self, credential: &str, provider: SocialProvider) -> Result<User> {
        match self.sign_in_endpoint().await {
            Some(endpoint) => {
                let request = SignInRequest {
                    credential: credential.to_string(),
                    provider,
                };
                endpoint.call(request).await
            }
            None => self.next.sign_in(credential, provider).await,
        }
    }

    async fn add_social_account(
        &self,
        credential: &str,
        provider: SocialProvider,
        id: UserId,
    ) -> Result<User> {
        self.next.add_social_account(credential, provider, id).await
    }

    async fn check_health(&self) -> Result<()> {
        self.next.check_health().await
    }

    async fn user_registered(&self, event: &UserRegisteredEvent) -> Result<()> {
        self.next.user_registered(event).await
    }

    async fn user_activated(&self, event: &UserActivatedEvent) -> Result<()> {
        self.next.user_activated(event).await
    }

    async fn user_social_account_added(&self, event: &UserSocialAccountAddedEvent) -> Result<()> {
        self.next.user_social_account_added(event).await
    }
}
