// Copyright 2025 Cowboy AI, LLC.

//! Service discovery poller
//!
//! Turns the coordination store's membership view into a stream of
//! incremental [`Instance`] updates: changed instances are pushed with a
//! fresh last-write-wins stamp, vanished instances are pushed once with
//! `is_alive = false` and forgotten. Unchanged instances push nothing, so
//! the consumer never sees redundant updates.

use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info};

use super::catalog::Catalog;
use super::resolver::{default_resolvers, EndpointResolver};
use super::DiscoveryError;
use crate::proxy::Instance;

/// Default poll interval
const POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Session TTL; must outlive one poll interval so the lease is renewed
/// before the store invalidates cached query results
const SESSION_TTL: Duration = Duration::from_secs(60);

/// The discovery poll loop
pub struct Discovery {
    catalog: Arc<dyn Catalog>,
    resolvers: HashMap<String, Arc<dyn EndpointResolver>>,
    service_name: String,
    interval: Duration,
    session_ttl: Duration,
    known: HashMap<String, Instance>, // keyed by "<id>:<tag>"
}

impl Discovery {
    /// Poller for all healthy instances of `service_name`, with the stock
    /// resolver table
    pub fn new(catalog: Arc<dyn Catalog>, service_name: impl Into<String>) -> Self {
        Self {
            catalog,
            resolvers: default_resolvers(),
            service_name: service_name.into(),
            interval: POLL_INTERVAL,
            session_ttl: SESSION_TTL,
            known: HashMap::new(),
        }
    }

    /// Override the poll interval
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Replace the resolver table
    pub fn with_resolvers(
        mut self,
        resolvers: HashMap<String, Arc<dyn EndpointResolver>>,
    ) -> Self {
        self.resolvers = resolvers;
        self
    }

    /// Run until `shutdown` fires. Session and prepared-query creation
    /// failures are fatal; per-poll failures are logged and the loop
    /// continues. The output channel is never closed here; it closes when
    /// the sender is dropped.
    pub async fn run(
        mut self,
        tx: mpsc::Sender<Instance>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), DiscoveryError> {
        let session = self.catalog.create_session(self.session_ttl).await?;
        let query = self
            .catalog
            .create_query(&session, &self.service_name)
            .await?;

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    let _ = self.catalog.destroy_session(&session).await;
                    info!(action = "service_discovery", "done");
                    return Ok(());
                }
                _ = ticker.tick() => self.poll(&query, &session, &tx).await,
            }
        }
    }

    /// One poll round: query, diff, push updates and evictions, renew the
    /// session lease.
    pub async fn poll(&mut self, query: &str, session: &str, tx: &mpsc::Sender<Instance>) {
        let nodes = match self.catalog.execute_query(query).await {
            Ok(nodes) => nodes,
            Err(e) => {
                error!(action = "service_discovery", phase = "execute_query", error = %e);
                return;
            }
        };

        let mut seen = HashSet::new();

        for node in &nodes {
            for tag in &node.service.tags {
                let Some(resolver) = self.resolvers.get(tag.as_str()) else {
                    continue;
                };

                let key = format!("{}:{}", node.service.id, tag);

                let (mut instance, mut modified) = match self.known.get(&key) {
                    Some(existing) => (existing.clone(), false),
                    None => (Instance::new(node.service.id.clone(), tag.clone()), true),
                };

                match resolver.extract(&node.service, &mut instance) {
                    Ok(changed) => modified |= changed,
                    Err(e) => {
                        error!(action = "service_discovery", id = %node.service.id, tag = %tag, error = %e);
                        continue;
                    }
                }

                if modified {
                    let endpoints = match resolver.build_endpoints(&instance).await {
                        Ok(endpoints) => endpoints,
                        Err(DiscoveryError::EndpointEmpty) => {
                            debug!(action = "service_discovery", id = %node.service.id, tag = %tag, "no endpoints");
                            continue;
                        }
                        Err(e) => {
                            error!(action = "service_discovery", id = %node.service.id, tag = %tag, error = %e);
                            continue;
                        }
                    };

                    instance.modified_time = Utc::now();
                    instance.is_alive = true;
                    instance.endpoints = endpoints;
                    self.known.insert(key.clone(), instance.clone());

                    if tx.send(instance).await.is_err() {
                        return;
                    }
                }

                seen.insert(key);
            }
        }

        let vanished: Vec<String> = self
            .known
            .keys()
            .filter(|key| !seen.contains(*key))
            .cloned()
            .collect();

        for key in vanished {
            if let Some(mut instance) = self.known.remove(&key) {
                instance.is_alive = false;
                let _ = tx.send(instance).await;
            }
        }

        if let Err(e) = self.catalog.renew_session(session).await {
            error!(action = "service_discovery", phase = "renew_session", error = %e);
        }
    }
}
