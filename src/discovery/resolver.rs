// Copyright 2025 Cowboy AI, LLC.

//! Per-protocol field extraction and endpoint construction
//!
//! Each transport tag the store reports maps to one [`EndpointResolver`]
//! strategy. Adding a protocol means adding a resolver to the table, not
//! growing a switch.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use super::catalog::ServiceRegistration;
use super::DiscoveryError;
use crate::proxy::{EndpointSet, Instance};
use crate::transport::SignInFactory;

/// Strategy for one transport protocol tag
#[async_trait]
pub trait EndpointResolver: Send + Sync {
    /// Pull the protocol's fields from the node into the instance.
    /// Returns whether any observable field changed. A node missing a
    /// required field is an error; the poller logs and skips it.
    fn extract(
        &self,
        node: &ServiceRegistration,
        instance: &mut Instance,
    ) -> Result<bool, DiscoveryError>;

    /// Build the instance's callable operations from its extracted
    /// fields
    async fn build_endpoints(&self, instance: &Instance) -> Result<EndpointSet, DiscoveryError>;
}

/// Resolver for peers reachable over the message bus
pub struct NatsResolver {
    factory: Arc<SignInFactory>,
}

impl NatsResolver {
    /// Resolver with its own connection cache
    pub fn new() -> Self {
        Self::with_factory(Arc::new(SignInFactory::new()))
    }

    /// Resolver sharing an existing connection cache
    pub fn with_factory(factory: Arc<SignInFactory>) -> Self {
        Self { factory }
    }
}

impl Default for NatsResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EndpointResolver for NatsResolver {
    fn extract(
        &self,
        node: &ServiceRegistration,
        instance: &mut Instance,
    ) -> Result<bool, DiscoveryError> {
        let address = node
            .tagged_addresses
            .get("nats")
            .ok_or(DiscoveryError::AddressNotFound)?;
        let prefix = node
            .meta
            .get("nats_request_prefix")
            .ok_or(DiscoveryError::PrefixNotFound)?;

        let mut modified = false;

        if instance.address != address.address {
            instance.address = address.address.clone();
            modified = true;
        }

        if instance.port != address.port {
            instance.port = address.port;
            modified = true;
        }

        if &instance.request_prefix != prefix {
            instance.request_prefix = prefix.clone();
            modified = true;
        }

        Ok(modified)
    }

    async fn build_endpoints(&self, instance: &Instance) -> Result<EndpointSet, DiscoveryError> {
        let sign_in = self
            .factory
            .endpoint(&instance.address, instance.port, &instance.request_prefix)
            .await?;

        Ok(EndpointSet {
            sign_in: Some(sign_in),
        })
    }
}

/// Placeholder resolver for HTTP peers. Deliberately extracts nothing and
/// resolves no operations; proxying to HTTP peers is out of scope.
pub struct HttpResolver;

#[async_trait]
impl EndpointResolver for HttpResolver {
    fn extract(
        &self,
        _node: &ServiceRegistration,
        _instance: &mut Instance,
    ) -> Result<bool, DiscoveryError> {
        Ok(false)
    }

    async fn build_endpoints(&self, _instance: &Instance) -> Result<EndpointSet, DiscoveryError> {
        Err(DiscoveryError::EndpointEmpty)
    }
}

/// The stock resolver table: `nats` plus the `http`/`https` placeholders,
/// sharing one bus connection cache
pub fn default_resolvers() -> HashMap<String, Arc<dyn EndpointResolver>> {
    let factory = Arc::new(SignInFactory::new());

    let mut resolvers: HashMap<String, Arc<dyn EndpointResolver>> = HashMap::new();
    resolvers.insert(
        "nats".to_string(),
        Arc::new(NatsResolver::with_factory(factory)),
    );
    resolvers.insert("http".to_string(), Arc::new(HttpResolver));
    resolvers.insert("https".to_string(), Arc::new(HttpResolver));
    resolvers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::catalog::ServiceAddress;

    fn node(address: &str, port: u16, prefix: &str) -> ServiceRegistration {
        let mut node = ServiceRegistration {
            id: "svc-1".to_string(),
            name: "identity".to_string(),
            ..Default::default()
        };
        node.tagged_addresses.insert(
            "nats".to_string(),
            ServiceAddress {
                address: address.to_string(),
                port,
            },
        );
        node.meta
            .insert("nats_request_prefix".to_string(), prefix.to_string());
        node
    }

    #[test]
    fn nats_extract_reports_changes_once() {
        let resolver = NatsResolver::new();
        let node = node("10.0.0.5", 4222, "identity.svc-1");
        let mut instance = Instance::new("svc-1", "nats");

        assert!(resolver.extract(&node, &mut instance).unwrap());
        assert_eq!(instance.address, "10.0.0.5");
        assert_eq!(instance.port, 4222);
        assert_eq!(instance.request_prefix, "identity.svc-1");

        // identical observation: nothing changed
        assert!(!resolver.extract(&node, &mut instance).unwrap());
    }

    #[test]
    fn nats_extract_requires_address_and_prefix() {
        let resolver = NatsResolver::new();
        let mut instance = Instance::new("svc-1", "nats");

        let mut no_address = node("10.0.0.5", 4222, "identity.svc-1");
        no_address.tagged_addresses.clear();
        assert!(matches!(
            resolver.extract(&no_address, &mut instance),
            Err(DiscoveryError::AddressNotFound)
        ));

        let mut no_prefix = node("10.0.0.5", 4222, "identity.svc-1");
        no_prefix.meta.clear();
        assert!(matches!(
            resolver.extract(&no_prefix, &mut instance),
            Err(DiscoveryError::PrefixNotFound)
        ));
    }

    #[tokio::test]
    async fn http_resolver_is_a_placeholder() {
        let resolver = HttpResolver;
        let mut instance = Instance::new("svc-1", "http");

        let node = ServiceRegistration::default();
        assert!(!resolver.extract(&node, &mut instance).unwrap());
        assert!(matches!(
            resolver.build_endpoints(&instance).await,
            Err(DiscoveryError::EndpointEmpty)
        ));
    }
}
