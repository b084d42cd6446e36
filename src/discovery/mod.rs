// Copyright 2025 Cowboy AI, LLC.

//! Service registry and discovery
//!
//! Two independent loops against an external coordination store: the
//! [`Registry`] heartbeat advertises this instance so peers can find it;
//! the [`Discovery`] poller turns the store's membership view into a live
//! stream of [`Instance`](crate::proxy::Instance) updates consumed by the
//! proxying load-balancer.

use thiserror::Error;

pub mod catalog;
mod poller;
mod registry;
mod resolver;

pub use catalog::{
    Catalog, CatalogError, HealthCheck, InMemoryCatalog, ServiceAddress, ServiceNode,
    ServiceRegistration,
};
pub use poller::Discovery;
pub use registry::{registration_from_config, Registry};
pub use resolver::{default_resolvers, EndpointResolver, HttpResolver, NatsResolver};

/// Errors from registry and discovery
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// Coordination-store operation failed
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// Node carries no tagged address for the protocol
    #[error("address not found")]
    AddressNotFound,

    /// Node carries no request prefix in its metadata
    #[error("prefix not found")]
    PrefixNotFound,

    /// No operation could be resolved for the instance
    #[error("endpoint empty")]
    EndpointEmpty,

    /// Endpoint construction failed
    #[error(transparent)]
    Transport(#[from] crate::transport::TransportError),
}
