// Copyright 2025 Cowboy AI, LLC.

//! Service registry heartbeat
//!
//! Asserts this instance's liveness and address metadata into the
//! coordination store. The heartbeat is a presence check: it re-registers
//! only when the store no longer knows the instance (e.g. after a
//! health-check TTL deregistration), avoiding a write per tick.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

use super::catalog::{Catalog, HealthCheck, ServiceAddress, ServiceRegistration};
use crate::config::Config;

/// Default heartbeat interval
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Logical service name shared by all identity instances
pub const SERVICE_NAME: &str = "identity";

/// The registry heartbeat loop
pub struct Registry {
    catalog: Arc<dyn Catalog>,
    service: ServiceRegistration,
    interval: Duration,
}

impl Registry {
    /// Heartbeat for one fixed service descriptor
    pub fn new(catalog: Arc<dyn Catalog>, service: ServiceRegistration) -> Self {
        Self {
            catalog,
            service,
            interval: HEARTBEAT_INTERVAL,
        }
    }

    /// Override the heartbeat interval
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Run until `shutdown` fires, then deregister best-effort. A failed
    /// deregistration is logged and dropped: the store's own health-check
    /// TTL cleans up the stale entry.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if let Err(e) = self.catalog.deregister(&self.service.id).await {
                        error!(action = "service_registry", error = %e, "deregister failed");
                    }
                    info!(action = "service_registry", "done");
                    return;
                }
                _ = ticker.tick() => self.heartbeat().await,
            }
        }
    }

    /// One heartbeat round: re-register when the store has lost us
    pub async fn heartbeat(&self) {
        match self.catalog.service(&self.service.id).await {
            Ok(Some(_)) => {}
            Ok(None) => match self.catalog.register(&self.service).await {
                Ok(()) => info!(action = "service_registry", id = %self.service.id, "service registration"),
                Err(e) => error!(action = "service_registry", error = %e, "register failed"),
            },
            Err(e) => error!(action = "service_registry", error = %e, "presence check failed"),
        }
    }
}

/// Build this instance's service descriptor from its configuration,
/// mirroring the enabled transports into tags, tagged addresses, metadata
/// and health checks.
///
/// Returns `None` when no transport is enabled; registering an
/// unreachable instance would only pollute the peer view.
pub fn registration_from_config(cfg: &Config, version: Option<&str>) -> Option<ServiceRegistration> {
    if !cfg.transports.http.enabled && !cfg.transports.nats.enabled {
        warn!(action = "service_registry", "service registration ignored");
        return None;
    }

    let mut service = ServiceRegistration {
        id: cfg.name.clone(),
        name: SERVICE_NAME.to_string(),
        address: "localhost".to_string(),
        ..Default::default()
    };

    if let Some(version) = version {
        service.tags.push(version.to_string());
    }

    if cfg.transports.http.enabled {
        let http = &cfg.transports.http.internal;
        service.address = http.host.clone();
        service.port = http.port;
        service.tags.push(http.scheme.clone());
        service.tagged_addresses.insert(
            http.scheme.clone(),
            ServiceAddress {
                address: http.host.clone(),
                port: http.port,
            },
        );

        if http.health.enabled {
            service
                .checks
                .push(HealthCheck::http(http.url() + &http.health.path));
        }

        if let Some(external) = &cfg.transports.http.external {
            service.tags.push(external.scheme.clone());
            service.tagged_addresses.insert(
                external.scheme.clone(),
                ServiceAddress {
                    address: external.host.clone(),
                    port: external.port,
                },
            );

            if external.health.enabled {
                service
                    .checks
                    .push(HealthCheck::http(external.url() + &external.health.path));
            }
        }
    }

    if cfg.transports.nats.enabled {
        let nats = &cfg.transports.nats.internal;
        service.tags.push(nats.scheme.clone());
        service.tagged_addresses.insert(
            nats.scheme.clone(),
            ServiceAddress {
                address: nats.host.clone(),
                port: nats.port,
            },
        );
        service.meta.insert(
            "nats_request_prefix".to_string(),
            cfg.transports.nats.req_prefix.clone(),
        );

        if nats.health.enabled {
            service.checks.push(nats_health_check(nats));
        }

        if let Some(external) = &cfg.transports.nats.external {
            // override: external peers reach the external address
            service.tagged_addresses.insert(
                external.scheme.clone(),
                ServiceAddress {
                    address: external.host.clone(),
                    port: external.port,
                },
            );

            if external.health.enabled {
                service.checks.push(nats_health_check(external));
            }
        }
    }

    if cfg.transports.load_balancing.enabled {
        service.tags.push("lb".to_string());
    }

    Some(service)
}

fn nats_health_check(listener: &crate::config::Listener) -> HealthCheck {
    HealthCheck::script(vec![
        "/consul/script/nats-health-check".to_string(),
        "--host".to_string(),
        listener.host.clone(),
        "--subject".to_string(),
        listener.health.path.clone(),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn config() -> Config {
        Config::from_yaml(
            r#"
name: svc-1
transports:
  nats:
    enabled: true
    reqPrefix: identity.svc-1
    internal:
      scheme: nats
      host: 10.0.0.5
      port: 4222
      health:
        enabled: true
        path: identity.svc-1.health
  loadBalancing:
    enabled: true
"#,
        )
        .unwrap()
    }

    #[test]
    fn registration_mirrors_enabled_transports() {
        let service = registration_from_config(&config(), Some("v1.2.0")).unwrap();

        assert_eq!(service.id, "svc-1");
        assert_eq!(service.name, "identity");
        assert!(service.tags.contains(&"v1.2.0".to_string()));
        assert!(service.tags.contains(&"nats".to_string()));
        assert!(service.tags.contains(&"lb".to_string()));

        let addr = &service.tagged_addresses["nats"];
        assert_eq!(addr.address, "10.0.0.5");
        assert_eq!(addr.port, 4222);
        assert_eq!(service.meta["nats_request_prefix"], "identity.svc-1");

        assert_eq!(service.checks.len(), 1);
        assert_eq!(service.checks[0].interval, "10s");
        assert_eq!(service.checks[0].deregister_critical_service_after, "60s");
        assert!(service.checks[0]
            .args
            .contains(&"identity.svc-1.health".to_string()));
    }

    #[test]
    fn no_enabled_transport_means_no_registration() {
        let cfg = Config::from_yaml("name: svc-1\n").unwrap();
        assert!(registration_from_config(&cfg, None).is_none());
    }
}
