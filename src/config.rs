// Copyright 2025 Cowboy AI, LLC.

//! YAML configuration model
//!
//! Values may reference environment variables as `${VAR}`; references are
//! expanded before parsing. Stream and consumer configs are kept as raw
//! JSON values and handed to the bus layer untouched.

use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

/// Errors loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration file could not be read
    #[error("config read error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file could not be parsed
    #[error("config parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
}

/// Root configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Unique instance name, used as the registration id
    pub name: String,
    /// Externally visible base URL
    #[serde(default)]
    pub base_url: String,
    /// Enabled transports
    #[serde(default)]
    pub transports: Transports,
    /// Durable event-bus wiring
    #[serde(default)]
    pub event_bus: EventBus,
    /// Social sign-in providers
    #[serde(default)]
    pub providers: Providers,
}

impl Config {
    /// Load from `<dir>/config.yaml`, falling back to
    /// `<dir>/config.example.yaml`
    pub fn load(dir: &Path) -> Result<Self, ConfigError> {
        let raw = match std::fs::read_to_string(dir.join("config.yaml")) {
            Ok(raw) => raw,
            Err(_) => std::fs::read_to_string(dir.join("config.example.yaml"))?,
        };

        Self::from_yaml(&raw)
    }

    /// Parse from a YAML string, expanding `${VAR}` references
    pub fn from_yaml(raw: &str) -> Result<Self, ConfigError> {
        let expanded = expand_env(raw);
        Ok(serde_yaml::from_str(&expanded)?)
    }
}

/// Transport sections
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transports {
    /// HTTP transport
    #[serde(default)]
    pub http: HttpTransport,
    /// NATS transport
    #[serde(default)]
    pub nats: NatsTransport,
    /// Load-balancing proxy
    #[serde(default)]
    pub load_balancing: LoadBalancing,
}

/// HTTP transport registration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpTransport {
    /// Whether the transport is enabled
    #[serde(default)]
    pub enabled: bool,
    /// Address peers inside the deployment reach
    #[serde(default)]
    pub internal: Listener,
    /// Address external peers reach, when different
    #[serde(default)]
    pub external: Option<Listener>,
}

/// NATS transport registration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NatsTransport {
    /// Whether the transport is enabled
    #[serde(default)]
    pub enabled: bool,
    /// Per-instance topic namespace for direct requests
    #[serde(default)]
    pub req_prefix: String,
    /// Address peers inside the deployment reach
    #[serde(default)]
    pub internal: Listener,
    /// Address external peers reach, when different
    #[serde(default)]
    pub external: Option<Listener>,
}

/// One reachable listener
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Listener {
    /// URL scheme / transport tag, e.g. `http` or `nats`
    #[serde(default)]
    pub scheme: String,
    /// Host name or address
    #[serde(default)]
    pub host: String,
    /// Port
    #[serde(default)]
    pub port: u16,
    /// Health probe settings
    #[serde(default)]
    pub health: Health,
}

impl Listener {
    /// `scheme://host:port`
    pub fn url(&self) -> String {
        format!("{}://{}:{}", self.scheme, self.host, self.port)
    }
}

/// Health probe settings for a listener
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Health {
    /// Whether the store should probe this listener
    #[serde(default)]
    pub enabled: bool,
    /// Probe path (HTTP) or subject (NATS)
    #[serde(default)]
    pub path: String,
}

/// Load-balancing proxy settings
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadBalancing {
    /// Whether capability calls may be proxied to peers
    #[serde(default)]
    pub enabled: bool,
}

/// Durable event-bus wiring
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventBus {
    /// Stream/consumer pair carrying the user events
    #[serde(default)]
    pub users: EventBinding,
}

/// A stream and the durable consumer bound to it
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventBinding {
    /// Stream definition
    #[serde(default)]
    pub stream: StreamSection,
    /// Consumer definition
    #[serde(default)]
    pub consumer: ConsumerSection,
}

/// Named stream with broker-level config
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamSection {
    /// Stream name
    #[serde(default)]
    pub name: String,
    /// Broker-level stream configuration, passed through untouched
    #[serde(default)]
    pub config: serde_json::Value,
}

/// Named durable consumer with broker-level config
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumerSection {
    /// Consumer name
    #[serde(default)]
    pub name: String,
    /// Stream the consumer is bound to
    #[serde(default)]
    pub stream: String,
    /// Broker-level consumer configuration, passed through untouched
    #[serde(default)]
    pub config: serde_json::Value,
}

/// Social provider credentials
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Providers {
    /// Google provider
    #[serde(default)]
    pub google: Provider,
}

/// Credentials of one provider
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Provider {
    /// OAuth client settings
    #[serde(default)]
    pub client: ProviderClient,
}

/// OAuth client settings
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderClient {
    /// Client id the provider issued
    #[serde(default)]
    pub id: String,
}

/// Expand `${VAR}` references from the process environment. Unset
/// variables expand to the empty string.
fn expand_env(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        match rest[start + 2..].find('}') {
            Some(end) => {
                let var = &rest[start + 2..start + 2 + end];
                if let Ok(value) = std::env::var(var) {
                    out.push_str(&value);
                }
                rest = &rest[start + 2 + end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }

    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
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
eventBus:
  users:
    stream:
      name: USERS
      config:
        subjects: ["users.>"]
        retention: limits
        storage: file
    consumer:
      name: identity-users
      stream: USERS
      config:
        ack_policy: explicit
"#;

    #[test]
    fn parses_sample_config() {
        let cfg = Config::from_yaml(SAMPLE).unwrap();

        assert_eq!(cfg.name, "svc-1");
        assert!(cfg.transports.nats.enabled);
        assert_eq!(cfg.transports.nats.req_prefix, "identity.svc-1");
        assert_eq!(cfg.transports.nats.internal.port, 4222);
        assert!(cfg.transports.load_balancing.enabled);
        assert!(!cfg.transports.http.enabled);

        let users = &cfg.event_bus.users;
        assert_eq!(users.stream.name, "USERS");
        assert_eq!(users.stream.config["subjects"][0], "users.>");
        assert_eq!(users.consumer.stream, "USERS");
    }

    #[test]
    fn expands_environment_references() {
        std::env::set_var("CIM_IDENTITY_TEST_HOST", "bus.internal");
        let raw = "name: svc-1\ntransports:\n  nats:\n    internal:\n      host: ${CIM_IDENTITY_TEST_HOST}\n";

        let cfg = Config::from_yaml(raw).unwrap();
        assert_eq!(cfg.transports.nats.internal.host, "bus.internal");
    }

    #[test]
    fn unset_references_expand_to_empty() {
        let raw = "name: svc-${CIM_IDENTITY_TEST_UNSET_SUFFIX}1\n";
        let cfg = Config::from_yaml(raw).unwrap();
        assert_eq!(cfg.name, "svc-1");
    }
}
