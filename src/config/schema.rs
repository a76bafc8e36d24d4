//! Configuration schema definitions.
//!
//! This module defines the configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

use crate::store::keys::DEFAULT_ROOT;

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Configuration store the routing table is reconciled from.
    pub store: StoreConfig,

    /// Which category watchers to run.
    pub watchers: WatchersConfig,

    /// Administrative API.
    pub admin: AdminConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    #[default]
    Memory,
    File,
}

/// Configuration store settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,

    /// Path of the TOML key/value file (file backend only).
    pub path: Option<String>,

    /// Key root every category lives under. Must end in `/`.
    pub root: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            path: None,
            root: DEFAULT_ROOT.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WatchersConfig {
    pub route: bool,
    pub service: bool,
    pub endpoint: bool,
    pub health_check: bool,
}

impl Default for WatchersConfig {
    fn default() -> Self {
        Self {
            route: true,
            service: true,
            endpoint: true,
            health_check: true,
        }
    }
}

impl WatchersConfig {
    pub fn any_enabled(&self) -> bool {
        self.route || self.service || self.endpoint || self.health_check
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable the admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config: GatewayConfig = toml::from_str("").unwrap();
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert_eq!(config.store.root, "/");
        assert!(config.watchers.any_enabled());
        assert_eq!(config.observability.log_level, "info");
    }

    #[test]
    fn test_partial_sections() {
        let config: GatewayConfig = toml::from_str(
            r#"
[store]
backend = "file"
path = "routes.toml"

[watchers]
health_check = false
"#,
        )
        .unwrap();
        assert_eq!(config.store.backend, StoreBackend::File);
        assert_eq!(config.store.path.as_deref(), Some("routes.toml"));
        assert!(config.watchers.route);
        assert!(!config.watchers.health_check);
    }
}
