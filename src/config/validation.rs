//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check that the store backend has what it needs
//! - Validate addresses and the key root
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::{GatewayConfig, StoreBackend};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    MissingStorePath,
    InvalidRoot(String),
    InvalidAdminAddress(String),
    EmptyApiKey,
    NoWatchersEnabled,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::MissingStorePath => write!(f, "store.path is required for the file backend"),
            ValidationError::InvalidRoot(root) => write!(f, "store.root must start and end with '/': {:?}", root),
            ValidationError::InvalidAdminAddress(addr) => write!(f, "admin.bind_address is not a socket address: {}", addr),
            ValidationError::EmptyApiKey => write!(f, "admin.api_key must not be empty"),
            ValidationError::NoWatchersEnabled => write!(f, "at least one watcher must be enabled"),
        }
    }
}

pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.store.backend == StoreBackend::File
        && config.store.path.as_deref().map_or(true, |p| p.trim().is_empty())
    {
        errors.push(ValidationError::MissingStorePath);
    }

    let root = &config.store.root;
    if !root.starts_with('/') || !root.ends_with('/') {
        errors.push(ValidationError::InvalidRoot(root.clone()));
    }

    if config.admin.enabled {
        if config.admin.bind_address.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError::InvalidAdminAddress(config.admin.bind_address.clone()));
        }
        if config.admin.api_key.is_empty() {
            errors.push(ValidationError::EmptyApiKey);
        }
    }

    if !config.watchers.any_enabled() {
        errors.push(ValidationError::NoWatchersEnabled);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&GatewayConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_every_error() {
        let mut config = GatewayConfig::default();
        config.store.backend = StoreBackend::File;
        config.store.root = "/gateway".to_string();
        config.admin.bind_address = "localhost".to_string();
        config.watchers.route = false;
        config.watchers.service = false;
        config.watchers.endpoint = false;
        config.watchers.health_check = false;

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![
                ValidationError::MissingStorePath,
                ValidationError::InvalidRoot("/gateway".to_string()),
                ValidationError::InvalidAdminAddress("localhost".to_string()),
                ValidationError::NoWatchersEnabled,
            ]
        );
    }

    #[test]
    fn test_disabled_admin_skips_address_check() {
        let mut config = GatewayConfig::default();
        config.admin.enabled = false;
        config.admin.bind_address = String::new();
        assert!(validate_config(&config).is_ok());
    }
}
