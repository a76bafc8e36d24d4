//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! gateway.toml
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated, immutable)
//!     → lifecycle::startup wires store, watchers and admin from it
//! ```
//!
//! Routing state is not part of this file: routes, services, endpoints
//! and health checks live in the configuration store and reach the
//! routing table through the watchers.
//!
//! # Design Decisions
//! - Config is immutable once loaded
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{AdminConfig, GatewayConfig, ObservabilityConfig, StoreBackend, StoreConfig, WatchersConfig};
