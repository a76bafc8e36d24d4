//! API gateway routing core.
//!
//! An in-memory routing table kept in sync with a watchable configuration
//! store, plus the admin API and startup wiring around it.

pub mod admin;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod observability;
pub mod routing;
pub mod store;
pub mod watcher;

pub use config::GatewayConfig;
pub use error::{RoutingError, StoreError, WatchError};
pub use lifecycle::{Gateway, Shutdown};
pub use routing::RoutingTable;
