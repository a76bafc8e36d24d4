//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Watch event (store key/value)
//!     → watcher decodes into a descriptor (descriptor.rs)
//!     → table.rs refresh_* / create_* / set_router_status
//!     → registries updated (registry.rs), invariants enforced
//!
//! Incoming request (method, path)
//!     → dispatch.rs resolve()
//!     → online subset, exact frontend-path match
//!     → Router → Service (method allow-list) → BackendApi + middlewares
//! ```
//!
//! # Entities
//! ```text
//! Router ──▶ FrontendApi
//!        ──▶ BackendApi
//!        ──▶ Service ──▶ Endpoint*
//! ```
//! Router→Service and Service→Endpoint are non-owning; lifetimes are
//! governed by the table's registries.
//!
//! # Design Decisions
//! - One registry per map, each with its own lock
//! - Creation is idempotent and returns the registered instance
//! - No cascading deactivation: an endpoint going offline never demotes routers

pub mod descriptor;
pub mod dispatch;
pub mod endpoint;
pub mod entity;
pub mod registry;
pub mod router;
pub mod service;
pub mod snapshot;
pub mod table;

pub use dispatch::{Dispatch, DispatchError};
pub use endpoint::Endpoint;
pub use entity::{BackendApi, FrontendApi, HealthCheck, Middleware, RateLimit, Status};
pub use router::Router;
pub use service::Service;
pub use table::RoutingTable;
