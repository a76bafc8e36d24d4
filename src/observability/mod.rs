//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! routing table, watchers, supervisor, admin API
//!     → tracing events with structured fields
//!     → logging.rs subscriber (EnvFilter + fmt)
//!     → stdout
//! ```
//!
//! # Design Decisions
//! - Structured fields (`router`, `path`, `watcher`) over formatted strings
//! - `RUST_LOG` overrides the configured level

pub mod logging;
