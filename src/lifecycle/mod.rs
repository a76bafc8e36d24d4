//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load config → Open store → Build table → Subscribe watchers
//!     → Initial sync → Supervise watchers → Start admin API
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Stop admin API → Abort watcher tasks → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: store first, then table and watchers, admin last
//! - Watchers never stop on their own; only process exit ends them

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::{start, start_with_store, Gateway, StartupError};
