//! Administrative HTTP surface over the routing table.
//!
//! # Responsibilities
//! - Read-only views of routes, services, endpoints and watcher counters
//! - Explicit router promotion and demotion
//! - Bearer-token authentication on every route
//!
//! # Design Decisions
//! - Domain errors map to HTTP statuses in one place (error.rs)
//! - The surface never mutates store state; a store write is still the
//!   way to change a route durably

pub mod auth;
pub mod error;
pub mod handlers;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::routing::RoutingTable;
use crate::watcher::SupervisorHandle;

use self::auth::admin_auth_middleware;
use self::handlers::*;

/// State injected into admin handlers.
#[derive(Clone)]
pub struct AdminState {
    pub table: Arc<RoutingTable>,
    pub supervisor: Option<Arc<SupervisorHandle>>,
    pub api_key: Arc<str>,
}

impl AdminState {
    pub fn new(table: Arc<RoutingTable>, supervisor: Option<Arc<SupervisorHandle>>, api_key: impl Into<Arc<str>>) -> Self {
        Self {
            table,
            supervisor,
            api_key: api_key.into(),
        }
    }
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/routes", get(get_routes))
        .route("/admin/routes/online", get(get_online_routes))
        .route("/admin/routes/{name}/online", post(set_route_online))
        .route("/admin/routes/{name}/offline", post(set_route_offline))
        .route("/admin/services", get(get_services))
        .route("/admin/endpoints", get(get_endpoints))
        .route("/admin/watchers", get(get_watchers))
        .route("/admin/watchers/{kind}/resubscribe", post(resubscribe_watcher))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the admin API on `listener` until `shutdown` resolves.
pub async fn serve(
    listener: TcpListener,
    state: AdminState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), std::io::Error> {
    let addr = listener.local_addr()?;
    tracing::info!(address = %addr, "Admin API starting");

    axum::serve(listener, setup_admin_router(state))
        .with_graceful_shutdown(shutdown)
        .await?;

    tracing::info!("Admin API stopped");
    Ok(())
}
