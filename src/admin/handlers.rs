use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use std::sync::Arc;

use crate::admin::error::ApiError;
use crate::admin::AdminState;
use crate::error::RoutingError;
use crate::routing::snapshot::{EndpointView, RouterView, ServiceView, TableSnapshot};
use crate::routing::{Router, RoutingTable, Status};
use crate::watcher::{WatcherKind, WatcherStatsView};

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: String,
    pub status: &'static str,
    pub routes: usize,
    pub online: usize,
    pub consistent: bool,
    pub watchers: Vec<WatcherStatsView>,
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    let table = &state.table;
    let consistent = table.online_subset_consistent();
    Json(SystemStatus {
        version: table.version().to_string(),
        status: if consistent { "operational" } else { "inconsistent" },
        routes: table.route_count(),
        online: table.online_count(),
        consistent,
        watchers: watcher_stats(&state),
    })
}

pub async fn get_routes(State(state): State<AdminState>) -> Json<TableSnapshot> {
    Json(state.table.snapshot())
}

pub async fn get_online_routes(State(state): State<AdminState>) -> Json<Vec<String>> {
    Json(state.table.online_paths())
}

pub async fn get_services(State(state): State<AdminState>) -> Json<Vec<ServiceView>> {
    Json(state.table.snapshot().services)
}

pub async fn get_endpoints(State(state): State<AdminState>) -> Json<Vec<EndpointView>> {
    Json(state.table.snapshot().endpoints)
}

pub async fn get_watchers(State(state): State<AdminState>) -> Json<Vec<WatcherStatsView>> {
    Json(watcher_stats(&state))
}

pub async fn set_route_online(
    State(state): State<AdminState>,
    Path(name): Path<String>,
) -> Result<Json<RouterView>, ApiError> {
    let (path, router) = frontend_of(&state.table, &name)?;
    state.table.set_router_online(&path)?;
    tracing::info!(router = %name, path = %path, "Router promoted via admin API");
    Ok(Json(RouterView::new(&path, &router, state.table.is_online(&path))))
}

pub async fn set_route_offline(
    State(state): State<AdminState>,
    Path(name): Path<String>,
) -> Result<Json<RouterView>, ApiError> {
    let (path, router) = frontend_of(&state.table, &name)?;
    state.table.set_router_status(&path, Status::Offline)?;
    tracing::info!(router = %name, path = %path, "Router demoted via admin API");
    Ok(Json(RouterView::new(&path, &router, state.table.is_online(&path))))
}

pub async fn resubscribe_watcher(State(state): State<AdminState>, Path(kind): Path<String>) -> StatusCode {
    let Ok(kind) = kind.parse::<WatcherKind>() else {
        return StatusCode::NOT_FOUND;
    };
    match &state.supervisor {
        Some(supervisor) if supervisor.resubscribe(kind) => StatusCode::ACCEPTED,
        _ => StatusCode::NOT_FOUND,
    }
}

fn frontend_of(table: &RoutingTable, name: &str) -> Result<(String, Arc<Router>), RoutingError> {
    let router = table.get_router_by_name(name)?;
    let frontend = router
        .frontend()
        .ok_or_else(|| RoutingError::not_found("frontend api", name))?;
    Ok((frontend.key().to_string(), router))
}

fn watcher_stats(state: &AdminState) -> Vec<WatcherStatsView> {
    state
        .supervisor
        .as_ref()
        .map(|s| s.snapshot())
        .unwrap_or_default()
}
