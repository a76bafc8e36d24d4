//! Admin API tests driven through the axum router.

use axum::body::{to_bytes, Body};
use axum::http::{header::AUTHORIZATION, Request, StatusCode};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

use api_gateway::admin::{setup_admin_router, AdminState};
use api_gateway::routing::{RoutingTable, Status};

mod common;

const KEY: &str = "test-key";

fn state() -> (Arc<RoutingTable>, AdminState) {
    let (table, service) = common::table_with_service(Status::Online);
    let (front, _) = table.create_frontend_api("/api/users");
    table
        .create_router("users", front, table.create_backend_api("/users"), service, vec![])
        .unwrap();
    let table = Arc::new(table);
    let state = AdminState::new(Arc::clone(&table), None, KEY);
    (table, state)
}

async fn call(state: &AdminState, method: &str, uri: &str) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header(AUTHORIZATION, format!("Bearer {KEY}"))
        .body(Body::empty())
        .unwrap();
    let response = setup_admin_router(state.clone()).oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

#[tokio::test]
async fn test_requires_bearer_token() {
    let (_, state) = state();
    let request = Request::builder()
        .uri("/admin/status")
        .header(AUTHORIZATION, "Bearer wrong")
        .body(Body::empty())
        .unwrap();
    let response = setup_admin_router(state).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_status_and_routes() {
    let (_, state) = state();

    let (status, body) = call(&state, "GET", "/admin/status").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["routes"], 1);
    assert_eq!(body["online"], 0);
    assert_eq!(body["consistent"], true);

    let (status, body) = call(&state, "GET", "/admin/routes").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["routes"][0]["path"], "/api/users");
    assert_eq!(body["routes"][0]["status"], "offline");

    let (_, body) = call(&state, "GET", "/admin/services").await;
    assert_eq!(body[0]["name"], "svc");
    let (_, body) = call(&state, "GET", "/admin/endpoints").await;
    assert_eq!(body[0]["port"], 8080);
}

#[tokio::test]
async fn test_promote_and_demote() {
    let (table, state) = state();

    let (status, body) = call(&state, "POST", "/admin/routes/users/online").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["online"], true);
    assert!(table.is_online("/api/users"));

    let (_, body) = call(&state, "GET", "/admin/routes/online").await;
    assert_eq!(body, serde_json::json!(["/api/users"]));

    let (status, body) = call(&state, "POST", "/admin/routes/users/online").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "already_online");
    assert_eq!(body["code"], 36);

    let (status, _) = call(&state, "POST", "/admin/routes/users/offline").await;
    assert_eq!(status, StatusCode::OK);
    assert!(!table.is_online("/api/users"));
}

#[tokio::test]
async fn test_domain_errors_map_to_statuses() {
    let (table, state) = state();

    let (status, body) = call(&state, "POST", "/admin/routes/missing/online").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["kind"], "not_found");

    table.get_endpoint_by_name("ep").unwrap().set_status(Status::Offline);
    let (status, body) = call(&state, "POST", "/admin/routes/users/online").await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["kind"], "no_online_endpoint");
}

#[tokio::test]
async fn test_watcher_routes_without_supervisor() {
    let (_, state) = state();
    let (status, body) = call(&state, "GET", "/admin/watchers").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, serde_json::json!([]));

    let (status, _) = call(&state, "POST", "/admin/watchers/route/resubscribe").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
