//! Integration tests for the sync endpoints.
//!
//! Tests cover:
//! - GET /campus/v1/health
//! - GET /campus/v1/sync/export
//! - POST /campus/v1/sync/import
//! - Bearer-token authorization

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use campussync_server::{build_app, AppState, Role, ServiceConfig, StoreConfig, TokenConfig};

const EDIT_TOKEN: &str = "edit-token";
const READ_TOKEN: &str = "read-token";

fn config() -> ServiceConfig {
    let mut config = ServiceConfig::default();
    config.server.tokens = vec![
        TokenConfig {
            token: EDIT_TOKEN.to_string(),
            role: Role::Edit,
            label: "importer".to_string(),
        },
        TokenConfig {
            token: READ_TOKEN.to_string(),
            role: Role::Read,
            label: "viewer".to_string(),
        },
    ];
    config
}

fn app_with(config: &ServiceConfig) -> Router {
    let state = AppState::from_config(config).unwrap();
    build_app(state, &config.server.namespace)
}

fn app() -> Router {
    app_with(&config())
}

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Body,
) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        request = request.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = request
        .header(header::CONTENT_TYPE, "application/json")
        .body(body)
        .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

async fn get(app: &Router, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
    send(app, Method::GET, uri, token, Body::empty()).await
}

async fn post(app: &Router, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
    send(app, Method::POST, uri, token, Body::from(body.to_string())).await
}

#[tokio::test]
async fn test_health_needs_no_token() {
    let (status, body) = get(&app(), "/campus/v1/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "ok"}));
}

#[tokio::test]
async fn test_missing_token_is_unauthorized() {
    let app = app();

    let (status, body) = get(&app, "/campus/v1/sync/export", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "unauthorized");
    assert_eq!(body["data"]["status"], 401);

    let (status, _) = get(&app, "/campus/v1/sync/export", Some("guess")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_read_role_is_forbidden() {
    let app = app();

    let (status, body) = get(&app, "/campus/v1/sync/export", Some(READ_TOKEN)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "forbidden");

    let (status, _) = post(
        &app,
        "/campus/v1/sync/import",
        Some(READ_TOKEN),
        json!({"items": [{"post_type": "exam", "slug": "neet"}]}),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_import_then_export() {
    let app = app();

    let (status, report) = post(
        &app,
        "/campus/v1/sync/import",
        Some(EDIT_TOKEN),
        json!({"items": [
            {"post_type": "course", "slug": "b-tech"},
            {"post_type": "college", "title": "ABC College",
             "meta": {"_college_state": "Kerala"},
             "relations": {"linked_courses": ["b-tech"]}},
            {"post_type": "page", "slug": "about"}
        ]}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["created"], 2);
    assert_eq!(report["skipped"], 1);
    assert_eq!(report["errors"], json!(["Invalid or unsupported post type."]));
    assert_eq!(report["items"][1]["action"], "created");
    assert_eq!(report["items"][1]["slug"], "abc-college");

    let (status, body) = get(
        &app,
        "/campus/v1/sync/export?types=college,course&per_page=10",
        Some(EDIT_TOKEN),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["types"], json!(["college", "course"]));
    assert_eq!(body["page"], 1);
    assert_eq!(body["per_page"], 10);
    assert_eq!(body["totals"], json!({"college": 1, "course": 1}));

    let college = &body["items"]["college"][0];
    let course = &body["items"]["course"][0];
    assert_eq!(college["meta"]["_college_state"], "Kerala");
    assert_eq!(college["meta"]["_linked_courses"], json!([course["id"]]));
    assert_eq!(course["meta"]["_linked_colleges"], json!([college["id"]]));
    assert_eq!(college["media"]["_college_logo"], json!({"id": 0, "url": ""}));
    assert_eq!(college["terms"]["college_stream"], json!([]));
}

#[tokio::test]
async fn test_export_errors() {
    let app = app();

    let (status, body) = get(&app, "/campus/v1/sync/export?types=page", Some(EDIT_TOKEN)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body,
        json!({
            "code": "no_types",
            "message": "No valid post types provided.",
            "data": {"status": 400}
        })
    );

    let (status, body) = get(
        &app,
        "/campus/v1/sync/export?since=not-a-date",
        Some(EDIT_TOKEN),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "invalid_since");
}

#[tokio::test]
async fn test_import_errors() {
    let app = app();

    let (status, body) = send(
        &app,
        Method::POST,
        "/campus/v1/sync/import",
        Some(EDIT_TOKEN),
        Body::from("{not json"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "invalid_payload");

    let (status, body) = post(&app, "/campus/v1/sync/import", Some(EDIT_TOKEN), json!([1])).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "invalid_payload");

    let (status, body) = post(
        &app,
        "/campus/v1/sync/import",
        Some(EDIT_TOKEN),
        json!({"items": []}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "no_items");
}

#[tokio::test]
async fn test_dry_run_over_http() {
    let app = app();

    let (_, report) = post(
        &app,
        "/campus/v1/sync/import",
        Some(EDIT_TOKEN),
        json!({"dry_run": true, "items": [{"post_type": "exam", "slug": "neet"}]}),
    )
    .await;
    assert_eq!(report["created"], 1);
    assert_eq!(report["items"][0]["id"], 0);

    let (_, body) = get(&app, "/campus/v1/sync/export?types=exam", Some(EDIT_TOKEN)).await;
    assert_eq!(body["totals"]["exam"], 0);
}

#[tokio::test]
async fn test_auth_can_be_disabled() {
    let mut config = ServiceConfig::default();
    config.server.require_auth = false;
    config.server.namespace = "/sync-api".to_string();
    let app = app_with(&config);

    let (status, _) = get(&app, "/sync-api/sync/export", None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = get(&app, "/campus/v1/sync/export", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_local_backend_persists() {
    let temp = TempDir::new().unwrap();
    let mut config = config();
    config.store = StoreConfig {
        backend: "local".to_string(),
        options: json!({"root": temp.path().join("data")}),
    };

    {
        let app = app_with(&config);
        let (status, _) = post(
            &app,
            "/campus/v1/sync/import",
            Some(EDIT_TOKEN),
            json!({"items": [{"post_type": "stream", "slug": "law"}]}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    let app = app_with(&config);
    let (_, body) = get(&app, "/campus/v1/sync/export?types=stream", Some(EDIT_TOKEN)).await;
    assert_eq!(body["items"]["stream"][0]["slug"], "law");
}
