use axum::http::StatusCode;
use http_body_util::BodyExt;
use serde_json::json;
use storefront_core::config::{Config, PublishConfig, StoreConfig};
use storefront_server::{build_router, AppState};
use tempfile::TempDir;
use tower::ServiceExt;

const TOKEN: &str = "test-admin-token";

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn config_with(publish: PublishConfig) -> Config {
    let mut config = Config {
        publish,
        ..Config::default()
    };
    config.store = StoreConfig::Memory;
    config.server.admin_token = Some(TOKEN.into());
    config
}

fn app_state() -> AppState {
    AppState::from_config(&config_with(PublishConfig::default())).unwrap()
}

/// Publishing wired to a mock deploy hook, purge disabled.
fn publishing_state(hook_url: String, debounce_ms: u64) -> AppState {
    let mut publish = PublishConfig {
        deploy_hook_url: Some(hook_url),
        debounce_ms,
        ..PublishConfig::default()
    };
    publish.cache_purge.enabled = false;
    AppState::from_config(&config_with(publish)).unwrap()
}

/// Send a GET request via `oneshot` and return (status, parsed JSON body).
async fn get(app: axum::Router, uri: &str, token: Option<&str>) -> (StatusCode, serde_json::Value) {
    let mut req = axum::http::Request::builder().uri(uri);
    if let Some(t) = token {
        req = req.header("authorization", format!("Bearer {t}"));
    }
    let response = app
        .oneshot(req.body(axum::body::Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
    (status, json)
}

/// Send an authorized POST request with a JSON body and return (status, parsed JSON body).
async fn post_json(
    app: axum::Router,
    uri: &str,
    body: serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    let req = axum::http::Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .header("authorization", format!("Bearer {TOKEN}"))
        .body(axum::body::Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap();
    let response = app.oneshot(req).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
    (status, json)
}

// ---------------------------------------------------------------------------
// Public endpoints
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_is_open() {
    let (status, body) = get(build_router(app_state()), "/api/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "ok": true }));
}

#[tokio::test]
async fn debug_flags_are_public() {
    let mut config = config_with(PublishConfig::default());
    config.server.debug_errors = true;
    let app = build_router(AppState::from_config(&config).unwrap());

    let (status, body) = get(app, "/api/public/get-debug-flags", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "debugErrors": true }));
}

// ---------------------------------------------------------------------------
// Auth
// ---------------------------------------------------------------------------

#[tokio::test]
async fn admin_routes_require_token() {
    let app = build_router(app_state());
    let (status, body) = get(app.clone(), "/api/get-data?tableName=products", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthorized");

    let (status, _) = get(app, "/api/get-data?tableName=products", Some("wrong")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn missing_server_token_refuses_admin_routes() {
    let mut config = config_with(PublishConfig::default());
    config.server.admin_token = None;
    let app = build_router(AppState::from_config(&config).unwrap());

    let (status, body) = get(app, "/api/get-data?tableName=products", Some(TOKEN)).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "admin token not configured");
}

// ---------------------------------------------------------------------------
// Data routes
// ---------------------------------------------------------------------------

#[tokio::test]
async fn save_then_read_table_and_item() {
    let app = build_router(app_state());

    let (status, body) = post_json(
        app.clone(),
        "/api/save-data",
        json!({ "tableName": "products", "item": { "itemName": "Mug", "price": 12 } }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "success": true }));

    // Same partition value replaces the row.
    post_json(
        app.clone(),
        "/api/save-data",
        json!({ "tableName": "products", "item": { "itemName": "Mug", "price": 15 } }),
    )
    .await;

    let (status, table) = get(app.clone(), "/api/get-data?tableName=products", Some(TOKEN)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(table, json!([{ "itemName": "Mug", "price": 15 }]));

    let (_, item) = get(app.clone(), "/api/get-data?tableName=products&key=Mug", Some(TOKEN)).await;
    assert_eq!(item["price"], 15);

    let (status, missing) = get(app, "/api/get-data?tableName=products&key=Bowl", Some(TOKEN)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(missing.is_null());
}

#[tokio::test]
async fn empty_table_reads_as_empty_array() {
    let (status, body) = get(
        build_router(app_state()),
        "/api/get-data?tableName=home_page",
        Some(TOKEN),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn numeric_section_keys_match_string_queries() {
    let app = build_router(app_state());
    post_json(
        app.clone(),
        "/api/save-data",
        json!({ "tableName": "about_page", "item": { "sectionIndex": 2, "title": "Story" } }),
    )
    .await;

    let (_, item) = get(app.clone(), "/api/get-data?tableName=about_page&key=2", Some(TOKEN)).await;
    assert_eq!(item["title"], "Story");

    let (status, _) = post_json(
        app.clone(),
        "/api/delete-data",
        json!({ "tableName": "about_page", "key": "2" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, table) = get(app, "/api/get-data?tableName=about_page", Some(TOKEN)).await;
    assert_eq!(table, json!([]));
}

#[tokio::test]
async fn invalid_table_is_400() {
    let app = build_router(app_state());
    let (status, body) = get(app.clone(), "/api/get-data?tableName=orders", Some(TOKEN)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("orders"));

    let (status, _) = post_json(
        app,
        "/api/save-data",
        json!({ "tableName": "orders", "item": { "itemName": "x" } }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn item_without_partition_field_is_400() {
    let (status, body) = post_json(
        build_router(app_state()),
        "/api/save-data",
        json!({ "tableName": "products", "item": { "price": 3 } }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("itemName"));
}

#[tokio::test]
async fn delete_without_key_is_400() {
    let (status, body) = post_json(
        build_router(app_state()),
        "/api/delete-data",
        json!({ "tableName": "products" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "key is required");
}

#[tokio::test]
async fn data_survives_on_redb_store() {
    let dir = TempDir::new().unwrap();
    let mut config = config_with(PublishConfig::default());
    config.store = StoreConfig::Redb {
        path: dir.path().join("store.redb"),
    };

    {
        let app = build_router(AppState::from_config(&config).unwrap());
        let (status, _) = post_json(
            app,
            "/api/save-data",
            json!({ "tableName": "contact_page", "item": { "sectionIndex": 0, "email": "a@b.c" } }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    let app = build_router(AppState::from_config(&config).unwrap());
    let (_, item) = get(app, "/api/get-data?tableName=contact_page&key=0", Some(TOKEN)).await;
    assert_eq!(item["email"], "a@b.c");
}

// ---------------------------------------------------------------------------
// Publishing
// ---------------------------------------------------------------------------

#[tokio::test]
async fn each_write_publishes_without_debounce() {
    let mut server = mockito::Server::new_async().await;
    let hook = server
        .mock("POST", "/hook")
        .with_status(200)
        .expect(2)
        .create_async()
        .await;

    let state = publishing_state(format!("{}/hook", server.url()), 0);
    let tasks = state.scheduler.tasks().clone();
    let app = build_router(state);

    post_json(
        app.clone(),
        "/api/save-data",
        json!({ "tableName": "products", "item": { "itemName": "Mug" } }),
    )
    .await;
    post_json(
        app,
        "/api/delete-data",
        json!({ "tableName": "products", "key": "Mug" }),
    )
    .await;

    tasks.drain().await;
    hook.assert_async().await;
}

#[tokio::test]
async fn burst_of_writes_publishes_once() {
    let mut server = mockito::Server::new_async().await;
    let hook = server
        .mock("POST", "/hook")
        .with_status(200)
        .expect(1)
        .create_async()
        .await;

    let state = publishing_state(format!("{}/hook", server.url()), 200);
    let tasks = state.scheduler.tasks().clone();
    let app = build_router(state);

    for name in ["A", "B", "C"] {
        let (status, _) = post_json(
            app.clone(),
            "/api/save-data",
            json!({ "tableName": "products", "item": { "itemName": name } }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    tasks.drain().await;
    hook.assert_async().await;
}

#[tokio::test]
async fn failing_hook_does_not_fail_the_write() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/hook")
        .with_status(500)
        .create_async()
        .await;

    let state = publishing_state(format!("{}/hook", server.url()), 0);
    let tasks = state.scheduler.tasks().clone();
    let app = build_router(state);

    let (status, body) = post_json(
        app,
        "/api/save-data",
        json!({ "tableName": "products", "item": { "itemName": "Mug" } }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "success": true }));
    tasks.drain().await;
}

#[tokio::test]
async fn shutdown_waits_for_pending_publish() {
    let mut server = mockito::Server::new_async().await;
    let hook = server
        .mock("POST", "/hook")
        .with_status(200)
        .expect(1)
        .create_async()
        .await;

    let state = publishing_state(format!("{}/hook", server.url()), 300);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let serving = tokio::spawn(storefront_server::serve_on(state, listener, async move {
        let _ = stop_rx.await;
    }));

    let resp = reqwest::Client::new()
        .post(format!("http://127.0.0.1:{port}/api/save-data"))
        .bearer_auth(TOKEN)
        .json(&json!({ "tableName": "products", "item": { "itemName": "Mug" } }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);

    // Stop before the debounce window elapses; the pending publish must still go out.
    stop_tx.send(()).unwrap();
    serving.await.unwrap().unwrap();
    hook.assert_async().await;
}
