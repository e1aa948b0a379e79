use std::time::Duration;

use anyhow::Result;
use axum::body::{to_bytes, Body};
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{ConnectOptions, Connection};
use tower::ServiceExt;

use todolist_lib::api::router;
use todolist_lib::migrate::apply_migrations;
use todolist_lib::model::{ListId, TodoItem};
use todolist_lib::state::AppState;
use todolist_lib::store::TodoStore;

#[path = "util.rs"]
mod util;

async fn app() -> (Router, TodoStore) {
    let store = util::temp_store().await;
    (router(AppState::new(store.clone())), store)
}

async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into()))
    };
    (status, value)
}

#[tokio::test]
async fn health_is_ok() {
    let (app, _) = app().await;
    let (status, body) = call(&app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::String("OK".into()));
}

#[tokio::test]
async fn create_list_get_update_delete() -> Result<()> {
    let (app, store) = app().await;
    let (status, created) = call(
        &app,
        Method::POST,
        "/api/lists/default/todos",
        Some(json!({"headline": "Buy milk", "description": "2 litres"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let created: TodoItem = serde_json::from_value(created)?;
    assert_eq!(created.position, 1);
    assert!(!created.done);

    let (status, listed) = call(&app, Method::GET, "/api/lists/default/todos", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed.as_array().map(Vec::len), Some(1));

    let uri = format!("/api/lists/default/todos/{}", created.id);
    let (status, updated) = call(&app, Method::PATCH, &uri, Some(json!({"done": true}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["done"], json!(true));
    assert_eq!(updated["description"], json!("2 litres"));

    let (status, fetched) = call(&app, Method::GET, &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["id"], json!(created.id));

    let (status, deleted) = call(&app, Method::DELETE, &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(deleted["headline"], json!("Buy milk"));
    assert_eq!(store.count(&ListId::default()).await?, 0);

    let (status, body) = call(&app, Method::GET, &uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], json!("TODO/NOT_FOUND"));
    Ok(())
}

#[tokio::test]
async fn move_route_reorders_and_maps_errors() -> Result<()> {
    let (app, store) = app().await;
    let list = ListId::default();
    let items = util::fill(&store, &list, &["A", "B", "C", "D"]).await;

    let (status, moved) = call(
        &app,
        Method::POST,
        "/api/lists/default/todos/move",
        Some(json!({"fromId": items[3].id, "toId": items[1].id})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(moved["position"], json!(2));
    assert_eq!(util::headlines(&store, &list).await, vec!["A", "D", "B", "C"]);

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/lists/default/todos/move",
        Some(json!({"fromId": items[0].id, "toId": items[0].id})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], json!("TODO/INVALID_MOVE"));

    let (status, _) = call(
        &app,
        Method::POST,
        "/api/lists/default/todos/move",
        Some(json!({"fromId": items[0].id, "toId": 999})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(util::headlines(&store, &list).await, vec!["A", "D", "B", "C"]);
    Ok(())
}

#[tokio::test]
async fn malformed_requests_are_validation_errors() {
    let (app, _) = app().await;

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/lists/default/todos",
        Some(json!({"headline": "  ", "description": ""})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], json!("VALIDATION/HEADLINE_REQUIRED"));

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/lists/default/todos",
        Some(json!({"description": "no headline"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], json!("VALIDATION/PAYLOAD"));

    let (status, body) = call(&app, Method::GET, "/api/lists/default/todos/-3", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], json!("VALIDATION/INVALID_ID"));

    let (status, body) = call(&app, Method::GET, "/api/lists/no%20spaces/todos", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], json!("VALIDATION/LIST_ID"));

    let (status, body) = call(
        &app,
        Method::PATCH,
        "/api/lists/default/todos/1",
        Some(json!({"position": 4})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], json!("VALIDATION/PAYLOAD"));

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/lists/default/todos/move",
        Some(json!({"fromId": 0, "toId": 2})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], json!("VALIDATION/INVALID_ID"));
}

#[tokio::test]
async fn lists_are_isolated_over_http() {
    let (app, store) = app().await;
    util::fill(&store, &ListId::parse("work").unwrap(), &["report"]).await;

    let (status, body) = call(&app, Method::GET, "/api/lists/home/todos", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));

    let (_, body) = call(&app, Method::GET, "/api/lists/work/todos", None).await;
    assert_eq!(body[0]["headline"], json!("report"));
    assert_eq!(body[0]["list_id"], json!("work"));
}

#[tokio::test]
async fn locked_database_is_a_conflict_for_the_caller() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let options = SqliteConnectOptions::new()
        .filename(tmp.path().join("todolist.sqlite3"))
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_millis(50));
    let pool = SqlitePoolOptions::new()
        .max_connections(2)
        .connect_with(options.clone())
        .await?;
    apply_migrations(&pool).await?;
    let store = TodoStore::new(pool).with_max_tx_attempts(1);
    let list = ListId::default();
    let items = util::fill(&store, &list, &["A", "B"]).await;
    let app = router(AppState::new(store.clone()));

    // Another writer holds the write lock for the whole request.
    let mut writer = options.connect().await?;
    sqlx::query("BEGIN IMMEDIATE").execute(&mut writer).await?;

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/lists/default/todos/move",
        Some(json!({"fromId": items[1].id, "toId": items[0].id})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "DB/TX_CONFLICT");
    assert_eq!(body["context"]["attempts"], "1");

    sqlx::query("ROLLBACK").execute(&mut writer).await?;
    writer.close().await?;

    assert_eq!(store.verify_density(&list).await?, 2);
    assert_eq!(util::headlines(&store, &list).await, vec!["A", "B"]);
    Ok(())
}
