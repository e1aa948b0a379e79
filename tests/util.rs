#![allow(clippy::unwrap_used, clippy::expect_used, dead_code)]

use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use todolist_lib::migrate::apply_migrations;
use todolist_lib::model::{ListId, NewTodo, TodoId, TodoItem};
use todolist_lib::store::TodoStore;

pub async fn temp_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("connect sqlite::memory:");
    sqlx::query("PRAGMA foreign_keys=ON;")
        .execute(&pool)
        .await
        .unwrap();
    pool
}

pub async fn temp_store() -> TodoStore {
    let pool = temp_pool().await;
    apply_migrations(&pool).await.expect("apply migrations");
    TodoStore::new(pool)
}

/// Inserts `headlines` in order and returns the created rows.
pub async fn fill(store: &TodoStore, list: &ListId, headlines: &[&str]) -> Vec<TodoItem> {
    let mut items = Vec::new();
    for headline in headlines {
        items.push(
            store
                .insert(list, NewTodo::new(*headline, ""))
                .await
                .expect("insert todo"),
        );
    }
    items
}

/// Headlines in position order.
pub async fn headlines(store: &TodoStore, list: &ListId) -> Vec<String> {
    store
        .list_all(list)
        .await
        .unwrap()
        .into_iter()
        .map(|item| item.headline)
        .collect()
}

/// `(id, position)` pairs in position order.
pub async fn positions(store: &TodoStore, list: &ListId) -> Vec<(TodoId, i64)> {
    store
        .list_all(list)
        .await
        .unwrap()
        .into_iter()
        .map(|item| (item.id, item.position))
        .collect()
}
