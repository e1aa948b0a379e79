use tracing::info;

use crate::model::{ListId, NewTodo, TodoItem};
use crate::store::TodoStore;
use crate::AppResult;

const SAMPLE_TODOS: &[(&str, &str)] = &[
    (
        "1. Buy groceries",
        "I need:\n* Cucumbers\n* Milk\n* Strawberries",
    ),
    (
        "2. Go to the gym",
        "I need to go to the gym at least 3 times a week",
    ),
    ("3. Read a book", "I need to read at least 1 book a month"),
    ("4. Learn a new language", "I need to learn a new language"),
    (
        "5. Write a blog post",
        "I need to write a blog post about keeping a list in order",
    ),
];

/// Replaces the contents of `list` with the sample todos, in order. Either the
/// whole sample lands or the list is left as it was.
pub async fn seed(store: &TodoStore, list: &ListId) -> AppResult<Vec<TodoItem>> {
    let todos = SAMPLE_TODOS
        .iter()
        .map(|(headline, description)| NewTodo::new(*headline, *description))
        .collect();
    let (removed, items) = store.replace_list(list, todos).await?;
    info!(
        target: "todolist",
        event = "seed_applied",
        list_id = %list,
        removed,
        inserted = items.len()
    );
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate::apply_migrations;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn store() -> TodoStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        apply_migrations(&pool).await.unwrap();
        TodoStore::new(pool)
    }

    async fn headlines(store: &TodoStore, list: &ListId) -> Vec<String> {
        store
            .list_all(list)
            .await
            .unwrap()
            .into_iter()
            .map(|item| item.headline)
            .collect()
    }

    #[tokio::test]
    async fn reseeding_replaces_the_list() {
        let store = store().await;
        let list = ListId::default();

        seed(&store, &list).await.unwrap();
        let items = seed(&store, &list).await.unwrap();
        assert_eq!(items.len(), SAMPLE_TODOS.len());
        assert_eq!(store.verify_density(&list).await.unwrap(), SAMPLE_TODOS.len());
        assert_eq!(items[0].headline, "1. Buy groceries");
        assert!(items.iter().all(|item| !item.done));
    }

    #[tokio::test]
    async fn failed_insert_leaves_the_previous_list() {
        let store = store().await;
        let list = ListId::default();
        store.insert(&list, NewTodo::new("keep me", "")).await.unwrap();
        store.insert(&list, NewTodo::new("and me", "")).await.unwrap();

        sqlx::query(
            "CREATE TRIGGER reject_third_sample BEFORE INSERT ON todo \
             WHEN NEW.headline = '3. Read a book' \
             BEGIN SELECT RAISE(ABORT, 'rejected'); END",
        )
        .execute(store.pool())
        .await
        .unwrap();

        assert!(seed(&store, &list).await.is_err());
        assert_eq!(headlines(&store, &list).await, vec!["keep me", "and me"]);
        assert_eq!(store.verify_density(&list).await.unwrap(), 2);
    }
}
