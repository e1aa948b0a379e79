//! Server-side access to the `todo` table and the position reordering engine.
//!
//! Every method is scoped to one [`ListId`]. Writes that touch more than one
//! row run inside [`run_in_tx`], so a failure at any step leaves positions as
//! they were. Positions are kept dense (`1..=N`) per list.

use std::future::Future;
use std::time::Duration;

use futures::FutureExt;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};

use crate::db::run_in_tx;
use crate::error::TODO_DENSITY_VIOLATION;
use crate::model::{ListId, NewTodo, TodoId, TodoItem, TodoPatch};
use crate::ordering::{first_duplicate, is_dense, plan_move};
use crate::time::now_ms;
use crate::{AppError, AppResult, ErrorKind};

pub const DEFAULT_MAX_TX_ATTEMPTS: u32 = 5;
const RETRY_BACKOFF_MS: u64 = 10;

/// Slot a moved row occupies while the rows between its old and new slot shift.
const PARKING_POSITION: i64 = 0;

const SELECT_ONE: &str = "SELECT id, list_id, headline, description, done, position, created_at \
     FROM todo WHERE list_id = ? AND id = ?";
const SELECT_LIST: &str = "SELECT id, list_id, headline, description, done, position, created_at \
     FROM todo WHERE list_id = ? ORDER BY position";
const INSERT_ONE: &str = "INSERT INTO todo (list_id, headline, description, done, position, created_at) \
     VALUES (?, ?, ?, ?, ?, ?) \
     RETURNING id, list_id, headline, description, done, position, created_at";
const UPDATE_ONE: &str = "UPDATE todo SET \
       headline = COALESCE(?, headline), \
       description = COALESCE(?, description), \
       done = COALESCE(?, done) \
     WHERE list_id = ? AND id = ? \
     RETURNING id, list_id, headline, description, done, position, created_at";

#[derive(Clone, Debug)]
pub struct TodoStore {
    pool: SqlitePool,
    max_tx_attempts: u32,
}

impl TodoStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            max_tx_attempts: DEFAULT_MAX_TX_ATTEMPTS,
        }
    }

    /// Bound on how many times a conflicting transaction is issued before the
    /// conflict is returned to the caller. Values below one are treated as one.
    pub fn with_max_tx_attempts(mut self, attempts: u32) -> Self {
        self.max_tx_attempts = attempts.max(1);
        self
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn max_tx_attempts(&self) -> u32 {
        self.max_tx_attempts
    }

    pub async fn list_all(&self, list: &ListId) -> AppResult<Vec<TodoItem>> {
        let rows = sqlx::query(SELECT_LIST)
            .bind(list.as_str())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(TodoItem::try_from).collect()
    }

    pub async fn get_by_id(&self, list: &ListId, id: TodoId) -> AppResult<TodoItem> {
        let mut conn = self.pool.acquire().await?;
        fetch_one(&mut conn, list, id).await
    }

    pub async fn count(&self, list: &ListId) -> AppResult<i64> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM todo WHERE list_id = ?")
            .bind(list.as_str())
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Distinct list ids that currently hold at least one todo.
    pub async fn list_ids(&self) -> AppResult<Vec<ListId>> {
        let raw: Vec<String> =
            sqlx::query_scalar("SELECT DISTINCT list_id FROM todo ORDER BY list_id")
                .fetch_all(&self.pool)
                .await?;
        raw.iter().map(|id| ListId::parse(id)).collect()
    }

    /// Appends a new todo at `position = count + 1`.
    pub async fn insert(&self, list: &ListId, todo: NewTodo) -> AppResult<TodoItem> {
        let todo = todo.validated()?;
        let item = self
            .with_conflict_retry("insert", || {
                let list = list.clone();
                let todo = todo.clone();
                run_in_tx(&self.pool, move |tx| {
                    async move { insert_in_tx(&mut **tx, &list, &todo).await }.boxed()
                })
            })
            .await?;
        info!(
            target: "todolist",
            event = "todo_created",
            list_id = %list,
            id = item.id,
            position = item.position
        );
        Ok(item)
    }

    /// Applies a partial update. An empty patch returns the row unchanged.
    pub async fn update_partial(
        &self,
        list: &ListId,
        id: TodoId,
        patch: TodoPatch,
    ) -> AppResult<TodoItem> {
        let patch = patch.validated()?;
        if patch.is_empty() {
            return self.get_by_id(list, id).await;
        }
        let item = self
            .with_conflict_retry("update", || {
                let patch = patch.clone();
                async move {
                    let row = sqlx::query(UPDATE_ONE)
                        .bind(patch.headline)
                        .bind(patch.description)
                        .bind(patch.done)
                        .bind(list.as_str())
                        .bind(id)
                        .fetch_optional(&self.pool)
                        .await?;
                    match row {
                        Some(row) => TodoItem::try_from(&row),
                        None => Err(not_found(list, id)),
                    }
                }
            })
            .await?;
        debug!(target: "todolist", event = "todo_updated", list_id = %list, id);
        Ok(item)
    }

    /// Deletes the row and closes the gap it leaves. Returns the deleted row.
    pub async fn delete(&self, list: &ListId, id: TodoId) -> AppResult<TodoItem> {
        let item = self
            .with_conflict_retry("delete", || {
                let list = list.clone();
                run_in_tx(&self.pool, move |tx| {
                    async move { delete_in_tx(&mut **tx, &list, id).await }.boxed()
                })
            })
            .await?;
        info!(
            target: "todolist",
            event = "todo_deleted",
            list_id = %list,
            id,
            position = item.position
        );
        Ok(item)
    }

    /// Moves `from_id` into the slot currently held by `to_id`.
    ///
    /// Rows strictly between the two slots shift by one toward the vacated
    /// slot. Fails with `InvalidMove` when both ids are equal and `NotFound`
    /// when either id is absent; nothing is written in either case.
    pub async fn move_between_positions(
        &self,
        list: &ListId,
        from_id: TodoId,
        to_id: TodoId,
    ) -> AppResult<TodoItem> {
        if from_id == to_id {
            return Err(AppError::invalid_move("Cannot move a todo onto its own slot")
                .with_context("from_id", from_id.to_string())
                .with_context("to_id", to_id.to_string()));
        }
        let (before, item) = self
            .with_conflict_retry("move", || {
                let list = list.clone();
                run_in_tx(&self.pool, move |tx| {
                    async move { move_in_tx(&mut **tx, &list, from_id, to_id).await }.boxed()
                })
            })
            .await?;
        info!(
            target: "todolist",
            event = "todo_moved",
            list_id = %list,
            id = from_id,
            from_position = before,
            to_position = item.position
        );
        Ok(item)
    }

    /// Replaces the contents of `list` with `todos`, in order, in a single
    /// transaction. Returns how many rows were removed and the inserted rows.
    pub async fn replace_list(
        &self,
        list: &ListId,
        todos: Vec<NewTodo>,
    ) -> AppResult<(u64, Vec<TodoItem>)> {
        let todos = todos
            .into_iter()
            .map(NewTodo::validated)
            .collect::<AppResult<Vec<_>>>()?;
        self.with_conflict_retry("replace", || {
            let list = list.clone();
            let todos = todos.clone();
            run_in_tx(&self.pool, move |tx| {
                async move {
                    let removed = sqlx::query("DELETE FROM todo WHERE list_id = ?")
                        .bind(list.as_str())
                        .execute(&mut **tx)
                        .await?
                        .rows_affected();
                    let mut items = Vec::with_capacity(todos.len());
                    for todo in &todos {
                        items.push(insert_in_tx(&mut **tx, &list, todo).await?);
                    }
                    Ok((removed, items))
                }
                .boxed()
            })
        })
        .await
    }

    /// Checks that the positions of `list` are exactly `1..=N`. Returns `N`.
    pub async fn verify_density(&self, list: &ListId) -> AppResult<usize> {
        let positions: Vec<i64> =
            sqlx::query_scalar("SELECT position FROM todo WHERE list_id = ? ORDER BY position")
                .bind(list.as_str())
                .fetch_all(&self.pool)
                .await?;
        if is_dense(positions.iter().copied()) {
            return Ok(positions.len());
        }
        let mut err = AppError::new(TODO_DENSITY_VIOLATION, "Positions are not a dense 1..N sequence")
            .with_context("list_id", list.to_string())
            .with_context("count", positions.len().to_string());
        if let Some(dup) = first_duplicate(positions.iter().copied()) {
            err = err.with_context("duplicate", dup.to_string());
        }
        if let Some(gap) = (1..=positions.len() as i64).find(|p| positions.binary_search(p).is_err()) {
            err = err.with_context("missing", gap.to_string());
        }
        Err(err)
    }

    /// Runs `attempt` until it stops failing with a transaction conflict, at
    /// most `max_tx_attempts` times, with a linear backoff between tries.
    pub async fn with_conflict_retry<T, F, Fut>(&self, op: &'static str, mut attempt: F) -> AppResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        let mut tries = 1u32;
        loop {
            match attempt().await {
                Err(err) if err.kind() == ErrorKind::TransactionConflict => {
                    if tries >= self.max_tx_attempts {
                        warn!(
                            target: "todolist",
                            event = "tx_conflict_exhausted",
                            op,
                            attempts = tries,
                            error = %err
                        );
                        return Err(err.with_context("attempts", tries.to_string()));
                    }
                    warn!(target: "todolist", event = "tx_conflict_retry", op, attempt = tries);
                    tokio::time::sleep(Duration::from_millis(RETRY_BACKOFF_MS * u64::from(tries)))
                        .await;
                    tries += 1;
                }
                other => return other,
            }
        }
    }
}

fn not_found(list: &ListId, id: TodoId) -> AppError {
    AppError::not_found(id).with_context("list_id", list.to_string())
}

async fn fetch_one(conn: &mut SqliteConnection, list: &ListId, id: TodoId) -> AppResult<TodoItem> {
    let row = sqlx::query(SELECT_ONE)
        .bind(list.as_str())
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    match row {
        Some(row) => TodoItem::try_from(&row),
        None => Err(not_found(list, id)),
    }
}

/// Shifts every position in `start..=end` by `delta`.
///
/// The unique index on `(list_id, position)` is checked row by row, so the
/// shifted rows are first moved to negative slots and then flipped back.
async fn shift_range(
    conn: &mut SqliteConnection,
    list: &ListId,
    start: i64,
    end: i64,
    delta: i64,
) -> AppResult<u64> {
    let shifted = sqlx::query(
        "UPDATE todo SET position = -(position + ?) \
         WHERE list_id = ? AND position BETWEEN ? AND ?",
    )
    .bind(delta)
    .bind(list.as_str())
    .bind(start)
    .bind(end)
    .execute(&mut *conn)
    .await?
    .rows_affected();
    sqlx::query("UPDATE todo SET position = -position WHERE list_id = ? AND position < 0")
        .bind(list.as_str())
        .execute(&mut *conn)
        .await?;
    Ok(shifted)
}

async fn insert_in_tx(
    conn: &mut SqliteConnection,
    list: &ListId,
    todo: &NewTodo,
) -> AppResult<TodoItem> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM todo WHERE list_id = ?")
        .bind(list.as_str())
        .fetch_one(&mut *conn)
        .await?;
    let row = sqlx::query(INSERT_ONE)
        .bind(list.as_str())
        .bind(&todo.headline)
        .bind(&todo.description)
        .bind(todo.done)
        .bind(count + 1)
        .bind(now_ms())
        .fetch_one(&mut *conn)
        .await?;
    TodoItem::try_from(&row)
}

async fn delete_in_tx(
    conn: &mut SqliteConnection,
    list: &ListId,
    id: TodoId,
) -> AppResult<TodoItem> {
    let item = fetch_one(conn, list, id).await?;
    sqlx::query("DELETE FROM todo WHERE list_id = ? AND id = ?")
        .bind(list.as_str())
        .bind(id)
        .execute(&mut *conn)
        .await?;
    shift_range(conn, list, item.position + 1, i64::MAX, -1).await?;
    Ok(item)
}

/// Returns the moved row's previous position along with its new state.
async fn move_in_tx(
    conn: &mut SqliteConnection,
    list: &ListId,
    from_id: TodoId,
    to_id: TodoId,
) -> AppResult<(i64, TodoItem)> {
    let from = fetch_one(conn, list, from_id).await?;
    let to = fetch_one(conn, list, to_id).await?;
    let plan = plan_move(from.position, to.position).map_err(|err| {
        AppError::from(err)
            .with_context("from_id", from_id.to_string())
            .with_context("to_id", to_id.to_string())
    })?;

    sqlx::query("UPDATE todo SET position = ? WHERE list_id = ? AND id = ?")
        .bind(PARKING_POSITION)
        .bind(list.as_str())
        .bind(from_id)
        .execute(&mut *conn)
        .await?;
    shift_range(conn, list, plan.shift_start, plan.shift_end, plan.delta).await?;
    sqlx::query("UPDATE todo SET position = ? WHERE list_id = ? AND id = ?")
        .bind(plan.target)
        .bind(list.as_str())
        .bind(from_id)
        .execute(&mut *conn)
        .await?;

    let moved = fetch_one(conn, list, from_id).await?;
    Ok((from.position, moved))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DB_TX_CONFLICT;
    use crate::migrate::apply_migrations;
    use sqlx::sqlite::SqlitePoolOptions;
    use std::sync::atomic::{AtomicU32, Ordering};

    async fn store() -> TodoStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        apply_migrations(&pool).await.unwrap();
        TodoStore::new(pool)
    }

    #[tokio::test]
    async fn lists_are_independent() {
        let store = store().await;
        let a = ListId::parse("a").unwrap();
        let b = ListId::parse("b").unwrap();
        store.insert(&a, NewTodo::new("one", "")).await.unwrap();
        let first_b = store.insert(&b, NewTodo::new("two", "")).await.unwrap();
        assert_eq!(first_b.position, 1);
        assert_eq!(store.count(&a).await.unwrap(), 1);
        assert_eq!(store.list_ids().await.unwrap(), vec![a.clone(), b.clone()]);

        let err = store.get_by_id(&a, first_b.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn empty_patch_returns_row_unchanged() {
        let store = store().await;
        let list = ListId::default();
        let item = store.insert(&list, NewTodo::new("read", "book")).await.unwrap();
        let same = store
            .update_partial(&list, item.id, TodoPatch::default())
            .await
            .unwrap();
        assert_eq!(same, item);
    }

    #[tokio::test]
    async fn update_keeps_position_and_created_at() {
        let store = store().await;
        let list = ListId::default();
        let item = store.insert(&list, NewTodo::new("read", "book")).await.unwrap();
        let done = store
            .update_partial(&list, item.id, TodoPatch::done(true))
            .await
            .unwrap();
        assert!(done.done);
        assert_eq!(done.position, item.position);
        assert_eq!(done.created_at, item.created_at);
        assert_eq!(done.description, "book");
    }

    #[tokio::test]
    async fn replace_list_validates_before_touching_rows() {
        let store = store().await;
        let list = ListId::default();
        let kept = store.insert(&list, NewTodo::new("kept", "")).await.unwrap();
        let err = store
            .replace_list(&list, vec![NewTodo::new("fine", ""), NewTodo::new("  ", "")])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(store.list_all(&list).await.unwrap(), vec![kept]);

        let (removed, items) = store
            .replace_list(&list, vec![NewTodo::new("a", ""), NewTodo::new("b", "")])
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(items.iter().map(|i| i.position).collect::<Vec<_>>(), vec![1, 2]);
    }

    #[tokio::test]
    async fn density_violation_is_reported() {
        let store = store().await;
        let list = ListId::default();
        let item = store.insert(&list, NewTodo::new("a", "")).await.unwrap();
        store.insert(&list, NewTodo::new("b", "")).await.unwrap();
        sqlx::query("UPDATE todo SET position = 7 WHERE id = ?")
            .bind(item.id)
            .execute(store.pool())
            .await
            .unwrap();
        let err = store.verify_density(&list).await.unwrap_err();
        assert_eq!(err.code(), TODO_DENSITY_VIOLATION);
        assert_eq!(err.context().get("missing"), Some(&"1".to_string()));
    }

    #[tokio::test]
    async fn conflicts_are_retried_up_to_the_bound() {
        let store = store().await.with_max_tx_attempts(3);
        let calls = AtomicU32::new(0);
        let err = store
            .with_conflict_retry("test", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(AppError::new(DB_TX_CONFLICT, "busy")) }
            })
            .await
            .unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(err.kind(), ErrorKind::TransactionConflict);
        assert_eq!(err.context().get("attempts"), Some(&"3".to_string()));
    }

    #[tokio::test]
    async fn other_errors_are_not_retried() {
        let store = store().await;
        let calls = AtomicU32::new(0);
        let result = store
            .with_conflict_retry("test", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        Err(AppError::new(DB_TX_CONFLICT, "busy"))
                    } else {
                        Err::<(), _>(AppError::not_found(1))
                    }
                }
            })
            .await
            .unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(result.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn pool_timeouts_are_returned_without_retry() {
        let store = store().await.with_max_tx_attempts(4);
        let calls = AtomicU32::new(0);
        let err = store
            .with_conflict_retry("test", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(AppError::from(sqlx::Error::PoolTimedOut)) }
            })
            .await
            .unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(err.code(), crate::error::DB_POOL_TIMEOUT);
        assert_eq!(err.kind(), ErrorKind::Internal);
    }
}
