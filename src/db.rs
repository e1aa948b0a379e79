use anyhow::{Context, Result as AnyResult};
use futures::future::BoxFuture;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Sqlite, Transaction};
use std::path::Path;
use std::str::FromStr;

pub const MEMORY_DB: &str = "sqlite::memory:";

/// Opens the pool for `target`, which is either a file path or `sqlite::memory:`.
///
/// An in-memory database lives inside a single connection, so the pool is
/// capped at one connection in that case.
pub async fn open_sqlite_pool(target: &str) -> AnyResult<Pool<Sqlite>> {
    let in_memory = target == MEMORY_DB;
    let opts = if in_memory {
        SqliteConnectOptions::from_str(MEMORY_DB)?
    } else {
        let path = Path::new(target);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                tracing::error!(
                    target: "todolist",
                    error = %e,
                    event = "db_dir_create_failed",
                    path = %parent.display()
                );
                e
            })?;
        }
        tracing::info!(target: "todolist", event = "db_path", path = %path.display());
        SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Full)
    };

    let pool = SqlitePoolOptions::new()
        .max_connections(if in_memory { 1 } else { 8 })
        .after_connect(|conn, _| {
            Box::pin(async move {
                sqlx::query("PRAGMA foreign_keys=ON;")
                    .execute(&mut *conn)
                    .await?;
                sqlx::query("PRAGMA busy_timeout = 5000;")
                    .execute(&mut *conn)
                    .await?;
                Ok::<_, sqlx::Error>(())
            })
        })
        .connect_with(opts)
        .await
        .with_context(|| format!("open sqlite database {target}"))?;

    log_effective_pragmas(&pool).await;

    Ok(pool)
}

async fn log_effective_pragmas(pool: &Pool<Sqlite>) {
    use tracing::{info, warn};

    let (sqlite_ver,): (String,) = sqlx::query_as("select sqlite_version()")
        .fetch_one(pool)
        .await
        .unwrap_or((String::from("unknown"),));

    let jm: (String,) = sqlx::query_as("PRAGMA journal_mode;")
        .fetch_one(pool)
        .await
        .unwrap_or((String::from("unknown"),));

    let sync: (i64,) = sqlx::query_as("PRAGMA synchronous;")
        .fetch_one(pool)
        .await
        .unwrap_or((i64::MIN,));

    let busy: (i64,) = sqlx::query_as("PRAGMA busy_timeout;")
        .fetch_one(pool)
        .await
        .unwrap_or((i64::MIN,));

    info!(
        target: "todolist",
        event = "db_open",
        sqlite_version = %sqlite_ver,
        journal_mode = %jm.0,
        synchronous = %sync.0,
        busy_timeout_ms = %busy.0
    );

    if !jm.0.eq_ignore_ascii_case("wal") && !jm.0.eq_ignore_ascii_case("memory") {
        warn!(
            target: "todolist",
            event = "db_open_warning",
            msg = "journal_mode != WAL; concurrent readers will block on writers"
        );
    }
}

/// Run work inside a transaction. Commits on success, rolls back on error.
///
/// The closure receives the open transaction and returns a boxed future that
/// borrows it, e.g. `run_in_tx(&pool, |tx| Box::pin(async move { .. }))`.
pub async fn run_in_tx<R, E, F>(pool: &Pool<Sqlite>, f: F) -> Result<R, E>
where
    E: From<sqlx::Error> + std::fmt::Display,
    F: for<'c> FnOnce(&'c mut Transaction<'static, Sqlite>) -> BoxFuture<'c, Result<R, E>>,
{
    use tracing::{debug, error, warn};

    let mut tx = pool.begin().await.map_err(E::from)?;
    debug!(target: "todolist", event = "db_tx_begin");
    match f(&mut tx).await {
        Ok(val) => {
            tx.commit().await.map_err(E::from)?;
            debug!(target: "todolist", event = "db_tx_commit");
            Ok(val)
        }
        Err(e) => {
            if let Err(rb) = tx.rollback().await {
                error!(target: "todolist", event = "db_tx_rollback_failed", error = %rb);
            } else {
                warn!(target: "todolist", event = "db_tx_rollback", error = %e);
            }
            Err(e)
        }
    }
}
