use std::net::SocketAddr;
use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sqlx::SqlitePool;

use todolist_lib::config::{resolve_db, ServeConfig};
use todolist_lib::model::ListId;
use todolist_lib::state::AppState;
use todolist_lib::store::TodoStore;
use todolist_lib::{api, db, migrate, seed, time, LogFormat};

/// Exit code when a list fails the density check.
const DENSITY_EXIT_CODE: i32 = 2;

#[derive(Debug, Parser)]
#[command(name = "todolist", about = "Ordered todo list service", version)]
struct Cli {
    /// SQLite database file, or `sqlite::memory:`. Falls back to TODOLIST_DB.
    #[arg(long, global = true)]
    db: Option<String>,

    #[arg(long, value_enum, global = true, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,

    /// Also write JSON logs to a daily rolling file in this directory.
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the HTTP API.
    Serve {
        /// Address to listen on. Falls back to TODOLIST_BIND, then 127.0.0.1:3000.
        #[arg(long)]
        bind: Option<SocketAddr>,
        /// Delay every API request by this many milliseconds.
        #[arg(long)]
        api_delay_ms: Option<u64>,
        /// Attempts per write before a transaction conflict is returned.
        #[arg(long)]
        max_tx_attempts: Option<u32>,
    },
    /// Apply pending schema migrations.
    Migrate,
    /// Replace a list with the sample todos.
    Seed {
        #[arg(long, default_value = ListId::DEFAULT)]
        list: String,
    },
    /// Verify that positions are dense in one list, or in every list.
    Check {
        #[arg(long)]
        list: Option<String>,
    },
    /// Print a list in position order.
    List {
        #[arg(long, default_value = ListId::DEFAULT)]
        list: String,
        /// Only show unfinished todos.
        #[arg(long)]
        open: bool,
    },
}

fn main() {
    let cli = Cli::parse();
    let log_guard = match todolist_lib::init_logging(cli.log_format, cli.log_dir.as_deref()) {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("Error: {err:#}");
            process::exit(1);
        }
    };

    let code = match run(cli) {
        Ok(code) => code,
        Err(err) => {
            tracing::error!(target: "todolist", event = "command_failed", error = %format!("{err:#}"));
            eprintln!("Error: {err:#}");
            1
        }
    };
    drop(log_guard);
    process::exit(code);
}

fn run(cli: Cli) -> Result<i32> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("start async runtime")?;
    let env = |key: &str| std::env::var(key).ok();

    match cli.command {
        Commands::Serve {
            bind,
            api_delay_ms,
            max_tx_attempts,
        } => {
            let config = ServeConfig::resolve(cli.db, bind, api_delay_ms, max_tx_attempts, env)?;
            runtime.block_on(serve(config))
        }
        Commands::Migrate => {
            let db_target = resolve_db(cli.db, env);
            runtime.block_on(async {
                let pool = db::open_sqlite_pool(&db_target).await?;
                let applied = migrate::apply_migrations(&pool)
                    .await
                    .context("apply migrations")?;
                pool.close().await;
                println!("Applied {applied} migration(s) to {db_target}.");
                Ok::<_, anyhow::Error>(0)
            })
        }
        Commands::Seed { list } => {
            let db_target = resolve_db(cli.db, env);
            let list = ListId::parse(&list)?;
            runtime.block_on(async {
                let pool = open_migrated(&db_target).await?;
                let store = TodoStore::new(pool.clone());
                let items = seed::seed(&store, &list).await?;
                pool.close().await;
                println!("Seeded {} todos into list {list}.", items.len());
                Ok::<_, anyhow::Error>(0)
            })
        }
        Commands::Check { list } => {
            let db_target = resolve_db(cli.db, env);
            let list = list.as_deref().map(ListId::parse).transpose()?;
            runtime.block_on(async {
                let pool = open_migrated(&db_target).await?;
                let code = check(&TodoStore::new(pool.clone()), list).await;
                pool.close().await;
                code
            })
        }
        Commands::List { list, open } => {
            let db_target = resolve_db(cli.db, env);
            let list = ListId::parse(&list)?;
            runtime.block_on(async {
                let pool = open_migrated(&db_target).await?;
                let items = TodoStore::new(pool.clone()).list_all(&list).await?;
                pool.close().await;
                for item in items.iter().filter(|item| !open || !item.done) {
                    println!(
                        "{:>3}. [{}] {} ({})",
                        item.position,
                        if item.done { "x" } else { " " },
                        item.headline,
                        time::format_created_at(item.created_at)
                    );
                }
                Ok::<_, anyhow::Error>(0)
            })
        }
    }
}

async fn open_migrated(db_target: &str) -> Result<SqlitePool> {
    let pool = db::open_sqlite_pool(db_target).await?;
    migrate::apply_migrations(&pool)
        .await
        .context("apply migrations")?;
    Ok(pool)
}

async fn serve(config: ServeConfig) -> Result<i32> {
    let pool = open_migrated(&config.db).await?;
    let store = TodoStore::new(pool.clone()).with_max_tx_attempts(config.max_tx_attempts);
    let state = AppState::new(store).with_api_delay(config.api_delay);
    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("bind {}", config.bind))?;
    api::serve(listener, state, async {
        let _ = tokio::signal::ctrl_c().await;
    })
    .await?;
    pool.close().await;
    Ok(0)
}

async fn check(store: &TodoStore, list: Option<ListId>) -> Result<i32> {
    let lists = match list {
        Some(list) => vec![list],
        None => store.list_ids().await?,
    };
    let mut code = 0;
    for list in lists {
        match store.verify_density(&list).await {
            Ok(count) => println!("{list}: {count} todos, positions dense"),
            Err(err) => {
                println!("{list}: {err}");
                code = DENSITY_EXIT_CODE;
            }
        }
    }
    Ok(code)
}
