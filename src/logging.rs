use std::env;
use std::path::Path;

use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry};

pub const LOG_ENV: &str = "TODOLIST_LOG";
pub const LOG_FILE_PREFIX: &str = "todolist.log";
const DEFAULT_FILTER: &str = "info,sqlx=warn";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Keeps the file writer flushing until dropped. Hold it for the life of the process.
#[must_use]
pub struct LogGuard {
    _file: Option<WorkerGuard>,
}

/// Filter directives from `RUST_LOG`, then `TODOLIST_LOG`, then the default.
pub fn filter_directives(lookup: impl Fn(&str) -> Option<String>) -> String {
    lookup("RUST_LOG")
        .filter(|value| !value.trim().is_empty())
        .or_else(|| lookup(LOG_ENV).filter(|value| !value.trim().is_empty()))
        .unwrap_or_else(|| DEFAULT_FILTER.to_string())
}

/// Installs the global subscriber: stderr in `format`, plus a daily rolling
/// JSON file under `log_dir` when one is given.
///
/// A second call keeps the subscriber that is already installed.
pub fn init_logging(format: LogFormat, log_dir: Option<&Path>) -> anyhow::Result<LogGuard> {
    let directives = filter_directives(|key| env::var(key).ok());
    let filter = EnvFilter::try_new(&directives)
        .or_else(|_| EnvFilter::try_new(DEFAULT_FILTER))
        .context("build log filter")?;

    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();
    layers.push(match format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed(),
        LogFormat::Pretty => fmt::layer()
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed(),
    });

    let mut file_guard = None;
    if let Some(dir) = log_dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("create log directory {}", dir.display()))?;
        let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        layers.push(
            fmt::layer()
                .json()
                .with_ansi(false)
                .with_target(true)
                .with_writer(writer)
                .boxed(),
        );
        file_guard = Some(guard);
    }

    let _ = tracing_subscriber::registry()
        .with(layers.with_filter(filter))
        .try_init();

    tracing::debug!(target: "todolist", event = "logging_ready", filter = %directives);
    Ok(LogGuard { _file: file_guard })
}
