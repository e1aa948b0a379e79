use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;

use crate::store::DEFAULT_MAX_TX_ATTEMPTS;

pub const DEFAULT_DB: &str = "todolist.sqlite3";
pub const DEFAULT_BIND: &str = "127.0.0.1:3000";

pub const ENV_DB: &str = "TODOLIST_DB";
pub const ENV_BIND: &str = "TODOLIST_BIND";
pub const ENV_MAX_TX_ATTEMPTS: &str = "TODOLIST_MAX_TX_ATTEMPTS";

const HARD_MAX_TX_ATTEMPTS: u32 = 100;

/// Database target: the flag, then `TODOLIST_DB`, then `todolist.sqlite3`.
pub fn resolve_db(flag: Option<String>, lookup: impl Fn(&str) -> Option<String>) -> String {
    flag.or_else(|| lookup(ENV_DB).filter(|value| !value.trim().is_empty()))
        .unwrap_or_else(|| DEFAULT_DB.to_string())
}

/// Settings for `serve` after CLI flags and environment are merged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServeConfig {
    pub db: String,
    pub bind: SocketAddr,
    pub api_delay: Option<Duration>,
    pub max_tx_attempts: u32,
}

impl ServeConfig {
    pub fn resolve(
        db: Option<String>,
        bind: Option<SocketAddr>,
        api_delay_ms: Option<u64>,
        max_tx_attempts: Option<u32>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> anyhow::Result<Self> {
        let bind = match bind {
            Some(addr) => addr,
            None => {
                let raw = lookup(ENV_BIND).unwrap_or_else(|| DEFAULT_BIND.to_string());
                raw.parse()
                    .with_context(|| format!("parse bind address {raw:?}"))?
            }
        };

        let max_tx_attempts = max_tx_attempts
            .or_else(|| {
                lookup(ENV_MAX_TX_ATTEMPTS).and_then(|value| value.parse::<u32>().ok())
            })
            .filter(|value| *value > 0)
            .map(|value| value.min(HARD_MAX_TX_ATTEMPTS))
            .unwrap_or(DEFAULT_MAX_TX_ATTEMPTS);

        Ok(Self {
            db: resolve_db(db, &lookup),
            bind,
            api_delay: api_delay_ms
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis),
            max_tx_attempts,
        })
    }
}
