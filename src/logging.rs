// src/logging.rs

//! Logging setup using `tracing` + `tracing-subscriber`.
//!
//! The engine itself only emits `tracing` events (every state transition
//! carries `operation`, `from` and `to` fields; queue events carry
//! `queue`). Hosts that do not install their own subscriber can use
//! [`init_logging`].
//!
//! Priority for determining the log level:
//! 1. the explicit `level` argument (e.g. from `[logging].level`)
//! 2. `OPQUEUE_LOG` environment variable (e.g. "info", "debug")
//! 3. default to `info`
//!
//! Logs go to STDERR.

use tracing_subscriber::fmt;

use crate::config::LogLevel;
use crate::errors::Result;

pub const LOG_ENV_VAR: &str = "OPQUEUE_LOG";

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logging(level: Option<LogLevel>) -> Result<()> {
    let level = resolve_level(level, std::env::var(LOG_ENV_VAR).ok().as_deref());

    fmt()
        .with_max_level(level)
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| anyhow::anyhow!(err))?;

    Ok(())
}

/// Pick the effective level from an explicit setting and the raw value of
/// the environment variable. Unparseable values are ignored.
pub fn resolve_level(explicit: Option<LogLevel>, env_value: Option<&str>) -> tracing::Level {
    explicit
        .or_else(|| env_value.and_then(|s| s.parse::<LogLevel>().ok()))
        .map(tracing::Level::from)
        .unwrap_or(tracing::Level::INFO)
}
