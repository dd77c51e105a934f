use std::fs;

use anyhow::Context;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::paths;

const DEFAULT_FILTER: &str = "info,reqwest=warn,hyper=warn,mio=warn";

/// Initialize structured logging.
///
/// Sets up:
/// - File output: rolling log files in `{data_dir}/logs/ride-voice.*.log`
///   with daily rotation, keeping the latest 5 files.
/// - Console output on stderr. Stdout carries the IPC protocol and is never
///   written to by the logger.
/// - Environment filter: `RUST_LOG`, defaulting to `info` with HTTP internals
///   turned down to `warn`.
///
/// Fails if the log directory cannot be created or a global subscriber is
/// already installed.
pub fn init() -> anyhow::Result<()> {
    let log_dir = paths::get_log_dir();
    fs::create_dir_all(&log_dir)
        .with_context(|| format!("Failed to create log dir {}", log_dir.display()))?;

    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("ride-voice")
        .filename_suffix("log")
        .max_log_files(5)
        .build(&log_dir)
        .context("Failed to create log file appender")?;

    let file_layer = fmt::layer()
        .with_writer(file_appender)
        .with_ansi(false)
        .with_target(true)
        .with_file(true)
        .with_line_number(true);

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .with_target(true)
        .compact();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .context("Logger already initialized")?;

    tracing::info!(log_dir = %log_dir.display(), "Logger initialized");
    Ok(())
}

/// Stderr-only fallback used when the file logger cannot be set up.
pub fn init_console() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)),
        )
        .with_writer(std::io::stderr)
        .try_init();
}
