//! Logging module for boxsh
//!
//! Provides structured logging with tracing. Standard output belongs to the
//! user's shell session, so logs go to stderr or, when configured, are
//! appended to a log file as JSON.

use std::fs::OpenOptions;
use std::path::Path;

use anyhow::Result;
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the logging/tracing system
pub fn init_logging(log_level: &str, log_file: Option<&Path>, debug: bool) -> Result<()> {
    let level = if debug { Level::DEBUG } else { parse_level(log_level) };

    // Build filter from level or RUST_LOG env var
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("boxsh={}", level)));

    let file = log_file.map(|path| {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| (path.to_path_buf(), e))
    });

    match file {
        Some(Ok(file)) => {
            let file_layer = fmt::layer()
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .json()
                .with_writer(std::sync::Mutex::new(file));

            tracing_subscriber::registry()
                .with(filter)
                .with(file_layer)
                .try_init()?;
        }
        other => {
            let stderr_layer = fmt::layer()
                .with_target(false)
                .compact()
                .with_writer(std::io::stderr);

            tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .try_init()?;

            if let Some(Err((path, e))) = other {
                tracing::warn!(path = %path.display(), error = %e, "Failed to open log file, logging to stderr");
            }
        }
    }

    Ok(())
}

fn parse_level(log_level: &str) -> Level {
    match log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::WARN,
    }
}
