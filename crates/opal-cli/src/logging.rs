//! Subscriber setup for the driver.
//!
//! `OPAL_TRACE` holds an `EnvFilter` directive (default `off`),
//! `OPAL_LOG_FORMAT` is `pretty` or `json`, and `OPAL_LOG_FILE` adds a file
//! sink next to stderr.

use std::env;
use std::fs::{File, OpenOptions};
use std::io;

use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug)]
pub struct LoggingError(String);

impl std::fmt::Display for LoggingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Failed to initialize logging: {}", self.0)
    }
}

impl std::error::Error for LoggingError {}

fn open_log_file(path: &str) -> Result<File, LoggingError> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|err| LoggingError(format!("cannot open log file: {err}")))
}

fn map_init_err<E: std::fmt::Display>(err: E) -> LoggingError {
    LoggingError(err.to_string())
}

fn build_filter(level: &str) -> Result<EnvFilter, LoggingError> {
    if level.eq_ignore_ascii_case("off") {
        Ok(EnvFilter::default().add_directive(LevelFilter::OFF.into()))
    } else {
        EnvFilter::try_new(level).map_err(|err| LoggingError(format!("invalid log filter: {err}")))
    }
}

/// Install the global subscriber. `level` overrides `OPAL_TRACE`.
///
/// Returns `false` when a subscriber is already configured.
pub fn init(level: Option<String>) -> Result<bool, LoggingError> {
    if tracing::dispatcher::has_been_set() {
        return Ok(false);
    }

    let level_value = level
        .or_else(|| env::var("OPAL_TRACE").ok())
        .unwrap_or_else(|| "off".to_string());
    let filter = build_filter(&level_value)?;

    let format = env::var("OPAL_LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());
    let log_file = env::var("OPAL_LOG_FILE").ok();
    let use_json = format.eq_ignore_ascii_case("json");

    if !use_json && !format.eq_ignore_ascii_case("pretty") {
        return Err(LoggingError(
            "invalid OPAL_LOG_FORMAT (expected 'json' or 'pretty')".to_string(),
        ));
    }

    if use_json {
        let stderr_layer = tracing_subscriber::fmt::layer()
            .with_writer(io::stderr)
            .json();
        let base = tracing_subscriber::registry()
            .with(filter)
            .with(stderr_layer);
        if let Some(path) = log_file {
            let file_layer = tracing_subscriber::fmt::layer()
                .with_writer(open_log_file(&path)?)
                .with_ansi(false)
                .json();
            base.with(file_layer).try_init().map_err(map_init_err)?;
        } else {
            base.try_init().map_err(map_init_err)?;
        }
    } else {
        let stderr_layer = tracing_subscriber::fmt::layer()
            .with_writer(io::stderr)
            .pretty();
        let base = tracing_subscriber::registry()
            .with(filter)
            .with(stderr_layer);
        if let Some(path) = log_file {
            let file_layer = tracing_subscriber::fmt::layer()
                .with_writer(open_log_file(&path)?)
                .with_ansi(false)
                .pretty();
            base.with(file_layer).try_init().map_err(map_init_err)?;
        } else {
            base.try_init().map_err(map_init_err)?;
        }
    }

    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::build_filter;

    #[test]
    fn off_and_directives_parse() {
        assert!(build_filter("off").is_ok());
        assert!(build_filter("OFF").is_ok());
        assert!(build_filter("opal_alm=trace,info").is_ok());
    }

    #[test]
    fn malformed_directive_is_rejected() {
        let err = build_filter("opal_alm=loudest").unwrap_err();
        assert!(err.to_string().contains("invalid log filter"));
    }
}
