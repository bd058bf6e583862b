//! Structured logging setup.
//!
//! The engine only emits `tracing` events; installing a subscriber is left
//! to the embedding binary. [`init_tracing`] is the stock setup used by
//! `t2ctl` and by tests that want to see the dispatcher's spans.

use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Environment variable holding the filter directives.
pub const LOG_ENV: &str = "T2_LOG";

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

impl LogFormat {
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Pretty,
        }
    }
}

static INSTALLED: OnceCell<LogFormat> = OnceCell::new();

/// Filter for `directives`, falling back to `T2_LOG` and then `info`.
pub fn build_filter(directives: Option<&str>) -> EnvFilter {
    let fallback = || EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    match directives {
        Some(d) => EnvFilter::try_new(d).unwrap_or_else(|_| {
            eprintln!("Warning: Invalid log filter directive: {d}");
            fallback()
        }),
        None => fallback(),
    }
}

/// Install the global subscriber once, as JSON lines when `json` is set.
/// Later calls return the format that won the first call and change nothing.
pub fn init_tracing(directives: Option<&str>, json: bool) -> Result<LogFormat> {
    let format = if json { LogFormat::Json } else { LogFormat::Pretty };
    INSTALLED
        .get_or_try_init(|| {
            let filter = build_filter(directives);
            let fmt_layer = match format {
                LogFormat::Json => tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_target(true)
                    .with_span_list(true)
                    .boxed(),
                LogFormat::Pretty => tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .boxed(),
            };
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt_layer)
                .try_init()
                .context("Failed to initialize logging")?;
            Ok(format)
        })
        .copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_parse() {
        assert_eq!(LogFormat::parse("JSON"), LogFormat::Json);
        assert_eq!(LogFormat::parse("pretty"), LogFormat::Pretty);
        assert_eq!(LogFormat::parse("whatever"), LogFormat::Pretty);
    }

    #[test]
    fn test_build_filter_accepts_directives() {
        let filter = build_filter(Some("t2engine=debug,warn"));
        assert!(filter.to_string().contains("t2engine=debug"));
    }

    #[test]
    fn test_init_is_idempotent() {
        let first = init_tracing(Some("warn"), false).unwrap();
        let second = init_tracing(Some("trace"), true).unwrap();
        assert_eq!(first, second);
    }
}
