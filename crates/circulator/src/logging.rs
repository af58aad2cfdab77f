//! Tracing setup.
//!
//! `RUST_LOG` controls filtering (default `info`). `LOG_FORMAT=json` switches
//! stdout to one JSON object per line. Records emitted through the `log`
//! facade are forwarded into tracing.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

impl LogFormat {
    pub fn from_env() -> Self {
        Self::parse(std::env::var("LOG_FORMAT").ok().as_deref())
    }

    fn parse(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_ascii_lowercase()) {
            Some(v) if v == "json" => Self::Json,
            _ => Self::Compact,
        }
    }
}

/// Installs the global subscriber and the `log` bridge. Safe to call more
/// than once; later calls are ignored.
pub fn init_tracing(format: LogFormat) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let result = match format {
        LogFormat::Compact => tracing::subscriber::set_global_default(
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_target(false).compact()),
        ),
        LogFormat::Json => tracing::subscriber::set_global_default(
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_current_span(true)),
        ),
    };

    if result.is_err() {
        return;
    }

    if let Err(e) = tracing_log::LogTracer::init() {
        tracing::warn!("log records will not be captured: {}", e);
    }
}
