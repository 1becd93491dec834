//! Tracing subscriber setup shared by the server and the CLI.
//!
//! Events emitted inside a synthesis keep the fields of the enclosing
//! `synthesize` span (`request_id`, `model`, `voice`), and the span's close
//! event carries its busy/idle time.

use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    prelude::*,
};
use vc_core::{LoggingConfig, VcError, VcResult};

/// Output format of the fmt layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    /// One JSON object per line, span fields flattened into `span`.
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = VcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "pretty" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(VcError::config(format!("unknown log format: {s}"))),
        }
    }
}

fn level_filter(level: &str) -> VcResult<EnvFilter> {
    EnvFilter::try_new(level)
        .map_err(|e| VcError::config(format!("invalid log level {level:?}: {e}")))
}

/// Install the global subscriber described by `config`.
///
/// `RUST_LOG` wins over `config.level`. Returns `Ok(false)` when another
/// subscriber was installed first.
pub fn init(config: &LoggingConfig) -> VcResult<bool> {
    let format: LogFormat = config.format.parse()?;
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => level_filter(&config.level)?,
    };
    let registry = tracing_subscriber::registry().with(filter);

    let installed = match format {
        LogFormat::Text => registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .try_init(),
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(false)
                    .with_target(true)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .try_init(),
    };
    Ok(installed.is_ok())
}
