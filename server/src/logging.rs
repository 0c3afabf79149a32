//! # Structured Logging
//!
//! Subscriber setup for the custody server. A custody server's logs sit
//! one careless format string away from leaking a token or a share
//! value, so the handlers log identifiers and outcomes only; this module
//! decides how those events are rendered and keeps them on stderr, away
//! from anything a caller might pipe.
//!
//! Three renderings, chosen per deployment:
//!
//! - `compact` — one line per event. The default: custody servers run
//!   under journald or a container runtime that does its own wrapping.
//! - `pretty`  — multi-line, colored, with source locations. Local
//!   debugging only.
//! - `json`    — machine-parseable lines for log aggregation.
//!
//! The `RUST_LOG` environment variable overrides the server's default
//! filter when set, using the usual `EnvFilter` directive syntax.

use std::str::FromStr;

use tracing_subscriber::EnvFilter;

/// How log events are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Single-line events, targets included. Deployment default.
    Compact,
    /// Multi-line human-oriented output with source locations.
    Pretty,
    /// JSON lines for aggregation pipelines.
    Json,
}

/// A format string the server does not recognize. Startup refuses it
/// outright — a misspelled `--log-format` silently falling back to some
/// default is exactly how a fleet ends up with unparseable logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownLogFormat(String);

impl std::fmt::Display for UnknownLogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "unknown log format {:?} (expected compact, pretty, or json)",
            self.0
        )
    }
}

impl std::error::Error for UnknownLogFormat {}

impl FromStr for LogFormat {
    type Err = UnknownLogFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "compact" => Ok(LogFormat::Compact),
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(UnknownLogFormat(other.to_string())),
        }
    }
}

/// Installs the global subscriber. Call exactly once, before the first
/// request can arrive; a second call panics.
///
/// `default_filter` applies when `RUST_LOG` is unset — the server passes
/// a directive string scoped to its own crates so dependency chatter
/// stays off at the default level.
pub fn init_logging(default_filter: &str, format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Compact => builder.compact().with_target(true).init(),
        LogFormat::Pretty => builder
            .pretty()
            .with_file(true)
            .with_line_number(true)
            .init(),
        LogFormat::Json => builder.json().with_current_span(false).init(),
    }

    tracing::info!(?format, "logging initialized");
}
