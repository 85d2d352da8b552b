//! Logging setup.
//!
//! The relay logs through `tracing` with structured fields. Embedders that
//! already install a subscriber can skip this module entirely.

use std::sync::Once;

use tracing::Span;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: Once = Once::new();

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// JSON structured logs (for production).
    Json,
    /// Pretty-printed logs (for development).
    #[default]
    Pretty,
}

impl LogFormat {
    /// Reads `json` or `pretty`, case-insensitive. Anything else is `Pretty`.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case("json") {
            Self::Json
        } else {
            Self::Pretty
        }
    }
}

/// Initializes the global subscriber.
///
/// `RUST_LOG` controls levels (default `info`). Safe to call more than once;
/// later calls, or calls after another subscriber was installed, are no-ops.
pub fn init_logging(format: LogFormat) {
    INIT.call_once(|| {
        let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        let registry = tracing_subscriber::registry().with(env_filter);
        let _ = match format {
            LogFormat::Json => registry.with(fmt::layer().json()).try_init(),
            LogFormat::Pretty => registry.with(fmt::layer().pretty()).try_init(),
        };
    });
}

/// Span wrapping one long-running relay task.
#[must_use]
pub fn task_span(task: &'static str, channel: &str) -> Span {
    tracing::info_span!("review_relay", task, channel)
}
