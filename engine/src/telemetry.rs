//! Telemetry and Observability
//!
//! Sets up `tracing-subscriber` for structured logging. Request handling logs
//! carry `session_id`, `decision_id` and `task_id` fields so one request can be
//! followed across routing, dispatch and aggregation.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the tracing subscriber with the given log level from config.
///
/// Priority: `RUST_LOG` env var > `log_level` parameter > default "info"
///
/// In debug builds: pretty-printed terminal output.
/// In release builds: JSON structured output with spans.
pub fn init_telemetry_with_level(log_level: &str) {
    let default_filter = default_filter(log_level);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&default_filter));

    #[cfg(debug_assertions)]
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .pretty()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .try_init()
            .ok();
    }

    #[cfg(not(debug_assertions))]
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_writer(std::io::stderr),
            )
            .try_init()
            .ok();
    }
}

/// Filter used when `RUST_LOG` is not set. Dependencies stay at warn so HTTP
/// and SQL chatter does not drown engine output.
fn default_filter(log_level: &str) -> String {
    format!(
        "warn,blitz_engine={level},blitz={level},sdk={level}",
        level = log_level
    )
}
