//! Telemetry and Observability
//!
//! Sets up `tracing-subscriber` for structured logging. The level comes from
//! `RUST_LOG` when present, otherwise from `core.log_level`.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Build the filter directive used when `RUST_LOG` is not set
///
/// Dependency crates (sqlx, hyper, reqwest) stay at `warn` so a `debug`
/// session only shows Forge's own spans.
pub fn default_directive(log_level: &str) -> String {
    format!(
        "warn,forge_engine={level},forge={level},sdk={level}",
        level = log_level
    )
}

/// Initialize the tracing subscriber with the given log level from config.
///
/// Priority: `RUST_LOG` env var > `log_level` parameter > default "info"
///
/// In debug builds: pretty-printed terminal output on stderr.
/// In release builds: JSON structured output with spans on stderr.
pub fn init_telemetry_with_level(log_level: &str) {
    let default_filter = default_directive(log_level);

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
