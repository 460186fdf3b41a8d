//! Process-wide `tracing` subscriber setup.

use crate::config::LoggerConfig;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Builds the filter: `RUST_LOG` wins, then `logger.level`, then `warn`.
pub fn env_filter(config: &LoggerConfig) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("warn"))
}

/// Installs a stderr subscriber. Returns false if one was already installed.
pub fn init(config: &LoggerConfig) -> bool {
    let registry = tracing_subscriber::registry().with(env_filter(config));

    if config.is_json() {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .try_init()
            .is_ok()
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .try_init()
            .is_ok()
    }
}
