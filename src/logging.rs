use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, util::TryInitError, EnvFilter,
};

use crate::config::LoggingConfig;

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("failed to parse logging.filter: {0}")]
    Filter(#[from] tracing_subscriber::filter::ParseError),
    #[error("failed to initialize tracing subscriber: {0}")]
    Init(#[from] TryInitError),
}

/// Installs the global subscriber. Logs go to stderr so stdout stays
/// machine-readable.
pub fn init_tracing(config: &LoggingConfig) -> Result<(), LoggingError> {
    let env_filter = build_env_filter(&config.filter)?;

    let json_layer = config.json.then(|| {
        fmt::layer()
            .json()
            .with_target(true)
            .with_current_span(true)
            .with_writer(std::io::stderr)
    });
    let text_layer = (!config.json).then(|| {
        fmt::layer()
            .with_target(true)
            .with_ansi(false)
            .with_writer(std::io::stderr)
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(text_layer)
        .try_init()?;

    tracing::debug!(target: "logging", filter = %config.filter, json = config.json, "logging initialized");
    Ok(())
}

/// `RUST_LOG` takes precedence over the configured directives.
fn build_env_filter(filter: &str) -> Result<EnvFilter, LoggingError> {
    match EnvFilter::try_from_default_env() {
        Ok(env_filter) => Ok(env_filter),
        Err(_) => Ok(EnvFilter::try_new(filter)?),
    }
}
