use crate::config::TelemetryConfig;
use tracing_subscriber::filter::{Directive, ParseError};
use tracing_subscriber::EnvFilter;

/// Transport crates log every connection at debug; keep them quiet unless asked for.
const QUIET_DEPENDENCIES: [&str; 2] = ["hyper=warn", "h2=warn"];

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("invalid log level/filter '{value}': unable to build EnvFilter")]
    EnvFilter { value: String, source: ParseError },
    #[error("telemetry error: {0}")]
    Subscriber(Box<dyn std::error::Error + Send + Sync>),
}

/// `RUST_LOG` wins as-is; otherwise `APP_LOG_LEVEL` plus the dependency defaults.
pub fn build_filter(config: &TelemetryConfig) -> Result<EnvFilter, TelemetryError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }

    let invalid = |source| TelemetryError::EnvFilter {
        value: config.log_level.clone(),
        source,
    };
    let mut filter = EnvFilter::try_new(&config.log_level).map_err(invalid)?;
    for directive in QUIET_DEPENDENCIES {
        if !config.log_level.contains(directive.split('=').next().unwrap_or_default()) {
            filter = filter.add_directive(directive.parse::<Directive>().map_err(invalid)?);
        }
    }
    Ok(filter)
}

pub fn init(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    tracing_subscriber::fmt()
        .with_env_filter(build_filter(config)?)
        .with_target(false)
        .compact()
        .with_ansi(false)
        .try_init()
        .map_err(TelemetryError::Subscriber)
}
