//! Tracing initialization.

use tracing_subscriber::EnvFilter;

use crate::config::{LogFormat, LoggingConfig};

const ENV_VAR: &str = "PERSONA_LOG";
const DEFAULT_FILTER: &str = "persona=info";

/// Install the global subscriber from config. Safe to call more than once;
/// later calls are no-ops (first init wins).
pub fn init(config: &LoggingConfig) {
    if !config.stdout {
        return;
    }
    let filter = match &config.filter {
        Some(directive) => EnvFilter::new(directive),
        None => EnvFilter::try_from_env(ENV_VAR)
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)),
    };
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let result = match config.format {
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    // Already-initialized is the only expected failure; keep the first one.
    let _ = result;
}
