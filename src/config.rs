//! Host-facing configuration.

use serde::{Deserialize, Serialize};

use crate::core::Limits;
use crate::sync::RetryPolicy;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub logging: LoggingConfig,
    pub limits: Limits,
    pub retry: RetryPolicy,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Pretty,
    #[default]
    Compact,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub stdout: bool,
    pub format: LogFormat,
    /// EnvFilter directive; falls back to `persona=info` (or `PERSONA_LOG`).
    pub filter: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            stdout: true,
            format: LogFormat::default(),
            filter: None,
        }
    }
}
