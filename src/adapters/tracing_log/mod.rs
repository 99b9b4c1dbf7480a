// Tracing log adapter - Structured logging using tracing crate

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

use crate::error::{FragCutError, FragCutResult};

/// Logging configuration options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive, e.g. `info` or `fragcut=debug`
    pub level: String,
    /// Emit JSON lines instead of human-readable text
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl LoggingConfig {
    /// Effective filter directive; `verbose` raises the level to debug
    pub fn directive(&self, verbose: bool) -> String {
        if verbose {
            "debug".to_string()
        } else {
            self.level.clone()
        }
    }
}

/// Install the global subscriber. `RUST_LOG` takes precedence over the config.
///
/// Logs go to stderr so stdout stays free for command output.
pub fn init_logging(config: &LoggingConfig, verbose: bool) -> FragCutResult<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(config.directive(verbose))
            .map_err(|e| FragCutError::Logging(format!("bad filter '{}': {}", config.level, e)))?,
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(verbose);

    let result = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    result.map_err(|e| FragCutError::Logging(e.to_string()))
}
