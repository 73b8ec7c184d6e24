//! Engine Settings
//!
//! Engine-wide defaults, loadable from a YAML file.
//!
//! # Example YAML Format
//!
//! ```yaml
//! default_retry_limit: 3
//! retry_strategy: restart_workflow   # or retry_step
//! enforce_event_timeouts: false
//! ```

use std::error::Error;
use std::fs;

use log::{debug, info};
use serde::{Deserialize, Serialize};

/// Retry limit used when a step does not configure one.
pub const DEFAULT_RETRY_LIMIT: u32 = 3;

/// How a retryable step failure is handled.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RetryStrategy {
    /// Re-run the whole workflow body from the top. Earlier steps must be
    /// safe to replay.
    #[default]
    RestartWorkflow,
    /// Re-run only the failing step inside the same `run` call.
    RetryStep,
}

/// Engine configuration shared by every instance of a registry.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct EngineSettings {
    pub default_retry_limit: u32,
    pub retry_strategy: RetryStrategy,
    /// Fire event-wait timeouts automatically once their duration elapses
    pub enforce_event_timeouts: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            default_retry_limit: DEFAULT_RETRY_LIMIT,
            retry_strategy: RetryStrategy::default(),
            enforce_event_timeouts: false,
        }
    }
}

impl EngineSettings {
    pub fn with_retry_strategy(mut self, strategy: RetryStrategy) -> Self {
        self.retry_strategy = strategy;
        self
    }

    pub fn with_default_retry_limit(mut self, limit: u32) -> Self {
        self.default_retry_limit = limit;
        self
    }

    pub fn with_enforced_event_timeouts(mut self, enforce: bool) -> Self {
        self.enforce_event_timeouts = enforce;
        self
    }
}

/// Loads engine settings from a YAML file.
///
/// Missing keys fall back to their defaults.
pub fn load_settings(path: &str) -> Result<EngineSettings, Box<dyn Error>> {
    info!("Loading engine settings from: {}", path);

    let yaml_content = fs::read_to_string(path).map_err(|e| {
        format!(
            "Failed to read settings file '{}': {}. Check that the file exists and is readable.",
            path, e
        )
    })?;

    debug!("YAML content loaded ({} bytes)", yaml_content.len());

    let settings: EngineSettings = serde_yaml::from_str(&yaml_content)
        .map_err(|e| format!("Failed to parse settings YAML: {}. Check the file format.", e))?;

    info!(
        "Settings: retry limit {}, strategy {:?}, enforced event timeouts: {}",
        settings.default_retry_limit, settings.retry_strategy, settings.enforce_event_timeouts
    );

    Ok(settings)
}
