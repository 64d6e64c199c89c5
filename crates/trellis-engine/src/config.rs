use config::{Config, ConfigError, Environment};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use trellis_core::Step;

/// Engine-level settings.
///
/// Steps without an explicit `timeout_seconds` fall back to the finite
/// default configured here; there is no unbounded step execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_step_timeout_secs")]
    pub default_step_timeout_secs: u64,
}

fn default_step_timeout_secs() -> u64 {
    300
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_step_timeout_secs: default_step_timeout_secs(),
        }
    }
}

impl EngineConfig {
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_env("TRELLIS")
    }

    pub fn load_from_env(prefix: &str) -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .add_source(
                Environment::with_prefix(prefix)
                    .separator("__")
                    .try_parsing(true),
            )
            .set_default("default_step_timeout_secs", default_step_timeout_secs())?;

        let config = builder.build()?;
        config.try_deserialize()
    }

    pub fn with_default_step_timeout(mut self, seconds: u64) -> Self {
        self.default_step_timeout_secs = seconds;
        self
    }

    /// The wall-clock deadline for one attempt of `step`.
    pub fn step_deadline(&self, step: &Step) -> Duration {
        Duration::from_secs(
            step.timeout_seconds
                .unwrap_or(self.default_step_timeout_secs),
        )
    }
}
