//! Step registry: the single boundary where declarative steps become
//! executor instances.
//!
//! New step kinds and handlers are added here without touching the
//! executor. Unknown logic handlers fall back to the default transform;
//! unknown API handlers fall back to the transient-failure executor so a
//! misconfigured API step does not permanently wedge a workflow.

use trellis_core::{Step, StepConfig, StepExecutor, StepRegistry};

use crate::ai::AiStep;
use crate::fail::FailStep;
use crate::http::HttpStep;
use crate::passthrough::PassthroughStep;
use crate::persist::PersistStep;
use crate::transform::TransformStep;
use crate::transient::TransientFailStep;
use crate::weather::WeatherFormatStep;

const DEFAULT_TRANSIENT_FAIL_COUNT: u32 = 2;

/// Instantiates the executor for a step declaration. A fresh instance is
/// constructed per attempt; executors are stateless between calls.
pub fn create_step(step: &Step) -> Box<dyn StepExecutor> {
    match &step.config {
        StepConfig::Manual => Box::new(PassthroughStep),
        StepConfig::Logic(config) => match config.handler.as_deref() {
            Some("weather_formatter") => Box::new(WeatherFormatStep),
            _ => Box::new(TransformStep::new(config.clone())),
        },
        StepConfig::Storage(config) => Box::new(PersistStep::new(config.clone())),
        StepConfig::Ai(config) => Box::new(AiStep::new(config.clone())),
        StepConfig::Api(config) => match config.handler.as_deref() {
            Some("http") => Box::new(HttpStep::new(config.clone())),
            Some("force_fail") => Box::new(FailStep),
            _ => Box::new(TransientFailStep::new(
                config.fail_count.unwrap_or(DEFAULT_TRANSIENT_FAIL_COUNT),
            )),
        },
    }
}

/// The registry wired into the engine by default.
#[derive(Debug, Default, Clone)]
pub struct DefaultRegistry;

impl StepRegistry for DefaultRegistry {
    fn create(&self, step: &Step) -> Box<dyn StepExecutor> {
        create_step(step)
    }
}
