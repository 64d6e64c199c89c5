//! Trellis steps: concrete step executors and the registry that maps
//! declarative step configuration onto them.
//!
//! Every executor fulfils the [`trellis_core::StepExecutor`] contract:
//! it never returns an error, only a [`trellis_core::StepResult`].

pub mod ai;
pub mod fail;
pub mod http;
pub mod passthrough;
pub mod persist;
pub mod registry;
pub mod transform;
pub mod transient;
pub mod weather;

pub use ai::AiStep;
pub use fail::FailStep;
pub use http::HttpStep;
pub use passthrough::PassthroughStep;
pub use persist::PersistStep;
pub use registry::{create_step, DefaultRegistry};
pub use transform::TransformStep;
pub use transient::TransientFailStep;
pub use weather::WeatherFormatStep;
