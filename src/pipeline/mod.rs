//! Deployment Pipeline Runner (§4.4).

pub mod handler;
pub mod runner;

pub use handler::{FailureKind, NoopStepHandler, StepHandler, StepOutcome};
pub use runner::PipelineRunner;
