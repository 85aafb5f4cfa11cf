//! Pipeline composition and execution.

mod runner;

pub use runner::{Pipeline, PipelineReport, PipelineStep, StepOutput};
