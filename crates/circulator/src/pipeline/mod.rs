pub mod context;
pub mod error;
pub mod runner;

pub use context::{PipelineContext, PipelineOutcome};
pub use error::PipelineError;
pub use runner::{status_message, CircularPipeline};
