pub mod error;
pub mod pipeline;

pub use error::{PipelineError, Result};
pub use pipeline::{Pipeline, PipelineState, RunReport};
