pub mod import;
pub mod extraction;
pub mod fields;
pub mod processor;
pub mod dispatch;

pub use dispatch::{PipelineQueue, PipelineTicket};
pub use processor::{DocumentProcessor, PipelineOutcome, PipelineStage, ProcessingError};
