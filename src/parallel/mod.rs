pub mod processor;
pub mod types;

pub use processor::ParallelProcessor;
pub use types::{ProcessingRequest, ProcessingResult, ProcessingStats, ProcessingStrategy};
