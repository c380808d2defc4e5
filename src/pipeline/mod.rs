// Data processing pipeline: parsing, derivation, canonical storage and integration

pub mod integrate;
pub mod pipeline;
pub mod processing;
pub mod storage;

// Re-export key types and functions from each stage
pub use pipeline::{Pipeline, PipelineResult};
pub use processing::parser;
