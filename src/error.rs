use std::path::PathBuf;
use thiserror::Error;

use crate::types::Platform;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Source unavailable: {path}: {source}")]
    SourceUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Schema violation in {platform} data: {detail}")]
    SchemaViolation { platform: Platform, detail: String },

    #[error("Could not decode {platform} value {value:?} in column '{column}' at line {line}: {reason}")]
    DecodeError {
        platform: Platform,
        line: u64,
        column: String,
        value: String,
        reason: String,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl PipelineError {
    pub fn schema(platform: Platform, detail: impl Into<String>) -> Self {
        PipelineError::SchemaViolation {
            platform,
            detail: detail.into(),
        }
    }

    pub fn unavailable(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PipelineError::SourceUnavailable {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
