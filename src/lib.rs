pub mod config;
pub mod constants;
pub mod error;
pub mod fixtures;
pub mod logging;
pub mod observability;
pub mod pipeline;
pub mod types;
