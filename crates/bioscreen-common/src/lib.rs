//! bioscreen-common: Shared records, errors and configuration used across all Bioscreen crates.

pub mod config;
pub mod entities;
pub mod error;

// Re-export commonly used types
pub use config::Config;
pub use entities::{FeatureRow, FeatureTable, PredictionRecord, PredictionTable, StructureRecord};
pub use error::{ErrorKind, PipelineError};
