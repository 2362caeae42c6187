use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;

/// Everything that can stop a prediction run.
///
/// Variants map onto the failure classes the shell reacts to: a missing
/// upload, a bad structure, the descriptor tool, a schema problem between
/// stages, and a model that does not accept the assembled features.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Missing input: {0}")]
    MissingInput(String),

    #[error("Unparseable structure '{id}': {reason}")]
    Structure { id: String, reason: String },

    #[error("Descriptor tool failed: {0}")]
    ExternalTool(String),

    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("Model/feature shape mismatch: {0}")]
    ModelShape(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Run cancelled")]
    Cancelled,
}

/// Coarse classification of a [`PipelineError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    MissingInput,
    UnparseableStructure,
    ExternalTool,
    SchemaMismatch,
    ModelShape,
    Io,
    Cancelled,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::MissingInput => "missing_input",
            ErrorKind::UnparseableStructure => "unparseable_structure",
            ErrorKind::ExternalTool => "external_tool",
            ErrorKind::SchemaMismatch => "schema_mismatch",
            ErrorKind::ModelShape => "model_shape",
            ErrorKind::Io => "io",
            ErrorKind::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::MissingInput(_) => ErrorKind::MissingInput,
            PipelineError::Structure { .. } => ErrorKind::UnparseableStructure,
            PipelineError::ExternalTool(_) => ErrorKind::ExternalTool,
            PipelineError::SchemaMismatch(_) => ErrorKind::SchemaMismatch,
            PipelineError::ModelShape(_) | PipelineError::Model(_) => ErrorKind::ModelShape,
            PipelineError::Io { .. } => ErrorKind::Io,
            PipelineError::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Only descriptor-tool failures are worth retrying unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PipelineError::ExternalTool(_))
    }

    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        PipelineError::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Wraps a CSV failure. Underlying I/O errors stay I/O errors, anything
    /// else means the file did not have the expected shape.
    pub fn csv(path: impl AsRef<Path>, err: csv::Error) -> Self {
        let path = path.as_ref();
        if err.is_io_error() {
            match err.into_kind() {
                csv::ErrorKind::Io(source) => return PipelineError::io(path, source),
                other => {
                    return PipelineError::SchemaMismatch(format!(
                        "{}: {:?}",
                        path.display(),
                        other
                    ))
                }
            }
        }
        PipelineError::SchemaMismatch(format!("{}: {}", path.display(), err))
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
