use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum GvError {
    #[error("input is not in a supported format: {0}")]
    Format(String),

    #[error("sequence type error: {0}")]
    SequenceType(String),

    #[error("at least two validations share the alias '{0}'")]
    AliasDuplication(String),

    #[error("no validation matches the requested aliases: {0}")]
    NoValidation(String),

    #[error("file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("output directory already exists: {0} (remove it or resume with a start index)")]
    OutputExists(PathBuf),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("invalid tabular column layout: {0}")]
    InvalidColumnLayout(String),

    #[error("invalid HSP: {0}")]
    InvalidHsp(String),

    #[error("required tool not found: {0}")]
    MissingTool(String),

    #[error("homology search failed: {0}")]
    SearchFailed(String),

    #[error("multiple alignment failed: {0}")]
    AlignmentFailed(String),

    #[error("NCBI request failed: {0}")]
    NcbiHttp(String),

    #[error("NCBI returned status {status}: {message}")]
    NcbiStatus { status: u16, message: String },

    #[error("worker pool error: {0}")]
    WorkerPool(String),
}

impl GvError {
    /// Short name of the failure kind, used in one-line diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            GvError::Format(_) => "FormatError",
            GvError::SequenceType(_) => "SequenceTypeError",
            GvError::AliasDuplication(_) => "AliasDuplicationError",
            GvError::NoValidation(_) => "NoValidationError",
            GvError::FileNotFound(_) => "FileNotFoundError",
            GvError::OutputExists(_) => "OutputExistsError",
            GvError::Filesystem(_) => "FilesystemError",
            GvError::ConfigRead(_) | GvError::ConfigParse(_) => "ConfigError",
            GvError::InvalidColumnLayout(_) => "ColumnLayoutError",
            GvError::InvalidHsp(_) => "HspError",
            GvError::MissingTool(_) => "MissingToolError",
            GvError::SearchFailed(_) => "SearchError",
            GvError::AlignmentFailed(_) => "AlignmentError",
            GvError::NcbiHttp(_) | GvError::NcbiStatus { .. } => "NetworkError",
            GvError::WorkerPool(_) => "WorkerPoolError",
        }
    }
}
