//! Error types for the archive encoder/decoder.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ArchiveError>;

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("bad parameter: {0}")]
    BadParam(String),

    #[error("corrupt archive data: {0}")]
    Corrupt(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("zstd error: {0}")]
    Compression(String),

    #[error("unsupported operation: {0}")]
    Unsupported(String),
}

impl ArchiveError {
    /// Stable error tag, for CLI/log surfacing.
    pub fn code(&self) -> &'static str {
        match self {
            ArchiveError::BadParam(_) => "BAD_PARAM",
            ArchiveError::Corrupt(_) => "CORRUPT",
            ArchiveError::Io(_) => "IO_FAILURE",
            ArchiveError::Json(_) => "CORRUPT",
            ArchiveError::Compression(_) => "IO_FAILURE",
            ArchiveError::Unsupported(_) => "UNSUPPORTED",
        }
    }
}
