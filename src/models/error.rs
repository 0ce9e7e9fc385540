use thiserror::Error;

/// Closed error taxonomy for the archive engine.
///
/// Low-level codec and container failures are classified into these variants
/// at the reader/writer boundary; callers never see raw codec status codes.
#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("Failed to create archive: {0}")]
    CreateArchiveFailed(String),

    #[error("Failed to open file: {0}")]
    OpenFileFailed(String),

    #[error("Failed to read archive entry: {0}")]
    ReadEntryFailed(String),

    #[error("Extraction failed: {0}")]
    ExtractFailed(String),

    #[error("Compression failed: {0}")]
    CompressFailed(String),

    #[error("Archive is encrypted, a password is required")]
    PasswordRequired,

    #[error("Wrong password")]
    WrongPassword,

    #[error("Unsupported archive format")]
    UnsupportedFormat,

    #[error("Operation cancelled")]
    OperationCancelled,

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl From<std::io::Error> for ArchiveError {
    fn from(err: std::io::Error) -> Self {
        ArchiveError::Unknown(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ArchiveError>;
