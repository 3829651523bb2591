use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, MimeError>;

#[derive(Debug, Error)]
pub enum MimeError {
    #[error("mime database unavailable at {location}: {reason}")]
    SourceUnavailable { location: String, reason: String },

    #[error("mime database at {location} is not valid json: {source}")]
    Decoding {
        location: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid detection method bits: {0:#04b}")]
    InvalidDetectionMethod(u8),

    #[error("detection target not found: {}", .0.display())]
    TargetNotFound(PathBuf),

    #[error("detection target not readable: {}: {reason}", .path.display())]
    TargetNotReadable { path: PathBuf, reason: String },

    #[error("unknown mime type detected: {0}")]
    UnknownMimeTypeDetected(String),

    #[error("conflicting mime types: content says {content}, extension says {extension}")]
    ConflictingMimeTypes { content: String, extension: String },

    #[error("cache error: {0}")]
    Cache(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl MimeError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::SourceUnavailable { .. } => "SOURCE_UNAVAILABLE",
            Self::Decoding { .. } => "DECODING_ERROR",
            Self::InvalidDetectionMethod(_) => "INVALID_DETECTION_METHOD",
            Self::TargetNotFound(_) => "TARGET_NOT_FOUND",
            Self::TargetNotReadable { .. } => "TARGET_NOT_READABLE",
            Self::UnknownMimeTypeDetected(_) => "UNKNOWN_MIME_TYPE_DETECTED",
            Self::ConflictingMimeTypes { .. } => "CONFLICTING_MIME_TYPES",
            Self::Cache(_) => "CACHE_ERROR",
            Self::Io(_) => "IO_ERROR",
            Self::Json(_) => "JSON_ERROR",
        }
    }

    pub(crate) fn source_unavailable(location: &str, reason: impl Into<String>) -> Self {
        Self::SourceUnavailable {
            location: location.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn not_readable(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::TargetNotReadable {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}
