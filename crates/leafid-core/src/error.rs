//! Error types for LeafID

use std::path::PathBuf;

/// Result type alias using LeafID's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for LeafID operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A classifier artifact (weights or labels) does not exist
    #[error("classifier artifact not found: {}", .0.display())]
    ArtifactMissing(PathBuf),

    /// A classifier artifact exists but could not be parsed or applied
    #[error("classifier artifact is corrupt: {0}")]
    ArtifactCorrupt(String),

    /// The uploaded payload is not a usable image
    #[error("invalid image: {0}")]
    InvalidImage(String),

    /// No metadata row exists for the label
    #[error("no plant record for label '{0}'")]
    RecordNotFound(String),

    /// Embedded database errors
    #[error("store error: {0}")]
    Store(String),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    /// Filesystem errors
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic internal errors
    #[error("internal error: {0}")]
    Internal(String),
}

/// Coarse classification of an [`Error`], used for metrics labels and
/// HTTP status mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    ArtifactMissing,
    ArtifactCorrupt,
    InvalidImage,
    RecordNotFound,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ArtifactMissing => "artifact_missing",
            Self::ArtifactCorrupt => "artifact_corrupt",
            Self::InvalidImage => "invalid_image",
            Self::RecordNotFound => "record_not_found",
            Self::Internal => "internal",
        }
    }
}

impl Error {
    /// Create a new corrupt-artifact error
    pub fn artifact_corrupt(msg: impl Into<String>) -> Self {
        Self::ArtifactCorrupt(msg.into())
    }

    /// Create a new invalid-image error
    pub fn invalid_image(msg: impl Into<String>) -> Self {
        Self::InvalidImage(msg.into())
    }

    /// Create a new record-not-found error
    pub fn not_found(label: impl Into<String>) -> Self {
        Self::RecordNotFound(label.into())
    }

    /// Create a new store error
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Collapse the error into the request-level taxonomy.
    ///
    /// Store, configuration, IO and serialization failures are all reported
    /// to clients as internal errors.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ArtifactMissing(_) => ErrorKind::ArtifactMissing,
            Self::ArtifactCorrupt(_) => ErrorKind::ArtifactCorrupt,
            Self::InvalidImage(_) => ErrorKind::InvalidImage,
            Self::RecordNotFound(_) => ErrorKind::RecordNotFound,
            Self::Store(_)
            | Self::Config(_)
            | Self::Io(_)
            | Self::Serialization(_)
            | Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whether the user can fix the failure by resubmitting a different image
    pub fn is_user_correctable(&self) -> bool {
        matches!(self, Self::InvalidImage(_))
    }
}
