//! Error types for the SDK

/// Errors raised while loading or building a descriptor table
#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    /// The JSON document is malformed
    #[error("Invalid metadata JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The metadata file could not be read
    #[error("Cannot read metadata file {path}: {source}")]
    Io {
        /// File path
        path: String,
        /// Underlying error
        source: std::io::Error,
    },

    /// Two descriptors share one qualified name
    #[error("Duplicate native type descriptor '{0}'")]
    DuplicateType(String),
}
