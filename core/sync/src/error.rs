//! Sync error types.

use thiserror::Error;

/// Errors raised by export and import.
///
/// Request-level variants reject the whole request; [`SyncError::Store`]
/// wraps a collaborator failure.
#[derive(Debug, Error)]
pub enum SyncError {
    /// No supported type left after filtering the request.
    #[error("No valid post types provided.")]
    NoTypes,

    /// The import body is not a JSON object.
    #[error("Invalid JSON payload.")]
    InvalidPayload,

    /// The import body carries no items.
    #[error("No items provided for import.")]
    NoItems,

    /// The `since` filter is not an ISO-8601 timestamp.
    #[error("Invalid 'since' timestamp: {0}")]
    InvalidSince(String),

    /// An item names a type outside the supported set.
    #[error("Invalid or unsupported post type.")]
    InvalidType,

    /// An item has neither a usable slug nor a title.
    #[error("Item is missing a slug or title.")]
    MissingSlug,

    /// A store collaborator failed.
    #[error(transparent)]
    Store(#[from] campussync_common::Error),
}

impl SyncError {
    /// Machine-readable code reported to API callers.
    pub fn code(&self) -> &'static str {
        match self {
            SyncError::NoTypes => "no_types",
            SyncError::InvalidPayload => "invalid_payload",
            SyncError::NoItems => "no_items",
            SyncError::InvalidSince(_) => "invalid_since",
            SyncError::InvalidType => "invalid_type",
            SyncError::MissingSlug => "missing_slug",
            SyncError::Store(_) => "store_error",
        }
    }

    /// Whether the error is the caller's fault rather than a store failure.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, SyncError::Store(_))
    }
}

/// Result type alias for sync operations.
pub type SyncResult<T> = std::result::Result<T, SyncError>;
