/// Error types shared by the store, the cache and the sync layer
use std::path::PathBuf;
use thiserror::Error;

/// Everything that can go wrong while talking to the media store,
/// the derived cache or a media file on disk.
///
/// "Not found" is deliberately absent: lookups that miss return `Ok(None)`
/// and callers treat the bucket or row as not existing yet.
#[derive(Error, Debug)]
pub enum MediaError {
    #[error("media store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid content locator {locator:?}: {reason}")]
    InvalidLocator { locator: String, reason: String },

    /// An update or delete was accepted by the store but touched no row
    #[error("store did not persist change for {locator}")]
    StorePersistence { locator: String },

    /// Writing the embedded orientation tag failed
    #[error("failed to update orientation tag in {path}: {reason}")]
    MetadataUpdate { path: PathBuf, reason: String },

    #[error("unsupported file format for orientation tag: {0}")]
    UnsupportedFormat(PathBuf),

    #[error("invalid operation payload: {0}")]
    InvalidPayload(String),
}

pub type Result<T> = std::result::Result<T, MediaError>;

impl MediaError {
    pub(crate) fn invalid_locator(locator: &str, reason: impl Into<String>) -> Self {
        MediaError::InvalidLocator {
            locator: locator.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn metadata(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        MediaError::MetadataUpdate {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
