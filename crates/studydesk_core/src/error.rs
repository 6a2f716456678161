//! crates/studydesk_core/src/error.rs
//!
//! The error taxonomy shared by the data service and its callers.

use crate::ports::StoreError;

/// Failures surfaced by data operations. Nothing here is process-fatal: the
/// worst case is a failed individual operation the user can retry.
#[derive(Debug, thiserror::Error)]
pub enum DataError {
    /// A required field was missing or malformed. The write was never
    /// attempted.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The store has no document with the given id. Also returned by the
    /// public note projection for private notes, which are deliberately
    /// indistinguishable from missing ones.
    #[error("not found: {0}")]
    NotFound(String),

    /// A generic backend failure: network, permission, or a malformed
    /// stored document.
    #[error("store error: {0}")]
    Store(String),

    /// The caller's credentials could not be resolved to a user.
    #[error("unauthorized")]
    Unauthorized,

    /// A chunked bulk operation failed partway. Chunks committed before the
    /// failure stay committed; the caller must be told about the partial
    /// state, which is why this is distinct from a clean `Store` failure.
    #[error("batch aborted after {committed} committed chunk(s): {source}")]
    Batch {
        committed: usize,
        #[source]
        source: Box<DataError>,
    },

    /// A transient store failure persisted through every retry attempt.
    #[error("gave up after {attempts} attempts: {source}")]
    RetryExhausted {
        attempts: u32,
        #[source]
        source: Box<DataError>,
    },
}

pub type DataResult<T> = Result<T, DataError>;

impl From<StoreError> for DataError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(msg) => DataError::NotFound(msg),
            StoreError::Unauthorized => DataError::Unauthorized,
            StoreError::Unavailable(msg) => DataError::Store(msg),
            StoreError::BatchTooLarge(size) => {
                DataError::Store(format!("batch of {size} operations exceeds the store limit"))
            }
        }
    }
}
