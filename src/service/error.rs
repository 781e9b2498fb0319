use thiserror::Error;

use crate::storage::models::FileState;
use crate::storage::DatabaseError;

/// Error taxonomy of the file lifecycle coordinator.
///
/// Conflicts and access problems are distinct, stable categories so callers
/// can react differently (retry with a different name vs. forbidden). Races
/// lost on conditional updates are resolved into one of these by a follow-up
/// read before they ever reach a caller.
#[derive(Debug, Error)]
pub enum FileError {
    #[error("file with name '{0}' already exists for this owner")]
    NameConflict(String),
    #[error("file with identical content already exists for this owner")]
    ContentConflict,
    #[error("file not found")]
    NotFound,
    #[error("access denied")]
    AccessDenied,
    #[error("operation not allowed while file is {0:?}")]
    InvalidState(FileState),
    #[error("file was modified concurrently")]
    ConcurrentModification,
    #[error("{0}")]
    InvalidArgument(String),
    #[error("delete failed: {0}")]
    DeleteFailed(String),
    #[error("upload failed: {0}")]
    UploadFailed(String),
    #[error(transparent)]
    Metadata(#[from] DatabaseError),
}
