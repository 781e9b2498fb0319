use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sentinel stored in `sha256` until finalization computes the real digest.
pub const SHA256_PENDING: &str = "PENDING";

/// Lifecycle state of a file record.
///
/// A record is created PENDING, promoted to READY by finalization, and only
/// ever leaves READY through the delete workflow. PENDING and FAILED records
/// are transient and reclaimed by the janitor once they age out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FileState {
    /// Reserved in the metadata store, content not yet durably stored.
    Pending,
    /// Content stored and verified.
    Ready,
    /// Upload aborted; the blob may or may not exist.
    Failed,
    /// Owner-initiated removal in progress.
    Deleting,
    /// Claimed by the janitor sweeper for teardown.
    Janitor,
}

impl FileState {
    /// States the janitor is allowed to reclaim once past the retention cutoff.
    pub fn is_reclaimable(self) -> bool {
        matches!(self, FileState::Pending | FileState::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Visibility {
    Private,
    Public,
}

/// A file record stored in redb.
///
/// `object_store_key` and `download_secret` are fixed at reservation and never
/// change. `file_name_lower` is the normalized form used for the per-owner
/// name-uniqueness constraint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: String,
    pub owner_id: String,
    pub file_name: String,
    pub file_name_lower: String,
    pub content_type: String,
    pub size_bytes: u64,
    pub sha256: String,
    pub visibility: Visibility,
    pub tags: Vec<String>,
    pub uploaded_at: DateTime<Utc>,
    pub download_secret: String,
    pub object_store_key: String,
    pub state: FileState,
}

impl FileRecord {
    pub fn is_ready(&self) -> bool {
        self.state == FileState::Ready
    }

    /// Whether this record holds a computed content hash. READY records always
    /// do; conflict losers keep the sentinel even after being failed.
    pub fn has_content_hash(&self) -> bool {
        self.sha256 != SHA256_PENDING
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reclaimable_states() {
        assert!(FileState::Pending.is_reclaimable());
        assert!(FileState::Failed.is_reclaimable());
        assert!(!FileState::Ready.is_reclaimable());
        assert!(!FileState::Deleting.is_reclaimable());
        assert!(!FileState::Janitor.is_reclaimable());
    }
}
