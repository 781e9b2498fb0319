use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;
use ring::digest;
use ring::rand::{SecureRandom, SystemRandom};
use tracing::{error, info, warn};

use crate::object_store::ObjectStore;
use crate::storage::models::{FileRecord, FileState, Visibility, SHA256_PENDING};
use crate::storage::{Database, FinalizeOutcome, RenameOutcome};

use super::error::FileError;
use super::tags::{normalize_tag_filter, validate_and_normalize_tags};

const MAX_FILE_NAME_LEN: usize = 255;

/// Metadata accompanying an upload, already resolved by the caller (display
/// name fallback, content-type guessing and the like are HTTP-layer concerns).
#[derive(Debug, Clone)]
pub struct FileMeta {
    pub owner_id: String,
    pub file_name: String,
    pub content_type: String,
    pub visibility: Visibility,
    pub tags: Vec<String>,
}

/// Coordinates the file lifecycle across the metadata store and the object
/// store. The two stores share no transaction; consistency comes from the
/// reserve-before-write protocol: the metadata record exists (PENDING) before
/// any byte reaches the object store, so every blob key is traceable to a
/// record even across a crash mid-upload.
pub struct FileService {
    db: Database,
    object_store: Arc<dyn ObjectStore>,
    max_tags: usize,
    rng: SystemRandom,
}

impl FileService {
    pub fn new(db: Database, object_store: Arc<dyn ObjectStore>, max_tags: usize) -> Self {
        Self {
            db,
            object_store,
            max_tags,
            rng: SystemRandom::new(),
        }
    }

    // ========================================================================
    // Reserve / finalize / upload
    // ========================================================================

    /// Reserve a metadata record for an upload. The record is inserted as
    /// PENDING with a placeholder hash, a fresh object-store key and a fresh
    /// download secret. Fails with NameConflict if (owner, normalized name)
    /// exists in any state.
    pub fn reserve(&self, meta: &FileMeta) -> Result<FileRecord, FileError> {
        let (file_name, file_name_lower) = validate_file_name(&meta.file_name)?;
        let tags = validate_and_normalize_tags(&meta.tags, self.max_tags)?;

        self.db.ensure_tags(&tags)?;

        let record = FileRecord {
            id: uuid::Uuid::new_v4().to_string(),
            owner_id: meta.owner_id.clone(),
            file_name,
            file_name_lower,
            content_type: meta.content_type.clone(),
            size_bytes: 0,
            sha256: SHA256_PENDING.to_string(),
            visibility: meta.visibility,
            tags,
            uploaded_at: Utc::now(),
            download_secret: self.generate_download_secret()?,
            object_store_key: generate_object_key(),
            state: FileState::Pending,
        };

        if !self.db.try_insert_file(&record)? {
            return Err(FileError::NameConflict(record.file_name));
        }

        Ok(record)
    }

    /// Promote a PENDING record to READY once its content is durably stored.
    ///
    /// Checks for an already-READY record with the same (owner, hash): the
    /// existing file is canonical, so the current record is failed and the
    /// caller gets ContentConflict. The promotion itself is a conditional
    /// update scoped to state=PENDING; losing that race surfaces as
    /// ConcurrentModification.
    pub fn finalize(
        &self,
        file_id: &str,
        sha256: &str,
        actual_size: u64,
    ) -> Result<FileRecord, FileError> {
        let sha256 = sha256.to_lowercase();

        let record = self.db.get_file(file_id)?.ok_or(FileError::NotFound)?;
        if record.state != FileState::Pending {
            return Err(FileError::InvalidState(record.state));
        }

        if self
            .db
            .find_ready_by_content(&record.owner_id, &sha256)?
            .is_some()
        {
            self.db.update_state(file_id, FileState::Failed)?;
            return Err(FileError::ContentConflict);
        }

        match self.db.finalize_file(file_id, &sha256, actual_size)? {
            FinalizeOutcome::Finalized(record) => {
                info!(
                    file_id,
                    size_bytes = actual_size,
                    sha256 = %sha256,
                    "Finalized upload"
                );
                Ok(record)
            }
            // Another finalize slipped in between the pre-check and the
            // conditional update; the record was failed inside that update.
            FinalizeOutcome::DuplicateContent => Err(FileError::ContentConflict),
            FinalizeOutcome::NotPending => Err(FileError::ConcurrentModification),
        }
    }

    /// The full upload workflow: reserve, stream the bytes into the object
    /// store while hashing them, finalize. Any failure past reservation runs
    /// compensation (best-effort blob delete + record to FAILED) before the
    /// error is surfaced; a ContentConflict is re-raised as-is so callers can
    /// tell "you already have this content" from a generic upload failure.
    pub async fn upload(&self, meta: FileMeta, data: Bytes) -> Result<FileRecord, FileError> {
        let reserved = self.reserve(&meta)?;
        info!(
            file_id = %reserved.id,
            key = %reserved.object_store_key,
            "Reserved file record"
        );

        match self.store_and_finalize(&reserved, data).await {
            Ok(file) => {
                info!(file_id = %file.id, file_name = %file.file_name, "Uploaded file");
                Ok(file)
            }
            Err(err) => {
                self.compensate_failed_upload(&reserved.id, &reserved.object_store_key)
                    .await;
                match err {
                    FileError::ContentConflict => Err(FileError::ContentConflict),
                    FileError::UploadFailed(msg) => Err(FileError::UploadFailed(msg)),
                    other => Err(FileError::UploadFailed(other.to_string())),
                }
            }
        }
    }

    async fn store_and_finalize(
        &self,
        reserved: &FileRecord,
        data: Bytes,
    ) -> Result<FileRecord, FileError> {
        // Single pass over the bytes: digest first, then hand the same buffer
        // to the object store.
        let mut context = digest::Context::new(&digest::SHA256);
        context.update(&data);
        let sha256 = hex(context.finish().as_ref());
        let actual_size = data.len() as u64;

        self.object_store
            .put(&reserved.object_store_key, data, &reserved.content_type)
            .await
            .map_err(|e| FileError::UploadFailed(e.to_string()))?;

        self.finalize(&reserved.id, &sha256, actual_size)
    }

    /// Best-effort cleanup after a failed upload: delete the blob, flip the
    /// record to FAILED. Failures here are logged, never escalated -- the
    /// janitor picks up whatever is left behind.
    async fn compensate_failed_upload(&self, file_id: &str, object_store_key: &str) {
        if let Err(e) = self.object_store.delete(object_store_key).await {
            warn!(file_id, key = object_store_key, error = %e, "Compensation blob delete failed");
        }
        match self.db.update_state(file_id, FileState::Failed) {
            Ok(_) => {}
            Err(e) => {
                warn!(file_id, error = %e, "Compensation state update failed");
            }
        }
    }

    // ========================================================================
    // Rename / delete
    // ========================================================================

    /// Rename a READY file owned by the caller. A private file owned by
    /// someone else reads as NotFound so its existence does not leak; a
    /// visible-but-foreign file is AccessDenied.
    pub fn rename(
        &self,
        file_id: &str,
        owner_id: &str,
        new_name: &str,
    ) -> Result<FileRecord, FileError> {
        let (new_name, new_name_lower) = validate_file_name(new_name)?;

        let record = self.db.get_file(file_id)?.ok_or(FileError::NotFound)?;
        if record.owner_id != owner_id {
            return Err(if record.visibility == Visibility::Private {
                FileError::NotFound
            } else {
                FileError::AccessDenied
            });
        }
        if record.state != FileState::Ready {
            return Err(FileError::InvalidState(record.state));
        }

        match self.db.rename_file(file_id, &new_name, &new_name_lower)? {
            RenameOutcome::Renamed(record) => {
                info!(file_id, new_name = %record.file_name, "Renamed file");
                Ok(record)
            }
            RenameOutcome::NameTaken => Err(FileError::NameConflict(new_name)),
            RenameOutcome::NotReady => Err(FileError::ConcurrentModification),
        }
    }

    /// Conditional READY -> DELETING transition scoped to (id, owner, READY).
    /// When the condition misses, a follow-up read derives the precise error:
    /// NotFound, then AccessDenied, then InvalidState.
    pub fn mark_for_deletion(&self, file_id: &str, owner_id: &str) -> Result<FileRecord, FileError> {
        if let Some(record) = self.db.cas_mark_deleting(file_id, owner_id)? {
            return Ok(record);
        }

        let record = self.db.get_file(file_id)?.ok_or(FileError::NotFound)?;
        if record.owner_id != owner_id {
            return Err(FileError::AccessDenied);
        }
        Err(FileError::InvalidState(record.state))
    }

    /// The delete workflow: mark DELETING, delete the blob, delete the
    /// metadata. A failure after the state transition rolls the record back
    /// to READY so the owner can retry.
    pub async fn delete(&self, file_id: &str, owner_id: &str) -> Result<(), FileError> {
        let file = self.mark_for_deletion(file_id, owner_id)?;

        if let Err(e) = self.object_store.delete(&file.object_store_key).await {
            warn!(file_id, error = %e, "Blob delete failed, rolling back to READY");
            self.rollback_delete(file_id);
            return Err(FileError::DeleteFailed(e.to_string()));
        }

        if let Err(e) = self.db.delete_file(file_id) {
            error!(file_id, error = %e, "Metadata delete failed, rolling back to READY");
            self.rollback_delete(file_id);
            return Err(FileError::DeleteFailed(e.to_string()));
        }

        info!(file_id, "Deleted file");
        Ok(())
    }

    fn rollback_delete(&self, file_id: &str) {
        if let Err(e) = self.db.update_state(file_id, FileState::Ready) {
            error!(file_id, error = %e, "Failed to roll back file state after delete failure");
        }
    }

    // ========================================================================
    // Download / listing
    // ========================================================================

    /// Resolve a download request. Only READY files are downloadable; a
    /// missing or non-READY file is NotFound, a wrong secret is AccessDenied.
    pub fn get_file_for_download(&self, file_id: &str, secret: &str) -> Result<FileRecord, FileError> {
        let record = self.db.get_file(file_id)?.ok_or(FileError::NotFound)?;
        if !record.is_ready() {
            return Err(FileError::NotFound);
        }
        if secret != record.download_secret {
            return Err(FileError::AccessDenied);
        }
        Ok(record)
    }

    /// The caller's READY files, newest first, optionally filtered by tag.
    pub fn list_owner_files(
        &self,
        owner_id: &str,
        tag: Option<&str>,
    ) -> Result<Vec<FileRecord>, FileError> {
        let tag = normalize_tag_filter(tag);
        Ok(self
            .db
            .list_ready_files(Some(owner_id), None, tag.as_deref())?)
    }

    /// All public READY files, newest first, optionally filtered by tag.
    pub fn list_public_files(&self, tag: Option<&str>) -> Result<Vec<FileRecord>, FileError> {
        let tag = normalize_tag_filter(tag);
        Ok(self
            .db
            .list_ready_files(None, Some(Visibility::Public), tag.as_deref())?)
    }

    /// The full tag vocabulary.
    pub fn list_tags(&self) -> Result<Vec<String>, FileError> {
        Ok(self.db.list_tags()?)
    }

    fn generate_download_secret(&self) -> Result<String, FileError> {
        use base64::Engine;

        let mut bytes = [0u8; 24];
        self.rng
            .fill(&mut bytes)
            .map_err(|_| FileError::UploadFailed("failed to generate download secret".into()))?;
        Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes))
    }
}

/// Object-store keys embed a UUID and a nanosecond timestamp: unique, never
/// reused, and URL-safe without encoding.
fn generate_object_key() -> String {
    format!(
        "file-{}-{}",
        uuid::Uuid::new_v4(),
        Utc::now().timestamp_nanos_opt().unwrap_or_default()
    )
}

fn validate_file_name(name: &str) -> Result<(String, String), FileError> {
    let lower = name.trim().to_lowercase();
    if lower.is_empty() {
        return Err(FileError::InvalidArgument(
            "file name must not be empty".to_string(),
        ));
    }
    if name.chars().count() > MAX_FILE_NAME_LEN {
        return Err(FileError::InvalidArgument(format!(
            "file name must not exceed {MAX_FILE_NAME_LEN} characters"
        )));
    }
    Ok((name.to_string(), lower))
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
