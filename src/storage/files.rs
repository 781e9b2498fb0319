use chrono::{DateTime, Utc};
use redb::ReadableTable;

use super::db::{Database, DatabaseError};
use super::models::{FileRecord, FileState, Visibility};
use super::tables::*;

/// Outcome of the conditional PENDING -> READY promotion.
#[derive(Debug)]
pub enum FinalizeOutcome {
    /// Hash, size and state were updated atomically.
    Finalized(FileRecord),
    /// A READY record with the same (owner, hash) already exists; the record
    /// was flipped to FAILED inside the same transaction.
    DuplicateContent,
    /// The record is missing or no longer PENDING (lost a concurrent race).
    NotPending,
}

/// Outcome of a conditional rename.
#[derive(Debug)]
pub enum RenameOutcome {
    Renamed(FileRecord),
    /// Another record of the same owner already holds the normalized name.
    NameTaken,
    /// The record is missing or no longer READY.
    NotReady,
}

impl Database {
    // ========================================================================
    // File operations
    //
    // Every mutation below is a single redb write transaction, which makes it
    // an atomic find-and-modify: the caller observes either the full effect
    // or none of it, and concurrent writers are serialized.
    // ========================================================================

    /// Insert a freshly reserved record, enforcing (owner, name) uniqueness
    /// across all states. Returns false when the name is already taken.
    pub fn try_insert_file(&self, file: &FileRecord) -> Result<bool, DatabaseError> {
        debug_assert!(!file.id.is_empty(), "file id must not be empty");
        debug_assert_eq!(
            file.file_name_lower,
            file.file_name.trim().to_lowercase(),
            "file_name_lower must be the normalized name"
        );

        let write_txn = self.begin_write()?;
        let inserted = {
            let mut names = write_txn.open_table(OWNER_NAMES)?;
            let taken = names
                .get((file.owner_id.as_str(), file.file_name_lower.as_str()))?
                .is_some();

            if taken {
                false
            } else {
                names.insert(
                    (file.owner_id.as_str(), file.file_name_lower.as_str()),
                    file.id.as_str(),
                )?;
                let mut files = write_txn.open_table(FILES)?;
                let data = rmp_serde::to_vec_named(file)?;
                files.insert(file.id.as_str(), data.as_slice())?;
                true
            }
        };
        write_txn.commit()?;
        Ok(inserted)
    }

    /// Get a file by its UUID
    pub fn get_file(&self, id: &str) -> Result<Option<FileRecord>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(FILES)?;

        match table.get(id)? {
            Some(data) => {
                let file: FileRecord = rmp_serde::from_slice(data.value())?;
                Ok(Some(file))
            }
            None => Ok(None),
        }
    }

    /// Look up the READY record holding this content for this owner, if any.
    pub fn find_ready_by_content(
        &self,
        owner_id: &str,
        sha256: &str,
    ) -> Result<Option<String>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(OWNER_HASHES)?;
        Ok(table
            .get((owner_id, sha256))?
            .map(|guard| guard.value().to_string()))
    }

    /// Promote a PENDING record to READY, setting the computed hash and size.
    ///
    /// The duplicate-content check and the state flip happen in one write
    /// transaction, so at most one record per (owner, hash) can ever reach
    /// READY even when two identical uploads finalize back to back.
    pub fn finalize_file(
        &self,
        id: &str,
        sha256: &str,
        size_bytes: u64,
    ) -> Result<FinalizeOutcome, DatabaseError> {
        let write_txn = self.begin_write()?;
        let outcome = {
            let mut files = write_txn.open_table(FILES)?;
            let record = match files.get(id)? {
                Some(data) => Some(rmp_serde::from_slice::<FileRecord>(data.value())?),
                None => None,
            };

            match record {
                None => FinalizeOutcome::NotPending,
                Some(record) if record.state != FileState::Pending => FinalizeOutcome::NotPending,
                Some(mut record) => {
                    let mut hashes = write_txn.open_table(OWNER_HASHES)?;
                    let duplicate = hashes.get((record.owner_id.as_str(), sha256))?.is_some();

                    if duplicate {
                        // Lost the content race: the already-READY copy is
                        // canonical, this record becomes a FAILED orphan for
                        // the janitor. The hash stays at its sentinel.
                        record.state = FileState::Failed;
                        let data = rmp_serde::to_vec_named(&record)?;
                        files.insert(id, data.as_slice())?;
                        FinalizeOutcome::DuplicateContent
                    } else {
                        record.sha256 = sha256.to_string();
                        record.size_bytes = size_bytes;
                        record.state = FileState::Ready;
                        hashes.insert((record.owner_id.as_str(), sha256), id)?;
                        let data = rmp_serde::to_vec_named(&record)?;
                        files.insert(id, data.as_slice())?;
                        FinalizeOutcome::Finalized(record)
                    }
                }
            }
        };
        write_txn.commit()?;
        Ok(outcome)
    }

    /// Unconditionally set a record's state. Used for failure compensation
    /// (PENDING -> FAILED), janitor reverts (JANITOR -> FAILED) and delete
    /// rollback (DELETING -> READY). Returns false if the record is gone.
    pub fn update_state(&self, id: &str, state: FileState) -> Result<bool, DatabaseError> {
        let write_txn = self.begin_write()?;
        let updated = {
            let mut files = write_txn.open_table(FILES)?;
            let record = match files.get(id)? {
                Some(data) => Some(rmp_serde::from_slice::<FileRecord>(data.value())?),
                None => None,
            };

            match record {
                Some(mut record) => {
                    record.state = state;
                    let data = rmp_serde::to_vec_named(&record)?;
                    files.insert(id, data.as_slice())?;
                    true
                }
                None => false,
            }
        };
        write_txn.commit()?;
        Ok(updated)
    }

    /// Conditional READY -> DELETING transition scoped to (id, owner, READY).
    /// Returns the updated record, or None when the condition did not match;
    /// the caller disambiguates with a follow-up read.
    pub fn cas_mark_deleting(
        &self,
        id: &str,
        owner_id: &str,
    ) -> Result<Option<FileRecord>, DatabaseError> {
        let write_txn = self.begin_write()?;
        let result = {
            let mut files = write_txn.open_table(FILES)?;
            let record = match files.get(id)? {
                Some(data) => Some(rmp_serde::from_slice::<FileRecord>(data.value())?),
                None => None,
            };

            match record {
                Some(mut record)
                    if record.owner_id == owner_id && record.state == FileState::Ready =>
                {
                    record.state = FileState::Deleting;
                    let data = rmp_serde::to_vec_named(&record)?;
                    files.insert(id, data.as_slice())?;
                    Some(record)
                }
                _ => None,
            }
        };
        write_txn.commit()?;
        Ok(result)
    }

    /// Rename a READY record, keeping the (owner, name) index consistent.
    pub fn rename_file(
        &self,
        id: &str,
        new_name: &str,
        new_name_lower: &str,
    ) -> Result<RenameOutcome, DatabaseError> {
        let write_txn = self.begin_write()?;
        let outcome = {
            let mut files = write_txn.open_table(FILES)?;
            let record = match files.get(id)? {
                Some(data) => Some(rmp_serde::from_slice::<FileRecord>(data.value())?),
                None => None,
            };

            match record {
                None => RenameOutcome::NotReady,
                Some(record) if record.state != FileState::Ready => RenameOutcome::NotReady,
                Some(mut record) => {
                    let mut names = write_txn.open_table(OWNER_NAMES)?;
                    // Renaming to the record's own normalized name is allowed
                    // (case-only changes); any other holder is a conflict.
                    let taken = names
                        .get((record.owner_id.as_str(), new_name_lower))?
                        .map(|guard| guard.value() != id)
                        .unwrap_or(false);

                    if taken {
                        RenameOutcome::NameTaken
                    } else {
                        names.remove((record.owner_id.as_str(), record.file_name_lower.as_str()))?;
                        names.insert((record.owner_id.as_str(), new_name_lower), id)?;
                        record.file_name = new_name.to_string();
                        record.file_name_lower = new_name_lower.to_string();
                        let data = rmp_serde::to_vec_named(&record)?;
                        files.insert(id, data.as_slice())?;
                        RenameOutcome::Renamed(record)
                    }
                }
            }
        };
        write_txn.commit()?;
        Ok(outcome)
    }

    /// Physically remove a record and clean up both uniqueness indexes.
    pub fn delete_file(&self, id: &str) -> Result<bool, DatabaseError> {
        let write_txn = self.begin_write()?;

        let record = {
            let table = write_txn.open_table(FILES)?;
            let record = match table.get(id)? {
                Some(data) => Some(rmp_serde::from_slice::<FileRecord>(data.value())?),
                None => None,
            };
            record
        };

        let deleted = match record {
            Some(record) => {
                {
                    let mut table = write_txn.open_table(FILES)?;
                    table.remove(id)?;
                }
                {
                    let mut names = write_txn.open_table(OWNER_NAMES)?;
                    names.remove((record.owner_id.as_str(), record.file_name_lower.as_str()))?;
                }
                if record.has_content_hash() {
                    let mut hashes = write_txn.open_table(OWNER_HASHES)?;
                    // Only drop the index entry if this record owns it.
                    let owns_entry = hashes
                        .get((record.owner_id.as_str(), record.sha256.as_str()))?
                        .map(|guard| guard.value() == id)
                        .unwrap_or(false);
                    if owns_entry {
                        hashes.remove((record.owner_id.as_str(), record.sha256.as_str()))?;
                    }
                }
                true
            }
            None => false,
        };

        write_txn.commit()?;
        Ok(deleted)
    }

    /// List READY records matching the given owner/visibility/tag filters,
    /// newest first. Pagination is applied by the caller.
    pub fn list_ready_files(
        &self,
        owner_id: Option<&str>,
        visibility: Option<Visibility>,
        tag: Option<&str>,
    ) -> Result<Vec<FileRecord>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(FILES)?;

        let mut files = Vec::new();
        for result in table.iter()? {
            let (_, value) = result?;
            let file: FileRecord = rmp_serde::from_slice(value.value())?;
            if file.state != FileState::Ready {
                continue;
            }
            if let Some(owner_id) = owner_id {
                if file.owner_id != owner_id {
                    continue;
                }
            }
            if let Some(visibility) = visibility {
                if file.visibility != visibility {
                    continue;
                }
            }
            if let Some(tag) = tag {
                if !file.tags.iter().any(|t| t == tag) {
                    continue;
                }
            }
            files.push(file);
        }

        files.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at));
        Ok(files)
    }

    // ========================================================================
    // Janitor queries
    // ========================================================================

    /// Fetch up to `limit` PENDING/FAILED records older than the cutoff.
    pub fn find_stale_files(
        &self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<FileRecord>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(FILES)?;

        let mut stale = Vec::new();
        for result in table.iter()? {
            let (_, value) = result?;
            let file: FileRecord = rmp_serde::from_slice(value.value())?;
            if file.state.is_reclaimable() && file.uploaded_at < cutoff {
                stale.push(file);
                if stale.len() >= limit {
                    break;
                }
            }
        }
        Ok(stale)
    }

    /// Atomically flip still-reclaimable records among `ids` to JANITOR.
    /// Returns the records actually claimed; records that raced into another
    /// state since the stale query are skipped.
    pub fn claim_for_janitor(&self, ids: &[String]) -> Result<Vec<FileRecord>, DatabaseError> {
        let write_txn = self.begin_write()?;
        let mut claimed = Vec::new();
        {
            let mut files = write_txn.open_table(FILES)?;
            for id in ids {
                let record = match files.get(id.as_str())? {
                    Some(data) => Some(rmp_serde::from_slice::<FileRecord>(data.value())?),
                    None => None,
                };

                if let Some(mut record) = record {
                    if record.state.is_reclaimable() {
                        record.state = FileState::Janitor;
                        let data = rmp_serde::to_vec_named(&record)?;
                        files.insert(id.as_str(), data.as_slice())?;
                        claimed.push(record);
                    }
                }
            }
        }
        write_txn.commit()?;
        Ok(claimed)
    }
}
