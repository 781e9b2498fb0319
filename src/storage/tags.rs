use redb::ReadableTable;

use super::db::{Database, DatabaseError};
use super::tables::TAGS;

impl Database {
    // ========================================================================
    // Tag registry
    // ========================================================================

    /// Idempotently register tag names, creating the missing ones. Inserting
    /// a tag that already exists is a no-op, so concurrent duplicate creation
    /// is harmless. Returns the number of tags actually created.
    pub fn ensure_tags(&self, names: &[String]) -> Result<usize, DatabaseError> {
        if names.is_empty() {
            return Ok(0);
        }

        let write_txn = self.begin_write()?;
        let mut created = 0;
        {
            let mut table = write_txn.open_table(TAGS)?;
            for name in names {
                if table.insert(name.as_str(), ())?.is_none() {
                    created += 1;
                }
            }
        }
        write_txn.commit()?;

        if created > 0 {
            tracing::debug!(created, "Created new tags");
        }
        Ok(created)
    }

    /// The full tag vocabulary, in lexicographic order.
    pub fn list_tags(&self) -> Result<Vec<String>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(TAGS)?;

        let mut tags = Vec::new();
        for result in table.iter()? {
            let (key, _) = result?;
            tags.push(key.value().to_string());
        }
        Ok(tags)
    }
}
