use redb::TableDefinition;

/// File records: uuid -> FileRecord (msgpack)
pub const FILES: TableDefinition<&str, &[u8]> = TableDefinition::new("files");

/// Per-owner name uniqueness: (owner_id, file_name_lower) -> uuid.
/// Maintained for records in every state, so a PENDING reservation already
/// blocks the name.
pub const OWNER_NAMES: TableDefinition<(&str, &str), &str> = TableDefinition::new("owner_names");

/// Per-owner content uniqueness: (owner_id, sha256) -> uuid.
/// Only READY records are indexed here; PENDING/FAILED duplicates are expected.
pub const OWNER_HASHES: TableDefinition<(&str, &str), &str> = TableDefinition::new("owner_hashes");

/// Tag vocabulary: normalized tag name -> unit
pub const TAGS: TableDefinition<&str, ()> = TableDefinition::new("tags");
