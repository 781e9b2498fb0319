//! Shared test helpers for file-vault unit tests.

use std::sync::Arc;

use crate::config::{Config, JanitorConfig, ServerConfig, StorageConfig};
use crate::object_store::{LocalStore, ObjectStore};
use crate::service::FileService;
use crate::storage::Database;
use crate::AppState;

/// Create a test AppState with a temporary database and local object store.
pub fn test_state(temp_dir: &tempfile::TempDir) -> Arc<AppState> {
    let data_dir = temp_dir.path().join("data");
    let files_dir = temp_dir.path().join("files");

    let config = Config {
        server: ServerConfig {
            bind_address: "127.0.0.1:0".to_string(),
            data_dir: data_dir.to_string_lossy().to_string(),
        },
        storage: StorageConfig::default(),
        janitor: JanitorConfig::default(),
        max_tags: 5,
        max_upload_size: 10 * 1024 * 1024, // 10MB for tests
        test_mode: true,
    };

    let db = Database::open(&data_dir).expect("Failed to open test database");
    let object_store: Arc<dyn ObjectStore> =
        Arc::new(LocalStore::new(&files_dir).expect("Failed to create test object store"));
    let files = FileService::new(db.clone(), Arc::clone(&object_store), config.max_tags);

    Arc::new(AppState {
        config,
        db,
        object_store,
        files,
    })
}
