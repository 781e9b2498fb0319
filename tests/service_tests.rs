use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{Duration, Utc};
use file_vault::object_store::{LocalStore, ObjectStore, ObjectStoreError};
use file_vault::service::{FileError, FileMeta, FileService};
use file_vault::storage::models::{FileState, Visibility, SHA256_PENDING};
use file_vault::storage::Database;

/// Local store with switchable failure injection for put and delete.
struct FlakyStore {
    inner: LocalStore,
    fail_put: AtomicBool,
    fail_delete: AtomicBool,
}

impl FlakyStore {
    fn new(inner: LocalStore) -> Self {
        Self {
            inner,
            fail_put: AtomicBool::new(false),
            fail_delete: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl ObjectStore for FlakyStore {
    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> Result<(), ObjectStoreError> {
        if self.fail_put.load(Ordering::SeqCst) {
            return Err(ObjectStoreError::Backend("injected put failure".into()));
        }
        self.inner.put(key, data, content_type).await
    }

    async fn get(&self, key: &str) -> Result<Bytes, ObjectStoreError> {
        self.inner.get(key).await
    }

    async fn delete(&self, key: &str) -> Result<(), ObjectStoreError> {
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(ObjectStoreError::Backend("injected delete failure".into()));
        }
        self.inner.delete(key).await
    }

    async fn exists(&self, key: &str) -> Result<bool, ObjectStoreError> {
        self.inner.exists(key).await
    }
}

struct Harness {
    _dir: tempfile::TempDir,
    db: Database,
    store: Arc<FlakyStore>,
    files: Arc<FileService>,
}

fn harness() -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open(dir.path().join("data")).unwrap();
    let store = Arc::new(FlakyStore::new(
        LocalStore::new(dir.path().join("files")).unwrap(),
    ));
    let object_store: Arc<dyn ObjectStore> = store.clone();
    let files = Arc::new(FileService::new(db.clone(), object_store, 5));
    Harness {
        _dir: dir,
        db,
        store,
        files,
    }
}

fn meta(owner: &str, name: &str, visibility: Visibility, tags: &[&str]) -> FileMeta {
    FileMeta {
        owner_id: owner.to_string(),
        file_name: name.to_string(),
        content_type: "text/plain".to_string(),
        visibility,
        tags: tags.iter().map(|s| s.to_string()).collect(),
    }
}

fn sha256_hex(data: &[u8]) -> String {
    ring::digest::digest(&ring::digest::SHA256, data)
        .as_ref()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

// ============================================================================
// Upload
// ============================================================================

#[tokio::test]
async fn upload_produces_ready_record_with_matching_hash() {
    let h = harness();
    let content = b"hello world";

    let file = h
        .files
        .upload(
            meta("u1", "hello.txt", Visibility::Private, &[]),
            Bytes::from_static(content),
        )
        .await
        .unwrap();

    assert_eq!(file.state, FileState::Ready);
    assert_eq!(file.sha256, sha256_hex(content));
    assert_eq!(file.size_bytes, content.len() as u64);

    let stored = h.store.get(&file.object_store_key).await.unwrap();
    assert_eq!(stored, Bytes::from_static(content));
}

#[tokio::test]
async fn upload_with_duplicate_name_conflicts() {
    let h = harness();
    h.files
        .upload(
            meta("u1", "a.txt", Visibility::Private, &[]),
            Bytes::from_static(b"one"),
        )
        .await
        .unwrap();

    let err = h
        .files
        .upload(
            meta("u1", "A.TXT", Visibility::Private, &[]),
            Bytes::from_static(b"two"),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, FileError::NameConflict(_)));
}

#[tokio::test]
async fn upload_of_identical_content_conflicts_and_keeps_the_original() {
    let h = harness();
    h.files
        .upload(
            meta("u1", "a.txt", Visibility::Private, &[]),
            Bytes::from_static(b"hello"),
        )
        .await
        .unwrap();

    let err = h
        .files
        .upload(
            meta("u1", "c.txt", Visibility::Private, &[]),
            Bytes::from_static(b"hello"),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, FileError::ContentConflict));

    // Only the original remains visible
    let listed = h.files.list_owner_files("u1", None).unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].file_name, "a.txt");
}

#[tokio::test]
async fn identical_content_is_allowed_across_owners() {
    let h = harness();
    h.files
        .upload(
            meta("u1", "a.txt", Visibility::Private, &[]),
            Bytes::from_static(b"shared bytes"),
        )
        .await
        .unwrap();
    h.files
        .upload(
            meta("u2", "a.txt", Visibility::Private, &[]),
            Bytes::from_static(b"shared bytes"),
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn failed_upload_is_compensated_to_failed() {
    let h = harness();
    h.store.fail_put.store(true, Ordering::SeqCst);

    let err = h
        .files
        .upload(
            meta("u1", "a.txt", Visibility::Private, &[]),
            Bytes::from_static(b"doomed"),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, FileError::UploadFailed(_)));

    // The reservation was flipped to FAILED, not left PENDING
    let leftovers = h
        .db
        .find_stale_files(Utc::now() + Duration::hours(1), 10)
        .unwrap();
    assert_eq!(leftovers.len(), 1);
    assert_eq!(leftovers[0].state, FileState::Failed);
    assert_eq!(leftovers[0].sha256, SHA256_PENDING);
}

#[tokio::test]
async fn content_can_be_retried_after_a_failed_upload() {
    let h = harness();

    // First attempt dies in the object store; the FAILED record keeps its
    // placeholder hash and therefore does not block the content.
    h.store.fail_put.store(true, Ordering::SeqCst);
    h.files
        .upload(
            meta("u1", "a.txt", Visibility::Private, &[]),
            Bytes::from_static(b"retry me"),
        )
        .await
        .unwrap_err();
    h.store.fail_put.store(false, Ordering::SeqCst);

    // Same content under a fresh name succeeds (the old name is still
    // reserved by the FAILED record until the janitor reclaims it)
    let file = h
        .files
        .upload(
            meta("u1", "b.txt", Visibility::Private, &[]),
            Bytes::from_static(b"retry me"),
        )
        .await
        .unwrap();
    assert_eq!(file.state, FileState::Ready);
}

// ============================================================================
// Download
// ============================================================================

#[tokio::test]
async fn download_round_trip_checks_secret_and_state() {
    let h = harness();
    let content = b"download me";
    let file = h
        .files
        .upload(
            meta("u1", "d.txt", Visibility::Private, &[]),
            Bytes::from_static(content),
        )
        .await
        .unwrap();

    let found = h
        .files
        .get_file_for_download(&file.id, &file.download_secret)
        .unwrap();
    let data = h.store.get(&found.object_store_key).await.unwrap();
    assert_eq!(data, Bytes::from_static(content));

    assert!(matches!(
        h.files.get_file_for_download(&file.id, "wrong-secret"),
        Err(FileError::AccessDenied)
    ));
    assert!(matches!(
        h.files.get_file_for_download("ghost", &file.download_secret),
        Err(FileError::NotFound)
    ));
}

#[tokio::test]
async fn download_of_non_ready_file_is_not_found() {
    let h = harness();

    let reserved = h
        .files
        .reserve(&meta("u1", "pending.txt", Visibility::Private, &[]))
        .unwrap();
    assert!(matches!(
        h.files
            .get_file_for_download(&reserved.id, &reserved.download_secret),
        Err(FileError::NotFound)
    ));

    let file = h
        .files
        .upload(
            meta("u1", "gone.txt", Visibility::Private, &[]),
            Bytes::from_static(b"bye"),
        )
        .await
        .unwrap();
    h.db.update_state(&file.id, FileState::Deleting).unwrap();
    assert!(matches!(
        h.files.get_file_for_download(&file.id, &file.download_secret),
        Err(FileError::NotFound)
    ));
}

// ============================================================================
// Rename
// ============================================================================

#[tokio::test]
async fn rename_frees_the_old_name() {
    let h = harness();
    h.files
        .upload(
            meta("u1", "a.txt", Visibility::Public, &["x"]),
            Bytes::from_static(b"original"),
        )
        .await
        .unwrap();

    let listed = h.files.list_owner_files("u1", None).unwrap();
    let renamed = h.files.rename(&listed[0].id, "u1", "b.txt").unwrap();
    assert_eq!(renamed.file_name, "b.txt");
    assert_eq!(renamed.state, FileState::Ready);

    let listed = h.files.list_owner_files("u1", None).unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].file_name, "b.txt");

    // The old name can be uploaded again
    h.files
        .upload(
            meta("u1", "a.txt", Visibility::Private, &[]),
            Bytes::from_static(b"replacement"),
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn rename_error_precedence_preserves_private_visibility() {
    let h = harness();
    let private = h
        .files
        .upload(
            meta("u1", "private.txt", Visibility::Private, &[]),
            Bytes::from_static(b"p1"),
        )
        .await
        .unwrap();
    let public = h
        .files
        .upload(
            meta("u1", "public.txt", Visibility::Public, &[]),
            Bytes::from_static(b"p2"),
        )
        .await
        .unwrap();

    // A foreign private file reads as missing; a foreign public file is
    // visibly forbidden
    assert!(matches!(
        h.files.rename(&private.id, "u2", "x.txt"),
        Err(FileError::NotFound)
    ));
    assert!(matches!(
        h.files.rename(&public.id, "u2", "x.txt"),
        Err(FileError::AccessDenied)
    ));
    assert!(matches!(
        h.files.rename("ghost", "u1", "x.txt"),
        Err(FileError::NotFound)
    ));
}

#[tokio::test]
async fn rename_to_taken_name_conflicts() {
    let h = harness();
    let a = h
        .files
        .upload(
            meta("u1", "a.txt", Visibility::Private, &[]),
            Bytes::from_static(b"a"),
        )
        .await
        .unwrap();
    h.files
        .upload(
            meta("u1", "b.txt", Visibility::Private, &[]),
            Bytes::from_static(b"b"),
        )
        .await
        .unwrap();

    assert!(matches!(
        h.files.rename(&a.id, "u1", "B.txt"),
        Err(FileError::NameConflict(_))
    ));
}

#[tokio::test]
async fn rename_requires_ready_state() {
    let h = harness();
    let reserved = h
        .files
        .reserve(&meta("u1", "pending.txt", Visibility::Private, &[]))
        .unwrap();

    assert!(matches!(
        h.files.rename(&reserved.id, "u1", "renamed.txt"),
        Err(FileError::InvalidState(FileState::Pending))
    ));
}

// ============================================================================
// Delete
// ============================================================================

#[tokio::test]
async fn delete_removes_blob_and_metadata() {
    let h = harness();
    let file = h
        .files
        .upload(
            meta("u1", "del.txt", Visibility::Private, &[]),
            Bytes::from_static(b"bye"),
        )
        .await
        .unwrap();

    h.files.delete(&file.id, "u1").await.unwrap();

    assert!(!h.store.exists(&file.object_store_key).await.unwrap());
    assert!(h.db.get_file(&file.id).unwrap().is_none());

    // Second delete of the same file is NotFound, never anything else
    assert!(matches!(
        h.files.delete(&file.id, "u1").await,
        Err(FileError::NotFound)
    ));
}

#[tokio::test]
async fn delete_checks_owner_and_state() {
    let h = harness();
    let file = h
        .files
        .upload(
            meta("u1", "mine.txt", Visibility::Public, &[]),
            Bytes::from_static(b"mine"),
        )
        .await
        .unwrap();

    assert!(matches!(
        h.files.delete(&file.id, "u2").await,
        Err(FileError::AccessDenied)
    ));

    let reserved = h
        .files
        .reserve(&meta("u1", "pending.txt", Visibility::Private, &[]))
        .unwrap();
    assert!(matches!(
        h.files.delete(&reserved.id, "u1").await,
        Err(FileError::InvalidState(FileState::Pending))
    ));
}

#[tokio::test]
async fn failed_delete_rolls_back_to_ready() {
    let h = harness();
    let file = h
        .files
        .upload(
            meta("u1", "sticky.txt", Visibility::Private, &[]),
            Bytes::from_static(b"sticky"),
        )
        .await
        .unwrap();

    h.store.fail_delete.store(true, Ordering::SeqCst);
    let err = h.files.delete(&file.id, "u1").await.unwrap_err();
    assert!(matches!(err, FileError::DeleteFailed(_)));

    // Rolled back: still READY, still downloadable
    let record = h.db.get_file(&file.id).unwrap().unwrap();
    assert_eq!(record.state, FileState::Ready);
    assert!(h.store.exists(&file.object_store_key).await.unwrap());

    // The owner can retry once the store recovers
    h.store.fail_delete.store(false, Ordering::SeqCst);
    h.files.delete(&file.id, "u1").await.unwrap();
}

// ============================================================================
// Listing
// ============================================================================

#[tokio::test]
async fn listing_filters_by_owner_visibility_and_tag() {
    let h = harness();
    h.files
        .upload(
            meta("u1", "pub.txt", Visibility::Public, &["shared"]),
            Bytes::from_static(b"1"),
        )
        .await
        .unwrap();
    h.files
        .upload(
            meta("u1", "priv.txt", Visibility::Private, &["secret"]),
            Bytes::from_static(b"2"),
        )
        .await
        .unwrap();
    h.files
        .upload(
            meta("u2", "other.txt", Visibility::Public, &["shared"]),
            Bytes::from_static(b"3"),
        )
        .await
        .unwrap();

    assert_eq!(h.files.list_owner_files("u1", None).unwrap().len(), 2);
    assert_eq!(
        h.files.list_owner_files("u1", Some("SECRET")).unwrap().len(),
        1
    );
    assert_eq!(h.files.list_public_files(None).unwrap().len(), 2);
    assert_eq!(h.files.list_public_files(Some("shared")).unwrap().len(), 2);
    assert!(h.files.list_public_files(Some("secret")).unwrap().is_empty());
}

// ============================================================================
// Races
// ============================================================================

#[tokio::test]
async fn concurrent_reservations_have_exactly_one_winner() {
    let h = harness();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let files = Arc::clone(&h.files);
        handles.push(tokio::spawn(async move {
            files.reserve(&meta("u1", "contested.txt", Visibility::Private, &[]))
        }));
    }

    let mut winners = 0;
    let mut conflicts = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => winners += 1,
            Err(FileError::NameConflict(_)) => conflicts += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(winners, 1);
    assert_eq!(conflicts, 7);
}

#[tokio::test]
async fn concurrent_identical_uploads_produce_exactly_one_ready_file() {
    let h = harness();

    let mut handles = Vec::new();
    for i in 0..4 {
        let files = Arc::clone(&h.files);
        handles.push(tokio::spawn(async move {
            files
                .upload(
                    meta("u1", &format!("copy-{i}.txt"), Visibility::Private, &[]),
                    Bytes::from_static(b"identical bytes"),
                )
                .await
        }));
    }

    let mut winners = 0;
    let mut conflicts = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(file) => {
                assert_eq!(file.sha256, sha256_hex(b"identical bytes"));
                winners += 1;
            }
            Err(FileError::ContentConflict) => conflicts += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(winners, 1);
    assert_eq!(conflicts, 3);

    let listed = h.files.list_owner_files("u1", None).unwrap();
    assert_eq!(listed.len(), 1);
}
