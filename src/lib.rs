//! file-vault - a file-storage API with blobs in an object store and metadata
//! in an embedded database
//!
//! The two stores share no transaction; consistency comes from:
//! - a reserve-before-write upload protocol (metadata record exists before
//!   any byte is stored)
//! - conditional single-record updates in redb (ACID, single-writer)
//! - a periodic janitor sweep that reclaims stale records and orphaned blobs
//!
//! Swappable object storage backends (local filesystem, S3-compatible) and a
//! REST API with multipart upload support.

pub mod api;
pub mod config;
pub mod janitor;
pub mod object_store;
pub mod service;
pub mod storage;
#[cfg(test)]
pub mod testutil;

use std::sync::Arc;

use config::Config;
use service::FileService;
use storage::Database;

/// Shared application state
pub struct AppState {
    pub config: Config,
    pub db: Database,
    pub object_store: Arc<dyn object_store::ObjectStore>,
    pub files: FileService,
}
