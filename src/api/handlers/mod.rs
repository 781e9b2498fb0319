mod admin;
mod download;
mod files;
mod tags;

pub use admin::{admin_purge, health};
pub use download::download_file;
pub use files::{delete_file, list_files, list_public_files, rename_file, upload_file};
pub use tags::list_tags;
