pub mod db;
mod files;
pub mod models;
mod tables;
mod tags;

pub use db::{Database, DatabaseError};
pub use files::{FinalizeOutcome, RenameOutcome};
pub use tables::*;
