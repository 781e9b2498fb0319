//! Background reconciliation of stale upload leftovers.
//!
//! Crashed or abandoned uploads leave PENDING/FAILED records (and possibly
//! orphaned blobs) behind. The janitor periodically claims batches of such
//! records past the retention cutoff, deletes their blobs and removes their
//! metadata. It talks to request handlers only through persisted state.

use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{debug, info, warn};

use crate::config::JanitorConfig;
use crate::object_store::ObjectStore;
use crate::storage::models::{FileRecord, FileState};
use crate::storage::Database;

pub struct Janitor {
    db: Database,
    object_store: Arc<dyn ObjectStore>,
    config: JanitorConfig,
}

/// Summary of a single sweep run.
#[derive(Debug, Default)]
pub struct SweepStats {
    /// Records successfully torn down (blob + metadata removed).
    pub deleted: u64,
    /// Records whose teardown failed and which were reverted to FAILED.
    pub reverted: u64,
    /// Batches processed this run.
    pub batches: u32,
}

impl Janitor {
    pub fn new(db: Database, object_store: Arc<dyn ObjectStore>, config: JanitorConfig) -> Self {
        Self {
            db,
            object_store,
            config,
        }
    }

    /// Run the sweep loop forever on its own timer. The first sweep fires
    /// immediately, repairing anything left over from a previous crash.
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        let period = std::time::Duration::from_secs(self.config.sweep_interval_secs);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let stats = self.sweep_once().await;
                info!(
                    deleted = stats.deleted,
                    reverted = stats.reverted,
                    batches = stats.batches,
                    "Janitor sweep completed"
                );
            }
        })
    }

    /// One full sweep: repeatedly claim a batch of stale PENDING/FAILED
    /// records, tear each one down, until a batch comes back empty or the
    /// batch ceiling is reached. The JANITOR claim keeps a record from being
    /// processed twice; per-item failures revert that record to FAILED so a
    /// later run retries it.
    pub async fn sweep_once(&self) -> SweepStats {
        let cutoff = Utc::now() - Duration::hours(self.config.retention_hours as i64);
        info!(%cutoff, "Starting janitor sweep");

        let mut stats = SweepStats::default();
        loop {
            if stats.batches >= self.config.max_batches {
                warn!(
                    batches = stats.batches,
                    "Janitor hit the batch ceiling, stopping this run"
                );
                break;
            }

            let stale = match self.db.find_stale_files(cutoff, self.config.batch_size) {
                Ok(batch) => batch,
                Err(e) => {
                    warn!(error = %e, "Janitor stale query failed");
                    break;
                }
            };
            if stale.is_empty() {
                break;
            }
            stats.batches += 1;

            let ids: Vec<String> = stale.iter().map(|f| f.id.clone()).collect();
            let claimed = match self.db.claim_for_janitor(&ids) {
                Ok(claimed) => claimed,
                Err(e) => {
                    warn!(error = %e, "Janitor claim failed");
                    break;
                }
            };
            if claimed.is_empty() {
                // Every candidate raced into another state since the query.
                continue;
            }
            debug!(batch = stats.batches, claimed = claimed.len(), "Janitor claimed batch");

            for file in claimed {
                match self.teardown(&file).await {
                    Ok(()) => stats.deleted += 1,
                    Err(e) => {
                        warn!(
                            file_id = %file.id,
                            state = ?file.state,
                            error = %e,
                            "Janitor failed to clean up file"
                        );
                        if let Err(revert) = self.db.update_state(&file.id, FileState::Failed) {
                            warn!(file_id = %file.id, error = %revert, "Janitor failed to revert claim");
                        }
                        stats.reverted += 1;
                    }
                }
            }
        }

        stats
    }

    async fn teardown(&self, file: &FileRecord) -> anyhow::Result<()> {
        self.object_store.delete(&file.object_store_key).await?;
        self.db.delete_file(&file.id)?;
        Ok(())
    }
}
