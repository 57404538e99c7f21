//! # Reconciliation
//!
//! Periodic incremental fetch for one repository. Each tick claims the
//! record with a conditional update, pages forward from the persisted commit
//! cursor, stores unseen commits and releases the claim.

use chrono::Utc;
use metrics::{counter, histogram};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use super::fetch::{fetch_commit_page, store_commit};
use super::{Cursor, SyncContext, SyncError, cancellable, sleep_or_cancel};
use crate::models::repository::{self, SyncStatus};
use crate::provider::CommitPageRequest;
use crate::repositories::RepositoryChanges;

const PHASE: &str = "reconcile";

/// Result of a single reconciliation tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Another pass owned the record; nothing was touched
    Skipped,
    /// The cursor yielded no commits and was reset to page 1
    CursorReset,
    Completed { pages: u32, commits_stored: u64 },
}

pub struct ReconciliationScheduler {
    ctx: SyncContext,
    repository_id: Uuid,
    repository_name: String,
}

impl ReconciliationScheduler {
    pub fn new(ctx: SyncContext, record: &repository::Model) -> Self {
        Self {
            ctx,
            repository_id: record.id,
            repository_name: record.name.clone(),
        }
    }

    /// Ticks every `fetch_interval` until shutdown or until the record disappears.
    #[instrument(skip_all, fields(repository = %self.repository_name))]
    pub async fn run(self, shutdown: CancellationToken) {
        let interval = self.ctx.settings.fetch_interval;
        info!(interval_secs = interval.as_secs(), "Starting reconciliation");

        loop {
            if sleep_or_cancel(&shutdown, interval).await.is_err() {
                break;
            }

            let tick_started = Instant::now();
            match self.tick(&shutdown).await {
                Ok(outcome) => debug!(?outcome, "Reconciliation tick finished"),
                Err(SyncError::Cancelled) => break,
                Err(SyncError::NotFound(_)) => {
                    warn!("Repository record no longer exists, stopping reconciliation");
                    break;
                }
                Err(err) => error!(error = %err, "Reconciliation tick failed"),
            }
            histogram!("repo_sync_reconcile_tick_duration_ms")
                .record(tick_started.elapsed().as_secs_f64() * 1_000.0);
        }

        info!("Reconciliation stopped");
    }

    /// Runs one pass. Skips without mutation when the record is already being fetched.
    pub async fn tick(&self, shutdown: &CancellationToken) -> Result<TickOutcome, SyncError> {
        let current = self.load().await?;
        if current.is_fetching {
            debug!(repository = %self.repository_name, "Fetch pass already active, skipping tick");
            return Ok(TickOutcome::Skipped);
        }

        let _permit = cancellable(shutdown, self.ctx.passes.acquire())
            .await?
            .map_err(|_| SyncError::Cancelled)?;

        if !self.ctx.repositories.try_claim(self.repository_id).await? {
            debug!(repository = %self.repository_name, "Lost claim race, skipping tick");
            return Ok(TickOutcome::Skipped);
        }

        match self.load().await {
            Ok(record) => {
                let result = self.incremental_fetch(&record, shutdown).await;
                self.release(&record, &result).await;
                result
            }
            Err(err) => {
                self.release_claim_only().await;
                Err(err)
            }
        }
    }

    async fn load(&self) -> Result<repository::Model, SyncError> {
        self.ctx
            .repositories
            .get_by_public_id(self.repository_id)
            .await?
            .ok_or_else(|| SyncError::NotFound(self.repository_id.to_string()))
    }

    async fn incremental_fetch(
        &self,
        record: &repository::Model,
        shutdown: &CancellationToken,
    ) -> Result<TickOutcome, SyncError> {
        let start = Cursor::of(record);
        // The request cursor stays fixed for the whole tick; only the page advances
        let commit_hint = start.commit_hint();
        let (since, mut until) = self.ctx.settings.backfill_window(Utc::now());
        let mut cursor = start.clone();
        let mut page = start.page;
        let mut pages: u32 = 0;
        let mut commits_stored: u64 = 0;

        loop {
            let request = CommitPageRequest {
                repository_name: record.name.clone(),
                since,
                until,
                cursor_commit_id: commit_hint.clone(),
                page,
                per_page: self.ctx.settings.commits_per_page,
            };
            let batch = fetch_commit_page(&self.ctx, &request, shutdown, PHASE).await?;

            if batch.commits.is_empty() && pages == 0 {
                warn!(
                    repository = %record.name,
                    page,
                    cursor = %start.commit_id,
                    "No commits returned for cursor, resetting"
                );
                self.ctx
                    .repositories
                    .update_by_public_id(record.id, Cursor::reset().changes())
                    .await?;
                counter!("repo_sync_cursor_resets_total").increment(1);
                return Ok(TickOutcome::CursorReset);
            }

            let has_more = batch.has_more;
            for commit in batch.commits {
                if shutdown.is_cancelled() {
                    return Err(SyncError::Cancelled);
                }
                let commit_id = commit.commit_id.clone();
                let advanced = match self.ctx.commits.exists_by_id(&commit_id).await {
                    Ok(true) => true,
                    Ok(false) => match store_commit(&self.ctx, commit).await {
                        Ok(stored) => {
                            if stored {
                                commits_stored += 1;
                            }
                            true
                        }
                        Err(err) => {
                            warn!(commit_id = %commit_id, error = ?err, "Failed to store commit");
                            false
                        }
                    },
                    Err(err) => {
                        warn!(commit_id = %commit_id, error = ?err, "Failed to look up commit");
                        false
                    }
                };
                if advanced {
                    cursor.commit_id = commit_id;
                }
            }

            pages += 1;
            cursor.page = page;
            self.ctx
                .repositories
                .update_by_public_id(record.id, cursor.changes())
                .await?;

            if !has_more {
                break;
            }
            page = page.saturating_add(1);
            until = Utc::now();
        }

        if commits_stored > 0 {
            info!(
                repository = %record.name,
                pages,
                commits = commits_stored,
                cursor = %cursor.commit_id,
                "Reconciled new commits"
            );
        }
        Ok(TickOutcome::Completed {
            pages,
            commits_stored,
        })
    }

    /// Releases the claim and records how the pass ended.
    async fn release(&self, record: &repository::Model, result: &Result<TickOutcome, SyncError>) {
        let mut changes = RepositoryChanges::default().with_fetching(false);
        match result {
            Ok(_) if record.status() == SyncStatus::Stuck => {
                let status = if record.needs_backfill() {
                    SyncStatus::Backfilling
                } else {
                    SyncStatus::Synced
                };
                changes = changes.with_status(status).with_error(None);
            }
            Ok(_) | Err(SyncError::Cancelled) => {}
            Err(err @ SyncError::RetriesExhausted { .. }) => {
                error!(repository = %record.name, error = %err, "Reconciliation stuck");
                counter!("repo_sync_stuck_total", "phase" => PHASE).increment(1);
                changes = changes
                    .with_status(SyncStatus::Stuck)
                    .with_error(Some(err.to_string()));
            }
            Err(err) => {
                changes = changes.with_error(Some(err.to_string()));
            }
        }

        if let Err(err) = self
            .ctx
            .repositories
            .update_by_public_id(record.id, changes)
            .await
        {
            error!(repository = %record.name, error = ?err, "Failed to release fetch claim");
        }
    }

    async fn release_claim_only(&self) {
        let changes = RepositoryChanges::default().with_fetching(false);
        if let Err(err) = self
            .ctx
            .repositories
            .update_by_public_id(self.repository_id, changes)
            .await
        {
            error!(repository = %self.repository_name, error = ?err, "Failed to release fetch claim");
        }
    }
}
