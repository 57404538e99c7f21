//! # Backfill
//!
//! One-time, page-by-page ingestion of a repository's history over the
//! configured date window. The cursor is persisted after every page, so an
//! interrupted backfill resumes at page granularity.

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use super::fetch::{fetch_commit_page, mark_stuck, store_commit};
use super::{Cursor, SyncContext, SyncError, cancellable};
use crate::models::repository::{self, SyncStatus};
use crate::provider::CommitPageRequest;
use crate::repositories::RepositoryChanges;

const PHASE: &str = "backfill";

/// Progress summary of a finished backfill.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackfillOutcome {
    pub pages_fetched: u32,
    pub commits_stored: u64,
    pub last_page: u32,
}

pub struct BackfillFetcher {
    ctx: SyncContext,
    repository: repository::Model,
}

impl BackfillFetcher {
    pub fn new(ctx: SyncContext, repository: repository::Model) -> Self {
        Self { ctx, repository }
    }

    /// Runs the backfill to completion. Failures other than cancellation
    /// leave the record `stuck`.
    #[instrument(skip_all, fields(repository = %self.repository.name))]
    pub async fn run(&self, shutdown: &CancellationToken) -> Result<BackfillOutcome, SyncError> {
        match self.fetch_all(shutdown).await {
            Ok(outcome) => Ok(outcome),
            Err(SyncError::Cancelled) => {
                info!("Backfill interrupted by shutdown");
                Err(SyncError::Cancelled)
            }
            Err(err) => {
                mark_stuck(&self.ctx, &self.repository, &err, PHASE).await;
                Err(err)
            }
        }
    }

    async fn fetch_all(&self, shutdown: &CancellationToken) -> Result<BackfillOutcome, SyncError> {
        let record = &self.repository;
        let settings = &self.ctx.settings;

        if !record.is_fetching || record.status() != SyncStatus::Backfilling {
            self.ctx
                .repositories
                .update_by_public_id(
                    record.id,
                    RepositoryChanges::default()
                        .with_fetching(true)
                        .with_status(SyncStatus::Backfilling),
                )
                .await?;
        }

        let (since, until) = settings.backfill_window(Utc::now());
        let mut cursor = Cursor::of(record);
        let mut page = cursor.backfill_resume_page();
        let mut outcome = BackfillOutcome {
            last_page: cursor.page,
            ..BackfillOutcome::default()
        };

        info!(start_page = page, %since, %until, "Starting backfill");

        loop {
            let _permit = cancellable(shutdown, self.ctx.passes.acquire())
                .await?
                .map_err(|_| SyncError::Cancelled)?;

            let request = CommitPageRequest {
                repository_name: record.name.clone(),
                since,
                until,
                cursor_commit_id: None,
                page,
                per_page: settings.commits_per_page,
            };
            let batch = fetch_commit_page(&self.ctx, &request, shutdown, PHASE).await?;
            let has_more = batch.has_more;

            let mut last_commit_id = cursor.commit_id.clone();
            for commit in batch.commits {
                if shutdown.is_cancelled() {
                    return Err(SyncError::Cancelled);
                }
                last_commit_id = commit.commit_id.clone();
                match store_commit(&self.ctx, commit).await {
                    Ok(true) => outcome.commits_stored += 1,
                    Ok(false) => {}
                    Err(err) => warn!(
                        page,
                        commit_id = %last_commit_id,
                        error = ?err,
                        "Failed to store commit, continuing with page"
                    ),
                }
            }

            cursor = Cursor::new(page, last_commit_id);
            self.ctx
                .repositories
                .update_by_public_id(record.id, cursor.changes())
                .await?;
            outcome.pages_fetched += 1;
            outcome.last_page = page;

            if !has_more {
                break;
            }
            page = page.saturating_add(1);
        }

        self.ctx
            .repositories
            .update_by_public_id(
                record.id,
                RepositoryChanges::default()
                    .with_fetching(false)
                    .with_status(SyncStatus::Synced)
                    .with_error(None)
                    .with_backfill_completed(Utc::now()),
            )
            .await?;

        info!(
            pages = outcome.pages_fetched,
            commits = outcome.commits_stored,
            last_page = outcome.last_page,
            "Backfill completed"
        );
        Ok(outcome)
    }
}
