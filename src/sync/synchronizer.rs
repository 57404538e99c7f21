//! # Repository Synchronizer
//!
//! Entry point of the engine: registration, startup recovery, shutdown and
//! the read-side queries the HTTP layer exposes.

use chrono::Utc;
use metrics::counter;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::{
    BackfillFetcher, ReconciliationScheduler, SyncContext, SyncError, SyncSupervisor,
    is_valid_repository_name,
};
use crate::models::repository::{self, SyncStatus};
use crate::provider::ProviderError;
use crate::repositories::{AuthorCommitCount, CommitPageQuery, PagedCommits};

pub struct RepositorySynchronizer {
    ctx: SyncContext,
    supervisor: SyncSupervisor,
}

impl RepositorySynchronizer {
    pub fn new(ctx: SyncContext, shutdown: CancellationToken) -> Self {
        Self {
            ctx,
            supervisor: SyncSupervisor::new(shutdown),
        }
    }

    pub fn context(&self) -> &SyncContext {
        &self.ctx
    }

    /// Validates and persists a new repository, then starts its backfill in the background.
    #[instrument(skip(self))]
    pub async fn register(&self, name: &str) -> Result<repository::Model, SyncError> {
        let name = name.trim();
        if !is_valid_repository_name(name) {
            return Err(SyncError::InvalidName(name.to_string()));
        }

        if self.ctx.repositories.get_by_name(name).await?.is_some() {
            return Err(SyncError::AlreadyRegistered(name.to_string()));
        }

        let metadata = self
            .ctx
            .provider
            .fetch_metadata(name)
            .await
            .map_err(|err| self.metadata_error(name, err))?;

        let now = Utc::now().fixed_offset();
        let record = repository::Model {
            id: Uuid::new_v4(),
            name: name.to_string(),
            description: metadata.description,
            url: metadata.url,
            language: metadata.language,
            forks_count: metadata.forks_count,
            stars_count: metadata.stars_count,
            open_issues_count: metadata.open_issues_count,
            watchers_count: metadata.watchers_count,
            is_fetching: true,
            last_fetched_page: 1,
            last_fetched_commit_id: String::new(),
            sync_status: SyncStatus::Backfilling.to_string(),
            last_error: None,
            backfill_completed_at: None,
            created_at: now,
            updated_at: now,
        };

        let record = match self.ctx.repositories.save(record).await {
            Ok(record) => record,
            Err(err) if err.is_duplicate() => {
                return Err(SyncError::AlreadyRegistered(name.to_string()));
            }
            Err(err) => return Err(err.into()),
        };

        counter!("repo_sync_repositories_registered_total").increment(1);
        info!(repository = %record.name, id = %record.id, "Repository registered");

        if !self.launch(record.clone(), true).await {
            warn!(repository = %record.name, "Backfill not started, engine is shutting down");
        }
        Ok(record)
    }

    /// Launches one worker per stored repository. Returns how many were started.
    ///
    /// Stale `is_fetching` markers left by an earlier process are cleared
    /// first. Records whose backfill never completed resume it when
    /// `resume_incomplete_backfill` is set; everything else goes straight
    /// to reconciliation.
    #[instrument(skip(self))]
    pub async fn resume_all(&self) -> Result<usize, SyncError> {
        let cleared = self
            .ctx
            .repositories
            .set_fetching_flag_for_all(false)
            .await?;
        let records = self.ctx.repositories.list_all().await?;
        let resume_backfill = self.ctx.settings.resume_incomplete_backfill;

        let mut launched = 0;
        for record in records {
            let backfill_first = resume_backfill && record.needs_backfill();
            if self.launch(record, backfill_first).await {
                launched += 1;
            }
        }

        info!(launched, stale_markers_cleared = cleared, "Resumed synchronization");
        Ok(launched)
    }

    /// Stops every task, then clears `is_fetching` on all records.
    pub async fn shutdown(&self) {
        self.supervisor
            .shutdown(self.ctx.settings.shutdown_grace)
            .await;

        match self
            .ctx
            .repositories
            .set_fetching_flag_for_all(false)
            .await
        {
            Ok(cleared) => info!(cleared, "Cleared fetching markers"),
            Err(err) => warn!(error = ?err, "Failed to clear fetching markers on shutdown"),
        }
    }

    pub async fn repository(&self, id: Uuid) -> Result<repository::Model, SyncError> {
        self.ctx
            .repositories
            .get_by_public_id(id)
            .await?
            .ok_or_else(|| SyncError::NotFound(id.to_string()))
    }

    pub async fn repositories(&self) -> Result<Vec<repository::Model>, SyncError> {
        Ok(self.ctx.repositories.list_all().await?)
    }

    pub async fn commits(
        &self,
        id: Uuid,
        query: &CommitPageQuery,
    ) -> Result<(repository::Model, PagedCommits), SyncError> {
        let record = self.repository(id).await?;
        let page = self
            .ctx
            .commits
            .list_by_repository(&record.name, query)
            .await?;
        Ok((record, page))
    }

    pub async fn top_authors(
        &self,
        id: Uuid,
        limit: u64,
    ) -> Result<Vec<AuthorCommitCount>, SyncError> {
        let record = self.repository(id).await?;
        Ok(self.ctx.commits.top_authors(&record.name, limit).await?)
    }

    /// Whether a background worker currently owns the repository.
    pub fn is_tracking(&self, id: Uuid) -> bool {
        self.supervisor.is_tracking(id)
    }

    pub fn active_workers(&self) -> usize {
        self.supervisor.active_count()
    }

    async fn launch(&self, record: repository::Model, backfill_first: bool) -> bool {
        let ctx = self.ctx.clone();
        let shutdown = self.supervisor.shutdown_token();
        self.supervisor
            .spawn(record.id, run_worker(ctx, record, backfill_first, shutdown))
            .await
    }

    fn metadata_error(&self, name: &str, err: ProviderError) -> SyncError {
        if let Some(snapshot) = err.rate_limit() {
            self.ctx.rate_limits.observe(snapshot);
        }
        warn!(repository = %name, error = %err, "Failed to fetch repository metadata");

        match err {
            ProviderError::Forbidden { retry_after, .. } => SyncError::RateLimited {
                retry_after: retry_after.or_else(|| {
                    self.ctx
                        .rate_limits
                        .wait_duration(Utc::now())
                        .map(|wait| wait.as_secs())
                        .filter(|secs| *secs > 0)
                }),
            },
            ProviderError::Transport(message) => SyncError::Transport(message),
            other => SyncError::MetadataUnavailable(other.to_string()),
        }
    }
}

/// Lifetime of one repository: backfill when required, then reconciliation.
async fn run_worker(
    ctx: SyncContext,
    record: repository::Model,
    backfill_first: bool,
    shutdown: CancellationToken,
) {
    if backfill_first {
        match BackfillFetcher::new(ctx.clone(), record.clone())
            .run(&shutdown)
            .await
        {
            Ok(_) => {}
            Err(SyncError::Cancelled) => return,
            Err(err) => {
                warn!(
                    repository = %record.name,
                    error = %err,
                    "Backfill did not complete, repository left stuck"
                );
                return;
            }
        }
    }

    ReconciliationScheduler::new(ctx, &record)
        .run(shutdown)
        .await;
}
