//! Page fetching with rate-limit pacing and bounded retry, plus the store
//! writes shared by backfill and reconciliation.

use chrono::Utc;
use metrics::counter;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{SyncContext, SyncError, cancellable, sleep_or_cancel};
use crate::error::RepositoryError;
use crate::models::commit::NewCommit;
use crate::models::repository::{self, SyncStatus};
use crate::provider::{CommitBatch, CommitPageRequest};
use crate::repositories::RepositoryChanges;

/// Fetches one page, sleeping through soft throttles and retrying failures
/// with backoff until the policy's attempt budget is spent.
pub async fn fetch_commit_page(
    ctx: &SyncContext,
    request: &CommitPageRequest,
    shutdown: &CancellationToken,
    phase: &'static str,
) -> Result<CommitBatch, SyncError> {
    let policy = ctx.settings.retry;
    let mut attempts: u32 = 0;

    loop {
        if let Some(wait) = ctx.rate_limits.wait_duration(Utc::now()) {
            if !wait.is_zero() {
                info!(
                    repository = %request.repository_name,
                    page = request.page,
                    wait_seconds = wait.as_secs(),
                    "Rate limit exhausted, waiting for reset"
                );
                counter!("repo_sync_rate_limit_waits_total", "phase" => phase).increment(1);
                sleep_or_cancel(shutdown, wait).await?;
            }
        }

        let err = match cancellable(shutdown, ctx.provider.fetch_commits(request)).await? {
            Ok(batch) => {
                if let Some(snapshot) = &batch.rate_limit {
                    ctx.rate_limits.observe(snapshot);
                }
                counter!("repo_sync_pages_fetched_total", "phase" => phase).increment(1);
                return Ok(batch);
            }
            Err(err) => err,
        };

        if let Some(snapshot) = err.rate_limit() {
            ctx.rate_limits.observe(snapshot);
        }

        // A refusal with an exhausted budget and a future reset is a soft throttle
        let throttled = err.is_forbidden()
            && err.retry_after().is_none()
            && ctx
                .rate_limits
                .wait_duration(Utc::now())
                .is_some_and(|wait| !wait.is_zero());
        if throttled {
            debug!(
                repository = %request.repository_name,
                page = request.page,
                "Provider throttled the request"
            );
            continue;
        }

        attempts += 1;
        if attempts >= policy.max_attempts() {
            return Err(SyncError::RetriesExhausted {
                attempts,
                last_error: err.to_string(),
            });
        }

        let delay = policy.backoff(attempts - 1, err.retry_after());
        warn!(
            repository = %request.repository_name,
            page = request.page,
            attempt = attempts,
            max_attempts = policy.max_attempts(),
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "Commit page fetch failed, retrying"
        );
        counter!("repo_sync_fetch_retries_total", "phase" => phase).increment(1);
        sleep_or_cancel(shutdown, delay).await?;
    }
}

/// Stores one commit. Returns `false` when the hash was already present.
pub async fn store_commit(ctx: &SyncContext, commit: NewCommit) -> Result<bool, RepositoryError> {
    match ctx.commits.save(commit).await {
        Ok(()) => {
            counter!("repo_sync_commits_stored_total").increment(1);
            Ok(true)
        }
        Err(RepositoryError::Duplicate(_)) => Ok(false),
        Err(err) => Err(err),
    }
}

/// Moves a record into the terminal `stuck` status after a failed pass.
pub async fn mark_stuck(
    ctx: &SyncContext,
    record: &repository::Model,
    cause: &SyncError,
    phase: &'static str,
) {
    error!(
        repository = %record.name,
        phase,
        error = %cause,
        "Synchronization stuck"
    );
    counter!("repo_sync_stuck_total", "phase" => phase).increment(1);

    let changes = RepositoryChanges::default()
        .with_fetching(false)
        .with_status(SyncStatus::Stuck)
        .with_error(Some(cause.to_string()));
    if let Err(err) = ctx.repositories.update_by_public_id(record.id, changes).await {
        error!(
            repository = %record.name,
            error = ?err,
            "Failed to record stuck status"
        );
    }
}
