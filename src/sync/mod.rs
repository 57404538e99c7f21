//! # Synchronization Engine
//!
//! Onboards repositories with a paginated backfill, keeps them current with a
//! periodic cursor-based reconciliation, and paces both against the
//! provider's rate-limit signals. Every background task is owned by a
//! [`SyncSupervisor`] and observes one shared cancellation token.

use std::future::Future;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use chrono::{DateTime, Months, Utc};
use regex::Regex;
use sea_orm::DatabaseConnection;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::error::RepositoryError;
use crate::provider::RemoteProvider;
use crate::repositories::{
    CommitRepository, CommitStore, RepoMetadataRepository, RepoMetadataStore,
};

pub mod backfill;
pub mod cursor;
pub mod fetch;
pub mod rate_limit;
pub mod reconcile;
pub mod retry;
pub mod supervisor;
pub mod synchronizer;

pub use backfill::{BackfillFetcher, BackfillOutcome};
pub use cursor::Cursor;
pub use rate_limit::RateLimitTracker;
pub use reconcile::{ReconciliationScheduler, TickOutcome};
pub use retry::RetryPolicy;
pub use supervisor::SyncSupervisor;
pub use synchronizer::RepositorySynchronizer;

static REPOSITORY_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.-]*/[A-Za-z0-9_.-]+$")
        .expect("repository name pattern is valid")
});

/// Whether `name` has the `owner/repo` shape with exactly one separator.
pub fn is_valid_repository_name(name: &str) -> bool {
    REPOSITORY_NAME.is_match(name)
}

/// Errors raised by registration and the background synchronization loops.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("invalid repository name '{0}', expected owner/repo")]
    InvalidName(String),

    #[error("repository {0} is already registered")]
    AlreadyRegistered(String),

    #[error("repository {0} not found")]
    NotFound(String),

    #[error("provider rate limit exceeded")]
    RateLimited { retry_after: Option<u64> },

    #[error("repository metadata unavailable: {0}")]
    MetadataUnavailable(String),

    #[error("provider transport error: {0}")]
    Transport(String),

    #[error("synchronization cancelled")]
    Cancelled,

    #[error("gave up after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },

    #[error(transparent)]
    Storage(#[from] RepositoryError),
}

/// Runtime parameters of the backfill and reconciliation loops.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub fetch_interval: Duration,
    pub commits_per_page: u32,
    pub default_start_date: Option<DateTime<Utc>>,
    pub default_end_date: Option<DateTime<Utc>>,
    pub max_concurrent_passes: usize,
    pub resume_incomplete_backfill: bool,
    pub shutdown_grace: Duration,
    pub retry: RetryPolicy,
}

impl SyncSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            fetch_interval: config.sync.fetch_interval(),
            commits_per_page: config.sync.commits_per_page,
            default_start_date: config.sync.default_start_date,
            default_end_date: config.sync.default_end_date,
            max_concurrent_passes: config.sync.max_concurrent_passes.max(1),
            resume_incomplete_backfill: config.sync.resume_incomplete_backfill,
            shutdown_grace: config.sync.shutdown_grace(),
            retry: RetryPolicy::from(&config.retry_policy),
        }
    }

    /// Resolves the `[start, end]` date window against `now`. Unset bounds
    /// default to ten months back and `now`.
    pub fn backfill_window(&self, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        let start = self
            .default_start_date
            .or_else(|| now.checked_sub_months(Months::new(10)))
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
        let end = self.default_end_date.unwrap_or(now);
        (start, end)
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

/// Collaborators shared by every background task.
#[derive(Clone)]
pub struct SyncContext {
    pub provider: Arc<dyn RemoteProvider>,
    pub repositories: Arc<dyn RepoMetadataStore>,
    pub commits: Arc<dyn CommitStore>,
    pub rate_limits: Arc<RateLimitTracker>,
    pub settings: Arc<SyncSettings>,
    /// Caps how many fetch passes run at once across all repositories
    pub passes: Arc<Semaphore>,
}

impl SyncContext {
    pub fn new(
        provider: Arc<dyn RemoteProvider>,
        repositories: Arc<dyn RepoMetadataStore>,
        commits: Arc<dyn CommitStore>,
        settings: SyncSettings,
    ) -> Self {
        let passes = Arc::new(Semaphore::new(settings.max_concurrent_passes.max(1)));
        Self {
            provider,
            repositories,
            commits,
            rate_limits: Arc::new(RateLimitTracker::new()),
            settings: Arc::new(settings),
            passes,
        }
    }

    /// Builds a context over the SeaORM-backed stores.
    pub fn from_database(
        db: Arc<DatabaseConnection>,
        provider: Arc<dyn RemoteProvider>,
        settings: SyncSettings,
    ) -> Self {
        Self::new(
            provider,
            Arc::new(RepoMetadataRepository::new(db.clone())),
            Arc::new(CommitRepository::new(db)),
            settings,
        )
    }
}

/// Runs `fut` unless `shutdown` fires first.
pub(crate) async fn cancellable<F, T>(shutdown: &CancellationToken, fut: F) -> Result<T, SyncError>
where
    F: Future<Output = T>,
{
    tokio::select! {
        biased;
        _ = shutdown.cancelled() => Err(SyncError::Cancelled),
        output = fut => Ok(output),
    }
}

pub(crate) async fn sleep_or_cancel(
    shutdown: &CancellationToken,
    duration: Duration,
) -> Result<(), SyncError> {
    cancellable(shutdown, tokio::time::sleep(duration)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn validates_owner_repo_shape() {
        assert!(is_valid_repository_name("octo/hello"));
        assert!(is_valid_repository_name("rust-lang/rust.vim"));
        assert!(is_valid_repository_name("a_b/c-d_e"));

        assert!(!is_valid_repository_name("octo"));
        assert!(!is_valid_repository_name("octo/"));
        assert!(!is_valid_repository_name("/hello"));
        assert!(!is_valid_repository_name("octo/hello/extra"));
        assert!(!is_valid_repository_name("octo /hello"));
        assert!(!is_valid_repository_name(""));
    }

    #[test]
    fn backfill_window_defaults_to_last_ten_months() {
        let now = Utc.with_ymd_and_hms(2025, 11, 15, 12, 0, 0).unwrap();
        let (start, end) = SyncSettings::default().backfill_window(now);

        assert_eq!(start, Utc.with_ymd_and_hms(2025, 1, 15, 12, 0, 0).unwrap());
        assert_eq!(end, now);
    }

    #[test]
    fn backfill_window_uses_configured_bounds() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let settings = SyncSettings {
            default_start_date: Some(start),
            default_end_date: Some(end),
            ..SyncSettings::default()
        };

        assert_eq!(settings.backfill_window(Utc::now()), (start, end));
    }

    #[tokio::test]
    async fn cancellable_prefers_shutdown() {
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        let result = cancellable(&shutdown, async { 42 }).await;
        assert!(matches!(result, Err(SyncError::Cancelled)));

        let live = CancellationToken::new();
        assert_eq!(cancellable(&live, async { 42 }).await.unwrap(), 42);
    }
}
