//! Test utilities shared by the integration tests.
//!
//! In-memory SQLite with migrations applied, a scripted provider that
//! records every request, and record builders.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use migration::{Migrator, MigratorTrait};
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use uuid::Uuid;

use repo_sync::error::RepositoryError;
use repo_sync::models::commit::NewCommit;
use repo_sync::models::repository::{self, SyncStatus};
use repo_sync::provider::{
    CommitBatch, CommitPageRequest, ProviderError, RemoteProvider, RepositoryMetadata,
};
use repo_sync::repositories::{
    AuthorCommitCount, CommitPageQuery, CommitRepository, CommitStore, PagedCommits,
    RepoMetadataRepository, RepoMetadataStore,
};
use repo_sync::sync::{RetryPolicy, SyncContext, SyncSettings};

/// Sets up an in-memory SQLite database with all migrations applied.
pub async fn setup_test_db() -> Result<Arc<DatabaseConnection>> {
    let mut options = ConnectOptions::new("sqlite::memory:");
    options.max_connections(1).sqlx_logging(false);
    let db = Database::connect(options).await?;

    Migrator::up(&db, None).await?;

    Ok(Arc::new(db))
}

/// Provider whose responses are queued up front. An exhausted commit script
/// answers with an empty final page; exhausted metadata answers with
/// zeroed metadata for the requested name.
#[derive(Default)]
pub struct ScriptedProvider {
    metadata: Mutex<VecDeque<Result<RepositoryMetadata, ProviderError>>>,
    pages: Mutex<VecDeque<Result<CommitBatch, ProviderError>>>,
    requests: Mutex<Vec<CommitPageRequest>>,
    metadata_requests: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_metadata(&self, result: Result<RepositoryMetadata, ProviderError>) {
        self.metadata.lock().unwrap().push_back(result);
    }

    pub fn push_page(&self, commits: Vec<NewCommit>, has_more: bool) {
        self.push_batch(CommitBatch {
            commits,
            has_more,
            rate_limit: None,
        });
    }

    pub fn push_batch(&self, batch: CommitBatch) {
        self.pages.lock().unwrap().push_back(Ok(batch));
    }

    pub fn push_error(&self, error: ProviderError) {
        self.pages.lock().unwrap().push_back(Err(error));
    }

    pub fn requests(&self) -> Vec<CommitPageRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn metadata_requests(&self) -> Vec<String> {
        self.metadata_requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteProvider for ScriptedProvider {
    async fn fetch_metadata(
        &self,
        repository_name: &str,
    ) -> Result<RepositoryMetadata, ProviderError> {
        self.metadata_requests
            .lock()
            .unwrap()
            .push(repository_name.to_string());
        let scripted = self.metadata.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| Ok(metadata(repository_name)))
    }

    async fn fetch_commits(&self, request: &CommitPageRequest) -> Result<CommitBatch, ProviderError> {
        self.requests.lock().unwrap().push(request.clone());
        let scripted = self.pages.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| Ok(CommitBatch::default()))
    }
}

/// SQLite commit store that refuses to persist one chosen commit with a
/// non-duplicate database error.
pub struct FailingCommitStore {
    inner: CommitRepository,
    failing_id: String,
}

impl FailingCommitStore {
    pub fn new(db: &Arc<DatabaseConnection>, failing_id: &str) -> Arc<Self> {
        Arc::new(Self {
            inner: CommitRepository::new(db.clone()),
            failing_id: failing_id.to_string(),
        })
    }
}

#[async_trait]
impl CommitStore for FailingCommitStore {
    async fn save(&self, commit: NewCommit) -> Result<(), RepositoryError> {
        if commit.commit_id == self.failing_id {
            return Err(RepositoryError::database_error(sea_orm::DbErr::Custom(
                "disk I/O error".to_string(),
            )));
        }
        self.inner.save(commit).await
    }

    async fn exists_by_id(&self, commit_id: &str) -> Result<bool, RepositoryError> {
        self.inner.exists_by_id(commit_id).await
    }

    async fn list_by_repository(
        &self,
        repository_name: &str,
        query: &CommitPageQuery,
    ) -> Result<PagedCommits, RepositoryError> {
        self.inner.list_by_repository(repository_name, query).await
    }

    async fn top_authors(
        &self,
        repository_name: &str,
        limit: u64,
    ) -> Result<Vec<AuthorCommitCount>, RepositoryError> {
        self.inner.top_authors(repository_name, limit).await
    }
}

/// Metadata with zeroed counters, as returned for a fresh repository.
pub fn metadata(name: &str) -> RepositoryMetadata {
    RepositoryMetadata {
        full_name: name.to_string(),
        description: None,
        url: format!("https://github.com/{name}"),
        language: None,
        forks_count: 0,
        stars_count: 0,
        open_issues_count: 0,
        watchers_count: 0,
    }
}

pub fn commit(sha: &str, author: &str, repository_name: &str, day: u32) -> NewCommit {
    NewCommit {
        commit_id: sha.to_string(),
        message: format!("commit {sha}"),
        author: author.to_string(),
        authored_at: authored(day),
        url: format!("https://github.com/{repository_name}/commit/{sha}"),
        repository_name: repository_name.to_string(),
    }
}

pub fn authored(day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, day, 12, 0, 0).unwrap()
}

/// Settings with millisecond retries and a reconciliation interval long
/// enough that no tick fires during a test.
pub fn test_settings() -> SyncSettings {
    SyncSettings {
        fetch_interval: Duration::from_secs(3600),
        commits_per_page: 50,
        retry: RetryPolicy::new(Duration::from_millis(1), Duration::from_millis(5), 0.0, 3),
        shutdown_grace: Duration::from_secs(2),
        ..SyncSettings::default()
    }
}

pub fn test_context(
    db: &Arc<DatabaseConnection>,
    provider: Arc<ScriptedProvider>,
    settings: SyncSettings,
) -> SyncContext {
    SyncContext::from_database(db.clone(), provider, settings)
}

/// Context whose commit store fails to persist `failing_id`.
pub fn failing_store_context(
    db: &Arc<DatabaseConnection>,
    provider: Arc<ScriptedProvider>,
    failing_id: &str,
) -> SyncContext {
    SyncContext::new(
        provider,
        Arc::new(RepoMetadataRepository::new(db.clone())),
        FailingCommitStore::new(db, failing_id),
        test_settings(),
    )
}

/// Builder for stored repository records.
pub struct RecordBuilder {
    model: repository::Model,
}

impl RecordBuilder {
    pub fn new(name: &str) -> Self {
        let now = Utc::now().fixed_offset();
        Self {
            model: repository::Model {
                id: Uuid::new_v4(),
                name: name.to_string(),
                description: None,
                url: format!("https://github.com/{name}"),
                language: Some("Rust".to_string()),
                forks_count: 0,
                stars_count: 0,
                open_issues_count: 0,
                watchers_count: 0,
                is_fetching: false,
                last_fetched_page: 1,
                last_fetched_commit_id: String::new(),
                sync_status: SyncStatus::Backfilling.to_string(),
                last_error: None,
                backfill_completed_at: None,
                created_at: now,
                updated_at: now,
            },
        }
    }

    pub fn cursor(mut self, page: i32, commit_id: &str) -> Self {
        self.model.last_fetched_page = page;
        self.model.last_fetched_commit_id = commit_id.to_string();
        self
    }

    pub fn fetching(mut self, is_fetching: bool) -> Self {
        self.model.is_fetching = is_fetching;
        self
    }

    /// Marks the initial backfill as finished.
    pub fn synced(mut self) -> Self {
        self.model.sync_status = SyncStatus::Synced.to_string();
        self.model.backfill_completed_at = Some(Utc::now().fixed_offset());
        self
    }

    pub fn status(mut self, status: SyncStatus) -> Self {
        self.model.sync_status = status.to_string();
        self
    }

    pub async fn insert(self, db: &Arc<DatabaseConnection>) -> Result<repository::Model> {
        let store = RepoMetadataRepository::new(db.clone());
        Ok(store.save(self.model).await?)
    }
}

pub async fn reload(db: &Arc<DatabaseConnection>, id: Uuid) -> repository::Model {
    RepoMetadataRepository::new(db.clone())
        .get_by_public_id(id)
        .await
        .unwrap()
        .expect("record exists")
}

/// Polls `check` every 10ms until it holds or two seconds pass.
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
