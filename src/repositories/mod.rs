//! # Stores
//!
//! The persistence seams the synchronization engine consumes, and their
//! SeaORM-backed implementations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::RepositoryError;
use crate::models::commit::{self, NewCommit};
use crate::models::repository::{self, SyncStatus};

pub mod commit_store;
pub mod repo_metadata;

pub use commit_store::CommitRepository;
pub use repo_metadata::RepoMetadataRepository;

pub const DEFAULT_COMMIT_PAGE_LIMIT: u64 = 20;
pub const MAX_PAGE_LIMIT: u64 = 100;

/// Persistence of tracked repositories and their sync cursor.
#[async_trait]
pub trait RepoMetadataStore: Send + Sync {
    /// Inserts a new record. A second record with the same name fails with `Duplicate`.
    async fn save(&self, record: repository::Model) -> Result<repository::Model, RepositoryError>;

    /// Applies the set fields of `changes` and returns the updated record.
    async fn update_by_public_id(
        &self,
        id: Uuid,
        changes: RepositoryChanges,
    ) -> Result<repository::Model, RepositoryError>;

    async fn get_by_public_id(&self, id: Uuid) -> Result<Option<repository::Model>, RepositoryError>;

    async fn get_by_name(&self, name: &str) -> Result<Option<repository::Model>, RepositoryError>;

    async fn list_all(&self) -> Result<Vec<repository::Model>, RepositoryError>;

    /// Sets `is_fetching` on every record, returning how many rows changed.
    async fn set_fetching_flag_for_all(&self, is_fetching: bool) -> Result<u64, RepositoryError>;

    /// Flips `is_fetching` from false to true in a single conditional update.
    /// Returns false when another pass already holds the record.
    async fn try_claim(&self, id: Uuid) -> Result<bool, RepositoryError>;
}

/// Persistence and retrieval of commits.
#[async_trait]
pub trait CommitStore: Send + Sync {
    /// Stores a commit. Fails with `Duplicate` when the hash is already present.
    async fn save(&self, commit: NewCommit) -> Result<(), RepositoryError>;

    async fn exists_by_id(&self, commit_id: &str) -> Result<bool, RepositoryError>;

    async fn list_by_repository(
        &self,
        repository_name: &str,
        query: &CommitPageQuery,
    ) -> Result<PagedCommits, RepositoryError>;

    /// Authors ranked by commit count, ties ordered by author name.
    async fn top_authors(
        &self,
        repository_name: &str,
        limit: u64,
    ) -> Result<Vec<AuthorCommitCount>, RepositoryError>;
}

/// Partial update of a repository record. Unset fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepositoryChanges {
    pub is_fetching: Option<bool>,
    pub last_fetched_page: Option<i32>,
    pub last_fetched_commit_id: Option<String>,
    pub sync_status: Option<SyncStatus>,
    pub last_error: Option<Option<String>>,
    pub backfill_completed_at: Option<DateTime<Utc>>,
}

impl RepositoryChanges {
    pub fn with_cursor(mut self, page: u32, commit_id: impl Into<String>) -> Self {
        self.last_fetched_page = Some(i32::try_from(page).unwrap_or(i32::MAX));
        self.last_fetched_commit_id = Some(commit_id.into());
        self
    }

    pub fn with_fetching(mut self, is_fetching: bool) -> Self {
        self.is_fetching = Some(is_fetching);
        self
    }

    pub fn with_status(mut self, status: SyncStatus) -> Self {
        self.sync_status = Some(status);
        self
    }

    pub fn with_error(mut self, error: Option<String>) -> Self {
        self.last_error = Some(error);
        self
    }

    pub fn with_backfill_completed(mut self, at: DateTime<Utc>) -> Self {
        self.backfill_completed_at = Some(at);
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Sortable commit columns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CommitSort {
    /// Author date
    #[default]
    Date,
    Author,
    CreatedAt,
}

impl FromStr for CommitSort {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "date" => Ok(CommitSort::Date),
            "author" => Ok(CommitSort::Author),
            "created_at" => Ok(CommitSort::CreatedAt),
            other => Err(format!(
                "unsupported sort '{other}', expected date, author or created_at"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl FromStr for SortDirection {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "asc" => Ok(SortDirection::Asc),
            "desc" => Ok(SortDirection::Desc),
            other => Err(format!("unsupported direction '{other}', expected asc or desc")),
        }
    }
}

/// Normalized paging request: `page` starts at 1, `limit` is within 1..=100.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitPageQuery {
    pub page: u64,
    pub limit: u64,
    pub sort: CommitSort,
    pub direction: SortDirection,
}

impl CommitPageQuery {
    pub fn new(page: Option<u64>, limit: Option<u64>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            limit: limit
                .unwrap_or(DEFAULT_COMMIT_PAGE_LIMIT)
                .clamp(1, MAX_PAGE_LIMIT),
            sort: CommitSort::default(),
            direction: SortDirection::default(),
        }
    }

    pub fn sorted_by(mut self, sort: CommitSort, direction: SortDirection) -> Self {
        self.sort = sort;
        self.direction = direction;
        self
    }
}

impl Default for CommitPageQuery {
    fn default() -> Self {
        Self::new(None, None)
    }
}

/// One page of stored commits plus the paging facts callers need.
#[derive(Debug, Clone)]
pub struct PagedCommits {
    pub items: Vec<commit::Model>,
    pub total_count: u64,
    pub page: u64,
    pub limit: u64,
    pub has_next_page: bool,
}

/// Commit count for one author of a repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AuthorCommitCount {
    pub author: String,
    pub commit_count: u64,
}
