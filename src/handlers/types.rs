//! # Common API Types
//!
//! Response views shared by the repository and commit handlers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::{commit, repository, repository::SyncStatus};
use crate::repositories::PagedCommits;

/// Tracked repository with its synchronization state
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RepositoryResponse {
    #[schema(example = "550e8400-e29b-41d4-a716-446655440000")]
    pub id: Uuid,
    #[schema(example = "octo/hello")]
    pub name: String,
    pub description: Option<String>,
    #[schema(example = "https://github.com/octo/hello")]
    pub url: String,
    pub language: Option<String>,
    pub forks_count: i32,
    pub stars_count: i32,
    pub open_issues_count: i32,
    pub watchers_count: i32,
    /// True while a backfill or reconciliation pass owns the cursor
    pub is_fetching: bool,
    pub last_fetched_page: i32,
    /// Empty until the first page has been persisted
    pub last_fetched_commit_id: String,
    pub sync_status: SyncStatus,
    pub last_error: Option<String>,
    pub backfill_completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<repository::Model> for RepositoryResponse {
    fn from(model: repository::Model) -> Self {
        let sync_status = model.status();
        Self {
            id: model.id,
            name: model.name,
            description: model.description,
            url: model.url,
            language: model.language,
            forks_count: model.forks_count,
            stars_count: model.stars_count,
            open_issues_count: model.open_issues_count,
            watchers_count: model.watchers_count,
            is_fetching: model.is_fetching,
            last_fetched_page: model.last_fetched_page,
            last_fetched_commit_id: model.last_fetched_commit_id,
            sync_status,
            last_error: model.last_error,
            backfill_completed_at: model.backfill_completed_at.map(|at| at.with_timezone(&Utc)),
            created_at: model.created_at.with_timezone(&Utc),
            updated_at: model.updated_at.with_timezone(&Utc),
        }
    }
}

/// Stored commit
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CommitResponse {
    #[schema(example = "6dcb09b5b57875f334f61aebed695e2e4193db5e")]
    pub commit_id: String,
    pub message: String,
    pub author: String,
    pub authored_at: DateTime<Utc>,
    pub url: String,
    pub repository_name: String,
}

impl From<commit::Model> for CommitResponse {
    fn from(model: commit::Model) -> Self {
        Self {
            commit_id: model.commit_id,
            message: model.message,
            author: model.author,
            authored_at: model.authored_at.with_timezone(&Utc),
            url: model.url,
            repository_name: model.repository_name,
        }
    }
}

/// Paging facts for an offset-paged list
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PageInfo {
    pub total_count: u64,
    pub page: u64,
    pub limit: u64,
    /// Items on this page
    pub count: usize,
    pub has_next_page: bool,
}

/// One page of a repository's commits
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CommitsResponse {
    pub repository: String,
    pub commits: Vec<CommitResponse>,
    pub page_info: PageInfo,
}

impl From<(String, PagedCommits)> for CommitsResponse {
    fn from((repository, paged): (String, PagedCommits)) -> Self {
        let page_info = PageInfo {
            total_count: paged.total_count,
            page: paged.page,
            limit: paged.limit,
            count: paged.items.len(),
            has_next_page: paged.has_next_page,
        };
        Self {
            repository,
            commits: paged.items.into_iter().map(CommitResponse::from).collect(),
            page_info,
        }
    }
}
