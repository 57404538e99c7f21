//! # Remote Provider
//!
//! The capability the synchronization engine consumes to read repository
//! metadata and paged commit history from the hosting service.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::commit::NewCommit;

pub mod github;

pub use github::GitHubClient;

/// Rate-limit telemetry attached to a provider response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RateLimitSnapshot {
    pub limit: Option<u32>,
    pub remaining: Option<u32>,
    /// Unix epoch seconds at which the budget refills
    pub reset_epoch: Option<i64>,
}

impl RateLimitSnapshot {
    pub fn is_empty(&self) -> bool {
        self.limit.is_none() && self.remaining.is_none() && self.reset_epoch.is_none()
    }
}

/// Descriptive repository fields copied into the store at registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryMetadata {
    pub full_name: String,
    pub description: Option<String>,
    pub url: String,
    pub language: Option<String>,
    pub forks_count: i32,
    pub stars_count: i32,
    pub open_issues_count: i32,
    pub watchers_count: i32,
}

/// One page request. A non-empty `cursor_commit_id` takes precedence over the date range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitPageRequest {
    pub repository_name: String,
    pub since: DateTime<Utc>,
    pub until: DateTime<Utc>,
    pub cursor_commit_id: Option<String>,
    pub page: u32,
    pub per_page: u32,
}

/// Commits of one page in provider order, plus pagination and rate-limit facts.
#[derive(Debug, Clone, Default)]
pub struct CommitBatch {
    pub commits: Vec<NewCommit>,
    pub has_more: bool,
    pub rate_limit: Option<RateLimitSnapshot>,
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("repository not found: {0}")]
    NotFound(String),

    #[error("provider refused the request with status {status}")]
    Forbidden {
        status: u16,
        retry_after: Option<u64>,
        rate_limit: Option<RateLimitSnapshot>,
    },

    #[error("provider returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("transport error: {0}")]
    Transport(String),
}

impl ProviderError {
    pub fn rate_limit(&self) -> Option<&RateLimitSnapshot> {
        match self {
            ProviderError::Forbidden { rate_limit, .. } => rate_limit.as_ref(),
            _ => None,
        }
    }

    pub fn retry_after(&self) -> Option<u64> {
        match self {
            ProviderError::Forbidden { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    pub fn is_forbidden(&self) -> bool {
        matches!(self, ProviderError::Forbidden { .. })
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        ProviderError::Transport(err.to_string())
    }
}

impl From<url::ParseError> for ProviderError {
    fn from(err: url::ParseError) -> Self {
        ProviderError::Transport(format!("invalid request url: {err}"))
    }
}

#[async_trait]
pub trait RemoteProvider: Send + Sync {
    async fn fetch_metadata(&self, repository_name: &str)
    -> Result<RepositoryMetadata, ProviderError>;

    async fn fetch_commits(&self, request: &CommitPageRequest) -> Result<CommitBatch, ProviderError>;
}
