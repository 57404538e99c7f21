//! GitHub REST API client implementing [`RemoteProvider`].

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::header::HeaderMap;
use reqwest::{Response, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use super::{
    CommitBatch, CommitPageRequest, ProviderError, RateLimitSnapshot, RemoteProvider,
    RepositoryMetadata,
};
use crate::config::AppConfig;
use crate::models::commit::NewCommit;

const USER_AGENT: &str = concat!("repo-sync/", env!("CARGO_PKG_VERSION"));
const ACCEPT: &str = "application/vnd.github.v3+json";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const BODY_SNIPPET_CHARS: usize = 200;

/// GitHub API client
#[derive(Debug, Clone)]
pub struct GitHubClient {
    http: reqwest::Client,
    api_base: String,
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GitHubRepository {
    full_name: String,
    description: Option<String>,
    html_url: String,
    language: Option<String>,
    #[serde(default)]
    forks_count: i64,
    #[serde(default)]
    stargazers_count: i64,
    #[serde(default)]
    open_issues_count: i64,
    #[serde(default)]
    watchers_count: i64,
}

#[derive(Debug, Deserialize)]
struct GitHubCommit {
    sha: String,
    html_url: String,
    commit: GitHubCommitDetail,
}

#[derive(Debug, Deserialize)]
struct GitHubCommitDetail {
    #[serde(default)]
    message: String,
    author: Option<GitHubSignature>,
    committer: Option<GitHubSignature>,
}

#[derive(Debug, Deserialize)]
struct GitHubSignature {
    name: Option<String>,
    date: Option<DateTime<Utc>>,
}

impl GitHubClient {
    pub fn new(api_base: &str, token: Option<String>) -> Result<Self, ProviderError> {
        Url::parse(api_base)?;

        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            token,
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, ProviderError> {
        Self::new(&config.github_api_base, config.github_token.clone())
    }

    fn repo_url(&self, repository_name: &str, suffix: &str) -> Result<Url, ProviderError> {
        Ok(Url::parse(&format!(
            "{}/repos/{}{}",
            self.api_base, repository_name, suffix
        ))?)
    }

    async fn get(&self, url: Url) -> Result<Response, ProviderError> {
        let mut request = self.http.get(url).header("Accept", ACCEPT);
        if let Some(token) = &self.token {
            request = request.header("Authorization", format!("Bearer {}", token));
        }
        Ok(request.send().await?)
    }

    /// Maps a non-success response onto the provider error taxonomy.
    async fn error_for(response: Response, repository_name: &str) -> ProviderError {
        let status = response.status();
        let rate_limit = extract_rate_limit(response.headers());

        match status {
            StatusCode::NOT_FOUND => ProviderError::NotFound(repository_name.to_string()),
            StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS => {
                let retry_after = response
                    .headers()
                    .get("Retry-After")
                    .and_then(|h| h.to_str().ok())
                    .and_then(|s| s.trim().parse::<u64>().ok());
                warn!(
                    repository = %repository_name,
                    status = status.as_u16(),
                    remaining = ?rate_limit.and_then(|r| r.remaining),
                    "GitHub refused the request"
                );
                ProviderError::Forbidden {
                    status: status.as_u16(),
                    retry_after,
                    rate_limit,
                }
            }
            _ => {
                let body = response.text().await.unwrap_or_default();
                ProviderError::Status {
                    status: status.as_u16(),
                    body: truncate(&body, BODY_SNIPPET_CHARS),
                }
            }
        }
    }
}

#[async_trait]
impl RemoteProvider for GitHubClient {
    async fn fetch_metadata(
        &self,
        repository_name: &str,
    ) -> Result<RepositoryMetadata, ProviderError> {
        let response = self.get(self.repo_url(repository_name, "")?).await?;
        if !response.status().is_success() {
            return Err(Self::error_for(response, repository_name).await);
        }

        let repo: GitHubRepository = response.json().await?;
        Ok(RepositoryMetadata {
            full_name: repo.full_name,
            description: repo.description,
            url: repo.html_url,
            language: repo.language,
            forks_count: saturate(repo.forks_count),
            stars_count: saturate(repo.stargazers_count),
            open_issues_count: saturate(repo.open_issues_count),
            watchers_count: saturate(repo.watchers_count),
        })
    }

    async fn fetch_commits(&self, request: &CommitPageRequest) -> Result<CommitBatch, ProviderError> {
        let mut url = self.repo_url(&request.repository_name, "/commits")?;
        {
            let mut query = url.query_pairs_mut();
            match request.cursor_commit_id.as_deref().filter(|c| !c.is_empty()) {
                Some(sha) => {
                    query.append_pair("sha", sha);
                }
                None => {
                    query
                        .append_pair(
                            "since",
                            &request.since.to_rfc3339_opts(SecondsFormat::Secs, true),
                        )
                        .append_pair(
                            "until",
                            &request.until.to_rfc3339_opts(SecondsFormat::Secs, true),
                        );
                }
            }
            query
                .append_pair("per_page", &request.per_page.to_string())
                .append_pair("page", &request.page.to_string());
        }

        let response = self.get(url).await?;
        if !response.status().is_success() {
            return Err(Self::error_for(response, &request.repository_name).await);
        }

        let rate_limit = extract_rate_limit(response.headers());
        let has_more = response
            .headers()
            .get("Link")
            .and_then(|h| h.to_str().ok())
            .and_then(parse_next_link)
            .is_some();

        let items: Vec<GitHubCommit> = response.json().await?;
        let mut commits = Vec::with_capacity(items.len());
        for item in items {
            let author = item.commit.author.as_ref();
            let committer = item.commit.committer.as_ref();
            let Some(authored_at) = author
                .and_then(|a| a.date)
                .or_else(|| committer.and_then(|c| c.date))
            else {
                warn!(sha = %item.sha, "commit without author or committer date, skipping");
                continue;
            };

            commits.push(NewCommit {
                commit_id: item.sha,
                message: item.commit.message,
                author: author
                    .and_then(|a| a.name.clone())
                    .unwrap_or_default(),
                authored_at,
                url: item.html_url,
                repository_name: request.repository_name.clone(),
            });
        }

        debug!(
            repository = %request.repository_name,
            page = request.page,
            count = commits.len(),
            has_more,
            "fetched commit page"
        );

        Ok(CommitBatch {
            commits,
            has_more,
            rate_limit,
        })
    }
}

/// Returns the `rel="next"` target of a GitHub `Link` header.
fn parse_next_link(link_header: &str) -> Option<String> {
    // Format: <https://api.github.com/resource?page=2>; rel="next", <...>; rel="last"
    link_header.split(',').find_map(|link| {
        let mut parts = link.split(';');
        let target = parts.next()?.trim();
        let is_next = parts.any(|param| param.trim() == "rel=\"next\"");
        if !is_next {
            return None;
        }
        let (_, rest) = target.split_once('<')?;
        let (url, _) = rest.split_once('>')?;
        Some(url.to_string())
    })
}

/// Reads the `X-RateLimit-*` headers; `None` when the response carries none of them.
fn extract_rate_limit(headers: &HeaderMap) -> Option<RateLimitSnapshot> {
    fn header<T: std::str::FromStr>(headers: &HeaderMap, name: &str) -> Option<T> {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok())
    }

    let snapshot = RateLimitSnapshot {
        limit: header(headers, "X-RateLimit-Limit"),
        remaining: header(headers, "X-RateLimit-Remaining"),
        reset_epoch: header(headers, "X-RateLimit-Reset"),
    };

    (!snapshot.is_empty()).then_some(snapshot)
}

fn saturate(value: i64) -> i32 {
    i32::try_from(value.max(0)).unwrap_or(i32::MAX)
}

fn truncate(body: &str, max_chars: usize) -> String {
    if body.chars().count() > max_chars {
        let truncated: String = body.chars().take(max_chars).collect();
        format!("{}...", truncated)
    } else {
        body.to_string()
    }
}
