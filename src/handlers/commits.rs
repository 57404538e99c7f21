//! # Commit API Handlers
//!
//! Paged commit listings and author rankings for a tracked repository.

use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use serde::Deserialize;
use utoipa::IntoParams;
use uuid::Uuid;

use crate::error::{ApiError, validation_error};
use crate::handlers::types::CommitsResponse;
use crate::repositories::{
    AuthorCommitCount, CommitPageQuery, CommitSort, DEFAULT_COMMIT_PAGE_LIMIT, MAX_PAGE_LIMIT,
    SortDirection,
};
use crate::server::AppState;

const DEFAULT_TOP_AUTHORS: u64 = 10;

/// Query parameters for listing commits
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListCommitsQuery {
    /// Page number starting at 1
    pub page: Option<u64>,
    /// Page size (default 20, max 100)
    pub limit: Option<u64>,
    /// `date`, `author` or `created_at`
    pub sort: Option<String>,
    /// `asc` or `desc`
    pub direction: Option<String>,
}

impl ListCommitsQuery {
    fn into_page_query(self) -> Result<CommitPageQuery, ApiError> {
        if self.page == Some(0) {
            return Err(validation_error(
                "page must be at least 1",
                serde_json::json!({ "page": "must be >= 1" }),
            ));
        }
        if let Some(limit) = self.limit {
            if limit == 0 || limit > MAX_PAGE_LIMIT {
                return Err(validation_error(
                    "limit out of range",
                    serde_json::json!({ "limit": format!("must be between 1 and {MAX_PAGE_LIMIT}") }),
                ));
            }
        }
        // Row offsets are bound as signed 64-bit integers
        let page = self.page.unwrap_or(1);
        let limit = self.limit.unwrap_or(DEFAULT_COMMIT_PAGE_LIMIT);
        if (page - 1)
            .checked_mul(limit)
            .is_none_or(|offset| offset > i64::MAX as u64)
        {
            return Err(validation_error(
                "page out of range",
                serde_json::json!({ "page": "too large for the requested limit" }),
            ));
        }

        let sort = match self.sort.as_deref() {
            Some(raw) => raw
                .parse::<CommitSort>()
                .map_err(|msg| validation_error(&msg, serde_json::json!({ "sort": raw })))?,
            None => CommitSort::default(),
        };
        let direction = match self.direction.as_deref() {
            Some(raw) => raw
                .parse::<SortDirection>()
                .map_err(|msg| validation_error(&msg, serde_json::json!({ "direction": raw })))?,
            None => SortDirection::default(),
        };

        Ok(CommitPageQuery::new(self.page, self.limit).sorted_by(sort, direction))
    }
}

/// Query parameters for the author ranking
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TopAuthorsQuery {
    /// Maximum number of authors (default 10, max 100)
    pub limit: Option<u64>,
}

/// List stored commits of a repository
#[utoipa::path(
    get,
    path = "/repositories/{id}/commits",
    params(
        ("id" = Uuid, Path, description = "Repository public id"),
        ListCommitsQuery
    ),
    responses(
        (status = 200, description = "One page of commits", body = CommitsResponse),
        (status = 400, description = "Invalid paging or sort parameters", body = ApiError),
        (status = 404, description = "Repository not found", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    tag = "commits"
)]
pub async fn list_commits(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<ListCommitsQuery>,
) -> Result<Json<CommitsResponse>, ApiError> {
    let page_query = query.into_page_query()?;
    let (record, paged) = state.synchronizer.commits(id, &page_query).await?;
    Ok(Json(CommitsResponse::from((record.name, paged))))
}

/// Rank a repository's authors by commit count
#[utoipa::path(
    get,
    path = "/repositories/{id}/top-authors",
    params(
        ("id" = Uuid, Path, description = "Repository public id"),
        TopAuthorsQuery
    ),
    responses(
        (status = 200, description = "Authors ordered by commit count", body = [AuthorCommitCount]),
        (status = 400, description = "Invalid limit", body = ApiError),
        (status = 404, description = "Repository not found", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    tag = "commits"
)]
pub async fn top_authors(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<TopAuthorsQuery>,
) -> Result<Json<Vec<AuthorCommitCount>>, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_TOP_AUTHORS);
    if limit == 0 || limit > MAX_PAGE_LIMIT {
        return Err(validation_error(
            "limit out of range",
            serde_json::json!({ "limit": format!("must be between 1 and {MAX_PAGE_LIMIT}") }),
        ));
    }

    let authors = state.synchronizer.top_authors(id, limit).await?;
    Ok(Json(authors))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sort_and_direction() {
        let query = ListCommitsQuery {
            page: Some(2),
            limit: Some(5),
            sort: Some("author".to_string()),
            direction: Some("ASC".to_string()),
        }
        .into_page_query()
        .unwrap();

        assert_eq!(query.page, 2);
        assert_eq!(query.limit, 5);
        assert_eq!(query.sort, CommitSort::Author);
        assert_eq!(query.direction, SortDirection::Asc);
    }

    #[test]
    fn defaults_when_absent() {
        let query = ListCommitsQuery::default().into_page_query().unwrap();
        assert_eq!(query, CommitPageQuery::default());
    }

    #[test]
    fn rejects_out_of_range_values() {
        let zero_page = ListCommitsQuery {
            page: Some(0),
            ..ListCommitsQuery::default()
        };
        assert_eq!(zero_page.into_page_query().unwrap_err().code.as_ref(), "VALIDATION_FAILED");

        let huge_limit = ListCommitsQuery {
            limit: Some(500),
            ..ListCommitsQuery::default()
        };
        assert!(huge_limit.into_page_query().is_err());

        let overflowing_page = ListCommitsQuery {
            page: Some(u64::MAX),
            limit: Some(MAX_PAGE_LIMIT),
            ..ListCommitsQuery::default()
        };
        assert_eq!(
            overflowing_page.into_page_query().unwrap_err().code.as_ref(),
            "VALIDATION_FAILED"
        );

        let beyond_signed_offset = ListCommitsQuery {
            page: Some(i64::MAX as u64 / 2 + 2),
            limit: Some(2),
            ..ListCommitsQuery::default()
        };
        assert!(beyond_signed_offset.into_page_query().is_err());

        let last_addressable = ListCommitsQuery {
            page: Some(i64::MAX as u64 / 2 + 1),
            limit: Some(2),
            ..ListCommitsQuery::default()
        };
        assert!(last_addressable.into_page_query().is_ok());

        let bad_sort = ListCommitsQuery {
            sort: Some("stars".to_string()),
            ..ListCommitsQuery::default()
        };
        assert!(bad_sort.into_page_query().is_err());
    }
}
