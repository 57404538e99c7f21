//! SeaORM-backed [`CommitStore`].

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, FromQueryResult, Order, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect,
};
use std::sync::Arc;

use super::{AuthorCommitCount, CommitPageQuery, CommitSort, CommitStore, PagedCommits, SortDirection};
use crate::error::RepositoryError;
use crate::models::commit::{self, Entity as Commit, NewCommit};

/// Commit history stored through SeaORM
#[derive(Debug, Clone)]
pub struct CommitRepository {
    /// Database connection pool
    pub db: Arc<DatabaseConnection>,
}

impl CommitRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[derive(Debug, FromQueryResult)]
struct AuthorCountRow {
    author: String,
    commit_count: i64,
}

#[async_trait]
impl CommitStore for CommitRepository {
    async fn save(&self, commit: NewCommit) -> Result<(), RepositoryError> {
        let commit_id = commit.commit_id.clone();

        let inserted = Commit::insert(commit.into_active_model(Utc::now()))
            .on_conflict(
                OnConflict::column(commit::Column::CommitId)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(&*self.db)
            .await
            .map_err(RepositoryError::database_error)?;

        if inserted == 0 {
            return Err(RepositoryError::Duplicate(commit_id));
        }
        Ok(())
    }

    async fn exists_by_id(&self, commit_id: &str) -> Result<bool, RepositoryError> {
        let count = Commit::find_by_id(commit_id.to_string())
            .count(&*self.db)
            .await
            .map_err(RepositoryError::database_error)?;
        Ok(count > 0)
    }

    async fn list_by_repository(
        &self,
        repository_name: &str,
        query: &CommitPageQuery,
    ) -> Result<PagedCommits, RepositoryError> {
        let column = match query.sort {
            CommitSort::Date => commit::Column::AuthoredAt,
            CommitSort::Author => commit::Column::Author,
            CommitSort::CreatedAt => commit::Column::CreatedAt,
        };
        let order = match query.direction {
            SortDirection::Asc => Order::Asc,
            SortDirection::Desc => Order::Desc,
        };

        let paginator = Commit::find()
            .filter(commit::Column::RepositoryName.eq(repository_name))
            .order_by(column, order)
            // Tie-breaker keeps pages stable when sort keys collide
            .order_by_asc(commit::Column::CommitId)
            .paginate(&*self.db, query.limit);

        let total_count = paginator
            .num_items()
            .await
            .map_err(RepositoryError::database_error)?;
        let items = paginator
            .fetch_page(query.page - 1)
            .await
            .map_err(RepositoryError::database_error)?;

        Ok(PagedCommits {
            items,
            total_count,
            page: query.page,
            limit: query.limit,
            has_next_page: query.page.saturating_mul(query.limit) < total_count,
        })
    }

    async fn top_authors(
        &self,
        repository_name: &str,
        limit: u64,
    ) -> Result<Vec<AuthorCommitCount>, RepositoryError> {
        let rows = Commit::find()
            .select_only()
            .column(commit::Column::Author)
            .column_as(commit::Column::CommitId.count(), "commit_count")
            .filter(commit::Column::RepositoryName.eq(repository_name))
            .group_by(commit::Column::Author)
            .order_by(commit::Column::CommitId.count(), Order::Desc)
            .order_by_asc(commit::Column::Author)
            .limit(limit)
            .into_model::<AuthorCountRow>()
            .all(&*self.db)
            .await
            .map_err(RepositoryError::database_error)?;

        Ok(rows
            .into_iter()
            .map(|row| AuthorCommitCount {
                author: row.author,
                commit_count: u64::try_from(row.commit_count).unwrap_or_default(),
            })
            .collect())
    }
}
