//! SeaORM-backed [`RepoMetadataStore`].

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use std::sync::Arc;
use uuid::Uuid;

use super::{RepoMetadataStore, RepositoryChanges};
use crate::error::RepositoryError;
use crate::models::repository::{self, Entity as Repository};

/// Repository records stored through SeaORM
#[derive(Debug, Clone)]
pub struct RepoMetadataRepository {
    /// Database connection pool
    pub db: Arc<DatabaseConnection>,
}

impl RepoMetadataRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl RepoMetadataStore for RepoMetadataRepository {
    async fn save(&self, record: repository::Model) -> Result<repository::Model, RepositoryError> {
        let active = repository::ActiveModel {
            id: Set(record.id),
            name: Set(record.name),
            description: Set(record.description),
            url: Set(record.url),
            language: Set(record.language),
            forks_count: Set(record.forks_count),
            stars_count: Set(record.stars_count),
            open_issues_count: Set(record.open_issues_count),
            watchers_count: Set(record.watchers_count),
            is_fetching: Set(record.is_fetching),
            last_fetched_page: Set(record.last_fetched_page),
            last_fetched_commit_id: Set(record.last_fetched_commit_id),
            sync_status: Set(record.sync_status),
            last_error: Set(record.last_error),
            backfill_completed_at: Set(record.backfill_completed_at),
            created_at: Set(record.created_at),
            updated_at: Set(record.updated_at),
        };

        active
            .insert(&*self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    async fn update_by_public_id(
        &self,
        id: Uuid,
        changes: RepositoryChanges,
    ) -> Result<repository::Model, RepositoryError> {
        let mut update = Repository::update_many()
            .col_expr(
                repository::Column::UpdatedAt,
                Expr::value(Utc::now().fixed_offset()),
            )
            .filter(repository::Column::Id.eq(id));

        if let Some(is_fetching) = changes.is_fetching {
            update = update.col_expr(repository::Column::IsFetching, Expr::value(is_fetching));
        }
        if let Some(page) = changes.last_fetched_page {
            update = update.col_expr(repository::Column::LastFetchedPage, Expr::value(page));
        }
        if let Some(commit_id) = changes.last_fetched_commit_id {
            update = update.col_expr(
                repository::Column::LastFetchedCommitId,
                Expr::value(commit_id),
            );
        }
        if let Some(status) = changes.sync_status {
            update = update.col_expr(repository::Column::SyncStatus, Expr::value(status.as_str()));
        }
        if let Some(last_error) = changes.last_error {
            update = update.col_expr(repository::Column::LastError, Expr::value(last_error));
        }
        if let Some(completed_at) = changes.backfill_completed_at {
            update = update.col_expr(
                repository::Column::BackfillCompletedAt,
                Expr::value(Some(completed_at.fixed_offset())),
            );
        }

        let result = update
            .exec(&*self.db)
            .await
            .map_err(RepositoryError::database_error)?;

        if result.rows_affected == 0 {
            return Err(RepositoryError::NotFound(format!("repository {id}")));
        }

        self.get_by_public_id(id)
            .await?
            .ok_or_else(|| RepositoryError::NotFound(format!("repository {id}")))
    }

    async fn get_by_public_id(&self, id: Uuid) -> Result<Option<repository::Model>, RepositoryError> {
        Repository::find_by_id(id)
            .one(&*self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    async fn get_by_name(&self, name: &str) -> Result<Option<repository::Model>, RepositoryError> {
        Repository::find()
            .filter(repository::Column::Name.eq(name))
            .one(&*self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    async fn list_all(&self) -> Result<Vec<repository::Model>, RepositoryError> {
        Repository::find()
            .order_by_asc(repository::Column::CreatedAt)
            .order_by_asc(repository::Column::Name)
            .all(&*self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    async fn set_fetching_flag_for_all(&self, is_fetching: bool) -> Result<u64, RepositoryError> {
        let result = Repository::update_many()
            .col_expr(repository::Column::IsFetching, Expr::value(is_fetching))
            .col_expr(
                repository::Column::UpdatedAt,
                Expr::value(Utc::now().fixed_offset()),
            )
            .filter(repository::Column::IsFetching.ne(is_fetching))
            .exec(&*self.db)
            .await
            .map_err(RepositoryError::database_error)?;

        Ok(result.rows_affected)
    }

    async fn try_claim(&self, id: Uuid) -> Result<bool, RepositoryError> {
        let result = Repository::update_many()
            .col_expr(repository::Column::IsFetching, Expr::value(true))
            .filter(repository::Column::Id.eq(id))
            .filter(repository::Column::IsFetching.eq(false))
            .exec(&*self.db)
            .await
            .map_err(RepositoryError::database_error)?;

        Ok(result.rows_affected == 1)
    }
}
