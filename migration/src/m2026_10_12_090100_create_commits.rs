//! Creates the commits table. The provider-assigned commit hash is the
//! primary key, which makes repeated inserts of the same commit collide.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Commits::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Commits::CommitId)
                            .string_len(100)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Commits::Message).text().not_null())
                    .col(ColumnDef::new(Commits::Author).text().not_null())
                    .col(
                        ColumnDef::new(Commits::AuthoredAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Commits::Url).text().not_null())
                    .col(ColumnDef::new(Commits::RepositoryName).text().not_null())
                    .col(
                        ColumnDef::new(Commits::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Commits::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // Listing and author aggregation both filter by repository name
        manager
            .create_index(
                Index::create()
                    .name("idx_commits_repository_name")
                    .table(Commits::Table)
                    .col(Commits::RepositoryName)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_commits_repository_name")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(Commits::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Commits {
    Table,
    CommitId,
    Message,
    Author,
    AuthoredAt,
    Url,
    RepositoryName,
    CreatedAt,
    UpdatedAt,
}
