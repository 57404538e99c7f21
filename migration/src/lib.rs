//! Database migrations for the repository synchronization service.

pub use sea_orm_migration::prelude::*;

mod m2026_10_12_090000_create_repositories;
mod m2026_10_12_090100_create_commits;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m2026_10_12_090000_create_repositories::Migration),
            Box::new(m2026_10_12_090100_create_commits::Migration),
        ]
    }
}
