//! Commit entity model
//!
//! Commits are keyed by the provider-assigned hash. A stored commit is never
//! updated; inserting the same hash again is rejected by the primary key.

use chrono::{DateTime, Utc};
use sea_orm::ActiveModelBehavior;
use sea_orm::Set;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "commits")]
pub struct Model {
    /// Provider-assigned commit hash
    #[sea_orm(primary_key, auto_increment = false)]
    pub commit_id: String,

    pub message: String,

    /// Author display name
    pub author: String,

    /// Author date reported by the provider
    pub authored_at: DateTimeWithTimeZone,

    pub url: String,

    /// Owning repository, referenced by full name
    pub repository_name: String,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

/// Commit fields as delivered by a remote provider, ready to be stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCommit {
    pub commit_id: String,
    pub message: String,
    pub author: String,
    pub authored_at: DateTime<Utc>,
    pub url: String,
    pub repository_name: String,
}

impl NewCommit {
    pub fn into_active_model(self, now: DateTime<Utc>) -> ActiveModel {
        ActiveModel {
            commit_id: Set(self.commit_id),
            message: Set(self.message),
            author: Set(self.author),
            authored_at: Set(self.authored_at.fixed_offset()),
            url: Set(self.url),
            repository_name: Set(self.repository_name),
            created_at: Set(now.fixed_offset()),
            updated_at: Set(now.fixed_offset()),
        }
    }
}
