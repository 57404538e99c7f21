//! Repository entity model
//!
//! A tracked remote repository: descriptive metadata copied from the provider
//! at registration time, and the persisted synchronization cursor.

use std::fmt;
use std::str::FromStr;

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "repositories")]
pub struct Model {
    /// Public identifier handed out to API callers
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Full name in `owner/repo` form, unique across the store
    #[sea_orm(unique)]
    pub name: String,

    pub description: Option<String>,

    pub url: String,

    pub language: Option<String>,

    pub forks_count: i32,

    pub stars_count: i32,

    pub open_issues_count: i32,

    pub watchers_count: i32,

    /// Set while a fetch pass owns the cursor fields
    pub is_fetching: bool,

    /// Last page whose commits were fully persisted
    pub last_fetched_page: i32,

    /// Commit hash of the last commit seen on `last_fetched_page`; empty when no cursor exists
    pub last_fetched_commit_id: String,

    /// One of `backfilling`, `synced`, `stuck`
    pub sync_status: String,

    /// Most recent failure recorded by a background pass
    pub last_error: Option<String>,

    /// Set once the initial backfill reached its last page
    pub backfill_completed_at: Option<DateTimeWithTimeZone>,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Parsed sync status. Unknown stored values read as `Stuck` so they surface to operators.
    pub fn status(&self) -> SyncStatus {
        self.sync_status.parse().unwrap_or(SyncStatus::Stuck)
    }

    /// Whether the initial historical backfill still has pages left.
    pub fn needs_backfill(&self) -> bool {
        self.backfill_completed_at.is_none()
    }
}

/// Externally visible synchronization state of a repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// Initial historical ingestion is in progress
    Backfilling,
    /// Backfill finished and the last reconciliation pass succeeded
    Synced,
    /// Retries were exhausted; see `last_error`
    Stuck,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Backfilling => "backfilling",
            SyncStatus::Synced => "synced",
            SyncStatus::Stuck => "stuck",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "backfilling" => Ok(SyncStatus::Backfilling),
            "synced" => Ok(SyncStatus::Synced),
            "stuck" => Ok(SyncStatus::Stuck),
            other => Err(format!("unknown sync status '{other}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_status_round_trips_through_text() {
        for status in [SyncStatus::Backfilling, SyncStatus::Synced, SyncStatus::Stuck] {
            assert_eq!(status.as_str().parse::<SyncStatus>(), Ok(status));
        }
        assert!("paused".parse::<SyncStatus>().is_err());
    }
}
