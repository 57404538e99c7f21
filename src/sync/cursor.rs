//! Persisted fetch position of a repository.

use crate::models::repository;
use crate::repositories::RepositoryChanges;

/// The `(page, last_fetched_commit_id)` pair. An empty commit id means no cursor yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cursor {
    pub page: u32,
    pub commit_id: String,
}

impl Cursor {
    pub fn new(page: u32, commit_id: impl Into<String>) -> Self {
        Self {
            page: page.max(1),
            commit_id: commit_id.into(),
        }
    }

    /// Page 1 with no commit id.
    pub fn reset() -> Self {
        Self::new(1, "")
    }

    pub fn of(record: &repository::Model) -> Self {
        Self::new(
            u32::try_from(record.last_fetched_page).unwrap_or(1),
            record.last_fetched_commit_id.clone(),
        )
    }

    pub fn has_commit(&self) -> bool {
        !self.commit_id.is_empty()
    }

    /// Commit id to hand to the provider, if any.
    pub fn commit_hint(&self) -> Option<String> {
        self.has_commit().then(|| self.commit_id.clone())
    }

    /// First page a resumed backfill requests. A page with a recorded commit
    /// was fully persisted, so fetching continues after it.
    pub fn backfill_resume_page(&self) -> u32 {
        if self.has_commit() {
            self.page.saturating_add(1)
        } else {
            self.page
        }
    }

    pub fn changes(&self) -> RepositoryChanges {
        RepositoryChanges::default().with_cursor(self.page, self.commit_id.clone())
    }
}

impl Default for Cursor {
    fn default() -> Self {
        Self::reset()
    }
}
