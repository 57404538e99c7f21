//! Owner of every background synchronization task.

use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Spawns at most one task per repository id and joins them all on shutdown.
pub struct SyncSupervisor {
    tasks: AsyncMutex<JoinSet<()>>,
    active: Arc<Mutex<HashSet<Uuid>>>,
    shutdown: CancellationToken,
}

impl SyncSupervisor {
    pub fn new(shutdown: CancellationToken) -> Self {
        Self {
            tasks: AsyncMutex::new(JoinSet::new()),
            active: Arc::new(Mutex::new(HashSet::new())),
            shutdown,
        }
    }

    /// Token every supervised task must observe.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Spawns `task` for `repository_id`.
    ///
    /// Returns false without spawning when a task for the id is still live or
    /// shutdown has begun.
    pub async fn spawn<F>(&self, repository_id: Uuid, task: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.shutdown.is_cancelled() {
            return false;
        }
        if !self.lock_active().insert(repository_id) {
            debug!(%repository_id, "Task already running for repository");
            return false;
        }

        let active = Arc::clone(&self.active);
        let mut tasks = self.tasks.lock().await;
        while let Some(finished) = tasks.try_join_next() {
            log_join_result(finished);
        }
        tasks.spawn(async move {
            let _release = scopeguard::guard(active, move |active| {
                active
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .remove(&repository_id);
            });
            task.await;
        });
        true
    }

    pub fn is_tracking(&self, repository_id: Uuid) -> bool {
        self.lock_active().contains(&repository_id)
    }

    pub fn active_count(&self) -> usize {
        self.lock_active().len()
    }

    /// Cancels every task and waits up to `grace` for them to finish before aborting the rest.
    pub async fn shutdown(&self, grace: Duration) {
        self.shutdown.cancel();

        let mut tasks = self.tasks.lock().await;
        info!(tasks = tasks.len(), "Stopping synchronization tasks");

        let drained = tokio::time::timeout(grace, async {
            while let Some(finished) = tasks.join_next().await {
                log_join_result(finished);
            }
        })
        .await;

        if drained.is_err() {
            warn!(
                remaining = tasks.len(),
                grace_secs = grace.as_secs(),
                "Grace period elapsed, aborting remaining tasks"
            );
            tasks.abort_all();
            while tasks.join_next().await.is_some() {}
        }
    }

    fn lock_active(&self) -> std::sync::MutexGuard<'_, HashSet<Uuid>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn log_join_result(result: Result<(), tokio::task::JoinError>) {
    if let Err(err) = result {
        if err.is_panic() {
            error!(error = %err, "Synchronization task panicked");
        }
    }
}
