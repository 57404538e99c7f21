//! Default repository seeding

use crate::config::AppConfig;
use crate::models::repository;
use crate::sync::{RepositorySynchronizer, SyncError};

/// Registers `DEFAULT_REPOSITORY` when configured.
///
/// An already registered repository is left alone. Other failures are logged
/// and never abort startup.
///
/// # Returns
///
/// The newly registered record, or `None` when nothing was registered.
pub async fn seed_default_repository(
    synchronizer: &RepositorySynchronizer,
    config: &AppConfig,
) -> Option<repository::Model> {
    let name = config.default_repository.as_deref()?;

    match synchronizer.register(name).await {
        Ok(record) => {
            log::info!("Registered default repository '{}' ({})", record.name, record.id);
            Some(record)
        }
        Err(SyncError::AlreadyRegistered(_)) => {
            log::info!("Default repository '{}' already registered, skipping", name);
            None
        }
        Err(err) => {
            log::warn!("Failed to register default repository '{}': {}", name, err);
            None
        }
    }
}
