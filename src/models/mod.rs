//! # Data Models
//!
//! SeaORM entities for tracked repositories and their stored commits, plus
//! small response types shared by the HTTP layer.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod commit;
pub mod repository;

pub use commit::Entity as Commit;
pub use repository::Entity as Repository;

/// Basic service information response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ServiceInfo {
    /// The name of the service
    pub service: String,
    /// The version of the service
    pub version: String,
}

impl Default for ServiceInfo {
    fn default() -> Self {
        Self {
            service: "repo-sync".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
