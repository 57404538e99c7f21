//! Database seeding functionality
//!
//! Registers the configured default repository when the service starts.

pub mod repository;

pub use repository::seed_default_repository;
