//! # Repository Sync Library
//!
//! Tracks remote source repositories and keeps a local store of their commit
//! history synchronized: registration with a paginated backfill, periodic
//! cursor-based reconciliation, rate-limit aware retries, and an HTTP API
//! over the stored history.

pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod models;
pub mod provider;
pub mod repositories;
pub mod seeds;
pub mod server;
pub mod sync;
pub mod telemetry;
pub use migration;
