//! Persistence layer for the sfswitch backend.
//!
//! This crate contains:
//! - Database connection management and migrations
//! - Entity definitions (database row mappings)
//! - Repository implementations
//! - `JobStore` implementations backed by PostgreSQL and by memory

pub mod db;
pub mod entities;
pub mod metrics;
pub mod repositories;
pub mod store;

pub use store::{InMemoryJobStore, PgJobStore};
