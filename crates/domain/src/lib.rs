//! Domain layer for the sfswitch backend.
//!
//! This crate contains:
//! - Domain models (credentials, jobs, metadata records, deploy jobs)
//! - The error taxonomy shared by the fetch and deploy pipelines
//! - The storage and remote-API seams the pipelines are written against

pub mod error;
pub mod models;
pub mod services;

pub use error::{StoreError, SyncError};
