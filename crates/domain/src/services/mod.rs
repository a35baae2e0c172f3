//! Seams the fetch and deploy pipelines are written against.
//!
//! Implementations live outside this crate: storage in `persistence`, the
//! Salesforce client in the api crate.

pub mod metadata_api;
pub mod store;

pub use metadata_api::MetadataApi;
pub use store::JobStore;
