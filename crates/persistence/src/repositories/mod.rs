//! Repository implementations for database operations.

pub mod deploy_job;
pub mod job;
pub mod metadata;

pub use deploy_job::DeployJobRepository;
pub use job::JobRepository;
pub use metadata::MetadataRepository;
