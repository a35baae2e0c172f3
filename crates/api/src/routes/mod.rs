//! HTTP route handlers.

pub mod deploy_jobs;
pub mod health;
pub mod jobs;
