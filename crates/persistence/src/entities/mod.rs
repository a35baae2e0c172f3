//! Database entity definitions.
//!
//! Entities are direct mappings to database rows.

pub mod deploy_job;
pub mod job;
pub mod metadata;

pub use deploy_job::{DeployJobComponentEntity, DeployJobEntity};
pub use job::JobEntity;
pub use metadata::{ApexTriggerEntity, ValidationRuleEntity, WorkflowRuleEntity};
