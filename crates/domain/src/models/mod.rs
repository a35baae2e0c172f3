//! Domain models for sfswitch.

pub mod credentials;
pub mod deploy_job;
pub mod job;
pub mod metadata;

pub use credentials::CredentialContext;
pub use deploy_job::{
    parse_component_selection, ComponentRef, ComponentSelection, CreateDeployJobResponse,
    DeployJob, DeployJobComponent, DeployJobResponse, NewDeployJobComponent,
};
pub use job::{
    CreateJobResponse, InFlightIds, Job, JobDetailResponse, JobStatus, StatusResponse,
};
pub use metadata::{
    unique_object_names, ApexTrigger, MetadataChange, MetadataRecord, MetadataSnapshot,
    MetadataType, NewApexTrigger, NewValidationRule, NewWorkflowRule, ValidationRule,
    WorkflowRule,
};
