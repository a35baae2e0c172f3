//! Fetch and deploy pipelines and the Salesforce client they talk to.

pub mod deploy;
pub mod fetch;
pub mod job_service;
pub mod retry;
pub mod salesforce;

#[cfg(test)]
pub(crate) mod testing;

pub use deploy::DeployService;
pub use fetch::MetadataFetchService;
pub use job_service::JobService;
pub use retry::RetryPolicy;
pub use salesforce::SalesforceClient;
