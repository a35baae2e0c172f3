//! Remote org metadata API.

use async_trait::async_trait;

use crate::error::SyncError;
use crate::models::{
    CredentialContext, MetadataChange, NewApexTrigger, NewValidationRule, NewWorkflowRule,
};

/// Read and deploy operations against an org's metadata.
///
/// Every call takes the credentials explicitly; implementations hold no
/// per-org session state.
#[async_trait]
pub trait MetadataApi: Send + Sync {
    async fn fetch_validation_rules(
        &self,
        credentials: &CredentialContext,
    ) -> Result<Vec<NewValidationRule>, SyncError>;

    async fn fetch_workflow_rules(
        &self,
        credentials: &CredentialContext,
    ) -> Result<Vec<NewWorkflowRule>, SyncError>;

    async fn fetch_triggers(
        &self,
        credentials: &CredentialContext,
    ) -> Result<Vec<NewApexTrigger>, SyncError>;

    /// Deploys the changes. Implementations may split them into batches that
    /// each apply all-or-nothing; a failure reports how many were applied.
    async fn deploy(
        &self,
        credentials: &CredentialContext,
        changes: &[MetadataChange],
    ) -> Result<(), SyncError>;
}
