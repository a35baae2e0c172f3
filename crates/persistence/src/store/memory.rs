//! In-memory job store for local development and tests.
//!
//! All tables live behind one lock, so every multi-row operation is atomic
//! in the same way the PostgreSQL transactions are.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::models::{
    ApexTrigger, ComponentRef, CredentialContext, DeployJob, DeployJobComponent, InFlightIds, Job,
    JobStatus, MetadataRecord, MetadataSnapshot, MetadataType, NewDeployJobComponent, ValidationRule,
    WorkflowRule,
};
use domain::services::JobStore;
use domain::StoreError;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

#[derive(Default)]
struct Sequences {
    jobs: i64,
    validation_rules: i64,
    workflow_rules: i64,
    triggers: i64,
    deploy_jobs: i64,
    deploy_components: i64,
}

fn next(seq: &mut i64) -> i64 {
    *seq += 1;
    *seq
}

#[derive(Default)]
struct Tables {
    seq: Sequences,
    jobs: BTreeMap<i64, Job>,
    validation_rules: BTreeMap<i64, ValidationRule>,
    workflow_rules: BTreeMap<i64, WorkflowRule>,
    triggers: BTreeMap<i64, ApexTrigger>,
    deploy_jobs: BTreeMap<i64, DeployJob>,
    deploy_components: BTreeMap<i64, DeployJobComponent>,
}

impl Tables {
    fn component_exists(&self, component: ComponentRef) -> bool {
        match component {
            ComponentRef::ValidationRule(id) => self.validation_rules.contains_key(&id),
            ComponentRef::WorkflowRule(id) => self.workflow_rules.contains_key(&id),
            ComponentRef::Trigger(id) => self.triggers.contains_key(&id),
        }
    }

    fn set_enabled(&mut self, component: ComponentRef, enabled: bool) {
        match component {
            ComponentRef::ValidationRule(id) => {
                if let Some(rule) = self.validation_rules.get_mut(&id) {
                    rule.enabled = enabled;
                }
            }
            ComponentRef::WorkflowRule(id) => {
                if let Some(rule) = self.workflow_rules.get_mut(&id) {
                    rule.enabled = enabled;
                }
            }
            ComponentRef::Trigger(id) => {
                if let Some(trigger) = self.triggers.get_mut(&id) {
                    trigger.enabled = enabled;
                }
            }
        }
    }
}

fn apply_transition(
    status: &mut JobStatus,
    error_slot: &mut Option<String>,
    updated_at: &mut DateTime<Utc>,
    from: JobStatus,
    to: JobStatus,
    error: Option<&str>,
) -> bool {
    if *status != from {
        return false;
    }
    *status = to;
    *error_slot = error.map(str::to_string);
    *updated_at = Utc::now();
    true
}

/// `JobStore` kept entirely in process memory.
///
/// Selected with the `memory://` database URL. Nothing survives a restart.
#[derive(Default)]
pub struct InMemoryJobStore {
    tables: RwLock<Tables>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn create_job(
        &self,
        random_id: &str,
        credentials: &CredentialContext,
    ) -> Result<Job, StoreError> {
        let mut tables = self.tables.write().await;
        if tables.jobs.values().any(|job| job.random_id == random_id) {
            return Err(StoreError::Conflict(format!(
                "job token {} already exists",
                random_id
            )));
        }

        let now = Utc::now();
        let job = Job {
            id: next(&mut tables.seq.jobs),
            random_id: random_id.to_string(),
            created_date: now,
            updated_at: now,
            status: JobStatus::NotStarted,
            error: None,
            username: credentials.username.clone(),
            org_id: credentials.org_id.clone(),
            org_name: credentials.org_name.clone(),
            instance_url: credentials.instance_url.clone(),
            access_token: credentials.access_token.clone(),
        };
        tables.jobs.insert(job.id, job.clone());
        Ok(job)
    }

    async fn find_job(&self, job_id: i64) -> Result<Option<Job>, StoreError> {
        Ok(self.tables.read().await.jobs.get(&job_id).cloned())
    }

    async fn find_job_by_random_id(&self, random_id: &str) -> Result<Option<Job>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .jobs
            .values()
            .find(|job| job.random_id == random_id)
            .cloned())
    }

    async fn transition_job(
        &self,
        job_id: i64,
        from: JobStatus,
        to: JobStatus,
        error: Option<&str>,
    ) -> Result<bool, StoreError> {
        from.ensure_transition(to)?;
        let mut tables = self.tables.write().await;
        Ok(match tables.jobs.get_mut(&job_id) {
            Some(job) => apply_transition(
                &mut job.status,
                &mut job.error,
                &mut job.updated_at,
                from,
                to,
                error,
            ),
            None => false,
        })
    }

    async fn complete_fetch_job(
        &self,
        job_id: i64,
        snapshot: &MetadataSnapshot,
    ) -> Result<bool, StoreError> {
        let mut tables = self.tables.write().await;
        let finished = match tables.jobs.get_mut(&job_id) {
            Some(job) => apply_transition(
                &mut job.status,
                &mut job.error,
                &mut job.updated_at,
                JobStatus::Running,
                JobStatus::Finished,
                None,
            ),
            None => false,
        };
        if !finished {
            return Ok(false);
        }

        for rule in &snapshot.validation_rules {
            let id = next(&mut tables.seq.validation_rules);
            tables.validation_rules.insert(
                id,
                ValidationRule {
                    id,
                    job_id,
                    remote_id: rule.remote_id.clone(),
                    object_name: rule.object_name.clone(),
                    name: rule.name.clone(),
                    full_name: rule.full_name.clone(),
                    enabled: rule.enabled,
                    description: rule.description.clone(),
                    error_condition_formula: rule.error_condition_formula.clone(),
                    error_message: rule.error_message.clone(),
                    error_display_field: rule.error_display_field.clone(),
                    metadata: rule.metadata.clone(),
                },
            );
        }

        for rule in &snapshot.workflow_rules {
            let id = next(&mut tables.seq.workflow_rules);
            tables.workflow_rules.insert(
                id,
                WorkflowRule {
                    id,
                    job_id,
                    remote_id: rule.remote_id.clone(),
                    object_name: rule.object_name.clone(),
                    name: rule.name.clone(),
                    full_name: rule.full_name.clone(),
                    enabled: rule.enabled,
                    description: rule.description.clone(),
                    formula: rule.formula.clone(),
                    trigger_type: rule.trigger_type.clone(),
                    metadata: rule.metadata.clone(),
                },
            );
        }

        for trigger in &snapshot.triggers {
            let id = next(&mut tables.seq.triggers);
            tables.triggers.insert(
                id,
                ApexTrigger {
                    id,
                    job_id,
                    remote_id: trigger.remote_id.clone(),
                    name: trigger.name.clone(),
                    object_name: trigger.object_name.clone(),
                    enabled: trigger.enabled,
                    api_version: trigger.api_version.clone(),
                    metadata: trigger.metadata.clone(),
                },
            );
        }

        Ok(true)
    }

    async fn list_validation_rules(&self, job_id: i64) -> Result<Vec<ValidationRule>, StoreError> {
        let tables = self.tables.read().await;
        let mut rules: Vec<_> = tables
            .validation_rules
            .values()
            .filter(|r| r.job_id == job_id)
            .cloned()
            .collect();
        rules.sort_by(|a, b| (&a.object_name, &a.name, a.id).cmp(&(&b.object_name, &b.name, b.id)));
        Ok(rules)
    }

    async fn list_workflow_rules(&self, job_id: i64) -> Result<Vec<WorkflowRule>, StoreError> {
        let tables = self.tables.read().await;
        let mut rules: Vec<_> = tables
            .workflow_rules
            .values()
            .filter(|r| r.job_id == job_id)
            .cloned()
            .collect();
        rules.sort_by(|a, b| (&a.object_name, &a.name, a.id).cmp(&(&b.object_name, &b.name, b.id)));
        Ok(rules)
    }

    async fn list_triggers(&self, job_id: i64) -> Result<Vec<ApexTrigger>, StoreError> {
        let tables = self.tables.read().await;
        let mut triggers: Vec<_> = tables
            .triggers
            .values()
            .filter(|t| t.job_id == job_id)
            .cloned()
            .collect();
        triggers.sort_by(|a, b| (&a.name, a.id).cmp(&(&b.name, b.id)));
        Ok(triggers)
    }

    async fn find_component(
        &self,
        job_id: i64,
        component: ComponentRef,
    ) -> Result<Option<MetadataRecord>, StoreError> {
        let tables = self.tables.read().await;
        let record = match component {
            ComponentRef::ValidationRule(id) => tables
                .validation_rules
                .get(&id)
                .filter(|r| r.job_id == job_id)
                .cloned()
                .map(MetadataRecord::ValidationRule),
            ComponentRef::WorkflowRule(id) => tables
                .workflow_rules
                .get(&id)
                .filter(|r| r.job_id == job_id)
                .cloned()
                .map(MetadataRecord::WorkflowRule),
            ComponentRef::Trigger(id) => tables
                .triggers
                .get(&id)
                .filter(|t| t.job_id == job_id)
                .cloned()
                .map(MetadataRecord::Trigger),
        };
        Ok(record)
    }

    async fn create_deploy_job(
        &self,
        job_id: i64,
        metadata_type: MetadataType,
    ) -> Result<DeployJob, StoreError> {
        let mut tables = self.tables.write().await;
        if !tables.jobs.contains_key(&job_id) {
            return Err(StoreError::Database(format!(
                "job {} does not exist",
                job_id
            )));
        }

        let now = Utc::now();
        let deploy_job = DeployJob {
            id: next(&mut tables.seq.deploy_jobs),
            job_id,
            status: JobStatus::NotStarted,
            error: None,
            metadata_type,
            created_date: now,
            updated_at: now,
        };
        tables.deploy_jobs.insert(deploy_job.id, deploy_job.clone());
        Ok(deploy_job)
    }

    async fn find_deploy_job(&self, deploy_job_id: i64) -> Result<Option<DeployJob>, StoreError> {
        Ok(self.tables.read().await.deploy_jobs.get(&deploy_job_id).cloned())
    }

    async fn add_deploy_components(
        &self,
        deploy_job_id: i64,
        components: &[NewDeployJobComponent],
    ) -> Result<Vec<DeployJobComponent>, StoreError> {
        let mut tables = self.tables.write().await;
        if !tables.deploy_jobs.contains_key(&deploy_job_id) {
            return Err(StoreError::Database(format!(
                "deploy job {} does not exist",
                deploy_job_id
            )));
        }
        if let Some(missing) = components
            .iter()
            .find(|c| !tables.component_exists(c.component))
        {
            return Err(StoreError::Database(format!(
                "{} {} does not exist",
                missing.component.metadata_type(),
                missing.component.id()
            )));
        }

        let mut added = Vec::with_capacity(components.len());
        for component in components {
            let row = DeployJobComponent {
                id: next(&mut tables.seq.deploy_components),
                deploy_job_id,
                component: component.component,
                enable: component.enable,
            };
            tables.deploy_components.insert(row.id, row.clone());
            added.push(row);
        }
        Ok(added)
    }

    async fn list_deploy_components(
        &self,
        deploy_job_id: i64,
    ) -> Result<Vec<DeployJobComponent>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .deploy_components
            .values()
            .filter(|c| c.deploy_job_id == deploy_job_id)
            .cloned()
            .collect())
    }

    async fn transition_deploy_job(
        &self,
        deploy_job_id: i64,
        from: JobStatus,
        to: JobStatus,
        error: Option<&str>,
    ) -> Result<bool, StoreError> {
        from.ensure_transition(to)?;
        let mut tables = self.tables.write().await;
        Ok(match tables.deploy_jobs.get_mut(&deploy_job_id) {
            Some(dj) => apply_transition(
                &mut dj.status,
                &mut dj.error,
                &mut dj.updated_at,
                from,
                to,
                error,
            ),
            None => false,
        })
    }

    async fn complete_deploy_job(
        &self,
        deploy_job_id: i64,
        components: &[DeployJobComponent],
    ) -> Result<bool, StoreError> {
        let mut tables = self.tables.write().await;

        let running = tables
            .deploy_jobs
            .get(&deploy_job_id)
            .map(|dj| dj.status == JobStatus::Running)
            .unwrap_or(false);
        if !running {
            return Ok(false);
        }
        if let Some(missing) = components
            .iter()
            .find(|c| !tables.component_exists(c.component))
        {
            return Err(StoreError::Corrupt(format!(
                "{} {} referenced by deploy job {} no longer exists",
                missing.component.metadata_type(),
                missing.component.id(),
                deploy_job_id
            )));
        }

        for component in components {
            tables.set_enabled(component.component, component.enable);
        }
        if let Some(dj) = tables.deploy_jobs.get_mut(&deploy_job_id) {
            apply_transition(
                &mut dj.status,
                &mut dj.error,
                &mut dj.updated_at,
                JobStatus::Running,
                JobStatus::Finished,
                None,
            );
        }
        Ok(true)
    }

    async fn fail_stale_jobs(
        &self,
        updated_before: DateTime<Utc>,
        message: &str,
        in_flight: &InFlightIds,
    ) -> Result<u64, StoreError> {
        let mut tables = self.tables.write().await;
        let now = Utc::now();
        let mut failed = 0;

        let stale = |status: JobStatus, updated_at: DateTime<Utc>| {
            !status.is_terminal() && updated_at < updated_before
        };

        for job in tables.jobs.values_mut() {
            if stale(job.status, job.updated_at) && !in_flight.jobs.contains(&job.id) {
                job.status = JobStatus::Error;
                job.error = Some(message.to_string());
                job.updated_at = now;
                failed += 1;
            }
        }
        for dj in tables.deploy_jobs.values_mut() {
            if stale(dj.status, dj.updated_at) && !in_flight.deploy_jobs.contains(&dj.id) {
                dj.status = JobStatus::Error;
                dj.error = Some(message.to_string());
                dj.updated_at = now;
                failed += 1;
            }
        }

        Ok(failed)
    }

    async fn purge_jobs_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut tables = self.tables.write().await;
        let expired: Vec<i64> = tables
            .jobs
            .values()
            .filter(|job| job.created_date < cutoff)
            .map(|job| job.id)
            .collect();
        if expired.is_empty() {
            return Ok(0);
        }

        let Tables {
            jobs,
            validation_rules,
            workflow_rules,
            triggers,
            deploy_jobs,
            deploy_components,
            ..
        } = &mut *tables;

        for id in &expired {
            jobs.remove(id);
        }
        validation_rules.retain(|_, r| !expired.contains(&r.job_id));
        workflow_rules.retain(|_, r| !expired.contains(&r.job_id));
        triggers.retain(|_, t| !expired.contains(&t.job_id));
        deploy_jobs.retain(|_, dj| !expired.contains(&dj.job_id));
        deploy_components.retain(|_, c| deploy_jobs.contains_key(&c.deploy_job_id));

        Ok(expired.len() as u64)
    }
}
