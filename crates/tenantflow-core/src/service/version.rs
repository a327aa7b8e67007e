//! Workflow version management.
//!
//! Publishing creates an immutable, monotonically numbered snapshot and can
//! atomically hand the "active" flag over from the previous version. Publishes
//! for the same workflow are serialized in-process; races between processes
//! are caught by the store's compare-and-set and retried.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use serde_json::json;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use tenantflow_types::audit::{AuditAction, AuditEntry};
use tenantflow_types::error::{EngineError, RepositoryError};
use tenantflow_types::workflow::{PublishRequest, StepDefinition, StepKind, WorkflowVersion};

use crate::repository::audit::AuditLogger;
use crate::repository::version::VersionRepository;
use crate::service::audit::record;

/// Validate a publish request without touching the store.
pub fn validate_publish(request: &PublishRequest) -> Result<(), EngineError> {
    for (label, value) in [
        ("workflow_id", &request.workflow_id),
        ("company_id", &request.company_id),
        ("name", &request.name),
    ] {
        if value.trim().is_empty() {
            return Err(EngineError::Validation(format!("{label} must not be empty")));
        }
    }

    if let Some(trigger) = &request.trigger {
        if trigger.trigger_name.trim().is_empty() {
            return Err(EngineError::Validation(
                "trigger_name must not be empty".to_string(),
            ));
        }
    }

    validate_steps(&request.steps)
}

/// Structural checks on a step list: non-empty, unique ids, resolvable
/// successors, and logic on every condition step.
pub fn validate_steps(steps: &[StepDefinition]) -> Result<(), EngineError> {
    if steps.is_empty() {
        return Err(EngineError::Validation(
            "workflow must have at least one step".to_string(),
        ));
    }

    let mut ids = HashSet::new();
    for step in steps {
        if step.id.trim().is_empty() {
            return Err(EngineError::Validation("step id must not be empty".to_string()));
        }
        if !ids.insert(step.id.as_str()) {
            return Err(EngineError::Validation(format!(
                "duplicate step id: '{}'",
                step.id
            )));
        }
    }

    for step in steps {
        if step.kind == StepKind::Condition && step.logic.is_none() {
            return Err(EngineError::Validation(format!(
                "condition step '{}' has no logic",
                step.id
            )));
        }
        for target in step.successors() {
            if !ids.contains(target) {
                return Err(EngineError::Validation(format!(
                    "step '{}' references unknown step '{}'",
                    step.id, target
                )));
            }
        }
    }

    Ok(())
}

/// Held per-workflow lock. Dropping it releases the mutex and removes the map
/// entry once no other caller holds or waits on it.
struct WorkflowLock<'a> {
    locks: &'a DashMap<String, Arc<Mutex<()>>>,
    workflow_id: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for WorkflowLock<'_> {
    fn drop(&mut self) {
        self.guard.take();
        // Clones are only taken under the shard lock, so a count of 1 here
        // means nobody else can reach this mutex.
        self.locks
            .remove_if(&self.workflow_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}

/// Service owning the version history of every workflow.
pub struct VersionManager<V: VersionRepository, A: AuditLogger> {
    repo: V,
    audit: A,
    locks: DashMap<String, Arc<Mutex<()>>>,
    max_attempts: u32,
}

impl<V: VersionRepository, A: AuditLogger> VersionManager<V, A> {
    /// Create a new VersionManager.
    ///
    /// - `max_attempts`: optimistic retries when a commit loses a race
    pub fn new(repo: V, audit: A, max_attempts: u32) -> Self {
        Self {
            repo,
            audit,
            locks: DashMap::new(),
            max_attempts: max_attempts.max(1),
        }
    }

    async fn lock_workflow(&self, workflow_id: &str) -> WorkflowLock<'_> {
        let lock = self
            .locks
            .entry(workflow_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = lock.lock_owned().await;
        WorkflowLock {
            locks: &self.locks,
            workflow_id: workflow_id.to_string(),
            guard: Some(guard),
        }
    }

    /// Publish a new version of a workflow.
    ///
    /// 1. Validates the definition (nothing is written on failure)
    /// 2. Numbers it `max(existing) + 1`
    /// 3. Commits it, deactivating the previous active version in the same
    ///    transaction when `activate` is set
    /// 4. Audits the deactivation (if any), then the creation
    pub async fn publish(&self, request: PublishRequest) -> Result<WorkflowVersion, EngineError> {
        validate_publish(&request)?;

        let _lock = self.lock_workflow(&request.workflow_id).await;

        let mut last_conflict = String::new();
        for attempt in 1..=self.max_attempts {
            let existing = self.repo.list_versions(&request.workflow_id).await?;
            if let Some(other) = existing.iter().find(|v| v.company_id != request.company_id) {
                return Err(EngineError::Validation(format!(
                    "workflow '{}' belongs to company '{}'",
                    request.workflow_id, other.company_id
                )));
            }

            let next_number = existing
                .iter()
                .map(|v| v.version_number)
                .max()
                .unwrap_or(0)
                + 1;
            let superseded = if request.activate {
                existing.iter().find(|v| v.is_active).cloned()
            } else {
                None
            };

            let version = WorkflowVersion {
                id: Uuid::now_v7(),
                workflow_id: request.workflow_id.clone(),
                company_id: request.company_id.clone(),
                version_number: next_number,
                name: request.name.trim().to_string(),
                description: request.description.clone(),
                trigger: request.trigger.clone(),
                steps: request.steps.clone(),
                is_active: request.activate,
                created_by: request.created_by.clone(),
                change_notes: request.change_notes.clone(),
                total_executions: 0,
                created_at: Utc::now(),
            };

            match self
                .repo
                .commit_version(&version, superseded.as_ref().map(|v| v.id))
                .await
            {
                Ok(()) => {
                    tracing::info!(
                        workflow_id = %version.workflow_id,
                        version = version.version_number,
                        active = version.is_active,
                        "published workflow version"
                    );
                    if let Some(old) = &superseded {
                        self.audit_deactivated(old, &request.created_by).await;
                    }
                    record(
                        &self.audit,
                        AuditEntry::new(
                            AuditAction::WorkflowVersionCreated,
                            version.id.to_string(),
                            &version.company_id,
                            &version.created_by,
                            format!(
                                "Created version {} of workflow '{}'",
                                version.version_number, version.name
                            ),
                        )
                        .with_metadata(json!({
                            "workflow_id": version.workflow_id,
                            "version_number": version.version_number,
                            "is_active": version.is_active,
                            "change_notes": version.change_notes,
                        })),
                    )
                    .await;
                    return Ok(version);
                }
                Err(RepositoryError::Conflict(msg)) => {
                    tracing::warn!(
                        workflow_id = %request.workflow_id,
                        attempt,
                        reason = %msg,
                        "publish lost a race, retrying"
                    );
                    last_conflict = msg;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(EngineError::Conflict(format!(
            "could not publish workflow '{}' after {} attempts: {}",
            request.workflow_id, self.max_attempts, last_conflict
        )))
    }

    /// Make an existing version the active one (rollback or roll-forward).
    ///
    /// Activating the already-active version is a no-op.
    pub async fn activate(
        &self,
        workflow_id: &str,
        version_number: i64,
        actor: &str,
    ) -> Result<WorkflowVersion, EngineError> {
        let _lock = self.lock_workflow(workflow_id).await;

        let mut last_conflict = String::new();
        for attempt in 1..=self.max_attempts {
            let existing = self.repo.list_versions(workflow_id).await?;
            let mut target = existing
                .iter()
                .find(|v| v.version_number == version_number)
                .cloned()
                .ok_or_else(|| {
                    EngineError::NotFound(format!(
                        "version {version_number} of workflow '{workflow_id}'"
                    ))
                })?;
            if target.is_active {
                return Ok(target);
            }
            let superseded = existing.iter().find(|v| v.is_active).cloned();

            match self
                .repo
                .activate_version(&target.id, superseded.as_ref().map(|v| v.id))
                .await
            {
                Ok(()) => {
                    target.is_active = true;
                    tracing::info!(
                        workflow_id,
                        version = version_number,
                        "activated workflow version"
                    );
                    if let Some(old) = &superseded {
                        self.audit_deactivated(old, actor).await;
                    }
                    record(
                        &self.audit,
                        AuditEntry::new(
                            AuditAction::WorkflowVersionActivated,
                            target.id.to_string(),
                            &target.company_id,
                            actor,
                            format!(
                                "Activated version {} of workflow '{}'",
                                target.version_number, target.name
                            ),
                        )
                        .with_metadata(json!({
                            "workflow_id": target.workflow_id,
                            "version_number": target.version_number,
                            "previous_version_number": superseded.as_ref().map(|v| v.version_number),
                        })),
                    )
                    .await;
                    return Ok(target);
                }
                Err(RepositoryError::Conflict(msg)) => {
                    tracing::warn!(workflow_id, attempt, reason = %msg, "activation lost a race, retrying");
                    last_conflict = msg;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(EngineError::Conflict(format!(
            "could not activate version {version_number} of workflow '{workflow_id}' after {} attempts: {last_conflict}",
            self.max_attempts
        )))
    }

    async fn audit_deactivated(&self, old: &WorkflowVersion, actor: &str) {
        record(
            &self.audit,
            AuditEntry::new(
                AuditAction::WorkflowVersionDeactivated,
                old.id.to_string(),
                &old.company_id,
                actor,
                format!(
                    "Deactivated version {} of workflow '{}'",
                    old.version_number, old.name
                ),
            )
            .with_metadata(json!({
                "workflow_id": old.workflow_id,
                "version_number": old.version_number,
            })),
        )
        .await;
    }

    /// Get a version by id.
    pub async fn get_version(&self, id: &Uuid) -> Result<WorkflowVersion, EngineError> {
        self.repo
            .get_version(id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("version {id}")))
    }

    /// All versions of a workflow, oldest first.
    pub async fn list_versions(&self, workflow_id: &str) -> Result<Vec<WorkflowVersion>, EngineError> {
        Ok(self.repo.list_versions(workflow_id).await?)
    }

    pub async fn active_version(
        &self,
        workflow_id: &str,
    ) -> Result<Option<WorkflowVersion>, EngineError> {
        Ok(self.repo.get_active_version(workflow_id).await?)
    }
}
