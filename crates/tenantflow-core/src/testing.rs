//! In-memory implementations of every port, for service tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use tenantflow_types::audit::AuditEntry;
use tenantflow_types::error::RepositoryError;
use tenantflow_types::execution::WorkflowExecution;
use tenantflow_types::workflow::{
    PublishRequest, StepDefinition, StepKind, WorkflowTrigger, WorkflowVersion,
};

use crate::repository::audit::AuditLogger;
use crate::repository::execution::ExecutionRepository;
use crate::repository::trigger::TriggerRepository;
use crate::repository::version::VersionRepository;

#[derive(Default)]
struct State {
    versions: Vec<WorkflowVersion>,
    triggers: Vec<WorkflowTrigger>,
    executions: HashMap<Uuid, WorkflowExecution>,
    audit: Vec<AuditEntry>,
}

/// Shared in-memory store. Clones see the same data.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
    /// Number of upcoming version commits to reject with a conflict.
    pub commit_conflicts: Arc<AtomicU32>,
    /// Number of upcoming execution updates to reject with a conflict.
    pub update_conflicts: Arc<AtomicU32>,
    /// Make every audit append fail.
    pub fail_audit: Arc<AtomicBool>,
}

fn take_one(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn audit_entries(&self) -> Vec<AuditEntry> {
        self.state.lock().unwrap().audit.clone()
    }

    pub fn clear_audit(&self) {
        self.state.lock().unwrap().audit.clear();
    }

    pub fn active_count(&self, workflow_id: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .versions
            .iter()
            .filter(|v| v.workflow_id == workflow_id && v.is_active)
            .count()
    }

    pub fn execution_count(&self) -> usize {
        self.state.lock().unwrap().executions.len()
    }

    /// Overwrite an execution without revision checks.
    pub fn put_execution(&self, execution: WorkflowExecution) {
        self.state
            .lock()
            .unwrap()
            .executions
            .insert(execution.id, execution);
    }
}

impl VersionRepository for MemoryStore {
    async fn commit_version(
        &self,
        version: &WorkflowVersion,
        supersedes: Option<Uuid>,
    ) -> Result<(), RepositoryError> {
        if take_one(&self.commit_conflicts) {
            return Err(RepositoryError::Conflict("injected conflict".to_string()));
        }
        let mut state = self.state.lock().unwrap();
        if state.versions.iter().any(|v| {
            v.workflow_id == version.workflow_id && v.version_number == version.version_number
        }) {
            return Err(RepositoryError::Conflict("duplicate version number".to_string()));
        }
        if let Some(old) = supersedes {
            if !state.versions.iter().any(|v| v.id == old && v.is_active) {
                return Err(RepositoryError::Conflict("superseded version not active".to_string()));
            }
        }
        if version.is_active
            && state.versions.iter().any(|v| {
                v.workflow_id == version.workflow_id && v.is_active && Some(v.id) != supersedes
            })
        {
            return Err(RepositoryError::Conflict("another version is active".to_string()));
        }

        if let Some(old) = supersedes {
            if let Some(v) = state.versions.iter_mut().find(|v| v.id == old) {
                v.is_active = false;
            }
        }
        state.versions.push(version.clone());
        Ok(())
    }

    async fn activate_version(
        &self,
        version_id: &Uuid,
        supersedes: Option<Uuid>,
    ) -> Result<(), RepositoryError> {
        if take_one(&self.commit_conflicts) {
            return Err(RepositoryError::Conflict("injected conflict".to_string()));
        }
        let mut state = self.state.lock().unwrap();
        let target = state
            .versions
            .iter()
            .find(|v| v.id == *version_id)
            .cloned()
            .ok_or(RepositoryError::NotFound)?;
        if target.is_active {
            return Err(RepositoryError::Conflict("version already active".to_string()));
        }
        if let Some(old) = supersedes {
            if !state.versions.iter().any(|v| v.id == old && v.is_active) {
                return Err(RepositoryError::Conflict("superseded version not active".to_string()));
            }
        }
        if state.versions.iter().any(|v| {
            v.workflow_id == target.workflow_id && v.is_active && Some(v.id) != supersedes
        }) {
            return Err(RepositoryError::Conflict("another version is active".to_string()));
        }
        for v in state.versions.iter_mut() {
            if Some(v.id) == supersedes {
                v.is_active = false;
            }
            if v.id == *version_id {
                v.is_active = true;
            }
        }
        Ok(())
    }

    async fn get_version(&self, id: &Uuid) -> Result<Option<WorkflowVersion>, RepositoryError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .versions
            .iter()
            .find(|v| v.id == *id)
            .cloned())
    }

    async fn list_versions(&self, workflow_id: &str) -> Result<Vec<WorkflowVersion>, RepositoryError> {
        let mut out: Vec<WorkflowVersion> = self
            .state
            .lock()
            .unwrap()
            .versions
            .iter()
            .filter(|v| v.workflow_id == workflow_id)
            .cloned()
            .collect();
        out.sort_by_key(|v| v.version_number);
        Ok(out)
    }

    async fn get_active_version(
        &self,
        workflow_id: &str,
    ) -> Result<Option<WorkflowVersion>, RepositoryError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .versions
            .iter()
            .find(|v| v.workflow_id == workflow_id && v.is_active)
            .cloned())
    }
}

impl TriggerRepository for MemoryStore {
    async fn create_trigger(&self, trigger: &WorkflowTrigger) -> Result<(), RepositoryError> {
        self.state.lock().unwrap().triggers.push(trigger.clone());
        Ok(())
    }

    async fn get_trigger(&self, id: &Uuid) -> Result<Option<WorkflowTrigger>, RepositoryError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .triggers
            .iter()
            .find(|t| t.id == *id)
            .cloned())
    }

    async fn list_triggers(&self, workflow_id: &str) -> Result<Vec<WorkflowTrigger>, RepositoryError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .triggers
            .iter()
            .filter(|t| t.workflow_id == workflow_id)
            .cloned()
            .collect())
    }

    async fn set_trigger_active(&self, id: &Uuid, is_active: bool) -> Result<bool, RepositoryError> {
        let mut state = self.state.lock().unwrap();
        match state.triggers.iter_mut().find(|t| t.id == *id) {
            Some(t) => {
                t.is_active = is_active;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

impl ExecutionRepository for MemoryStore {
    async fn start_execution(&self, execution: &WorkflowExecution) -> Result<(), RepositoryError> {
        let mut state = self.state.lock().unwrap();
        if let Some(key) = &execution.idempotency_key {
            if state
                .executions
                .values()
                .any(|e| e.idempotency_key.as_ref() == Some(key))
            {
                return Err(RepositoryError::Conflict("duplicate idempotency key".to_string()));
            }
        }
        let version = state
            .versions
            .iter_mut()
            .find(|v| v.id == execution.version_id)
            .ok_or(RepositoryError::NotFound)?;
        version.total_executions += 1;
        state.executions.insert(execution.id, execution.clone());
        Ok(())
    }

    async fn get_execution(&self, id: &Uuid) -> Result<Option<WorkflowExecution>, RepositoryError> {
        Ok(self.state.lock().unwrap().executions.get(id).cloned())
    }

    async fn find_by_idempotency_key(
        &self,
        key: &str,
    ) -> Result<Option<WorkflowExecution>, RepositoryError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .executions
            .values()
            .find(|e| e.idempotency_key.as_deref() == Some(key))
            .cloned())
    }

    async fn update_execution(
        &self,
        execution: &WorkflowExecution,
        expected_revision: i64,
    ) -> Result<(), RepositoryError> {
        if take_one(&self.update_conflicts) {
            return Err(RepositoryError::Conflict("injected conflict".to_string()));
        }
        let mut state = self.state.lock().unwrap();
        let stored = state
            .executions
            .get_mut(&execution.id)
            .ok_or(RepositoryError::NotFound)?;
        if stored.revision != expected_revision {
            return Err(RepositoryError::Conflict(format!(
                "execution {} is at revision {}, expected {}",
                execution.id, stored.revision, expected_revision
            )));
        }
        *stored = execution.clone();
        Ok(())
    }

    async fn list_stale(
        &self,
        idle_since: DateTime<Utc>,
    ) -> Result<Vec<WorkflowExecution>, RepositoryError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .executions
            .values()
            .filter(|e| !e.status.is_terminal() && e.updated_at < idle_since)
            .cloned()
            .collect())
    }

    async fn list_executions(
        &self,
        workflow_id: &str,
        limit: i64,
    ) -> Result<Vec<WorkflowExecution>, RepositoryError> {
        let mut out: Vec<WorkflowExecution> = self
            .state
            .lock()
            .unwrap()
            .executions
            .values()
            .filter(|e| e.workflow_id == workflow_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        out.truncate(limit.max(0) as usize);
        Ok(out)
    }
}

impl AuditLogger for MemoryStore {
    async fn append(&self, entry: &AuditEntry) -> Result<(), RepositoryError> {
        if self.fail_audit.load(Ordering::SeqCst) {
            return Err(RepositoryError::Connection);
        }
        self.state.lock().unwrap().audit.push(entry.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub fn action_step(id: &str, next: Option<&str>) -> StepDefinition {
    StepDefinition {
        id: id.to_string(),
        name: id.to_string(),
        kind: StepKind::Action,
        next_step_id: next.map(str::to_string),
        logic: None,
        config: serde_json::Value::Null,
    }
}

/// Action steps chained in order; the last one is terminal.
pub fn linear_steps(ids: &[&str]) -> Vec<StepDefinition> {
    ids.iter()
        .enumerate()
        .map(|(i, id)| action_step(id, ids.get(i + 1).copied()))
        .collect()
}

pub fn publish_request(workflow_id: &str, activate: bool) -> PublishRequest {
    PublishRequest {
        workflow_id: workflow_id.to_string(),
        company_id: "acme".to_string(),
        name: "Invoice flow".to_string(),
        description: None,
        trigger: None,
        steps: linear_steps(&["review", "send"]),
        change_notes: None,
        activate,
        created_by: "ops@acme.test".to_string(),
    }
}
