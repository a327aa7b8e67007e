//! Trigger evaluation and management.
//!
//! `TriggerEvaluator` decides whether an inbound event starts a new execution
//! of a workflow's active version. Every condition on the trigger must hold
//! (logical AND), unlike step branching where the first matching rule wins.
//!
//! Events are deduplicated: the same payload sent to the same trigger within
//! one dedup window maps to the same idempotency key and starts at most one
//! execution.

use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use tenantflow_types::audit::{AuditAction, AuditEntry};
use tenantflow_types::error::{EngineError, RepositoryError};
use tenantflow_types::execution::{
    ExecutionStatus, TriggerOutcome, TriggerRequest, WorkflowExecution,
};
use tenantflow_types::workflow::{CreateTriggerRequest, WorkflowTrigger};

use crate::engine::condition::ConditionEvaluator;
use crate::engine::rules::RuleEngine;
use crate::repository::audit::AuditLogger;
use crate::repository::execution::ExecutionRepository;
use crate::repository::trigger::TriggerRepository;
use crate::repository::version::VersionRepository;
use crate::service::audit::{record, record_outcome};
use crate::service::execution::enter_step;

pub const REASON_CONDITIONS_NOT_MET: &str = "conditions not met";
pub const REASON_DUPLICATE: &str = "duplicate event";

/// Idempotency key of a trigger event, or `None` when deduplication is off.
///
/// SHA-256 over the trigger id, the canonical (key-sorted) payload JSON and
/// the index of the `window_secs` bucket containing `now`.
pub fn idempotency_key(
    trigger_id: &Uuid,
    payload: &Value,
    now: DateTime<Utc>,
    window_secs: u64,
) -> Option<String> {
    if window_secs == 0 {
        return None;
    }
    let bucket = now.timestamp().max(0) as u64 / window_secs;
    let material = format!("{trigger_id}|{payload}|{bucket}");
    Some(format!("{:x}", Sha256::digest(material.as_bytes())))
}

/// Service that turns trigger events into executions.
pub struct TriggerEvaluator<T, V, X, A, E>
where
    T: TriggerRepository,
    V: VersionRepository,
    X: ExecutionRepository,
    A: AuditLogger,
    E: ConditionEvaluator,
{
    triggers: T,
    versions: V,
    executions: X,
    audit: A,
    rules: RuleEngine<E>,
    dedup_window_secs: u64,
}

impl<T, V, X, A, E> TriggerEvaluator<T, V, X, A, E>
where
    T: TriggerRepository,
    V: VersionRepository,
    X: ExecutionRepository,
    A: AuditLogger,
    E: ConditionEvaluator,
{
    /// Create a new TriggerEvaluator.
    ///
    /// - `dedup_window_secs`: idempotency bucket width, 0 disables dedup
    pub fn new(
        triggers: T,
        versions: V,
        executions: X,
        audit: A,
        evaluator: E,
        dedup_window_secs: u64,
    ) -> Self {
        Self {
            triggers,
            versions,
            executions,
            audit,
            rules: RuleEngine::new(evaluator),
            dedup_window_secs,
        }
    }

    /// The condition evaluator gating triggers.
    pub fn evaluator(&self) -> &E {
        self.rules.evaluator()
    }

    /// Whether every condition of `trigger` holds for `payload`.
    pub fn conditions_met(&self, trigger: &WorkflowTrigger, payload: &Value) -> bool {
        trigger
            .conditions
            .iter()
            .all(|c| self.rules.evaluator().evaluate(c, payload))
    }

    /// Handle an inbound event.
    ///
    /// 1. Loads the trigger; it must be active and belong to the addressed
    ///    workflow and company
    /// 2. Evaluates all conditions (AND) against the payload
    /// 3. Deduplicates by idempotency key
    /// 4. Starts an execution of the active version and audits it
    pub async fn handle(&self, request: TriggerRequest) -> Result<TriggerOutcome, EngineError> {
        let trigger = self
            .triggers
            .get_trigger(&request.trigger_id)
            .await?
            .filter(|t| {
                t.is_active
                    && t.workflow_id == request.workflow_id
                    && t.company_id == request.company_id
            })
            .ok_or_else(|| EngineError::NotFoundOrInactive(request.trigger_id.to_string()))?;

        if !self.conditions_met(&trigger, &request.payload) {
            tracing::debug!(trigger_id = %trigger.id, "trigger conditions not met");
            return Ok(TriggerOutcome::skipped(REASON_CONDITIONS_NOT_MET));
        }

        let version = self
            .versions
            .get_active_version(&request.workflow_id)
            .await?
            .filter(|v| v.company_id == request.company_id)
            .ok_or_else(|| {
                EngineError::NotFound(format!(
                    "active version of workflow '{}'",
                    request.workflow_id
                ))
            })?;

        let now = Utc::now();
        let key = idempotency_key(&trigger.id, &request.payload, now, self.dedup_window_secs);
        if let Some(key) = &key {
            if let Some(existing) = self.executions.find_by_idempotency_key(key).await? {
                tracing::info!(
                    trigger_id = %trigger.id,
                    execution_id = %existing.id,
                    "duplicate trigger event ignored"
                );
                return Ok(duplicate(existing.id));
            }
        }

        let variables = match &request.payload {
            Value::Object(_) => request.payload.clone(),
            Value::Null => json!({}),
            other => json!({ "payload": other }),
        };
        let mut execution = WorkflowExecution {
            id: Uuid::now_v7(),
            workflow_id: version.workflow_id.clone(),
            company_id: version.company_id.clone(),
            version_id: version.id,
            version_number: version.version_number,
            trigger_id: Some(trigger.id),
            status: ExecutionStatus::Running,
            started_by: "system".to_string(),
            started_at: now,
            updated_at: now,
            completed_at: None,
            variables,
            current_step_id: None,
            steps_completed: Vec::new(),
            pending_approvals: Vec::new(),
            error: None,
            idempotency_key: key.clone(),
            revision: 0,
        };
        let entry = version.entry_step().map(|s| s.id.clone());
        enter_step(&self.rules, &version, &mut execution, entry, now);

        match self.executions.start_execution(&execution).await {
            Ok(()) => {}
            Err(RepositoryError::Conflict(msg)) => {
                // Lost a race with an identical event.
                if let Some(key) = &key {
                    if let Some(existing) = self.executions.find_by_idempotency_key(key).await? {
                        return Ok(duplicate(existing.id));
                    }
                }
                return Err(EngineError::Conflict(msg));
            }
            Err(e) => return Err(e.into()),
        }

        tracing::info!(
            workflow_id = %execution.workflow_id,
            trigger_id = %trigger.id,
            execution_id = %execution.id,
            version = execution.version_number,
            status = %execution.status,
            "workflow triggered"
        );

        record(
            &self.audit,
            AuditEntry::new(
                AuditAction::WorkflowTriggered,
                execution.id.to_string(),
                &execution.company_id,
                "system",
                format!("Workflow triggered by '{}'", trigger.trigger_name),
            )
            .with_metadata(json!({
                "workflow_id": execution.workflow_id,
                "trigger_id": trigger.id,
                "execution_id": execution.id,
                "version_number": execution.version_number,
            })),
        )
        .await;
        // The entry walk may already have finished the execution.
        record_outcome(&self.audit, &execution, "system").await;

        Ok(TriggerOutcome::executed(execution.id))
    }

    /// Register a new, active trigger.
    pub async fn create_trigger(
        &self,
        request: CreateTriggerRequest,
        actor: &str,
    ) -> Result<WorkflowTrigger, EngineError> {
        for (label, value) in [
            ("workflow_id", &request.workflow_id),
            ("company_id", &request.company_id),
            ("trigger_name", &request.trigger_name),
        ] {
            if value.trim().is_empty() {
                return Err(EngineError::Validation(format!("{label} must not be empty")));
            }
        }

        let trigger = WorkflowTrigger {
            id: Uuid::now_v7(),
            workflow_id: request.workflow_id,
            company_id: request.company_id,
            trigger_type: request.trigger_type,
            trigger_name: request.trigger_name.trim().to_string(),
            is_active: true,
            conditions: request.conditions,
            created_at: Utc::now(),
        };
        self.triggers.create_trigger(&trigger).await?;
        tracing::info!(trigger_id = %trigger.id, workflow_id = %trigger.workflow_id, "created trigger");

        record(
            &self.audit,
            AuditEntry::new(
                AuditAction::TriggerCreated,
                trigger.id.to_string(),
                &trigger.company_id,
                actor,
                format!("Created {} trigger '{}'", trigger.trigger_type, trigger.trigger_name),
            )
            .with_metadata(json!({
                "workflow_id": trigger.workflow_id,
                "conditions": trigger.conditions.len(),
            })),
        )
        .await;

        Ok(trigger)
    }

    /// Deactivate a trigger. Deactivating an inactive trigger is a no-op.
    pub async fn deactivate_trigger(
        &self,
        id: &Uuid,
        actor: &str,
    ) -> Result<WorkflowTrigger, EngineError> {
        let mut trigger = self.get_trigger(id).await?;
        if !trigger.is_active {
            return Ok(trigger);
        }
        if !self.triggers.set_trigger_active(id, false).await? {
            return Err(EngineError::NotFound(format!("trigger {id}")));
        }
        trigger.is_active = false;
        tracing::info!(trigger_id = %id, "deactivated trigger");

        record(
            &self.audit,
            AuditEntry::new(
                AuditAction::TriggerDeactivated,
                trigger.id.to_string(),
                &trigger.company_id,
                actor,
                format!("Deactivated trigger '{}'", trigger.trigger_name),
            )
            .with_metadata(json!({ "workflow_id": trigger.workflow_id })),
        )
        .await;

        Ok(trigger)
    }

    pub async fn get_trigger(&self, id: &Uuid) -> Result<WorkflowTrigger, EngineError> {
        self.triggers
            .get_trigger(id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("trigger {id}")))
    }

    pub async fn list_triggers(&self, workflow_id: &str) -> Result<Vec<WorkflowTrigger>, EngineError> {
        Ok(self.triggers.list_triggers(workflow_id).await?)
    }
}

fn duplicate(execution_id: Uuid) -> TriggerOutcome {
    TriggerOutcome {
        executed: false,
        execution_id: Some(execution_id),
        reason: Some(REASON_DUPLICATE.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tenantflow_types::condition::{Condition, ConditionLogic, Operator};
    use tenantflow_types::workflow::{StepDefinition, StepKind, TriggerType};

    use super::*;
    use crate::engine::condition::StandardEvaluator;
    use crate::service::version::VersionManager;
    use crate::testing::{MemoryStore, action_step, publish_request};

    /// Counts evaluations so tests can prove nothing was evaluated.
    #[derive(Default)]
    struct CountingEvaluator {
        calls: AtomicUsize,
    }

    impl ConditionEvaluator for CountingEvaluator {
        fn evaluate(&self, condition: &Condition, context: &Value) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            StandardEvaluator.evaluate(condition, context)
        }
    }

    type Evaluator =
        TriggerEvaluator<MemoryStore, MemoryStore, MemoryStore, MemoryStore, CountingEvaluator>;

    fn evaluator(store: &MemoryStore, dedup_window_secs: u64) -> Evaluator {
        TriggerEvaluator::new(
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            CountingEvaluator::default(),
            dedup_window_secs,
        )
    }

    async fn publish_active(store: &MemoryStore, workflow_id: &str) {
        VersionManager::new(store.clone(), store.clone(), 3)
            .publish(publish_request(workflow_id, true))
            .await
            .unwrap();
    }

    async fn overdue_trigger(evaluator: &Evaluator) -> WorkflowTrigger {
        evaluator
            .create_trigger(
                CreateTriggerRequest {
                    workflow_id: "W1".to_string(),
                    company_id: "acme".to_string(),
                    trigger_type: TriggerType::EntityChange,
                    trigger_name: "invoice overdue".to_string(),
                    conditions: vec![
                        Condition::new("status", Operator::Equals, "overdue"),
                        Condition::new("amount", Operator::GreaterThan, 100.0),
                    ],
                },
                "ops@acme.test",
            )
            .await
            .unwrap()
    }

    fn event(trigger: &WorkflowTrigger, payload: Value) -> TriggerRequest {
        TriggerRequest {
            workflow_id: trigger.workflow_id.clone(),
            trigger_id: trigger.id,
            company_id: trigger.company_id.clone(),
            payload,
        }
    }

    #[tokio::test]
    async fn test_all_conditions_met_starts_execution() {
        let store = MemoryStore::new();
        publish_active(&store, "W1").await;
        let evaluator = evaluator(&store, 300);
        let trigger = overdue_trigger(&evaluator).await;

        let outcome = evaluator
            .handle(event(&trigger, json!({"status": "overdue", "amount": 250})))
            .await
            .unwrap();
        assert!(outcome.executed);
        let execution_id = outcome.execution_id.unwrap();

        let execution = store.get_execution(&execution_id).await.unwrap().unwrap();
        assert_eq!(execution.status, ExecutionStatus::Running);
        assert_eq!(execution.started_by, "system");
        assert_eq!(execution.current_step_id.as_deref(), Some("review"));
        assert!(execution.steps_completed.is_empty());
        assert_eq!(execution.trigger_id, Some(trigger.id));
        assert_eq!(execution.variables["amount"], 250);

        let version = store.get_active_version("W1").await.unwrap().unwrap();
        assert_eq!(version.total_executions, 1);

        let audit = store
            .audit_entries()
            .into_iter()
            .find(|e| e.action_type == AuditAction::WorkflowTriggered)
            .unwrap();
        assert_eq!(audit.metadata["trigger_id"], json!(trigger.id));
        assert_eq!(audit.metadata["execution_id"], json!(execution_id));
    }

    #[tokio::test]
    async fn test_one_failing_condition_blocks_firing() {
        let store = MemoryStore::new();
        publish_active(&store, "W1").await;
        let evaluator = evaluator(&store, 300);
        let trigger = overdue_trigger(&evaluator).await;

        let outcome = evaluator
            .handle(event(&trigger, json!({"status": "overdue", "amount": 50})))
            .await
            .unwrap();
        assert_eq!(outcome, TriggerOutcome::skipped(REASON_CONDITIONS_NOT_MET));
        assert_eq!(store.execution_count(), 0);

        let version = store.get_active_version("W1").await.unwrap().unwrap();
        assert_eq!(version.total_executions, 0);
    }

    #[tokio::test]
    async fn test_inactive_trigger_is_rejected_without_evaluation() {
        let store = MemoryStore::new();
        publish_active(&store, "W1").await;
        let evaluator = evaluator(&store, 300);
        let trigger = overdue_trigger(&evaluator).await;
        evaluator
            .deactivate_trigger(&trigger.id, "ops@acme.test")
            .await
            .unwrap();

        let err = evaluator
            .handle(event(&trigger, json!({"status": "overdue", "amount": 250})))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFoundOrInactive(_)));
        assert_eq!(evaluator.evaluator().calls.load(Ordering::SeqCst), 0);
        assert_eq!(store.execution_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_or_foreign_trigger_is_rejected() {
        let store = MemoryStore::new();
        publish_active(&store, "W1").await;
        let evaluator = evaluator(&store, 300);
        let trigger = overdue_trigger(&evaluator).await;

        let mut wrong_workflow = event(&trigger, json!({}));
        wrong_workflow.workflow_id = "W2".to_string();
        assert!(matches!(
            evaluator.handle(wrong_workflow).await,
            Err(EngineError::NotFoundOrInactive(_))
        ));

        let mut wrong_company = event(&trigger, json!({}));
        wrong_company.company_id = "globex".to_string();
        assert!(matches!(
            evaluator.handle(wrong_company).await,
            Err(EngineError::NotFoundOrInactive(_))
        ));

        let mut unknown = event(&trigger, json!({}));
        unknown.trigger_id = Uuid::now_v7();
        assert!(matches!(
            evaluator.handle(unknown).await,
            Err(EngineError::NotFoundOrInactive(_))
        ));
    }

    #[tokio::test]
    async fn test_no_active_version_is_not_found() {
        let store = MemoryStore::new();
        let evaluator = evaluator(&store, 300);
        let trigger = overdue_trigger(&evaluator).await;

        let err = evaluator
            .handle(event(&trigger, json!({"status": "overdue", "amount": 250})))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_duplicate_event_is_not_reexecuted() {
        let store = MemoryStore::new();
        publish_active(&store, "W1").await;
        let evaluator = evaluator(&store, 3600);
        let trigger = overdue_trigger(&evaluator).await;
        let payload = json!({"status": "overdue", "amount": 250});

        let first = evaluator.handle(event(&trigger, payload.clone())).await.unwrap();
        let second = evaluator.handle(event(&trigger, payload)).await.unwrap();
        assert!(first.executed);
        assert!(!second.executed);
        assert_eq!(second.reason.as_deref(), Some(REASON_DUPLICATE));
        assert_eq!(second.execution_id, first.execution_id);
        assert_eq!(store.execution_count(), 1);
    }

    #[tokio::test]
    async fn test_dedup_disabled_executes_twice() {
        let store = MemoryStore::new();
        publish_active(&store, "W1").await;
        let evaluator = evaluator(&store, 0);
        let trigger = overdue_trigger(&evaluator).await;
        let payload = json!({"status": "overdue", "amount": 250});

        assert!(evaluator.handle(event(&trigger, payload.clone())).await.unwrap().executed);
        assert!(evaluator.handle(event(&trigger, payload)).await.unwrap().executed);
        let version = store.get_active_version("W1").await.unwrap().unwrap();
        assert_eq!(version.total_executions, 2);
    }

    #[tokio::test]
    async fn test_trigger_without_conditions_always_fires() {
        let store = MemoryStore::new();
        publish_active(&store, "W1").await;
        let evaluator = evaluator(&store, 300);
        let trigger = evaluator
            .create_trigger(
                CreateTriggerRequest {
                    workflow_id: "W1".to_string(),
                    company_id: "acme".to_string(),
                    trigger_type: TriggerType::Manual,
                    trigger_name: "run now".to_string(),
                    conditions: Vec::new(),
                },
                "ops@acme.test",
            )
            .await
            .unwrap();
        let outcome = evaluator.handle(event(&trigger, Value::Null)).await.unwrap();
        assert!(outcome.executed);
    }

    #[tokio::test]
    async fn test_execution_finished_on_entry_is_audited() {
        let store = MemoryStore::new();
        let mut request = publish_request("W1", true);
        request.steps = vec![StepDefinition {
            kind: StepKind::Condition,
            logic: Some(ConditionLogic {
                rules: Vec::new(),
                default_next_step_id: None,
            }),
            ..action_step("route", None)
        }];
        VersionManager::new(store.clone(), store.clone(), 3)
            .publish(request)
            .await
            .unwrap();
        let evaluator = evaluator(&store, 300);
        let trigger = overdue_trigger(&evaluator).await;

        let outcome = evaluator
            .handle(event(&trigger, json!({"status": "overdue", "amount": 250})))
            .await
            .unwrap();
        let execution_id = outcome.execution_id.unwrap();
        let execution = store.get_execution(&execution_id).await.unwrap().unwrap();
        assert_eq!(execution.status, ExecutionStatus::Completed);
        assert_eq!(execution.steps_completed, vec!["route".to_string()]);

        let actions: Vec<AuditAction> = store
            .audit_entries()
            .into_iter()
            .filter(|e| e.entity_id == execution_id.to_string())
            .map(|e| e.action_type)
            .collect();
        assert_eq!(
            actions,
            vec![AuditAction::WorkflowTriggered, AuditAction::ExecutionCompleted]
        );
    }

    #[tokio::test]
    async fn test_running_execution_has_no_outcome_audit() {
        let store = MemoryStore::new();
        publish_active(&store, "W1").await;
        let evaluator = evaluator(&store, 300);
        let trigger = overdue_trigger(&evaluator).await;

        evaluator
            .handle(event(&trigger, json!({"status": "overdue", "amount": 250})))
            .await
            .unwrap();
        assert!(
            !store
                .audit_entries()
                .iter()
                .any(|e| e.action_type == AuditAction::ExecutionCompleted)
        );
    }

    #[tokio::test]
    async fn test_audit_failure_does_not_fail_trigger() {
        let store = MemoryStore::new();
        publish_active(&store, "W1").await;
        let evaluator = evaluator(&store, 300);
        let trigger = overdue_trigger(&evaluator).await;
        store.fail_audit.store(true, Ordering::SeqCst);

        let outcome = evaluator
            .handle(event(&trigger, json!({"status": "overdue", "amount": 250})))
            .await
            .unwrap();
        assert!(outcome.executed);
    }

    #[tokio::test]
    async fn test_create_trigger_validates_name() {
        let store = MemoryStore::new();
        let evaluator = evaluator(&store, 300);
        let err = evaluator
            .create_trigger(
                CreateTriggerRequest {
                    workflow_id: "W1".to_string(),
                    company_id: "acme".to_string(),
                    trigger_type: TriggerType::Webhook,
                    trigger_name: "  ".to_string(),
                    conditions: Vec::new(),
                },
                "ops@acme.test",
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
        assert!(evaluator.list_triggers("W1").await.unwrap().is_empty());
    }

    #[test]
    fn test_idempotency_key_buckets() {
        let id = Uuid::now_v7();
        let payload = json!({"b": 2, "a": 1});
        let t0 = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let t1 = DateTime::from_timestamp(1_700_000_010, 0).unwrap();
        let later = DateTime::from_timestamp(1_700_009_000, 0).unwrap();

        let k0 = idempotency_key(&id, &payload, t0, 300).unwrap();
        assert_eq!(k0.len(), 64);
        // 1_700_000_000 and 1_700_000_010 share a 300s bucket
        assert_eq!(Some(k0.clone()), idempotency_key(&id, &payload, t1, 300));
        assert_ne!(Some(k0.clone()), idempotency_key(&id, &payload, later, 300));
        assert_ne!(
            Some(k0),
            idempotency_key(&id, &json!({"a": 1, "b": 3}), t0, 300)
        );
        assert_eq!(idempotency_key(&id, &payload, t0, 0), None);
    }
}
