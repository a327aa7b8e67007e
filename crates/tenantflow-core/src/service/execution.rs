//! Execution state tracking.
//!
//! `ExecutionTracker` owns every transition of a `WorkflowExecution` after it
//! was started: completing steps, resolving approvals, failing, cancelling and
//! expiring. Condition steps never wait for a caller; they are resolved by the
//! rule engine as soon as the execution reaches them.
//!
//! All writes are compare-and-set on the execution's `revision`, so two
//! callers racing on the same execution cannot both win.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use uuid::Uuid;

use tenantflow_types::audit::{AuditAction, AuditEntry};
use tenantflow_types::error::{EngineError, RepositoryError};
use tenantflow_types::execution::{
    ApprovalDecision, ExecutionStatus, PendingApproval, WorkflowExecution,
};
use tenantflow_types::workflow::{StepDefinition, StepKind, WorkflowVersion};

use crate::engine::condition::ConditionEvaluator;
use crate::engine::rules::RuleEngine;
use crate::repository::audit::AuditLogger;
use crate::repository::execution::ExecutionRepository;
use crate::repository::version::VersionRepository;
use crate::service::audit::{record, record_outcome};

// ---------------------------------------------------------------------------
// StepHandler port
// ---------------------------------------------------------------------------

/// Errors a step handler can report.
#[derive(Debug, thiserror::Error)]
pub enum StepError {
    /// The side effect was attempted and failed.
    #[error("step failed: {0}")]
    Failed(String),

    /// The handler does not know how to run this step.
    #[error("unsupported step: {0}")]
    Unsupported(String),
}

/// Performs the side effect of an `action` step (send an email, render a
/// PDF, call an LLM...) and returns its output, which is merged into the
/// execution's variables.
pub trait StepHandler: Send + Sync {
    fn run(
        &self,
        execution: &WorkflowExecution,
        step: &StepDefinition,
    ) -> impl std::future::Future<Output = Result<Value, StepError>> + Send;
}

// ---------------------------------------------------------------------------
// Step advancement
// ---------------------------------------------------------------------------

/// Move `execution` onto `next`, resolving condition steps on the way.
///
/// Stops at the first action step (running), approval step (awaiting
/// approval), the end of the graph (completed) or an unknown step id
/// (failed). Returns the ids of condition steps completed on the way.
pub(crate) fn enter_step<E: ConditionEvaluator>(
    rules: &RuleEngine<E>,
    version: &WorkflowVersion,
    execution: &mut WorkflowExecution,
    next: Option<String>,
    now: DateTime<Utc>,
) -> Vec<String> {
    let mut auto_completed = Vec::new();
    let mut next = next;

    loop {
        let Some(step_id) = next.take() else {
            execution.current_step_id = None;
            if execution.pending_approvals.is_empty() {
                execution.status = ExecutionStatus::Completed;
                execution.completed_at = Some(now);
            } else {
                execution.status = ExecutionStatus::AwaitingApproval;
            }
            return auto_completed;
        };

        let Some(step) = version.step(&step_id) else {
            mark_failed(
                execution,
                format!(
                    "step '{step_id}' not found in version {} of workflow '{}'",
                    version.version_number, version.workflow_id
                ),
                now,
            );
            return auto_completed;
        };
        execution.current_step_id = Some(step.id.clone());

        match step.kind {
            StepKind::Action => {
                execution.status = ExecutionStatus::Running;
                return auto_completed;
            }
            StepKind::Approval => {
                execution.pending_approvals.push(PendingApproval {
                    id: Uuid::now_v7(),
                    step_id: step.id.clone(),
                    requested_at: now,
                    prompt: step
                        .config
                        .get("prompt")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                });
                execution.status = ExecutionStatus::AwaitingApproval;
                return auto_completed;
            }
            StepKind::Condition => {
                // Condition-only cycles never block, so bound the walk.
                if auto_completed.len() >= version.steps.len() {
                    mark_failed(
                        execution,
                        format!("condition steps loop at '{}'", step.id),
                        now,
                    );
                    return auto_completed;
                }
                let logic = step.logic.clone().unwrap_or_default();
                let resolution = rules.resolve(&logic, &execution.variables);
                tracing::debug!(
                    execution_id = %execution.id,
                    step_id = %step.id,
                    matched_rule = ?resolution.matched_rule,
                    next_step_id = ?resolution.next_step_id,
                    "resolved condition step"
                );
                execution.steps_completed.push(step.id.clone());
                auto_completed.push(step.id.clone());
                next = resolution.next_step_id;
            }
        }
    }
}

fn mark_failed(execution: &mut WorkflowExecution, error: String, now: DateTime<Utc>) {
    execution.status = ExecutionStatus::Failed;
    execution.error = Some(error);
    execution.completed_at = Some(now);
}

/// Merge a step's output into the execution variables.
///
/// Object outputs are merged key by key; any other non-null output is stored
/// under the step id.
fn merge_output(variables: &mut Value, step_id: &str, output: Value) {
    if !variables.is_object() {
        *variables = Value::Object(serde_json::Map::new());
    }
    let Some(vars) = variables.as_object_mut() else {
        return;
    };
    match output {
        Value::Null => {}
        Value::Object(map) => vars.extend(map),
        other => {
            vars.insert(step_id.to_string(), other);
        }
    }
}

// ---------------------------------------------------------------------------
// ExecutionTracker
// ---------------------------------------------------------------------------

/// Service driving the execution state machine.
pub struct ExecutionTracker<X, V, A, E>
where
    X: ExecutionRepository,
    V: VersionRepository,
    A: AuditLogger,
    E: ConditionEvaluator,
{
    executions: X,
    versions: V,
    audit: A,
    rules: RuleEngine<E>,
    max_steps_per_run: u32,
}

impl<X, V, A, E> ExecutionTracker<X, V, A, E>
where
    X: ExecutionRepository,
    V: VersionRepository,
    A: AuditLogger,
    E: ConditionEvaluator,
{
    /// Create a new ExecutionTracker.
    ///
    /// - `max_steps_per_run`: bound on steps driven by one `run_until_blocked`
    pub fn new(executions: X, versions: V, audit: A, evaluator: E, max_steps_per_run: u32) -> Self {
        Self {
            executions,
            versions,
            audit,
            rules: RuleEngine::new(evaluator),
            max_steps_per_run,
        }
    }

    /// Get an execution by id.
    pub async fn get(&self, id: &Uuid) -> Result<WorkflowExecution, EngineError> {
        self.executions
            .get_execution(id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("execution {id}")))
    }

    /// Most recent executions of a workflow.
    pub async fn list(&self, workflow_id: &str, limit: i64) -> Result<Vec<WorkflowExecution>, EngineError> {
        Ok(self.executions.list_executions(workflow_id, limit).await?)
    }

    async fn version_of(&self, execution: &WorkflowExecution) -> Result<WorkflowVersion, EngineError> {
        self.versions
            .get_version(&execution.version_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("version {}", execution.version_id)))
    }

    /// Persist `execution` over the revision it was loaded at.
    async fn save(&self, execution: &mut WorkflowExecution, now: DateTime<Utc>) -> Result<(), EngineError> {
        let expected = execution.revision;
        execution.revision += 1;
        execution.updated_at = now;
        match self.executions.update_execution(execution, expected).await {
            Ok(()) => Ok(()),
            Err(RepositoryError::Conflict(msg)) => Err(EngineError::Conflict(format!(
                "execution {} was modified concurrently: {msg}",
                execution.id
            ))),
            Err(e) => Err(e.into()),
        }
    }

    /// Mark the current step done and advance.
    ///
    /// Only accepted while the execution is running and `step_id` is its
    /// current step.
    pub async fn complete_step(
        &self,
        execution_id: &Uuid,
        step_id: &str,
        output: Value,
    ) -> Result<WorkflowExecution, EngineError> {
        let mut execution = self.get(execution_id).await?;
        if execution.status != ExecutionStatus::Running {
            return Err(EngineError::InvalidTransition {
                from: execution.status.to_string(),
                action: "complete step of".to_string(),
            });
        }
        if execution.current_step_id.as_deref() != Some(step_id) {
            return Err(EngineError::Validation(format!(
                "step '{step_id}' is not the current step (current: {})",
                execution.current_step_id.as_deref().unwrap_or("none")
            )));
        }

        let version = self.version_of(&execution).await?;
        let now = Utc::now();
        let step = version.step(step_id).cloned();

        execution.steps_completed.push(step_id.to_string());
        merge_output(&mut execution.variables, step_id, output);

        let auto_completed = match step {
            Some(step) => {
                let next = match (&step.kind, &step.logic) {
                    (StepKind::Condition, Some(logic)) => {
                        self.rules.resolve(logic, &execution.variables).next_step_id
                    }
                    _ => step.next_step_id.clone(),
                };
                enter_step(&self.rules, &version, &mut execution, next, now)
            }
            None => {
                mark_failed(
                    &mut execution,
                    format!("step '{step_id}' not found in version {}", version.version_number),
                    now,
                );
                Vec::new()
            }
        };

        self.save(&mut execution, now).await?;
        tracing::info!(
            execution_id = %execution.id,
            step_id,
            status = %execution.status,
            next_step_id = ?execution.current_step_id,
            "completed step"
        );

        record(
            &self.audit,
            AuditEntry::new(
                AuditAction::ExecutionStepCompleted,
                execution.id.to_string(),
                &execution.company_id,
                "system",
                format!("Completed step '{step_id}'"),
            )
            .with_metadata(json!({
                "workflow_id": execution.workflow_id,
                "step_id": step_id,
                "auto_completed": auto_completed,
                "next_step_id": execution.current_step_id,
            })),
        )
        .await;
        record_outcome(&self.audit, &execution, "system").await;

        Ok(execution)
    }

    /// Approve or reject a pending approval.
    ///
    /// Approving records the approval step as completed and advances past it;
    /// rejecting fails the execution.
    pub async fn resolve_approval(
        &self,
        execution_id: &Uuid,
        approval_id: &Uuid,
        decision: ApprovalDecision,
        actor: &str,
        comment: Option<String>,
    ) -> Result<WorkflowExecution, EngineError> {
        let mut execution = self.get(execution_id).await?;
        if execution.status != ExecutionStatus::AwaitingApproval {
            return Err(EngineError::InvalidTransition {
                from: execution.status.to_string(),
                action: "resolve approval on".to_string(),
            });
        }
        let index = execution
            .pending_approvals
            .iter()
            .position(|a| a.id == *approval_id)
            .ok_or_else(|| EngineError::NotFound(format!("approval {approval_id}")))?;

        let now = Utc::now();
        let approval = execution.pending_approvals.remove(index);

        match decision {
            ApprovalDecision::Approve => {
                let version = self.version_of(&execution).await?;
                execution.steps_completed.push(approval.step_id.clone());
                let next = version
                    .step(&approval.step_id)
                    .and_then(|s| s.next_step_id.clone());
                enter_step(&self.rules, &version, &mut execution, next, now);
            }
            ApprovalDecision::Reject => {
                let reason = match &comment {
                    Some(c) => format!("approval '{}' rejected by {actor}: {c}", approval.step_id),
                    None => format!("approval '{}' rejected by {actor}", approval.step_id),
                };
                mark_failed(&mut execution, reason, now);
            }
        }

        self.save(&mut execution, now).await?;
        tracing::info!(
            execution_id = %execution.id,
            step_id = %approval.step_id,
            %decision,
            status = %execution.status,
            "resolved approval"
        );

        record(
            &self.audit,
            AuditEntry::new(
                AuditAction::ApprovalResolved,
                execution.id.to_string(),
                &execution.company_id,
                actor,
                format!("Approval for step '{}': {decision}", approval.step_id),
            )
            .with_metadata(json!({
                "workflow_id": execution.workflow_id,
                "approval_id": approval.id,
                "step_id": approval.step_id,
                "decision": decision,
                "comment": comment,
            })),
        )
        .await;
        record_outcome(&self.audit, &execution, actor).await;

        Ok(execution)
    }

    /// Fail a non-terminal execution. No automatic retry.
    pub async fn fail(
        &self,
        execution_id: &Uuid,
        error: &str,
        actor: &str,
    ) -> Result<WorkflowExecution, EngineError> {
        let mut execution = self.get(execution_id).await?;
        if execution.status.is_terminal() {
            return Err(EngineError::InvalidTransition {
                from: execution.status.to_string(),
                action: "fail".to_string(),
            });
        }
        let now = Utc::now();
        mark_failed(&mut execution, error.to_string(), now);
        self.save(&mut execution, now).await?;
        tracing::warn!(execution_id = %execution.id, error, "execution failed");
        record_outcome(&self.audit, &execution, actor).await;
        Ok(execution)
    }

    /// Cancel a non-terminal execution.
    pub async fn cancel(
        &self,
        execution_id: &Uuid,
        reason: Option<&str>,
        actor: &str,
    ) -> Result<WorkflowExecution, EngineError> {
        let mut execution = self.get(execution_id).await?;
        if execution.status.is_terminal() {
            return Err(EngineError::InvalidTransition {
                from: execution.status.to_string(),
                action: "cancel".to_string(),
            });
        }
        let now = Utc::now();
        execution.status = ExecutionStatus::Cancelled;
        execution.error = reason.map(str::to_string);
        execution.completed_at = Some(now);
        execution.pending_approvals.clear();
        self.save(&mut execution, now).await?;
        tracing::info!(execution_id = %execution.id, "execution cancelled");
        record_outcome(&self.audit, &execution, actor).await;
        Ok(execution)
    }

    /// Fail every non-terminal execution idle for longer than `max_idle`.
    ///
    /// Executions that change while being swept are skipped. Returns the ids
    /// of the executions that were expired.
    pub async fn expire_stale(&self, max_idle: Duration) -> Result<Vec<Uuid>, EngineError> {
        let now = Utc::now();
        let window = chrono::Duration::from_std(max_idle)
            .map_err(|e| EngineError::Validation(format!("invalid idle window: {e}")))?;
        let stale = self.executions.list_stale(now - window).await?;

        let mut expired = Vec::with_capacity(stale.len());
        for mut execution in stale {
            mark_failed(
                &mut execution,
                format!("timed out after {}s without progress", max_idle.as_secs()),
                now,
            );
            match self.save(&mut execution, now).await {
                Ok(()) => {
                    record_outcome(&self.audit, &execution, "system").await;
                    expired.push(execution.id);
                }
                Err(EngineError::Conflict(msg)) => {
                    tracing::debug!(execution_id = %execution.id, reason = %msg, "skipped stale execution");
                }
                Err(e) => return Err(e),
            }
        }

        if !expired.is_empty() {
            tracing::info!(count = expired.len(), "expired stale executions");
        }
        Ok(expired)
    }

    /// Drive action steps through `handler` until the execution blocks on an
    /// approval, terminates, or exceeds `max_steps_per_run` (which fails it).
    pub async fn run_until_blocked<H: StepHandler>(
        &self,
        execution_id: &Uuid,
        handler: &H,
    ) -> Result<WorkflowExecution, EngineError> {
        for _ in 0..self.max_steps_per_run {
            let execution = self.get(execution_id).await?;
            if execution.status != ExecutionStatus::Running {
                return Ok(execution);
            }
            let Some(step_id) = execution.current_step_id.clone() else {
                return Ok(execution);
            };
            let version = self.version_of(&execution).await?;
            let Some(step) = version.step(&step_id) else {
                return self
                    .fail(execution_id, &format!("step '{step_id}' not found"), "system")
                    .await;
            };

            match handler.run(&execution, step).await {
                Ok(output) => {
                    self.complete_step(execution_id, &step_id, output).await?;
                }
                Err(e) => {
                    return self
                        .fail(execution_id, &format!("step '{step_id}': {e}"), "system")
                        .await;
                }
            }
        }

        let execution = self.get(execution_id).await?;
        if execution.status.is_terminal() || execution.status == ExecutionStatus::AwaitingApproval {
            return Ok(execution);
        }
        self.fail(
            execution_id,
            &format!("exceeded {} steps in a single run", self.max_steps_per_run),
            "system",
        )
        .await
    }
}
