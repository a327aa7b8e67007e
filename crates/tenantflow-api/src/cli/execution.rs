//! CLI execution subcommands: fire, show, executions, sweep.

use std::time::Duration;

use anyhow::{Context, Result};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use serde_json::Value;

use tenantflow_types::execution::{ExecutionStatus, TriggerRequest, WorkflowExecution};

use crate::state::AppState;

fn status_color(status: ExecutionStatus) -> Color {
    match status {
        ExecutionStatus::Running => Color::Cyan,
        ExecutionStatus::AwaitingApproval => Color::Yellow,
        ExecutionStatus::Completed => Color::Green,
        ExecutionStatus::Failed => Color::Red,
        ExecutionStatus::Cancelled => Color::DarkGrey,
    }
}

pub async fn fire(
    state: &AppState,
    trigger_id: &str,
    workflow_id: &str,
    company_id: &str,
    payload: Option<&str>,
    json: bool,
) -> Result<()> {
    let trigger_id = trigger_id
        .parse::<uuid::Uuid>()
        .with_context(|| format!("Invalid trigger id '{trigger_id}'"))?;
    let payload: Value = match payload {
        Some(raw) => serde_json::from_str(raw).context("Invalid JSON payload")?,
        None => Value::Object(serde_json::Map::new()),
    };

    let outcome = state
        .trigger_evaluator
        .handle(TriggerRequest {
            workflow_id: workflow_id.to_string(),
            trigger_id,
            company_id: company_id.to_string(),
            payload,
        })
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }

    println!();
    match (outcome.executed, outcome.execution_id) {
        (true, Some(id)) => {
            println!(
                "  {} Started execution of '{}'",
                style("*").green().bold(),
                style(workflow_id).cyan()
            );
            println!("  Execution ID: {id}");
            println!();
            println!(
                "  Inspect it with: {}",
                style(format!("tflow show {id}")).dim()
            );
        }
        _ => {
            println!(
                "  {} Not executed: {}",
                style("-").yellow().bold(),
                outcome.reason.as_deref().unwrap_or("unknown reason")
            );
            if let Some(id) = outcome.execution_id {
                println!("  Existing execution: {id}");
            }
        }
    }
    println!();
    Ok(())
}

pub async fn show(state: &AppState, execution_id: &str, json: bool) -> Result<()> {
    let id = execution_id
        .parse::<uuid::Uuid>()
        .with_context(|| format!("Invalid execution id '{execution_id}'"))?;
    let execution = state.execution_tracker.get(&id).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&execution)?);
        return Ok(());
    }

    print_execution(&execution)?;
    Ok(())
}

fn print_execution(e: &WorkflowExecution) -> Result<()> {
    println!();
    println!(
        "  {} Execution {}",
        style("*").bold(),
        style(e.id).cyan()
    );
    println!(
        "  Workflow: {} (version {})",
        e.workflow_id, e.version_number
    );
    println!("  Company: {}", e.company_id);
    println!("  Status: {}", style(e.status).bold());
    println!("  Started: {} by {}", e.started_at.to_rfc3339(), e.started_by);
    if let Some(step) = &e.current_step_id {
        println!("  Current step: {}", style(step).cyan());
    }
    if !e.steps_completed.is_empty() {
        println!("  Completed steps: {}", e.steps_completed.join(" -> "));
    }
    for approval in &e.pending_approvals {
        println!(
            "  {} Awaiting approval {} on step '{}'",
            style("!").yellow().bold(),
            approval.id,
            approval.step_id
        );
    }
    if let Some(error) = &e.error {
        println!("  Error: {}", style(error).red());
    }
    println!("  Variables:");
    for line in serde_json::to_string_pretty(&e.variables)?.lines() {
        println!("    {line}");
    }
    println!();
    Ok(())
}

pub async fn list(state: &AppState, workflow_id: &str, limit: i64, json: bool) -> Result<()> {
    let executions = state
        .execution_tracker
        .list(workflow_id, limit.max(1))
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&executions)?);
        return Ok(());
    }
    if executions.is_empty() {
        println!();
        println!("  No executions of '{workflow_id}'.");
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("ID").fg(Color::Cyan),
            Cell::new("Version"),
            Cell::new("Status"),
            Cell::new("Current step"),
            Cell::new("Started"),
        ]);
    for e in &executions {
        table.add_row(vec![
            Cell::new(e.id),
            Cell::new(e.version_number),
            Cell::new(e.status).fg(status_color(e.status)),
            Cell::new(e.current_step_id.as_deref().unwrap_or("-")),
            Cell::new(e.started_at.format("%Y-%m-%d %H:%M:%S").to_string()),
        ]);
    }
    println!();
    println!("{table}");
    println!();
    Ok(())
}

pub async fn sweep(state: &AppState, idle_secs: Option<u64>, json: bool) -> Result<()> {
    let idle = Duration::from_secs(idle_secs.unwrap_or(state.config.stale_execution_secs));
    let expired = state.execution_tracker.expire_stale(idle).await?;

    if json {
        let out = serde_json::json!({
            "idle_secs": idle.as_secs(),
            "expired": expired,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!();
        println!(
            "  {} Expired {} execution(s) idle for more than {}s",
            style("*").green().bold(),
            expired.len(),
            idle.as_secs()
        );
        for id in &expired {
            println!("    {id}");
        }
        println!();
    }
    Ok(())
}
