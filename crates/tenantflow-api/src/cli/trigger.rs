//! CLI trigger subcommands.

use anyhow::{Context, Result};
use clap::Subcommand;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;

use tenantflow_types::condition::Condition;
use tenantflow_types::workflow::{CreateTriggerRequest, TriggerType};

use crate::state::AppState;

/// Trigger management subcommands.
#[derive(Subcommand)]
pub enum TriggerCommand {
    /// Register a new trigger for a workflow.
    Create {
        /// Workflow id.
        #[arg(long)]
        workflow: String,

        /// Owning company.
        #[arg(long)]
        company: String,

        /// Trigger name.
        #[arg(long)]
        name: String,

        /// webhook, schedule, entity_change or manual.
        #[arg(long = "type", default_value = "webhook")]
        trigger_type: String,

        /// JSON array of conditions, all of which must hold.
        #[arg(long)]
        conditions: Option<String>,
    },

    /// List triggers of a workflow.
    List {
        /// Workflow id.
        workflow_id: String,
    },

    /// Deactivate a trigger.
    Deactivate {
        /// Trigger UUID.
        trigger_id: String,
    },
}

/// Handle a trigger subcommand.
pub async fn handle_trigger_command(
    cmd: TriggerCommand,
    state: &AppState,
    user: &str,
    json: bool,
) -> Result<()> {
    match cmd {
        TriggerCommand::Create {
            workflow,
            company,
            name,
            trigger_type,
            conditions,
        } => {
            let trigger_type: TriggerType = trigger_type
                .parse()
                .map_err(|e: String| anyhow::anyhow!(e))?;
            let conditions: Vec<Condition> = match conditions {
                Some(raw) => serde_json::from_str(&raw).context("Invalid conditions JSON")?,
                None => Vec::new(),
            };
            let trigger = state
                .trigger_evaluator
                .create_trigger(
                    CreateTriggerRequest {
                        workflow_id: workflow,
                        company_id: company,
                        trigger_type,
                        trigger_name: name,
                        conditions,
                    },
                    user,
                )
                .await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&trigger)?);
            } else {
                println!();
                println!(
                    "  {} Created {} trigger '{}'",
                    style("*").green().bold(),
                    trigger.trigger_type,
                    style(&trigger.trigger_name).cyan()
                );
                println!("  ID: {}", trigger.id);
                println!("  Conditions: {}", trigger.conditions.len());
                println!();
            }
        }

        TriggerCommand::List { workflow_id } => {
            let triggers = state.trigger_evaluator.list_triggers(&workflow_id).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&triggers)?);
                return Ok(());
            }
            if triggers.is_empty() {
                println!();
                println!("  No triggers for '{workflow_id}'.");
                println!();
                return Ok(());
            }

            let mut table = Table::new();
            table
                .load_preset(presets::UTF8_FULL_CONDENSED)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec![
                    Cell::new("ID").fg(Color::Cyan),
                    Cell::new("Name"),
                    Cell::new("Type"),
                    Cell::new("Active"),
                    Cell::new("Conditions"),
                ]);
            for t in &triggers {
                table.add_row(vec![
                    Cell::new(t.id),
                    Cell::new(&t.trigger_name),
                    Cell::new(t.trigger_type),
                    if t.is_active {
                        Cell::new("yes").fg(Color::Green)
                    } else {
                        Cell::new("no").fg(Color::DarkGrey)
                    },
                    Cell::new(t.conditions.len()),
                ]);
            }
            println!();
            println!("{table}");
            println!();
        }

        TriggerCommand::Deactivate { trigger_id } => {
            let id = trigger_id
                .parse::<uuid::Uuid>()
                .with_context(|| format!("Invalid trigger id '{trigger_id}'"))?;
            let trigger = state.trigger_evaluator.deactivate_trigger(&id, user).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&trigger)?);
            } else {
                println!();
                println!(
                    "  {} Trigger '{}' deactivated",
                    style("*").green().bold(),
                    style(&trigger.trigger_name).cyan()
                );
                println!();
            }
        }
    }

    Ok(())
}
