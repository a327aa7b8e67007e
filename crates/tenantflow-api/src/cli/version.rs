//! CLI workflow version subcommands: publish, versions, activate.

use std::path::Path;

use anyhow::{Context, Result, bail};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;

use tenantflow_types::workflow::{PublishRequest, WorkflowVersion};

use crate::state::AppState;

/// Parse a definition file. `.json` files are read as JSON, anything else
/// as YAML.
pub fn load_definition(path: &Path, content: &str) -> Result<PublishRequest> {
    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));

    if is_json {
        serde_json::from_str(content)
            .with_context(|| format!("Failed to parse {} as JSON", path.display()))
    } else {
        serde_yaml_ng::from_str(content)
            .with_context(|| format!("Failed to parse {} as YAML", path.display()))
    }
}

pub async fn publish(
    state: &AppState,
    file: &Path,
    activate: bool,
    user: &str,
    json: bool,
) -> Result<()> {
    let content = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let mut request = load_definition(file, &content)?;
    request.activate |= activate;
    if request.created_by.trim().is_empty() {
        request.created_by = user.to_string();
    }

    let version = state.version_manager.publish(request).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&version)?);
    } else {
        println!();
        println!(
            "  {} Published '{}' version {}",
            style("*").green().bold(),
            style(&version.workflow_id).cyan(),
            version.version_number
        );
        println!("  ID: {}", version.id);
        println!("  Steps: {}", version.steps.len());
        println!(
            "  Active: {}",
            if version.is_active {
                style("yes").green()
            } else {
                style("no").dim()
            }
        );
        println!();
    }

    Ok(())
}

pub async fn list_versions(state: &AppState, workflow_id: &str, json: bool) -> Result<()> {
    let versions = state.version_manager.list_versions(workflow_id).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&versions)?);
        return Ok(());
    }

    if versions.is_empty() {
        println!();
        println!("  No versions of '{workflow_id}'.");
        println!(
            "  Publish one with: {}",
            style("tflow publish <file.yaml>").dim()
        );
        println!();
        return Ok(());
    }

    println!();
    println!("{}", version_table(&versions));
    println!();
    Ok(())
}

fn version_table(versions: &[WorkflowVersion]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Version").fg(Color::Cyan),
            Cell::new("Name"),
            Cell::new("Active"),
            Cell::new("Steps"),
            Cell::new("Executions"),
            Cell::new("Created by"),
            Cell::new("Created"),
        ]);

    for v in versions {
        let active = if v.is_active {
            Cell::new("yes").fg(Color::Green)
        } else {
            Cell::new("")
        };
        table.add_row(vec![
            Cell::new(v.version_number),
            Cell::new(&v.name),
            active,
            Cell::new(v.steps.len()),
            Cell::new(v.total_executions),
            Cell::new(&v.created_by),
            Cell::new(v.created_at.format("%Y-%m-%d %H:%M").to_string()),
        ]);
    }
    table
}

pub async fn activate(
    state: &AppState,
    workflow_id: &str,
    version_number: i64,
    user: &str,
    json: bool,
) -> Result<()> {
    if version_number < 1 {
        bail!("Version numbers start at 1");
    }
    let version = state
        .version_manager
        .activate(workflow_id, version_number, user)
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&version)?);
    } else {
        println!();
        println!(
            "  {} '{}' version {} is now active",
            style("*").green().bold(),
            style(&version.workflow_id).cyan(),
            version.version_number
        );
        println!();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tenantflow_types::workflow::StepKind;

    #[test]
    fn test_load_yaml_definition() {
        let yaml = r#"
workflow_id: receipts
company_id: acme
name: Receipts
activate: true
steps:
  - id: review
    kind: approval
    next_step_id: send
  - id: send
"#;
        let request = load_definition(Path::new("receipts.yaml"), yaml).unwrap();
        assert_eq!(request.workflow_id, "receipts");
        assert!(request.activate);
        assert_eq!(request.steps.len(), 2);
        assert_eq!(request.steps[0].kind, StepKind::Approval);
        assert_eq!(request.steps[1].kind, StepKind::Action);
        assert!(request.created_by.is_empty());
    }

    #[test]
    fn test_load_json_definition() {
        let json = r#"{"workflow_id":"receipts","company_id":"acme","name":"Receipts","steps":[{"id":"send"}]}"#;
        let request = load_definition(Path::new("receipts.JSON"), json).unwrap();
        assert!(!request.activate);
        assert_eq!(request.steps[0].id, "send");
    }

    #[test]
    fn test_load_definition_reports_parse_errors() {
        let err = load_definition(Path::new("bad.json"), "{").unwrap_err();
        assert!(err.to_string().contains("bad.json"));
    }
}
