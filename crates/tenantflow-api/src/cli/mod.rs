//! CLI command definitions for the `tflow` binary.
//!
//! Uses clap derive macros for argument parsing.

pub mod api_key;
pub mod execution;
pub mod trigger;
pub mod version;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Multi-tenant workflow automation engine.
#[derive(Parser)]
#[command(name = "tflow", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Export tracing spans through OpenTelemetry (stdout exporter).
    #[arg(long, global = true)]
    pub otel: bool,

    /// Acting user recorded in audit entries for CLI changes.
    #[arg(long, global = true, env = "TENANTFLOW_USER", default_value = "cli")]
    pub user: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the REST API server.
    Serve {
        /// Port to listen on (defaults to the configured port).
        #[arg(short, long)]
        port: Option<u16>,

        /// Host to bind to (defaults to the configured host).
        #[arg(long)]
        host: Option<String>,
    },

    /// Publish a new workflow version from a YAML or JSON file.
    Publish {
        /// Path to the definition file.
        file: PathBuf,

        /// Make the new version active immediately.
        #[arg(long)]
        activate: bool,
    },

    /// List the versions of a workflow.
    Versions {
        /// Workflow id.
        workflow_id: String,
    },

    /// Make an existing version the active one.
    Activate {
        /// Workflow id.
        workflow_id: String,

        /// Version number to activate.
        version: i64,
    },

    /// Manage triggers.
    Trigger {
        #[command(subcommand)]
        action: trigger::TriggerCommand,
    },

    /// Fire a trigger with an event payload.
    Fire {
        /// Trigger UUID.
        trigger_id: String,

        /// Workflow the trigger belongs to.
        #[arg(long)]
        workflow: String,

        /// Company the event belongs to.
        #[arg(long)]
        company: String,

        /// JSON event payload.
        #[arg(long)]
        payload: Option<String>,
    },

    /// Show an execution.
    Show {
        /// Execution UUID.
        execution_id: String,
    },

    /// List recent executions of a workflow.
    Executions {
        /// Workflow id.
        workflow_id: String,

        /// Maximum number of executions to display.
        #[arg(long, default_value = "20")]
        limit: i64,
    },

    /// Fail executions that have made no progress for too long.
    Sweep {
        /// Idle threshold in seconds (defaults to the configured value).
        #[arg(long)]
        idle_secs: Option<u64>,
    },

    /// Manage API keys for the REST API.
    #[command(name = "api-key")]
    ApiKey {
        #[command(subcommand)]
        action: api_key::ApiKeyCommand,
    },
}
