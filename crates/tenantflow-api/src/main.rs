//! tenantflow CLI and REST API entry point.
//!
//! Binary name: `tflow`
//!
//! Parses CLI arguments, initializes database and services, then dispatches
//! to the appropriate command handler or starts the REST API server.

mod cli;
mod http;
mod state;

use clap::Parser;

use cli::{Cli, Commands};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "warn",
        1 => "info,tenantflow=debug",
        _ => "trace",
    };
    tenantflow_observe::tracing_setup::init_tracing(filter, cli.otel)
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    let result = run(cli).await;
    tenantflow_observe::tracing_setup::shutdown_tracing();
    result
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let state = AppState::init().await?;
    let json = cli.json;
    let user = cli.user.as_str();

    match cli.command {
        Commands::Serve { port, host } => {
            let host = host.unwrap_or_else(|| state.config.server.host.clone());
            let port = port.unwrap_or(state.config.server.port);
            let addr = format!("{host}:{port}");
            let listener = tokio::net::TcpListener::bind(&addr).await?;

            if !cli.quiet {
                println!(
                    "  {} tenantflow API listening on {}",
                    console::style("*").green().bold(),
                    console::style(format!("http://{addr}")).cyan()
                );
                println!("  Data directory: {}", state.data_dir.display());
                println!("  {}", console::style("Press Ctrl+C to stop").dim());
            }
            tracing::info!(%addr, "server started");

            let router = http::router::build_router(state);
            axum::serve(listener, router)
                .with_graceful_shutdown(shutdown_signal())
                .await?;

            if !cli.quiet {
                println!("\n  Server stopped.");
            }
        }

        Commands::Publish { file, activate } => {
            cli::version::publish(&state, &file, activate, user, json).await?;
        }

        Commands::Versions { workflow_id } => {
            cli::version::list_versions(&state, &workflow_id, json).await?;
        }

        Commands::Activate {
            workflow_id,
            version,
        } => {
            cli::version::activate(&state, &workflow_id, version, user, json).await?;
        }

        Commands::Trigger { action } => {
            cli::trigger::handle_trigger_command(action, &state, user, json).await?;
        }

        Commands::Fire {
            trigger_id,
            workflow,
            company,
            payload,
        } => {
            cli::execution::fire(
                &state,
                &trigger_id,
                &workflow,
                &company,
                payload.as_deref(),
                json,
            )
            .await?;
        }

        Commands::Show { execution_id } => {
            cli::execution::show(&state, &execution_id, json).await?;
        }

        Commands::Executions { workflow_id, limit } => {
            cli::execution::list(&state, &workflow_id, limit, json).await?;
        }

        Commands::Sweep { idle_secs } => {
            cli::execution::sweep(&state, idle_secs, json).await?;
        }

        Commands::ApiKey { action } => {
            cli::api_key::handle_api_key_command(action, &state, json).await?;
        }
    }

    Ok(())
}

/// Wait for Ctrl+C or SIGTERM for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
