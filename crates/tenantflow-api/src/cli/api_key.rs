//! CLI API key subcommands.

use anyhow::{Result, bail};
use clap::Subcommand;
use console::style;

use crate::state::AppState;

#[derive(Subcommand)]
pub enum ApiKeyCommand {
    /// Create a key. The plaintext is printed once and never stored.
    Create {
        /// Owner email, recorded as the acting user for requests made with the key.
        #[arg(long)]
        email: String,

        /// Label for the key.
        #[arg(long, default_value = "default")]
        name: String,
    },
}

pub async fn handle_api_key_command(cmd: ApiKeyCommand, state: &AppState, json: bool) -> Result<()> {
    match cmd {
        ApiKeyCommand::Create { email, name } => {
            if !email.contains('@') {
                bail!("'{email}' does not look like an email address");
            }
            let key = state.api_keys.create(&email, &name).await?;

            if json {
                let out = serde_json::json!({
                    "owner_email": email,
                    "name": name,
                    "key": key,
                });
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                println!();
                println!(
                    "  {} API key created for {} (save this -- it won't be shown again):",
                    style("*").green().bold(),
                    style(&email).cyan()
                );
                println!();
                println!("  {}", style(&key).yellow().bold());
                println!();
            }
        }
    }
    Ok(())
}
