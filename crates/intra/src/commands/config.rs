//! Config command - configuration management.

use anyhow::Result;
use clap::{Args, Subcommand};
use console::Style;
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};

use super::Context;

/// Arguments for the config command.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Show the effective configuration (secrets masked)
    Show,

    /// Show which config files are searched and which were loaded
    Path,

    /// Store the OAuth client secret in the system keyring (read from stdin)
    SetSecret,

    /// Remove the OAuth client secret from the system keyring
    DeleteSecret,
}

/// Run the config command.
pub async fn run(args: ConfigArgs, ctx: &Context) -> Result<()> {
    match args.command {
        ConfigCommand::Show => cmd_show(ctx),
        ConfigCommand::Path => cmd_path(ctx),
        ConfigCommand::SetSecret => cmd_set_secret().await,
        ConfigCommand::DeleteSecret => cmd_delete_secret(),
    }
}

#[derive(Debug, Serialize)]
struct SourceOutput {
    layer: String,
    path: String,
    loaded: bool,
}

fn cmd_show(ctx: &Context) -> Result<()> {
    let config = ctx.config();
    let secret = intra_config::resolve_client_secret(config.oauth.client_secret.as_deref());

    if ctx.json_output {
        let output = serde_json::json!({
            "config": config.redacted(),
            "client_secret_source": secret.as_ref().map(|s| s.source.to_string()),
            "data_dir": ctx.data_dir().display().to_string(),
            "warnings": ctx.loaded.warnings,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("# intra configuration\n");

    let sources = ctx.loaded.loaded_from();
    if sources.is_empty() {
        println!("No config files loaded (using defaults and environment)\n");
    } else {
        println!("Config files:");
        for source in &sources {
            println!("  {}", source.display());
        }
        println!();
    }

    match &secret {
        Some(secret) => println!("Client secret: from {}", secret.source),
        None => println!(
            "Client secret: not set (keyring, {} or [oauth] client_secret)",
            intra_config::CLIENT_SECRET_ENV
        ),
    }
    println!("Data directory: {}\n", ctx.data_dir().display());

    for warning in &ctx.loaded.warnings {
        println!("warning: {}", warning);
    }
    if !ctx.loaded.warnings.is_empty() {
        println!();
    }

    print!("{}", config.redacted().to_toml()?);
    Ok(())
}

fn cmd_path(ctx: &Context) -> Result<()> {
    let sources = &ctx.loaded.sources;

    if ctx.json_output {
        let rows: Vec<SourceOutput> = sources
            .iter()
            .map(|source| SourceOutput {
                layer: source.layer.to_string(),
                path: source.path.display().to_string(),
                loaded: source.loaded,
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    let found = Style::new().green();
    let missing = Style::new().dim();
    println!("Searched, lowest precedence first:");
    for source in sources {
        let status = if source.loaded {
            found.apply_to("loaded")
        } else {
            missing.apply_to("absent")
        };
        println!("  {:<8} {}  {}", source.layer, source.path.display(), status);
    }
    println!("Then {} overrides.", missing.apply_to("INTRA_* environment"));
    Ok(())
}

async fn cmd_set_secret() -> Result<()> {
    eprint!("OAuth client secret: ");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let secret = lines.next_line().await?.unwrap_or_default();
    let secret = secret.trim();
    if secret.is_empty() {
        anyhow::bail!("No secret provided");
    }

    intra_config::secrets::store_client_secret(secret)?;
    println!("Client secret stored in the system keyring.");
    Ok(())
}

fn cmd_delete_secret() -> Result<()> {
    intra_config::secrets::delete_client_secret()?;
    println!("Client secret removed from the system keyring.");
    Ok(())
}
