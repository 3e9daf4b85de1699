//! Status command - shows whether a usable session exists.

use anyhow::Result;
use clap::Args;
use console::{Style, style};
use intra_auth::AuthState;
use serde::Serialize;

use super::Context;

/// Arguments for the status command.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Refresh the access token if it is about to expire
    #[arg(long)]
    pub refresh: bool,
}

/// Status response for JSON output.
#[derive(Debug, Serialize)]
struct StatusOutput {
    logged_in: bool,
    state: &'static str,
    expires_at: Option<String>,
    expires_in_secs: Option<u64>,
    needs_refresh: Option<bool>,
    data_dir: String,
}

fn state_label(state: AuthState) -> &'static str {
    match state {
        AuthState::LoggedIn => "logged-in",
        AuthState::LoggedOut => "logged-out",
        AuthState::Stale => "stale",
    }
}

/// Run the status command.
pub async fn run(args: StatusArgs, ctx: &Context) -> Result<()> {
    let manager = ctx.token_manager()?;

    if args.refresh {
        // Runs the refresh if one is due; the state below reflects the outcome.
        manager.get_valid_access_token().await;
    }

    let state = manager.current_state().await;
    let info = manager.token_info().await?;
    let data_dir = ctx.data_dir();

    if ctx.json_output {
        let output = StatusOutput {
            logged_in: state == AuthState::LoggedIn,
            state: state_label(state),
            expires_at: info.as_ref().map(|i| i.expires_at.to_rfc3339()),
            expires_in_secs: info.as_ref().map(|i| i.expires_in_secs),
            needs_refresh: info.as_ref().map(|i| i.needs_refresh),
            data_dir: data_dir.display().to_string(),
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    let green = Style::new().green();
    let yellow = Style::new().yellow();
    let red = Style::new().red();
    let dim = Style::new().dim();

    println!();
    println!("{}", style("intra session").bold());
    println!("{}", dim.apply_to("─".repeat(40)));
    println!();
    match state {
        AuthState::LoggedIn => println!("  {} {}", dim.apply_to("Status:"), green.apply_to("● logged in")),
        AuthState::Stale => println!(
            "  {} {}",
            dim.apply_to("Status:"),
            yellow.apply_to("● session could not be refreshed")
        ),
        AuthState::LoggedOut => println!("  {} {}", dim.apply_to("Status:"), red.apply_to("● logged out")),
    }
    if let Some(info) = &info {
        println!("  {} {}", dim.apply_to("Expires:"), info.expires_in_display());
        if ctx.verbose {
            println!("  {} {}", dim.apply_to("Expires at:"), info.expires_at.to_rfc3339());
        }
    }
    println!("  {} {}", dim.apply_to("Data:"), data_dir.display());
    println!();
    if state != AuthState::LoggedIn {
        println!("  {}", dim.apply_to("Log in with: intra login"));
        println!();
    }

    Ok(())
}
