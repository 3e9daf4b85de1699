//! Login and logout commands.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use clap::Args;
use console::style;
use intra_auth::{AuthorizationOutcome, AuthorizationSession, Authorizer, CallbackParams};
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};

use super::Context;

/// Arguments for the login command.
#[derive(Args, Debug)]
pub struct LoginArgs {
    /// Print the login URL and paste the redirect back instead of
    /// listening on the redirect URI
    #[arg(long)]
    pub no_browser: bool,

    /// Log in again even if the stored session is still valid
    #[arg(short, long)]
    pub force: bool,
}

#[derive(Debug, Serialize)]
struct LoginOutput {
    logged_in: bool,
    expires_at: Option<String>,
}

/// Run the login command.
pub async fn run_login(args: LoginArgs, ctx: &Context) -> Result<()> {
    let authorizer: Arc<dyn Authorizer> = if args.no_browser {
        Arc::new(PasteAuthorizer)
    } else {
        Arc::new(ctx.loopback_authorizer())
    };
    let manager = ctx.token_manager_with(authorizer)?;

    if !args.force && manager.is_logged_in().await {
        if !ctx.json_output {
            println!("Already logged in.");
            println!("Run 'intra login --force' to log in again.");
            return Ok(());
        }
    } else if !manager.begin_interactive_login().await {
        anyhow::bail!("Login failed or was cancelled. Run with --verbose for details.");
    }

    let info = manager.token_info().await?;
    if ctx.json_output {
        let output = LoginOutput {
            logged_in: true,
            expires_at: info.map(|i| i.expires_at.to_rfc3339()),
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("{}", style("Logged in.").green().bold());
        if let Some(info) = info {
            println!("Access token expires in {}", info.expires_in_display());
        }
    }
    Ok(())
}

/// Run the logout command.
pub async fn run_logout(ctx: &Context) -> Result<()> {
    let manager = ctx.token_manager()?;
    manager.logout().await;

    if ctx.json_output {
        println!("{}", serde_json::json!({ "logged_in": false }));
    } else {
        println!("Logged out.");
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Paste authorizer
// ─────────────────────────────────────────────────────────────────────────────

/// Prints the authorization URL and reads the redirect URL (or bare code)
/// from stdin. For machines where the redirect cannot reach a local listener.
#[derive(Debug)]
pub struct PasteAuthorizer;

#[async_trait]
impl Authorizer for PasteAuthorizer {
    async fn authorize(
        &self,
        session: &AuthorizationSession,
    ) -> intra_auth::Result<AuthorizationOutcome> {
        eprintln!("Open this URL in your browser and log in:");
        eprintln!();
        eprintln!("  {}", session.authorization_url());
        eprintln!();
        eprintln!("Then paste the full address you were redirected to (or just the code).");
        eprint!("> ");

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let input = lines
            .next_line()
            .await
            .map_err(|e| intra_auth::AuthError::InvalidCallback(e.to_string()))?
            .unwrap_or_default();

        paste_outcome(&input, &session.state)
    }
}

fn paste_outcome(input: &str, state: &str) -> intra_auth::Result<AuthorizationOutcome> {
    if input.trim().is_empty() {
        return Ok(AuthorizationOutcome::Cancelled);
    }
    CallbackParams::from_pasted(input, state).resolve(state)
}
