//! Search command - find students by login.

use anyhow::Result;
use clap::Args;
use console::{Style, style};
use serde::Serialize;

use super::{Context, describe_api_error};

/// Arguments for the search command.
#[derive(Args, Debug)]
pub struct SearchArgs {
    /// Login to look for
    pub query: String,
}

#[derive(Debug, Serialize)]
struct SearchHit<'a> {
    id: u64,
    login: &'a str,
    displayname: &'a str,
    location: Option<&'a str>,
}

/// Run the search command.
pub async fn run(args: SearchArgs, ctx: &Context) -> Result<()> {
    let manager = ctx.token_manager()?;
    let client = ctx.api_client(&manager)?;
    let users = client
        .users()
        .search(&args.query)
        .await
        .map_err(describe_api_error)?;

    if ctx.json_output {
        let hits: Vec<SearchHit<'_>> = users
            .iter()
            .map(|u| SearchHit {
                id: u.id,
                login: &u.login,
                displayname: u.display_name(),
                location: u.location.as_deref(),
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&hits)?);
        return Ok(());
    }

    let dim = Style::new().dim();
    if users.is_empty() {
        println!("{}", dim.apply_to(format!("No student matches '{}'", args.query.trim())));
        return Ok(());
    }

    for user in &users {
        let location = match &user.location {
            Some(location) => style(location.as_str()).green().to_string(),
            None => dim.apply_to("-").to_string(),
        };
        println!("  {:<16} {:<32} {}", style(&user.login).bold(), user.display_name(), location);
    }
    Ok(())
}
