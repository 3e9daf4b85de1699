//! intra - the 42 intranet from the command line.
//!
//! Main entry point for the intra CLI.

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

use commands::{auth, config, profile, search, status};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// intra - the 42 intranet from the command line
#[derive(Parser)]
#[command(name = "intra")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output as JSON (for scripting)
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Log in to the 42 intranet through your browser
    Login(auth::LoginArgs),

    /// Forget the stored session
    Logout,

    /// Show whether you are logged in and when the session expires
    Status(status::StatusArgs),

    /// Show your own profile
    Me(profile::MeArgs),

    /// Show a student's profile
    User(profile::UserArgs),

    /// Search students by login
    Search(search::SearchArgs),

    /// Configuration management
    Config(config::ConfigArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let loaded = intra_config::load_config();
    let log_dir = loaded.config.paths.logs_dir();

    // Initialize tracing - console (human-readable) + rotating JSON file
    let filter = if cli.verbose {
        "intra=debug,intra_auth=debug,intra_client=debug,intra_config=debug,warn"
    } else {
        "intra=info,intra_auth=info,intra_client=warn,intra_config=warn,warn"
    };
    let console_filter = tracing_subscriber::EnvFilter::try_from_env("INTRA_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));

    let file_appender = tracing_appender::rolling::RollingFileAppender::builder()
        .rotation(tracing_appender::rolling::Rotation::DAILY)
        .filename_prefix("intra")
        .filename_suffix("log")
        .build(&log_dir);
    let (file_writer, _guard) = match file_appender {
        Ok(appender) => {
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(writer), Some(guard))
        }
        Err(e) => {
            eprintln!("warning: file logging disabled ({}): {}", log_dir.display(), e);
            (None, None)
        }
    };

    use tracing_subscriber::prelude::*;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(cli.verbose)
                .with_writer(std::io::stderr)
                .with_filter(console_filter),
        )
        .with(file_writer.map(|writer| {
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(writer)
                .with_filter(tracing_subscriber::EnvFilter::new(
                    "intra=trace,intra_auth=trace,intra_client=debug,intra_config=debug,info",
                ))
        }))
        .init();

    for warning in &loaded.warnings {
        tracing::warn!("{}", warning);
    }

    // Create context for commands
    let ctx = commands::Context {
        json_output: cli.json,
        verbose: cli.verbose,
        loaded,
    };

    // Dispatch to command handlers
    match cli.command {
        Commands::Login(args) => auth::run_login(args, &ctx).await,
        Commands::Logout => auth::run_logout(&ctx).await,
        Commands::Status(args) => status::run(args, &ctx).await,
        Commands::Me(args) => profile::run_me(args, &ctx).await,
        Commands::User(args) => profile::run_user(args, &ctx).await,
        Commands::Search(args) => search::run(args, &ctx).await,
        Commands::Config(args) => config::run(args, &ctx).await,
    }
}
