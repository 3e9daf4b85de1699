//! Profile commands - own profile and other students' profiles.

use anyhow::Result;
use clap::Args;
use console::{Style, style};
use intra_client::{CursusUser, User};

use super::{Context, describe_api_error};

/// Arguments for the me command.
#[derive(Args, Debug)]
pub struct MeArgs {
    #[command(flatten)]
    pub display: DisplayArgs,
}

/// Arguments for the user command.
#[derive(Args, Debug)]
pub struct UserArgs {
    /// Login of the student to show
    pub login: String,

    #[command(flatten)]
    pub display: DisplayArgs,
}

#[derive(Args, Debug)]
pub struct DisplayArgs {
    /// Number of projects to list
    #[arg(long, default_value_t = 10)]
    pub projects: usize,

    /// Cursus to show (name or slug); defaults to the most recent one
    #[arg(long)]
    pub cursus: Option<String>,
}

/// Run the me command.
pub async fn run_me(args: MeArgs, ctx: &Context) -> Result<()> {
    let manager = ctx.token_manager()?;
    let client = ctx.api_client(&manager)?;
    let user = client.users().me().await.map_err(describe_api_error)?;
    show(&user, &args.display, ctx)
}

/// Run the user command.
pub async fn run_user(args: UserArgs, ctx: &Context) -> Result<()> {
    let manager = ctx.token_manager()?;
    let client = ctx.api_client(&manager)?;
    let user = match client.users().get(&args.login).await {
        Ok(user) => user,
        Err(e) if e.is_not_found() => anyhow::bail!("No student with login '{}'", args.login),
        Err(e) => return Err(describe_api_error(e)),
    };
    show(&user, &args.display, ctx)
}

fn show(user: &User, display: &DisplayArgs, ctx: &Context) -> Result<()> {
    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(user)?);
    } else {
        render(user, display);
    }
    Ok(())
}

fn select_cursus<'a>(user: &'a User, wanted: Option<&str>) -> Option<&'a CursusUser> {
    match wanted {
        Some(wanted) => user.cursus_users.iter().find(|c| {
            c.cursus.as_ref().is_some_and(|cursus| {
                cursus.name.eq_ignore_ascii_case(wanted)
                    || cursus.slug.as_deref().is_some_and(|s| s.eq_ignore_ascii_case(wanted))
            })
        }),
        None => user.primary_cursus(),
    }
}

fn progress_bar(fraction: f64, width: usize) -> String {
    let filled = ((fraction.clamp(0.0, 1.0)) * width as f64).round() as usize;
    format!("{}{}", "█".repeat(filled), "░".repeat(width - filled))
}

fn render(user: &User, display: &DisplayArgs) {
    let dim = Style::new().dim();
    let green = Style::new().green();
    let red = Style::new().red();
    let yellow = Style::new().yellow();

    println!();
    println!(
        "{} {}",
        style(user.display_name()).bold(),
        dim.apply_to(format!("({})", user.login))
    );
    println!("{}", dim.apply_to("─".repeat(40)));
    if let Some(email) = &user.email {
        println!("  {:<12} {}", dim.apply_to("Email:"), email);
    }
    match &user.location {
        Some(location) => println!("  {:<12} {}", dim.apply_to("Location:"), green.apply_to(location)),
        None => println!("  {:<12} {}", dim.apply_to("Location:"), dim.apply_to("unavailable")),
    }
    println!("  {:<12} {} ₳", dim.apply_to("Wallet:"), user.wallet);
    println!("  {:<12} {}", dim.apply_to("Eval points:"), user.correction_point);
    if let Some(pool) = user.pool() {
        println!("  {:<12} {}", dim.apply_to("Piscine:"), pool);
    }
    if let Some(coalition) = &user.coalition {
        println!("  {:<12} {}", dim.apply_to("Coalition:"), coalition.name);
    }
    if user.staff {
        println!("  {}", yellow.apply_to("staff"));
    }

    match select_cursus(user, display.cursus.as_deref()) {
        Some(cursus) => {
            let (level, percent) = cursus.level_progress();
            println!();
            println!(
                "{}  Level {} {} {}%",
                style(cursus.cursus_name()).bold(),
                level,
                progress_bar(f64::from(percent) / 100.0, 20),
                percent
            );
            if let Some(grade) = &cursus.grade {
                println!("  {:<12} {}", dim.apply_to("Grade:"), grade);
            }

            let skills = cursus.skills_by_level();
            if !skills.is_empty() {
                println!();
                println!("{}", style("Skills").bold());
                for skill in skills {
                    println!(
                        "  {:<32} {:>5.2} {}",
                        skill.name,
                        skill.level,
                        progress_bar(skill.progress(), 10)
                    );
                }
            }
        }
        None => {
            if let Some(wanted) = &display.cursus {
                println!();
                println!("  {}", dim.apply_to(format!("Not enrolled in '{}'", wanted)));
            }
        }
    }

    let projects = user.projects_by_outcome();
    if !projects.is_empty() && display.projects > 0 {
        println!();
        println!("{}", style("Projects").bold());
        for project in projects.iter().take(display.projects) {
            let mark = match project.final_mark {
                Some(mark) if project.validated == Some(false) => {
                    red.apply_to(format!("{:>4}", mark)).to_string()
                }
                Some(mark) => green.apply_to(format!("{:>4}", mark)).to_string(),
                None => dim.apply_to("   -").to_string(),
            };
            println!(
                "  {:<32} {} {}",
                project.project.name,
                mark,
                dim.apply_to(project.status.replace('_', " "))
            );
        }
        if projects.len() > display.projects {
            println!(
                "  {}",
                dim.apply_to(format!("… {} more (--projects N)", projects.len() - display.projects))
            );
        }
    }
    println!();
}
