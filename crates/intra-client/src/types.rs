//! Response types for the 42 intranet `/v2` API.
//!
//! Only the fields the CLI uses are modelled. Unknown fields are ignored and
//! everything but the identifiers defaults when absent, so the short user
//! records returned by search deserialize into the same [`User`] type.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Skill levels are shown against this ceiling.
pub const MAX_SKILL_LEVEL: f64 = 20.0;

// ─────────────────────────────────────────────────────────────────────────────
// Users
// ─────────────────────────────────────────────────────────────────────────────

/// A student or staff profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: u64,
    pub login: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub displayname: Option<String>,
    #[serde(default)]
    pub image: Option<UserImage>,
    #[serde(default)]
    pub wallet: i64,
    #[serde(default)]
    pub correction_point: i64,
    /// Current workstation; `None` when not on campus.
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default, rename = "staff?")]
    pub staff: bool,
    #[serde(default)]
    pub pool_month: Option<String>,
    #[serde(default)]
    pub pool_year: Option<String>,
    #[serde(default)]
    pub cursus_users: Vec<CursusUser>,
    #[serde(default)]
    pub projects_users: Vec<ProjectUser>,
    #[serde(default)]
    pub coalition: Option<Coalition>,
}

/// Profile picture links.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserImage {
    #[serde(default)]
    pub link: Option<String>,
}

impl User {
    /// Name to show: the display name, falling back to the login.
    pub fn display_name(&self) -> &str {
        self.displayname
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(&self.login)
    }

    /// The most recently joined cursus, which the intranet lists last.
    pub fn primary_cursus(&self) -> Option<&CursusUser> {
        self.cursus_users.last()
    }

    /// Projects with finished ones first, then by mark, highest first.
    pub fn projects_by_outcome(&self) -> Vec<&ProjectUser> {
        let mut projects: Vec<&ProjectUser> = self.projects_users.iter().collect();
        projects.sort_by(|a, b| {
            b.is_finished()
                .cmp(&a.is_finished())
                .then_with(|| b.final_mark.unwrap_or(0).cmp(&a.final_mark.unwrap_or(0)))
        });
        projects
    }

    /// Piscine date, e.g. "september 2021".
    pub fn pool(&self) -> Option<String> {
        match (&self.pool_month, &self.pool_year) {
            (Some(month), Some(year)) => Some(format!("{} {}", month, year)),
            _ => None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Cursus
// ─────────────────────────────────────────────────────────────────────────────

/// A user's enrolment in a cursus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CursusUser {
    #[serde(default)]
    pub id: u64,
    #[serde(default)]
    pub level: f64,
    #[serde(default)]
    pub grade: Option<String>,
    #[serde(default)]
    pub begin_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub skills: Vec<Skill>,
    #[serde(default)]
    pub cursus: Option<Cursus>,
}

impl CursusUser {
    /// Whole level and rounded percentage towards the next one.
    ///
    /// `7.42` yields `(7, 42)`.
    pub fn level_progress(&self) -> (u32, u8) {
        let level = self.level.max(0.0);
        let whole = level.floor();
        let percent = ((level - whole) * 100.0).round().clamp(0.0, 100.0);
        (whole as u32, percent as u8)
    }

    /// Skills sorted by level, highest first.
    pub fn skills_by_level(&self) -> Vec<&Skill> {
        let mut skills: Vec<&Skill> = self.skills.iter().collect();
        skills.sort_by(|a, b| b.level.total_cmp(&a.level));
        skills
    }

    pub fn cursus_name(&self) -> &str {
        self.cursus.as_ref().map_or("unknown cursus", |c| c.name.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cursus {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub slug: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Skill {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub level: f64,
}

impl Skill {
    /// Fraction of [`MAX_SKILL_LEVEL`], capped at 1.0.
    pub fn progress(&self) -> f64 {
        (self.level / MAX_SKILL_LEVEL).clamp(0.0, 1.0)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Projects
// ─────────────────────────────────────────────────────────────────────────────

/// A user's attempt at a project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectUser {
    pub id: u64,
    /// "finished", "in_progress", "searching_a_group", "creating_group",
    /// "waiting_for_correction", ...
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub final_mark: Option<i64>,
    #[serde(default, rename = "validated?")]
    pub validated: Option<bool>,
    pub project: Project,
}

impl ProjectUser {
    pub fn is_finished(&self) -> bool {
        self.status == "finished"
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub parent_id: Option<u64>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Coalitions
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Coalition {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub score: i64,
}
