//! Data directory resolution.
//!
//! Credentials and logs are kept under the data directory:
//!
//! ```text
//! <data_dir>/
//! ├── credentials.age
//! ├── identity.txt
//! └── logs/
//! ```
//!
//! # Environment Variables
//!
//! - `INTRA_DATA_DIR` - Override the data directory

use std::path::{Path, PathBuf};

use crate::types::PathsSection;

/// Environment variable to override the data directory.
pub const DATA_DIR_ENV: &str = "INTRA_DATA_DIR";

const APP_NAME: &str = "intra";
const LOGS_DIR: &str = "logs";

impl PathsSection {
    /// Get the effective data directory.
    ///
    /// Resolution order:
    /// 1. `INTRA_DATA_DIR` environment variable
    /// 2. Configured `data_dir` value (`~/` is expanded)
    /// 3. Platform data directory (`~/.local/share/intra` on Linux)
    pub fn effective_data_dir(&self) -> PathBuf {
        self.effective_data_dir_from(std::env::var(DATA_DIR_ENV).ok())
    }

    fn effective_data_dir_from(&self, env_value: Option<String>) -> PathBuf {
        if let Some(dir) = env_value.filter(|d| !d.is_empty()) {
            return expand_home(Path::new(&dir));
        }

        if let Some(dir) = &self.data_dir {
            return expand_home(dir);
        }

        dirs::data_dir()
            .map(|d| d.join(APP_NAME))
            .unwrap_or_else(|| PathBuf::from(".").join(format!(".{}", APP_NAME)))
    }

    /// Directory for rolling log files.
    pub fn logs_dir(&self) -> PathBuf {
        self.effective_data_dir().join(LOGS_DIR)
    }
}

/// Expand a leading `~/` to the home directory.
pub fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => match dirs::home_dir() {
            Some(home) => home.join(rest),
            None => path.to_path_buf(),
        },
        Err(_) => path.to_path_buf(),
    }
}
