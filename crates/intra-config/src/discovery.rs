//! Locating config files and folding them into one [`IntraConfig`].
//!
//! Layers, lowest precedence first:
//! 1. user file: `$INTRA_CONFIG_DIR/config.toml`, else `<platform config dir>/intra/config.toml`
//! 2. project file: `intra.toml` in the working directory
//! 3. `INTRA_*` environment variables
//!
//! Command-line flags sit above all of these and are applied by the binary.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::{ConfigError, IntraConfig, Result};

/// Points the user layer at another directory.
pub const CONFIG_DIR_ENV: &str = "INTRA_CONFIG_DIR";

const USER_FILE_NAME: &str = "config.toml";
const PROJECT_FILE_NAME: &str = "intra.toml";

/// Which file layer a source belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigLayer {
    User,
    Project,
}

impl fmt::Display for ConfigLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigLayer::User => write!(f, "user"),
            ConfigLayer::Project => write!(f, "project"),
        }
    }
}

/// A candidate config file and whether it contributed.
#[derive(Debug, Clone)]
pub struct ConfigSource {
    pub layer: ConfigLayer,
    pub path: PathBuf,
    pub loaded: bool,
}

/// Merged configuration plus the trail of how it was assembled.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: IntraConfig,
    /// Every candidate file, lowest precedence first.
    pub sources: Vec<ConfigSource>,
    /// Problems worth telling the user about (unreadable files, a
    /// plaintext client secret).
    pub warnings: Vec<String>,
}

impl LoadedConfig {
    /// Paths of the files that were actually merged.
    pub fn loaded_from(&self) -> Vec<&Path> {
        self.sources
            .iter()
            .filter_map(|s| s.loaded.then_some(s.path.as_path()))
            .collect()
    }
}

/// Where to look for the file layers.
#[derive(Debug, Clone)]
pub struct ConfigSearch {
    user_dir: Option<PathBuf>,
    project_dir: PathBuf,
    apply_env: bool,
}

impl Default for ConfigSearch {
    fn default() -> Self {
        Self {
            user_dir: user_config_dir(),
            project_dir: PathBuf::new(),
            apply_env: true,
        }
    }
}

impl ConfigSearch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look for `config.toml` in `dir` instead of the platform location.
    pub fn user_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.user_dir = Some(dir.into());
        self
    }

    /// Look for `intra.toml` in `dir` instead of the working directory.
    pub fn project_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.project_dir = dir.into();
        self
    }

    /// Skip the `INTRA_*` environment layer.
    pub fn without_env(mut self) -> Self {
        self.apply_env = false;
        self
    }

    fn candidates(&self) -> Vec<(ConfigLayer, PathBuf)> {
        let user = self
            .user_dir
            .as_ref()
            .map(|dir| (ConfigLayer::User, dir.join(USER_FILE_NAME)));
        let project = (ConfigLayer::Project, self.project_dir.join(PROJECT_FILE_NAME));
        user.into_iter().chain(std::iter::once(project)).collect()
    }

    /// Read and merge every layer.
    ///
    /// A file that exists but cannot be read or parsed is skipped with a
    /// warning rather than failing the whole load.
    pub fn load(&self) -> LoadedConfig {
        let mut config = IntraConfig::new();
        let mut warnings = Vec::new();

        let sources = self
            .candidates()
            .into_iter()
            .map(|(layer, path)| {
                let loaded = path.is_file()
                    && match load_config_file(&path) {
                        Ok(layer_config) => {
                            config.merge(layer_config);
                            true
                        }
                        Err(e) => {
                            warnings.push(format!("Skipped {} config: {}", layer, e));
                            false
                        }
                    };
                ConfigSource { layer, path, loaded }
            })
            .collect();

        if config.oauth.has_plaintext_secret() {
            warnings.push(format!(
                "[oauth] client_secret is stored in plaintext; prefer \
                 'intra config set-secret' or {}",
                crate::CLIENT_SECRET_ENV
            ));
        }

        if self.apply_env {
            config.apply_env();
        }

        LoadedConfig {
            config,
            sources,
            warnings,
        }
    }
}

/// Load from the default locations, `INTRA_*` overrides included.
pub fn load_config() -> LoadedConfig {
    ConfigSearch::new().load()
}

/// Parse one config file.
pub fn load_config_file(path: &Path) -> Result<IntraConfig> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
        path: path.display().to_string(),
        source,
    })?;
    IntraConfig::from_toml(&contents)
}

/// Directory holding the user config file.
pub fn user_config_dir() -> Option<PathBuf> {
    match std::env::var_os(CONFIG_DIR_ENV) {
        Some(dir) if !dir.is_empty() => Some(PathBuf::from(dir)),
        _ => dirs::config_dir().map(|d| d.join("intra")),
    }
}
