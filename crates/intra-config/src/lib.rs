//! Configuration system for the intra CLI.
//!
//! Provides TOML-based configuration with:
//! - The registered OAuth application (`[oauth]`)
//! - API host and timeouts (`[api]`)
//! - Credential storage and refresh-failure policy (`[auth]`)
//! - Config file layering (XDG user config + project-local overrides + `INTRA_*` env)
//! - Client secret resolution (keyring → env var → config file)

pub mod discovery;
pub mod error;
pub mod paths;
pub mod secrets;
pub mod types;

pub use discovery::{
    CONFIG_DIR_ENV, ConfigLayer, ConfigSearch, ConfigSource, LoadedConfig, load_config,
    load_config_file, user_config_dir,
};
pub use error::{ConfigError, Result};
pub use paths::{DATA_DIR_ENV, expand_home};
pub use secrets::{
    CLIENT_SECRET_ENV, ResolvedSecret, SecretSource, require_client_secret, resolve_client_secret,
};
pub use types::*;
