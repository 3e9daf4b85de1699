//! Where the OAuth client secret comes from.
//!
//! Checked in order, first non-empty value wins:
//! the OS keyring (`keyring` feature), `$INTRA_CLIENT_SECRET`, then
//! `[oauth] client_secret` from the config files.

use std::fmt;

use crate::{ConfigError, Result};

/// Environment variable holding the client secret.
pub const CLIENT_SECRET_ENV: &str = "INTRA_CLIENT_SECRET";

/// Origin of a resolved secret.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretSource {
    Keyring,
    Environment,
    ConfigFile,
}

impl fmt::Display for SecretSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SecretSource::Keyring => f.write_str("system keyring"),
            SecretSource::Environment => write!(f, "${}", CLIENT_SECRET_ENV),
            SecretSource::ConfigFile => f.write_str("config file (plaintext)"),
        }
    }
}

/// A secret value and its origin. `Debug` never prints the value.
#[derive(Clone, PartialEq, Eq)]
pub struct ResolvedSecret {
    pub value: String,
    pub source: SecretSource,
}

impl ResolvedSecret {
    fn from_candidate(value: Option<String>, source: SecretSource) -> Option<Self> {
        value
            .filter(|v| !v.trim().is_empty())
            .map(|value| Self { value, source })
    }
}

impl fmt::Debug for ResolvedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ResolvedSecret(<{} bytes> from {})", self.value.len(), self.source)
    }
}

/// Find the client secret; `config_value` is the `[oauth] client_secret` field.
pub fn resolve_client_secret(config_value: Option<&str>) -> Option<ResolvedSecret> {
    first_available(
        os_keyring::read(),
        std::env::var(CLIENT_SECRET_ENV).ok(),
        config_value,
    )
}

/// [`resolve_client_secret`], failing with an error that lists every option.
pub fn require_client_secret(config_value: Option<&str>) -> Result<ResolvedSecret> {
    resolve_client_secret(config_value).ok_or_else(|| ConfigError::SecretNotFound {
        env_var: CLIENT_SECRET_ENV.to_string(),
    })
}

fn first_available(
    keyring: Option<String>,
    env: Option<String>,
    config: Option<&str>,
) -> Option<ResolvedSecret> {
    ResolvedSecret::from_candidate(keyring, SecretSource::Keyring)
        .or_else(|| ResolvedSecret::from_candidate(env, SecretSource::Environment))
        .or_else(|| {
            ResolvedSecret::from_candidate(config.map(str::to_string), SecretSource::ConfigFile)
        })
}

/// Save the client secret in the OS keyring.
pub fn store_client_secret(secret: &str) -> Result<()> {
    os_keyring::write(secret).map_err(ConfigError::Keyring)
}

/// Remove the client secret from the OS keyring.
pub fn delete_client_secret() -> Result<()> {
    os_keyring::delete().map_err(ConfigError::Keyring)
}

pub fn has_keyring_secret() -> bool {
    os_keyring::read().is_some_and(|v| !v.is_empty())
}

#[cfg(feature = "keyring")]
mod os_keyring {
    const SERVICE: &str = "intra";
    const USER: &str = "client_secret";

    fn entry() -> Result<keyring::Entry, String> {
        // Unit tests never touch the developer's real keychain.
        if cfg!(test) {
            return Err("keyring disabled under test".to_string());
        }
        keyring::Entry::new(SERVICE, USER).map_err(|e| format!("keyring unavailable: {}", e))
    }

    pub(super) fn read() -> Option<String> {
        entry().ok()?.get_password().ok()
    }

    pub(super) fn write(secret: &str) -> Result<(), String> {
        entry()?
            .set_password(secret)
            .map_err(|e| format!("could not write client secret to keyring: {}", e))
    }

    pub(super) fn delete() -> Result<(), String> {
        match entry()?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(format!("could not remove client secret from keyring: {}", e)),
        }
    }
}

#[cfg(not(feature = "keyring"))]
mod os_keyring {
    const UNSUPPORTED: &str = "this build has no keyring support (rebuild with --features keyring)";

    pub(super) fn read() -> Option<String> {
        None
    }

    pub(super) fn write(_secret: &str) -> Result<(), String> {
        Err(UNSUPPORTED.to_string())
    }

    pub(super) fn delete() -> Result<(), String> {
        Err(UNSUPPORTED.to_string())
    }
}
