//! Configuration types.
//!
//! Every field is optional so layers can be merged field by field; the
//! `effective_*` accessors supply defaults.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::{ConfigError, Result};

pub const DEFAULT_AUTHORIZE_URL: &str = "https://api.intra.42.fr/oauth/authorize";
pub const DEFAULT_TOKEN_URL: &str = "https://api.intra.42.fr/oauth/token";
pub const DEFAULT_REDIRECT_URI: &str = "http://127.0.0.1:8421/callback";
pub const DEFAULT_SCOPE: &str = "public";
pub const DEFAULT_API_URL: &str = "https://api.intra.42.fr";
pub const DEFAULT_API_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_REFRESH_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_LOGIN_TIMEOUT_SECS: u64 = 300;

/// Environment variables read by [`IntraConfig::apply_env`].
pub const CLIENT_ID_ENV: &str = "INTRA_CLIENT_ID";
pub const REDIRECT_URI_ENV: &str = "INTRA_REDIRECT_URI";
pub const API_URL_ENV: &str = "INTRA_API_URL";

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntraConfig {
    pub oauth: OAuthSection,
    pub api: ApiSection,
    pub auth: AuthSection,
    pub paths: PathsSection,
}

// ─────────────────────────────────────────────────────────────────────────────
// [oauth]
// ─────────────────────────────────────────────────────────────────────────────

/// Registered OAuth application.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OAuthSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    /// Plaintext fallback; the keyring and `INTRA_CLIENT_SECRET` win.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorize_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scopes: Option<Vec<String>>,
}

impl std::fmt::Debug for OAuthSection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthSection")
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "<redacted>"))
            .field("redirect_uri", &self.redirect_uri)
            .field("authorize_url", &self.authorize_url)
            .field("token_url", &self.token_url)
            .field("scopes", &self.scopes)
            .finish()
    }
}

impl OAuthSection {
    /// The client id, or an error naming where to set it.
    pub fn require_client_id(&self) -> Result<&str> {
        self.client_id
            .as_deref()
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingField {
                field: "client_id".to_string(),
                context: format!("[oauth] (or set {})", CLIENT_ID_ENV),
            })
    }

    pub fn effective_redirect_uri(&self) -> &str {
        self.redirect_uri.as_deref().unwrap_or(DEFAULT_REDIRECT_URI)
    }

    pub fn effective_authorize_url(&self) -> &str {
        self.authorize_url.as_deref().unwrap_or(DEFAULT_AUTHORIZE_URL)
    }

    pub fn effective_token_url(&self) -> &str {
        self.token_url.as_deref().unwrap_or(DEFAULT_TOKEN_URL)
    }

    pub fn effective_scopes(&self) -> Vec<String> {
        match &self.scopes {
            Some(scopes) if !scopes.is_empty() => scopes.clone(),
            _ => vec![DEFAULT_SCOPE.to_string()],
        }
    }

    pub fn has_plaintext_secret(&self) -> bool {
        self.client_secret.as_deref().is_some_and(|s| !s.is_empty())
    }

    fn merge(&mut self, other: OAuthSection) {
        merge_field(&mut self.client_id, other.client_id);
        merge_field(&mut self.client_secret, other.client_secret);
        merge_field(&mut self.redirect_uri, other.redirect_uri);
        merge_field(&mut self.authorize_url, other.authorize_url);
        merge_field(&mut self.token_url, other.token_url);
        merge_field(&mut self.scopes, other.scopes);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// [api]
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl ApiSection {
    pub fn effective_base_url(&self) -> &str {
        self.base_url.as_deref().unwrap_or(DEFAULT_API_URL)
    }

    pub fn effective_timeout_secs(&self) -> u64 {
        self.timeout_secs.unwrap_or(DEFAULT_API_TIMEOUT_SECS)
    }

    fn merge(&mut self, other: ApiSection) {
        merge_field(&mut self.base_url, other.base_url);
        merge_field(&mut self.timeout_secs, other.timeout_secs);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// [auth]
// ─────────────────────────────────────────────────────────────────────────────

/// Where credentials are kept.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StoreBackend {
    /// age-encrypted file under the data directory.
    #[default]
    File,
    /// OS keyring.
    Keyring,
}

/// What happens to stored credentials when a refresh fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RefreshFailure {
    #[default]
    KeepStale,
    ClearOnRejection,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store: Option<StoreBackend>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_failure: Option<RefreshFailure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_timeout_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub login_timeout_secs: Option<u64>,
}

impl AuthSection {
    pub fn effective_store(&self) -> StoreBackend {
        self.store.unwrap_or_default()
    }

    pub fn effective_refresh_failure(&self) -> RefreshFailure {
        self.refresh_failure.unwrap_or_default()
    }

    pub fn effective_refresh_timeout_secs(&self) -> u64 {
        self.refresh_timeout_secs
            .unwrap_or(DEFAULT_REFRESH_TIMEOUT_SECS)
    }

    pub fn effective_login_timeout_secs(&self) -> u64 {
        self.login_timeout_secs.unwrap_or(DEFAULT_LOGIN_TIMEOUT_SECS)
    }

    fn merge(&mut self, other: AuthSection) {
        merge_field(&mut self.store, other.store);
        merge_field(&mut self.refresh_failure, other.refresh_failure);
        merge_field(&mut self.refresh_timeout_secs, other.refresh_timeout_secs);
        merge_field(&mut self.login_timeout_secs, other.login_timeout_secs);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// [paths]
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsSection {
    /// Credentials and logs live here. `$INTRA_DATA_DIR` overrides.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
}

impl PathsSection {
    fn merge(&mut self, other: PathsSection) {
        merge_field(&mut self.data_dir, other.data_dir);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// IntraConfig
// ─────────────────────────────────────────────────────────────────────────────

impl IntraConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Copy with the plaintext client secret masked, for display.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if copy.oauth.client_secret.is_some() {
            copy.oauth.client_secret = Some("********".to_string());
        }
        copy
    }

    /// Merge another config on top of this one (other takes priority).
    pub fn merge(&mut self, other: IntraConfig) {
        self.oauth.merge(other.oauth);
        self.api.merge(other.api);
        self.auth.merge(other.auth);
        self.paths.merge(other.paths);
    }

    /// Apply `INTRA_*` environment overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|name| std::env::var(name).ok());
    }

    /// Apply environment overrides from an arbitrary lookup.
    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |name: &str| lookup(name).filter(|v| !v.is_empty());

        if let Some(id) = get(CLIENT_ID_ENV) {
            self.oauth.client_id = Some(id);
        }
        if let Some(uri) = get(REDIRECT_URI_ENV) {
            self.oauth.redirect_uri = Some(uri);
        }
        if let Some(url) = get(API_URL_ENV) {
            self.api.base_url = Some(url);
        }
    }
}

fn merge_field<T>(base: &mut Option<T>, overlay: Option<T>) {
    if overlay.is_some() {
        *base = overlay;
    }
}
