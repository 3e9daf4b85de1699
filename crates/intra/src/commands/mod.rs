//! CLI command handlers.

pub mod auth;
pub mod config;
pub mod profile;
pub mod search;
pub mod status;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result};
use intra_auth::{
    Authorizer, LoopbackAuthorizer, OAuthConfig, RefreshFailurePolicy, SharedTokenStore,
    StoreKind, TokenManager,
};
use intra_client::IntraClient;
use intra_config::{IntraConfig, LoadedConfig, RefreshFailure, StoreBackend};

/// Shared context for all commands.
#[derive(Debug)]
pub struct Context {
    /// Output as JSON for scripting.
    pub json_output: bool,
    /// Verbose output enabled.
    pub verbose: bool,
    /// Layered configuration and where it came from.
    pub loaded: LoadedConfig,
}

impl Context {
    pub fn config(&self) -> &IntraConfig {
        &self.loaded.config
    }

    pub fn data_dir(&self) -> PathBuf {
        self.config().paths.effective_data_dir()
    }

    /// OAuth application settings; fails when the client id or secret is missing.
    pub fn oauth_config(&self) -> Result<OAuthConfig> {
        let oauth = &self.config().oauth;
        let client_id = oauth.require_client_id()?;
        let secret = intra_config::require_client_secret(oauth.client_secret.as_deref())?;
        tracing::debug!(source = %secret.source, "Resolved OAuth client secret");

        let mut config = OAuthConfig::intra(client_id, secret.value, oauth.effective_redirect_uri())
            .with_endpoints(oauth.effective_authorize_url(), oauth.effective_token_url());
        config.scopes = oauth.effective_scopes();
        Ok(config)
    }

    /// Credential store selected by `[auth] store`.
    pub fn store(&self) -> Result<SharedTokenStore> {
        let kind = match self.config().auth.effective_store() {
            StoreBackend::File => StoreKind::File,
            StoreBackend::Keyring => StoreKind::Keyring,
        };
        intra_auth::open_store(kind, &self.data_dir()).context("Failed to open credential store")
    }

    /// Browser-based authorizer honouring `[auth] login_timeout_secs`.
    pub fn loopback_authorizer(&self) -> LoopbackAuthorizer {
        let timeout = Duration::from_secs(self.config().auth.effective_login_timeout_secs());
        LoopbackAuthorizer::new()
            .with_timeout(timeout)
            .with_url_handler(|url| {
                eprintln!("Opening the 42 intranet login page in your browser.");
                eprintln!("If it does not open, visit:\n\n  {}\n", url);
                if let Err(e) = intra_auth::authorizer::open_in_browser(url) {
                    tracing::debug!(error = %e, "Could not open browser");
                }
            })
    }

    /// Token manager using the browser-based authorizer.
    pub fn token_manager(&self) -> Result<TokenManager> {
        self.token_manager_with(Arc::new(self.loopback_authorizer()))
    }

    pub fn token_manager_with(&self, authorizer: Arc<dyn Authorizer>) -> Result<TokenManager> {
        let auth = &self.config().auth;
        let policy = match auth.effective_refresh_failure() {
            RefreshFailure::KeepStale => RefreshFailurePolicy::KeepStale,
            RefreshFailure::ClearOnRejection => RefreshFailurePolicy::ClearOnRejection,
        };

        let manager = TokenManager::builder(self.oauth_config()?, self.store()?, authorizer)
            .refresh_policy(policy)
            .refresh_timeout(Duration::from_secs(auth.effective_refresh_timeout_secs()))
            .build();
        manager.on_auth_state_changed(|state| tracing::debug!(?state, "Auth state changed"));
        Ok(manager)
    }

    /// API client drawing bearer tokens from `manager`.
    pub fn api_client(&self, manager: &TokenManager) -> Result<IntraClient> {
        let api = &self.config().api;
        let client = IntraClient::builder()
            .base_url(api.effective_base_url())
            .timeout(Duration::from_secs(api.effective_timeout_secs()))
            .token_source(Arc::new(manager.clone()))
            .build()?;
        Ok(client)
    }
}

/// Turn an API error into something a user can act on.
pub fn describe_api_error(err: intra_client::Error) -> anyhow::Error {
    if err.is_auth_error() {
        anyhow::anyhow!("Not logged in (or the session expired). Run 'intra login'.")
    } else if err.is_rate_limited() {
        anyhow::anyhow!("The intranet is rate limiting requests, try again shortly.")
    } else {
        anyhow::Error::new(err)
    }
}
