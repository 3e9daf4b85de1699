//! OAuth 2.0 authorization-code flow against the 42 intranet.
//!
//! Builds the authorization URL for the interactive step and talks to the
//! token endpoint for both the code exchange and refresh grants.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::error::{AuthError, Result};

/// Authorization endpoint of the 42 intranet.
pub const DEFAULT_AUTHORIZE_URL: &str = "https://api.intra.42.fr/oauth/authorize";

/// Token endpoint of the 42 intranet.
pub const DEFAULT_TOKEN_URL: &str = "https://api.intra.42.fr/oauth/token";

/// Scope requested at login.
pub const DEFAULT_SCOPE: &str = "public";

/// OAuth client registration.
#[derive(Clone)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub authorize_url: String,
    pub token_url: String,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
}

impl std::fmt::Debug for OAuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("authorize_url", &self.authorize_url)
            .field("token_url", &self.token_url)
            .field("redirect_uri", &self.redirect_uri)
            .field("scopes", &self.scopes)
            .finish()
    }
}

impl OAuthConfig {
    /// Create a config for the 42 intranet endpoints.
    pub fn intra(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            authorize_url: DEFAULT_AUTHORIZE_URL.to_string(),
            token_url: DEFAULT_TOKEN_URL.to_string(),
            redirect_uri: redirect_uri.into(),
            scopes: vec![DEFAULT_SCOPE.to_string()],
        }
    }

    /// Point both endpoints at another provider root (mock servers, staging).
    pub fn with_endpoints(
        mut self,
        authorize_url: impl Into<String>,
        token_url: impl Into<String>,
    ) -> Self {
        self.authorize_url = authorize_url.into();
        self.token_url = token_url.into();
        self
    }
}

/// Generate a random state string for CSRF protection.
pub fn generate_state() -> String {
    let mut state_bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut state_bytes);
    URL_SAFE_NO_PAD.encode(state_bytes)
}

/// One interactive login attempt. Never persisted.
#[derive(Debug, Clone)]
pub struct AuthorizationSession {
    pub client_id: String,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    pub state: String,
    authorize_url: String,
}

impl AuthorizationSession {
    /// Start a new session with a fresh `state`.
    pub fn new(config: &OAuthConfig) -> Self {
        Self {
            client_id: config.client_id.clone(),
            redirect_uri: config.redirect_uri.clone(),
            scopes: config.scopes.clone(),
            state: generate_state(),
            authorize_url: config.authorize_url.clone(),
        }
    }

    /// Build the URL the user must open to grant access.
    pub fn authorization_url(&self) -> String {
        let scope = self.scopes.join(" ");
        let params = [
            ("client_id", self.client_id.as_str()),
            ("redirect_uri", self.redirect_uri.as_str()),
            ("response_type", "code"),
            ("scope", scope.as_str()),
            ("state", self.state.as_str()),
        ];

        let query = params
            .iter()
            .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");

        format!("{}?{}", self.authorize_url, query)
    }
}

/// Successful token endpoint response.
#[derive(Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: u64,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

impl std::fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenResponse")
            .field("expires_in", &self.expires_in)
            .field("token_type", &self.token_type)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

/// OAuth error body (`{"error": "...", "error_description": "..."}`).
#[derive(Debug, Deserialize)]
struct OAuthErrorBody {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

#[derive(Serialize)]
struct TokenExchangeRequest<'a> {
    grant_type: &'static str,
    client_id: &'a str,
    client_secret: &'a str,
    code: &'a str,
    redirect_uri: &'a str,
}

#[derive(Serialize)]
struct TokenRefreshRequest<'a> {
    grant_type: &'static str,
    client_id: &'a str,
    client_secret: &'a str,
    refresh_token: &'a str,
}

/// Exchange an authorization code for a token pair.
pub async fn exchange_code(
    http: &reqwest::Client,
    config: &OAuthConfig,
    code: &str,
) -> Result<TokenResponse> {
    let body = TokenExchangeRequest {
        grant_type: "authorization_code",
        client_id: &config.client_id,
        client_secret: &config.client_secret,
        code,
        redirect_uri: &config.redirect_uri,
    };
    post_token_request(http, &config.token_url, &body).await
}

/// Trade a refresh token for a new token pair.
///
/// The provider may rotate the refresh token; callers must persist the one
/// returned here.
pub async fn refresh_token(
    http: &reqwest::Client,
    config: &OAuthConfig,
    refresh_token: &str,
) -> Result<TokenResponse> {
    let body = TokenRefreshRequest {
        grant_type: "refresh_token",
        client_id: &config.client_id,
        client_secret: &config.client_secret,
        refresh_token,
    };
    post_token_request(http, &config.token_url, &body).await
}

async fn post_token_request<B: Serialize>(
    http: &reqwest::Client,
    token_url: &str,
    body: &B,
) -> Result<TokenResponse> {
    let response = http
        .post(token_url)
        .json(body)
        .send()
        .await
        .map_err(|e| AuthError::NetworkUnavailable(format!("token request failed: {}", e)))?;

    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|e| AuthError::NetworkUnavailable(format!("token response truncated: {}", e)))?;

    if !status.is_success() {
        return Err(AuthError::ExchangeFailed {
            status: Some(status.as_u16()),
            reason: describe_error_body(&text),
        });
    }

    serde_json::from_str(&text).map_err(|e| AuthError::ExchangeFailed {
        status: Some(status.as_u16()),
        reason: format!("malformed token response: {}", e),
    })
}

fn describe_error_body(text: &str) -> String {
    match serde_json::from_str::<OAuthErrorBody>(text) {
        Ok(body) => match body.error_description {
            Some(desc) => format!("{}: {}", body.error, desc),
            None => body.error,
        },
        Err(_) if text.trim().is_empty() => "empty response body".to_string(),
        Err(_) => "unrecognised error body".to_string(),
    }
}
