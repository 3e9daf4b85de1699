//! HTTP plumbing shared by the API groups.

use std::sync::Arc;
use std::time::Duration;

use intra_auth::AccessTokenSource;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use serde::Serialize;
use serde::de::DeserializeOwned;
use url::Url;

use crate::api::UsersApi;
use crate::error::{Error, ErrorResponse, Result};

/// Production API host.
pub const DEFAULT_BASE_URL: &str = "https://api.intra.42.fr";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const API_VERSION_PREFIX: &str = "v2/";

/// Client for the 42 intranet `/v2` API.
///
/// Each request asks the [`AccessTokenSource`] for a token right before it
/// is sent, so a token refreshed by another task is picked up immediately.
/// Requests without a token go out unauthenticated; the API answers those
/// with 401, surfaced as [`Error::Auth`].
///
/// ```no_run
/// use std::sync::Arc;
/// use intra_client::IntraClient;
///
/// # async fn example(tokens: Arc<dyn intra_auth::AccessTokenSource>) -> intra_client::Result<()> {
/// let client = IntraClient::builder().token_source(tokens).build()?;
/// let me = client.users().me().await?;
/// println!("Logged in as {}", me.login);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct IntraClient {
    shared: Arc<Shared>,
}

struct Shared {
    http: reqwest::Client,
    /// Always ends with `/` so relative joins keep any path prefix.
    root: Url,
    timeout: Duration,
    tokens: Option<Arc<dyn AccessTokenSource>>,
}

impl std::fmt::Debug for IntraClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntraClient")
            .field("root", &self.shared.root.as_str())
            .field("timeout", &self.shared.timeout)
            .field("has_token_source", &self.shared.tokens.is_some())
            .finish()
    }
}

impl IntraClient {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    pub fn base_url(&self) -> &Url {
        &self.shared.root
    }

    /// `/v2/me`, `/v2/users/:login` and user search.
    pub fn users(&self) -> UsersApi {
        UsersApi::new(self.clone())
    }

    /// Resolve an API path such as `users/jdoe` against the `/v2` root.
    pub(crate) fn url(&self, path: &str) -> Result<Url> {
        let relative = format!("{}{}", API_VERSION_PREFIX, path.trim_start_matches('/'));
        Ok(self.shared.root.join(&relative)?)
    }

    pub(crate) async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.get_with_query(path, &[] as &[(&str, &str)]).await
    }

    pub(crate) async fn get_with_query<T, Q>(&self, path: &str, query: &Q) -> Result<T>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        let mut request = self
            .shared
            .http
            .get(self.url(path)?)
            .query(query)
            .timeout(self.shared.timeout);

        let token = match &self.shared.tokens {
            Some(tokens) => tokens.access_token().await,
            None => None,
        };
        match token {
            Some(token) => request = request.bearer_auth(token),
            None => tracing::debug!(path, "Sending request without access token"),
        }

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }

        let message = response
            .json::<ErrorResponse>()
            .await
            .unwrap_or_default()
            .into_message(status.as_u16());
        tracing::debug!(path, status = status.as_u16(), %message, "Intranet request failed");
        Err(Error::from_status(status.as_u16(), message))
    }
}

/// Configures an [`IntraClient`].
#[derive(Default)]
pub struct ClientBuilder {
    base_url: Option<String>,
    tokens: Option<Arc<dyn AccessTokenSource>>,
    timeout: Option<Duration>,
    user_agent: Option<String>,
}

impl std::fmt::Debug for ClientBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientBuilder")
            .field("base_url", &self.base_url)
            .field("has_token_source", &self.tokens.is_some())
            .field("timeout", &self.timeout)
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// API host; [`DEFAULT_BASE_URL`] when unset.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn token_source(mut self, tokens: Arc<dyn AccessTokenSource>) -> Self {
        self.tokens = Some(tokens);
        self
    }

    /// Per-request timeout, 30s by default.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    pub fn build(self) -> Result<IntraClient> {
        let root = parse_root(self.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL))?;

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(
                self.user_agent
                    .unwrap_or_else(|| concat!("intra/", env!("CARGO_PKG_VERSION")).to_string()),
            )
            .build()?;

        Ok(IntraClient {
            shared: Arc::new(Shared {
                http,
                root,
                timeout: self.timeout.unwrap_or(DEFAULT_TIMEOUT),
                tokens: self.tokens,
            }),
        })
    }
}

fn parse_root(raw: &str) -> Result<Url> {
    let mut url = Url::parse(raw)?;
    if url.cannot_be_a_base() {
        return Err(Error::Config(format!("'{}' cannot be used as an API host", raw)));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}
