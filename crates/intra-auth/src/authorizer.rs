//! Interactive authorization step.
//!
//! An [`Authorizer`] shows the provider's consent page to the user and hands
//! back the authorization code, or reports that the user walked away.
//! [`LoopbackAuthorizer`] receives the browser redirect on a localhost
//! listener.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    Router,
    extract::{Query, State},
    http::StatusCode,
    routing::get,
};
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use url::Url;

use crate::error::{AuthError, Result};
use crate::oauth::AuthorizationSession;

/// How long the loopback listener waits for the redirect by default.
pub const DEFAULT_LOGIN_TIMEOUT: Duration = Duration::from_secs(300);

/// Result of the interactive step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationOutcome {
    /// The user granted access; the one-time authorization code.
    Code(String),
    /// The user dismissed the authorization UI.
    Cancelled,
}

/// Drives the user through the provider's authorization UI.
#[async_trait]
pub trait Authorizer: Send + Sync + std::fmt::Debug {
    /// Suspend until the user completes or cancels authorization.
    async fn authorize(&self, session: &AuthorizationSession) -> Result<AuthorizationOutcome>;
}

// ============================================================================
// Callback parsing
// ============================================================================

/// Query parameters the provider appends to the redirect URI.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

impl CallbackParams {
    /// Parse what a user pasted: either the full redirect URL or a bare code.
    ///
    /// A bare code carries no `state`; it is attributed to `session_state`.
    pub fn from_pasted(input: &str, session_state: &str) -> Self {
        let input = input.trim();
        match Url::parse(input) {
            Ok(url) => {
                let mut params = CallbackParams::default();
                for (key, value) in url.query_pairs() {
                    let value = value.into_owned();
                    match key.as_ref() {
                        "code" => params.code = Some(value),
                        "state" => params.state = Some(value),
                        "error" => params.error = Some(value),
                        "error_description" => params.error_description = Some(value),
                        _ => {}
                    }
                }
                params
            }
            Err(_) => CallbackParams {
                code: Some(input.to_string()),
                state: Some(session_state.to_string()),
                ..Default::default()
            },
        }
    }

    /// Decide the outcome of a redirect for a session expecting `expected_state`.
    ///
    /// The state is checked before anything else, error redirects included:
    /// a request that does not carry this session's state cannot end it.
    pub fn resolve(self, expected_state: &str) -> Result<AuthorizationOutcome> {
        match self.state.as_deref() {
            Some(state) if state == expected_state => {}
            Some(_) => {
                return Err(AuthError::InvalidCallback("state mismatch".to_string()));
            }
            None => return Err(AuthError::InvalidCallback("missing state".to_string())),
        }

        if let Some(error) = self.error {
            if error == "access_denied" {
                return Ok(AuthorizationOutcome::Cancelled);
            }
            return Err(AuthError::InvalidCallback(match self.error_description {
                Some(desc) => format!("{}: {}", error, desc),
                None => error,
            }));
        }

        match self.code {
            Some(code) if !code.is_empty() => Ok(AuthorizationOutcome::Code(code)),
            _ => Err(AuthError::InvalidCallback("missing code".to_string())),
        }
    }
}

// ============================================================================
// LoopbackAuthorizer
// ============================================================================

/// Called with the authorization URL once the listener is ready.
pub type UrlHandler = Arc<dyn Fn(&str) + Send + Sync>;

/// Receives the provider redirect on a localhost HTTP listener.
///
/// The redirect URI must point at a loopback host, e.g.
/// `http://127.0.0.1:8421/callback`.
#[derive(Clone)]
pub struct LoopbackAuthorizer {
    timeout: Duration,
    cancel_on_ctrl_c: bool,
    url_handler: UrlHandler,
}

impl std::fmt::Debug for LoopbackAuthorizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopbackAuthorizer")
            .field("timeout", &self.timeout)
            .field("cancel_on_ctrl_c", &self.cancel_on_ctrl_c)
            .finish_non_exhaustive()
    }
}

impl Default for LoopbackAuthorizer {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopbackAuthorizer {
    /// Open the URL in the system browser and wait up to five minutes.
    pub fn new() -> Self {
        Self {
            timeout: DEFAULT_LOGIN_TIMEOUT,
            cancel_on_ctrl_c: true,
            url_handler: Arc::new(|url: &str| {
                if let Err(e) = open_in_browser(url) {
                    tracing::warn!(error = %e, "Could not open browser");
                }
            }),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Replace what happens with the authorization URL (print it, open it).
    pub fn with_url_handler(mut self, handler: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.url_handler = Arc::new(handler);
        self
    }

    /// Do not treat Ctrl-C as cancellation (embedders with their own handler).
    pub fn without_ctrl_c(mut self) -> Self {
        self.cancel_on_ctrl_c = false;
        self
    }
}

/// Listener address and callback path for a loopback redirect URI.
pub fn loopback_target(redirect_uri: &str) -> Result<(SocketAddr, String)> {
    let url = Url::parse(redirect_uri)
        .map_err(|e| AuthError::Config(format!("Invalid redirect URI '{}': {}", redirect_uri, e)))?;

    if url.scheme() != "http" {
        return Err(AuthError::Config(format!(
            "Loopback redirect URI must use http: {}",
            redirect_uri
        )));
    }

    let ip = match url.host() {
        Some(url::Host::Ipv4(ip)) if ip.is_loopback() => IpAddr::V4(ip),
        Some(url::Host::Ipv6(ip)) if ip.is_loopback() => IpAddr::V6(ip),
        Some(url::Host::Domain("localhost")) => IpAddr::V4(Ipv4Addr::LOCALHOST),
        _ => {
            return Err(AuthError::Config(format!(
                "Redirect URI host is not a loopback address: {}",
                redirect_uri
            )));
        }
    };

    let port = url.port_or_known_default().unwrap_or(80);
    Ok((SocketAddr::new(ip, port), url.path().to_string()))
}

struct CallbackState {
    expected_state: String,
    sender: parking_lot::Mutex<Option<oneshot::Sender<AuthorizationOutcome>>>,
}

/// Build the router answering the redirect.
fn callback_router(path: &str, state: Arc<CallbackState>) -> Router {
    Router::new()
        .route(path, get(handle_callback))
        .with_state(state)
}

async fn handle_callback(
    State(state): State<Arc<CallbackState>>,
    Query(params): Query<CallbackParams>,
) -> (StatusCode, &'static str) {
    match params.resolve(&state.expected_state) {
        Ok(outcome) => {
            let message = match outcome {
                AuthorizationOutcome::Code(_) => {
                    "Login complete. You can close this tab and return to the terminal."
                }
                AuthorizationOutcome::Cancelled => {
                    "Login cancelled. You can close this tab."
                }
            };
            match state.sender.lock().take() {
                Some(sender) => {
                    let _ = sender.send(outcome);
                    (StatusCode::OK, message)
                }
                None => (StatusCode::GONE, "This login attempt has already completed."),
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "Rejected authorization callback");
            (StatusCode::BAD_REQUEST, "Invalid authorization response.")
        }
    }
}

#[async_trait]
impl Authorizer for LoopbackAuthorizer {
    async fn authorize(&self, session: &AuthorizationSession) -> Result<AuthorizationOutcome> {
        let (addr, path) = loopback_target(&session.redirect_uri)?;
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            AuthError::Config(format!("Failed to listen on {} for the redirect: {}", addr, e))
        })?;

        let (tx, rx) = oneshot::channel();
        let state = Arc::new(CallbackState {
            expected_state: session.state.clone(),
            sender: parking_lot::Mutex::new(Some(tx)),
        });
        let router = callback_router(&path, state);

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let server = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
        });
        tracing::info!(%addr, "Waiting for authorization redirect");

        (self.url_handler)(&session.authorization_url());

        let ctrl_c = async {
            if self.cancel_on_ctrl_c {
                let _ = tokio::signal::ctrl_c().await;
            } else {
                std::future::pending::<()>().await;
            }
        };

        let outcome = tokio::select! {
            received = rx => received.unwrap_or(AuthorizationOutcome::Cancelled),
            _ = ctrl_c => {
                tracing::info!("Authorization interrupted");
                AuthorizationOutcome::Cancelled
            }
            _ = tokio::time::sleep(self.timeout) => {
                tracing::info!(timeout_secs = self.timeout.as_secs(), "Authorization timed out");
                AuthorizationOutcome::Cancelled
            }
        };

        let _ = shutdown_tx.send(());
        if let Err(e) = server.await {
            tracing::debug!(error = %e, "Redirect listener task ended abnormally");
        }

        Ok(outcome)
    }
}

/// Try to open a URL in the default browser.
pub fn open_in_browser(url: &str) -> std::io::Result<()> {
    #[cfg(target_os = "macos")]
    {
        std::process::Command::new("open").arg(url).status()?;
    }
    #[cfg(target_os = "linux")]
    {
        std::process::Command::new("xdg-open").arg(url).status()?;
    }
    #[cfg(target_os = "windows")]
    {
        std::process::Command::new("cmd")
            .args(["/C", "start", "", url])
            .status()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oauth::OAuthConfig;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn free_port() -> u16 {
        std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port()
    }

    fn session_for(redirect_uri: &str) -> AuthorizationSession {
        AuthorizationSession::new(&OAuthConfig::intra("client", "secret", redirect_uri))
    }

    fn test_state(expected: &str) -> (Arc<CallbackState>, oneshot::Receiver<AuthorizationOutcome>) {
        let (tx, rx) = oneshot::channel();
        let state = Arc::new(CallbackState {
            expected_state: expected.to_string(),
            sender: parking_lot::Mutex::new(Some(tx)),
        });
        (state, rx)
    }

    #[test]
    fn test_resolve_code() {
        let params = CallbackParams {
            code: Some("abc".to_string()),
            state: Some("s1".to_string()),
            ..Default::default()
        };
        assert_eq!(
            params.resolve("s1").unwrap(),
            AuthorizationOutcome::Code("abc".to_string())
        );
    }

    #[test]
    fn test_resolve_access_denied_is_cancel() {
        let params = CallbackParams {
            error: Some("access_denied".to_string()),
            state: Some("s1".to_string()),
            ..Default::default()
        };
        assert_eq!(params.resolve("s1").unwrap(), AuthorizationOutcome::Cancelled);
    }

    #[test]
    fn test_resolve_ignores_denial_without_matching_state() {
        let forged = CallbackParams {
            error: Some("access_denied".to_string()),
            state: Some("other".to_string()),
            ..Default::default()
        };
        assert!(matches!(forged.resolve("s1"), Err(AuthError::InvalidCallback(_))));

        let stateless = CallbackParams {
            error: Some("access_denied".to_string()),
            ..Default::default()
        };
        assert!(matches!(stateless.resolve("s1"), Err(AuthError::InvalidCallback(_))));
    }

    #[test]
    fn test_resolve_rejects_bad_state_and_missing_code() {
        let wrong_state = CallbackParams {
            code: Some("abc".to_string()),
            state: Some("other".to_string()),
            ..Default::default()
        };
        assert!(wrong_state.resolve("s1").is_err());

        let no_state = CallbackParams {
            code: Some("abc".to_string()),
            ..Default::default()
        };
        assert!(no_state.resolve("s1").is_err());

        let no_code = CallbackParams {
            state: Some("s1".to_string()),
            ..Default::default()
        };
        assert!(no_code.resolve("s1").is_err());
    }

    #[test]
    fn test_from_pasted_url_and_bare_code() {
        let params = CallbackParams::from_pasted(
            "http://127.0.0.1:8421/callback?code=abc&state=s1",
            "ignored",
        );
        assert_eq!(params.code.as_deref(), Some("abc"));
        assert_eq!(params.state.as_deref(), Some("s1"));

        let params = CallbackParams::from_pasted("  abc123  ", "s1");
        assert_eq!(
            params.resolve("s1").unwrap(),
            AuthorizationOutcome::Code("abc123".to_string())
        );
    }

    #[test]
    fn test_loopback_target() {
        let (addr, path) = loopback_target("http://127.0.0.1:8421/callback").unwrap();
        assert_eq!(addr, "127.0.0.1:8421".parse().unwrap());
        assert_eq!(path, "/callback");

        let (addr, _) = loopback_target("http://localhost/cb").unwrap();
        assert_eq!(addr.port(), 80);

        assert!(loopback_target("https://example.com/callback").is_err());
        assert!(loopback_target("http://example.com/callback").is_err());
        assert!(loopback_target("not a url").is_err());
    }

    #[tokio::test]
    async fn test_callback_route_delivers_code() {
        let (state, rx) = test_state("s1");
        let router = callback_router("/callback", state);

        let response = router
            .oneshot(
                Request::builder()
                    .uri("/callback?code=abc&state=s1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(rx.await.unwrap(), AuthorizationOutcome::Code("abc".to_string()));
    }

    #[tokio::test]
    async fn test_callback_route_rejects_wrong_state() {
        let (state, mut rx) = test_state("s1");
        let router = callback_router("/callback", state);

        let response = router
            .oneshot(
                Request::builder()
                    .uri("/callback?code=abc&state=forged")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_callback_route_ignores_foreign_denial() {
        let (state, mut rx) = test_state("s1");
        let router = callback_router("/callback", state);

        let response = router
            .oneshot(
                Request::builder()
                    .uri("/callback?error=access_denied")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_loopback_end_to_end() {
        let port = free_port();
        let session = session_for(&format!("http://127.0.0.1:{}/callback", port));
        let expected_state = session.state.clone();

        let (url_tx, mut url_rx) = tokio::sync::mpsc::unbounded_channel::<String>();
        let authorizer = LoopbackAuthorizer::new()
            .without_ctrl_c()
            .with_timeout(Duration::from_secs(10))
            .with_url_handler(move |url| {
                let _ = url_tx.send(url.to_string());
            });

        let task = tokio::spawn(async move { authorizer.authorize(&session).await });

        let auth_url = url_rx.recv().await.unwrap();
        let state = Url::parse(&auth_url)
            .unwrap()
            .query_pairs()
            .find(|(k, _)| k == "state")
            .map(|(_, v)| v.into_owned())
            .unwrap();
        assert_eq!(state, expected_state);

        let response = reqwest::get(format!(
            "http://127.0.0.1:{}/callback?code=the-code&state={}",
            port, state
        ))
        .await
        .unwrap();
        assert!(response.status().is_success());

        let outcome = task.await.unwrap().unwrap();
        assert_eq!(outcome, AuthorizationOutcome::Code("the-code".to_string()));
    }

    #[tokio::test]
    async fn test_loopback_user_denies() {
        let port = free_port();
        let session = session_for(&format!("http://127.0.0.1:{}/callback", port));

        let (url_tx, mut url_rx) = tokio::sync::mpsc::unbounded_channel::<String>();
        let authorizer = LoopbackAuthorizer::new()
            .without_ctrl_c()
            .with_url_handler(move |url| {
                let _ = url_tx.send(url.to_string());
            });

        let expected_state = session.state.clone();
        let task = tokio::spawn(async move { authorizer.authorize(&session).await });
        url_rx.recv().await.unwrap();

        reqwest::get(format!(
            "http://127.0.0.1:{}/callback?error=access_denied&state={}",
            port, expected_state
        ))
        .await
        .unwrap();

        assert_eq!(task.await.unwrap().unwrap(), AuthorizationOutcome::Cancelled);
    }

    #[tokio::test]
    async fn test_loopback_timeout_is_cancel() {
        let port = free_port();
        let session = session_for(&format!("http://127.0.0.1:{}/callback", port));
        let authorizer = LoopbackAuthorizer::new()
            .without_ctrl_c()
            .with_timeout(Duration::from_millis(50))
            .with_url_handler(|_| {});

        let outcome = authorizer.authorize(&session).await.unwrap();
        assert_eq!(outcome, AuthorizationOutcome::Cancelled);
    }
}
