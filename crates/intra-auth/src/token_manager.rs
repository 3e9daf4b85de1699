//! Token lifecycle management.
//!
//! [`TokenManager`] runs the interactive login, hands out valid access tokens
//! (refreshing them shortly before expiry), and clears credentials on logout.
//! Every failure is logged and collapsed into `false` / `None`; callers only
//! learn whether they are authenticated.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};

use crate::authorizer::{AuthorizationOutcome, Authorizer};
use crate::credentials::{Credentials, REFRESH_SKEW, TokenInfo};
use crate::error::{AuthError, Result};
use crate::oauth::{self, AuthorizationSession, OAuthConfig};
use crate::store::SharedTokenStore;

/// Upper bound on a single token endpoint call.
pub const DEFAULT_REFRESH_TIMEOUT: Duration = Duration::from_secs(10);

// ============================================================================
// Public types
// ============================================================================

/// Authentication state as seen by listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    /// No credentials stored.
    LoggedOut,
    /// Credentials stored and usable.
    LoggedIn,
    /// Credentials stored but the last refresh failed; every token request
    /// yields `None` until logout or a new login.
    Stale,
}

/// What to do with stored credentials when a refresh fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RefreshFailurePolicy {
    /// Leave the stale record in place; the next request retries the refresh.
    #[default]
    KeepStale,
    /// Clear the store when the provider rejected the refresh token.
    /// Transport failures and timeouts never clear.
    ClearOnRejection,
}

/// Source of bearer tokens for outgoing API requests.
#[async_trait]
pub trait AccessTokenSource: Send + Sync {
    /// A currently valid access token, or `None` to send the request
    /// unauthenticated.
    async fn access_token(&self) -> Option<String>;
}

/// Handle returned by [`TokenManager::on_auth_state_changed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Arc<dyn Fn(AuthState) + Send + Sync>;
type RefreshFuture = Shared<BoxFuture<'static, Option<String>>>;

struct InFlightRefresh {
    generation: u64,
    future: RefreshFuture,
}

// ============================================================================
// TokenManager
// ============================================================================

/// OAuth token lifecycle manager.
///
/// Cheap to clone; clones share the in-flight refresh, listeners and state.
#[derive(Clone)]
pub struct TokenManager {
    inner: Arc<Inner>,
}

struct Inner {
    config: OAuthConfig,
    store: SharedTokenStore,
    authorizer: Arc<dyn Authorizer>,
    http: reqwest::Client,
    refresh_policy: RefreshFailurePolicy,
    refresh_timeout: Duration,
    /// Serializes every store mutation (refresh, login, logout).
    write_lock: tokio::sync::Mutex<()>,
    in_flight: parking_lot::Mutex<Option<InFlightRefresh>>,
    next_generation: AtomicU64,
    state: parking_lot::Mutex<Option<AuthState>>,
    listeners: parking_lot::RwLock<Vec<(ListenerId, Listener)>>,
    next_listener: AtomicU64,
}

impl std::fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenManager")
            .field("config", &self.inner.config)
            .field("store", &self.inner.store)
            .field("refresh_policy", &self.inner.refresh_policy)
            .field("refresh_timeout", &self.inner.refresh_timeout)
            .finish_non_exhaustive()
    }
}

impl TokenManager {
    /// Create a manager with default policy and timeouts.
    pub fn new(
        config: OAuthConfig,
        store: SharedTokenStore,
        authorizer: Arc<dyn Authorizer>,
    ) -> Self {
        Self::builder(config, store, authorizer).build()
    }

    pub fn builder(
        config: OAuthConfig,
        store: SharedTokenStore,
        authorizer: Arc<dyn Authorizer>,
    ) -> TokenManagerBuilder {
        TokenManagerBuilder {
            config,
            store,
            authorizer,
            http: None,
            refresh_policy: RefreshFailurePolicy::default(),
            refresh_timeout: DEFAULT_REFRESH_TIMEOUT,
        }
    }

    /// Run the interactive authorization-code flow.
    ///
    /// Returns `true` only when the user authorized, the code was exchanged
    /// and the credentials were stored. Cancellation and every failure yield
    /// `false`; the store is left untouched in those cases.
    pub async fn begin_interactive_login(&self) -> bool {
        match self.try_login().await {
            Ok(()) => {
                tracing::info!("Login succeeded");
                true
            }
            Err(AuthError::AuthorizationCancelled) => {
                tracing::info!("Login cancelled by user");
                false
            }
            Err(e) => {
                tracing::warn!(error = %e, "Login failed");
                false
            }
        }
    }

    async fn try_login(&self) -> Result<()> {
        let inner = &self.inner;
        let session = AuthorizationSession::new(&inner.config);

        let code = match inner.authorizer.authorize(&session).await? {
            AuthorizationOutcome::Code(code) => code,
            AuthorizationOutcome::Cancelled => return Err(AuthError::AuthorizationCancelled),
        };

        let response = inner
            .with_timeout(oauth::exchange_code(&inner.http, &inner.config, &code))
            .await?;
        let credentials = Credentials::from_token_response(response, Utc::now());

        {
            let _guard = inner.write_lock.lock().await;
            inner.store.save(&credentials).await?;
        }
        inner.transition(AuthState::LoggedIn, true);
        Ok(())
    }

    /// A currently valid access token, refreshing first when it expires within
    /// [`REFRESH_SKEW`]. `None` when logged out or when the refresh failed.
    ///
    /// Concurrent callers that all see a near-expiry token share one refresh.
    pub async fn get_valid_access_token(&self) -> Option<String> {
        let credentials = match self.inner.store.load().await {
            Ok(Some(credentials)) => credentials,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load credentials");
                return None;
            }
        };

        if !credentials.needs_refresh(Utc::now(), REFRESH_SKEW) {
            return Some(credentials.access_token);
        }

        self.shared_refresh().await
    }

    /// Join the in-flight refresh, or start one.
    ///
    /// The refresh runs on its own task: it completes, persists and releases
    /// the write lock even if every waiting caller is dropped.
    async fn shared_refresh(&self) -> Option<String> {
        let future = {
            let mut slot = self.inner.in_flight.lock();
            match slot.as_ref() {
                Some(in_flight) => in_flight.future.clone(),
                None => {
                    let generation = self.inner.next_generation.fetch_add(1, Ordering::SeqCst);
                    let task = tokio::spawn({
                        let inner = Arc::clone(&self.inner);
                        async move {
                            let token = inner.refresh().await;
                            inner.finish_refresh(generation);
                            token
                        }
                    });
                    let inner = Arc::clone(&self.inner);
                    let future = async move {
                        match task.await {
                            Ok(token) => token,
                            Err(e) => {
                                tracing::warn!(error = %e, "Token refresh task failed");
                                inner.finish_refresh(generation);
                                None
                            }
                        }
                    }
                    .boxed()
                    .shared();
                    *slot = Some(InFlightRefresh {
                        generation,
                        future: future.clone(),
                    });
                    future
                }
            }
        };
        future.await
    }

    /// Remove stored credentials. No revocation call is made.
    pub async fn logout(&self) {
        {
            let _guard = self.inner.write_lock.lock().await;
            if let Err(e) = self.inner.store.clear().await {
                tracing::warn!(error = %e, "Failed to clear credentials");
            }
        }
        tracing::info!("Logged out");
        self.inner.transition(AuthState::LoggedOut, true);
    }

    /// Equivalent to `get_valid_access_token().is_some()`.
    pub async fn is_logged_in(&self) -> bool {
        self.get_valid_access_token().await.is_some()
    }

    /// Last known state, read from the store on first use.
    pub async fn current_state(&self) -> AuthState {
        let known = *self.inner.state.lock();
        if let Some(state) = known {
            return state;
        }

        let observed = match self.inner.store.load().await {
            Ok(Some(_)) => AuthState::LoggedIn,
            Ok(None) => AuthState::LoggedOut,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load credentials");
                AuthState::LoggedOut
            }
        };
        *self.inner.state.lock().get_or_insert(observed)
    }

    /// Expiry information for display. Makes no network call.
    pub async fn token_info(&self) -> Result<Option<TokenInfo>> {
        let credentials = self.inner.store.load().await?;
        Ok(credentials.map(|c| TokenInfo::from_credentials(&c, Utc::now())))
    }

    /// Register a listener fired after login, logout, and refreshes that
    /// change the authentication state.
    pub fn on_auth_state_changed(
        &self,
        listener: impl Fn(AuthState) + Send + Sync + 'static,
    ) -> ListenerId {
        let id = ListenerId(self.inner.next_listener.fetch_add(1, Ordering::SeqCst));
        self.inner.listeners.write().push((id, Arc::new(listener)));
        id
    }

    /// Unregister a listener. Returns `false` if it was not registered.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.inner.listeners.write();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }
}

#[async_trait]
impl AccessTokenSource for TokenManager {
    async fn access_token(&self) -> Option<String> {
        self.get_valid_access_token().await
    }
}

impl Inner {
    async fn with_timeout<T>(
        &self,
        request: impl std::future::Future<Output = Result<T>>,
    ) -> Result<T> {
        match tokio::time::timeout(self.refresh_timeout, request).await {
            Ok(result) => result,
            Err(_) => Err(AuthError::NetworkUnavailable(format!(
                "token endpoint did not answer within {}s",
                self.refresh_timeout.as_secs_f32()
            ))),
        }
    }

    /// Body of the shared refresh future.
    async fn refresh(&self) -> Option<String> {
        let _guard = self.write_lock.lock().await;

        // Re-read under the lock: an earlier refresh or a login may already
        // have replaced the record this caller saw.
        let credentials = match self.store.load().await {
            Ok(Some(credentials)) => credentials,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load credentials");
                return None;
            }
        };
        if !credentials.needs_refresh(Utc::now(), REFRESH_SKEW) {
            return Some(credentials.access_token);
        }

        tracing::info!(expires_at = %credentials.expires_at, "Access token expiring, refreshing");
        let result = self
            .with_timeout(oauth::refresh_token(
                &self.http,
                &self.config,
                &credentials.refresh_token,
            ))
            .await;

        match result {
            Ok(response) => {
                let renewed = Credentials::from_token_response(response, Utc::now());
                if let Err(e) = self.store.save(&renewed).await {
                    tracing::warn!(error = %e, "Failed to store refreshed credentials");
                    self.transition(AuthState::Stale, false);
                    return None;
                }
                tracing::info!(expires_at = %renewed.expires_at, "Token refreshed");
                self.transition(AuthState::LoggedIn, false);
                Some(renewed.access_token)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Token refresh failed");
                if e.is_rejection() && self.refresh_policy == RefreshFailurePolicy::ClearOnRejection
                {
                    match self.store.clear().await {
                        Ok(()) => {
                            tracing::info!("Cleared rejected credentials");
                            self.transition(AuthState::LoggedOut, false);
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "Failed to clear credentials");
                            self.transition(AuthState::Stale, false);
                        }
                    }
                } else {
                    self.transition(AuthState::Stale, false);
                }
                None
            }
        }
    }

    fn finish_refresh(&self, generation: u64) {
        let mut slot = self.in_flight.lock();
        if slot.as_ref().is_some_and(|f| f.generation == generation) {
            *slot = None;
        }
    }

    fn transition(&self, next: AuthState, always_notify: bool) {
        let previous = self.state.lock().replace(next);
        if always_notify || previous != Some(next) {
            tracing::debug!(?previous, ?next, "Auth state changed");
            let listeners: Vec<Listener> = self
                .listeners
                .read()
                .iter()
                .map(|(_, listener)| Arc::clone(listener))
                .collect();
            for listener in listeners {
                listener(next);
            }
        }
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for [`TokenManager`].
pub struct TokenManagerBuilder {
    config: OAuthConfig,
    store: SharedTokenStore,
    authorizer: Arc<dyn Authorizer>,
    http: Option<reqwest::Client>,
    refresh_policy: RefreshFailurePolicy,
    refresh_timeout: Duration,
}

impl TokenManagerBuilder {
    pub fn refresh_policy(mut self, policy: RefreshFailurePolicy) -> Self {
        self.refresh_policy = policy;
        self
    }

    /// Bound on each token endpoint call; a timeout counts as a failure.
    pub fn refresh_timeout(mut self, timeout: Duration) -> Self {
        self.refresh_timeout = timeout;
        self
    }

    pub fn http_client(mut self, http: reqwest::Client) -> Self {
        self.http = Some(http);
        self
    }

    pub fn build(self) -> TokenManager {
        TokenManager {
            inner: Arc::new(Inner {
                config: self.config,
                store: self.store,
                authorizer: self.authorizer,
                http: self.http.unwrap_or_default(),
                refresh_policy: self.refresh_policy,
                refresh_timeout: self.refresh_timeout,
                write_lock: tokio::sync::Mutex::new(()),
                in_flight: parking_lot::Mutex::new(None),
                next_generation: AtomicU64::new(0),
                state: parking_lot::Mutex::new(None),
                listeners: parking_lot::RwLock::new(Vec::new()),
                next_listener: AtomicU64::new(0),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, TokenStore};
    use chrono::Duration as ChronoDuration;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, AtomicU32};
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Authorizer returning a fixed outcome.
    #[derive(Debug)]
    struct ScriptedAuthorizer {
        outcome: AuthorizationOutcome,
        calls: AtomicU32,
    }

    impl ScriptedAuthorizer {
        fn new(outcome: AuthorizationOutcome) -> Arc<Self> {
            Arc::new(Self {
                outcome,
                calls: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl Authorizer for ScriptedAuthorizer {
        async fn authorize(&self, session: &AuthorizationSession) -> Result<AuthorizationOutcome> {
            assert!(!session.state.is_empty());
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.outcome.clone())
        }
    }

    /// Store whose reads or writes can be made to fail.
    #[derive(Debug, Default)]
    struct FailingStore {
        records: MemoryStore,
        fail_load: AtomicBool,
        fail_save: AtomicBool,
    }

    impl FailingStore {
        fn holding(access: &str, refresh: &str, expires_in_secs: i64) -> Self {
            Self {
                records: MemoryStore::with_credentials(Credentials::new(
                    access,
                    refresh,
                    Utc::now() + ChronoDuration::seconds(expires_in_secs),
                )),
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl TokenStore for FailingStore {
        async fn save(&self, credentials: &Credentials) -> Result<()> {
            if self.fail_save.load(Ordering::SeqCst) {
                return Err(AuthError::Storage("disk full".to_string()));
            }
            self.records.save(credentials).await
        }

        async fn load(&self) -> Result<Option<Credentials>> {
            if self.fail_load.load(Ordering::SeqCst) {
                return Err(AuthError::Storage("permission denied".to_string()));
            }
            self.records.load().await
        }

        async fn clear(&self) -> Result<()> {
            self.records.clear().await
        }
    }

    fn config_for(server: &MockServer) -> OAuthConfig {
        OAuthConfig::intra("uid", "secret", "http://127.0.0.1:8421/callback").with_endpoints(
            format!("{}/oauth/authorize", server.uri()),
            format!("{}/oauth/token", server.uri()),
        )
    }

    fn stored(access: &str, refresh: &str, expires_in_secs: i64) -> Arc<MemoryStore> {
        Arc::new(MemoryStore::with_credentials(Credentials::new(
            access,
            refresh,
            Utc::now() + ChronoDuration::seconds(expires_in_secs),
        )))
    }

    fn manager(server: &MockServer, store: Arc<MemoryStore>) -> TokenManager {
        TokenManager::new(
            config_for(server),
            store,
            ScriptedAuthorizer::new(AuthorizationOutcome::Cancelled),
        )
    }

    fn token_response(access: &str, refresh: &str, expires_in: u64) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "access_token": access,
            "refresh_token": refresh,
            "expires_in": expires_in,
            "token_type": "bearer",
            "scope": "public",
        }))
    }

    fn record_states(manager: &TokenManager) -> Arc<parking_lot::Mutex<Vec<AuthState>>> {
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        manager.on_auth_state_changed(move |state| sink.lock().push(state));
        seen
    }

    #[tokio::test]
    async fn test_fresh_token_returned_without_network() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(token_response("A2", "R2", 7200))
            .expect(0)
            .mount(&server)
            .await;

        let manager = manager(&server, stored("A1", "R1", 3600));
        assert_eq!(manager.get_valid_access_token().await.as_deref(), Some("A1"));
        assert!(manager.is_logged_in().await);
    }

    #[tokio::test]
    async fn test_near_expiry_refreshes_and_rotates() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .and(body_partial_json(json!({
                "grant_type": "refresh_token",
                "refresh_token": "R1",
                "client_id": "uid",
                "client_secret": "secret",
            })))
            .respond_with(token_response("A2", "R2", 7200))
            .expect(1)
            .mount(&server)
            .await;

        let store = stored("A1", "R1", 60);
        let manager = manager(&server, store.clone());

        assert_eq!(manager.get_valid_access_token().await.as_deref(), Some("A2"));

        let saved = store.load().await.unwrap().unwrap();
        assert_eq!(saved.access_token, "A2");
        assert_eq!(saved.refresh_token, "R2");
        assert!(saved.expires_at > Utc::now() + ChronoDuration::seconds(7000));

        // The rotated record is fresh; no second refresh.
        assert_eq!(manager.get_valid_access_token().await.as_deref(), Some("A2"));
    }

    #[tokio::test]
    async fn test_expired_token_refreshes() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(token_response("A2", "R2", 7200))
            .expect(1)
            .mount(&server)
            .await;

        let manager = manager(&server, stored("A1", "R1", -30));
        assert_eq!(manager.get_valid_access_token().await.as_deref(), Some("A2"));
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_refresh() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(
                token_response("A2", "R2", 7200).set_delay(std::time::Duration::from_millis(200)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let store = stored("A1", "R1", 60);
        let manager = manager(&server, store.clone());

        let callers: Vec<_> = (0..8)
            .map(|_| {
                let manager = manager.clone();
                tokio::spawn(async move { manager.get_valid_access_token().await })
            })
            .collect();

        for caller in callers {
            assert_eq!(caller.await.unwrap().as_deref(), Some("A2"));
        }
        assert_eq!(store.save_count(), 1);
        assert_eq!(store.load().await.unwrap().unwrap().refresh_token, "R2");
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_failed_refresh() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(
                ResponseTemplate::new(400)
                    .set_body_json(json!({"error": "invalid_grant"}))
                    .set_delay(std::time::Duration::from_millis(200)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let manager = manager(&server, stored("A1", "R1", 60));
        let results = futures::future::join_all(
            (0..5).map(|_| {
                let manager = manager.clone();
                async move { manager.get_valid_access_token().await }
            }),
        )
        .await;

        assert!(results.iter().all(Option::is_none));
    }

    #[tokio::test]
    async fn test_refresh_finishes_after_caller_gives_up() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(
                token_response("A2", "R2", 7200).set_delay(std::time::Duration::from_millis(300)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let store = stored("A1", "R1", 60);
        let manager = manager(&server, store.clone());

        let abandoned =
            tokio::time::timeout(Duration::from_millis(50), manager.get_valid_access_token()).await;
        assert!(abandoned.is_err());

        // Nobody is waiting, yet the rotated pair still lands in the store.
        tokio::time::sleep(Duration::from_millis(800)).await;
        let saved = store.load().await.unwrap().unwrap();
        assert_eq!(saved.refresh_token, "R2");
        assert_eq!(store.save_count(), 1);
        assert_eq!(manager.get_valid_access_token().await.as_deref(), Some("A2"));
    }

    #[tokio::test]
    async fn test_logout_not_blocked_by_abandoned_refresh() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(
                token_response("A2", "R2", 7200).set_delay(std::time::Duration::from_millis(300)),
            )
            .mount(&server)
            .await;

        let store = stored("A1", "R1", 60);
        let manager = manager(&server, store.clone());

        let abandoned =
            tokio::time::timeout(Duration::from_millis(50), manager.get_valid_access_token()).await;
        assert!(abandoned.is_err());

        tokio::time::timeout(Duration::from_secs(3), manager.logout())
            .await
            .expect("logout waits only for the running refresh");
        assert!(store.load().await.unwrap().is_none());
        assert_eq!(manager.current_state().await, AuthState::LoggedOut);
    }

    #[tokio::test]
    async fn test_failed_save_after_refresh_is_stale() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(token_response("A2", "R2", 7200))
            .expect(1)
            .mount(&server)
            .await;

        let store = Arc::new(FailingStore::holding("A1", "R1", 60));
        store.fail_save.store(true, Ordering::SeqCst);
        let manager = TokenManager::new(
            config_for(&server),
            store.clone(),
            ScriptedAuthorizer::new(AuthorizationOutcome::Cancelled),
        );
        let states = record_states(&manager);

        assert_eq!(manager.get_valid_access_token().await, None);
        assert_eq!(manager.current_state().await, AuthState::Stale);
        assert_eq!(*states.lock(), vec![AuthState::Stale]);
        assert_eq!(store.load().await.unwrap().unwrap().refresh_token, "R1");
    }

    #[tokio::test]
    async fn test_unreadable_store_yields_none() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(token_response("A2", "R2", 7200))
            .expect(0)
            .mount(&server)
            .await;

        let store = Arc::new(FailingStore::holding("A1", "R1", 3600));
        store.fail_load.store(true, Ordering::SeqCst);
        let manager = TokenManager::new(
            config_for(&server),
            store,
            ScriptedAuthorizer::new(AuthorizationOutcome::Cancelled),
        );

        assert_eq!(manager.get_valid_access_token().await, None);
        assert!(!manager.is_logged_in().await);
        assert!(manager.token_info().await.is_err());
    }

    #[tokio::test]
    async fn test_login_fails_when_save_fails() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(token_response("A1", "R1", 7200))
            .expect(1)
            .mount(&server)
            .await;

        let store = Arc::new(FailingStore::default());
        store.fail_save.store(true, Ordering::SeqCst);
        let manager = TokenManager::new(
            config_for(&server),
            store.clone(),
            ScriptedAuthorizer::new(AuthorizationOutcome::Code("the-code".to_string())),
        );
        let states = record_states(&manager);

        assert!(!manager.begin_interactive_login().await);
        assert!(states.lock().is_empty());
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_successful_refresh_recovers_from_stale() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(token_response("A2", "R2", 7200))
            .mount(&server)
            .await;

        let store = stored("A1", "R1", 60);
        let manager = manager(&server, store.clone());
        let states = record_states(&manager);

        assert_eq!(manager.get_valid_access_token().await, None);
        assert_eq!(manager.current_state().await, AuthState::Stale);

        assert_eq!(manager.get_valid_access_token().await.as_deref(), Some("A2"));
        assert_eq!(manager.current_state().await, AuthState::LoggedIn);
        assert_eq!(*states.lock(), vec![AuthState::Stale, AuthState::LoggedIn]);
    }

    #[tokio::test]
    async fn test_rejected_refresh_keeps_stale_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": "invalid_grant",
                "error_description": "The provided authorization grant is invalid",
            })))
            .mount(&server)
            .await;

        let store = stored("A1", "R1", 60);
        let manager = manager(&server, store.clone());
        let states = record_states(&manager);

        assert_eq!(manager.get_valid_access_token().await, None);

        let kept = store.load().await.unwrap().unwrap();
        assert_eq!(kept.refresh_token, "R1");
        assert_eq!(manager.current_state().await, AuthState::Stale);
        assert_eq!(*states.lock(), vec![AuthState::Stale]);

        // Still stale on the next call; no duplicate notification.
        assert_eq!(manager.get_valid_access_token().await, None);
        assert_eq!(*states.lock(), vec![AuthState::Stale]);
    }

    #[tokio::test]
    async fn test_rejected_refresh_clears_under_policy() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({"error": "invalid_grant"})))
            .expect(1)
            .mount(&server)
            .await;

        let store = stored("A1", "R1", 60);
        let manager = TokenManager::builder(
            config_for(&server),
            store.clone(),
            ScriptedAuthorizer::new(AuthorizationOutcome::Cancelled),
        )
        .refresh_policy(RefreshFailurePolicy::ClearOnRejection)
        .build();
        let states = record_states(&manager);

        assert_eq!(manager.get_valid_access_token().await, None);
        assert!(store.load().await.unwrap().is_none());
        assert_eq!(*states.lock(), vec![AuthState::LoggedOut]);

        // Nothing left to refresh with.
        assert_eq!(manager.get_valid_access_token().await, None);
    }

    #[tokio::test]
    async fn test_network_failure_never_clears_under_policy() {
        let config = OAuthConfig::intra("uid", "secret", "http://127.0.0.1:8421/callback")
            .with_endpoints("http://127.0.0.1:9/oauth/authorize", "http://127.0.0.1:9/oauth/token");
        let store = stored("A1", "R1", 60);
        let manager = TokenManager::builder(
            config,
            store.clone(),
            ScriptedAuthorizer::new(AuthorizationOutcome::Cancelled),
        )
        .refresh_policy(RefreshFailurePolicy::ClearOnRejection)
        .build();

        assert_eq!(manager.get_valid_access_token().await, None);
        assert_eq!(store.load().await.unwrap().unwrap().refresh_token, "R1");
    }

    #[tokio::test]
    async fn test_refresh_timeout_is_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(
                token_response("A2", "R2", 7200).set_delay(std::time::Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let store = stored("A1", "R1", 60);
        let manager = TokenManager::builder(
            config_for(&server),
            store.clone(),
            ScriptedAuthorizer::new(AuthorizationOutcome::Cancelled),
        )
        .refresh_timeout(Duration::from_millis(100))
        .build();

        assert_eq!(manager.get_valid_access_token().await, None);
        assert_eq!(store.load().await.unwrap().unwrap().access_token, "A1");
    }

    #[tokio::test]
    async fn test_cleared_store_returns_none_without_network() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(token_response("A2", "R2", 7200))
            .expect(0)
            .mount(&server)
            .await;

        let store = stored("A1", "R1", 60);
        store.clear().await.unwrap();
        let manager = manager(&server, store.clone());

        assert!(store.load().await.unwrap().is_none());
        assert_eq!(manager.get_valid_access_token().await, None);
        assert!(!manager.is_logged_in().await);
    }

    #[tokio::test]
    async fn test_cancelled_login_leaves_store_untouched() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(token_response("A2", "R2", 7200))
            .expect(0)
            .mount(&server)
            .await;

        let store = stored("A1", "R1", 3600);
        let authorizer = ScriptedAuthorizer::new(AuthorizationOutcome::Cancelled);
        let manager = TokenManager::new(config_for(&server), store.clone(), authorizer.clone());
        let states = record_states(&manager);

        assert!(!manager.begin_interactive_login().await);
        assert_eq!(authorizer.calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.save_count(), 0);
        assert_eq!(store.load().await.unwrap().unwrap().access_token, "A1");
        assert!(states.lock().is_empty());
    }

    #[tokio::test]
    async fn test_login_exchanges_code_and_persists() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .and(body_partial_json(json!({
                "grant_type": "authorization_code",
                "code": "the-code",
                "redirect_uri": "http://127.0.0.1:8421/callback",
            })))
            .respond_with(token_response("A1", "R1", 7200))
            .expect(1)
            .mount(&server)
            .await;

        let store = Arc::new(MemoryStore::new());
        let manager = TokenManager::new(
            config_for(&server),
            store.clone(),
            ScriptedAuthorizer::new(AuthorizationOutcome::Code("the-code".to_string())),
        );
        let states = record_states(&manager);

        assert_eq!(manager.current_state().await, AuthState::LoggedOut);
        assert!(manager.begin_interactive_login().await);

        let saved = store.load().await.unwrap().unwrap();
        assert_eq!(saved.access_token, "A1");
        assert_eq!(saved.refresh_token, "R1");
        assert_eq!(*states.lock(), vec![AuthState::LoggedIn]);
        assert_eq!(manager.get_valid_access_token().await.as_deref(), Some("A1"));
    }

    #[tokio::test]
    async fn test_failed_exchange_returns_false() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let store = Arc::new(MemoryStore::new());
        let manager = TokenManager::new(
            config_for(&server),
            store.clone(),
            ScriptedAuthorizer::new(AuthorizationOutcome::Code("the-code".to_string())),
        );

        assert!(!manager.begin_interactive_login().await);
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_logout_clears_and_notifies() {
        let server = MockServer::start().await;
        let store = stored("A1", "R1", 3600);
        let manager = manager(&server, store.clone());
        let states = record_states(&manager);

        manager.logout().await;
        assert!(store.load().await.unwrap().is_none());
        assert!(!manager.is_logged_in().await);
        assert_eq!(manager.current_state().await, AuthState::LoggedOut);

        // Logging out twice is harmless and still notifies.
        manager.logout().await;
        assert_eq!(*states.lock(), vec![AuthState::LoggedOut, AuthState::LoggedOut]);
    }

    #[tokio::test]
    async fn test_stale_then_relogin_recovers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .and(body_partial_json(json!({"grant_type": "refresh_token"})))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({"error": "invalid_grant"})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .and(body_partial_json(json!({"grant_type": "authorization_code"})))
            .respond_with(token_response("A3", "R3", 7200))
            .mount(&server)
            .await;

        let store = stored("A1", "R1", 60);
        let manager = TokenManager::new(
            config_for(&server),
            store.clone(),
            ScriptedAuthorizer::new(AuthorizationOutcome::Code("c".to_string())),
        );
        let states = record_states(&manager);

        assert_eq!(manager.get_valid_access_token().await, None);
        assert!(manager.begin_interactive_login().await);
        assert_eq!(manager.get_valid_access_token().await.as_deref(), Some("A3"));
        assert_eq!(*states.lock(), vec![AuthState::Stale, AuthState::LoggedIn]);
    }

    #[tokio::test]
    async fn test_remove_listener() {
        let server = MockServer::start().await;
        let manager = manager(&server, Arc::new(MemoryStore::new()));

        let count = Arc::new(AtomicU32::new(0));
        let sink = Arc::clone(&count);
        let id = manager.on_auth_state_changed(move |_| {
            sink.fetch_add(1, Ordering::SeqCst);
        });

        manager.logout().await;
        assert!(manager.remove_listener(id));
        assert!(!manager.remove_listener(id));
        manager.logout().await;

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_token_info() {
        let server = MockServer::start().await;
        let manager = manager(&server, stored("A1", "R1", 7200));
        let info = manager.token_info().await.unwrap().unwrap();
        assert!(!info.needs_refresh);
        assert!(info.expires_in_secs > 7000);

        let empty = manager_for_empty(&server);
        assert!(empty.token_info().await.unwrap().is_none());
    }

    fn manager_for_empty(server: &MockServer) -> TokenManager {
        manager(server, Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn test_access_token_source_delegates() {
        let server = MockServer::start().await;
        let source: Arc<dyn AccessTokenSource> =
            Arc::new(manager(&server, stored("A1", "R1", 3600)));
        assert_eq!(source.access_token().await.as_deref(), Some("A1"));
    }
}
