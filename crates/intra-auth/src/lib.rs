//! OAuth token lifecycle for the 42 intranet API.
//!
//! Signs the user in through the authorization-code flow, keeps the
//! resulting credentials encrypted at rest, and refreshes them shortly
//! before they expire so callers always get a usable access token.
//!
//! # Components
//!
//! - [`oauth`] - Provider endpoints, authorization URL, code exchange and refresh
//! - [`credentials`] - The persisted access/refresh/expiry record
//! - [`store`] - Secure credential storage (age-encrypted file, OS keyring, memory)
//! - [`authorizer`] - Interactive authorization UI (loopback redirect server)
//! - [`token_manager`] - Login, single-flight refresh, logout and state listeners

pub mod authorizer;
pub mod credentials;
pub mod error;
pub mod oauth;
pub mod store;
pub mod token_manager;

pub use authorizer::{AuthorizationOutcome, Authorizer, CallbackParams, LoopbackAuthorizer};
pub use credentials::{Credentials, REFRESH_SKEW, TokenInfo};
pub use error::{AuthError, Result};
pub use oauth::{AuthorizationSession, OAuthConfig};
pub use store::{
    EncryptedFileStore, MemoryStore, SharedTokenStore, StoreKind, TokenStore, open_store,
};
pub use token_manager::{
    AccessTokenSource, AuthState, ListenerId, RefreshFailurePolicy, TokenManager,
    TokenManagerBuilder,
};

#[cfg(feature = "keyring")]
pub use store::KeyringStore;
