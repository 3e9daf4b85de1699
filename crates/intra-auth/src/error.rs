//! Error types for the token lifecycle.

/// Result type alias for this crate.
pub type Result<T> = std::result::Result<T, AuthError>;

/// Errors that can occur while acquiring, refreshing or storing tokens.
///
/// Public lifecycle operations never surface these to callers; they are
/// logged and collapsed into a `bool` or an `Option`.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The user dismissed the interactive authorization UI.
    #[error("authorization cancelled by user")]
    AuthorizationCancelled,

    /// The token endpoint answered with a non-2xx status or a malformed body.
    #[error("token exchange failed{}: {reason}", .status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    ExchangeFailed {
        status: Option<u16>,
        reason: String,
    },

    /// The redirect back from the authorization UI was unusable.
    #[error("invalid authorization callback: {0}")]
    InvalidCallback(String),

    /// Transport-level failure, including timeouts.
    #[error("network unavailable: {0}")]
    NetworkUnavailable(String),

    /// Secure storage rejected a read or write.
    #[error("storage error: {0}")]
    Storage(String),

    /// Invalid configuration (redirect URI, endpoints).
    #[error("config error: {0}")]
    Config(String),
}

impl AuthError {
    /// Whether the provider itself rejected the request, as opposed to the
    /// request never reaching it.
    pub fn is_rejection(&self) -> bool {
        matches!(self, AuthError::ExchangeFailed { .. })
    }
}
