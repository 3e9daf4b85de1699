//! Errors returned by [`IntraClient`](crate::IntraClient).

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Transport failure, timeout, or an undecodable body.
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Any non-2xx answer other than 401 and 404.
    #[error("intranet API returned {status}: {message}")]
    Api { status: u16, message: String },

    /// 401: no token, or the token was expired or revoked.
    #[error("not authorized: {0}")]
    Auth(String),

    /// 404.
    #[error("not found: {0}")]
    NotFound(String),

    #[error("client misconfigured: {0}")]
    Config(String),
}

impl Error {
    /// Classify a failed response.
    pub(crate) fn from_status(status: u16, message: String) -> Self {
        match status {
            401 => Error::Auth(message),
            404 => Error::NotFound(message),
            _ => Error::Api { status, message },
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    pub fn is_auth_error(&self) -> bool {
        matches!(self, Error::Auth(_))
    }

    /// The intranet allows a handful of requests per second per application.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Error::Api { status: 429, .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Error body shapes seen from the intranet: `{"error": ..}` from the OAuth
/// layer and `{"message": ..}` from the API itself.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ErrorResponse {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl ErrorResponse {
    pub(crate) fn into_message(self, status: u16) -> String {
        self.message
            .or(self.error)
            .unwrap_or_else(|| format!("HTTP {}", status))
    }
}
