//! The persisted credential record.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::oauth::TokenResponse;

/// Safety margin before expiry at which a proactive refresh is triggered.
pub const REFRESH_SKEW: Duration = Duration::minutes(5);

/// Access token, refresh token and absolute expiry, always stored together.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl Credentials {
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            expires_at,
        }
    }

    /// Build a record from a token endpoint response received at `now`.
    pub fn from_token_response(response: TokenResponse, now: DateTime<Utc>) -> Self {
        let lifetime = i64::try_from(response.expires_in)
            .ok()
            .and_then(Duration::try_seconds)
            .unwrap_or(Duration::MAX);
        Self {
            access_token: response.access_token,
            refresh_token: response.refresh_token,
            expires_at: now.checked_add_signed(lifetime).unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }

    /// Whether `now` is past `expires_at - skew`.
    pub fn needs_refresh(&self, now: DateTime<Utc>, skew: Duration) -> bool {
        let threshold = self
            .expires_at
            .checked_sub_signed(skew)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        now > threshold
    }

    /// Remaining lifetime, zero once expired.
    pub fn expires_in(&self, now: DateTime<Utc>) -> Duration {
        (self.expires_at - now).max(Duration::zero())
    }
}

/// Token expiry information for display. Carries no secrets.
#[derive(Debug, Clone)]
pub struct TokenInfo {
    pub expires_at: DateTime<Utc>,
    pub expires_in_secs: u64,
    pub needs_refresh: bool,
}

impl TokenInfo {
    pub fn from_credentials(credentials: &Credentials, now: DateTime<Utc>) -> Self {
        Self {
            expires_at: credentials.expires_at,
            expires_in_secs: credentials.expires_in(now).num_seconds().max(0) as u64,
            needs_refresh: credentials.needs_refresh(now, REFRESH_SKEW),
        }
    }

    pub fn expires_in_display(&self) -> String {
        if self.expires_in_secs == 0 {
            "Expired (will refresh on next use)".to_string()
        } else {
            let hours = self.expires_in_secs / 3600;
            let minutes = (self.expires_in_secs % 3600) / 60;
            format!("{}h {}m", hours, minutes)
        }
    }
}
