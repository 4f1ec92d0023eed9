use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::session::Session;

/// Session value key the OAuth token is stored under
pub const TOKEN_KEY: &str = "oauth2_token";

/// Lifetime assumed when the provider omits `expires_in`
pub const DEFAULT_TOKEN_LIFETIME_SECONDS: i64 = 3600;

/// OAuth2 access/refresh token pair as kept in the session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub access_token: String,
    #[serde(default)]
    pub token_type: String,
    #[serde(default)]
    pub refresh_token: String,
    pub expiry: DateTime<Utc>,
    /// Additional fields returned by the token endpoint, stringified
    #[serde(default)]
    pub extra: HashMap<String, String>,
}

impl Token {
    /// Token expiring `expires_in` seconds from now
    #[must_use]
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>, expires_in: i64) -> Self {
        Self {
            access_token: access_token.into(),
            token_type: "Bearer".to_string(),
            refresh_token: refresh_token.into(),
            expiry: Utc::now() + Duration::seconds(expires_in),
            extra: HashMap::new(),
        }
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expiry
    }

    /// Whether the token can be renewed without user interaction
    #[must_use]
    pub fn can_refresh(&self) -> bool {
        !self.refresh_token.is_empty()
    }

    /// Token stored in `session`; malformed entries read as absent
    #[must_use]
    pub fn from_session(session: &Session) -> Option<Self> {
        session.get(TOKEN_KEY)
    }

    /// Store this token in `session` under [`TOKEN_KEY`]
    ///
    /// # Errors
    ///
    /// Returns an error if the token cannot be represented as JSON
    pub fn store_in(&self, session: &mut Session) -> Result<(), serde_json::Error> {
        session.insert(TOKEN_KEY, self)
    }
}
