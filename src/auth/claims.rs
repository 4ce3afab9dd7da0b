/// JWT Claims structure
///
/// Payload shared by access and refresh tokens. `kind` keeps one from
/// being accepted in place of the other; `jti` makes every token
/// individually revocable.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::TokenError;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Claims {
    /// Subject (user id)
    pub sub: String,
    /// Unique token id
    pub jti: String,
    #[serde(rename = "token_type")]
    pub kind: TokenKind,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    pub iss: String,
}

impl Claims {
    /// Create claims for `user_id` expiring `ttl_seconds` from now, with a fresh `jti`
    pub fn new(user_id: i64, kind: TokenKind, ttl_seconds: i64, issuer: &str) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            sub: user_id.to_string(),
            jti: Uuid::new_v4().to_string(),
            kind,
            iat: now,
            exp: now + ttl_seconds,
            iss: issuer.to_string(),
        }
    }

    pub fn user_id(&self) -> Result<i64, TokenError> {
        self.sub.parse::<i64>().map_err(|_| TokenError::Malformed)
    }

    /// A token is dead from its `exp` second onwards
    pub fn is_expired(&self) -> bool {
        self.exp <= chrono::Utc::now().timestamp()
    }

    pub fn expires_at(&self) -> chrono::DateTime<chrono::Utc> {
        chrono::DateTime::<chrono::Utc>::from_timestamp(self.exp, 0)
            .unwrap_or(chrono::DateTime::<chrono::Utc>::MAX_UTC)
    }
}
