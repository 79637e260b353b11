use crate::domain_model::ClaimsPayload;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Signed token body.
///
/// Access claims travel as a JWT; refresh claims are serialized with
/// [`Claims::encode_to_string`] and encrypted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims<P> {
    #[serde(rename = "jti", default)]
    pub id: String,
    #[serde(rename = "exp")]
    pub expires_at: i64,
    #[serde(rename = "iat", default)]
    pub issued_at: i64,
    pub payload: P,
}

#[derive(Debug, Clone, Eq, PartialEq, thiserror::Error)]
pub enum ClaimsError {
    #[error("missing token id")]
    MissingId,
    #[error("missing user identifier")]
    MissingUser,
    #[error("token expired")]
    Expired,
}

impl<P: ClaimsPayload> Claims<P> {
    /// Claims with id and timestamps left for the issuer to fill in.
    pub fn new(payload: P) -> Self {
        Self {
            id: String::new(),
            expires_at: 0,
            issued_at: 0,
            payload,
        }
    }

    pub fn with_expires_at(mut self, expires_at: i64) -> Self {
        self.expires_at = expires_at;
        self
    }

    /// Refresh claims for a freshly signed access token: same payload, new
    /// identifier, lifetime counted from `now`.
    pub fn default_refresh_claims(&self, now: i64, refresh_ttl: Duration) -> Self {
        let ttl = i64::try_from(refresh_ttl.as_secs()).unwrap_or(i64::MAX);
        Self {
            id: new_token_id(),
            issued_at: now,
            expires_at: now.saturating_add(ttl),
            payload: self.payload.clone(),
        }
    }

    pub fn encode_to_string(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn decode_string(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    /// Structural checks shared by access and refresh claims.
    pub fn valid(&self, now: i64) -> Result<(), ClaimsError> {
        if self.id.is_empty() {
            return Err(ClaimsError::MissingId);
        }
        if self.payload.user_identifier().is_empty() {
            return Err(ClaimsError::MissingUser);
        }
        if self.expires_at <= now {
            return Err(ClaimsError::Expired);
        }
        Ok(())
    }
}

pub fn new_token_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
