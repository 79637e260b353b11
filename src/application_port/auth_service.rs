use crate::domain_model::*;
use crate::domain_port::*;
use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("sign token failed: {0}")]
    Signing(String),
    #[error("encode refresh claims failed: {0}")]
    Encoding(String),
    #[error("encrypt refresh claims failed: {0}")]
    Encryption(String),
    #[error("decode refresh token failed: {0}")]
    RefreshDecode(#[from] RefreshDecodeError),
    #[error("store error during {op}: {message}")]
    Store { op: &'static str, message: String },
    #[error("invalid claims: {0}")]
    InvalidClaims(String),
    #[error("token is blacklisted")]
    Blacklisted,
    #[error("token is not in the live token set")]
    NotWhitelisted,
}

#[derive(Debug, thiserror::Error)]
pub enum RefreshDecodeError {
    #[error("decrypt failed: {0}")]
    Decrypt(#[source] EncryptorError),
    #[error("deserialize failed: {0}")]
    Deserialize(#[source] serde_json::Error),
}

impl AuthError {
    pub fn store(op: &'static str, err: TokenStoreError) -> Self {
        AuthError::Store {
            op,
            message: err.to_string(),
        }
    }

    /// Expected outcomes of an access-control decision, as opposed to
    /// failures of the service itself.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            AuthError::InvalidClaims(_)
                | AuthError::Blacklisted
                | AuthError::NotWhitelisted
                | AuthError::RefreshDecode(_)
        )
    }
}

impl From<ClaimsError> for AuthError {
    fn from(err: ClaimsError) -> Self {
        AuthError::InvalidClaims(err.to_string())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub access_token_expires_at: DateTime<Utc>,
    pub refresh_token_expires_at: DateTime<Utc>,
}

/// Token lifecycle operations plus the pieces a JWT-parsing middleware needs
/// (`signing_method`, `decoding_key`, `validation`).
#[async_trait::async_trait]
pub trait AuthRepo<P: ClaimsPayload>: Send + Sync {
    fn signing_method(&self) -> Algorithm;
    fn decoding_key(&self) -> &DecodingKey;
    fn validation(&self) -> Validation;

    /// Sign and persist a token pair. `claims.id` is generated when empty.
    async fn sign_token(
        &self,
        claims: Claims<P>,
    ) -> Result<(TokenResponse, Vec<TokenItem<P>>), AuthError>;
    async fn decode_access_token(&self, access_token: &str) -> Result<Claims<P>, AuthError>;
    async fn decode_refresh_token(&self, refresh_token: &str) -> Result<Claims<P>, AuthError>;

    /// Revocation checks for already-decoded access claims.
    async fn verify_token(&self, claims: &Claims<P>) -> Result<(), AuthError>;

    /// Exchange a refresh token for a new pair; the old pair leaves the live set.
    async fn refresh_token(
        &self,
        refresh_token: &str,
    ) -> Result<(TokenResponse, Vec<TokenItem<P>>), AuthError>;

    /// Drop the pair behind these access claims from the live set.
    async fn revoke_token(&self, claims: &Claims<P>) -> Result<(), AuthError>;
}
