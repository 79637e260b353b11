use crate::domain_model::*;
use serde::Deserialize;
use std::collections::HashMap;

/// Persistence for token sets, the blacklist and login-limit bookkeeping.
///
/// Every method is one logical transaction: a multi-item write either lands
/// completely or not at all. Implementations must give read-your-writes per
/// key; nothing stronger is assumed.
#[async_trait::async_trait]
pub trait TokenStore<P: ClaimsPayload>: Send + Sync {
    /// Upsert all items into the user's live set.
    async fn save_tokens(&self, user_id: &str, items: &[TokenItem<P>])
    -> Result<(), TokenStoreError>;

    /// The user's live set, keyed by [`TokenItem::key`].
    async fn get_all_tokens(
        &self,
        user_id: &str,
    ) -> Result<HashMap<String, TokenItem<P>>, TokenStoreError>;

    /// Number of items actually removed. Concurrent deletes of the same item
    /// count it once.
    async fn delete_tokens(
        &self,
        user_id: &str,
        items: &[TokenItem<P>],
    ) -> Result<usize, TokenStoreError>;

    /// Entries expire with the item; nothing in this crate removes them.
    async fn add_blacklist(
        &self,
        user_id: &str,
        items: &[TokenItem<P>],
    ) -> Result<(), TokenStoreError>;

    async fn add_login_limit(&self, items: &[TokenItem<P>]) -> Result<(), TokenStoreError>;

    async fn is_blacklisted(&self, token_id: &str) -> Result<bool, TokenStoreError>;

    async fn token_exists(&self, user_id: &str, token_id: &str) -> Result<bool, TokenStoreError>;

    /// Whether the token was demoted by a login-limit violation.
    async fn is_login_limited(&self, token_id: &str) -> Result<bool, TokenStoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum TokenStoreError {
    #[error("backend error: {0}")]
    Backend(String),
    #[error("codec error: {0}")]
    Codec(String),
}

impl From<serde_json::Error> for TokenStoreError {
    fn from(err: serde_json::Error) -> Self {
        TokenStoreError::Codec(err.to_string())
    }
}

/// Key prefixes for the three record families a store keeps.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize)]
#[serde(default)]
pub struct AuthCacheKeyPrefix {
    pub token: String,
    pub blacklist: String,
    pub login_limit: String,
}

impl Default for AuthCacheKeyPrefix {
    fn default() -> Self {
        Self {
            token: "auth:token".to_string(),
            blacklist: "auth:blacklist".to_string(),
            login_limit: "auth:login_limit".to_string(),
        }
    }
}

impl AuthCacheKeyPrefix {
    /// Fill blank prefixes from the defaults.
    pub fn checked(prefix: Option<AuthCacheKeyPrefix>) -> Self {
        let defaults = Self::default();
        let Some(mut prefix) = prefix else {
            return defaults;
        };
        if prefix.token.trim().is_empty() {
            prefix.token = defaults.token;
        }
        if prefix.blacklist.trim().is_empty() {
            prefix.blacklist = defaults.blacklist;
        }
        if prefix.login_limit.trim().is_empty() {
            prefix.login_limit = defaults.login_limit;
        }
        prefix
    }

    pub fn token_key(&self, user_id: &str) -> String {
        format!("{}:{}", self.token, user_id)
    }

    pub fn blacklist_key(&self, token_id: &str) -> String {
        format!("{}:{}", self.blacklist, token_id)
    }

    pub fn login_limit_key(&self, token_id: &str) -> String {
        format!("{}:{}", self.login_limit, token_id)
    }
}
