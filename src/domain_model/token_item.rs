use serde::{Deserialize, Serialize};

/// One issued token as persisted by a [`TokenStore`](crate::domain_port::TokenStore).
///
/// Both items of a pair carry the same `token_id` (the access id) and
/// `refresh_token_id` (the refresh id); `is_refresh_token` tells which side
/// of the pair this item is.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct TokenItem<P> {
    pub token_id: String,
    pub refresh_token_id: String,
    /// Unix seconds.
    pub expired_at: i64,
    pub is_refresh_token: bool,
    pub payload: P,
}

impl<P> TokenItem<P> {
    /// The item's own identifier: the key it is stored, blacklisted and
    /// verified under.
    pub fn key(&self) -> &str {
        if self.is_refresh_token {
            &self.refresh_token_id
        } else {
            &self.token_id
        }
    }

    /// Identifier of the other half of the pair.
    pub fn sibling_key(&self) -> &str {
        if self.is_refresh_token {
            &self.token_id
        } else {
            &self.refresh_token_id
        }
    }

    pub fn is_expired(&self, now: i64) -> bool {
        self.expired_at <= now
    }
}
