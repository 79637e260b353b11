use crate::domain_model::*;
use crate::domain_port::*;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use std::collections::HashMap;

/// Redis layout:
/// - `{token}:{user}`: hash, field = item key, value = item JSON. Expires with
///   the most recently saved pair.
/// - `{blacklist}:{item key}`: user id, `EXPIREAT` the item's expiry.
/// - `{login_limit}:{item key}`: item JSON, `EXPIREAT` the item's expiry.
pub struct RedisTokenStore {
    conn: ConnectionManager,
    prefix: AuthCacheKeyPrefix,
}

impl RedisTokenStore {
    pub fn new(conn: ConnectionManager, prefix: AuthCacheKeyPrefix) -> Self {
        RedisTokenStore { conn, prefix }
    }
}

fn backend(e: redis::RedisError) -> TokenStoreError {
    TokenStoreError::Backend(e.to_string())
}

#[async_trait::async_trait]
impl<P: ClaimsPayload> TokenStore<P> for RedisTokenStore {
    async fn save_tokens(
        &self,
        user_id: &str,
        items: &[TokenItem<P>],
    ) -> Result<(), TokenStoreError> {
        if items.is_empty() {
            return Ok(());
        }
        let key = self.prefix.token_key(user_id);
        let mut fields = Vec::with_capacity(items.len());
        for item in items {
            fields.push((item.key().to_owned(), serde_json::to_string(item)?));
        }
        let max_expired_at = items.iter().map(|i| i.expired_at).max().unwrap_or_default();

        // The newest pair carries the latest refresh expiry, so resetting the
        // hash expiry to it never cuts an older item short.
        let mut conn = self.conn.clone();
        let _: () = redis::pipe()
            .atomic()
            .hset_multiple(&key, &fields)
            .ignore()
            .expire_at(&key, max_expired_at)
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn get_all_tokens(
        &self,
        user_id: &str,
    ) -> Result<HashMap<String, TokenItem<P>>, TokenStoreError> {
        let key = self.prefix.token_key(user_id);
        let mut conn = self.conn.clone();
        let raw: HashMap<String, String> = conn.hgetall(&key).await.map_err(backend)?;

        let mut tokens = HashMap::with_capacity(raw.len());
        for (field, value) in raw {
            let item: TokenItem<P> = serde_json::from_str(&value)?;
            tokens.insert(field, item);
        }
        Ok(tokens)
    }

    async fn delete_tokens(
        &self,
        user_id: &str,
        items: &[TokenItem<P>],
    ) -> Result<usize, TokenStoreError> {
        if items.is_empty() {
            return Ok(0);
        }
        let key = self.prefix.token_key(user_id);
        let fields: Vec<&str> = items.iter().map(|i| i.key()).collect();
        let mut conn = self.conn.clone();
        let removed: usize = conn.hdel(&key, fields).await.map_err(backend)?;
        Ok(removed)
    }

    async fn add_blacklist(
        &self,
        user_id: &str,
        items: &[TokenItem<P>],
    ) -> Result<(), TokenStoreError> {
        if items.is_empty() {
            return Ok(());
        }
        let mut pipe = redis::pipe();
        pipe.atomic();
        for item in items {
            let key = self.prefix.blacklist_key(item.key());
            pipe.set(&key, user_id)
                .ignore()
                .expire_at(&key, item.expired_at)
                .ignore();
        }
        let mut conn = self.conn.clone();
        let _: () = pipe.query_async(&mut conn).await.map_err(backend)?;
        Ok(())
    }

    async fn add_login_limit(&self, items: &[TokenItem<P>]) -> Result<(), TokenStoreError> {
        if items.is_empty() {
            return Ok(());
        }
        let mut pipe = redis::pipe();
        pipe.atomic();
        for item in items {
            let key = self.prefix.login_limit_key(item.key());
            pipe.set(&key, serde_json::to_string(item)?)
                .ignore()
                .expire_at(&key, item.expired_at)
                .ignore();
        }
        let mut conn = self.conn.clone();
        let _: () = pipe.query_async(&mut conn).await.map_err(backend)?;
        Ok(())
    }

    async fn is_blacklisted(&self, token_id: &str) -> Result<bool, TokenStoreError> {
        let key = self.prefix.blacklist_key(token_id);
        let mut conn = self.conn.clone();
        let exists: bool = conn.exists(&key).await.map_err(backend)?;
        Ok(exists)
    }

    async fn token_exists(&self, user_id: &str, token_id: &str) -> Result<bool, TokenStoreError> {
        let key = self.prefix.token_key(user_id);
        let mut conn = self.conn.clone();
        let exists: bool = conn.hexists(&key, token_id).await.map_err(backend)?;
        Ok(exists)
    }

    async fn is_login_limited(&self, token_id: &str) -> Result<bool, TokenStoreError> {
        let key = self.prefix.login_limit_key(token_id);
        let mut conn = self.conn.clone();
        let exists: bool = conn.exists(&key).await.map_err(backend)?;
        Ok(exists)
    }
}
