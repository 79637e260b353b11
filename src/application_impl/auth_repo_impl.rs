use crate::application_impl::LoginPolicy;
use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use crate::infra_crypto::AesGcmEncryptor;
use crate::infra_redis::RedisTokenStore;
use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::task::TaskTracker;
use tracing::{Level, debug, info, warn};

#[derive(Clone)]
pub struct AuthConfig {
    /// HS256 when unset. Only HMAC algorithms are accepted.
    pub signing_method: Option<Algorithm>,
    pub sign_key: String,
    /// Access lifetime for claims that arrive without `expires_at`.
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    /// AES-256-GCM when unset. Its tokens are not interchangeable with refresh
    /// tokens sealed by the AES-CBC scheme other deployments may use; supply a
    /// matching [`Encryptor`] to read those.
    pub refresh_cipher: Option<Arc<dyn Encryptor>>,
    pub cache_key_prefix: Option<AuthCacheKeyPrefix>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            signing_method: None,
            sign_key: String::new(),
            access_ttl: Duration::from_secs(2 * 60 * 60),
            refresh_ttl: Duration::from_secs(7 * 24 * 60 * 60),
            refresh_cipher: None,
            cache_key_prefix: None,
        }
    }
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("signing_method", &self.signing_method)
            .field("sign_key", &"<redacted>")
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .field("refresh_cipher", &self.refresh_cipher.is_some())
            .field("cache_key_prefix", &self.cache_key_prefix)
            .finish()
    }
}

/// Longest accepted token lifetime.
pub const MAX_TOKEN_TTL: Duration = Duration::from_secs(10 * 365 * 24 * 60 * 60);

pub struct RealAuthRepo<P> {
    algorithm: Algorithm,
    sign_key: String,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_ttl_secs: i64,
    refresh_ttl: Duration,
    refresh_cipher: Arc<dyn Encryptor>,
    cache_key_prefix: AuthCacheKeyPrefix,
    store: Arc<dyn TokenStore<P>>,
    policy: LoginPolicy<P>,
    background: TaskTracker,
}

impl<P: ClaimsPayload> RealAuthRepo<P> {
    pub fn new(store: Arc<dyn TokenStore<P>>, config: AuthConfig) -> Result<Self, AuthError> {
        if config.sign_key.is_empty() {
            return Err(AuthError::Configuration("sign key is empty".to_string()));
        }
        let algorithm = config.signing_method.unwrap_or(Algorithm::HS256);
        if !matches!(
            algorithm,
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512
        ) {
            return Err(AuthError::Configuration(format!(
                "signing method {algorithm:?} is not an HMAC algorithm"
            )));
        }
        for (name, ttl) in [
            ("access_ttl", config.access_ttl),
            ("refresh_ttl", config.refresh_ttl),
        ] {
            if ttl.is_zero() || ttl > MAX_TOKEN_TTL {
                return Err(AuthError::Configuration(format!(
                    "{name} must be between 1s and {}s, got {}s",
                    MAX_TOKEN_TTL.as_secs(),
                    ttl.as_secs()
                )));
            }
        }
        let refresh_cipher = config
            .refresh_cipher
            .unwrap_or_else(|| Arc::new(AesGcmEncryptor::new()));

        Ok(Self {
            algorithm,
            encoding_key: EncodingKey::from_secret(config.sign_key.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.sign_key.as_bytes()),
            sign_key: config.sign_key,
            access_ttl_secs: config.access_ttl.as_secs() as i64,
            refresh_ttl: config.refresh_ttl,
            refresh_cipher,
            cache_key_prefix: AuthCacheKeyPrefix::checked(config.cache_key_prefix),
            policy: LoginPolicy::new(store.clone()),
            store,
            background: TaskTracker::new(),
        })
    }

    /// Repo over a Redis store keyed by `config.cache_key_prefix`.
    pub fn with_redis(
        conn: redis::aio::ConnectionManager,
        config: AuthConfig,
    ) -> Result<Self, AuthError> {
        let prefix = AuthCacheKeyPrefix::checked(config.cache_key_prefix.clone());
        let store: Arc<dyn TokenStore<P>> = Arc::new(RedisTokenStore::new(conn, prefix));
        Self::new(store, config)
    }

    pub fn cache_key_prefix(&self) -> &AuthCacheKeyPrefix {
        &self.cache_key_prefix
    }

    /// Wait for post-sign cleanup already scheduled, then keep accepting new work.
    pub async fn drain_background(&self) {
        self.background.close();
        self.background.wait().await;
        self.background.reopen();
    }

    /// Wait for post-sign cleanup already scheduled. Tasks spawned after this
    /// still run but are no longer waited on.
    pub async fn shutdown(&self) {
        self.background.close();
        self.background.wait().await;
        info!("auth repo background tasks drained");
    }

    fn now() -> i64 {
        Utc::now().timestamp()
    }

    fn to_datetime(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap_or_default()
    }

    /// Blacklist first, then live-set membership.
    async fn check_revocation(&self, user: &str, token_id: &str) -> Result<(), AuthError> {
        let blacklisted = self
            .store
            .is_blacklisted(token_id)
            .await
            .map_err(|e| AuthError::store("is_blacklisted", e))?;
        if blacklisted {
            if tracing::enabled!(Level::DEBUG) {
                match self.store.is_login_limited(token_id).await {
                    Ok(true) => debug!(%user, %token_id, "token displaced by login limit"),
                    Ok(false) => {}
                    Err(e) => warn!(%user, %token_id, error = %e, "is_login_limited failed"),
                }
            }
            return Err(AuthError::Blacklisted);
        }

        let exists = self
            .store
            .token_exists(user, token_id)
            .await
            .map_err(|e| AuthError::store("token_exists", e))?;
        if !exists {
            return Err(AuthError::NotWhitelisted);
        }
        Ok(())
    }

    /// Remove the items matching `pred` from the user's live set. Returns the
    /// count this call removed, so a concurrent caller that lost the race
    /// sees 0.
    async fn delete_pair(
        &self,
        user: &str,
        pred: impl Fn(&TokenItem<P>) -> bool + Send,
    ) -> Result<usize, AuthError> {
        let all_tokens = self
            .store
            .get_all_tokens(user)
            .await
            .map_err(|e| AuthError::store("get_all_tokens", e))?;
        let pair: Vec<TokenItem<P>> = all_tokens.into_values().filter(|i| pred(i)).collect();
        if pair.is_empty() {
            return Ok(0);
        }
        self.store
            .delete_tokens(user, &pair)
            .await
            .map_err(|e| AuthError::store("delete_tokens", e))
    }
}

#[async_trait::async_trait]
impl<P: ClaimsPayload> AuthRepo<P> for RealAuthRepo<P> {
    fn signing_method(&self) -> Algorithm {
        self.algorithm
    }

    fn decoding_key(&self) -> &DecodingKey {
        &self.decoding_key
    }

    fn validation(&self) -> Validation {
        let mut v = Validation::new(self.algorithm);
        v.validate_exp = true;
        v.leeway = 0;
        v
    }

    async fn sign_token(
        &self,
        mut claims: Claims<P>,
    ) -> Result<(TokenResponse, Vec<TokenItem<P>>), AuthError> {
        let now = Self::now();
        if claims.id.is_empty() {
            claims.id = new_token_id();
        }
        if claims.issued_at == 0 {
            claims.issued_at = now;
        }
        if claims.expires_at == 0 {
            claims.expires_at = now.saturating_add(self.access_ttl_secs);
        }

        let access_token = encode(&Header::new(self.algorithm), &claims, &self.encoding_key)
            .map_err(|e| AuthError::Signing(e.to_string()))?;

        let refresh_claims = claims.default_refresh_claims(now, self.refresh_ttl);
        let refresh_claims_str = refresh_claims
            .encode_to_string()
            .map_err(|e| AuthError::Encoding(e.to_string()))?;
        let refresh_token = self
            .refresh_cipher
            .encrypt_to_string(&refresh_claims_str, &self.sign_key)
            .map_err(|e| AuthError::Encryption(e.to_string()))?;

        let user = claims.payload.user_identifier();
        let token_items = vec![
            TokenItem {
                token_id: claims.id.clone(),
                refresh_token_id: refresh_claims.id.clone(),
                expired_at: claims.expires_at,
                is_refresh_token: false,
                payload: claims.payload.clone(),
            },
            TokenItem {
                token_id: claims.id.clone(),
                refresh_token_id: refresh_claims.id.clone(),
                expired_at: refresh_claims.expires_at,
                is_refresh_token: true,
                payload: refresh_claims.payload.clone(),
            },
        ];
        self.store
            .save_tokens(&user, &token_items)
            .await
            .map_err(|e| AuthError::store("save_tokens", e))?;
        debug!(
            %user,
            token_id = %claims.id,
            refresh_token_id = %refresh_claims.id,
            "token pair issued"
        );

        // Owns its inputs, so the caller going away does not cancel it.
        let policy = self.policy.clone();
        let signed = claims.clone();
        self.background.spawn(async move {
            policy.after_sign_token(&signed, Utc::now().timestamp()).await;
        });

        let response = TokenResponse {
            access_token,
            refresh_token,
            access_token_expires_at: Self::to_datetime(claims.expires_at),
            refresh_token_expires_at: Self::to_datetime(refresh_claims.expires_at),
        };
        Ok((response, token_items))
    }

    async fn decode_access_token(&self, access_token: &str) -> Result<Claims<P>, AuthError> {
        let data = decode::<Claims<P>>(access_token, &self.decoding_key, &self.validation())
            .map_err(|e| AuthError::InvalidClaims(format!("decode token failed: {e}")))?;
        data.claims.valid(Self::now())?;
        Ok(data.claims)
    }

    async fn decode_refresh_token(&self, refresh_token: &str) -> Result<Claims<P>, AuthError> {
        let claims_str = self
            .refresh_cipher
            .decrypt_to_string(refresh_token, &self.sign_key)
            .map_err(RefreshDecodeError::Decrypt)?;
        let claims =
            Claims::<P>::decode_string(&claims_str).map_err(RefreshDecodeError::Deserialize)?;
        claims.valid(Self::now())?;
        Ok(claims)
    }

    async fn verify_token(&self, claims: &Claims<P>) -> Result<(), AuthError> {
        let user = claims.payload.user_identifier();
        if claims.id.is_empty() || user.is_empty() {
            return Err(AuthError::InvalidClaims(
                "claims carry no token id or user".to_string(),
            ));
        }
        self.check_revocation(&user, &claims.id).await
    }

    async fn refresh_token(
        &self,
        refresh_token: &str,
    ) -> Result<(TokenResponse, Vec<TokenItem<P>>), AuthError> {
        let refresh_claims = self.decode_refresh_token(refresh_token).await?;
        let user = refresh_claims.payload.user_identifier();
        self.check_revocation(&user, &refresh_claims.id).await?;

        // Consume the old pair before issuing so a refresh token works once.
        let refresh_id = refresh_claims.id.clone();
        let removed = self
            .delete_pair(&user, move |item| item.refresh_token_id == refresh_id)
            .await?;
        if removed == 0 {
            return Err(AuthError::NotWhitelisted);
        }
        info!(%user, refresh_token_id = %refresh_claims.id, "refresh token rotated");

        self.sign_token(Claims::new(refresh_claims.payload)).await
    }

    async fn revoke_token(&self, claims: &Claims<P>) -> Result<(), AuthError> {
        let user = claims.payload.user_identifier();
        let access_id = claims.id.clone();
        let removed = self
            .delete_pair(&user, move |item| item.token_id == access_id)
            .await?;
        info!(%user, token_id = %claims.id, removed, "session revoked");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra_memory::MemoryTokenStore;
    use std::collections::HashMap;

    const SIGN_KEY: &str = "unit-test-sign-key";

    fn repo() -> (RealAuthRepo<SessionPayload>, Arc<MemoryTokenStore<SessionPayload>>) {
        let store = Arc::new(MemoryTokenStore::<SessionPayload>::new());
        let repo = RealAuthRepo::<SessionPayload>::new(
            store.clone(),
            AuthConfig {
                sign_key: SIGN_KEY.to_string(),
                ..AuthConfig::default()
            },
        )
        .unwrap();
        (repo, store)
    }

    fn claims(user: &str, platform: &str, limit: LoginLimit) -> Claims<SessionPayload> {
        Claims::new(SessionPayload::new(user, platform, limit))
    }

    #[tokio::test]
    async fn sign_decode_verify_round_trip() {
        let (repo, store) = repo();
        let (response, items) = repo
            .sign_token(claims("u1", "web", LoginLimit::Unlimited))
            .await
            .unwrap();

        assert_eq!(items.len(), 2);
        assert!(!items[0].is_refresh_token);
        assert!(items[1].is_refresh_token);
        assert_eq!(items[0].token_id, items[1].token_id);
        assert_eq!(items[0].refresh_token_id, items[1].refresh_token_id);
        assert!(items[1].expired_at > items[0].expired_at);
        assert_eq!(store.get_all_tokens("u1").await.unwrap().len(), 2);

        let decoded = repo.decode_access_token(&response.access_token).await.unwrap();
        assert_eq!(decoded.id, items[0].token_id);
        assert_eq!(decoded.payload.user_id, "u1");
        repo.verify_token(&decoded).await.unwrap();

        let refresh = repo
            .decode_refresh_token(&response.refresh_token)
            .await
            .unwrap();
        assert_eq!(refresh.id, items[0].refresh_token_id);
        assert_eq!(refresh.payload, decoded.payload);
    }

    #[tokio::test]
    async fn caller_supplied_id_and_expiry_are_kept() {
        let (repo, _) = repo();
        let expires_at = Utc::now().timestamp() + 120;
        let mut c = claims("u1", "web", LoginLimit::Unlimited).with_expires_at(expires_at);
        c.id = "fixed-id".to_string();

        let (response, items) = repo.sign_token(c).await.unwrap();

        assert_eq!(items[0].token_id, "fixed-id");
        assert_eq!(items[0].expired_at, expires_at);
        assert_eq!(response.access_token_expires_at.timestamp(), expires_at);
    }

    #[tokio::test]
    async fn garbage_and_tampered_access_tokens_are_invalid_claims() {
        let (repo, _) = repo();
        let (response, _) = repo
            .sign_token(claims("u1", "web", LoginLimit::Unlimited))
            .await
            .unwrap();

        let err = repo.decode_access_token("not-a-jwt").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidClaims(_)));

        // Swap the first signature character.
        let at = response.access_token.rfind('.').unwrap() + 1;
        let mut tampered = response.access_token.clone();
        let first = if tampered[at..].starts_with('A') { "B" } else { "A" };
        tampered.replace_range(at..at + 1, first);
        let err = repo.decode_access_token(&tampered).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidClaims(_)));
    }

    #[tokio::test]
    async fn token_signed_with_another_key_is_rejected() {
        let (repo, _) = repo();
        let other = RealAuthRepo::<SessionPayload>::new(
            Arc::new(MemoryTokenStore::<SessionPayload>::new()),
            AuthConfig {
                sign_key: "some-other-key".to_string(),
                ..AuthConfig::default()
            },
        )
        .unwrap();
        let (response, _) = other
            .sign_token(claims("u1", "web", LoginLimit::Unlimited))
            .await
            .unwrap();

        assert!(matches!(
            repo.decode_access_token(&response.access_token).await,
            Err(AuthError::InvalidClaims(_))
        ));
        assert!(matches!(
            repo.decode_refresh_token(&response.refresh_token).await,
            Err(AuthError::RefreshDecode(RefreshDecodeError::Decrypt(_)))
        ));
    }

    #[tokio::test]
    async fn expired_access_token_does_not_decode() {
        let (repo, _) = repo();
        let c = claims("u1", "web", LoginLimit::Unlimited)
            .with_expires_at(Utc::now().timestamp() - 10);
        let (response, _) = repo.sign_token(c).await.unwrap();

        assert!(matches!(
            repo.decode_access_token(&response.access_token).await,
            Err(AuthError::InvalidClaims(_))
        ));
    }

    #[tokio::test]
    async fn refresh_payload_that_is_not_claims_fails_deserialize() {
        let (repo, _) = repo();
        let sealed = AesGcmEncryptor::new()
            .encrypt_to_string("{\"hello\":1}", SIGN_KEY)
            .unwrap();

        assert!(matches!(
            repo.decode_refresh_token(&sealed).await,
            Err(AuthError::RefreshDecode(RefreshDecodeError::Deserialize(_)))
        ));
    }

    #[tokio::test]
    async fn verify_rejects_claims_without_identity() {
        let (repo, _) = repo();
        let mut c = claims("u1", "web", LoginLimit::Unlimited);
        c.expires_at = Utc::now().timestamp() + 60;

        assert!(matches!(
            repo.verify_token(&c).await,
            Err(AuthError::InvalidClaims(_))
        ));
    }

    #[tokio::test]
    async fn verify_reports_unknown_token_as_not_whitelisted() {
        let (repo, _) = repo();
        let mut c = claims("u1", "web", LoginLimit::Unlimited);
        c.id = "never-issued".to_string();

        assert!(matches!(
            repo.verify_token(&c).await,
            Err(AuthError::NotWhitelisted)
        ));
    }

    #[tokio::test]
    async fn only_one_blacklists_previous_pair_after_cleanup() {
        let (repo, store) = repo();
        let (first, first_items) = repo
            .sign_token(claims("u1", "web", LoginLimit::OnlyOne))
            .await
            .unwrap();
        repo.drain_background().await;
        let (second, _) = repo
            .sign_token(claims("u1", "ios", LoginLimit::OnlyOne))
            .await
            .unwrap();
        repo.drain_background().await;

        assert!(store.is_blacklisted(first_items[0].key()).await.unwrap());
        assert!(store.is_blacklisted(first_items[1].key()).await.unwrap());
        assert!(store.is_login_limited(first_items[0].key()).await.unwrap());
        assert!(!store.is_login_limited(first_items[1].key()).await.unwrap());

        let first_claims = repo.decode_access_token(&first.access_token).await.unwrap();
        assert!(matches!(
            repo.verify_token(&first_claims).await,
            Err(AuthError::Blacklisted)
        ));
        let second_claims = repo.decode_access_token(&second.access_token).await.unwrap();
        repo.verify_token(&second_claims).await.unwrap();

        assert!(matches!(
            repo.refresh_token(&first.refresh_token).await,
            Err(AuthError::Blacklisted)
        ));
    }

    #[tokio::test]
    async fn refresh_rotates_the_pair() {
        let (repo, store) = repo();
        let (first, first_items) = repo
            .sign_token(claims("u1", "web", LoginLimit::Unlimited))
            .await
            .unwrap();

        let (second, second_items) = repo.refresh_token(&first.refresh_token).await.unwrap();
        repo.drain_background().await;

        let live = store.get_all_tokens("u1").await.unwrap();
        assert!(!live.contains_key(first_items[0].key()));
        assert!(!live.contains_key(first_items[1].key()));
        assert!(live.contains_key(second_items[0].key()));
        assert!(live.contains_key(second_items[1].key()));

        let old = repo.decode_access_token(&first.access_token).await.unwrap();
        assert!(matches!(
            repo.verify_token(&old).await,
            Err(AuthError::NotWhitelisted)
        ));
        assert!(matches!(
            repo.refresh_token(&first.refresh_token).await,
            Err(AuthError::NotWhitelisted)
        ));

        let new = repo.decode_access_token(&second.access_token).await.unwrap();
        repo.verify_token(&new).await.unwrap();
    }

    #[tokio::test]
    async fn revoke_removes_both_halves() {
        let (repo, store) = repo();
        let (response, _) = repo
            .sign_token(claims("u1", "web", LoginLimit::Unlimited))
            .await
            .unwrap();
        let c = repo.decode_access_token(&response.access_token).await.unwrap();

        repo.revoke_token(&c).await.unwrap();

        assert!(store.get_all_tokens("u1").await.unwrap().is_empty());
        assert!(matches!(
            repo.verify_token(&c).await,
            Err(AuthError::NotWhitelisted)
        ));
        // Second revoke is a no-op.
        repo.revoke_token(&c).await.unwrap();
    }

    #[test]
    fn empty_sign_key_fails_construction() {
        let result = RealAuthRepo::<SessionPayload>::new(
            Arc::new(MemoryTokenStore::<SessionPayload>::new()),
            AuthConfig::default(),
        );
        assert!(matches!(result, Err(AuthError::Configuration(_))));
    }

    #[test]
    fn non_hmac_signing_method_fails_construction() {
        let result = RealAuthRepo::<SessionPayload>::new(
            Arc::new(MemoryTokenStore::<SessionPayload>::new()),
            AuthConfig {
                signing_method: Some(Algorithm::RS256),
                sign_key: SIGN_KEY.to_string(),
                ..AuthConfig::default()
            },
        );
        assert!(matches!(result, Err(AuthError::Configuration(_))));
    }

    #[test]
    fn defaults_are_applied_at_construction() {
        let (repo, _) = repo();
        assert_eq!(repo.signing_method(), Algorithm::HS256);
        assert_eq!(repo.cache_key_prefix(), &AuthCacheKeyPrefix::default());
        assert_eq!(repo.validation().leeway, 0);
    }

    /// Store that fails every call.
    struct DownStore;

    fn down() -> TokenStoreError {
        TokenStoreError::Backend("connection refused".to_string())
    }

    #[async_trait::async_trait]
    impl TokenStore<SessionPayload> for DownStore {
        async fn save_tokens(
            &self,
            _: &str,
            _: &[TokenItem<SessionPayload>],
        ) -> Result<(), TokenStoreError> {
            Err(down())
        }

        async fn get_all_tokens(
            &self,
            _: &str,
        ) -> Result<HashMap<String, TokenItem<SessionPayload>>, TokenStoreError> {
            Err(down())
        }

        async fn delete_tokens(
            &self,
            _: &str,
            _: &[TokenItem<SessionPayload>],
        ) -> Result<usize, TokenStoreError> {
            Err(down())
        }

        async fn add_blacklist(
            &self,
            _: &str,
            _: &[TokenItem<SessionPayload>],
        ) -> Result<(), TokenStoreError> {
            Err(down())
        }

        async fn add_login_limit(
            &self,
            _: &[TokenItem<SessionPayload>],
        ) -> Result<(), TokenStoreError> {
            Err(down())
        }

        async fn is_blacklisted(&self, _: &str) -> Result<bool, TokenStoreError> {
            Err(down())
        }

        async fn token_exists(&self, _: &str, _: &str) -> Result<bool, TokenStoreError> {
            Err(down())
        }

        async fn is_login_limited(&self, _: &str) -> Result<bool, TokenStoreError> {
            Err(down())
        }
    }

    #[tokio::test]
    async fn store_failures_are_failures_not_rejections() {
        let repo = RealAuthRepo::<SessionPayload>::new(
            Arc::new(DownStore),
            AuthConfig {
                sign_key: SIGN_KEY.to_string(),
                ..AuthConfig::default()
            },
        )
        .unwrap();

        let err = repo
            .sign_token(claims("u1", "web", LoginLimit::OnlyOne))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Store { op: "save_tokens", .. }));
        assert!(!err.is_rejection());

        let mut c = claims("u1", "web", LoginLimit::OnlyOne);
        c.id = "a1".to_string();
        let err = repo.verify_token(&c).await.unwrap_err();
        assert!(matches!(err, AuthError::Store { op: "is_blacklisted", .. }));
    }

    #[test]
    fn out_of_range_ttls_fail_construction() {
        for (access_ttl, refresh_ttl) in [
            (Duration::from_secs(u64::MAX / 2), Duration::from_secs(60)),
            (Duration::from_secs(60), MAX_TOKEN_TTL + Duration::from_secs(1)),
            (Duration::ZERO, Duration::from_secs(60)),
        ] {
            let result = RealAuthRepo::<SessionPayload>::new(
                Arc::new(MemoryTokenStore::<SessionPayload>::new()),
                AuthConfig {
                    sign_key: SIGN_KEY.to_string(),
                    access_ttl,
                    refresh_ttl,
                    ..AuthConfig::default()
                },
            );
            assert!(matches!(result, Err(AuthError::Configuration(_))));
        }
    }

    #[tokio::test]
    async fn longest_ttl_still_signs() {
        let repo = RealAuthRepo::<SessionPayload>::new(
            Arc::new(MemoryTokenStore::<SessionPayload>::new()),
            AuthConfig {
                sign_key: SIGN_KEY.to_string(),
                access_ttl: MAX_TOKEN_TTL,
                refresh_ttl: MAX_TOKEN_TTL,
                ..AuthConfig::default()
            },
        )
        .unwrap();

        let (response, _) = repo
            .sign_token(claims("u1", "web", LoginLimit::Unlimited))
            .await
            .unwrap();
        repo.decode_access_token(&response.access_token).await.unwrap();
    }

    #[tokio::test]
    async fn expired_items_are_pruned_after_next_sign() {
        let (repo, store) = repo();
        let mut old = claims("u1", "web", LoginLimit::Unlimited)
            .with_expires_at(Utc::now().timestamp() - 10);
        old.id = "old".to_string();
        repo.sign_token(old.clone()).await.unwrap();
        repo.drain_background().await;

        repo.sign_token(claims("u1", "ios", LoginLimit::Unlimited))
            .await
            .unwrap();
        repo.drain_background().await;

        let live = store.get_all_tokens("u1").await.unwrap();
        assert!(!live.contains_key("old"));
        assert_eq!(live.values().filter(|i| !i.is_refresh_token).count(), 1);
        assert!(matches!(
            repo.verify_token(&old).await,
            Err(AuthError::NotWhitelisted)
        ));
    }

    #[tokio::test]
    async fn unlimited_signs_never_blacklist() {
        let (repo, store) = repo();
        let mut issued = Vec::new();
        for platform in ["web", "web", "ios", "android", "web"] {
            let (response, items) = repo
                .sign_token(claims("u1", platform, LoginLimit::Unlimited))
                .await
                .unwrap();
            repo.drain_background().await;
            issued.push((response, items));
        }

        for (response, items) in &issued {
            for item in items {
                assert!(!store.is_blacklisted(item.key()).await.unwrap());
            }
            let c = repo.decode_access_token(&response.access_token).await.unwrap();
            repo.verify_token(&c).await.unwrap();
        }
        assert_eq!(store.get_all_tokens("u1").await.unwrap().len(), 10);
    }

    /// Memory store that yields after every set read, so two callers can
    /// interleave between reading and deleting.
    struct YieldingStore(MemoryTokenStore<SessionPayload>);

    #[async_trait::async_trait]
    impl TokenStore<SessionPayload> for YieldingStore {
        async fn save_tokens(
            &self,
            user_id: &str,
            items: &[TokenItem<SessionPayload>],
        ) -> Result<(), TokenStoreError> {
            self.0.save_tokens(user_id, items).await
        }

        async fn get_all_tokens(
            &self,
            user_id: &str,
        ) -> Result<HashMap<String, TokenItem<SessionPayload>>, TokenStoreError> {
            let tokens = self.0.get_all_tokens(user_id).await;
            tokio::task::yield_now().await;
            tokens
        }

        async fn delete_tokens(
            &self,
            user_id: &str,
            items: &[TokenItem<SessionPayload>],
        ) -> Result<usize, TokenStoreError> {
            self.0.delete_tokens(user_id, items).await
        }

        async fn add_blacklist(
            &self,
            user_id: &str,
            items: &[TokenItem<SessionPayload>],
        ) -> Result<(), TokenStoreError> {
            self.0.add_blacklist(user_id, items).await
        }

        async fn add_login_limit(
            &self,
            items: &[TokenItem<SessionPayload>],
        ) -> Result<(), TokenStoreError> {
            self.0.add_login_limit(items).await
        }

        async fn is_blacklisted(&self, token_id: &str) -> Result<bool, TokenStoreError> {
            TokenStore::<SessionPayload>::is_blacklisted(&self.0, token_id).await
        }

        async fn token_exists(&self, user_id: &str, token_id: &str) -> Result<bool, TokenStoreError> {
            TokenStore::<SessionPayload>::token_exists(&self.0, user_id, token_id).await
        }

        async fn is_login_limited(&self, token_id: &str) -> Result<bool, TokenStoreError> {
            TokenStore::<SessionPayload>::is_login_limited(&self.0, token_id).await
        }
    }

    #[tokio::test]
    async fn concurrent_refreshes_mint_one_pair() {
        let repo = RealAuthRepo::<SessionPayload>::new(
            Arc::new(YieldingStore(MemoryTokenStore::new())),
            AuthConfig {
                sign_key: SIGN_KEY.to_string(),
                ..AuthConfig::default()
            },
        )
        .unwrap();
        let (response, _) = repo
            .sign_token(claims("u1", "web", LoginLimit::Unlimited))
            .await
            .unwrap();

        let (a, b) = tokio::join!(
            repo.refresh_token(&response.refresh_token),
            repo.refresh_token(&response.refresh_token)
        );

        let rejected = [&a, &b]
            .iter()
            .filter(|r| matches!(r, Err(AuthError::NotWhitelisted)))
            .count();
        assert_eq!(rejected, 1);
        assert_eq!(a.is_ok() as usize + b.is_ok() as usize, 1);
    }
}
