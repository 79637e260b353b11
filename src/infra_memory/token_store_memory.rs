use crate::domain_model::*;
use crate::domain_port::*;
use chrono::Utc;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Process-local [`TokenStore`].
///
/// A user's set is mutated under that user's map entry, which holds the
/// shard lock, so multi-item writes are atomic with respect to readers.
/// Expired blacklist and login-limit entries are invisible to reads. All
/// three maps are swept by the first write after each sweep interval.
pub struct MemoryTokenStore<P> {
    tokens: DashMap<String, HashMap<String, TokenItem<P>>>,
    blacklist: DashMap<String, Expiring<String>>,
    login_limit: DashMap<String, Expiring<TokenItem<P>>>,
    sweep_interval: i64,
    last_sweep: AtomicI64,
}

struct Expiring<T> {
    value: T,
    expired_at: i64,
}

impl<P: ClaimsPayload> MemoryTokenStore<P> {
    pub fn new() -> Self {
        Self::with_sweep_interval(DEFAULT_SWEEP_INTERVAL)
    }

    pub fn with_sweep_interval(interval: Duration) -> Self {
        Self {
            tokens: DashMap::new(),
            blacklist: DashMap::new(),
            login_limit: DashMap::new(),
            sweep_interval: i64::try_from(interval.as_secs()).unwrap_or(i64::MAX),
            last_sweep: AtomicI64::new(0),
        }
    }

    fn now() -> i64 {
        Utc::now().timestamp()
    }

    /// Owner recorded for a blacklisted token, if the entry is still live.
    pub fn blacklisted_by(&self, token_id: &str) -> Option<String> {
        let now = Self::now();
        self.blacklist
            .get(token_id)
            .filter(|e| e.expired_at > now)
            .map(|e| e.value.clone())
    }

    /// Drop every entry with `expired_at <= now`. Returns how many went.
    pub fn purge_expired(&self, now: i64) -> usize {
        let mut purged = 0;
        self.tokens.retain(|_, set| {
            let before = set.len();
            set.retain(|_, item| !item.is_expired(now));
            purged += before - set.len();
            !set.is_empty()
        });
        self.blacklist.retain(|_, e| {
            let live = e.expired_at > now;
            purged += usize::from(!live);
            live
        });
        self.login_limit.retain(|_, e| {
            let live = e.expired_at > now;
            purged += usize::from(!live);
            live
        });
        purged
    }

    /// Must not be called while holding a map guard.
    fn maybe_sweep(&self) {
        let now = Self::now();
        let last = self.last_sweep.load(Ordering::Relaxed);
        if now.saturating_sub(last) < self.sweep_interval {
            return;
        }
        if self
            .last_sweep
            .compare_exchange(last, now, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
        {
            let purged = self.purge_expired(now);
            if purged > 0 {
                tracing::debug!(purged, "swept expired entries");
            }
        }
    }
}

impl<P: ClaimsPayload> Default for MemoryTokenStore<P> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl<P: ClaimsPayload> TokenStore<P> for MemoryTokenStore<P> {
    async fn save_tokens(
        &self,
        user_id: &str,
        items: &[TokenItem<P>],
    ) -> Result<(), TokenStoreError> {
        if items.is_empty() {
            return Ok(());
        }
        self.maybe_sweep();
        let mut set = self.tokens.entry(user_id.to_owned()).or_default();
        for item in items {
            set.insert(item.key().to_owned(), item.clone());
        }
        Ok(())
    }

    async fn get_all_tokens(
        &self,
        user_id: &str,
    ) -> Result<HashMap<String, TokenItem<P>>, TokenStoreError> {
        Ok(self
            .tokens
            .get(user_id)
            .map(|set| set.value().clone())
            .unwrap_or_default())
    }

    async fn delete_tokens(
        &self,
        user_id: &str,
        items: &[TokenItem<P>],
    ) -> Result<usize, TokenStoreError> {
        if items.is_empty() {
            return Ok(0);
        }
        let mut removed = 0;
        if let Some(mut set) = self.tokens.get_mut(user_id) {
            for item in items {
                if set.remove(item.key()).is_some() {
                    removed += 1;
                }
            }
        }
        self.tokens.remove_if(user_id, |_, set| set.is_empty());
        Ok(removed)
    }

    async fn add_blacklist(
        &self,
        user_id: &str,
        items: &[TokenItem<P>],
    ) -> Result<(), TokenStoreError> {
        self.maybe_sweep();
        for item in items {
            self.blacklist.insert(
                item.key().to_owned(),
                Expiring {
                    value: user_id.to_owned(),
                    expired_at: item.expired_at,
                },
            );
        }
        Ok(())
    }

    async fn add_login_limit(&self, items: &[TokenItem<P>]) -> Result<(), TokenStoreError> {
        self.maybe_sweep();
        for item in items {
            self.login_limit.insert(
                item.key().to_owned(),
                Expiring {
                    value: item.clone(),
                    expired_at: item.expired_at,
                },
            );
        }
        Ok(())
    }

    async fn is_blacklisted(&self, token_id: &str) -> Result<bool, TokenStoreError> {
        let now = Self::now();
        let live = self
            .blacklist
            .get(token_id)
            .map(|e| e.expired_at > now);
        match live {
            Some(true) => Ok(true),
            Some(false) => {
                self.blacklist.remove(token_id);
                Ok(false)
            }
            None => Ok(false),
        }
    }

    async fn token_exists(&self, user_id: &str, token_id: &str) -> Result<bool, TokenStoreError> {
        Ok(self
            .tokens
            .get(user_id)
            .is_some_and(|set| set.contains_key(token_id)))
    }

    async fn is_login_limited(&self, token_id: &str) -> Result<bool, TokenStoreError> {
        let now = Self::now();
        Ok(self
            .login_limit
            .get(token_id)
            .is_some_and(|e| e.expired_at > now))
    }
}
