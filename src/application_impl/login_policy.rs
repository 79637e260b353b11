use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error};

/// Post-sign housekeeping for one user's token set: login-limit enforcement
/// and expired-item pruning.
pub struct LoginPolicy<P> {
    store: Arc<dyn TokenStore<P>>,
}

impl<P> Clone for LoginPolicy<P> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

/// Items a new sign-in pushes out of the live session count.
#[derive(Debug)]
pub struct Violations<P> {
    /// Offending access items plus their refresh siblings.
    pub blacklist: Vec<TokenItem<P>>,
    /// Offending access items only.
    pub login_limit: Vec<TokenItem<P>>,
}

impl<P> Violations<P> {
    pub fn is_empty(&self) -> bool {
        self.blacklist.is_empty() && self.login_limit.is_empty()
    }
}

/// Decide which of the user's other sessions violate the limit carried by
/// `claims`. The token `claims` was issued for is never a violation.
pub fn select_violations<P: ClaimsPayload>(
    claims: &Claims<P>,
    all_tokens: &HashMap<String, TokenItem<P>>,
) -> Violations<P> {
    let mut violations = Violations {
        blacklist: Vec::new(),
        login_limit: Vec::new(),
    };
    let limit = claims.payload.login_limit();
    if limit == LoginLimit::Unlimited {
        return violations;
    }

    for item in all_tokens.values() {
        if item.is_refresh_token || item.token_id == claims.id {
            continue;
        }
        let is_limit = match limit {
            LoginLimit::Unlimited => false,
            LoginLimit::OnlyOne => true,
            LoginLimit::PlatformOne => {
                item.payload.login_platform() == claims.payload.login_platform()
            }
        };
        if !is_limit {
            continue;
        }
        violations.blacklist.push(item.clone());
        violations.login_limit.push(item.clone());
        if let Some(refresh) = all_tokens.get(&item.refresh_token_id) {
            violations.blacklist.push(refresh.clone());
        }
    }
    violations
}

impl<P: ClaimsPayload> LoginPolicy<P> {
    pub fn new(store: Arc<dyn TokenStore<P>>) -> Self {
        Self { store }
    }

    /// Runs both passes; failures only reach the log.
    pub async fn after_sign_token(&self, claims: &Claims<P>, now: i64) {
        let user = claims.payload.user_identifier();
        if let Err(e) = self.check_login_limit(claims).await {
            error!(%user, token_id = %claims.id, error = %e, "check_login_limit failed");
        }
        if let Err(e) = self.delete_expired_tokens(claims, now).await {
            error!(%user, token_id = %claims.id, error = %e, "delete_expired_tokens failed");
        }
    }

    /// Blacklist the user's other sessions that the new login displaces.
    ///
    /// The blacklist write and the login-limit write are both attempted; the
    /// first failure is returned after both ran.
    pub async fn check_login_limit(&self, claims: &Claims<P>) -> Result<(), AuthError> {
        if claims.payload.login_limit() == LoginLimit::Unlimited {
            return Ok(());
        }
        let user = claims.payload.user_identifier();
        let all_tokens = self
            .store
            .get_all_tokens(&user)
            .await
            .map_err(|e| AuthError::store("get_all_tokens", e))?;

        let violations = select_violations(claims, &all_tokens);
        if violations.is_empty() {
            return Ok(());
        }
        debug!(
            %user,
            token_id = %claims.id,
            displaced = violations.login_limit.len(),
            "login limit exceeded"
        );

        let blacklist_result = self
            .store
            .add_blacklist(&user, &violations.blacklist)
            .await
            .map_err(|e| AuthError::store("add_blacklist", e));
        if let Err(e) = &blacklist_result {
            error!(%user, error = %e, "add_blacklist failed");
        }

        let limit_result = self
            .store
            .add_login_limit(&violations.login_limit)
            .await
            .map_err(|e| AuthError::store("add_login_limit", e));
        if let Err(e) = &limit_result {
            error!(%user, error = %e, "add_login_limit failed");
        }

        blacklist_result.and(limit_result)
    }

    /// Delete every item of the user's set with `expired_at <= now` in one
    /// store call.
    pub async fn delete_expired_tokens(
        &self,
        claims: &Claims<P>,
        now: i64,
    ) -> Result<(), AuthError> {
        let user = claims.payload.user_identifier();
        let all_tokens = self
            .store
            .get_all_tokens(&user)
            .await
            .map_err(|e| AuthError::store("get_all_tokens", e))?;

        let expired: Vec<TokenItem<P>> = all_tokens
            .into_values()
            .filter(|item| item.is_expired(now))
            .collect();
        if expired.is_empty() {
            return Ok(());
        }
        debug!(%user, count = expired.len(), "pruning expired tokens");

        self.store
            .delete_tokens(&user, &expired)
            .await
            .map_err(|e| AuthError::store("delete_tokens", e))?;
        Ok(())
    }
}
