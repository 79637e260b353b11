use super::error::*;
use crate::application_port::*;
use crate::domain_model::*;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use warp::{self, reject};

pub type SessionAuthRepo = dyn AuthRepo<SessionPayload>;

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<ApiError>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        ApiResponse {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(code: ApiErrorCode, message: impl Into<String>) -> Self {
        ApiResponse {
            success: false,
            data: None,
            error: Some(ApiError {
                code,
                message: message.into(),
            }),
        }
    }
}

/// Issue a pair for an already-authenticated account. Callers are trusted
/// issuers; credentials are checked upstream.
pub async fn sign(
    body: SessionPayload,
    auth_repo: Arc<SessionAuthRepo>,
) -> Result<impl warp::Reply, warp::Rejection> {
    if body.user_id.trim().is_empty() {
        return Err(reject::custom(ApiErrorCode::InvalidRequest));
    }

    let (tokens, _) = auth_repo
        .sign_token(Claims::new(body))
        .await
        .map_err(ApiErrorCode::from)
        .map_err(reject::custom)?;

    Ok(warp::reply::json(&ApiResponse::ok(tokens)))
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

pub async fn refresh(
    body: RefreshRequest,
    auth_repo: Arc<SessionAuthRepo>,
) -> Result<impl warp::Reply, warp::Rejection> {
    let (tokens, _) = auth_repo
        .refresh_token(&body.refresh_token)
        .await
        .map_err(ApiErrorCode::from)
        .map_err(reject::custom)?;

    Ok(warp::reply::json(&ApiResponse::ok(tokens)))
}

#[derive(Debug, Serialize)]
pub struct RevokeResponse;

pub async fn revoke(
    claims: Claims<SessionPayload>,
    auth_repo: Arc<SessionAuthRepo>,
) -> Result<impl warp::Reply, warp::Rejection> {
    auth_repo
        .revoke_token(&claims)
        .await
        .map_err(ApiErrorCode::from)
        .map_err(reject::custom)?;

    Ok(warp::reply::json(&ApiResponse::ok(RevokeResponse)))
}

#[derive(Debug, Serialize)]
pub struct VerifyResponse {
    pub token_id: String,
    pub user_id: String,
    pub login_platform: LoginPlatform,
    pub login_limit: LoginLimit,
    pub expires_at: DateTime<Utc>,
}

pub async fn verify(claims: Claims<SessionPayload>) -> Result<impl warp::Reply, warp::Rejection> {
    let response = VerifyResponse {
        expires_at: DateTime::from_timestamp(claims.expires_at, 0).unwrap_or_default(),
        token_id: claims.id,
        user_id: claims.payload.user_id,
        login_platform: claims.payload.login_platform,
        login_limit: claims.payload.login_limit,
    };
    Ok(warp::reply::json(&ApiResponse::ok(response)))
}
