use super::error::*;
use super::handler::{self, SessionAuthRepo};
use crate::domain_model::*;
use crate::server::*;
use nanoid::nanoid;
use std::convert::Infallible;
use std::sync::Arc;
use warp::{Filter, http, reject};

pub fn routes(
    server: Arc<Server>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    let sign = warp::path!("token" / "sign")
        .and(warp::post())
        .and(warp::body::json())
        .and(with(server.auth_repo.clone()))
        .and_then(handler::sign);

    let refresh = warp::path!("token" / "refresh")
        .and(warp::post())
        .and(warp::body::json())
        .and(with(server.auth_repo.clone()))
        .and_then(handler::refresh);

    let revoke = warp::path!("token" / "revoke")
        .and(warp::post())
        .and(with_verification(server.auth_repo.clone()))
        .and(with(server.auth_repo.clone()))
        .and_then(handler::revoke);

    let verify = warp::path!("token" / "verify")
        .and(warp::get())
        .and(with_verification(server.auth_repo.clone()))
        .and_then(handler::verify);

    request_id()
        .and(sign.or(refresh).or(revoke).or(verify))
        .map(|id: String, reply| warp::reply::with_header(reply, REQUEST_ID_HEADER, id))
        .with(warp::trace(|info| {
            tracing::info_span!(
                "request",
                id = tracing::field::Empty,
                method = %info.method(),
                path = info.path(),
            )
        }))
}

/// Echoed on every routed reply; generated when the caller sends none.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Caller-supplied or fresh request id, recorded on the request span.
fn request_id() -> impl Filter<Extract = (String,), Error = warp::Rejection> + Clone {
    warp::header::optional::<String>(REQUEST_ID_HEADER).map(|id: Option<String>| {
        let id = id
            .filter(|id| !id.is_empty() && id.len() <= 64)
            .unwrap_or_else(|| nanoid!(10));
        tracing::Span::current().record("id", id.as_str());
        id
    })
}

fn with<ServiceType>(
    service: Arc<ServiceType>,
) -> impl Filter<Extract = (Arc<ServiceType>,), Error = Infallible> + Clone
where
    ServiceType: Send + Sync + ?Sized,
{
    warp::any().map(move || service.clone())
}

/// `Authorization: Bearer <access token>` → decoded claims that passed the
/// revocation checks.
pub fn with_verification(
    auth_repo: Arc<SessionAuthRepo>,
) -> impl Filter<Extract = (Claims<SessionPayload>,), Error = warp::Rejection> + Clone {
    warp::header::<String>(http::header::AUTHORIZATION.as_ref()).and_then(move |token: String| {
        let auth_repo = auth_repo.clone();
        async move {
            if let Some(token) = token.strip_prefix("Bearer ") {
                let claims = auth_repo
                    .decode_access_token(token.trim())
                    .await
                    .map_err(ApiErrorCode::from)
                    .map_err(reject::custom)?;
                auth_repo
                    .verify_token(&claims)
                    .await
                    .map_err(ApiErrorCode::from)
                    .map_err(reject::custom)?;
                Ok(claims)
            } else {
                Err(reject::custom(ApiErrorCode::Unauthorized))
            }
        }
    })
}
