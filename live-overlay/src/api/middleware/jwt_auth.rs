//! JWT authentication middleware.

use axum::{
    extract::{Query, Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use serde::Deserialize;

use crate::api::error::ApiError;
use crate::api::jwt::JwtError;
use crate::api::server::AppState;

/// `?token=` fallback for players that cannot set headers.
#[derive(Debug, Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

/// Token from `Authorization: Bearer` or the `token` query parameter.
fn extract_token(request: &Request) -> Option<String> {
    let from_header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty());

    from_header.or_else(|| {
        Query::<TokenQuery>::try_from_uri(request.uri())
            .ok()
            .and_then(|Query(query)| query.token)
            .filter(|t| !t.is_empty())
    })
}

/// Validate the caller's token and insert its [`Claims`](crate::api::jwt::Claims)
/// into request extensions.
pub async fn jwt_auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let jwt_service = state
        .jwt_service
        .as_ref()
        .ok_or_else(|| ApiError::unauthorized("Authentication not configured"))?;

    let token = extract_token(&request).ok_or_else(|| {
        ApiError::unauthorized("Missing or invalid Authorization header or token query")
    })?;

    let claims = jwt_service.validate_token(&token).map_err(|e| match e {
        JwtError::Expired => ApiError::unauthorized("Token has expired"),
        JwtError::MissingOwner => ApiError::unauthorized("Token has no owner"),
        e => {
            tracing::debug!(error = %e, "Rejected bearer token");
            ApiError::unauthorized("Invalid token")
        }
    })?;

    request.extensions_mut().insert(claims);
    Ok(next.run(request).await)
}
