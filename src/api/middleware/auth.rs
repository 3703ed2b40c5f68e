//! Bearer token authentication middleware.
//!
//! Extracts `Authorization: Bearer <token>`, resolves it through the
//! authorization guard and injects the `Principal` into request
//! extensions for downstream handlers.

use axum::http::{HeaderValue, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::authorization;

/// Require a valid bearer token for an active user.
///
/// Accesses `ApiContext` from request extensions (injected by Extension layer).
/// On success: injects `Principal` and adds a `Cache-Control: no-store` header.
pub async fn require_auth(req: Request<axum::body::Body>, next: Next) -> Response {
    match require_auth_inner(req, next).await {
        Ok(resp) => resp,
        Err(err) => err.into_response(),
    }
}

async fn require_auth_inner(
    mut req: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let ctx: ApiContext = req
        .extensions()
        .get::<ApiContext>()
        .cloned()
        .ok_or(ApiError::Internal("missing API context".into()))?;

    let token = req
        .headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(ApiError::Unauthorized)?
        .to_string();

    let principal = {
        let conn = ctx.core.open_db()?;
        authorization::authenticate(&conn, ctx.core.signer(), &token)?
    }; // Connection dropped here, before any .await

    req.extensions_mut().insert(principal);

    let mut response = next.run(req).await;
    response
        .headers_mut()
        .insert("Cache-Control", HeaderValue::from_static("no-store"));
    Ok(response)
}
