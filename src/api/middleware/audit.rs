//! Audit logging middleware.
//!
//! Logs every authenticated request with principal, method, path and
//! response status. Runs innermost (after auth has injected `Principal`).

use axum::extract::OriginalUri;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;

use crate::authorization::Principal;

pub async fn log_access(req: Request<axum::body::Body>, next: Next) -> Response {
    let method = req.method().to_string();
    // Nested routers see a stripped path; prefer the original.
    let path = req
        .extensions()
        .get::<OriginalUri>()
        .map(|uri| uri.0.path().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());
    let principal = req
        .extensions()
        .get::<Principal>()
        .map(|p| format!("{}:{}", p.role, p.user_id))
        .unwrap_or_else(|| "anonymous".to_string());

    let response = next.run(req).await;

    tracing::debug!(
        principal = %principal,
        status = response.status().as_u16(),
        "{method} {path}"
    );
    response
}
