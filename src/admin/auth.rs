use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::lifecycle::AppContext;
use crate::registry::types::unix_millis;

/// Require `Authorization: Bearer <admin.api_key>` when a key is configured.
///
/// The key is read per request so a reload can rotate it.
pub async fn require_api_key(
    State(ctx): State<Arc<AppContext>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let config = ctx.config();
    let Some(expected) = config.admin.api_key.as_deref() else {
        return next.run(request).await;
    };

    let presented = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "));

    if presented == Some(expected) {
        return next.run(request).await;
    }

    tracing::warn!(path = %request.uri().path(), "Rejected management request without valid API key");
    let body = json!({
        "error": "unauthorized",
        "message": "A valid management API key is required",
        "timestamp_ms": unix_millis(),
    });
    (StatusCode::UNAUTHORIZED, Json(body)).into_response()
}
