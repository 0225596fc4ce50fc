//! Fallback responses served while a circuit is open.
//!
//! # Design Decisions
//! - Fallbacks never touch the network
//! - `cached_response` degrades to the error response when nothing is cached
//! - Every fallback is marked with `x-circuit-breaker: fallback`

use axum::body::{Body, Bytes};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::config::{CircuitBreakerConfig, FallbackStrategy};
use crate::registry::types::unix_millis;
use crate::resilience::circuit_breaker::{CircuitBreaker, CircuitState};
use crate::routing::error::UnavailableReason;

pub const X_CIRCUIT_BREAKER: HeaderName = HeaderName::from_static("x-circuit-breaker");

/// Response produced instead of calling the backend.
#[derive(Debug, Clone)]
pub struct FallbackResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub strategy: FallbackStrategy,
}

impl IntoResponse for FallbackResponse {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
            .headers_mut()
            .insert(X_CIRCUIT_BREAKER, HeaderValue::from_static("fallback"));
        response
    }
}

/// Build the configured fallback for an open circuit.
pub fn build_fallback(
    endpoint_id: &str,
    breaker: &CircuitBreaker,
    settings: &CircuitBreakerConfig,
) -> FallbackResponse {
    match settings.fallback_strategy {
        FallbackStrategy::ErrorResponse => error_response(endpoint_id, breaker.effective_state()),
        FallbackStrategy::CachedResponse => match breaker.cached() {
            Some(cached) => FallbackResponse {
                status: cached.status,
                headers: cached.headers,
                body: cached.body,
                strategy: FallbackStrategy::CachedResponse,
            },
            None => {
                tracing::debug!(endpoint = %endpoint_id, "No cached response, serving error fallback");
                error_response(endpoint_id, breaker.effective_state())
            }
        },
        FallbackStrategy::DefaultResponse => {
            let body = settings.fallback_response.clone().unwrap_or_else(|| {
                json!({
                    "message": "Service temporarily unavailable",
                    "endpoint_id": endpoint_id,
                })
            });
            FallbackResponse {
                status: StatusCode::from_u16(settings.fallback_status)
                    .unwrap_or(StatusCode::SERVICE_UNAVAILABLE),
                headers: json_headers(),
                body: Bytes::from(body.to_string()),
                strategy: FallbackStrategy::DefaultResponse,
            }
        }
    }
}

fn error_response(endpoint_id: &str, state: CircuitState) -> FallbackResponse {
    let body = json!({
        "error": "endpoint_unavailable",
        "message": format!("Endpoint {} is currently unavailable", endpoint_id),
        "reason": UnavailableReason::CircuitOpen,
        "endpoint_id": endpoint_id,
        "circuit_breaker_state": state,
        "timestamp_ms": unix_millis(),
    });
    FallbackResponse {
        status: StatusCode::SERVICE_UNAVAILABLE,
        headers: json_headers(),
        body: Bytes::from(body.to_string()),
        strategy: FallbackStrategy::ErrorResponse,
    }
}

fn json_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers
}
