//! Response handling and transformation.
//!
//! # Responsibilities
//! - Add gateway headers (`x-response-time`, `x-endpoint-id`) to routed responses
//!
//! # Design Decisions
//! - Additive only: headers the backend already set are left alone
//! - Hop-by-hop headers are stripped by the proxy before this point

use std::time::Duration;

use axum::http::{HeaderMap, HeaderName, HeaderValue};

pub const X_RESPONSE_TIME: HeaderName = HeaderName::from_static("x-response-time");
pub const X_ENDPOINT_ID: HeaderName = HeaderName::from_static("x-endpoint-id");

/// Seconds with millisecond precision, e.g. `0.012s`.
pub fn format_response_time(elapsed: Duration) -> String {
    format!("{:.3}s", elapsed.as_secs_f64())
}

pub fn augment_headers(headers: &mut HeaderMap, elapsed: Duration, endpoint_id: &str) {
    if let Ok(value) = HeaderValue::from_str(&format_response_time(elapsed)) {
        headers.entry(X_RESPONSE_TIME).or_insert(value);
    }
    if let Ok(value) = HeaderValue::from_str(endpoint_id) {
        headers.entry(X_ENDPOINT_ID).or_insert(value);
    }
}
