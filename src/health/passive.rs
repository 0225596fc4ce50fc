//! Passive health checking (failure detection).
//!
//! # Responsibilities
//! - Observe request outcomes
//! - Track consecutive failures in the registry
//!
//! # Design Decisions
//! - Only connection errors, timeouts and 5xx count as failures
//! - 4xx are NOT failures (client error, not backend)
//! - Passive observations never change endpoint status; probes do

use axum::http::StatusCode;

use crate::registry::EndpointRegistry;

/// Does this backend status count against the endpoint?
pub fn is_backend_failure(status: StatusCode) -> bool {
    status.is_server_error()
}

/// Record a proxied call's outcome. `None` means the transport failed.
pub fn observe(registry: &EndpointRegistry, endpoint_id: &str, status: Option<StatusCode>) {
    match status {
        Some(status) if !is_backend_failure(status) => {
            registry.record_success(endpoint_id);
        }
        _ => {
            registry.record_failure(endpoint_id);
        }
    }
}
