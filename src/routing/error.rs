//! Request-path errors and their HTTP rendering.

use std::time::Duration;

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::config::HttpMethod;
use crate::http::proxy::ProxyError;
use crate::registry::types::unix_millis;

/// Why a matched endpoint refused the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnavailableReason {
    Disabled,
    Unhealthy,
    CircuitOpen,
}

impl std::fmt::Display for UnavailableReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            UnavailableReason::Disabled => "disabled",
            UnavailableReason::Unhealthy => "unhealthy",
            UnavailableReason::CircuitOpen => "circuit_open",
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    #[error("No endpoint found for path '{path}'")]
    EndpointNotFound { path: String },

    #[error("Endpoint {endpoint_id} is currently unavailable ({reason})")]
    EndpointUnavailable {
        endpoint_id: String,
        reason: UnavailableReason,
    },

    #[error("Method {method} not allowed for endpoint {endpoint_id}")]
    MethodNotAllowed {
        endpoint_id: String,
        method: String,
        allowed: Vec<HttpMethod>,
    },

    #[error("Endpoint {endpoint_id} did not respond within {}s", .timeout.as_secs_f64())]
    UpstreamTimeout { endpoint_id: String, timeout: Duration },

    #[error("Could not connect to endpoint {endpoint_id}: {message}")]
    UpstreamConnection { endpoint_id: String, message: String },

    #[error("Endpoint {endpoint_id} failed: {message}")]
    UpstreamProtocol { endpoint_id: String, message: String },

    #[error("Internal routing error: {message}")]
    Internal {
        endpoint_id: Option<String>,
        message: String,
    },
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<UnavailableReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    allowed_methods: Option<&'a [HttpMethod]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    endpoint_id: Option<&'a str>,
    timestamp_ms: u64,
}

impl RouteError {
    pub fn from_proxy(endpoint_id: &str, error: ProxyError) -> Self {
        let endpoint_id = endpoint_id.to_string();
        match error {
            ProxyError::Timeout(timeout) => RouteError::UpstreamTimeout { endpoint_id, timeout },
            ProxyError::Connect(message) => RouteError::UpstreamConnection { endpoint_id, message },
            ProxyError::Protocol(message) => RouteError::UpstreamProtocol { endpoint_id, message },
            ProxyError::InvalidTarget(message) => RouteError::Internal {
                endpoint_id: Some(endpoint_id),
                message,
            },
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            RouteError::EndpointNotFound { .. } => StatusCode::NOT_FOUND,
            RouteError::EndpointUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            RouteError::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
            RouteError::UpstreamTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            RouteError::UpstreamConnection { .. } | RouteError::UpstreamProtocol { .. } => {
                StatusCode::BAD_GATEWAY
            }
            RouteError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            RouteError::EndpointNotFound { .. } => "endpoint_not_found",
            RouteError::EndpointUnavailable { .. } => "endpoint_unavailable",
            RouteError::MethodNotAllowed { .. } => "method_not_allowed",
            RouteError::UpstreamTimeout { .. } => "upstream_timeout",
            RouteError::UpstreamConnection { .. } => "upstream_connection_error",
            RouteError::UpstreamProtocol { .. } => "upstream_protocol_error",
            RouteError::Internal { .. } => "internal_routing_error",
        }
    }

    pub fn endpoint_id(&self) -> Option<&str> {
        match self {
            RouteError::EndpointNotFound { .. } => None,
            RouteError::EndpointUnavailable { endpoint_id, .. }
            | RouteError::MethodNotAllowed { endpoint_id, .. }
            | RouteError::UpstreamTimeout { endpoint_id, .. }
            | RouteError::UpstreamConnection { endpoint_id, .. }
            | RouteError::UpstreamProtocol { endpoint_id, .. } => Some(endpoint_id),
            RouteError::Internal { endpoint_id, .. } => endpoint_id.as_deref(),
        }
    }
}

impl IntoResponse for RouteError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (reason, allowed) = match &self {
            RouteError::EndpointUnavailable { reason, .. } => (Some(*reason), None),
            RouteError::MethodNotAllowed { allowed, .. } => (None, Some(allowed.as_slice())),
            _ => (None, None),
        };

        let body = ErrorBody {
            error: self.code(),
            message: self.to_string(),
            reason,
            allowed_methods: allowed,
            endpoint_id: self.endpoint_id(),
            timestamp_ms: unix_millis(),
        };
        let mut response = (status, Json(body)).into_response();

        if let RouteError::MethodNotAllowed { allowed, .. } = &self {
            let value = allowed
                .iter()
                .map(HttpMethod::as_str)
                .collect::<Vec<_>>()
                .join(", ");
            if let Ok(value) = HeaderValue::from_str(&value) {
                response.headers_mut().insert(header::ALLOW, value);
            }
        }
        response
    }
}
