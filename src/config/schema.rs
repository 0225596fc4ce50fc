//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address, routing prefix).
    pub listener: ListenerConfig,

    /// Backend endpoint definitions.
    pub endpoints: Vec<EndpointConfig>,

    /// Circuit breaker settings shared by every endpoint.
    pub circuit_breaker: CircuitBreakerConfig,

    /// Health check settings.
    pub health_check: HealthCheckConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Management API settings.
    pub admin: AdminConfig,

    /// Security hardening.
    pub security: SecurityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8000").
    pub bind_address: String,

    /// Path prefix under which proxied traffic is accepted.
    pub route_prefix: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8000".to_string(),
            route_prefix: "/orchestrator".to_string(),
        }
    }
}

/// HTTP methods an endpoint may accept.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Head,
    Options,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Head => "HEAD",
            HttpMethod::Options => "OPTIONS",
        }
    }

    /// Returns true if this method matches the given request method.
    pub fn matches(&self, method: &axum::http::Method) -> bool {
        self.as_str() == method.as_str()
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authentication scheme the backend expects.
///
/// Carried for documentation only; the gateway forwards credentials as-is.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuthType {
    #[default]
    None,
    Bearer,
    ApiKey,
    Basic,
    Oauth2,
}

/// Backend endpoint definition.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct EndpointConfig {
    /// Base URL of the backend (e.g., "http://127.0.0.1:3000/api").
    pub url: String,

    /// Route name; requests to `/{name}/...` reach this endpoint.
    #[serde(default)]
    pub name: Option<String>,

    /// API version; adds the `/{version}/{name}` route.
    #[serde(default)]
    pub version: Option<String>,

    /// Allowed HTTP methods.
    #[serde(default = "default_methods")]
    pub methods: Vec<HttpMethod>,

    /// Authentication scheme expected by the backend (never interpreted).
    #[serde(default)]
    pub auth_type: AuthType,

    /// Whether the endpoint is disabled.
    #[serde(default)]
    pub disabled: bool,

    /// Health check path override, joined to the base URL.
    #[serde(default)]
    pub health_check_path: Option<String>,

    /// Request timeout in seconds.
    #[serde(default = "default_endpoint_timeout")]
    pub timeout_secs: u64,
}

fn default_methods() -> Vec<HttpMethod> {
    vec![HttpMethod::Get]
}

fn default_endpoint_timeout() -> u64 {
    30
}

impl EndpointConfig {
    /// Create a GET-only endpoint definition with defaults.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            name: None,
            version: None,
            methods: default_methods(),
            auth_type: AuthType::None,
            disabled: false,
            health_check_path: None,
            timeout_secs: default_endpoint_timeout(),
        }
    }

    /// Unique identifier: `name` (or `url`), suffixed with `@version` when set.
    pub fn endpoint_id(&self) -> String {
        let base = self.name.as_deref().unwrap_or(&self.url);
        match &self.version {
            Some(version) => format!("{}@{}", base, version),
            None => base.to_string(),
        }
    }

    pub fn allows(&self, method: &axum::http::Method) -> bool {
        self.methods.iter().any(|m| m.matches(method))
    }

    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeout_secs)
    }
}

/// What the breaker serves instead of calling an open backend.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum FallbackStrategy {
    #[default]
    ErrorResponse,
    CachedResponse,
    DefaultResponse,
}

impl FallbackStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            FallbackStrategy::ErrorResponse => "error_response",
            FallbackStrategy::CachedResponse => "cached_response",
            FallbackStrategy::DefaultResponse => "default_response",
        }
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Wrap proxied calls in per-endpoint breakers.
    pub enabled: bool,

    /// Consecutive failures that trip the circuit.
    pub failure_threshold: u32,

    /// Seconds the circuit stays open before admitting a probe.
    pub reset_timeout_secs: u64,

    /// Calls admitted (and successes required) while half-open.
    pub half_open_max_calls: u32,

    /// Response served while the circuit is open.
    pub fallback_strategy: FallbackStrategy,

    /// Static body for `default_response`.
    pub fallback_response: Option<serde_json::Value>,

    /// Status code for `default_response`.
    pub fallback_status: u16,

    /// Largest response body remembered for `cached_response`.
    pub cache_max_bytes: usize,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            failure_threshold: 5,
            reset_timeout_secs: 60,
            half_open_max_calls: 3,
            fallback_strategy: FallbackStrategy::ErrorResponse,
            fallback_response: None,
            fallback_status: 503,
            cache_max_bytes: 10 * 1024,
        }
    }
}

impl CircuitBreakerConfig {
    pub fn reset_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.reset_timeout_secs)
    }
}

/// Health check configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct HealthCheckConfig {
    /// Enable active health checks.
    pub enabled: bool,

    /// Health check interval in seconds.
    pub interval_secs: u64,

    /// Health check timeout in seconds.
    pub timeout_secs: u64,

    /// Number of consecutive failures before marking unhealthy.
    pub unhealthy_threshold: u32,

    /// Number of consecutive successes before marking healthy.
    pub healthy_threshold: u32,

    /// Maximum probes in flight per tick.
    pub max_concurrency: usize,

    /// Seconds to wait for in-flight probes on shutdown.
    pub shutdown_grace_secs: u64,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 30,
            timeout_secs: 10,
            unhealthy_threshold: 3,
            healthy_threshold: 2,
            max_concurrency: 16,
            shutdown_grace_secs: 5,
        }
    }
}

/// Timeout configuration for gateway-level operations.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Backend connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Management API request timeout in seconds.
    pub management_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            management_secs: 30,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Management API configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct AdminConfig {
    /// Mount the management API next to the proxy route.
    pub enabled: bool,

    /// Optional bearer key required on management calls.
    pub api_key: Option<String>,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_key: None,
        }
    }
}

/// Security hardening configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct SecurityConfig {
    /// Add security headers to management responses.
    pub enable_headers: bool,
    /// Maximum request body size accepted on the proxy route, in bytes.
    pub max_body_size: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            enable_headers: true,
            max_body_size: 10 * 1024 * 1024, // 10MB
        }
    }
}
