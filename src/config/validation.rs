//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Structural checks on every endpoint definition
//! - Validate value ranges (timeouts > 0, thresholds >= 1)
//! - Detect duplicate endpoint identifiers
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - `validate_endpoint` is shared with the registry so runtime
//!   registrations obey the same rules as the config file

use std::collections::HashSet;
use std::net::SocketAddr;

use url::Url;

use crate::config::schema::{EndpointConfig, GatewayConfig};

pub const MIN_ENDPOINT_TIMEOUT_SECS: u64 = 1;
pub const MAX_ENDPOINT_TIMEOUT_SECS: u64 = 300;

/// A single semantic problem found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("endpoint '{endpoint}': {reason}")]
    Endpoint { endpoint: String, reason: String },

    #[error("duplicate endpoint identifier '{0}'")]
    DuplicateEndpoint(String),

    #[error("{field}: {reason}")]
    Field { field: &'static str, reason: String },
}

impl ValidationError {
    fn field(field: &'static str, reason: impl Into<String>) -> Self {
        ValidationError::Field {
            field,
            reason: reason.into(),
        }
    }
}

/// Validate a whole configuration, collecting every error.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::field(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }
    if !config.listener.route_prefix.starts_with('/') {
        errors.push(ValidationError::field(
            "listener.route_prefix",
            "must start with '/'",
        ));
    } else if config.listener.route_prefix.trim_end_matches('/').is_empty() {
        errors.push(ValidationError::field(
            "listener.route_prefix",
            "must not be the root path",
        ));
    }

    let cb = &config.circuit_breaker;
    if cb.failure_threshold == 0 {
        errors.push(ValidationError::field("circuit_breaker.failure_threshold", "must be >= 1"));
    }
    if cb.reset_timeout_secs == 0 {
        errors.push(ValidationError::field("circuit_breaker.reset_timeout_secs", "must be >= 1"));
    }
    if cb.half_open_max_calls == 0 {
        errors.push(ValidationError::field("circuit_breaker.half_open_max_calls", "must be >= 1"));
    }
    if !(100..=599).contains(&cb.fallback_status) {
        errors.push(ValidationError::field(
            "circuit_breaker.fallback_status",
            format!("{} is not an HTTP status code", cb.fallback_status),
        ));
    }

    let hc = &config.health_check;
    if hc.interval_secs == 0 {
        errors.push(ValidationError::field("health_check.interval_secs", "must be >= 1"));
    }
    if hc.timeout_secs == 0 {
        errors.push(ValidationError::field("health_check.timeout_secs", "must be >= 1"));
    }
    if hc.unhealthy_threshold == 0 {
        errors.push(ValidationError::field("health_check.unhealthy_threshold", "must be >= 1"));
    }
    if hc.healthy_threshold == 0 {
        errors.push(ValidationError::field("health_check.healthy_threshold", "must be >= 1"));
    }
    if hc.max_concurrency == 0 {
        errors.push(ValidationError::field("health_check.max_concurrency", "must be >= 1"));
    }

    if config.timeouts.connect_secs == 0 {
        errors.push(ValidationError::field("timeouts.connect_secs", "must be >= 1"));
    }
    if config.timeouts.management_secs == 0 {
        errors.push(ValidationError::field("timeouts.management_secs", "must be >= 1"));
    }

    let mut seen = HashSet::new();
    for endpoint in &config.endpoints {
        if let Err(e) = validate_endpoint(endpoint) {
            errors.push(e);
        }
        let id = endpoint.endpoint_id();
        if !seen.insert(id.clone()) {
            errors.push(ValidationError::DuplicateEndpoint(id));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Structural checks for a single endpoint definition.
pub fn validate_endpoint(config: &EndpointConfig) -> Result<(), ValidationError> {
    let fail = |reason: String| ValidationError::Endpoint {
        endpoint: config.endpoint_id(),
        reason,
    };

    let url = Url::parse(&config.url).map_err(|e| fail(format!("invalid url: {}", e)))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(fail(format!("unsupported scheme '{}'", url.scheme())));
    }
    if url.host_str().is_none() {
        return Err(fail("url has no host".to_string()));
    }

    if let Some(name) = &config.name {
        if !is_valid_name(name) {
            return Err(fail(format!(
                "name '{}' may only contain letters, digits, '_' and '-'",
                name
            )));
        }
    }

    if let Some(version) = &config.version {
        if !is_valid_version(version) {
            return Err(fail(format!(
                "version '{}' must look like 'v1' or '1.2.3'",
                version
            )));
        }
    }

    if config.methods.is_empty() {
        return Err(fail("at least one method is required".to_string()));
    }

    if !(MIN_ENDPOINT_TIMEOUT_SECS..=MAX_ENDPOINT_TIMEOUT_SECS).contains(&config.timeout_secs) {
        return Err(fail(format!(
            "timeout_secs must be within {}..={}",
            MIN_ENDPOINT_TIMEOUT_SECS, MAX_ENDPOINT_TIMEOUT_SECS
        )));
    }

    if let Some(path) = &config.health_check_path {
        if !path.starts_with('/') {
            return Err(fail("health_check_path must start with '/'".to_string()));
        }
    }

    Ok(())
}

fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn is_valid_version(version: &str) -> bool {
    let digits = version.strip_prefix('v').unwrap_or(version);
    !digits.is_empty()
        && digits
            .split('.')
            .all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_digit()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint(url: &str, name: &str) -> EndpointConfig {
        let mut config = EndpointConfig::new(url);
        config.name = Some(name.to_string());
        config
    }

    #[test]
    fn accepts_well_formed_endpoint() {
        let mut config = endpoint("http://127.0.0.1:3000/api", "user-service_2");
        config.version = Some("v1.2".into());
        config.health_check_path = Some("/healthz".into());
        assert!(validate_endpoint(&config).is_ok());
    }

    #[test]
    fn rejects_bad_urls() {
        assert!(validate_endpoint(&endpoint("not a url", "svc")).is_err());
        assert!(validate_endpoint(&endpoint("ftp://host/files", "svc")).is_err());
    }

    #[test]
    fn rejects_bad_name_and_version() {
        assert!(validate_endpoint(&endpoint("http://localhost", "bad name")).is_err());
        assert!(validate_endpoint(&endpoint("http://localhost", "svc/x")).is_err());

        let mut config = endpoint("http://localhost", "svc");
        config.version = Some("latest".into());
        assert!(validate_endpoint(&config).is_err());
        config.version = Some("v1.".into());
        assert!(validate_endpoint(&config).is_err());
        config.version = Some("2".into());
        assert!(validate_endpoint(&config).is_ok());
    }

    #[test]
    fn rejects_timeout_out_of_range() {
        let mut config = endpoint("http://localhost", "svc");
        config.timeout_secs = 0;
        assert!(validate_endpoint(&config).is_err());
        config.timeout_secs = 301;
        assert!(validate_endpoint(&config).is_err());
        config.timeout_secs = 300;
        assert!(validate_endpoint(&config).is_ok());
    }

    #[test]
    fn rejects_empty_methods_and_relative_health_path() {
        let mut config = endpoint("http://localhost", "svc");
        config.methods.clear();
        assert!(validate_endpoint(&config).is_err());

        let mut config = endpoint("http://localhost", "svc");
        config.health_check_path = Some("health".into());
        assert!(validate_endpoint(&config).is_err());
    }

    #[test]
    fn collects_all_errors() {
        let mut config = GatewayConfig::default();
        config.listener.route_prefix = "orchestrator".into();
        config.circuit_breaker.failure_threshold = 0;
        config.endpoints = vec![
            endpoint("http://localhost:1", "svc"),
            endpoint("http://localhost:2", "svc"),
            endpoint("nope", "broken"),
        ];

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 4);
        assert!(errors.contains(&ValidationError::DuplicateEndpoint("svc".into())));
    }

    #[test]
    fn default_config_is_valid() {
        assert!(validate_config(&GatewayConfig::default()).is_ok());
    }
}
