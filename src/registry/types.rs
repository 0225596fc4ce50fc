//! Registry data types.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::config::EndpointConfig;
use crate::resilience::circuit_breaker::CircuitSnapshot;

/// Milliseconds since the Unix epoch.
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Runtime status of a registered endpoint.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum EndpointStatus {
    Active,
    Inactive,
    Disabled,
    Unhealthy,
}

impl EndpointStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EndpointStatus::Active => "active",
            EndpointStatus::Inactive => "inactive",
            EndpointStatus::Disabled => "disabled",
            EndpointStatus::Unhealthy => "unhealthy",
        }
    }

    /// Initial status for a freshly (re)registered config.
    pub fn initial(config: &EndpointConfig) -> Self {
        if config.disabled {
            EndpointStatus::Disabled
        } else {
            EndpointStatus::Active
        }
    }
}

impl std::fmt::Display for EndpointStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EndpointStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "active" => Ok(EndpointStatus::Active),
            "inactive" => Ok(EndpointStatus::Inactive),
            "disabled" => Ok(EndpointStatus::Disabled),
            "unhealthy" => Ok(EndpointStatus::Unhealthy),
            other => Err(format!("unknown endpoint status '{}'", other)),
        }
    }
}

/// Point-in-time copy of a registry entry, handed to readers.
#[derive(Debug, Clone, Serialize)]
pub struct RegisteredEndpoint {
    pub id: String,
    pub config: EndpointConfig,
    pub registered_at_ms: u64,
    pub status: EndpointStatus,

    /// Probe counters driving health transitions.
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    pub last_health_check_ms: Option<u64>,
    pub last_response_time_ms: Option<u64>,
    pub last_error: Option<String>,

    /// Request counters fed by proxied traffic.
    pub request_failures: u32,
    pub total_requests: u64,
    pub total_failures: u64,
    pub last_failure_ms: Option<u64>,

    pub circuit_breaker: CircuitSnapshot,
}

impl RegisteredEndpoint {
    pub fn health_record(&self) -> HealthRecord {
        HealthRecord {
            endpoint_id: self.id.clone(),
            status: self.status,
            last_check_ms: self.last_health_check_ms,
            response_time_ms: self.last_response_time_ms,
            error: self.last_error.clone(),
            consecutive_failures: self.consecutive_failures,
            consecutive_successes: self.consecutive_successes,
        }
    }
}

/// Health view of one endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthRecord {
    pub endpoint_id: String,
    pub status: EndpointStatus,
    pub last_check_ms: Option<u64>,
    pub response_time_ms: Option<u64>,
    pub error: Option<String>,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
}

/// Result of a single health probe.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeResult {
    pub success: bool,
    pub response_time_ms: u64,
    pub error: Option<String>,
}

/// Outcome of reconciling the registry against a config snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SyncResult {
    pub added: Vec<String>,
    pub updated: Vec<String>,
    pub removed: Vec<String>,
    pub errors: Vec<String>,
}

impl SyncResult {
    pub fn is_noop(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }
}

/// Endpoint counts by status.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RegistryStats {
    pub total: usize,
    pub active: usize,
    pub inactive: usize,
    pub disabled: usize,
    pub unhealthy: usize,
}

/// Registry errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RegistryError {
    #[error("invalid configuration for endpoint '{endpoint}': {reason}")]
    Configuration { endpoint: String, reason: String },
}
