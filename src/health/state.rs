//! Endpoint health state machine.
//!
//! # States
//! - Active: endpoint receives traffic
//! - Unhealthy: requests are refused with 503 until probes recover
//! - Disabled: frozen, probes never move it
//!
//! # State Transitions
//! ```text
//! any (not Disabled) → Unhealthy: consecutive failures >= unhealthy_threshold
//! not Active (not Disabled) → Active: consecutive successes >= healthy_threshold
//! ```
//!
//! # Design Decisions
//! - Hysteresis prevents flapping
//! - Pure function; the registry applies it under the entry's lock so the
//!   status and its counters change together

use crate::config::HealthCheckConfig;
use crate::registry::types::EndpointStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthCounters {
    pub status: EndpointStatus,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
}

/// Fold one probe outcome into the counters.
pub fn apply(current: HealthCounters, success: bool, thresholds: &HealthCheckConfig) -> HealthCounters {
    let mut next = current;
    if success {
        next.consecutive_failures = 0;
        next.consecutive_successes = next.consecutive_successes.saturating_add(1);
    } else {
        next.consecutive_successes = 0;
        next.consecutive_failures = next.consecutive_failures.saturating_add(1);
    }

    if current.status == EndpointStatus::Disabled {
        return next;
    }

    if success {
        if next.consecutive_successes >= thresholds.healthy_threshold
            && current.status != EndpointStatus::Active
        {
            next.status = EndpointStatus::Active;
        }
    } else if next.consecutive_failures >= thresholds.unhealthy_threshold {
        next.status = EndpointStatus::Unhealthy;
    }
    next
}
