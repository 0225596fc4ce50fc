//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Active health checks (active.rs):
//!     Periodic timer (missed ticks skipped)
//!     → Probe each enabled endpoint, bounded concurrency
//!     → registry.apply_probe → state.rs
//!
//! Passive health checks (passive.rs):
//!     Proxied request outcome observed
//!     → registry request counters
//!
//! State machine (state.rs):
//!     Active ←→ Unhealthy
//!     With thresholds to prevent flapping
//! ```
//!
//! # Design Decisions
//! - Active and passive checks are complementary
//! - State transitions require consecutive successes/failures
//! - The probe set is read from the registry on every tick

pub mod active;
pub mod passive;
pub mod state;

pub use active::{health_url, HealthChecker, HealthError, HealthSummary};
