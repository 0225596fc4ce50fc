//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Request to backend:
//!     → manager.rs (look up the endpoint's breaker)
//!     → circuit_breaker.rs (admit or reject)
//!     → rejected: fallback.rs (error / cached / default response)
//!     → admitted: call backend, record outcome
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every external call has a deadline
//! - No retries: a failed call is reported to the caller as-is
//! - Circuit breaker prevents cascading failures
//! - Transport errors and 5xx are failures; 4xx are not

pub mod circuit_breaker;
pub mod fallback;
pub mod manager;

pub use circuit_breaker::{CachedResponse, CircuitBreaker, CircuitSnapshot, CircuitState};
pub use fallback::FallbackResponse;
pub use manager::{BreakerOutcome, BreakerStats, CallOutcome, CircuitBreakerManager};
