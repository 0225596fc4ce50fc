//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request (path below the gateway prefix)
//!     → router.rs (current route table for the registry generation)
//!     → matcher.rs (two-segment then one-segment lookup)
//!     → router.rs (availability, circuit and method checks)
//!     → http::proxy (forward) or fallback
//!     → error.rs renders anything that went wrong
//! ```
//!
//! # Design Decisions
//! - Route table derived from the registry, never edited directly
//! - No regex in hot path (segment lookups only)
//! - Deterministic: same registry generation always matches the same route

pub mod error;
pub mod matcher;
pub mod router;

pub use error::{RouteError, UnavailableReason};
pub use matcher::{RouteEntry, RouteMatch, RouteTable};
pub use router::{ConnectivityReport, RequestRouter, RouteExplanation, RouteInfo};
