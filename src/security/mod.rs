//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Proxied request:
//!     → body size limit (tower-http)
//!     → headers.rs (strip hop-by-hop, forward the rest)
//!     → backend
//!
//! Management request:
//!     → admin bearer key check
//!     → headers.rs security response headers
//! ```
//!
//! # Design Decisions
//! - The gateway never inspects or validates backend credentials
//! - Management surface protected by an optional static key

pub mod headers;
