//! Orchestrator gateway library.
//!
//! Dynamic reverse proxy in front of a changing set of backend endpoints:
//! registry, path router, active health checks and per-endpoint circuit
//! breakers, plus the management API that steers them.

pub mod admin;
pub mod config;
pub mod health;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod registry;
pub mod resilience;
pub mod routing;
pub mod security;

pub use config::schema::GatewayConfig;
pub use http::GatewayServer;
pub use lifecycle::{AppContext, Shutdown};
