//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated, immutable)
//!     → AppContext::on_config_loaded
//!     → registry sync + breaker settings swap
//!
//! On reload (file change, SIGHUP, POST /config/reload):
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → mpsc event to the config subscriber
//!     → atomic swap of Arc<GatewayConfig>
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require full reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - A failed reload keeps the running configuration

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, ConfigError};
pub use schema::{
    AuthType, CircuitBreakerConfig, EndpointConfig, FallbackStrategy, GatewayConfig,
    HealthCheckConfig, HttpMethod,
};
pub use validation::{validate_config, validate_endpoint, ValidationError};
