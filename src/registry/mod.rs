//! Endpoint registry subsystem.
//!
//! # Data Flow
//! ```text
//! config sync / management API
//!     → store.rs register / unregister / sync_with_config
//!     → generation bump
//!     → route table rebuilt on next lookup
//!
//! health checker → apply_probe → status + counters
//! router         → get / breaker / record_*
//! ```
//!
//! # Design Decisions
//! - Sharded map (DashMap): one writer per key, independent keys never contend
//! - Readers get cloned snapshots; no I/O happens under a shard lock
//! - The breaker lives inside the entry so both share one lifetime

pub mod store;
pub mod types;

pub use store::{EndpointRegistry, ProbeApplied};
pub use types::{
    EndpointStatus, HealthRecord, ProbeResult, RegisteredEndpoint, RegistryError, RegistryStats,
    SyncResult,
};
