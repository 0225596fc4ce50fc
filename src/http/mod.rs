//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request id, tracing, body limit)
//!     → request.rs (request id, target URL construction)
//!     → [routing layer picks the endpoint]
//!     → proxy.rs (forward to the backend, strip hop-by-hop headers)
//!     → response.rs (add gateway headers)
//!     → Send to client
//! ```

pub mod proxy;
pub mod request;
pub mod response;
pub mod server;

pub use proxy::{EndpointProxy, ProxyError};
pub use request::X_REQUEST_ID;
pub use server::GatewayServer;
