//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum Router: proxy route under the prefix plus the management API
//! - Wire up middleware (request ID, tracing, body limit, timeouts, security headers)
//! - Bind server to listener and serve until shutdown
//! - Start and stop the health checker around the serve loop

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::State;
use axum::http::Request;
use axum::response::Response;
use axum::routing::any;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::admin;
use crate::http::request::{MakeRequestUuid, X_REQUEST_ID};
use crate::lifecycle::shutdown::signalled;
use crate::lifecycle::AppContext;
use crate::routing::RequestRouter;
use crate::security::headers::security_header_layers;

/// State for the proxy route.
#[derive(Clone)]
struct ProxyState {
    router: Arc<RequestRouter>,
    prefix: Arc<str>,
}

/// HTTP server for the gateway.
pub struct GatewayServer {
    ctx: Arc<AppContext>,
    router: Router,
}

impl GatewayServer {
    pub fn new(ctx: Arc<AppContext>) -> Self {
        let router = Self::build_router(&ctx);
        Self { ctx, router }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    pub fn build_router(ctx: &Arc<AppContext>) -> Router {
        let config = ctx.config();
        let prefix = config.listener.route_prefix.trim_end_matches('/').to_string();

        let proxy = Router::new()
            .route(&prefix, any(proxy_handler))
            .route(&format!("{}/{{*path}}", prefix), any(proxy_handler))
            .layer(RequestBodyLimitLayer::new(config.security.max_body_size))
            .with_state(ProxyState {
                router: Arc::clone(&ctx.router),
                prefix: Arc::from(prefix.as_str()),
            });

        let mut management = admin::router(Arc::clone(ctx)).layer(TimeoutLayer::new(
            Duration::from_secs(config.timeouts.management_secs),
        ));
        if config.security.enable_headers {
            management = security_header_layers()
                .into_iter()
                .fold(management, |router, layer| router.layer(layer));
        }

        Router::new().merge(proxy).merge(management).layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(X_REQUEST_ID, MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::new(X_REQUEST_ID)),
        )
    }

    pub fn into_router(self) -> Router {
        self.router
    }

    /// Serve on `listener` until `shutdown` fires, then stop the health checker.
    pub async fn run(
        self,
        listener: TcpListener,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        let config = self.ctx.config();
        tracing::info!(
            address = %addr,
            route_prefix = %config.listener.route_prefix,
            endpoints = self.ctx.registry.len(),
            "HTTP server starting"
        );

        self.ctx.health.start();

        let served = axum::serve(listener, self.router)
            .with_graceful_shutdown(signalled(shutdown))
            .await;

        self.ctx.health.stop().await;
        served?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

async fn proxy_handler(State(state): State<ProxyState>, request: Request<Body>) -> Response {
    // Raw path keeps percent-encoding intact for the backend.
    let path = request.uri().path();
    let relative = path.strip_prefix(&*state.prefix).unwrap_or(path).to_string();

    tracing::debug!(path = %path, relative = %relative, "Proxying request");
    state.router.route_request(request, &relative).await
}
