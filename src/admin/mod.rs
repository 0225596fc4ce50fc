//! Management API.
//!
//! JSON endpoints for inspecting and steering the registry, health checker,
//! circuit breakers, router and configuration. Mounted beside the proxy route.

pub mod auth;
pub mod handlers;

use std::sync::Arc;

use axum::routing::{get, post, put};
use axum::{middleware, Router};

use self::auth::require_api_key;
use self::handlers::*;
use crate::lifecycle::AppContext;

/// Management routes. `/` and `/health` stay open; the rest honour `admin.api_key`
/// and are left out entirely when `admin.enabled` is false.
pub fn router(ctx: Arc<AppContext>) -> Router {
    let public = Router::new()
        .route("/", get(service_info))
        .route("/health", get(liveness));

    if !ctx.config().admin.enabled {
        tracing::info!("Management API disabled");
        return public.with_state(ctx);
    }

    let protected = Router::new()
        .route("/registry/endpoints", get(list_endpoints).post(register_endpoint))
        .route("/registry/endpoints/{id}", get(get_endpoint).delete(unregister_endpoint))
        .route("/registry/endpoints/{id}/status", put(update_endpoint_status))
        .route("/registry/stats", get(registry_stats))
        .route("/registry/sync", post(sync_registry))
        .route("/health/status", get(health_status))
        .route("/health/endpoints", get(health_endpoints))
        .route("/health/endpoints/{id}", get(health_endpoint))
        .route("/health/check/{id}", post(check_endpoint))
        .route("/health/unhealthy", get(unhealthy_endpoints))
        .route("/health/summary", get(health_summary))
        .route("/circuit-breakers", get(list_breakers))
        .route("/circuit-breakers/open", get(open_breakers))
        .route("/circuit-breakers/{id}", get(get_breaker))
        .route("/circuit-breakers/{id}/reset", post(reset_breaker))
        .route("/circuit-breakers/{id}/trip", post(trip_breaker))
        .route("/router/routes", get(list_routes))
        .route("/router/test/{id}", get(test_route))
        .route("/router/refresh", post(refresh_routes))
        .route("/router/debug/{*path}", get(debug_route))
        .route("/config/status", get(config_status))
        .route("/config/reload", post(reload_config))
        .route("/config/endpoints", get(configured_endpoints))
        .route("/config/validate", post(validate_config))
        .route_layer(middleware::from_fn_with_state(Arc::clone(&ctx), require_api_key));

    public.merge(protected).with_state(ctx)
}
