use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::config::loader::parse_config;
use crate::config::{ConfigError, EndpointConfig};
use crate::health::HealthError;
use crate::lifecycle::AppContext;
use crate::registry::types::unix_millis;
use crate::registry::{EndpointStatus, RegisteredEndpoint};
use crate::resilience::{BreakerStats, CircuitState};

type Ctx = State<Arc<AppContext>>;

/// Management API error, rendered as `{error, message}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "bad_request",
            ApiError::NotFound(_) => "not_found",
            ApiError::Internal(_) => "internal_error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({
            "error": self.code(),
            "message": self.to_string(),
            "timestamp_ms": unix_millis(),
        });
        (self.status(), Json(body)).into_response()
    }
}

fn endpoint_not_found(id: &str) -> ApiError {
    ApiError::NotFound(format!("Endpoint not found: {}", id))
}

// ---- service ----

pub async fn service_info(State(ctx): Ctx) -> Json<Value> {
    let prefix = ctx.config().listener.route_prefix.clone();
    Json(json!({
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Dynamic reverse-proxy gateway with health checks and circuit breakers",
        "endpoints": {
            "health": "/health",
            "configuration": "/config",
            "registry": "/registry",
            "routing": "/router",
            "health_monitoring": "/health/status",
            "circuit_breakers": "/circuit-breakers",
            "gateway": format!("{}/{{path}}", prefix),
        },
    }))
}

pub async fn liveness(State(ctx): Ctx) -> Json<Value> {
    let stats = ctx.registry.stats();
    let summary = ctx.health.summary();
    let config = ctx.config();
    Json(json!({
        "status": "healthy",
        "uptime_secs": ctx.uptime().as_secs(),
        "timestamp_ms": unix_millis(),
        "configuration": {
            "loaded": true,
            "endpoints_count": config.endpoints.len(),
        },
        "registry": {
            "total_endpoints": stats.total,
            "active_endpoints": stats.active,
            "unhealthy_endpoints": stats.unhealthy,
        },
        "health_monitoring": {
            "enabled": summary.config.enabled,
            "running": summary.running,
            "monitored_endpoints": summary.total_endpoints,
            "healthy_endpoints": summary.healthy_endpoints,
            "health_percentage": summary.health_percentage,
        },
    }))
}

// ---- registry ----

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub status: Option<EndpointStatus>,
    #[serde(default = "default_true")]
    pub include_disabled: bool,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

fn default_true() -> bool {
    true
}

fn default_limit() -> usize {
    100
}

#[derive(Debug, Serialize)]
pub struct EndpointList {
    pub endpoints: Vec<RegisteredEndpoint>,
    pub total_count: usize,
    pub active_count: usize,
    pub unhealthy_count: usize,
    pub disabled_count: usize,
}

pub async fn list_endpoints(
    State(ctx): Ctx,
    Query(params): Query<ListParams>,
) -> Result<Json<EndpointList>, ApiError> {
    if !(1..=1000).contains(&params.limit) {
        return Err(ApiError::BadRequest("limit must be between 1 and 1000".into()));
    }

    let all = ctx.registry.list(params.status, params.include_disabled);
    let total_count = all.len();
    let endpoints = all.into_iter().skip(params.offset).take(params.limit).collect();
    let stats = ctx.registry.stats();

    Ok(Json(EndpointList {
        endpoints,
        total_count,
        active_count: stats.active,
        unhealthy_count: stats.unhealthy,
        disabled_count: stats.disabled,
    }))
}

pub async fn get_endpoint(
    State(ctx): Ctx,
    Path(id): Path<String>,
) -> Result<Json<RegisteredEndpoint>, ApiError> {
    ctx.registry.get(&id).map(Json).ok_or_else(|| endpoint_not_found(&id))
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub config: EndpointConfig,
}

pub async fn register_endpoint(
    State(ctx): Ctx,
    Json(request): Json<RegisterRequest>,
) -> Result<Json<Value>, ApiError> {
    let endpoint = ctx
        .registry
        .register(request.config)
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    tracing::info!(endpoint = %endpoint.id, "Endpoint registered through management API");
    Ok(Json(json!({
        "success": true,
        "message": "Endpoint registered successfully",
        "endpoint_id": endpoint.id,
        "endpoint_url": endpoint.config.url,
    })))
}

pub async fn unregister_endpoint(
    State(ctx): Ctx,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    if !ctx.registry.unregister(&id) {
        return Err(endpoint_not_found(&id));
    }
    tracing::info!(endpoint = %id, "Endpoint unregistered through management API");
    Ok(Json(json!({
        "success": true,
        "message": format!("Endpoint {} unregistered successfully", id),
        "endpoint_id": id,
    })))
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdate {
    pub status: EndpointStatus,
}

pub async fn update_endpoint_status(
    State(ctx): Ctx,
    Path(id): Path<String>,
    Json(update): Json<StatusUpdate>,
) -> Result<Json<Value>, ApiError> {
    if !ctx.registry.update_status(&id, update.status) {
        return Err(endpoint_not_found(&id));
    }
    Ok(Json(json!({
        "success": true,
        "message": format!("Endpoint status updated to {}", update.status),
        "endpoint_id": id,
        "new_status": update.status,
    })))
}

pub async fn registry_stats(State(ctx): Ctx) -> Json<Value> {
    Json(json!({
        "registry_stats": ctx.registry.stats(),
        "generation": ctx.registry.generation(),
        "timestamp_ms": unix_millis(),
    }))
}

pub async fn sync_registry(State(ctx): Ctx) -> Json<Value> {
    let config = ctx.config();
    let result = ctx.registry.sync_with_config(&config.endpoints);
    Json(json!({
        "success": result.errors.is_empty(),
        "message": "Registry synchronized with configuration",
        "sync_result": result,
        "timestamp_ms": unix_millis(),
    }))
}

// ---- health ----

#[derive(Debug, Serialize)]
pub struct BreakerSummary {
    pub total_circuit_breakers: usize,
    pub open_breakers: usize,
    pub half_open_breakers: usize,
    pub closed_breakers: usize,
    pub health_percentage: f64,
}

impl BreakerSummary {
    fn from_stats(stats: &[BreakerStats]) -> Self {
        let total = stats.len();
        let count = |state| stats.iter().filter(|s| s.snapshot.state == state).count();
        let open = count(CircuitState::Open);
        let half_open = count(CircuitState::HalfOpen);
        let closed = total - open - half_open;
        Self {
            total_circuit_breakers: total,
            open_breakers: open,
            half_open_breakers: half_open,
            closed_breakers: closed,
            health_percentage: if total == 0 {
                100.0
            } else {
                closed as f64 / total as f64 * 100.0
            },
        }
    }
}

/// `healthy` at 90% and above, `degraded` at 70%, `unhealthy` below.
pub fn system_status(health_percentage: f64, breaker_percentage: f64) -> &'static str {
    let overall = health_percentage.min(breaker_percentage);
    if overall >= 90.0 {
        "healthy"
    } else if overall >= 70.0 {
        "degraded"
    } else {
        "unhealthy"
    }
}

pub async fn health_status(State(ctx): Ctx) -> Json<Value> {
    let summary = ctx.health.summary();
    let breakers = BreakerSummary::from_stats(&ctx.breakers.all_stats());
    let health_percentage = if summary.total_endpoints == 0 {
        100.0
    } else {
        summary.health_percentage
    };

    Json(json!({
        "system_status": system_status(health_percentage, breakers.health_percentage),
        "summary": summary,
        "circuit_breaker_summary": breakers,
        "timestamp_ms": unix_millis(),
    }))
}

pub async fn health_endpoints(State(ctx): Ctx) -> Json<Value> {
    let mut records = ctx.health.records();
    records.sort_by(|a, b| a.endpoint_id.cmp(&b.endpoint_id));
    Json(json!({
        "total_count": records.len(),
        "endpoints": records,
        "timestamp_ms": unix_millis(),
    }))
}

pub async fn health_endpoint(
    State(ctx): Ctx,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let record = ctx
        .health
        .record(&id)
        .ok_or_else(|| ApiError::NotFound(format!("Health data not found for endpoint: {}", id)))?;
    let breaker = ctx.breakers.stats(&id).map(|s| s.snapshot);
    Ok(Json(json!({
        "health": record,
        "circuit_breaker": breaker,
        "timestamp_ms": unix_millis(),
    })))
}

pub async fn check_endpoint(
    State(ctx): Ctx,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let record = ctx.health.check_now(&id).await.map_err(|e| match e {
        HealthError::EndpointNotFound(_) => ApiError::NotFound(e.to_string()),
    })?;
    tracing::info!(endpoint = %id, status = %record.status, "Manual health check completed");
    Ok(Json(json!({
        "success": true,
        "message": format!("Health check completed for {}", id),
        "result": record,
        "timestamp_ms": unix_millis(),
    })))
}

pub async fn unhealthy_endpoints(State(ctx): Ctx) -> Json<Value> {
    let unhealthy = ctx.health.unhealthy();
    Json(json!({
        "count": unhealthy.len(),
        "unhealthy_endpoints": unhealthy,
        "timestamp_ms": unix_millis(),
    }))
}

pub async fn health_summary(State(ctx): Ctx) -> Json<Value> {
    Json(json!({
        "summary": ctx.health.summary(),
        "timestamp_ms": unix_millis(),
    }))
}

// ---- circuit breakers ----

pub async fn list_breakers(State(ctx): Ctx) -> Json<Value> {
    let stats = ctx.breakers.all_stats();
    Json(json!({
        "enabled": ctx.breakers.enabled(),
        "summary": BreakerSummary::from_stats(&stats),
        "circuit_breakers": stats,
        "timestamp_ms": unix_millis(),
    }))
}

pub async fn open_breakers(State(ctx): Ctx) -> Json<Value> {
    let open: Vec<BreakerStats> = ctx
        .breakers
        .all_stats()
        .into_iter()
        .filter(|s| s.snapshot.state == CircuitState::Open)
        .collect();
    Json(json!({
        "count": open.len(),
        "open_circuit_breakers": open,
        "timestamp_ms": unix_millis(),
    }))
}

pub async fn get_breaker(
    State(ctx): Ctx,
    Path(id): Path<String>,
) -> Result<Json<BreakerStats>, ApiError> {
    ctx.breakers.stats(&id).map(Json).ok_or_else(|| endpoint_not_found(&id))
}

pub async fn reset_breaker(
    State(ctx): Ctx,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    if !ctx.breakers.reset(&id) {
        return Err(endpoint_not_found(&id));
    }
    Ok(Json(json!({
        "success": true,
        "endpoint_id": id,
        "state": CircuitState::Closed,
    })))
}

pub async fn trip_breaker(
    State(ctx): Ctx,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    if !ctx.breakers.trip(&id) {
        return Err(endpoint_not_found(&id));
    }
    Ok(Json(json!({
        "success": true,
        "endpoint_id": id,
        "state": CircuitState::Open,
    })))
}

// ---- router ----

pub async fn list_routes(State(ctx): Ctx) -> Json<Value> {
    let routes = ctx.router.active_routes();
    Json(json!({
        "route_prefix": ctx.config().listener.route_prefix,
        "total_routes": routes.len(),
        "routes": routes,
    }))
}

pub async fn test_route(
    State(ctx): Ctx,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let report = ctx
        .router
        .test_connectivity(&id)
        .await
        .ok_or_else(|| endpoint_not_found(&id))?;
    Ok(Json(json!({
        "test_result": report,
        "timestamp_ms": unix_millis(),
    })))
}

pub async fn refresh_routes(State(ctx): Ctx) -> Json<Value> {
    let routes = ctx.router.refresh_routes();
    Json(json!({
        "success": true,
        "message": "Routes refreshed",
        "total_routes": routes,
    }))
}

pub async fn debug_route(State(ctx): Ctx, Path(path): Path<String>) -> Json<Value> {
    Json(json!(ctx.router.explain(&path)))
}

// ---- configuration ----

pub async fn config_status(State(ctx): Ctx) -> Json<Value> {
    let config = ctx.config();
    Json(json!({
        "loaded": true,
        "config_path": ctx.config_path().map(|p| p.display().to_string()),
        "endpoints_count": config.endpoints.len(),
        "route_prefix": config.listener.route_prefix,
        "reload": &*ctx.reload_status(),
    }))
}

pub async fn reload_config(State(ctx): Ctx) -> Result<Json<Value>, ApiError> {
    let result = ctx.reload_from_disk().map_err(|e| match e {
        ConfigError::NoConfigFile => ApiError::BadRequest(e.to_string()),
        other => ApiError::Internal(format!("Failed to reload configuration: {}", other)),
    })?;
    Ok(Json(json!({
        "success": true,
        "message": "Configuration reloaded successfully",
        "endpoints_count": ctx.config().endpoints.len(),
        "sync_result": result,
    })))
}

pub async fn configured_endpoints(State(ctx): Ctx) -> Json<Value> {
    let config = ctx.config();
    let disabled = config.endpoints.iter().filter(|e| e.disabled).count();
    Json(json!({
        "endpoints": config.endpoints,
        "total_count": config.endpoints.len(),
        "disabled_count": disabled,
        "active_count": config.endpoints.len() - disabled,
    }))
}

/// Validate a TOML document without applying it.
pub async fn validate_config(body: String) -> Json<Value> {
    match parse_config(&body) {
        Ok(config) => Json(json!({
            "valid": true,
            "endpoints_count": config.endpoints.len(),
            "errors": Vec::<String>::new(),
        })),
        Err(ConfigError::Validation(errors)) => Json(json!({
            "valid": false,
            "errors": errors.iter().map(ToString::to_string).collect::<Vec<_>>(),
        })),
        Err(e) => Json(json!({
            "valid": false,
            "errors": [e.to_string()],
        })),
    }
}
