//! Route lookup and dispatch.
//!
//! # Responsibilities
//! - Keep the route table in step with the registry generation
//! - Validate a matched endpoint (disabled, unhealthy, circuit, method)
//! - Forward through the circuit breaker, or directly with passive tracking
//! - Render every failure as a definite JSON response
//!
//! # Design Decisions
//! - Route table published through ArcSwap; readers never block
//! - Rebuilt synchronously on the request that first sees a new generation
//! - Explicit NotFound rather than silent default
//! - Registry request counters are updated on every forwarded call, breaker or
//!   not; the breaker keeps its own counts and only it gates traffic
//! - An open circuit is answered before the method check and counts as a rejection

use std::sync::Arc;
use std::time::Instant;

use arc_swap::ArcSwap;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use url::Url;

use crate::config::{FallbackStrategy, HttpMethod};
use crate::health::{health_url, passive};
use crate::http::proxy::{EndpointProxy, ForwardRequest, ProxiedResponse};
use crate::http::request::{build_target_url, request_id, url_to_uri};
use crate::http::response::augment_headers;
use crate::observability::metrics;
use crate::registry::types::unix_millis;
use crate::registry::{EndpointRegistry, EndpointStatus, RegisteredEndpoint};
use crate::resilience::{BreakerOutcome, CachedResponse, CallOutcome, CircuitBreakerManager, CircuitState};
use crate::routing::error::{RouteError, UnavailableReason};
use crate::routing::matcher::{RouteMatch, RouteTable};

impl CallOutcome for ProxiedResponse {
    fn is_failure(&self) -> bool {
        passive::is_backend_failure(self.status)
    }

    fn cacheable(&self) -> Option<CachedResponse> {
        let body = self.buffered().filter(|_| self.status.is_success())?;
        Some(CachedResponse {
            status: self.status,
            headers: self.headers.clone(),
            body: body.clone(),
            stored_at_ms: unix_millis(),
        })
    }
}

/// One row of `GET /router/routes`.
#[derive(Debug, Clone, Serialize)]
pub struct RouteInfo {
    pub pattern: String,
    pub endpoint_id: String,
    pub target_url: String,
    pub methods: Vec<HttpMethod>,
    pub status: EndpointStatus,
    pub circuit_state: CircuitState,
}

/// Debug view of how a path would be routed.
#[derive(Debug, Clone, Serialize)]
pub struct RouteExplanation {
    pub path: String,
    pub matched: bool,
    pub pattern: Option<String>,
    pub endpoint_id: Option<String>,
    pub relative_path: Option<String>,
    pub target_url: Option<String>,
    pub endpoint_status: Option<EndpointStatus>,
    pub circuit_state: Option<CircuitState>,
}

/// Result of `GET /router/test/{id}`.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectivityReport {
    pub endpoint_id: String,
    pub url: String,
    pub status_code: Option<u16>,
    pub response_time_ms: u64,
    pub success: bool,
    pub error: Option<String>,
}

pub struct RequestRouter {
    registry: Arc<EndpointRegistry>,
    breakers: Option<Arc<CircuitBreakerManager>>,
    proxy: EndpointProxy,
    routes: ArcSwap<RouteTable>,
}

impl RequestRouter {
    pub fn new(
        registry: Arc<EndpointRegistry>,
        breakers: Option<Arc<CircuitBreakerManager>>,
        proxy: EndpointProxy,
    ) -> Self {
        let generation = registry.generation();
        let table = RouteTable::build(generation, &registry.list(None, true));
        Self {
            registry,
            breakers,
            proxy,
            routes: ArcSwap::from_pointee(table),
        }
    }

    /// Route table for the current registry generation.
    pub fn current_routes(&self) -> Arc<RouteTable> {
        let generation = self.registry.generation();
        let routes = self.routes.load_full();
        if routes.generation() == generation {
            return routes;
        }
        self.rebuild(generation)
    }

    fn rebuild(&self, generation: u64) -> Arc<RouteTable> {
        // Generation is read before listing so a concurrent change forces
        // another rebuild instead of being masked.
        let table = Arc::new(RouteTable::build(generation, &self.registry.list(None, true)));
        self.routes.store(Arc::clone(&table));
        tracing::debug!(generation, routes = table.len(), "Route table rebuilt");
        table
    }

    /// Force a rebuild; returns the number of patterns.
    pub fn refresh_routes(&self) -> usize {
        self.rebuild(self.registry.generation()).len()
    }

    fn active_breakers(&self) -> Option<&Arc<CircuitBreakerManager>> {
        self.breakers.as_ref().filter(|b| b.enabled())
    }

    /// Route and forward one request. Never fails: errors become responses.
    pub async fn route_request(&self, request: Request<Body>, raw_path: &str) -> Response {
        let start = Instant::now();
        let method = request.method().clone();
        let request_id = request_id(&request);

        match self.dispatch(request, raw_path, start).await {
            Ok((endpoint_id, response)) => {
                tracing::info!(
                    request_id = %request_id,
                    method = %method,
                    path = %raw_path,
                    endpoint = %endpoint_id,
                    status = response.status().as_u16(),
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Request routed"
                );
                metrics::record_request(method.as_str(), response.status().as_u16(), &endpoint_id, start);
                response
            }
            Err(error) => {
                let endpoint = error.endpoint_id().unwrap_or("none").to_string();
                let status = error.status();
                if status == StatusCode::INTERNAL_SERVER_ERROR {
                    tracing::error!(request_id = %request_id, path = %raw_path, endpoint = %endpoint, error = %error, "Routing failed");
                } else {
                    tracing::warn!(request_id = %request_id, path = %raw_path, endpoint = %endpoint, status = status.as_u16(), error = %error, "Request rejected");
                }
                metrics::record_request(method.as_str(), status.as_u16(), &endpoint, start);
                error.into_response()
            }
        }
    }

    async fn dispatch(
        &self,
        request: Request<Body>,
        raw_path: &str,
        start: Instant,
    ) -> Result<(String, Response), RouteError> {
        let matched = self
            .current_routes()
            .resolve(raw_path)
            .ok_or_else(|| RouteError::EndpointNotFound {
                path: raw_path.to_string(),
            })?;

        // Removed after the table was built: nothing to drain into.
        let endpoint = self
            .registry
            .get(&matched.endpoint_id)
            .ok_or_else(|| RouteError::EndpointNotFound {
                path: raw_path.to_string(),
            })?;
        let id = endpoint.id.clone();

        check_available(&endpoint)?;

        let breakers = self.active_breakers();
        if let Some(fallback) = breakers.and_then(|manager| manager.reject_open(&id)) {
            let mut response = fallback.into_response();
            augment_headers(response.headers_mut(), start.elapsed(), &id);
            return Ok((id, response));
        }

        check_method(&endpoint, request.method())?;

        let forward = self.forward_request(&endpoint, &matched, request)?;

        let mut response = match breakers {
            Some(manager) => {
                let outcome = manager.execute(&id, || self.proxy.forward(forward)).await;
                match outcome {
                    Ok(BreakerOutcome::Executed(proxied)) => {
                        passive::observe(&self.registry, &id, Some(proxied.status));
                        proxied.into_response()
                    }
                    Ok(BreakerOutcome::ShortCircuited(fallback)) => fallback.into_response(),
                    Err(e) => {
                        passive::observe(&self.registry, &id, None);
                        return Err(RouteError::from_proxy(&id, e));
                    }
                }
            }
            None => {
                let result = self.proxy.forward(forward).await;
                passive::observe(&self.registry, &id, result.as_ref().ok().map(|r| r.status));
                result.map_err(|e| RouteError::from_proxy(&id, e))?.into_response()
            }
        };

        augment_headers(response.headers_mut(), start.elapsed(), &id);
        Ok((id, response))
    }

    fn forward_request(
        &self,
        endpoint: &RegisteredEndpoint,
        matched: &RouteMatch,
        request: Request<Body>,
    ) -> Result<ForwardRequest, RouteError> {
        let internal = |message: String| RouteError::Internal {
            endpoint_id: Some(endpoint.id.clone()),
            message,
        };

        let base = Url::parse(&endpoint.config.url).map_err(|e| internal(e.to_string()))?;
        let target = build_target_url(&base, &matched.relative_path, request.uri().query());
        let uri = url_to_uri(&target).map_err(|e| internal(e.to_string()))?;

        // Only the cached fallback needs a copy of the body.
        let settings = self.registry.breaker_settings();
        let buffer_limit = (self.active_breakers().is_some()
            && settings.fallback_strategy == FallbackStrategy::CachedResponse)
            .then_some(settings.cache_max_bytes);

        let (parts, body) = request.into_parts();
        Ok(ForwardRequest {
            method: parts.method,
            uri,
            headers: parts.headers,
            body,
            timeout: endpoint.config.timeout(),
            buffer_limit,
        })
    }

    /// Routable patterns, excluding disabled endpoints.
    pub fn active_routes(&self) -> Vec<RouteInfo> {
        let table = self.current_routes();
        let mut routes: Vec<RouteInfo> = table
            .entries()
            .filter(|entry| !entry.disabled)
            .filter_map(|entry| {
                let endpoint = self.registry.get(&entry.endpoint_id)?;
                Some(RouteInfo {
                    pattern: entry.pattern.clone(),
                    endpoint_id: endpoint.id,
                    target_url: endpoint.config.url,
                    methods: endpoint.config.methods,
                    status: endpoint.status,
                    circuit_state: endpoint.circuit_breaker.state,
                })
            })
            .collect();
        routes.sort_by(|a, b| a.pattern.cmp(&b.pattern));
        routes
    }

    /// Explain how `path` would be routed without forwarding anything.
    pub fn explain(&self, path: &str) -> RouteExplanation {
        let normalized = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{}", path)
        };
        let mut explanation = RouteExplanation {
            path: normalized.clone(),
            matched: false,
            pattern: None,
            endpoint_id: None,
            relative_path: None,
            target_url: None,
            endpoint_status: None,
            circuit_state: None,
        };

        let Some(matched) = self.current_routes().resolve(&normalized) else {
            return explanation;
        };
        explanation.matched = true;
        explanation.pattern = Some(matched.pattern.clone());
        explanation.endpoint_id = Some(matched.endpoint_id.clone());
        explanation.relative_path = Some(matched.relative_path.clone());

        if let Some(endpoint) = self.registry.get(&matched.endpoint_id) {
            explanation.target_url = Url::parse(&endpoint.config.url)
                .ok()
                .map(|base| build_target_url(&base, &matched.relative_path, None).to_string());
            explanation.endpoint_status = Some(endpoint.status);
            explanation.circuit_state = Some(endpoint.circuit_breaker.state);
        }
        explanation
    }

    /// One-off GET against the endpoint's health URL; does not touch health state.
    pub async fn test_connectivity(&self, id: &str) -> Option<ConnectivityReport> {
        let endpoint = self.registry.get(id)?;
        let url = match health_url(&endpoint.config) {
            Ok(url) => url.to_string(),
            Err(e) => {
                return Some(ConnectivityReport {
                    endpoint_id: endpoint.id,
                    url: endpoint.config.url,
                    status_code: None,
                    response_time_ms: 0,
                    success: false,
                    error: Some(e.to_string()),
                })
            }
        };

        let report = self.proxy.probe(&url, endpoint.config.timeout()).await;
        Some(ConnectivityReport {
            endpoint_id: endpoint.id,
            url,
            status_code: report.status_code,
            response_time_ms: report.result.response_time_ms,
            success: report.result.success,
            error: report.result.error,
        })
    }
}

fn check_available(endpoint: &RegisteredEndpoint) -> Result<(), RouteError> {
    let reason = if endpoint.config.disabled || endpoint.status == EndpointStatus::Disabled {
        Some(UnavailableReason::Disabled)
    } else if endpoint.status == EndpointStatus::Unhealthy {
        Some(UnavailableReason::Unhealthy)
    } else {
        None
    };

    match reason {
        Some(reason) => Err(RouteError::EndpointUnavailable {
            endpoint_id: endpoint.id.clone(),
            reason,
        }),
        None => Ok(()),
    }
}

fn check_method(endpoint: &RegisteredEndpoint, method: &Method) -> Result<(), RouteError> {
    if endpoint.config.allows(method) {
        return Ok(());
    }
    Err(RouteError::MethodNotAllowed {
        endpoint_id: endpoint.id.clone(),
        method: method.to_string(),
        allowed: endpoint.config.methods.clone(),
    })
}
