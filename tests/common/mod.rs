//! Shared utilities for integration tests.
#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;

use orchestrator_gateway::config::{EndpointConfig, GatewayConfig};
use orchestrator_gateway::lifecycle::{AppContext, Shutdown};
use orchestrator_gateway::GatewayServer;

/// Serve `router` on an ephemeral local port.
pub async fn start_backend(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    addr
}

async fn echo(method: Method, uri: Uri, headers: HeaderMap) -> Json<Value> {
    let headers: serde_json::Map<String, Value> = headers
        .iter()
        .map(|(name, value)| {
            (
                name.to_string(),
                Value::String(value.to_str().unwrap_or_default().to_string()),
            )
        })
        .collect();
    Json(json!({
        "ok": true,
        "method": method.as_str(),
        "path": uri.path(),
        "query": uri.query(),
        "headers": headers,
    }))
}

/// Backend answering every request with a JSON description of it.
pub async fn start_echo_backend() -> SocketAddr {
    start_backend(Router::new().fallback(echo)).await
}

/// Backend that sleeps before answering.
pub async fn start_slow_backend(delay: Duration) -> SocketAddr {
    start_backend(Router::new().fallback(move || async move {
        tokio::time::sleep(delay).await;
        Json(json!({"ok": true}))
    }))
    .await
}

/// Backend whose status and body come from `f` on every request.
pub async fn start_programmable_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let f = Arc::new(f);
    start_backend(Router::new().fallback(move || {
        let f = Arc::clone(&f);
        async move {
            let (status, body) = f().await;
            (StatusCode::from_u16(status).unwrap(), body)
        }
    }))
    .await
}

/// Address nothing listens on.
pub async fn dead_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

pub fn endpoint(name: &str, addr: SocketAddr) -> EndpointConfig {
    let mut config = EndpointConfig::new(format!("http://{}", addr));
    config.name = Some(name.to_string());
    config
}

/// Gateway defaults for tests: no background probes.
pub fn test_config(endpoints: Vec<EndpointConfig>) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.endpoints = endpoints;
    config.health_check.enabled = false;
    config
}

pub struct TestGateway {
    pub addr: SocketAddr,
    pub ctx: Arc<AppContext>,
    shutdown: Shutdown,
}

impl TestGateway {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn proxy_url(&self, path: &str) -> String {
        self.url(&format!("/orchestrator{}", path))
    }
}

impl Drop for TestGateway {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

pub async fn spawn_gateway(config: GatewayConfig) -> TestGateway {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let ctx = AppContext::build(config, None);
    let shutdown = Shutdown::new();
    let server = GatewayServer::new(Arc::clone(&ctx));
    let rx = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, rx).await;
    });

    TestGateway { addr, ctx, shutdown }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

/// Poll `check` until it holds or `deadline` passes.
pub async fn eventually<F, Fut>(deadline: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let start = tokio::time::Instant::now();
    while start.elapsed() < deadline {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    false
}
