//! Failure injection tests: circuit breaking, fallbacks and health eviction.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use orchestrator_gateway::config::FallbackStrategy;
use orchestrator_gateway::registry::EndpointStatus;
use orchestrator_gateway::resilience::CircuitState;
use reqwest::StatusCode;
use serde_json::Value;

mod common;

use common::{client, endpoint, eventually, spawn_gateway, start_programmable_backend, test_config};

#[tokio::test]
async fn server_errors_open_the_circuit() {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    let backend = start_programmable_backend(move || {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            (500, "boom".to_string())
        }
    })
    .await;

    let mut config = test_config(vec![endpoint("flaky", backend)]);
    config.circuit_breaker.failure_threshold = 2;
    let gateway = spawn_gateway(config).await;
    let client = client();

    for _ in 0..2 {
        let res = client.get(gateway.proxy_url("/flaky")).send().await.unwrap();
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR, "5xx passes through");
    }

    let res = client.get(gateway.proxy_url("/flaky")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(res.headers()["x-circuit-breaker"], "fallback");
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["reason"], "circuit_open");
    assert_eq!(body["circuit_breaker_state"], "open");

    assert_eq!(calls.load(Ordering::SeqCst), 2, "open circuit must not reach the backend");
    assert_eq!(gateway.ctx.breakers.state("flaky"), Some(CircuitState::Open));
}

#[tokio::test]
async fn client_errors_keep_the_circuit_closed() {
    let backend = start_programmable_backend(|| async { (404, "missing".to_string()) }).await;
    let mut config = test_config(vec![endpoint("svc", backend)]);
    config.circuit_breaker.failure_threshold = 1;
    let gateway = spawn_gateway(config).await;

    for _ in 0..3 {
        let res = client().get(gateway.proxy_url("/svc/x")).send().await.unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }
    assert_eq!(gateway.ctx.breakers.state("svc"), Some(CircuitState::Closed));
}

#[tokio::test]
async fn cached_fallback_replays_last_success() {
    let healthy = Arc::new(AtomicBool::new(true));
    let flag = healthy.clone();
    let backend = start_programmable_backend(move || {
        let flag = flag.clone();
        async move {
            if flag.load(Ordering::SeqCst) {
                (200, "{\"items\":[1,2]}".to_string())
            } else {
                (503, "down".to_string())
            }
        }
    })
    .await;

    let mut config = test_config(vec![endpoint("catalog", backend)]);
    config.circuit_breaker.failure_threshold = 1;
    config.circuit_breaker.fallback_strategy = FallbackStrategy::CachedResponse;
    let gateway = spawn_gateway(config).await;
    let client = client();

    let res = client.get(gateway.proxy_url("/catalog")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    healthy.store(false, Ordering::SeqCst);
    let res = client.get(gateway.proxy_url("/catalog")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);

    let res = client.get(gateway.proxy_url("/catalog")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()["x-circuit-breaker"], "fallback");
    assert_eq!(res.text().await.unwrap(), "{\"items\":[1,2]}");
}

#[tokio::test]
async fn circuit_recovers_after_reset_timeout() {
    let healthy = Arc::new(AtomicBool::new(false));
    let flag = healthy.clone();
    let backend = start_programmable_backend(move || {
        let flag = flag.clone();
        async move {
            if flag.load(Ordering::SeqCst) {
                (200, "ok".to_string())
            } else {
                (502, "bad".to_string())
            }
        }
    })
    .await;

    let mut config = test_config(vec![endpoint("svc", backend)]);
    config.circuit_breaker.failure_threshold = 1;
    config.circuit_breaker.reset_timeout_secs = 1;
    config.circuit_breaker.half_open_max_calls = 1;
    let gateway = spawn_gateway(config).await;
    let client = client();

    client.get(gateway.proxy_url("/svc")).send().await.unwrap();
    assert_eq!(gateway.ctx.breakers.state("svc"), Some(CircuitState::Open));

    healthy.store(true, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(1200)).await;

    let res = client.get(gateway.proxy_url("/svc")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(gateway.ctx.breakers.state("svc"), Some(CircuitState::Closed));
}

#[tokio::test]
async fn health_checks_evict_and_restore_endpoint() {
    let healthy = Arc::new(AtomicBool::new(true));
    let flag = healthy.clone();
    let backend = start_programmable_backend(move || {
        let flag = flag.clone();
        async move {
            if flag.load(Ordering::SeqCst) {
                (200, "{\"ok\":true}".to_string())
            } else {
                (500, "dead".to_string())
            }
        }
    })
    .await;

    let mut config = test_config(vec![endpoint("svc", backend)]);
    config.health_check.enabled = true;
    config.health_check.interval_secs = 1;
    config.health_check.timeout_secs = 1;
    config.health_check.unhealthy_threshold = 2;
    config.health_check.healthy_threshold = 1;
    let gateway = spawn_gateway(config).await;
    let client = client();

    let res = client.get(gateway.proxy_url("/svc")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    healthy.store(false, Ordering::SeqCst);
    let registry = gateway.ctx.registry.clone();
    let evicted = eventually(Duration::from_secs(6), || {
        let registry = registry.clone();
        async move { registry.get("svc").map(|e| e.status) == Some(EndpointStatus::Unhealthy) }
    })
    .await;
    assert!(evicted, "endpoint should be marked unhealthy");

    let res = client.get(gateway.proxy_url("/svc")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["reason"], "unhealthy");

    healthy.store(true, Ordering::SeqCst);
    let registry = gateway.ctx.registry.clone();
    let restored = eventually(Duration::from_secs(6), || {
        let registry = registry.clone();
        async move { registry.get("svc").map(|e| e.status) == Some(EndpointStatus::Active) }
    })
    .await;
    assert!(restored, "endpoint should recover");

    let res = client.get(gateway.proxy_url("/svc")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}
