//! End-to-end routing through a running gateway.

use std::time::{Duration, Instant};

use axum::Router;
use orchestrator_gateway::config::FallbackStrategy;
use reqwest::StatusCode;
use serde_json::Value;

mod common;

use common::{client, endpoint, spawn_gateway, start_echo_backend, start_slow_backend, test_config};

#[tokio::test]
async fn forwards_request_and_injects_gateway_headers() {
    let backend = start_echo_backend().await;
    let gateway = spawn_gateway(test_config(vec![endpoint("svc", backend)])).await;

    let res = client()
        .get(gateway.proxy_url("/svc/users/5?expand=true"))
        .header("authorization", "Bearer token123")
        .header("x-api-key", "k-1")
        .header("connection", "x-hop")
        .header("x-hop", "secret")
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()["x-endpoint-id"], "svc");
    assert!(res.headers()["x-response-time"].to_str().unwrap().ends_with('s'));
    assert!(res.headers().contains_key("x-request-id"));

    let body: Value = res.json().await.unwrap();
    assert_eq!(body["ok"], true);
    assert_eq!(body["method"], "GET");
    assert_eq!(body["path"], "/users/5");
    assert_eq!(body["query"], "expand=true");

    let headers = &body["headers"];
    assert_eq!(headers["authorization"], "Bearer token123");
    assert_eq!(headers["x-api-key"], "k-1");
    assert!(headers.get("x-hop").is_none());
    assert!(headers["x-request-id"].is_string());
}

#[tokio::test]
async fn versioned_and_plain_patterns_both_route() {
    let backend = start_echo_backend().await;
    let mut config = endpoint("svc", backend);
    config.version = Some("v1".into());
    config.methods = vec![
        orchestrator_gateway::config::HttpMethod::Get,
        orchestrator_gateway::config::HttpMethod::Post,
    ];
    let gateway = spawn_gateway(test_config(vec![config])).await;

    let versioned: Value = client()
        .post(gateway.proxy_url("/v1/svc/items"))
        .body("{}")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(versioned["method"], "POST");
    assert_eq!(versioned["path"], "/items");

    let res = client().get(gateway.proxy_url("/svc/items")).send().await.unwrap();
    assert_eq!(res.headers()["x-endpoint-id"], "svc@v1");
}

#[tokio::test]
async fn slow_backend_times_out_with_504() {
    let backend = start_slow_backend(Duration::from_secs(3)).await;
    let mut config = endpoint("slow", backend);
    config.timeout_secs = 1;
    let gateway = spawn_gateway(test_config(vec![config])).await;

    let start = Instant::now();
    let res = client().get(gateway.proxy_url("/slow/work")).send().await.unwrap();
    let elapsed = start.elapsed();

    assert_eq!(res.status(), StatusCode::GATEWAY_TIMEOUT);
    assert!(elapsed < Duration::from_millis(2500), "took {:?}", elapsed);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "upstream_timeout");
    assert_eq!(body["endpoint_id"], "slow");
}

#[tokio::test]
async fn disabled_endpoint_is_503() {
    let backend = start_echo_backend().await;
    let mut config = endpoint("legacy", backend);
    config.disabled = true;
    let gateway = spawn_gateway(test_config(vec![config])).await;

    let res = client().get(gateway.proxy_url("/legacy/a")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "endpoint_unavailable");
    assert_eq!(body["reason"], "disabled");
}

#[tokio::test]
async fn disallowed_method_is_405() {
    let backend = start_echo_backend().await;
    let gateway = spawn_gateway(test_config(vec![endpoint("svc", backend)])).await;

    let res = client().delete(gateway.proxy_url("/svc/users/5")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(res.headers()["allow"], "GET");
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["allowed_methods"], serde_json::json!(["GET"]));
}

#[tokio::test]
async fn unknown_path_is_404() {
    let backend = start_echo_backend().await;
    let gateway = spawn_gateway(test_config(vec![endpoint("svc", backend)])).await;

    let res = client().get(gateway.proxy_url("/nothing/here")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "endpoint_not_found");

    let res = client().get(gateway.proxy_url("")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unreachable_backend_is_502() {
    let dead = common::dead_addr().await;
    let gateway = spawn_gateway(test_config(vec![endpoint("gone", dead)])).await;

    let res = client().get(gateway.proxy_url("/gone")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "upstream_connection_error");

    let endpoint = gateway.ctx.registry.get("gone").unwrap();
    assert_eq!(endpoint.total_failures, 1);
}

#[tokio::test]
async fn oversized_body_is_rejected() {
    let backend = start_echo_backend().await;
    let mut config = test_config(vec![{
        let mut e = endpoint("svc", backend);
        e.methods = vec![orchestrator_gateway::config::HttpMethod::Post];
        e
    }]);
    config.security.max_body_size = 16;
    let gateway = spawn_gateway(config).await;

    let res = client()
        .post(gateway.proxy_url("/svc"))
        .body(vec![b'x'; 1024])
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn response_larger_than_request_limit_passes_through() {
    let size = 2 * 1024 * 1024;
    let backend = common::start_backend(Router::new().fallback(move || async move { vec![b'x'; size] })).await;
    let mut config = test_config(vec![endpoint("big", backend)]);
    config.security.max_body_size = 1024 * 1024;
    config.circuit_breaker.fallback_strategy = FallbackStrategy::CachedResponse;
    let gateway = spawn_gateway(config).await;

    let res = client().get(gateway.proxy_url("/big/file")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()["x-endpoint-id"], "big");
    let body = res.bytes().await.unwrap();
    assert_eq!(body.len(), size);
    assert!(body.iter().all(|b| *b == b'x'));
}
