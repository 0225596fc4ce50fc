//! Outbound HTTP: forwarding to endpoints and health probes.
//!
//! # Design Decisions
//! - One pooled hyper-util client shared by the router and the health checker
//! - The whole exchange (connect, send, read body) sits under one deadline
//! - Response bodies stream through; only a small 2xx body that the cached
//!   fallback may replay is buffered
//! - A body still streaming at the deadline is cut off with an error
//! - Plain HTTP backends only; the connector does not speak TLS

use std::time::{Duration, Instant};

use axum::body::{Body, Bytes};
use axum::http::{header, HeaderMap, HeaderValue, Method, Request, StatusCode, Uri};
use futures_util::stream::{self, StreamExt};
use hyper::body::Incoming;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use tokio::time;

use crate::registry::ProbeResult;
use crate::security::headers::strip_hop_by_hop;

pub type HttpClient = Client<HttpConnector, Body>;

const PROBE_USER_AGENT: &str = concat!("orchestrator-gateway-health-check/", env!("CARGO_PKG_VERSION"));

pub fn build_client(connect_timeout: Duration) -> HttpClient {
    let mut connector = HttpConnector::new();
    connector.set_connect_timeout(Some(connect_timeout));
    connector.set_nodelay(true);
    Client::builder(TokioExecutor::new()).build(connector)
}

#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("upstream timed out after {0:?}")]
    Timeout(Duration),

    #[error("upstream connection failed: {0}")]
    Connect(String),

    #[error("upstream protocol error: {0}")]
    Protocol(String),

    #[error("invalid upstream target: {0}")]
    InvalidTarget(String),
}

/// Request as it leaves the gateway.
#[derive(Debug)]
pub struct ForwardRequest {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Body,
    pub timeout: Duration,
    /// Buffer a 2xx body whose declared length fits, so it can be cached.
    pub buffer_limit: Option<usize>,
}

#[derive(Debug)]
pub enum ProxiedBody {
    Buffered(Bytes),
    Streaming(Body),
}

/// Backend response with hop-by-hop headers removed.
#[derive(Debug)]
pub struct ProxiedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: ProxiedBody,
}

impl ProxiedResponse {
    pub fn buffered(&self) -> Option<&Bytes> {
        match &self.body {
            ProxiedBody::Buffered(bytes) => Some(bytes),
            ProxiedBody::Streaming(_) => None,
        }
    }

    pub fn into_response(self) -> axum::response::Response {
        let body = match self.body {
            ProxiedBody::Buffered(bytes) => Body::from(bytes),
            ProxiedBody::Streaming(body) => body,
        };
        let mut response = axum::response::Response::new(body);
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

/// Probe outcome with the raw status for connectivity reports.
#[derive(Debug, Clone)]
pub struct ProbeReport {
    pub status_code: Option<u16>,
    pub result: ProbeResult,
}

#[derive(Clone)]
pub struct EndpointProxy {
    client: HttpClient,
}

impl EndpointProxy {
    pub fn new(client: HttpClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &HttpClient {
        &self.client
    }

    /// Send one request; headers must arrive and the body finish within `request.timeout`.
    pub async fn forward(&self, request: ForwardRequest) -> Result<ProxiedResponse, ProxyError> {
        let ForwardRequest {
            method,
            uri,
            mut headers,
            body,
            timeout,
            buffer_limit,
        } = request;

        strip_hop_by_hop(&mut headers);

        let mut outbound = Request::builder()
            .method(method)
            .uri(uri)
            .body(body)
            .map_err(|e| ProxyError::InvalidTarget(e.to_string()))?;
        *outbound.headers_mut() = headers;

        let deadline = time::Instant::now() + timeout;
        let response = time::timeout_at(deadline, self.client.request(outbound))
            .await
            .map_err(|_| ProxyError::Timeout(timeout))?
            .map_err(classify)?;

        let (mut parts, incoming) = response.into_parts();
        strip_hop_by_hop(&mut parts.headers);

        let buffer = buffer_limit.filter(|limit| {
            parts.status.is_success() && declared_length(&parts.headers).is_some_and(|length| length <= *limit)
        });
        let body = match buffer {
            Some(limit) => {
                let bytes = time::timeout_at(deadline, axum::body::to_bytes(Body::new(incoming), limit))
                    .await
                    .map_err(|_| ProxyError::Timeout(timeout))?
                    .map_err(|e| ProxyError::Protocol(format!("reading response body: {}", e)))?;
                ProxiedBody::Buffered(bytes)
            }
            None => ProxiedBody::Streaming(stream_until(incoming, deadline, timeout)),
        };

        Ok(ProxiedResponse {
            status: parts.status,
            headers: parts.headers,
            body,
        })
    }

    /// GET `url`; any 2xx within `timeout` is a success.
    pub async fn probe(&self, url: &str, timeout: Duration) -> ProbeReport {
        let start = Instant::now();
        let outcome = async {
            let uri: Uri = url
                .parse()
                .map_err(|e: axum::http::uri::InvalidUri| ProxyError::InvalidTarget(e.to_string()))?;
            let request = Request::builder()
                .method(Method::GET)
                .uri(uri)
                .header(header::USER_AGENT, HeaderValue::from_static(PROBE_USER_AGENT))
                .body(Body::empty())
                .map_err(|e| ProxyError::InvalidTarget(e.to_string()))?;
            self.client.request(request).await.map_err(classify)
        };

        let (status_code, error) = match time::timeout(timeout, outcome).await {
            Ok(Ok(response)) if response.status().is_success() => (Some(response.status().as_u16()), None),
            Ok(Ok(response)) => {
                let status = response.status();
                (Some(status.as_u16()), Some(format!("HTTP {}", status.as_u16())))
            }
            Ok(Err(e)) => (None, Some(e.to_string())),
            Err(_) => (None, Some(ProxyError::Timeout(timeout).to_string())),
        };

        ProbeReport {
            status_code,
            result: ProbeResult {
                success: error.is_none(),
                response_time_ms: start.elapsed().as_millis() as u64,
                error,
            },
        }
    }
}

fn declared_length(headers: &HeaderMap) -> Option<usize> {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
}

/// Pass the backend body through, failing the stream once `deadline` passes.
fn stream_until(incoming: Incoming, deadline: time::Instant, timeout: Duration) -> Body {
    let chunks = stream::unfold(Some(Body::new(incoming).into_data_stream()), move |state| async move {
        let mut data = state?;
        match time::timeout_at(deadline, data.next()).await {
            Ok(Some(chunk)) => Some((chunk.map_err(axum::BoxError::from), Some(data))),
            Ok(None) => None,
            Err(_) => {
                tracing::warn!(timeout = ?timeout, "Response body exceeded the endpoint timeout, aborting");
                Some((Err(axum::BoxError::from(ProxyError::Timeout(timeout))), None))
            }
        }
    });
    Body::from_stream(chunks)
}

fn classify(error: hyper_util::client::legacy::Error) -> ProxyError {
    let message = error_chain(&error);
    if error.is_connect() {
        ProxyError::Connect(message)
    } else {
        ProxyError::Protocol(message)
    }
}

fn error_chain(error: &dyn std::error::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
