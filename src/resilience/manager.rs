//! Circuit breaker manager.
//!
//! Wraps outbound calls in the breaker owned by each registry entry.

use std::future::Future;
use std::sync::Arc;

use serde::Serialize;

use crate::observability::metrics;
use crate::registry::EndpointRegistry;
use crate::resilience::circuit_breaker::{CachedResponse, CircuitBreaker, CircuitSnapshot, CircuitState};
use crate::resilience::fallback::{build_fallback, FallbackResponse};

/// How a call result feeds the breaker.
pub trait CallOutcome {
    /// True when the backend misbehaved (e.g. answered 5xx).
    fn is_failure(&self) -> bool;

    /// Response worth replaying later through the cached fallback.
    fn cacheable(&self) -> Option<CachedResponse> {
        None
    }
}

/// Result of [`CircuitBreakerManager::execute`].
#[derive(Debug)]
pub enum BreakerOutcome<T> {
    Executed(T),
    ShortCircuited(FallbackResponse),
}

#[derive(Debug, Clone, Serialize)]
pub struct BreakerStats {
    pub endpoint_id: String,
    #[serde(flatten)]
    pub snapshot: CircuitSnapshot,
}

#[derive(Debug)]
pub struct CircuitBreakerManager {
    registry: Arc<EndpointRegistry>,
}

impl CircuitBreakerManager {
    pub fn new(registry: Arc<EndpointRegistry>) -> Self {
        Self { registry }
    }

    pub fn enabled(&self) -> bool {
        self.registry.breaker_settings().enabled
    }

    /// Run `call` under the endpoint's breaker, or short-circuit to its fallback.
    ///
    /// Transport errors count as failures and are returned unchanged. An id
    /// with no breaker (endpoint removed mid-flight) runs the call unguarded.
    pub async fn execute<F, Fut, T, E>(&self, id: &str, call: F) -> Result<BreakerOutcome<T>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        T: CallOutcome,
    {
        let Some(breaker) = self.registry.breaker(id) else {
            return call().await.map(BreakerOutcome::Executed);
        };

        let Some(permit) = breaker.try_acquire() else {
            return Ok(BreakerOutcome::ShortCircuited(short_circuit(id, &breaker)));
        };

        let result = call().await;
        match &result {
            Ok(outcome) if !outcome.is_failure() => {
                if let Some(cached) = outcome.cacheable() {
                    breaker.remember(cached);
                }
                permit.succeed();
            }
            _ => permit.fail(),
        }
        result.map(BreakerOutcome::Executed)
    }

    /// Reject up front when the circuit is open: the fallback to serve, counted
    /// as a rejection. `None` lets the call proceed to [`Self::execute`].
    pub fn reject_open(&self, id: &str) -> Option<FallbackResponse> {
        let breaker = self.registry.breaker(id)?;
        breaker.reject_if_open().then(|| short_circuit(id, &breaker))
    }

    /// Effective state, or `None` for an unknown endpoint.
    pub fn state(&self, id: &str) -> Option<CircuitState> {
        self.registry.breaker(id).map(|b| b.effective_state())
    }

    /// The response an open circuit would serve right now.
    pub fn fallback(&self, id: &str) -> Option<FallbackResponse> {
        let breaker = self.registry.breaker(id)?;
        let settings = breaker.settings();
        Some(build_fallback(id, &breaker, &settings))
    }

    pub fn reset(&self, id: &str) -> bool {
        match self.registry.breaker(id) {
            Some(breaker) => {
                breaker.reset();
                true
            }
            None => false,
        }
    }

    pub fn trip(&self, id: &str) -> bool {
        match self.registry.breaker(id) {
            Some(breaker) => {
                breaker.trip();
                true
            }
            None => false,
        }
    }

    pub fn stats(&self, id: &str) -> Option<BreakerStats> {
        self.registry.breaker(id).map(|b| BreakerStats {
            endpoint_id: id.to_string(),
            snapshot: b.snapshot(),
        })
    }

    pub fn all_stats(&self) -> Vec<BreakerStats> {
        self.registry
            .list(None, true)
            .into_iter()
            .map(|endpoint| BreakerStats {
                endpoint_id: endpoint.id,
                snapshot: endpoint.circuit_breaker,
            })
            .collect()
    }
}

fn short_circuit(id: &str, breaker: &CircuitBreaker) -> FallbackResponse {
    let settings = breaker.settings();
    let fallback = build_fallback(id, breaker, &settings);
    metrics::record_fallback(id, fallback.strategy.as_str());
    tracing::debug!(endpoint = %id, strategy = fallback.strategy.as_str(), "Circuit open, serving fallback");
    fallback
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CircuitBreakerConfig, EndpointConfig};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Status(u16);

    impl CallOutcome for Status {
        fn is_failure(&self) -> bool {
            self.0 >= 500
        }
    }

    fn manager(threshold: u32) -> CircuitBreakerManager {
        let registry = Arc::new(EndpointRegistry::new(CircuitBreakerConfig {
            failure_threshold: threshold,
            ..Default::default()
        }));
        let mut config = EndpointConfig::new("http://127.0.0.1:9");
        config.name = Some("svc".into());
        registry.register(config).unwrap();
        CircuitBreakerManager::new(registry)
    }

    #[tokio::test]
    async fn server_errors_trip_and_short_circuit() {
        let manager = manager(2);
        let calls = AtomicUsize::new(0);

        for _ in 0..2 {
            let outcome = manager
                .execute("svc", || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, ()>(Status(503))
                })
                .await
                .unwrap();
            assert!(matches!(outcome, BreakerOutcome::Executed(Status(503))));
        }
        assert_eq!(manager.state("svc"), Some(CircuitState::Open));

        let outcome = manager
            .execute("svc", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, ()>(Status(200))
            })
            .await
            .unwrap();
        assert!(matches!(outcome, BreakerOutcome::ShortCircuited(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 2, "open circuit must not call the backend");
    }

    #[tokio::test]
    async fn transport_errors_count_and_propagate() {
        let manager = manager(1);
        let result = manager
            .execute("svc", || async { Err::<Status, _>("connection refused") })
            .await;
        assert_eq!(result.err(), Some("connection refused"));
        assert_eq!(manager.state("svc"), Some(CircuitState::Open));
    }

    #[tokio::test]
    async fn client_errors_are_not_failures() {
        let manager = manager(1);
        manager
            .execute("svc", || async { Ok::<_, ()>(Status(404)) })
            .await
            .unwrap();
        assert_eq!(manager.state("svc"), Some(CircuitState::Closed));
    }

    #[tokio::test]
    async fn unknown_endpoint_runs_unguarded() {
        let manager = manager(1);
        let outcome = manager
            .execute("ghost", || async { Ok::<_, ()>(Status(500)) })
            .await
            .unwrap();
        assert!(matches!(outcome, BreakerOutcome::Executed(_)));
        assert!(manager.state("ghost").is_none());
    }

    #[test]
    fn reject_open_serves_fallback_and_counts() {
        let manager = manager(5);
        assert!(manager.reject_open("svc").is_none());

        manager.trip("svc");
        let fallback = manager.reject_open("svc").unwrap();
        assert_eq!(fallback.strategy, crate::config::FallbackStrategy::ErrorResponse);
        assert_eq!(manager.stats("svc").unwrap().snapshot.total_rejections, 1);
        assert!(manager.reject_open("ghost").is_none());
    }

    #[test]
    fn manual_trip_and_reset() {
        let manager = manager(5);
        assert!(manager.trip("svc"));
        assert_eq!(manager.state("svc"), Some(CircuitState::Open));
        assert!(manager.reset("svc"));
        assert_eq!(manager.stats("svc").unwrap().snapshot.state, CircuitState::Closed);
        assert!(!manager.reset("ghost"));
        assert_eq!(manager.all_stats().len(), 1);
    }
}
