//! Circuit breaker for backend protection.
//!
//! # States
//! - Closed: normal operation, requests pass through
//! - Open: backend assumed down, requests fail fast
//! - Half-Open: testing if backend recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: consecutive failures >= failure_threshold
//! Open → Half-Open: first request after reset_timeout
//! Half-Open → Closed: half_open_max_calls successes
//! Half-Open → Open: any failure (timer restarts)
//! ```
//!
//! # Design Decisions
//! - Per-endpoint circuit breaker (not global)
//! - Fail fast in Open state (no waiting for timeout)
//! - Every transition bumps an epoch; outcomes of calls admitted under an
//!   older epoch are ignored
//! - State lives behind a short synchronous lock, never held across I/O

use std::sync::{Arc, Mutex, MutexGuard};

use arc_swap::ArcSwap;
use axum::body::Bytes;
use axum::http::{HeaderMap, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::config::CircuitBreakerConfig;
use crate::observability::metrics;
use crate::registry::types::unix_millis;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Serializable view of a breaker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CircuitSnapshot {
    pub state: CircuitState,
    pub failure_count: u32,
    pub half_open_calls: u32,
    pub half_open_successes: u32,
    pub state_changed_at_ms: u64,
    pub last_failure_ms: Option<u64>,
    pub last_success_ms: Option<u64>,
    pub total_calls: u64,
    pub total_failures: u64,
    pub total_rejections: u64,
}

/// Last successful response of an endpoint, replayed by `cached_response`.
#[derive(Debug, Clone)]
pub struct CachedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub stored_at_ms: u64,
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    failure_count: u32,
    opened_at: Option<Instant>,
    state_changed_at_ms: u64,
    half_open_calls: u32,
    half_open_successes: u32,
    epoch: u64,
    last_failure_ms: Option<u64>,
    last_success_ms: Option<u64>,
    total_calls: u64,
    total_failures: u64,
    total_rejections: u64,
    cached: Option<CachedResponse>,
}

#[derive(Debug, Clone, Copy)]
struct Transition {
    from: CircuitState,
    to: CircuitState,
}

impl BreakerState {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            opened_at: None,
            state_changed_at_ms: unix_millis(),
            half_open_calls: 0,
            half_open_successes: 0,
            epoch: 0,
            last_failure_ms: None,
            last_success_ms: None,
            total_calls: 0,
            total_failures: 0,
            total_rejections: 0,
            cached: None,
        }
    }

    fn transition(&mut self, to: CircuitState) -> Transition {
        let from = self.state;
        self.state = to;
        self.epoch += 1;
        self.state_changed_at_ms = unix_millis();
        self.half_open_calls = 0;
        self.half_open_successes = 0;
        match to {
            CircuitState::Closed => {
                self.failure_count = 0;
                self.opened_at = None;
            }
            CircuitState::Open => self.opened_at = Some(Instant::now()),
            CircuitState::HalfOpen => {}
        }
        Transition { from, to }
    }

    fn open_expired(&self, config: &CircuitBreakerConfig) -> bool {
        self.state == CircuitState::Open
            && self
                .opened_at
                .map_or(true, |at| at.elapsed() >= config.reset_timeout())
    }
}

/// Per-endpoint circuit breaker.
#[derive(Debug)]
pub struct CircuitBreaker {
    endpoint_id: String,
    settings: Arc<ArcSwap<CircuitBreakerConfig>>,
    inner: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(endpoint_id: impl Into<String>, settings: Arc<ArcSwap<CircuitBreakerConfig>>) -> Self {
        Self {
            endpoint_id: endpoint_id.into(),
            settings,
            inner: Mutex::new(BreakerState::new()),
        }
    }

    pub fn endpoint_id(&self) -> &str {
        &self.endpoint_id
    }

    pub fn settings(&self) -> Arc<CircuitBreakerConfig> {
        self.settings.load_full()
    }

    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Ask to send one call through the breaker.
    ///
    /// Returns `None` when the call must be short-circuited.
    pub fn try_acquire(self: &Arc<Self>) -> Option<CallPermit> {
        let settings = self.settings.load();
        let (permit, transition) = {
            let mut s = self.lock();
            let transition = if s.open_expired(&settings) {
                Some(s.transition(CircuitState::HalfOpen))
            } else {
                None
            };

            let state = s.state;
            let admitted = match state {
                CircuitState::Closed => true,
                CircuitState::HalfOpen if s.half_open_calls < settings.half_open_max_calls => {
                    s.half_open_calls += 1;
                    true
                }
                _ => false,
            };

            let permit = if admitted {
                s.total_calls += 1;
                Some(CallPermit {
                    breaker: Arc::clone(self),
                    epoch: s.epoch,
                    half_open: s.state == CircuitState::HalfOpen,
                    settled: false,
                })
            } else {
                s.total_rejections += 1;
                None
            };
            (permit, transition)
        };

        if let Some(t) = transition {
            self.announce(t);
        }
        permit
    }

    fn on_success(&self, epoch: u64) {
        let settings = self.settings.load();
        let transition = {
            let mut s = self.lock();
            s.last_success_ms = Some(unix_millis());
            if s.epoch != epoch {
                return;
            }
            let state = s.state;
            match state {
                CircuitState::Closed => {
                    s.failure_count = 0;
                    None
                }
                CircuitState::HalfOpen => {
                    s.half_open_successes += 1;
                    (s.half_open_successes >= settings.half_open_max_calls)
                        .then(|| s.transition(CircuitState::Closed))
                }
                CircuitState::Open => None,
            }
        };

        if let Some(t) = transition {
            self.announce(t);
        }
    }

    fn on_failure(&self, epoch: u64) {
        let settings = self.settings.load();
        let transition = {
            let mut s = self.lock();
            s.total_failures += 1;
            s.last_failure_ms = Some(unix_millis());
            if s.epoch != epoch {
                return;
            }
            let state = s.state;
            match state {
                CircuitState::Closed => {
                    s.failure_count += 1;
                    (s.failure_count >= settings.failure_threshold)
                        .then(|| s.transition(CircuitState::Open))
                }
                CircuitState::HalfOpen => {
                    s.failure_count += 1;
                    Some(s.transition(CircuitState::Open))
                }
                CircuitState::Open => None,
            }
        };

        if let Some(t) = transition {
            self.announce(t);
        }
    }

    fn release_half_open(&self, epoch: u64) {
        let mut s = self.lock();
        if s.epoch == epoch && s.state == CircuitState::HalfOpen && s.half_open_calls > 0 {
            s.half_open_calls -= 1;
        }
    }

    /// Force the circuit closed and clear its failure count.
    pub fn reset(&self) {
        let t = self.lock().transition(CircuitState::Closed);
        tracing::info!(endpoint = %self.endpoint_id, from = %t.from, "Circuit breaker reset");
        self.announce(t);
    }

    /// Force the circuit open, restarting the reset timer.
    pub fn trip(&self) {
        let t = self.lock().transition(CircuitState::Open);
        tracing::warn!(endpoint = %self.endpoint_id, from = %t.from, "Circuit breaker tripped manually");
        self.announce(t);
    }

    /// Count a rejection when the circuit is open with its reset timeout still running.
    pub fn reject_if_open(&self) -> bool {
        let settings = self.settings.load();
        let mut s = self.lock();
        let open = s.state == CircuitState::Open && !s.open_expired(&settings);
        if open {
            s.total_rejections += 1;
        }
        open
    }

    /// Current state as callers would observe it: an expired open circuit
    /// reports half-open even before the next request moves it there.
    pub fn effective_state(&self) -> CircuitState {
        let settings = self.settings.load();
        let s = self.lock();
        if s.open_expired(&settings) {
            CircuitState::HalfOpen
        } else {
            s.state
        }
    }

    pub fn snapshot(&self) -> CircuitSnapshot {
        let settings = self.settings.load();
        let s = self.lock();
        CircuitSnapshot {
            state: if s.open_expired(&settings) {
                CircuitState::HalfOpen
            } else {
                s.state
            },
            failure_count: s.failure_count,
            half_open_calls: s.half_open_calls,
            half_open_successes: s.half_open_successes,
            state_changed_at_ms: s.state_changed_at_ms,
            last_failure_ms: s.last_failure_ms,
            last_success_ms: s.last_success_ms,
            total_calls: s.total_calls,
            total_failures: s.total_failures,
            total_rejections: s.total_rejections,
        }
    }

    /// Remember a successful response for the cached fallback.
    ///
    /// Bodies above `cache_max_bytes` are not kept.
    pub fn remember(&self, response: CachedResponse) {
        if response.body.len() > self.settings.load().cache_max_bytes {
            return;
        }
        self.lock().cached = Some(response);
    }

    pub fn cached(&self) -> Option<CachedResponse> {
        self.lock().cached.clone()
    }

    fn announce(&self, t: Transition) {
        if t.from == t.to {
            return;
        }
        match t.to {
            CircuitState::Open => {
                tracing::warn!(endpoint = %self.endpoint_id, from = %t.from, "Circuit breaker opened")
            }
            _ => tracing::info!(
                endpoint = %self.endpoint_id,
                from = %t.from,
                to = %t.to,
                "Circuit breaker state changed"
            ),
        }
        metrics::record_circuit_transition(&self.endpoint_id, t.from.as_str(), t.to.as_str());
    }
}

/// Admission ticket for one call.
///
/// Settle it with [`CallPermit::succeed`] or [`CallPermit::fail`]; a permit
/// dropped unsettled (cancelled request) gives its half-open slot back.
#[must_use]
#[derive(Debug)]
pub struct CallPermit {
    breaker: Arc<CircuitBreaker>,
    epoch: u64,
    half_open: bool,
    settled: bool,
}

impl CallPermit {
    pub fn succeed(mut self) {
        self.settled = true;
        self.breaker.on_success(self.epoch);
    }

    pub fn fail(mut self) {
        self.settled = true;
        self.breaker.on_failure(self.epoch);
    }
}

impl Drop for CallPermit {
    fn drop(&mut self) {
        if !self.settled && self.half_open {
            self.breaker.release_half_open(self.epoch);
        }
    }
}
