//! Concurrent endpoint store.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::config::{validate_endpoint, CircuitBreakerConfig, EndpointConfig, HealthCheckConfig, ValidationError};
use crate::health::state::{self, HealthCounters};
use crate::registry::types::{
    unix_millis, EndpointStatus, HealthRecord, ProbeResult, RegisteredEndpoint, RegistryError,
    RegistryStats, SyncResult,
};
use crate::resilience::circuit_breaker::CircuitBreaker;

#[derive(Debug)]
struct EndpointEntry {
    config: EndpointConfig,
    registered_at_ms: u64,
    sequence: u64,
    status: EndpointStatus,
    consecutive_failures: u32,
    consecutive_successes: u32,
    last_health_check_ms: Option<u64>,
    last_response_time_ms: Option<u64>,
    last_error: Option<String>,
    request_failures: u32,
    total_requests: u64,
    total_failures: u64,
    last_failure_ms: Option<u64>,
    breaker: Arc<CircuitBreaker>,
}

impl EndpointEntry {
    fn snapshot(&self, id: &str) -> RegisteredEndpoint {
        RegisteredEndpoint {
            id: id.to_string(),
            config: self.config.clone(),
            registered_at_ms: self.registered_at_ms,
            status: self.status,
            consecutive_failures: self.consecutive_failures,
            consecutive_successes: self.consecutive_successes,
            last_health_check_ms: self.last_health_check_ms,
            last_response_time_ms: self.last_response_time_ms,
            last_error: self.last_error.clone(),
            request_failures: self.request_failures,
            total_requests: self.total_requests,
            total_failures: self.total_failures,
            last_failure_ms: self.last_failure_ms,
            circuit_breaker: self.breaker.snapshot(),
        }
    }
}

/// Health probe applied to an entry.
#[derive(Debug, Clone)]
pub struct ProbeApplied {
    pub record: HealthRecord,
    pub previous: EndpointStatus,
}

impl ProbeApplied {
    pub fn changed(&self) -> bool {
        self.previous != self.record.status
    }
}

/// Source of truth for endpoints and their runtime state.
///
/// Each endpoint owns exactly one circuit breaker, created on first
/// registration and dropped with the entry.
#[derive(Debug)]
pub struct EndpointRegistry {
    entries: DashMap<String, EndpointEntry>,
    generation: AtomicU64,
    sequence: AtomicU64,
    breaker_settings: Arc<ArcSwap<CircuitBreakerConfig>>,
}

impl Default for EndpointRegistry {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

impl EndpointRegistry {
    pub fn new(breaker_settings: CircuitBreakerConfig) -> Self {
        Self {
            entries: DashMap::new(),
            generation: AtomicU64::new(0),
            sequence: AtomicU64::new(0),
            breaker_settings: Arc::new(ArcSwap::from_pointee(breaker_settings)),
        }
    }

    /// Register or replace an endpoint.
    pub fn register(&self, config: EndpointConfig) -> Result<RegisteredEndpoint, RegistryError> {
        validate_endpoint(&config).map_err(configuration_error)?;
        let id = config.endpoint_id();

        let (snapshot, replaced) = match self.entries.entry(id.clone()) {
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                entry.status = EndpointStatus::initial(&config);
                entry.config = config;
                (entry.snapshot(&id), true)
            }
            Entry::Vacant(vacant) => {
                let entry = self.new_entry(&id, config);
                let snapshot = entry.snapshot(&id);
                vacant.insert(entry);
                (snapshot, false)
            }
        };
        self.bump_generation();

        tracing::info!(
            endpoint = %id,
            url = %snapshot.config.url,
            status = %snapshot.status,
            replaced,
            "Endpoint registered"
        );
        Ok(snapshot)
    }

    fn new_entry(&self, id: &str, config: EndpointConfig) -> EndpointEntry {
        EndpointEntry {
            status: EndpointStatus::initial(&config),
            config,
            registered_at_ms: unix_millis(),
            sequence: self.sequence.fetch_add(1, Ordering::Relaxed),
            consecutive_failures: 0,
            consecutive_successes: 0,
            last_health_check_ms: None,
            last_response_time_ms: None,
            last_error: None,
            request_failures: 0,
            total_requests: 0,
            total_failures: 0,
            last_failure_ms: None,
            breaker: Arc::new(CircuitBreaker::new(id, Arc::clone(&self.breaker_settings))),
        }
    }

    /// Remove an endpoint together with its breaker.
    ///
    /// In-flight requests keep their own handle and finish normally.
    pub fn unregister(&self, id: &str) -> bool {
        let removed = self.entries.remove(id).is_some();
        if removed {
            self.bump_generation();
            tracing::info!(endpoint = %id, "Endpoint unregistered");
        } else {
            tracing::warn!(endpoint = %id, "Attempted to unregister unknown endpoint");
        }
        removed
    }

    pub fn get(&self, id: &str) -> Option<RegisteredEndpoint> {
        self.entries.get(id).map(|entry| entry.snapshot(id))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// Snapshots ordered by registration time.
    pub fn list(&self, status: Option<EndpointStatus>, include_disabled: bool) -> Vec<RegisteredEndpoint> {
        let mut entries: Vec<(u64, u64, RegisteredEndpoint)> = self
            .entries
            .iter()
            .filter(|e| include_disabled || !e.config.disabled)
            .filter(|e| status.map_or(true, |s| e.status == s))
            .map(|e| (e.registered_at_ms, e.sequence, e.snapshot(e.key())))
            .collect();
        entries.sort_by_key(|(at, seq, _)| (*at, *seq));
        entries.into_iter().map(|(_, _, snapshot)| snapshot).collect()
    }

    pub fn ids(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.key().clone()).collect()
    }

    /// Set an endpoint's status directly.
    pub fn update_status(&self, id: &str, status: EndpointStatus) -> bool {
        let previous = match self.entries.get_mut(id) {
            Some(mut entry) => std::mem::replace(&mut entry.status, status),
            None => return false,
        };

        if previous != status {
            tracing::info!(endpoint = %id, from = %previous, to = %status, "Endpoint status changed");
            crate::observability::metrics::record_endpoint_health(id, status);
            if previous == EndpointStatus::Disabled || status == EndpointStatus::Disabled {
                self.bump_generation();
            }
        }
        true
    }

    /// Reconcile the registry with a full set of endpoint definitions.
    pub fn sync_with_config(&self, endpoints: &[EndpointConfig]) -> SyncResult {
        let mut result = SyncResult::default();
        let mut desired = HashSet::new();

        for config in endpoints {
            let id = config.endpoint_id();
            desired.insert(id.clone());

            if let Err(e) = validate_endpoint(config) {
                tracing::error!(endpoint = %id, error = %e, "Rejected endpoint during sync");
                result.errors.push(e.to_string());
                continue;
            }

            match self.entries.entry(id.clone()) {
                Entry::Occupied(mut occupied) => {
                    let entry = occupied.get_mut();
                    if entry.config != *config {
                        if entry.config.disabled != config.disabled {
                            entry.status = EndpointStatus::initial(config);
                        }
                        entry.config = config.clone();
                        result.updated.push(id);
                    }
                }
                Entry::Vacant(vacant) => {
                    vacant.insert(self.new_entry(&id, config.clone()));
                    result.added.push(id);
                }
            }
        }

        for id in self.ids() {
            if !desired.contains(&id) && self.entries.remove(&id).is_some() {
                result.removed.push(id);
            }
        }

        if !result.is_noop() {
            self.bump_generation();
        }

        tracing::info!(
            added = result.added.len(),
            updated = result.updated.len(),
            removed = result.removed.len(),
            errors = result.errors.len(),
            "Registry sync completed"
        );
        result
    }

    /// Passive success: a proxied call completed without a backend fault.
    pub fn record_success(&self, id: &str) -> bool {
        match self.entries.get_mut(id) {
            Some(mut entry) => {
                entry.total_requests += 1;
                entry.request_failures = 0;
                true
            }
            None => false,
        }
    }

    /// Passive failure: transport error or 5xx from the backend.
    pub fn record_failure(&self, id: &str) -> bool {
        match self.entries.get_mut(id) {
            Some(mut entry) => {
                entry.total_requests += 1;
                entry.total_failures += 1;
                entry.request_failures += 1;
                entry.last_failure_ms = Some(unix_millis());
                tracing::debug!(
                    endpoint = %id,
                    consecutive = entry.request_failures,
                    "Recorded request failure"
                );
                true
            }
            None => false,
        }
    }

    /// Apply one probe result through the health threshold state machine.
    pub fn apply_probe(
        &self,
        id: &str,
        probe: &ProbeResult,
        thresholds: &HealthCheckConfig,
    ) -> Option<ProbeApplied> {
        let applied = {
            let mut entry = self.entries.get_mut(id)?;
            let previous = entry.status;
            let next = state::apply(
                HealthCounters {
                    status: entry.status,
                    consecutive_failures: entry.consecutive_failures,
                    consecutive_successes: entry.consecutive_successes,
                },
                probe.success,
                thresholds,
            );
            entry.status = next.status;
            entry.consecutive_failures = next.consecutive_failures;
            entry.consecutive_successes = next.consecutive_successes;
            entry.last_health_check_ms = Some(unix_millis());
            entry.last_response_time_ms = Some(probe.response_time_ms);
            entry.last_error = probe.error.clone();

            ProbeApplied {
                record: entry.snapshot(id).health_record(),
                previous,
            }
        };

        if applied.changed() {
            tracing::info!(
                endpoint = %id,
                from = %applied.previous,
                to = %applied.record.status,
                "Endpoint health changed"
            );
        }
        crate::observability::metrics::record_endpoint_health(id, applied.record.status);
        Some(applied)
    }

    pub fn breaker(&self, id: &str) -> Option<Arc<CircuitBreaker>> {
        self.entries.get(id).map(|entry| Arc::clone(&entry.breaker))
    }

    pub fn breaker_settings(&self) -> Arc<CircuitBreakerConfig> {
        self.breaker_settings.load_full()
    }

    pub fn set_breaker_settings(&self, settings: CircuitBreakerConfig) {
        self.breaker_settings.store(Arc::new(settings));
    }

    pub fn stats(&self) -> RegistryStats {
        let mut stats = RegistryStats::default();
        for entry in self.entries.iter() {
            stats.total += 1;
            if entry.config.disabled {
                stats.disabled += 1;
                continue;
            }
            match entry.status {
                EndpointStatus::Active => stats.active += 1,
                EndpointStatus::Inactive => stats.inactive += 1,
                EndpointStatus::Disabled => stats.disabled += 1,
                EndpointStatus::Unhealthy => stats.unhealthy += 1,
            }
        }
        stats
    }

    /// Counter bumped on every structural change.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    fn bump_generation(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn configuration_error(error: ValidationError) -> RegistryError {
    match error {
        ValidationError::Endpoint { endpoint, reason } => RegistryError::Configuration { endpoint, reason },
        other => RegistryError::Configuration {
            endpoint: String::new(),
            reason: other.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::circuit_breaker::CircuitState;

    fn endpoint(name: &str, url: &str) -> EndpointConfig {
        let mut config = EndpointConfig::new(url);
        config.name = Some(name.to_string());
        config
    }

    #[test]
    fn register_and_get() {
        let registry = EndpointRegistry::default();
        let snapshot = registry.register(endpoint("users", "http://127.0.0.1:3001")).unwrap();
        assert_eq!(snapshot.id, "users");
        assert_eq!(snapshot.status, EndpointStatus::Active);
        assert_eq!(registry.get("users").unwrap().config.url, "http://127.0.0.1:3001");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn invalid_config_leaves_registry_unchanged() {
        let registry = EndpointRegistry::default();
        let generation = registry.generation();
        let err = registry.register(endpoint("bad name", "http://localhost")).unwrap_err();
        assert!(matches!(err, RegistryError::Configuration { .. }));
        assert!(registry.is_empty());
        assert_eq!(registry.generation(), generation);
    }

    #[test]
    fn reregister_preserves_history_and_breaker() {
        let registry = EndpointRegistry::default();
        let first = registry.register(endpoint("users", "http://127.0.0.1:3001")).unwrap();
        let breaker = registry.breaker("users").unwrap();
        breaker.trip();
        registry.update_status("users", EndpointStatus::Unhealthy);

        let second = registry.register(endpoint("users", "http://127.0.0.1:4001")).unwrap();
        assert_eq!(second.registered_at_ms, first.registered_at_ms);
        assert_eq!(second.status, EndpointStatus::Active);
        assert_eq!(second.config.url, "http://127.0.0.1:4001");
        assert_eq!(second.circuit_breaker.state, CircuitState::Open);
        assert!(Arc::ptr_eq(&breaker, &registry.breaker("users").unwrap()));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn disabled_config_registers_disabled() {
        let registry = EndpointRegistry::default();
        let mut config = endpoint("legacy", "http://127.0.0.1:3002");
        config.disabled = true;
        assert_eq!(registry.register(config).unwrap().status, EndpointStatus::Disabled);

        assert!(registry.list(None, false).is_empty());
        assert_eq!(registry.list(None, true).len(), 1);
        assert_eq!(registry.stats().disabled, 1);
    }

    #[test]
    fn unregister_drops_breaker() {
        let registry = EndpointRegistry::default();
        registry.register(endpoint("users", "http://127.0.0.1:3001")).unwrap();
        assert!(registry.unregister("users"));
        assert!(registry.breaker("users").is_none());
        assert!(!registry.unregister("users"));
    }

    #[test]
    fn list_orders_by_registration_and_filters_status() {
        let registry = EndpointRegistry::default();
        for name in ["c", "a", "b"] {
            registry.register(endpoint(name, "http://127.0.0.1:3000")).unwrap();
        }
        registry.update_status("a", EndpointStatus::Unhealthy);

        let ids: Vec<_> = registry.list(None, true).into_iter().map(|e| e.id).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);

        let unhealthy = registry.list(Some(EndpointStatus::Unhealthy), true);
        assert_eq!(unhealthy.len(), 1);
        assert_eq!(unhealthy[0].id, "a");
    }

    #[test]
    fn sync_adds_updates_removes_and_is_idempotent() {
        let registry = EndpointRegistry::default();
        registry.register(endpoint("old", "http://127.0.0.1:3000")).unwrap();
        registry.register(endpoint("keep", "http://127.0.0.1:3001")).unwrap();

        let desired = vec![
            endpoint("keep", "http://127.0.0.1:4001"),
            endpoint("new", "http://127.0.0.1:3002"),
        ];
        let result = registry.sync_with_config(&desired);
        assert_eq!(result.added, vec!["new"]);
        assert_eq!(result.updated, vec!["keep"]);
        assert_eq!(result.removed, vec!["old"]);
        assert!(result.errors.is_empty());

        let generation = registry.generation();
        let again = registry.sync_with_config(&desired);
        assert!(again.is_noop());
        assert_eq!(registry.generation(), generation);
    }

    #[test]
    fn sync_preserves_status_unless_disabled_flag_changes() {
        let registry = EndpointRegistry::default();
        registry.register(endpoint("svc", "http://127.0.0.1:3000")).unwrap();
        registry.update_status("svc", EndpointStatus::Unhealthy);

        let mut changed = endpoint("svc", "http://127.0.0.1:3000");
        changed.timeout_secs = 5;
        registry.sync_with_config(&[changed.clone()]);
        assert_eq!(registry.get("svc").unwrap().status, EndpointStatus::Unhealthy);

        changed.disabled = true;
        registry.sync_with_config(&[changed]);
        assert_eq!(registry.get("svc").unwrap().status, EndpointStatus::Disabled);
    }

    #[test]
    fn sync_keeps_endpoint_with_invalid_definition() {
        let registry = EndpointRegistry::default();
        registry.register(endpoint("svc", "http://127.0.0.1:3000")).unwrap();

        let mut broken = endpoint("svc", "http://127.0.0.1:3000");
        broken.timeout_secs = 0;
        let result = registry.sync_with_config(&[broken]);

        assert_eq!(result.errors.len(), 1);
        assert!(result.removed.is_empty());
        assert_eq!(registry.get("svc").unwrap().config.timeout_secs, 30);
    }

    #[test]
    fn probes_follow_thresholds() {
        let registry = EndpointRegistry::default();
        registry.register(endpoint("svc", "http://127.0.0.1:3000")).unwrap();
        let thresholds = HealthCheckConfig::default();
        let failure = ProbeResult {
            success: false,
            response_time_ms: 3,
            error: Some("connection refused".into()),
        };

        registry.apply_probe("svc", &failure, &thresholds);
        registry.apply_probe("svc", &failure, &thresholds);
        assert_eq!(registry.get("svc").unwrap().status, EndpointStatus::Active);
        let applied = registry.apply_probe("svc", &failure, &thresholds).unwrap();
        assert!(applied.changed());
        assert_eq!(applied.record.status, EndpointStatus::Unhealthy);
        assert_eq!(applied.record.error.as_deref(), Some("connection refused"));

        let success = ProbeResult {
            success: true,
            response_time_ms: 1,
            error: None,
        };
        registry.apply_probe("svc", &success, &thresholds);
        assert_eq!(registry.get("svc").unwrap().status, EndpointStatus::Unhealthy);
        let applied = registry.apply_probe("svc", &success, &thresholds).unwrap();
        assert_eq!(applied.record.status, EndpointStatus::Active);
        assert_eq!(applied.record.consecutive_failures, 0);
    }

    #[test]
    fn passive_counters() {
        let registry = EndpointRegistry::default();
        registry.register(endpoint("svc", "http://127.0.0.1:3000")).unwrap();
        registry.record_failure("svc");
        registry.record_failure("svc");
        let snapshot = registry.get("svc").unwrap();
        assert_eq!(snapshot.request_failures, 2);
        assert!(snapshot.last_failure_ms.is_some());

        registry.record_success("svc");
        let snapshot = registry.get("svc").unwrap();
        assert_eq!(snapshot.request_failures, 0);
        assert_eq!(snapshot.total_requests, 3);
        assert_eq!(snapshot.total_failures, 2);
        assert!(!registry.record_success("missing"));
    }
}
