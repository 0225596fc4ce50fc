//! Active health checking.
//!
//! # Responsibilities
//! - Periodically probe every enabled endpoint
//! - Feed results through the threshold state machine in the registry
//! - Answer on-demand checks and health queries for the management API

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::stream::{self, StreamExt};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use url::Url;

use crate::config::{EndpointConfig, HealthCheckConfig};
use crate::http::proxy::EndpointProxy;
use crate::registry::{EndpointRegistry, EndpointStatus, HealthRecord, RegisteredEndpoint};

#[derive(Debug, thiserror::Error)]
pub enum HealthError {
    #[error("endpoint '{0}' not found")]
    EndpointNotFound(String),
}

/// Aggregate view for `/health/summary`.
#[derive(Debug, Clone, Serialize)]
pub struct HealthSummary {
    pub total_endpoints: usize,
    pub healthy_endpoints: usize,
    pub unhealthy_endpoints: usize,
    pub health_percentage: f64,
    pub average_response_time_ms: Option<f64>,
    pub last_check_ms: Option<u64>,
    pub running: bool,
    pub config: HealthCheckConfig,
}

/// URL probed for an endpoint: the override path joined to the base URL,
/// otherwise the base URL itself.
pub fn health_url(config: &EndpointConfig) -> Result<Url, url::ParseError> {
    let base = Url::parse(&config.url)?;
    match &config.health_check_path {
        Some(path) => base.join(path),
        None => Ok(base),
    }
}

/// Round timer. A round that overruns skips the ticks it missed instead of
/// firing them back to back.
fn probe_interval(period: Duration) -> time::Interval {
    let mut ticker = time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker
}

type LoopHandle = (broadcast::Sender<()>, JoinHandle<()>);

pub struct HealthChecker {
    registry: Arc<EndpointRegistry>,
    proxy: EndpointProxy,
    config: HealthCheckConfig,
    task: Mutex<Option<LoopHandle>>,
}

impl HealthChecker {
    pub fn new(registry: Arc<EndpointRegistry>, proxy: EndpointProxy, config: HealthCheckConfig) -> Self {
        Self {
            registry,
            proxy,
            config,
            task: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &HealthCheckConfig {
        &self.config
    }

    /// Spawn the periodic probe loop. No-op if disabled or already running.
    pub fn start(self: &Arc<Self>) {
        if !self.config.enabled {
            tracing::info!("Active health checks disabled");
            return;
        }

        let mut task = self.task.lock().unwrap_or_else(|p| p.into_inner());
        if task.as_ref().is_some_and(|(_, handle)| !handle.is_finished()) {
            return;
        }

        let (stop_tx, mut stop_rx) = broadcast::channel(1);
        let checker = Arc::clone(self);
        let handle = tokio::spawn(async move {
            tracing::info!(
                interval_secs = checker.config.interval_secs,
                timeout_secs = checker.config.timeout_secs,
                "Health checker starting"
            );

            let mut ticker = probe_interval(Duration::from_secs(checker.config.interval_secs));

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        // Shutdown is only observed between rounds.
                        checker.check_all().await;
                    }
                    _ = stop_rx.recv() => {
                        tracing::info!("Health checker received shutdown signal, exiting loop");
                        break;
                    }
                }
            }
        });

        *task = Some((stop_tx, handle));
    }

    /// Stop the loop, waiting up to `shutdown_grace_secs` for in-flight probes.
    pub async fn stop(&self) {
        let taken = self.task.lock().unwrap_or_else(|p| p.into_inner()).take();
        let Some((stop_tx, mut handle)) = taken else {
            return;
        };

        let _ = stop_tx.send(());
        let grace = Duration::from_secs(self.config.shutdown_grace_secs);
        if time::timeout(grace, &mut handle).await.is_err() {
            tracing::warn!(grace_secs = self.config.shutdown_grace_secs, "Health checker did not stop in time, aborting");
            handle.abort();
        }
        tracing::info!("Health checker stopped");
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .as_ref()
            .is_some_and(|(_, handle)| !handle.is_finished())
    }

    /// Probe every non-disabled endpoint once, with bounded concurrency.
    pub async fn check_all(&self) {
        let targets: Vec<RegisteredEndpoint> = self
            .registry
            .list(None, false)
            .into_iter()
            .filter(|e| e.status != EndpointStatus::Disabled)
            .collect();

        if targets.is_empty() {
            return;
        }

        let checked = stream::iter(targets)
            .map(|endpoint| async move { self.probe_endpoint(&endpoint).await })
            .buffer_unordered(self.config.max_concurrency.max(1))
            .filter_map(|record| async move { record })
            .collect::<Vec<_>>()
            .await;

        tracing::debug!(checked = checked.len(), "Health check round complete");
    }

    /// Probe one endpoint right now and apply the result.
    pub async fn check_now(&self, id: &str) -> Result<HealthRecord, HealthError> {
        let endpoint = self
            .registry
            .get(id)
            .ok_or_else(|| HealthError::EndpointNotFound(id.to_string()))?;
        self.probe_endpoint(&endpoint)
            .await
            .ok_or_else(|| HealthError::EndpointNotFound(id.to_string()))
    }

    async fn probe_endpoint(&self, endpoint: &RegisteredEndpoint) -> Option<HealthRecord> {
        let timeout = Duration::from_secs(self.config.timeout_secs);
        let result = match health_url(&endpoint.config) {
            Ok(url) => self.proxy.probe(url.as_str(), timeout).await.result,
            Err(e) => crate::registry::ProbeResult {
                success: false,
                response_time_ms: 0,
                error: Some(format!("invalid health url: {}", e)),
            },
        };

        if !result.success {
            tracing::warn!(
                endpoint = %endpoint.id,
                error = result.error.as_deref().unwrap_or("unknown"),
                "Health check failed"
            );
        }

        // Endpoint may have been removed while the probe was in flight.
        self.registry
            .apply_probe(&endpoint.id, &result, &self.config)
            .map(|applied| applied.record)
    }

    pub fn records(&self) -> Vec<HealthRecord> {
        self.registry
            .list(None, true)
            .iter()
            .map(RegisteredEndpoint::health_record)
            .collect()
    }

    pub fn record(&self, id: &str) -> Option<HealthRecord> {
        self.registry.get(id).map(|e| e.health_record())
    }

    pub fn unhealthy(&self) -> Vec<HealthRecord> {
        self.registry
            .list(Some(EndpointStatus::Unhealthy), true)
            .iter()
            .map(RegisteredEndpoint::health_record)
            .collect()
    }

    pub fn summary(&self) -> HealthSummary {
        let records = self.records();
        let total = records.len();
        let healthy = records.iter().filter(|r| r.status == EndpointStatus::Active).count();
        let unhealthy = records.iter().filter(|r| r.status == EndpointStatus::Unhealthy).count();

        let times: Vec<u64> = records.iter().filter_map(|r| r.response_time_ms).collect();
        let average = (!times.is_empty()).then(|| times.iter().sum::<u64>() as f64 / times.len() as f64);

        HealthSummary {
            total_endpoints: total,
            healthy_endpoints: healthy,
            unhealthy_endpoints: unhealthy,
            health_percentage: if total == 0 {
                0.0
            } else {
                healthy as f64 / total as f64 * 100.0
            },
            average_response_time_ms: average,
            last_check_ms: records.iter().filter_map(|r| r.last_check_ms).max(),
            running: self.is_running(),
            config: self.config.clone(),
        }
    }
}
