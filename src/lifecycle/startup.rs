//! Startup orchestration.
//!
//! # Responsibilities
//! - Initialize all subsystems in dependency order
//! - Register the configured endpoints
//! - Apply every reloaded configuration (watcher, SIGHUP, management API)
//!
//! # Design Decisions
//! - Fail fast: config errors at startup are fatal, at reload they are not
//! - One explicitly built `AppContext`, no globals
//! - Listener and health settings are read once; reloads only touch
//!   endpoints and breaker settings

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::config::{load_config, ConfigError, GatewayConfig};
use crate::health::HealthChecker;
use crate::http::proxy::{build_client, EndpointProxy};
use crate::registry::types::unix_millis;
use crate::registry::{EndpointRegistry, SyncResult};
use crate::resilience::CircuitBreakerManager;
use crate::routing::RequestRouter;

/// Outcome of configuration reloads, for `/config/status`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReloadStatus {
    pub reload_count: u64,
    pub last_reload_ms: Option<u64>,
    pub last_error: Option<String>,
    pub last_sync: Option<SyncResult>,
}

/// Owner of every gateway component.
pub struct AppContext {
    config: ArcSwap<GatewayConfig>,
    config_path: Option<PathBuf>,
    pub registry: Arc<EndpointRegistry>,
    pub breakers: Arc<CircuitBreakerManager>,
    pub router: Arc<RequestRouter>,
    pub health: Arc<HealthChecker>,
    reload_status: ArcSwap<ReloadStatus>,
    started_at: Instant,
}

impl AppContext {
    /// Wire the components and register the configured endpoints.
    pub fn build(config: GatewayConfig, config_path: Option<PathBuf>) -> Arc<Self> {
        let registry = Arc::new(EndpointRegistry::new(config.circuit_breaker.clone()));
        let breakers = Arc::new(CircuitBreakerManager::new(Arc::clone(&registry)));

        let client = build_client(Duration::from_secs(config.timeouts.connect_secs));
        let proxy = EndpointProxy::new(client);

        let router = Arc::new(RequestRouter::new(
            Arc::clone(&registry),
            Some(Arc::clone(&breakers)),
            proxy.clone(),
        ));
        let health = Arc::new(HealthChecker::new(
            Arc::clone(&registry),
            proxy,
            config.health_check.clone(),
        ));

        let initial = registry.sync_with_config(&config.endpoints);
        tracing::info!(
            endpoints = registry.len(),
            rejected = initial.errors.len(),
            "Configured endpoints registered"
        );

        Arc::new(Self {
            config: ArcSwap::from_pointee(config),
            config_path,
            registry,
            breakers,
            router,
            health,
            reload_status: ArcSwap::from_pointee(ReloadStatus {
                last_sync: Some(initial),
                ..Default::default()
            }),
            started_at: Instant::now(),
        })
    }

    pub fn config(&self) -> Arc<GatewayConfig> {
        self.config.load_full()
    }

    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    pub fn reload_status(&self) -> Arc<ReloadStatus> {
        self.reload_status.load_full()
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Apply a freshly loaded configuration.
    pub fn on_config_loaded(&self, config: GatewayConfig) -> SyncResult {
        let current = self.config.load();
        if current.listener != config.listener {
            tracing::warn!("Listener settings changed; restart required to apply");
        }
        if current.health_check != config.health_check {
            tracing::warn!("Health check settings changed; restart required to apply");
        }

        self.registry.set_breaker_settings(config.circuit_breaker.clone());
        let result = self.registry.sync_with_config(&config.endpoints);
        self.config.store(Arc::new(config));

        let sync = result.clone();
        self.reload_status.rcu(move |status| ReloadStatus {
            reload_count: status.reload_count + 1,
            last_reload_ms: Some(unix_millis()),
            last_error: None,
            last_sync: Some(sync.clone()),
        });

        tracing::info!(
            added = result.added.len(),
            updated = result.updated.len(),
            removed = result.removed.len(),
            "Configuration applied"
        );
        result
    }

    /// Re-read the config file and apply it. The current config stays on error.
    pub fn reload_from_disk(&self) -> Result<SyncResult, ConfigError> {
        let path = self.config_path.as_deref().ok_or(ConfigError::NoConfigFile)?;
        match load_config(path) {
            Ok(config) => Ok(self.on_config_loaded(config)),
            Err(e) => {
                self.record_reload_failure(&e);
                Err(e)
            }
        }
    }

    fn record_reload_failure(&self, error: &ConfigError) {
        let message = error.to_string();
        self.reload_status.rcu(move |status| ReloadStatus {
            last_error: Some(message.clone()),
            ..ReloadStatus::clone(status)
        });
    }

    /// Apply every config published on `updates` until shutdown.
    pub fn spawn_config_subscriber(
        self: &Arc<Self>,
        mut updates: mpsc::UnboundedReceiver<GatewayConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        let ctx = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    update = updates.recv() => match update {
                        Some(config) => {
                            ctx.on_config_loaded(config);
                        }
                        None => break,
                    },
                    _ = shutdown.recv() => break,
                }
            }
            tracing::debug!("Config subscriber stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EndpointConfig;
    use crate::registry::EndpointStatus;

    fn endpoint(name: &str) -> EndpointConfig {
        let mut config = EndpointConfig::new("http://127.0.0.1:9");
        config.name = Some(name.to_string());
        config
    }

    fn config(names: &[&str]) -> GatewayConfig {
        GatewayConfig {
            endpoints: names.iter().map(|n| endpoint(n)).collect(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn build_registers_configured_endpoints() {
        let ctx = AppContext::build(config(&["a", "b"]), None);
        assert_eq!(ctx.registry.len(), 2);
        assert_eq!(ctx.router.active_routes().len(), 2);
        assert_eq!(ctx.reload_status().reload_count, 0);
    }

    #[tokio::test]
    async fn reload_syncs_and_counts() {
        let ctx = AppContext::build(config(&["a", "b"]), None);
        let mut next = config(&["b", "c"]);
        next.circuit_breaker.failure_threshold = 9;

        let result = ctx.on_config_loaded(next);
        assert_eq!(result.added, vec!["c"]);
        assert_eq!(result.removed, vec!["a"]);
        assert_eq!(ctx.registry.breaker_settings().failure_threshold, 9);
        assert_eq!(ctx.config().circuit_breaker.failure_threshold, 9);

        let status = ctx.reload_status();
        assert_eq!(status.reload_count, 1);
        assert!(status.last_error.is_none());
    }

    #[tokio::test]
    async fn disabling_through_reload_changes_status() {
        let ctx = AppContext::build(config(&["a"]), None);
        let mut next = config(&["a"]);
        next.endpoints[0].disabled = true;
        ctx.on_config_loaded(next);
        assert_eq!(ctx.registry.get("a").unwrap().status, EndpointStatus::Disabled);
    }

    #[tokio::test]
    async fn reload_without_file_is_an_error() {
        let ctx = AppContext::build(GatewayConfig::default(), None);
        assert!(matches!(ctx.reload_from_disk(), Err(ConfigError::NoConfigFile)));
    }

    #[tokio::test]
    async fn failed_reload_keeps_current_config() {
        let ctx = AppContext::build(config(&["a"]), Some(PathBuf::from("/definitely/not/here.toml")));
        assert!(ctx.reload_from_disk().is_err());
        assert!(ctx.registry.contains("a"));

        let status = ctx.reload_status();
        assert_eq!(status.reload_count, 0);
        assert!(status.last_error.is_some());
    }

    #[tokio::test]
    async fn subscriber_applies_published_configs() {
        let ctx = AppContext::build(config(&["a"]), None);
        let (tx, rx) = mpsc::unbounded_channel();
        let (_stop_tx, stop_rx) = broadcast::channel(1);
        let handle = ctx.spawn_config_subscriber(rx, stop_rx);

        tx.send(config(&["z"])).unwrap();
        drop(tx);
        handle.await.unwrap();

        assert!(ctx.registry.contains("z"));
        assert!(!ctx.registry.contains("a"));
    }
}
