//! Configuration file watcher for hot reload.
//!
//! # Responsibilities
//! - Watch the gateway's TOML file for writes
//! - Re-run the full loader (parse + validate) on each change
//! - Hand every config that validates to the reload subscriber
//!
//! # Design Decisions
//! - Publishing is fire-and-forget over an unbounded channel; the notify
//!   callback thread never blocks on the async side
//! - A file that fails to load is logged and dropped, so the running config stays
//! - Editors often write in several steps; each step that validates is published
//!   and the subscriber's registry sync converges on the last one
//!
//! The receiving half is drained by `AppContext::spawn_config_subscriber`,
//! which syncs the registry and swaps breaker settings per update.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::load_config;
use crate::config::schema::GatewayConfig;

/// Publishes each valid version of the config file to one subscriber.
pub struct ConfigWatcher {
    path: PathBuf,
    update_tx: mpsc::UnboundedSender<GatewayConfig>,
}

impl ConfigWatcher {
    /// Returns the watcher and the stream of validated configs.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<GatewayConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();
        let watcher = Self {
            path: path.to_path_buf(),
            update_tx,
        };
        (watcher, update_rx)
    }

    /// Start watching. Dropping the returned handle stops the watch.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let Self { path, update_tx } = self;
        let watched = path.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if event.kind.is_modify() || event.kind.is_create() => {
                    publish(&watched, &update_tx);
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = ?e, "Config watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&path, RecursiveMode::NonRecursive)?;
        tracing::info!(path = %path.display(), "Config watcher started");
        Ok(watcher)
    }
}

fn publish(path: &Path, updates: &mpsc::UnboundedSender<GatewayConfig>) {
    match load_config(path) {
        Ok(config) => {
            tracing::info!(
                path = %path.display(),
                endpoints = config.endpoints.len(),
                "Config file changed, publishing update"
            );
            if updates.send(config).is_err() {
                tracing::debug!("Config subscriber gone, dropping update");
            }
        }
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "Config change rejected, keeping current configuration");
        }
    }
}
