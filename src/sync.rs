//! Background synchronization of the tunable configuration.
//!
//! The external configuration watcher pushes [`ClusterConfig`] snapshots
//! into a channel; the loop validates each one and swaps it in atomically
//! under the config lock. Snapshots that fail validation are logged and
//! dropped, leaving the current configuration untouched. The resolved
//! upstream-nameserver list is published on a watch channel for the DNS
//! front-end; when the configured list is empty it falls back to the
//! `nameserver` entries of the resolver configuration file.

use std::path::Path;

use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{ClusterConfig, DEFAULT_UPSTREAM_PORT};
use crate::state::DnsState;

/// Consumes configuration snapshots and applies them to the state.
pub struct ConfigSync {
    state: DnsState,
    resolv_conf: String,
    upstreams_tx: watch::Sender<Vec<String>>,
}

impl ConfigSync {
    /// Create a sync task feeding `state`. Returns the handle and the
    /// watch channel carrying the resolved upstream nameservers.
    pub fn new(state: DnsState, resolv_conf: &str) -> (Self, watch::Receiver<Vec<String>>) {
        let (upstreams_tx, upstreams_rx) = watch::channel(Vec::new());
        (
            Self {
                state,
                resolv_conf: resolv_conf.to_string(),
                upstreams_tx,
            },
            upstreams_rx,
        )
    }

    /// Run until the snapshot channel closes or shutdown is requested.
    pub async fn run(self, mut snapshots: mpsc::Receiver<ClusterConfig>, shutdown: CancellationToken) {
        info!("configuration sync started");
        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!("configuration sync shutting down");
                    return;
                }

                snapshot = snapshots.recv() => {
                    match snapshot {
                        Some(config) => self.handle_snapshot(config),
                        None => {
                            info!("configuration snapshot stream ended");
                            return;
                        }
                    }
                }
            }
        }
    }

    fn handle_snapshot(&self, config: ClusterConfig) {
        match self.state.apply_config(config) {
            Ok(()) => {
                let upstreams = self.resolved_upstreams();
                debug!(?upstreams, "configuration snapshot applied");
                // Send only fails with no receivers, which is fine: the
                // front-end may not care about upstreams.
                let _ = self.upstreams_tx.send(upstreams);
            }
            Err(e) => {
                warn!(error = %e, "dropping invalid configuration snapshot");
            }
        }
    }

    /// The upstream list of the current configuration, normalized to
    /// `host:port`; falls back to the resolver configuration file when
    /// the configured list is empty.
    fn resolved_upstreams(&self) -> Vec<String> {
        let config = self.state.config();
        if !config.upstream_nameservers.is_empty() {
            return config.normalized_upstreams();
        }
        read_resolv_conf_nameservers(Path::new(&self.resolv_conf))
    }
}

/// `nameserver` entries of a resolv.conf file, normalized to `host:port`.
fn read_resolv_conf_nameservers(path: &Path) -> Vec<String> {
    let contents = match std::fs::read(path) {
        Ok(contents) => contents,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "cannot read resolver configuration");
            return Vec::new();
        }
    };
    match resolv_conf::Config::parse(&contents) {
        Ok(parsed) => parsed
            .nameservers
            .iter()
            .map(|ip| std::net::SocketAddr::new(ip.into(), DEFAULT_UPSTREAM_PORT).to_string())
            .collect(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "cannot parse resolver configuration");
            Vec::new()
        }
    }
}
