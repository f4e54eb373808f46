//! DNS server setup and lifecycle management.

use hickory_proto::rr::{LowerName, Name};
use hickory_server::authority::{AuthorityObject, Catalog};
use hickory_server::ServerFuture;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, UdpSocket};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::authority::ClusterAuthority;
use crate::config::{ClusterConfig, DnsConfig};
use crate::error::DnsError;
use crate::state::DnsState;
use crate::sync::ConfigSync;

/// Interval for emitting state metrics.
const METRICS_INTERVAL: Duration = Duration::from_secs(10);

/// Queue depth of the configuration snapshot channel.
const CONFIG_CHANNEL_DEPTH: usize = 8;

/// Periodically emit state metrics.
async fn metrics_loop(state: DnsState, shutdown: CancellationToken) {
    let mut interval = tokio::time::interval(METRICS_INTERVAL);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                state.emit_metrics();
                debug!(
                    services = state.services_count(),
                    endpoints = state.endpoints_count(),
                    reverse_entries = state.reverse_entries_count(),
                    "emitted state metrics"
                );
            }
            _ = shutdown.cancelled() => {
                debug!("metrics loop shutting down");
                return;
            }
        }
    }
}

/// Authoritative DNS server over the materialized cluster state.
///
/// External watchers deliver object events through the sinks on
/// [`DnsState`] (see [`DnsServer::state`]) and configuration snapshots
/// through [`DnsServer::config_sender`].
pub struct DnsServer {
    config: DnsConfig,
    state: DnsState,
    config_tx: mpsc::Sender<ClusterConfig>,
    config_rx: Option<mpsc::Receiver<ClusterConfig>>,
    config_sync: Option<ConfigSync>,
    upstreams_rx: watch::Receiver<Vec<String>>,
}

impl DnsServer {
    /// Create a new DNS server with the given configuration.
    pub fn new(config: DnsConfig) -> Self {
        let state = DnsState::new(&config.domain());
        let (config_tx, config_rx) = mpsc::channel(CONFIG_CHANNEL_DEPTH);
        let (config_sync, upstreams_rx) = ConfigSync::new(state.clone(), &config.resolv_conf);

        Self {
            config,
            state,
            config_tx,
            config_rx: Some(config_rx),
            config_sync: Some(config_sync),
            upstreams_rx,
        }
    }

    /// The shared resolver state; watchers call its event sinks.
    pub fn state(&self) -> &DnsState {
        &self.state
    }

    /// Sender for configuration snapshots.
    pub fn config_sender(&self) -> mpsc::Sender<ClusterConfig> {
        self.config_tx.clone()
    }

    /// Watch channel carrying the resolved upstream nameservers, for a
    /// forwarding front-end.
    pub fn upstream_nameservers(&self) -> watch::Receiver<Vec<String>> {
        self.upstreams_rx.clone()
    }

    /// Run the DNS server until the token is cancelled.
    pub async fn run(mut self, shutdown: CancellationToken) -> Result<(), DnsError> {
        info!(
            listen_addr = %self.config.listen_addr,
            cluster_domain = %self.config.domain(),
            "starting cluster-dns server"
        );

        // Start the configuration sync loop.
        let (config_sync, config_rx) = match (self.config_sync.take(), self.config_rx.take()) {
            (Some(sync), Some(rx)) => (sync, rx),
            _ => return Err(DnsError::Io(std::io::Error::other("server already ran"))),
        };
        let sync_shutdown = shutdown.clone();
        let sync_handle = tokio::spawn(async move {
            config_sync.run(config_rx, sync_shutdown).await;
        });

        // Create authority and catalog. The same authority also serves
        // the reverse zones, so PTR queries route to it.
        let authority = ClusterAuthority::new(self.config.clone(), self.state.clone())?;

        let mut catalog = Catalog::new();
        let authority: Arc<dyn AuthorityObject> = Arc::new(authority);
        catalog.upsert(authority.origin().clone(), vec![authority.clone()]);
        for reverse_zone in ["in-addr.arpa.", "ip6.arpa."] {
            let origin: LowerName = Name::from_ascii(reverse_zone)?.into();
            catalog.upsert(origin, vec![authority.clone()]);
        }

        let mut server = ServerFuture::new(catalog);

        // Bind UDP.
        let udp_socket = UdpSocket::bind(self.config.listen_addr).await?;
        info!(addr = %self.config.listen_addr, "DNS UDP listening");
        server.register_socket(udp_socket);

        // Bind TCP.
        let tcp_listener = TcpListener::bind(self.config.listen_addr).await?;
        info!(addr = %self.config.listen_addr, "DNS TCP listening");
        server.register_listener(tcp_listener, Duration::from_secs(30));

        info!(cluster_domain = %self.config.domain(), "DNS server ready to serve queries");

        // Start metrics loop.
        let metrics_state = self.state.clone();
        let metrics_shutdown = shutdown.clone();
        let metrics_handle = tokio::spawn(async move {
            metrics_loop(metrics_state, metrics_shutdown).await;
        });

        self.state.emit_metrics();

        // Run the server until shutdown.
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("DNS server shutdown requested");
            }
            result = server.block_until_done() => {
                if let Err(e) = result {
                    error!(error = %e, "DNS server error");
                }
            }
        }

        let _ = metrics_handle.await;

        info!("waiting for configuration sync to stop");
        let _ = sync_handle.await;

        info!("DNS server stopped");
        Ok(())
    }
}
