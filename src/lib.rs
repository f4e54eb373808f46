//! cluster-dns - An authoritative DNS resolver for orchestrated clusters.
//!
//! This crate serves DNS records materialized from the live state of
//! services and endpoints in a cluster. External watchers push object
//! lifecycle events into the resolver; a reconciler turns them into a
//! hierarchical name tree plus reverse-lookup indexes; queries are
//! answered from that state with no I/O on the query path.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                         cluster-dns                            │
//! │                                                                │
//! │  ┌──────────────────┐     ┌───────────────────┐                │
//! │  │ Object watchers  │────▶│  DnsState         │                │
//! │  │ (svc/ep/node)    │     │  tree + indexes   │                │
//! │  └──────────────────┘     └─────────┬─────────┘                │
//! │  ┌──────────────────┐               │                          │
//! │  │ Config snapshots │──▶ sync ──────┤                          │
//! │  └──────────────────┘               ▼                          │
//! │                           ┌───────────────────┐                │
//! │                           │  Hickory DNS      │◀── UDP/TCP     │
//! │                           │  server           │      :53       │
//! │                           └───────────────────┘                │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Name shapes
//!
//! ```text
//! testservice.default.svc.cluster.local.          A/AAAA or CNAME
//! _http._tcp.testservice.default.svc.cluster.local.   SRV
//! foo.testservice.default.svc.cluster.local.      pod hostname A
//! 1-2-3-4.default.pod.cluster.local.              synthesized pod IP
//! 4.3.2.1.in-addr.arpa.                           PTR
//! ```
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! use cluster_dns::{DnsConfig, DnsServer, SoaConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = DnsConfig {
//!         listen_addr: "[::]:5353".parse().unwrap(),
//!         cluster_domain: "cluster.local.".to_string(),
//!         ttl: 30,
//!         soa: SoaConfig::default(),
//!         resolv_conf: "/etc/resolv.conf".to_string(),
//!     };
//!
//!     let shutdown = CancellationToken::new();
//!     let server = DnsServer::new(config);
//!     // hand server.state() to the object watchers and
//!     // server.config_sender() to the configuration watcher
//!     server.run(shutdown).await.unwrap();
//! }
//! ```

#![warn(missing_docs)]

pub mod authority;
pub mod config;
pub mod error;
pub mod metrics;
pub mod names;
pub mod object;
pub mod record;
pub mod server;
pub mod state;
pub mod sync;
pub mod telemetry;
pub mod treecache;

// Re-export main types
pub use config::{ClusterConfig, Config, DnsConfig, SoaConfig, TelemetryConfig};
pub use error::DnsError;
pub use record::DnsRecord;
pub use server::DnsServer;
pub use state::DnsState;
