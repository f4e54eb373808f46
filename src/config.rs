//! Configuration types for cluster-dns.
//!
//! [`Config`]/[`DnsConfig`] describe the process: where to listen, which
//! cluster domain to own. [`ClusterConfig`] is the live tunable object
//! delivered as snapshots by the configuration watcher and swapped in
//! atomically by the sync loop.

use serde::{Deserialize, Serialize};
#[cfg(feature = "federations")]
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};

use crate::error::DnsError;
#[cfg(feature = "federations")]
use crate::names;

/// Port appended to upstream nameservers that do not carry one.
pub const DEFAULT_UPSTREAM_PORT: u16 = 53;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// DNS server configuration.
    pub dns: DnsConfig,

    /// Telemetry configuration.
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// DNS server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DnsConfig {
    /// Address for the DNS server to listen on (UDP and TCP).
    pub listen_addr: SocketAddr,

    /// Cluster domain suffix all in-cluster names live under,
    /// e.g. "cluster.local.". A missing trailing dot is added.
    #[serde(default = "default_cluster_domain")]
    pub cluster_domain: String,

    /// TTL for answers in seconds.
    #[serde(default = "default_ttl")]
    pub ttl: u32,

    /// SOA record configuration.
    #[serde(default)]
    pub soa: SoaConfig,

    /// Resolver configuration file consulted when the upstream
    /// nameserver list is empty.
    #[serde(default = "default_resolv_conf")]
    pub resolv_conf: String,
}

impl DnsConfig {
    /// The cluster domain with its trailing dot guaranteed.
    pub fn domain(&self) -> String {
        let domain = self.cluster_domain.to_lowercase();
        if domain.ends_with('.') {
            domain
        } else {
            format!("{domain}.")
        }
    }
}

/// Telemetry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Log level filter (e.g., "info", "cluster_dns=debug,warn").
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Prometheus metrics exporter address.
    #[serde(default)]
    pub prometheus_addr: Option<SocketAddr>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            prometheus_addr: None,
        }
    }
}

/// SOA (Start of Authority) record configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoaConfig {
    /// Primary nameserver hostname.
    pub mname: String,

    /// Admin email in DNS format.
    pub rname: String,

    /// Refresh interval in seconds.
    #[serde(default = "default_refresh")]
    pub refresh: u32,

    /// Retry interval in seconds.
    #[serde(default = "default_retry")]
    pub retry: u32,

    /// Expire time in seconds.
    #[serde(default = "default_expire")]
    pub expire: u32,

    /// Minimum TTL in seconds.
    #[serde(default = "default_minimum")]
    pub minimum: u32,
}

impl Default for SoaConfig {
    fn default() -> Self {
        Self {
            mname: "ns.dns.cluster.local.".to_string(),
            rname: "hostmaster.cluster.local.".to_string(),
            refresh: default_refresh(),
            retry: default_retry(),
            expire: default_expire(),
            minimum: default_minimum(),
        }
    }
}

fn default_cluster_domain() -> String {
    "cluster.local.".to_string()
}

fn default_ttl() -> u32 {
    30
}

fn default_resolv_conf() -> String {
    "/etc/resolv.conf".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_refresh() -> u32 {
    28800
}

fn default_retry() -> u32 {
    7200
}

fn default_expire() -> u32 {
    604800
}

fn default_minimum() -> u32 {
    30
}

/// The live tunable configuration, replaced wholesale per snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Federation name to federation domain.
    #[cfg(feature = "federations")]
    #[serde(default)]
    pub federations: HashMap<String, String>,

    /// Upstream recursive resolvers, `host` or `host:port`.
    #[serde(default)]
    pub upstream_nameservers: Vec<String>,
}

impl ClusterConfig {
    /// Validate a snapshot. A failing snapshot is discarded and the
    /// current configuration retained.
    pub fn validate(&self) -> Result<(), DnsError> {
        #[cfg(feature = "federations")]
        for (name, domain) in &self.federations {
            if !names::is_dns_label(name) {
                return Err(DnsError::ConfigInvalid(format!(
                    "invalid federation name {name:?}"
                )));
            }
            if !is_domain(domain) {
                return Err(DnsError::ConfigInvalid(format!(
                    "invalid federation domain {domain:?} for {name:?}"
                )));
            }
        }
        for server in &self.upstream_nameservers {
            parse_nameserver(server)?;
        }
        Ok(())
    }

    /// The upstream list normalized to `host:port`, defaulting the port
    /// to 53. Call only on validated configurations.
    pub fn normalized_upstreams(&self) -> Vec<String> {
        self.upstream_nameservers
            .iter()
            .filter_map(|server| parse_nameserver(server).ok())
            .map(|addr| addr.to_string())
            .collect()
    }
}

fn parse_nameserver(server: &str) -> Result<SocketAddr, DnsError> {
    if let Ok(addr) = server.parse::<SocketAddr>() {
        if addr.port() == 0 {
            return Err(DnsError::ConfigInvalid(format!(
                "upstream nameserver {server:?} has port 0"
            )));
        }
        return Ok(addr);
    }
    if let Ok(ip) = server.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, DEFAULT_UPSTREAM_PORT));
    }
    Err(DnsError::ConfigInvalid(format!(
        "upstream nameserver {server:?} is not an IP or IP:port"
    )))
}

#[cfg(feature = "federations")]
fn is_domain(domain: &str) -> bool {
    let trimmed = domain.trim_end_matches('.');
    !trimmed.is_empty() && trimmed.split('.').all(names::is_dns_label)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_is_valid() {
        assert!(ClusterConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_non_ip_nameserver() {
        let cfg = ClusterConfig {
            upstream_nameservers: vec!["badNameserver".into()],
            ..Default::default()
        };
        assert!(matches!(cfg.validate(), Err(DnsError::ConfigInvalid(_))));
    }

    #[test]
    fn normalizes_missing_port_to_53() {
        let cfg = ClusterConfig {
            upstream_nameservers: vec!["192.0.2.123:10086".into(), "192.0.2.123".into()],
            ..Default::default()
        };
        assert!(cfg.validate().is_ok());
        assert_eq!(
            cfg.normalized_upstreams(),
            vec!["192.0.2.123:10086".to_string(), "192.0.2.123:53".to_string()]
        );
    }

    #[test]
    fn accepts_bracketed_ipv6_nameserver() {
        let cfg = ClusterConfig {
            upstream_nameservers: vec!["[2001:db8::1]:5353".into(), "2001:db8::2".into()],
            ..Default::default()
        };
        assert!(cfg.validate().is_ok());
        assert_eq!(
            cfg.normalized_upstreams(),
            vec!["[2001:db8::1]:5353".to_string(), "[2001:db8::2]:53".to_string()]
        );
    }

    #[cfg(feature = "federations")]
    #[test]
    fn validates_federation_entries() {
        let mut cfg = ClusterConfig::default();
        cfg.federations.insert("myfederation".into(), "example.com".into());
        assert!(cfg.validate().is_ok());

        cfg.federations.insert("Bad Name".into(), "example.com".into());
        assert!(matches!(cfg.validate(), Err(DnsError::ConfigInvalid(_))));
    }

    #[cfg(feature = "federations")]
    #[test]
    fn rejects_bad_federation_domain() {
        let mut cfg = ClusterConfig::default();
        cfg.federations.insert("fed".into(), "".into());
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn domain_gains_trailing_dot() {
        let cfg = DnsConfig {
            listen_addr: "127.0.0.1:5353".parse().unwrap(),
            cluster_domain: "cluster.local".into(),
            ttl: default_ttl(),
            soa: SoaConfig::default(),
            resolv_conf: default_resolv_conf(),
        };
        assert_eq!(cfg.domain(), "cluster.local.");
    }
}
