//! The leaf value stored in the name tree.

use std::hash::{DefaultHasher, Hash, Hasher};

use serde::{Deserialize, Serialize};

/// Default SRV priority when a record does not carry one.
pub const DEFAULT_PRIORITY: u16 = 10;

/// Default SRV weight when a record does not carry one.
pub const DEFAULT_WEIGHT: u16 = 10;

/// A materialized DNS record.
///
/// `host` is either an IP literal (A/AAAA answers) or an FQDN target
/// (CNAME and SRV answers). `name` is the FQDN the record was materialized
/// at; the front-end uses it as the synthesized SRV target for IP-hosted
/// records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsRecord {
    /// IP literal or FQDN target.
    pub host: String,
    /// Port, zero when not applicable.
    pub port: u16,
    /// SRV priority.
    pub priority: u16,
    /// SRV weight.
    pub weight: u16,
    /// FQDN this record lives at.
    pub name: String,
}

impl DnsRecord {
    /// Create a record with default priority and weight.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            priority: DEFAULT_PRIORITY,
            weight: DEFAULT_WEIGHT,
            name: String::new(),
        }
    }

    /// Set the FQDN this record is materialized at.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Stable content label for `(host, port)`, rendered as lowercase hex.
    ///
    /// Used as the leaf sub-key in the tree, and as the synthesized name
    /// segment for headless endpoints without a hostname. `DefaultHasher::new()`
    /// uses fixed keys, so labels are stable across processes.
    pub fn label(&self) -> String {
        record_label(&self.host, self.port)
    }

    /// True if `host` is an IP literal rather than an FQDN target.
    pub fn is_ip(&self) -> bool {
        self.host.parse::<std::net::IpAddr>().is_ok()
    }
}

/// Content label for a `(host, port)` pair. See [`DnsRecord::label`].
pub fn record_label(host: &str, port: u16) -> String {
    let mut hasher = DefaultHasher::new();
    host.hash(&mut hasher);
    port.hash(&mut hasher);
    format!("{:x}", hasher.finish() as u32)
}
