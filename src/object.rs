//! Cluster object snapshots delivered by the external watchers.
//!
//! Only the fields the resolver consumes are modeled. Watchers hand over
//! immutable snapshots per event; the reconciler never writes back.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::DnsError;

/// Cluster-IP literal marking a headless service.
pub const CLUSTER_IP_NONE: &str = "None";

/// Node label carrying the topology zone.
pub const ZONE_LABEL: &str = "topology.kubernetes.io/zone";

/// Node label carrying the topology region.
pub const REGION_LABEL: &str = "topology.kubernetes.io/region";

/// Namespaced object identity, the key of the object stores.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    /// Namespace the object lives in.
    pub namespace: String,
    /// Object name.
    pub name: String,
}

impl ObjectKey {
    /// Key for a namespaced name.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// One port of a service spec.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServicePort {
    /// Port name; empty for unnamed ports (which get no SRV record).
    #[serde(default)]
    pub name: String,
    /// Port number.
    pub port: u16,
    /// Protocol, e.g. `TCP` or `UDP`.
    #[serde(default)]
    pub protocol: String,
}

/// A service object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    /// Service name.
    pub name: String,
    /// Namespace.
    pub namespace: String,
    /// Declared type, e.g. `ClusterIP` or `ExternalName`; empty means
    /// `ClusterIP`.
    #[serde(default, rename = "type")]
    pub service_type: String,
    /// Single assigned cluster IP, or `None` for headless services.
    #[serde(default)]
    pub cluster_ip: String,
    /// Ordered assigned cluster IPs for dual-stack services.
    #[serde(default)]
    pub cluster_ips: Vec<String>,
    /// CNAME target for ExternalName services.
    #[serde(default)]
    pub external_name: String,
    /// Service ports.
    #[serde(default)]
    pub ports: Vec<ServicePort>,
}

/// The record shape a service materializes into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceKind {
    /// One or more A/AAAA leaves at the service FQDN.
    ClusterIp,
    /// Endpoint-expanded leaves under the service FQDN.
    Headless,
    /// A single CNAME leaf at the service FQDN.
    ExternalName,
}

impl Service {
    /// Store key.
    pub fn key(&self) -> ObjectKey {
        ObjectKey::new(&self.namespace, &self.name)
    }

    /// Classify the record shape from `type` and the cluster-IP fields.
    /// Ambiguous shapes (an ExternalName service without a target, a
    /// cluster-IP service without any IP) are rejected as malformed.
    pub fn kind(&self) -> Result<ServiceKind, DnsError> {
        if self.service_type == "ExternalName" {
            if self.external_name.is_empty() {
                return Err(DnsError::Malformed(format!(
                    "service {} is ExternalName without a target",
                    self.key()
                )));
            }
            return Ok(ServiceKind::ExternalName);
        }
        if self.cluster_ip == CLUSTER_IP_NONE {
            return Ok(ServiceKind::Headless);
        }
        if self.cluster_ips().is_empty() {
            return Err(DnsError::Malformed(format!(
                "service {} has neither a cluster IP nor \"None\"",
                self.key()
            )));
        }
        Ok(ServiceKind::ClusterIp)
    }

    /// The ordered cluster-IP list: `clusterIPs[]` when non-empty,
    /// otherwise the single `clusterIP`.
    pub fn cluster_ips(&self) -> Vec<String> {
        if !self.cluster_ips.is_empty() {
            return self.cluster_ips.clone();
        }
        if self.cluster_ip.is_empty() || self.cluster_ip == CLUSTER_IP_NONE {
            return Vec::new();
        }
        vec![self.cluster_ip.clone()]
    }

    /// Fields whose change forces a full re-materialization.
    pub fn record_fingerprint(&self) -> (String, Vec<String>, String, Vec<ServicePort>) {
        (
            self.service_type.clone(),
            self.cluster_ips(),
            self.external_name.clone(),
            self.ports.clone(),
        )
    }
}

/// One address of an endpoint subset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointAddress {
    /// Endpoint IP literal.
    pub ip: String,
    /// Pod hostname, when the endpoint declares one.
    #[serde(default)]
    pub hostname: String,
}

/// One port of an endpoint subset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointPort {
    /// Port name; empty for unnamed ports.
    #[serde(default)]
    pub name: String,
    /// Port number.
    pub port: u16,
    /// Protocol, e.g. `TCP`.
    #[serde(default)]
    pub protocol: String,
}

/// A group of addresses sharing ports and readiness.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointSubset {
    /// Ready addresses.
    #[serde(default)]
    pub addresses: Vec<EndpointAddress>,
    /// Ports served by every address of the subset.
    #[serde(default)]
    pub ports: Vec<EndpointPort>,
}

/// An endpoints object, named after its owning service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoints {
    /// Owning service name.
    pub name: String,
    /// Namespace.
    pub namespace: String,
    /// Address/port groups.
    #[serde(default)]
    pub subsets: Vec<EndpointSubset>,
}

impl Endpoints {
    /// Store key (shared with the owning service).
    pub fn key(&self) -> ObjectKey {
        ObjectKey::new(&self.namespace, &self.name)
    }

    /// True if any subset carries at least one address.
    pub fn has_addresses(&self) -> bool {
        self.subsets.iter().any(|s| !s.addresses.is_empty())
    }
}

/// A cluster node; only the topology labels are consumed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// Node name.
    pub name: String,
    /// Node labels.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl Node {
    /// The `(zone, region)` topology labels, when both are present.
    pub fn zone_and_region(&self) -> Option<(&str, &str)> {
        match (self.labels.get(ZONE_LABEL), self.labels.get(REGION_LABEL)) {
            (Some(zone), Some(region)) if !zone.is_empty() && !region.is_empty() => {
                Some((zone, region))
            }
            _ => None,
        }
    }
}
