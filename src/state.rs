//! In-memory resolver state reconciled from watcher events.
//!
//! One write region (a single readers-writer lock) covers the name tree,
//! the reverse index, and the cluster-IP index, so every reconciler
//! handler is atomic from a reader's perspective. The live tunable
//! configuration sits behind its own lock so query paths can read
//! federation mappings without blocking reconciliation. The two locks are
//! never held together.
//!
//! The service, endpoints, and node stores mirror the watcher caches:
//! each sink records the object snapshot first, then materializes derived
//! state, so the services and endpoints streams converge in either
//! arrival order.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::ClusterConfig;
use crate::error::DnsError;
use crate::metrics::{self, EventOp, EventOutcome, ObjectKind, QueryResult, Timer};
use crate::names;
use crate::object::{Endpoints, Node, ObjectKey, Service, ServiceKind};
use crate::record::DnsRecord;
use crate::treecache::TreeCache;

/// Thread-safe resolver state. Clones share the same underlying state.
#[derive(Clone)]
pub struct DnsState {
    domain: String,
    domain_segments: Vec<String>,
    inner: Arc<Inner>,
}

struct Inner {
    /// Tree + indexes, mutated together under one write region.
    data: RwLock<DataPlane>,
    /// Live tunable configuration, replaced atomically by the sync loop.
    config: RwLock<ClusterConfig>,
    services: RwLock<HashMap<ObjectKey, Service>>,
    endpoints: RwLock<HashMap<ObjectKey, Endpoints>>,
    nodes: RwLock<HashMap<String, Node>>,
}

#[derive(Default)]
struct DataPlane {
    cache: TreeCache,
    /// Canonical IP literal to the record answering its PTR query.
    reverse: HashMap<String, DnsRecord>,
    /// Canonical cluster IP to the owning service.
    cluster_ips: HashMap<String, Service>,
    /// Incremented per write region; the SOA serial.
    serial: u32,
}

/// A service subtree plus the index updates belonging to it, built
/// outside the lock and swapped in as one write region.
struct Materialization {
    subtree: TreeCache,
    reverse: Vec<(String, DnsRecord)>,
    cluster_ips: Vec<(String, Service)>,
}

impl DnsState {
    /// Create an empty resolver owning `domain` (e.g. "cluster.local.").
    pub fn new(domain: &str) -> Self {
        let domain = {
            let lower = domain.to_lowercase();
            if lower.ends_with('.') {
                lower
            } else {
                format!("{lower}.")
            }
        };
        let domain_segments = names::segments(&domain);

        Self {
            domain,
            domain_segments,
            inner: Arc::new(Inner {
                data: RwLock::new(DataPlane::default()),
                config: RwLock::new(ClusterConfig::default()),
                services: RwLock::new(HashMap::new()),
                endpoints: RwLock::new(HashMap::new()),
                nodes: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// The cluster domain suffix, dot-terminated.
    pub fn domain(&self) -> &str {
        &self.domain
    }

    // ---------------------------------------------------------------
    // Event sinks
    // ---------------------------------------------------------------

    /// A service appeared.
    pub fn on_service_add(&self, service: Service) {
        let kind = match service.kind() {
            Ok(kind) => kind,
            Err(e) => {
                warn!(service = %service.key(), error = %e, "rejecting service");
                metrics::record_event(ObjectKind::Service, EventOp::Add, EventOutcome::Rejected);
                return;
            }
        };
        debug!(service = %service.key(), ?kind, "service added");
        self.inner
            .services
            .write()
            .insert(service.key(), service.clone());
        self.materialize_service(&service, kind);
        metrics::record_event(ObjectKind::Service, EventOp::Add, EventOutcome::Applied);
    }

    /// A service changed. The delta is coarse: any change to the fields
    /// that shape records removes the old materialization and re-adds the
    /// new one. Headless services are always re-materialized since their
    /// answers also depend on the endpoints store.
    pub fn on_service_update(&self, old: Service, new: Service) {
        let kind = match new.kind() {
            Ok(kind) => kind,
            Err(e) => {
                warn!(service = %new.key(), error = %e, "rejecting service update");
                metrics::record_event(ObjectKind::Service, EventOp::Update, EventOutcome::Rejected);
                return;
            }
        };

        let renamed = old.key() != new.key();
        {
            let mut services = self.inner.services.write();
            if renamed {
                services.remove(&old.key());
            }
            services.insert(new.key(), new.clone());
        }

        let reshaped = old.record_fingerprint() != new.record_fingerprint();
        if !renamed && !reshaped && kind != ServiceKind::Headless {
            metrics::record_event(ObjectKind::Service, EventOp::Update, EventOutcome::Skipped);
            return;
        }

        debug!(service = %new.key(), renamed, reshaped, "service updated");
        self.remove_materialization(&old);
        self.materialize_service(&new, kind);
        metrics::record_event(ObjectKind::Service, EventOp::Update, EventOutcome::Applied);
    }

    /// A service was deleted: its subtree, reverse entries, and
    /// cluster-IP index entries go with it.
    pub fn on_service_delete(&self, service: Service) {
        debug!(service = %service.key(), "service deleted");
        self.inner.services.write().remove(&service.key());
        self.remove_materialization(&service);
        metrics::record_event(ObjectKind::Service, EventOp::Delete, EventOutcome::Applied);
    }

    /// An endpoints object appeared. Only headless services materialize
    /// endpoints; for everything else the snapshot is retained so a later
    /// headless service add can consult it.
    pub fn on_endpoint_add(&self, endpoints: Endpoints) {
        let prev = self
            .inner
            .endpoints
            .write()
            .insert(endpoints.key(), endpoints.clone());
        let outcome = self.reconcile_endpoints(&endpoints, prev.as_ref());
        metrics::record_event(ObjectKind::Endpoints, EventOp::Add, outcome);
    }

    /// An endpoints object changed. Reverse entries for addresses that
    /// vanished are purged in the same write region that installs the new
    /// materialization.
    pub fn on_endpoint_update(&self, old: Endpoints, new: Endpoints) {
        self.inner.endpoints.write().insert(new.key(), new.clone());
        let outcome = self.reconcile_endpoints(&new, Some(&old));
        metrics::record_event(ObjectKind::Endpoints, EventOp::Update, outcome);
    }

    /// An endpoints object was deleted: the endpoint-derived subtree and
    /// the hostname reverse entries are removed.
    pub fn on_endpoint_delete(&self, endpoints: Endpoints) {
        let key = endpoints.key();
        self.inner.endpoints.write().remove(&key);

        let service = self.inner.services.read().get(&key).cloned();
        let headless = matches!(service.as_ref().map(Service::kind), Some(Ok(ServiceKind::Headless)));
        if !headless {
            metrics::record_event(ObjectKind::Endpoints, EventOp::Delete, EventOutcome::Skipped);
            return;
        }

        debug!(endpoints = %key, "endpoints deleted");
        let path = self.service_path(&key.namespace, &key.name);
        let mut data = self.inner.data.write();
        data.cache.delete_path(&as_refs(&path));
        remove_hostname_reverse_entries(&mut data, &endpoints);
        data.serial = data.serial.wrapping_add(1);
        metrics::record_event(ObjectKind::Endpoints, EventOp::Delete, EventOutcome::Applied);
    }

    /// A node appeared.
    pub fn on_node_add(&self, node: Node) {
        self.inner.nodes.write().insert(node.name.clone(), node);
        metrics::record_event(ObjectKind::Node, EventOp::Add, EventOutcome::Applied);
    }

    /// A node changed.
    pub fn on_node_update(&self, old: Node, new: Node) {
        let mut nodes = self.inner.nodes.write();
        if old.name != new.name {
            nodes.remove(&old.name);
        }
        nodes.insert(new.name.clone(), new);
        metrics::record_event(ObjectKind::Node, EventOp::Update, EventOutcome::Applied);
    }

    /// A node was deleted.
    pub fn on_node_delete(&self, node: Node) {
        self.inner.nodes.write().remove(&node.name);
        metrics::record_event(ObjectKind::Node, EventOp::Delete, EventOutcome::Applied);
    }

    // ---------------------------------------------------------------
    // Reconciliation
    // ---------------------------------------------------------------

    fn materialize_service(&self, service: &Service, kind: ServiceKind) {
        match kind {
            ServiceKind::ClusterIp => self.install(service, cluster_ip_materialization(service, &self.domain)),
            ServiceKind::ExternalName => self.install(service, external_name_materialization(service, &self.domain)),
            ServiceKind::Headless => {
                // Endpoints may have arrived first; consult the store.
                let stored = self.inner.endpoints.read().get(&service.key()).cloned();
                if let Some(endpoints) = stored {
                    self.install_endpoints(service, &endpoints, None);
                }
            }
        }
    }

    fn reconcile_endpoints(&self, endpoints: &Endpoints, old: Option<&Endpoints>) -> EventOutcome {
        let service = self.inner.services.read().get(&endpoints.key()).cloned();
        match service {
            Some(service) if matches!(service.kind(), Ok(ServiceKind::Headless)) => {
                debug!(endpoints = %endpoints.key(), "materializing headless endpoints");
                self.install_endpoints(&service, endpoints, old);
                EventOutcome::Applied
            }
            // Unknown or non-headless owner: the snapshot stays in the
            // store until a headless service consults it.
            _ => EventOutcome::Skipped,
        }
    }

    /// Swap in a service materialization as one write region. An empty
    /// subtree deletes the path instead, so no dangling inner nodes
    /// remain.
    fn install(&self, service: &Service, m: Materialization) {
        let path = self.service_path(&service.namespace, &service.name);
        let mut data = self.inner.data.write();
        if m.subtree.is_empty() {
            data.cache.delete_path(&as_refs(&path));
        } else {
            data.cache.set_sub_cache(&as_refs(&path), m.subtree);
        }
        for (ip, record) in m.reverse {
            data.reverse.insert(ip, record);
        }
        for (ip, owner) in m.cluster_ips {
            data.cluster_ips.insert(ip, owner);
        }
        data.serial = data.serial.wrapping_add(1);
    }

    fn install_endpoints(&self, service: &Service, endpoints: &Endpoints, old: Option<&Endpoints>) {
        let m = headless_materialization(service, endpoints, &self.domain);
        let path = self.service_path(&service.namespace, &service.name);
        let mut data = self.inner.data.write();
        if let Some(old) = old {
            remove_hostname_reverse_entries(&mut data, old);
        }
        if m.subtree.is_empty() {
            data.cache.delete_path(&as_refs(&path));
        } else {
            data.cache.set_sub_cache(&as_refs(&path), m.subtree);
        }
        for (ip, record) in m.reverse {
            data.reverse.insert(ip, record);
        }
        data.serial = data.serial.wrapping_add(1);
    }

    /// Remove everything a service materialized: subtree, cluster-IP
    /// reverse entries and index entries, and (for headless services) the
    /// reverse entries derived from its stored endpoints.
    fn remove_materialization(&self, service: &Service) {
        let endpoints = match service.kind() {
            Ok(ServiceKind::Headless) => self.inner.endpoints.read().get(&service.key()).cloned(),
            _ => None,
        };

        let path = self.service_path(&service.namespace, &service.name);
        let mut data = self.inner.data.write();
        data.cache.delete_path(&as_refs(&path));
        for ip in service.cluster_ips() {
            if let Some(canonical) = names::canonical_ip(&ip) {
                data.reverse.remove(&canonical);
                data.cluster_ips.remove(&canonical);
            }
        }
        if let Some(endpoints) = endpoints {
            remove_hostname_reverse_entries(&mut data, &endpoints);
        }
        data.serial = data.serial.wrapping_add(1);
    }

    fn service_path(&self, namespace: &str, name: &str) -> Vec<String> {
        let mut path: Vec<String> = self.domain_segments.iter().rev().cloned().collect();
        path.push(names::SERVICE_SUBDOMAIN.to_string());
        path.push(namespace.to_lowercase());
        path.push(name.to_lowercase());
        path
    }

    // ---------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------

    /// Forward lookup. With `exact`, the name must identify leaves
    /// directly: the last segment as a leaf sub-key (endpoint names), or
    /// failing that the leaf set at the full name (SRV names, whose
    /// records are keyed by port name or endpoint label). Otherwise the
    /// wildcard walk applies and pod-IP and federation shapes are
    /// recognized.
    pub fn records(&self, name: &str, exact: bool) -> Result<Vec<DnsRecord>, DnsError> {
        let timer = Timer::start();
        let result = self.records_inner(name, exact);
        match &result {
            Ok(_) => metrics::record_query("records", QueryResult::Success, timer.elapsed()),
            Err(e) if e.is_not_found() => {
                metrics::record_query("records", QueryResult::NxDomain, timer.elapsed())
            }
            Err(_) => metrics::record_query("records", QueryResult::Malformed, timer.elapsed()),
        }
        result
    }

    fn records_inner(&self, name: &str, exact: bool) -> Result<Vec<DnsRecord>, DnsError> {
        if name.trim_end_matches('.').is_empty() {
            return Err(DnsError::Malformed("empty query name".to_string()));
        }
        let segments = names::segments(name);

        if !exact && self.is_pod_ip_query(&segments) {
            let ip = names::decode_dashed_ip(&segments[0])?;
            debug!(name, ip = %ip, "synthesized pod-IP answer");
            let fqdn = fqdn_of(&segments);
            return Ok(vec![DnsRecord::new(ip.to_string(), 0).named(fqdn)]);
        }

        #[cfg(feature = "federations")]
        if !exact {
            if let Some(domain) = self.federation_domain(&segments) {
                return self.federation_records(&segments, &domain);
            }
        }

        let path: Vec<String> = segments.iter().rev().cloned().collect();
        let records = self.records_for_path(&path, exact);
        if records.is_empty() {
            return Err(DnsError::NotFound(name.to_string()));
        }
        Ok(records)
    }

    fn records_for_path(&self, path: &[String], exact: bool) -> Vec<DnsRecord> {
        let data = self.inner.data.read();
        if exact {
            let Some((subkey, rest)) = path.split_last() else {
                return Vec::new();
            };
            if let Some(record) = data.cache.get_entry(&as_refs(rest), subkey) {
                return vec![record.clone()];
            }
            // SRV leaves are not keyed by a name segment; they are the
            // entries of the node the full name walks to.
            data.cache.get_entries(&as_refs(path))
        } else {
            data.cache.get_values_for_path_with_wildcards(&as_refs(path))
        }
    }

    /// Reverse lookup for an `in-addr.arpa.`/`ip6.arpa.` name.
    pub fn reverse_record(&self, name: &str) -> Result<DnsRecord, DnsError> {
        let timer = Timer::start();
        let ip = match names::extract_ip(name) {
            Ok(ip) => ip,
            Err(e) => {
                metrics::record_query("reverse", QueryResult::Malformed, timer.elapsed());
                return Err(e);
            }
        };
        let record = self.inner.data.read().reverse.get(&ip).cloned();
        match record {
            Some(record) => {
                metrics::record_query("reverse", QueryResult::Success, timer.elapsed());
                Ok(record)
            }
            None => {
                metrics::record_query("reverse", QueryResult::NxDomain, timer.elapsed());
                Err(DnsError::NotFound(name.to_string()))
            }
        }
    }

    /// `<dashed-ip>.<ns>.pod.<domain>` — answered synthetically, no tree
    /// state exists for these.
    fn is_pod_ip_query(&self, segments: &[String]) -> bool {
        segments.len() == self.domain_segments.len() + 3
            && segments[2] == names::POD_SUBDOMAIN
            && segments[3..] == self.domain_segments[..]
    }

    // ---------------------------------------------------------------
    // Federation
    // ---------------------------------------------------------------

    /// The mapped federation domain, when the second-last label ahead of
    /// `svc.<domain>` is a known federation name.
    #[cfg(feature = "federations")]
    fn federation_domain(&self, segments: &[String]) -> Option<String> {
        if segments.len() != self.domain_segments.len() + 4
            || segments[3] != names::SERVICE_SUBDOMAIN
            || segments[4..] != self.domain_segments[..]
        {
            return None;
        }
        if !segments[..3].iter().all(|s| names::is_dns_label(s)) {
            return None;
        }
        self.inner.config.read().federations.get(&segments[2]).cloned()
    }

    /// Resolve `<svc>.<ns>.<fed>.svc.<domain>`: a CNAME to the local
    /// service when it exists with valid addresses, otherwise a CNAME
    /// into the federation domain, zoned by the node topology labels.
    #[cfg(feature = "federations")]
    fn federation_records(
        &self,
        segments: &[String],
        federation_domain: &str,
    ) -> Result<Vec<DnsRecord>, DnsError> {
        let mut local_segments = segments.to_vec();
        local_segments.remove(2);
        let local_path: Vec<String> = local_segments.iter().rev().cloned().collect();

        // A headless endpoint record proves the local service by itself;
        // a cluster-IP record only counts when the owning endpoints
        // object has addresses.
        let (local_records, any_headless) = {
            let data = self.inner.data.read();
            let records = data.cache.get_values_for_path_with_wildcards(&as_refs(&local_path));
            let any_headless = records.iter().any(|r| {
                names::canonical_ip(&r.host)
                    .map(|ip| !data.cluster_ips.contains_key(&ip))
                    .unwrap_or(false)
            });
            (records, any_headless)
        };

        let local_valid = !local_records.is_empty()
            && (any_headless || {
                let key = ObjectKey::new(&local_segments[1], &local_segments[0]);
                self.inner
                    .endpoints
                    .read()
                    .get(&key)
                    .map(Endpoints::has_addresses)
                    .unwrap_or(false)
            });

        if local_valid {
            let local_fqdn = fqdn_of(&local_segments);
            debug!(name = %fqdn_of(segments), local = %local_fqdn, "federation query answered locally");
            return Ok(vec![DnsRecord::new(local_fqdn.clone(), 0).named(local_fqdn)]);
        }

        let Some((zone, region)) = self.cluster_zone_and_region() else {
            debug!(name = %fqdn_of(segments), "no node with topology labels, suppressing federation answer");
            return Err(DnsError::NotFound(fqdn_of(segments)));
        };
        let target = names::federation_fqdn(
            &segments[0],
            &segments[1],
            &segments[2],
            &zone,
            &region,
            federation_domain.trim_end_matches('.'),
        );
        debug!(name = %fqdn_of(segments), target = %target, "federation fallback answer");
        Ok(vec![DnsRecord::new(target, 0).named(fqdn_of(segments))])
    }

    /// Zone and region labels of the first node carrying both.
    #[cfg(feature = "federations")]
    fn cluster_zone_and_region(&self) -> Option<(String, String)> {
        let nodes = self.inner.nodes.read();
        nodes.values().find_map(|node| {
            node.zone_and_region()
                .map(|(zone, region)| (zone.to_string(), region.to_string()))
        })
    }

    // ---------------------------------------------------------------
    // Configuration
    // ---------------------------------------------------------------

    /// Validate and atomically install a configuration snapshot. An
    /// invalid snapshot leaves the current configuration untouched.
    pub fn apply_config(&self, config: ClusterConfig) -> Result<(), DnsError> {
        if let Err(e) = config.validate() {
            metrics::record_config_apply(false);
            return Err(e);
        }
        *self.inner.config.write() = config;
        metrics::record_config_apply(true);
        Ok(())
    }

    /// Snapshot of the live configuration.
    pub fn config(&self) -> ClusterConfig {
        self.inner.config.read().clone()
    }

    // ---------------------------------------------------------------
    // Introspection
    // ---------------------------------------------------------------

    /// Number of known services.
    pub fn services_count(&self) -> usize {
        self.inner.services.read().len()
    }

    /// Number of known endpoints objects.
    pub fn endpoints_count(&self) -> usize {
        self.inner.endpoints.read().len()
    }

    /// Number of reverse-index entries.
    pub fn reverse_entries_count(&self) -> usize {
        self.inner.data.read().reverse.len()
    }

    /// Current change serial, used as the SOA serial.
    pub fn serial(&self) -> u32 {
        self.inner.data.read().serial
    }

    /// Emit current state gauges.
    pub fn emit_metrics(&self) {
        metrics::record_state_counts(
            self.services_count(),
            self.endpoints_count(),
            self.reverse_entries_count(),
        );
    }

    /// JSON dump of the name tree, for diagnostics.
    pub fn serialize_tree(&self) -> String {
        self.inner.data.read().cache.serialize()
    }
}

fn as_refs(path: &[String]) -> Vec<&str> {
    path.iter().map(String::as_str).collect()
}

fn fqdn_of(segments: &[String]) -> String {
    let mut name = segments.join(".");
    name.push('.');
    name
}

fn remove_hostname_reverse_entries(data: &mut DataPlane, endpoints: &Endpoints) {
    for subset in &endpoints.subsets {
        for address in &subset.addresses {
            if address.hostname.is_empty() {
                continue;
            }
            if let Some(canonical) = names::canonical_ip(&address.ip) {
                data.reverse.remove(&canonical);
            }
        }
    }
}

/// A/AAAA leaves per cluster IP (in `clusterIPs[]` order), one SRV leaf
/// per named port targeting the service FQDN, reverse and cluster-IP
/// index entries per IP.
fn cluster_ip_materialization(service: &Service, domain: &str) -> Materialization {
    let fqdn = names::service_fqdn(&service.name, &service.namespace, domain);
    let mut subtree = TreeCache::new();
    let mut reverse = Vec::new();
    let mut cluster_ips = Vec::new();

    for ip in service.cluster_ips() {
        let record = DnsRecord::new(&ip, 0);
        let label = record.label();
        let record = record.named(names::endpoint_fqdn(&label, &fqdn));
        subtree.set_entry(&[], &label, record);

        match names::canonical_ip(&ip) {
            Some(canonical) => {
                reverse.push((canonical.clone(), DnsRecord::new(&fqdn, 0).named(&fqdn)));
                cluster_ips.push((canonical, service.clone()));
            }
            None => warn!(service = %service.key(), ip = %ip, "cluster IP is not an IP literal"),
        }
    }

    for port in &service.ports {
        if port.name.is_empty() || port.protocol.is_empty() {
            continue;
        }
        let proto_segment = format!("_{}", port.protocol.to_lowercase());
        let name_segment = format!("_{}", port.name.to_lowercase());
        let srv_name = names::srv_fqdn(&port.name, &port.protocol, &fqdn);
        let record = DnsRecord::new(&fqdn, port.port).named(srv_name);
        subtree.set_entry(
            &[proto_segment.as_str(), name_segment.as_str()],
            &port.name.to_lowercase(),
            record,
        );
    }

    Materialization {
        subtree,
        reverse,
        cluster_ips,
    }
}

/// One CNAME leaf at the service FQDN.
fn external_name_materialization(service: &Service, domain: &str) -> Materialization {
    let fqdn = names::service_fqdn(&service.name, &service.namespace, domain);
    let mut subtree = TreeCache::new();
    let record = DnsRecord::new(service.external_name.to_lowercase(), 0).named(&fqdn);
    subtree.set_entry(&[], &record.label(), record);

    Materialization {
        subtree,
        reverse: Vec::new(),
        cluster_ips: Vec::new(),
    }
}

/// Endpoint leaves named by hostname or content label, one SRV leaf per
/// named subset port per endpoint, reverse entries for hostnamed
/// addresses.
fn headless_materialization(service: &Service, endpoints: &Endpoints, domain: &str) -> Materialization {
    let fqdn = names::service_fqdn(&service.name, &service.namespace, domain);
    let mut subtree = TreeCache::new();
    let mut reverse = Vec::new();

    for subset in &endpoints.subsets {
        for address in &subset.addresses {
            let record = DnsRecord::new(&address.ip, 0);
            let label = if address.hostname.is_empty() {
                record.label()
            } else {
                address.hostname.to_lowercase()
            };
            let endpoint_fqdn = names::endpoint_fqdn(&label, &fqdn);
            subtree.set_entry(&[], &label, record.named(&endpoint_fqdn));

            if !address.hostname.is_empty() {
                match names::canonical_ip(&address.ip) {
                    Some(canonical) => reverse.push((
                        canonical,
                        DnsRecord::new(&endpoint_fqdn, 0).named(&endpoint_fqdn),
                    )),
                    None => {
                        warn!(endpoints = %endpoints.key(), ip = %address.ip, "endpoint IP is not an IP literal")
                    }
                }
            }

            for port in &subset.ports {
                if port.name.is_empty() || port.protocol.is_empty() {
                    continue;
                }
                let proto_segment = format!("_{}", port.protocol.to_lowercase());
                let name_segment = format!("_{}", port.name.to_lowercase());
                let srv_name = names::srv_fqdn(&port.name, &port.protocol, &fqdn);
                let record = DnsRecord::new(&endpoint_fqdn, port.port).named(srv_name);
                subtree.set_entry(
                    &[proto_segment.as_str(), name_segment.as_str()],
                    &label,
                    record,
                );
            }
        }
    }

    Materialization {
        subtree,
        reverse,
        cluster_ips: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{EndpointAddress, EndpointPort, EndpointSubset, ServicePort};

    const DOMAIN: &str = "cluster.local.";

    fn cluster_ip_service(ip: &str) -> Service {
        Service {
            name: "testservice".into(),
            namespace: "default".into(),
            cluster_ip: ip.into(),
            ports: vec![ServicePort {
                name: String::new(),
                port: 80,
                protocol: "TCP".into(),
            }],
            ..Default::default()
        }
    }

    fn headless_service() -> Service {
        Service {
            name: "testservice".into(),
            namespace: "default".into(),
            cluster_ip: "None".into(),
            ..Default::default()
        }
    }

    fn endpoints_with_ips(ips: &[&str]) -> Endpoints {
        Endpoints {
            name: "testservice".into(),
            namespace: "default".into(),
            subsets: vec![EndpointSubset {
                addresses: ips
                    .iter()
                    .map(|ip| EndpointAddress {
                        ip: ip.to_string(),
                        hostname: String::new(),
                    })
                    .collect(),
                ports: vec![EndpointPort {
                    name: String::new(),
                    port: 80,
                    protocol: "TCP".into(),
                }],
            }],
        }
    }

    #[test]
    fn cluster_ip_service_materializes_and_cleans_up() {
        let state = DnsState::new(DOMAIN);
        state.on_service_add(cluster_ip_service("1.2.3.4"));

        let records = state.records("testservice.default.svc.cluster.local.", false).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].host, "1.2.3.4");

        let reverse = state.reverse_record("4.3.2.1.in-addr.arpa.").unwrap();
        assert_eq!(reverse.host, "testservice.default.svc.cluster.local.");

        state.on_service_delete(cluster_ip_service("1.2.3.4"));
        assert!(state.records("testservice.default.svc.cluster.local.", false).is_err());
        assert!(state.reverse_record("4.3.2.1.in-addr.arpa.").is_err());
        assert_eq!(state.reverse_entries_count(), 0);
    }

    #[test]
    fn headless_endpoints_materialize_in_either_order() {
        // Service first.
        let state = DnsState::new(DOMAIN);
        state.on_service_add(headless_service());
        assert!(state.records("testservice.default.svc.cluster.local.", false).is_err());
        state.on_endpoint_add(endpoints_with_ips(&["10.0.0.1", "10.0.0.2"]));
        let records = state.records("testservice.default.svc.cluster.local.", false).unwrap();
        assert_eq!(records.len(), 2);

        // Endpoints first.
        let state = DnsState::new(DOMAIN);
        state.on_endpoint_add(endpoints_with_ips(&["10.0.0.1", "10.0.0.2"]));
        assert!(state.records("testservice.default.svc.cluster.local.", false).is_err());
        state.on_service_add(headless_service());
        let records = state.records("testservice.default.svc.cluster.local.", false).unwrap();
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn endpoints_of_non_headless_service_stay_unmaterialized() {
        let state = DnsState::new(DOMAIN);
        state.on_service_add(cluster_ip_service("1.2.3.4"));
        state.on_endpoint_add(endpoints_with_ips(&["10.0.0.1"]));

        let records = state.records("testservice.default.svc.cluster.local.", false).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].host, "1.2.3.4");
    }

    #[test]
    fn emptied_endpoints_prune_the_service_subtree() {
        let state = DnsState::new(DOMAIN);
        state.on_service_add(headless_service());
        state.on_endpoint_add(endpoints_with_ips(&["10.0.0.1"]));
        assert!(state.records("testservice.default.svc.cluster.local.", false).is_ok());

        let mut emptied = endpoints_with_ips(&[]);
        emptied.subsets.clear();
        state.on_endpoint_add(emptied);
        assert!(state.records("testservice.default.svc.cluster.local.", false).is_err());
    }

    #[test]
    fn malformed_service_is_skipped() {
        let state = DnsState::new(DOMAIN);
        let bad = Service {
            name: "bad".into(),
            namespace: "default".into(),
            ..Default::default()
        };
        state.on_service_add(bad);
        assert_eq!(state.services_count(), 0);
    }

    #[test]
    fn pod_ip_queries_are_synthesized() {
        let state = DnsState::new(DOMAIN);
        let records = state.records("1-2-3-4.default.pod.cluster.local.", false).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].host, "1.2.3.4");
    }

    #[test]
    fn exact_lookup_uses_leaf_subkey() {
        let state = DnsState::new(DOMAIN);
        state.on_service_add(headless_service());
        let mut endpoints = endpoints_with_ips(&["10.0.0.1"]);
        endpoints.subsets[0].addresses[0].hostname = "foo".into();
        state.on_endpoint_add(endpoints);

        let records = state
            .records("foo.testservice.default.svc.cluster.local.", true)
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].host, "10.0.0.1");

        assert!(state
            .records("bar.testservice.default.svc.cluster.local.", true)
            .is_err());
    }

    #[test]
    fn exact_lookup_resolves_srv_names() {
        let state = DnsState::new(DOMAIN);
        let mut service = cluster_ip_service("1.2.3.4");
        service.ports[0].name = "http".into();
        state.on_service_add(service);

        let records = state
            .records("_http._tcp.testservice.default.svc.cluster.local.", true)
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].host, "testservice.default.svc.cluster.local.");
        assert_eq!(records[0].port, 80);

        assert!(state
            .records("_grpc._tcp.testservice.default.svc.cluster.local.", true)
            .is_err());
    }

    #[test]
    fn config_snapshot_replaces_atomically() {
        let state = DnsState::new(DOMAIN);
        let cfg = ClusterConfig {
            upstream_nameservers: vec!["192.0.2.1".into()],
            ..Default::default()
        };
        state.apply_config(cfg.clone()).unwrap();
        assert_eq!(state.config(), cfg);

        let bad = ClusterConfig {
            upstream_nameservers: vec!["not-an-ip".into()],
            ..Default::default()
        };
        assert!(state.apply_config(bad).is_err());
        // Failed validation retains the previous snapshot.
        assert_eq!(state.config(), cfg);
    }
}
