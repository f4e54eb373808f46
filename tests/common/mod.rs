//! Shared test infrastructure: cluster object builders and a
//! catalog-level DNS harness.

#![allow(dead_code)]

use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use hickory_proto::op::{Message, MessageType, OpCode, Query, ResponseCode};
use hickory_proto::rr::{DNSClass, Name, RData, RecordType};
use hickory_proto::serialize::binary::{BinDecodable, BinDecoder, BinEncoder};
use hickory_server::authority::{AuthorityObject, Catalog, MessageRequest, MessageResponse};
use hickory_server::proto::rr::Record;
use hickory_server::proto::xfer::Protocol;
use hickory_server::server::{Request, RequestHandler, ResponseHandler, ResponseInfo};

use cluster_dns::authority::ClusterAuthority;
use cluster_dns::config::{DnsConfig, SoaConfig};
use cluster_dns::object::{
    EndpointAddress, EndpointPort, EndpointSubset, Endpoints, Node, Service, ServicePort,
};
use cluster_dns::state::DnsState;

// --- Constants ---

pub const DOMAIN: &str = "cluster.local.";
pub const TEST_SERVICE: &str = "testservice";
pub const TEST_NAMESPACE: &str = "default";
pub const TEST_EXTERNAL_NAME: &str = "foo.bar.example.com";

// --- Object builders ---

pub fn new_state() -> DnsState {
    DnsState::new(DOMAIN)
}

pub fn new_service(
    namespace: &str,
    name: &str,
    cluster_ip: &str,
    port_name: &str,
    port: u16,
) -> Service {
    Service {
        name: name.to_string(),
        namespace: namespace.to_string(),
        cluster_ip: cluster_ip.to_string(),
        ports: vec![ServicePort {
            name: port_name.to_string(),
            port,
            protocol: "TCP".to_string(),
        }],
        ..Default::default()
    }
}

pub fn new_headless_service() -> Service {
    Service {
        name: TEST_SERVICE.to_string(),
        namespace: TEST_NAMESPACE.to_string(),
        cluster_ip: "None".to_string(),
        ports: vec![ServicePort {
            name: String::new(),
            port: 0,
            protocol: "TCP".to_string(),
        }],
        ..Default::default()
    }
}

pub fn new_external_name_service() -> Service {
    Service {
        name: TEST_SERVICE.to_string(),
        namespace: TEST_NAMESPACE.to_string(),
        cluster_ip: "None".to_string(),
        service_type: "ExternalName".to_string(),
        external_name: TEST_EXTERNAL_NAME.to_string(),
        ..Default::default()
    }
}

pub fn new_endpoints(service: &Service, subsets: Vec<EndpointSubset>) -> Endpoints {
    Endpoints {
        name: service.name.clone(),
        namespace: service.namespace.clone(),
        subsets,
    }
}

pub fn subset_with_one_port(port_name: &str, port: u16, ips: &[&str]) -> EndpointSubset {
    subset_with_one_port_hostnames(port_name, port, false, ips)
}

pub fn subset_with_one_port_hostnames(
    port_name: &str,
    port: u16,
    add_hostname: bool,
    ips: &[&str],
) -> EndpointSubset {
    EndpointSubset {
        addresses: ips
            .iter()
            .enumerate()
            .map(|(i, ip)| EndpointAddress {
                ip: ip.to_string(),
                hostname: if add_hostname {
                    format!("ep-{i}")
                } else {
                    String::new()
                },
            })
            .collect(),
        ports: vec![EndpointPort {
            name: port_name.to_string(),
            port,
            protocol: "TCP".to_string(),
        }],
    }
}

pub fn subset_with_two_ports(
    port_name1: &str,
    port1: u16,
    port_name2: &str,
    port2: u16,
    ips: &[&str],
) -> EndpointSubset {
    let mut subset = subset_with_one_port(port_name1, port1, ips);
    subset.ports.push(EndpointPort {
        name: port_name2.to_string(),
        port: port2,
        protocol: "TCP".to_string(),
    });
    subset
}

pub fn hostnamed_address(ip: &str, hostname: &str) -> EndpointSubset {
    EndpointSubset {
        addresses: vec![EndpointAddress {
            ip: ip.to_string(),
            hostname: hostname.to_string(),
        }],
        ports: Vec::new(),
    }
}

/// Two nodes: one bare, one carrying the topology labels, mirroring a
/// mixed cluster.
pub fn topology_nodes() -> Vec<Node> {
    let mut labeled = Node {
        name: "testnode-1".to_string(),
        ..Default::default()
    };
    labeled.labels.insert(
        "topology.kubernetes.io/zone".to_string(),
        "testcontinent-testreg-testzone".to_string(),
    );
    labeled.labels.insert(
        "topology.kubernetes.io/region".to_string(),
        "testcontinent-testreg".to_string(),
    );
    vec![
        Node {
            name: "testnode-0".to_string(),
            ..Default::default()
        },
        labeled,
    ]
}

// --- Name helpers ---

pub fn service_fqdn(service: &Service) -> String {
    format!("{}.{}.svc.{}", service.name, service.namespace, DOMAIN)
}

pub fn srv_fqdn(service: &Service, port_name: &str) -> String {
    format!("_{}._tcp.{}", port_name, service_fqdn(service))
}

/// `10.47.32.22` -> `22.32.47.10.in-addr.arpa.`, and the 32-nibble
/// `ip6.arpa.` form for IPv6.
pub fn ptr_name(ip: &str) -> String {
    match ip.parse::<IpAddr>().expect("test IP must parse") {
        IpAddr::V4(v4) => {
            let o = v4.octets();
            format!("{}.{}.{}.{}.in-addr.arpa.", o[3], o[2], o[1], o[0])
        }
        IpAddr::V6(v6) => {
            let mut nibbles: Vec<String> = v6
                .octets()
                .iter()
                .flat_map(|b| [format!("{:x}", b >> 4), format!("{:x}", b & 0xf)])
                .collect();
            nibbles.reverse();
            format!("{}.ip6.arpa.", nibbles.join("."))
        }
    }
}

/// The five equivalent query forms for a service FQDN.
pub fn equivalent_queries(service_fqdn: &str, namespace: &str) -> Vec<String> {
    vec![
        service_fqdn.to_string(),
        service_fqdn.replacen(".svc.", ".*.", 1),
        service_fqdn.replacen(namespace, "*", 1),
        service_fqdn
            .replacen(namespace, "*", 1)
            .replacen(".svc.", ".*.", 1),
        format!("*.{service_fqdn}"),
    ]
}

// --- Config builder ---

pub fn test_dns_config() -> DnsConfig {
    DnsConfig {
        listen_addr: "127.0.0.1:5353".parse().unwrap(),
        cluster_domain: DOMAIN.to_string(),
        ttl: 30,
        soa: SoaConfig::default(),
        resolv_conf: "/etc/resolv.conf".to_string(),
    }
}

// --- TestResponseHandler ---

/// Captures the serialized DNS response for inspection in tests.
///
/// Implements `ResponseHandler` so it can be passed to
/// `Catalog::handle_request()`. The response is serialized via
/// `MessageResponse::destructive_emit()` and stored as raw wire-format
/// bytes, which can then be parsed with `Message::from_vec()`.
#[derive(Clone)]
pub struct TestResponseHandler {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl TestResponseHandler {
    pub fn new() -> Self {
        Self {
            buf: Arc::new(Mutex::new(Vec::with_capacity(512))),
        }
    }

    /// Parse the captured wire bytes into a `Message` for assertions.
    pub fn into_message(self) -> Message {
        let buf = self.buf.lock().unwrap();
        assert!(!buf.is_empty(), "no response was captured");
        Message::from_vec(&buf).expect("failed to parse captured DNS response")
    }
}

#[async_trait]
impl ResponseHandler for TestResponseHandler {
    async fn send_response<'a>(
        &mut self,
        response: MessageResponse<
            '_,
            'a,
            impl Iterator<Item = &'a Record> + Send + 'a,
            impl Iterator<Item = &'a Record> + Send + 'a,
            impl Iterator<Item = &'a Record> + Send + 'a,
            impl Iterator<Item = &'a Record> + Send + 'a,
        >,
    ) -> io::Result<ResponseInfo> {
        let mut buf = self.buf.lock().unwrap();
        buf.clear();
        let mut encoder = BinEncoder::new(&mut *buf);
        encoder.set_max_size(u16::MAX);
        let info = response
            .destructive_emit(&mut encoder)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        Ok(info)
    }
}

// --- Query/Request construction ---

/// Build wire-format bytes for a DNS query.
pub fn build_query_bytes(name: &str, record_type: RecordType, id: u16) -> Vec<u8> {
    let mut msg = Message::new();
    msg.set_id(id);
    msg.set_message_type(MessageType::Query);
    msg.set_op_code(OpCode::Query);
    msg.set_recursion_desired(true);
    let mut query = Query::new();
    query.set_name(Name::from_ascii(name).unwrap());
    query.set_query_type(record_type);
    query.set_query_class(DNSClass::IN);
    msg.add_query(query);
    msg.to_vec().unwrap()
}

/// Parse wire bytes into a MessageRequest.
pub fn parse_message_request(bytes: &[u8]) -> MessageRequest {
    let mut decoder = BinDecoder::new(bytes);
    MessageRequest::read(&mut decoder).expect("failed to parse MessageRequest")
}

/// Build a full `Request`.
pub fn build_request(name: &str, record_type: RecordType, id: u16) -> Request {
    let bytes = build_query_bytes(name, record_type, id);
    let msg = parse_message_request(&bytes);
    let src: SocketAddr = "10.0.0.99:12345".parse().unwrap();
    Request::new(msg, src, Protocol::Udp)
}

/// Build a Catalog with a ClusterAuthority over `state`, registered for
/// the cluster domain and the reverse zones.
pub fn build_catalog(state: DnsState) -> Catalog {
    let authority = ClusterAuthority::new(test_dns_config(), state)
        .expect("failed to create ClusterAuthority");
    let origin = authority.origin().clone();
    let authority: Arc<dyn AuthorityObject> = Arc::new(authority);
    let mut catalog = Catalog::new();
    catalog.upsert(origin, vec![authority.clone()]);
    for reverse_zone in ["in-addr.arpa.", "ip6.arpa."] {
        let origin = Name::from_ascii(reverse_zone).unwrap().into();
        catalog.upsert(origin, vec![authority.clone()]);
    }
    catalog
}

// --- Response helpers ---

/// Execute a query through the catalog and return the parsed response.
pub async fn execute_query(
    catalog: &Catalog,
    name: &str,
    record_type: RecordType,
    id: u16,
) -> Message {
    let request = build_request(name, record_type, id);
    let handler = TestResponseHandler::new();
    catalog.handle_request(&request, handler.clone()).await;
    handler.into_message()
}

fn record_ip(r: &Record) -> Option<String> {
    match r.data() {
        RData::A(a) => Some(std::net::Ipv4Addr::from(*a).to_string()),
        RData::AAAA(aaaa) => Some(std::net::Ipv6Addr::from(*aaaa).to_string()),
        _ => None,
    }
}

/// Extract A/AAAA addresses from the answer section.
pub fn extract_ips(msg: &Message) -> Vec<String> {
    msg.answers().iter().filter_map(record_ip).collect()
}

/// Extract CNAME targets from the answer section.
pub fn extract_cnames(msg: &Message) -> Vec<String> {
    msg.answers()
        .iter()
        .filter_map(|r| match r.data() {
            RData::CNAME(cname) => Some(cname.0.to_string()),
            _ => None,
        })
        .collect()
}

/// Extract `(target, port)` pairs of SRV answers.
pub fn extract_srvs(msg: &Message) -> Vec<(String, u16)> {
    msg.answers()
        .iter()
        .filter_map(|r| match r.data() {
            RData::SRV(srv) => Some((srv.target().to_string(), srv.port())),
            _ => None,
        })
        .collect()
}

/// Extract PTR targets from the answer section.
pub fn extract_ptrs(msg: &Message) -> Vec<String> {
    msg.answers()
        .iter()
        .filter_map(|r| match r.data() {
            RData::PTR(ptr) => Some(ptr.0.to_string()),
            _ => None,
        })
        .collect()
}

/// Extract A/AAAA addresses from the additional section.
pub fn extract_additional_ips(msg: &Message) -> Vec<String> {
    msg.additionals().iter().filter_map(record_ip).collect()
}

/// Assert response code.
pub fn assert_response_code(msg: &Message, expected: ResponseCode) {
    assert_eq!(
        msg.response_code(),
        expected,
        "expected {:?}, got {:?}",
        expected,
        msg.response_code()
    );
}
