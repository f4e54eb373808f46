//! Hickory DNS authority backed by the materialized cluster state.
//!
//! Records come back from the core as host strings: an IP literal answers
//! A/AAAA, an FQDN answers CNAME and SRV. SRV answers for IP-hosted
//! records synthesize the target from the record's own materialized name
//! and carry the target's address records in the additional section.

use async_trait::async_trait;
use hickory_proto::op::ResponseCode;
use hickory_proto::rr::rdata::{A, AAAA, CNAME, NS, PTR, SOA, SRV};
use hickory_proto::rr::{DNSClass, LowerName, Name, RData, Record, RecordType};
use hickory_server::authority::{
    Authority, LookupControlFlow, LookupError, LookupObject, LookupOptions, MessageRequest,
    UpdateResult, ZoneType,
};
use hickory_server::server::RequestInfo;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, trace, warn};

use crate::config::DnsConfig;
use crate::error::DnsError;
use crate::record::DnsRecord;
use crate::state::DnsState;

/// Authority answering queries under the cluster domain.
pub struct ClusterAuthority {
    origin: LowerName,
    state: DnsState,
    config: Arc<DnsConfig>,
}

/// Answer and additional records of one lookup.
pub struct ClusterLookup {
    answers: Vec<Record>,
    additionals: Vec<Record>,
}

impl ClusterLookup {
    fn answers(answers: Vec<Record>) -> Self {
        Self {
            answers,
            additionals: Vec::new(),
        }
    }

    fn with_additionals(answers: Vec<Record>, additionals: Vec<Record>) -> Self {
        Self {
            answers,
            additionals,
        }
    }

    fn empty() -> Self {
        Self::answers(Vec::new())
    }
}

impl LookupObject for ClusterLookup {
    fn is_empty(&self) -> bool {
        self.answers.is_empty()
    }

    fn iter<'a>(&'a self) -> Box<dyn Iterator<Item = &'a Record> + Send + 'a> {
        Box::new(self.answers.iter())
    }

    fn take_additionals(&mut self) -> Option<Box<dyn LookupObject>> {
        if self.additionals.is_empty() {
            return None;
        }
        Some(Box::new(ClusterLookup::answers(std::mem::take(
            &mut self.additionals,
        ))))
    }
}

impl ClusterAuthority {
    /// Create a new authority for the given configuration and state.
    pub fn new(config: DnsConfig, state: DnsState) -> Result<Self, hickory_proto::ProtoError> {
        let origin = Name::from_ascii(config.domain())?.into();

        Ok(Self {
            origin,
            state,
            config: Arc::new(config),
        })
    }

    fn break_with(
        lookup: ClusterLookup,
    ) -> LookupControlFlow<<ClusterAuthority as Authority>::Lookup> {
        LookupControlFlow::Break(Ok(lookup))
    }

    fn break_error(e: DnsError) -> LookupControlFlow<<ClusterAuthority as Authority>::Lookup> {
        let code = match e {
            DnsError::NotFound(_) => ResponseCode::NXDomain,
            DnsError::Malformed(_) => ResponseCode::FormErr,
            _ => ResponseCode::ServFail,
        };
        LookupControlFlow::Break(Err(LookupError::ResponseCode(code)))
    }

    fn record(&self, name: Name, rdata: RData) -> Record {
        let mut record = Record::from_rdata(name, self.config.ttl, rdata);
        record.set_dns_class(DNSClass::IN);
        record
    }

    /// A or AAAA answer. FQDN-hosted records (ExternalName, federation
    /// fallbacks) become a CNAME answer instead; IP records of the other
    /// family yield an empty NoError answer.
    fn address_lookup(
        &self,
        qname: &Name,
        name: &str,
        rtype: RecordType,
    ) -> LookupControlFlow<<ClusterAuthority as Authority>::Lookup> {
        let records = match self.state.records(name, false) {
            Ok(records) => records,
            Err(e) => return Self::break_error(e),
        };

        let mut answers = Vec::new();
        for record in &records {
            match record.host.parse::<IpAddr>() {
                Ok(IpAddr::V4(ip)) if rtype == RecordType::A => {
                    answers.push(self.record(qname.clone(), RData::A(A(ip))));
                }
                Ok(IpAddr::V6(ip)) if rtype == RecordType::AAAA => {
                    answers.push(self.record(qname.clone(), RData::AAAA(AAAA(ip))));
                }
                _ => {}
            }
        }
        if !answers.is_empty() {
            return Self::break_with(ClusterLookup::answers(answers));
        }

        if let Some(target) = records.iter().find(|r| !r.is_ip()) {
            return self.cname_answer(qname, target);
        }

        // Records exist but none match the family: NoError, no answers.
        Self::break_with(ClusterLookup::empty())
    }

    fn cname_lookup(
        &self,
        qname: &Name,
        name: &str,
    ) -> LookupControlFlow<<ClusterAuthority as Authority>::Lookup> {
        let records = match self.state.records(name, false) {
            Ok(records) => records,
            Err(e) => return Self::break_error(e),
        };
        match records.iter().find(|r| !r.is_ip()) {
            Some(target) => self.cname_answer(qname, target),
            None => Self::break_with(ClusterLookup::empty()),
        }
    }

    fn cname_answer(
        &self,
        qname: &Name,
        target: &DnsRecord,
    ) -> LookupControlFlow<<ClusterAuthority as Authority>::Lookup> {
        let target_name = match parse_target(&target.host) {
            Some(name) => name,
            None => {
                warn!(host = %target.host, "record host is not a valid CNAME target");
                return LookupControlFlow::Break(Err(LookupError::ResponseCode(
                    ResponseCode::ServFail,
                )));
            }
        };
        let answer = self.record(qname.clone(), RData::CNAME(CNAME(target_name)));
        Self::break_with(ClusterLookup::answers(vec![answer]))
    }

    /// SRV answer. FQDN-hosted records point at their host; IP-hosted
    /// records (endpoint and cluster-IP leaves) get a target synthesized
    /// from their materialized name. Target address records ride in the
    /// additional section.
    fn srv_lookup(
        &self,
        qname: &Name,
        name: &str,
    ) -> LookupControlFlow<<ClusterAuthority as Authority>::Lookup> {
        let records = match self.state.records(name, false) {
            Ok(records) => records,
            Err(e) => return Self::break_error(e),
        };

        let mut answers = Vec::new();
        let mut additionals = Vec::new();
        for record in &records {
            let target_str = if record.is_ip() {
                record.name.clone()
            } else {
                record.host.clone()
            };
            let Some(target) = parse_target(&target_str) else {
                warn!(target = %target_str, "skipping SRV record with unparsable target");
                continue;
            };
            answers.push(self.record(
                qname.clone(),
                RData::SRV(SRV::new(
                    record.priority,
                    record.weight,
                    record.port,
                    target.clone(),
                )),
            ));
            self.push_target_addresses(&target, &target_str, &mut additionals);
        }

        if answers.is_empty() {
            return Self::break_with(ClusterLookup::empty());
        }
        Self::break_with(ClusterLookup::with_additionals(answers, additionals))
    }

    /// Resolve an SRV target back through the core and append its
    /// address records.
    fn push_target_addresses(&self, target: &Name, target_str: &str, additionals: &mut Vec<Record>) {
        let Ok(records) = self.state.records(target_str, false) else {
            trace!(target = %target_str, "SRV target has no address records");
            return;
        };
        for record in records {
            match record.host.parse::<IpAddr>() {
                Ok(IpAddr::V4(ip)) => {
                    additionals.push(self.record(target.clone(), RData::A(A(ip))));
                }
                Ok(IpAddr::V6(ip)) => {
                    additionals.push(self.record(target.clone(), RData::AAAA(AAAA(ip))));
                }
                Err(_) => {}
            }
        }
    }

    fn ptr_lookup(
        &self,
        qname: &Name,
        name: &str,
    ) -> LookupControlFlow<<ClusterAuthority as Authority>::Lookup> {
        match self.state.reverse_record(name) {
            Ok(record) => {
                let Some(target) = parse_target(&record.host) else {
                    warn!(host = %record.host, "reverse record host is not a valid name");
                    return LookupControlFlow::Break(Err(LookupError::ResponseCode(
                        ResponseCode::ServFail,
                    )));
                };
                let answer = self.record(qname.clone(), RData::PTR(PTR(target)));
                Self::break_with(ClusterLookup::answers(vec![answer]))
            }
            Err(e) => Self::break_error(e),
        }
    }

    /// Build the SOA record for this zone.
    fn soa_lookup(&self) -> LookupControlFlow<<ClusterAuthority as Authority>::Lookup> {
        let soa = SOA::new(
            Name::from_ascii(&self.config.soa.mname).unwrap_or_else(|_| Name::root()),
            Name::from_ascii(&self.config.soa.rname).unwrap_or_else(|_| Name::root()),
            self.state.serial(),
            self.config.soa.refresh as i32,
            self.config.soa.retry as i32,
            self.config.soa.expire as i32,
            self.config.soa.minimum,
        );
        let name = Name::from(self.origin.clone());
        let answer = self.record(name, RData::SOA(soa));
        Self::break_with(ClusterLookup::answers(vec![answer]))
    }

    /// Build an NS record for this zone.
    fn ns_lookup(&self) -> LookupControlFlow<<ClusterAuthority as Authority>::Lookup> {
        let ns_name = Name::from_ascii(&self.config.soa.mname).unwrap_or_else(|_| Name::root());
        let name = Name::from(self.origin.clone());
        let answer = self.record(name, RData::NS(NS(ns_name)));
        Self::break_with(ClusterLookup::answers(vec![answer]))
    }
}

fn parse_target(host: &str) -> Option<Name> {
    let fqdn = if host.ends_with('.') {
        host.to_string()
    } else {
        format!("{host}.")
    };
    Name::from_ascii(&fqdn).ok()
}

#[async_trait]
impl Authority for ClusterAuthority {
    type Lookup = ClusterLookup;

    fn zone_type(&self) -> ZoneType {
        ZoneType::Primary
    }

    fn is_axfr_allowed(&self) -> bool {
        false
    }

    fn origin(&self) -> &LowerName {
        &self.origin
    }

    async fn lookup(
        &self,
        name: &LowerName,
        rtype: RecordType,
        _lookup_options: LookupOptions,
    ) -> LookupControlFlow<Self::Lookup> {
        let qname = Name::from(name.clone());
        let name_str = qname.to_string().to_lowercase();
        trace!(name = %name_str, rtype = ?rtype, "lookup");

        match rtype {
            RecordType::A => self.address_lookup(&qname, &name_str, RecordType::A),
            RecordType::AAAA => self.address_lookup(&qname, &name_str, RecordType::AAAA),
            RecordType::CNAME => self.cname_lookup(&qname, &name_str),
            RecordType::SRV => self.srv_lookup(&qname, &name_str),
            RecordType::PTR => self.ptr_lookup(&qname, &name_str),
            RecordType::SOA => self.soa_lookup(),
            RecordType::NS => self.ns_lookup(),
            _ => {
                debug!(name = %name_str, rtype = ?rtype, "unsupported record type");
                LookupControlFlow::Break(Err(LookupError::ResponseCode(ResponseCode::NoError)))
            }
        }
    }

    async fn search(
        &self,
        request_info: RequestInfo<'_>,
        lookup_options: LookupOptions,
    ) -> LookupControlFlow<Self::Lookup> {
        self.lookup(
            request_info.query.name(),
            request_info.query.query_type(),
            lookup_options,
        )
        .await
    }

    async fn get_nsec_records(
        &self,
        _name: &LowerName,
        _lookup_options: LookupOptions,
    ) -> LookupControlFlow<Self::Lookup> {
        // DNSSEC not supported
        LookupControlFlow::Break(Err(LookupError::ResponseCode(ResponseCode::NoError)))
    }

    async fn update(&self, _update: &MessageRequest) -> UpdateResult<bool> {
        // Dynamic updates not supported
        Err(ResponseCode::NotImp)
    }
}
