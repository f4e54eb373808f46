//! FQDN builders and query-name classification.
//!
//! All produced names are lowercase and dot-terminated. Query names are
//! normalized the same way before they are decomposed into reversed
//! segment paths for the tree walk.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use crate::error::DnsError;

/// Label under the cluster domain holding service names.
pub const SERVICE_SUBDOMAIN: &str = "svc";

/// Label under the cluster domain holding synthetic pod-IP names.
pub const POD_SUBDOMAIN: &str = "pod";

/// Reverse-lookup suffix for IPv4.
pub const ARPA_SUFFIX_V4: &str = ".in-addr.arpa.";

/// Reverse-lookup suffix for IPv6.
pub const ARPA_SUFFIX_V6: &str = ".ip6.arpa.";

/// Split a name into lowercase segments, most-significant first: the
/// reversed path the tree is walked in. `a.b.c.` becomes `[c, b, a]`.
pub fn reversed_path(name: &str) -> Vec<String> {
    name.trim_end_matches('.')
        .split('.')
        .rev()
        .map(str::to_lowercase)
        .collect()
}

/// Split a name into lowercase segments in name order. `a.b.c.` becomes
/// `[a, b, c]`.
pub fn segments(name: &str) -> Vec<String> {
    name.trim_end_matches('.')
        .split('.')
        .map(str::to_lowercase)
        .collect()
}

/// `<svc>.<ns>.svc.<domain>` — `domain` is already dot-terminated.
pub fn service_fqdn(name: &str, namespace: &str, domain: &str) -> String {
    format!(
        "{}.{}.{}.{}",
        name.to_lowercase(),
        namespace.to_lowercase(),
        SERVICE_SUBDOMAIN,
        domain
    )
}

/// `<label>.<service-fqdn>` — endpoint and pod-hostname leaves.
pub fn endpoint_fqdn(label: &str, service_fqdn: &str) -> String {
    format!("{}.{}", label.to_lowercase(), service_fqdn)
}

/// `_<port>._<proto>.<service-fqdn>`.
pub fn srv_fqdn(port_name: &str, protocol: &str, service_fqdn: &str) -> String {
    format!(
        "_{}._{}.{}",
        port_name.to_lowercase(),
        protocol.to_lowercase(),
        service_fqdn
    )
}

/// `<svc>.<ns>.<fed>.svc.<zone>.<region>.<fed-domain>.` — the synthesized
/// federation fallback target.
#[cfg(feature = "federations")]
pub fn federation_fqdn(
    service: &str,
    namespace: &str,
    federation: &str,
    zone: &str,
    region: &str,
    federation_domain: &str,
) -> String {
    format!(
        "{}.{}.{}.{}.{}.{}.{}.",
        service, namespace, federation, SERVICE_SUBDOMAIN, zone, region, federation_domain
    )
}

/// True if the character set of a label is plausible for a DNS1123 label.
pub fn is_dns_label(label: &str) -> bool {
    !label.is_empty()
        && label.len() <= 63
        && label.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && !label.starts_with('-')
        && !label.ends_with('-')
}

/// Decode the dashed pod-IP form: `1-2-3-4` is IPv4 `1.2.3.4`, and the
/// IPv6 form substitutes `-` for `:` (`2001-db8--1` is `2001:db8::1`).
/// Returns the canonical IP literal.
pub fn decode_dashed_ip(label: &str) -> Result<IpAddr, DnsError> {
    let v4 = label.replace('-', ".");
    if let Ok(ip) = v4.parse::<Ipv4Addr>() {
        return Ok(IpAddr::V4(ip));
    }
    let v6 = label.replace('-', ":");
    if let Ok(ip) = v6.parse::<Ipv6Addr>() {
        return Ok(IpAddr::V6(ip));
    }
    Err(DnsError::Malformed(format!("bad pod IP encoding: {label:?}")))
}

/// Parse an `in-addr.arpa.`/`ip6.arpa.` name back into the canonical IP
/// string used as the reverse-index key.
pub fn extract_ip(name: &str) -> Result<String, DnsError> {
    let lower = name.to_lowercase();
    if let Some(prefix) = lower.strip_suffix(ARPA_SUFFIX_V4) {
        return extract_ipv4(prefix);
    }
    if let Some(prefix) = lower.strip_suffix(ARPA_SUFFIX_V6) {
        return extract_ipv6(prefix);
    }
    Err(DnsError::Malformed(format!(
        "not a reverse lookup name: {name:?}"
    )))
}

// `4.3.2.1` -> `1.2.3.4`
fn extract_ipv4(prefix: &str) -> Result<String, DnsError> {
    let octets: Vec<&str> = prefix.split('.').collect();
    if octets.len() != 4 {
        return Err(DnsError::Malformed(format!(
            "expected 4 octets in reverse name, got {}",
            octets.len()
        )));
    }
    let dotted = format!("{}.{}.{}.{}", octets[3], octets[2], octets[1], octets[0]);
    let ip: Ipv4Addr = dotted
        .parse()
        .map_err(|_| DnsError::Malformed(format!("bad reverse octets: {prefix:?}")))?;
    Ok(ip.to_string())
}

// 32 reversed nibbles -> canonical IPv6 literal
fn extract_ipv6(prefix: &str) -> Result<String, DnsError> {
    let nibbles: Vec<&str> = prefix.split('.').rev().collect();
    if nibbles.len() != 32 || nibbles.iter().any(|n| n.len() != 1) {
        return Err(DnsError::Malformed(format!(
            "expected 32 nibbles in reverse name: {prefix:?}"
        )));
    }
    let mut hextets = Vec::with_capacity(8);
    for chunk in nibbles.chunks(4) {
        hextets.push(chunk.concat());
    }
    let literal = hextets.join(":");
    let ip: Ipv6Addr = literal
        .parse()
        .map_err(|_| DnsError::Malformed(format!("bad reverse nibbles: {prefix:?}")))?;
    Ok(ip.to_string())
}

/// Canonicalize an IP literal so reverse-index keys compare reliably
/// (`2001:DB8:0:0:0:0:0:1` and `2001:db8::1` are the same key).
pub fn canonical_ip(ip: &str) -> Option<String> {
    ip.parse::<IpAddr>().ok().map(|addr| addr.to_string())
}
