//! Error types for cluster-dns.

use thiserror::Error;

/// Errors that can occur in the resolver.
#[derive(Debug, Error)]
pub enum DnsError {
    /// No record exists for the queried name or IP.
    #[error("no records for {0}")]
    NotFound(String),

    /// Caller-supplied name failed parsing (bad IP encoding, bad arpa form).
    #[error("malformed query: {0}")]
    Malformed(String),

    /// Configuration snapshot rejected by validation; the current
    /// configuration is retained.
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    /// IO error (network, file, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// DNS protocol error
    #[error("DNS protocol error: {0}")]
    Proto(#[from] hickory_proto::ProtoError),
}

impl DnsError {
    /// True if this is the not-found kind, which the DNS front-end maps
    /// to NXDOMAIN.
    pub fn is_not_found(&self) -> bool {
        matches!(self, DnsError::NotFound(_))
    }
}
