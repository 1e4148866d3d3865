pub mod mock;
pub mod network;
pub mod parsers;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::net::Ipv4Addr;
use std::time::Duration;

use crate::domain_utils::DomainUtils;

pub use mock::MockResolver;
pub use network::NetworkResolver;

/// Default per-call deadline for every upstream lookup
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Record types the engine asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordType {
    A,
    Cname,
    Ptr,
}

impl RecordType {
    pub fn code(self) -> u16 {
        match self {
            RecordType::A => 1,
            RecordType::Cname => 5,
            RecordType::Ptr => 12,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RecordType::A => "A",
            RecordType::Cname => "CNAME",
            RecordType::Ptr => "PTR",
        }
    }
}

/// One answer from a DNS query, tagged with its numeric type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsAnswer {
    pub record_type: u16,
    pub data: String,
}

impl DnsAnswer {
    pub fn new(record_type: RecordType, data: &str) -> Self {
        Self {
            record_type: record_type.code(),
            data: data.to_string(),
        }
    }

    pub fn is(&self, record_type: RecordType) -> bool {
        self.record_type == record_type.code()
    }
}

/// ASN as parsed out of an organization string
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "value", rename_all = "snake_case")]
pub enum AsnField {
    /// Upstream returned no organization at all
    Absent,
    /// Organization present but without a leading `AS<number>` token
    Unparsed(String),
    Number(u32),
}

impl AsnField {
    pub fn number(&self) -> Option<u32> {
        match self {
            AsnField::Number(n) => Some(*n),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AsnInfo {
    pub asn: AsnField,
    pub organization: Option<String>,
    pub country: Option<String>,
    pub city: Option<String>,
}

impl AsnInfo {
    pub fn absent() -> Self {
        Self {
            asn: AsnField::Absent,
            organization: None,
            country: None,
            city: None,
        }
    }
}

/// Response headers keyed exactly as received
pub type Headers = BTreeMap<String, String>;

/// Which upstream a lookup talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Dns,
    Asn,
    ReverseDns,
    Headers,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Source::Dns => "dns",
            Source::Asn => "asn",
            Source::ReverseDns => "reverse-dns",
            Source::Headers => "headers",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LookupError {
    #[error("{source_kind} lookup timed out after {}s", .after.as_secs())]
    Timeout { source_kind: Source, after: Duration },
    #[error("{source_kind} lookup returned HTTP {status}")]
    Status { source_kind: Source, status: u16 },
    #[error("malformed {source_kind} response: {reason}")]
    Malformed { source_kind: Source, reason: String },
    #[error("{source_kind} request failed: {reason}")]
    Transport { source_kind: Source, reason: String },
}

impl LookupError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, LookupError::Timeout { .. })
    }

    pub fn source_kind(&self) -> Source {
        match self {
            LookupError::Timeout { source_kind, .. }
            | LookupError::Status { source_kind, .. }
            | LookupError::Malformed { source_kind, .. }
            | LookupError::Transport { source_kind, .. } => *source_kind,
        }
    }

    /// Re-tag the error as coming from `source`
    pub fn with_source(self, source: Source) -> Self {
        match self {
            LookupError::Timeout { after, .. } => LookupError::Timeout {
                source_kind: source,
                after,
            },
            LookupError::Status { status, .. } => LookupError::Status {
                source_kind: source,
                status,
            },
            LookupError::Malformed { reason, .. } => LookupError::Malformed {
                source_kind: source,
                reason,
            },
            LookupError::Transport { reason, .. } => LookupError::Transport {
                source_kind: source,
                reason,
            },
        }
    }
}

/// Outbound lookups the detection engine depends on.
///
/// Each method issues a single upstream request bounded by a timeout.
#[async_trait]
pub trait Resolver: Send + Sync {
    async fn dns_lookup(
        &self,
        name: &str,
        record_type: RecordType,
    ) -> Result<Vec<DnsAnswer>, LookupError>;

    async fn asn_lookup(&self, ip: Ipv4Addr) -> Result<AsnInfo, LookupError>;

    async fn fetch_headers(&self, domain: &str) -> Result<Headers, LookupError>;

    async fn reverse_lookup(&self, ip: Ipv4Addr) -> Result<Option<String>, LookupError> {
        let name = DomainUtils::reverse_name(ip);
        let answers = self
            .dns_lookup(&name, RecordType::Ptr)
            .await
            .map_err(|e| e.with_source(Source::ReverseDns))?;

        Ok(answers
            .iter()
            .find(|a| a.is(RecordType::Ptr))
            .map(|a| DomainUtils::canonical_name(&a.data))
            .filter(|name| !name.is_empty()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_type_codes() {
        assert_eq!(RecordType::A.code(), 1);
        assert_eq!(RecordType::Cname.code(), 5);
        assert_eq!(RecordType::Ptr.code(), 12);
        assert!(DnsAnswer::new(RecordType::Cname, "x.fastly.net.").is(RecordType::Cname));
    }

    #[test]
    fn test_lookup_error_kinds() {
        let timeout = LookupError::Timeout {
            source_kind: Source::Asn,
            after: Duration::from_secs(5),
        };
        assert!(timeout.is_timeout());
        assert_eq!(timeout.to_string(), "asn lookup timed out after 5s");

        let status = LookupError::Status {
            source_kind: Source::Headers,
            status: 503,
        };
        assert!(!status.is_timeout());
        assert_eq!(status.source_kind(), Source::Headers);
    }

    #[tokio::test]
    async fn test_default_reverse_lookup_uses_ptr_query() {
        let resolver = MockResolver::new().with_ptr(Ipv4Addr::new(1, 2, 3, 4), "Edge.Example.NET.");
        let name = resolver
            .reverse_lookup(Ipv4Addr::new(1, 2, 3, 4))
            .await
            .unwrap();
        assert_eq!(name, Some("edge.example.net".to_string()));

        let queries = resolver.dns_queries();
        assert_eq!(
            queries,
            vec![("4.3.2.1.in-addr.arpa".to_string(), RecordType::Ptr)]
        );

        let none = resolver
            .reverse_lookup(Ipv4Addr::new(9, 9, 9, 9))
            .await
            .unwrap();
        assert_eq!(none, None);
    }

    /// Answers every DNS question with a fixed error
    struct BrokenDns(LookupError);

    #[async_trait]
    impl Resolver for BrokenDns {
        async fn dns_lookup(
            &self,
            _name: &str,
            _record_type: RecordType,
        ) -> Result<Vec<DnsAnswer>, LookupError> {
            Err(self.0.clone())
        }

        async fn asn_lookup(&self, _ip: Ipv4Addr) -> Result<AsnInfo, LookupError> {
            Ok(AsnInfo::absent())
        }

        async fn fetch_headers(&self, _domain: &str) -> Result<Headers, LookupError> {
            Ok(Headers::new())
        }
    }

    #[tokio::test]
    async fn test_reverse_lookup_tags_every_failure_as_reverse_dns() {
        let failures = vec![
            LookupError::Timeout {
                source_kind: Source::Dns,
                after: Duration::from_secs(1),
            },
            LookupError::Status {
                source_kind: Source::Dns,
                status: 502,
            },
            LookupError::Malformed {
                source_kind: Source::Dns,
                reason: "not json".to_string(),
            },
            LookupError::Transport {
                source_kind: Source::Dns,
                reason: "connection reset".to_string(),
            },
        ];

        for failure in failures {
            let resolver = BrokenDns(failure.clone());
            let err = resolver
                .reverse_lookup(Ipv4Addr::new(1, 2, 3, 4))
                .await
                .unwrap_err();
            assert_eq!(err.source_kind(), Source::ReverseDns);
            assert_eq!(err.is_timeout(), failure.is_timeout());
        }
    }
}
