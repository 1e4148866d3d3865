use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::net::Ipv4Addr;
use std::sync::Mutex;

use super::parsers::parse_org;
use super::{AsnInfo, DnsAnswer, Headers, LookupError, RecordType, Resolver, Source, DEFAULT_TIMEOUT};
use crate::domain_utils::DomainUtils;

/// In-memory resolver with canned answers.
///
/// Records every call so tests can assert on lookup counts, and can be told
/// to fail or time out per source.
#[derive(Debug, Default)]
pub struct MockResolver {
    dns: HashMap<(String, RecordType), Vec<DnsAnswer>>,
    asn: HashMap<Ipv4Addr, AsnInfo>,
    headers: Option<Headers>,
    failing: HashSet<Source>,
    timing_out: HashSet<Source>,
    dns_log: Mutex<Vec<(String, RecordType)>>,
    asn_log: Mutex<Vec<Ipv4Addr>>,
    header_log: Mutex<Vec<String>>,
}

impl MockResolver {
    pub fn new() -> Self {
        Self::default()
    }

    fn push_answer(&mut self, name: &str, record_type: RecordType, answer: DnsAnswer) {
        self.dns
            .entry((DomainUtils::canonical_name(name), record_type))
            .or_default()
            .push(answer);
    }

    /// `name` answers an A query with `ip`
    pub fn with_a(mut self, name: &str, ip: Ipv4Addr) -> Self {
        self.push_answer(name, RecordType::A, DnsAnswer::new(RecordType::A, &ip.to_string()));
        self
    }

    /// `name` is an alias for `target`; the CNAME shows up in A answers too
    pub fn with_cname(mut self, name: &str, target: &str) -> Self {
        let answer = DnsAnswer::new(RecordType::Cname, &format!("{target}."));
        self.push_answer(name, RecordType::A, answer.clone());
        self.push_answer(name, RecordType::Cname, answer);
        self
    }

    pub fn with_ptr(mut self, ip: Ipv4Addr, hostname: &str) -> Self {
        let name = DomainUtils::reverse_name(ip);
        self.push_answer(&name, RecordType::Ptr, DnsAnswer::new(RecordType::Ptr, hostname));
        self
    }

    /// ASN answer for `ip`, given as the raw `AS<number> <name>` org string
    pub fn with_org(mut self, ip: Ipv4Addr, org: &str) -> Self {
        let (asn, organization) = parse_org(Some(org));
        self.asn.insert(
            ip,
            AsnInfo {
                asn,
                organization,
                country: None,
                city: None,
            },
        );
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers
            .get_or_insert_with(Headers::new)
            .insert(name.to_string(), value.to_string());
        self
    }

    /// Every call to `source` fails with a transport error
    pub fn failing(mut self, source: Source) -> Self {
        self.failing.insert(source);
        self
    }

    /// Every call to `source` fails with a timeout
    pub fn timing_out(mut self, source: Source) -> Self {
        self.timing_out.insert(source);
        self
    }

    pub fn dns_queries(&self) -> Vec<(String, RecordType)> {
        self.dns_log.lock().map(|log| log.clone()).unwrap_or_default()
    }

    pub fn asn_queries(&self) -> Vec<Ipv4Addr> {
        self.asn_log.lock().map(|log| log.clone()).unwrap_or_default()
    }

    pub fn header_queries(&self) -> Vec<String> {
        self.header_log.lock().map(|log| log.clone()).unwrap_or_default()
    }

    fn check(&self, source: Source) -> Result<(), LookupError> {
        if self.timing_out.contains(&source) {
            return Err(LookupError::Timeout {
                source_kind: source,
                after: DEFAULT_TIMEOUT,
            });
        }
        if self.failing.contains(&source) {
            return Err(LookupError::Transport {
                source_kind: source,
                reason: "mock failure".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Resolver for MockResolver {
    async fn dns_lookup(
        &self,
        name: &str,
        record_type: RecordType,
    ) -> Result<Vec<DnsAnswer>, LookupError> {
        let name = DomainUtils::canonical_name(name);
        if let Ok(mut log) = self.dns_log.lock() {
            log.push((name.clone(), record_type));
        }

        // PTR queries are reported under their own source
        let source = if record_type == RecordType::Ptr {
            Source::ReverseDns
        } else {
            Source::Dns
        };
        self.check(source)?;

        Ok(self
            .dns
            .get(&(name, record_type))
            .cloned()
            .unwrap_or_default())
    }

    async fn asn_lookup(&self, ip: Ipv4Addr) -> Result<AsnInfo, LookupError> {
        if let Ok(mut log) = self.asn_log.lock() {
            log.push(ip);
        }
        self.check(Source::Asn)?;
        Ok(self.asn.get(&ip).cloned().unwrap_or_else(AsnInfo::absent))
    }

    async fn fetch_headers(&self, domain: &str) -> Result<Headers, LookupError> {
        if let Ok(mut log) = self.header_log.lock() {
            log.push(domain.to_string());
        }
        self.check(Source::Headers)?;
        Ok(self.headers.clone().unwrap_or_default())
    }
}
