use async_trait::async_trait;
use hickory_resolver::error::ResolveErrorKind;
use hickory_resolver::proto::rr::{RData, RecordType as HickoryRecordType};
use hickory_resolver::TokioAsyncResolver;
use reqwest::Client;
use std::net::Ipv4Addr;
use std::time::Duration;

use super::parsers::{parse_doh_response, parse_header_dump, parse_org_response};
use super::{AsnInfo, DnsAnswer, Headers, LookupError, RecordType, Resolver, Source};
use crate::config::{DnsBackendKind, ResolverConfig};

/// Where DNS questions are sent
pub enum DnsBackend {
    /// DNS-over-HTTPS JSON endpoint
    Doh { url: String },
    /// The host's configured resolvers
    System(TokioAsyncResolver),
}

/// Production resolver talking to public HTTP services.
pub struct NetworkResolver {
    client: Client,
    dns: DnsBackend,
    asn_url: String,
    headers_url: String,
    timeout: Duration,
}

impl NetworkResolver {
    pub fn new(config: &ResolverConfig) -> anyhow::Result<Self> {
        let timeout = Duration::from_secs(config.timeout_seconds.max(1));
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(config.user_agent.as_str())
            .build()?;

        let dns = match config.dns_backend {
            DnsBackendKind::Doh => DnsBackend::Doh {
                url: config.doh_url.clone(),
            },
            DnsBackendKind::System => {
                DnsBackend::System(TokioAsyncResolver::tokio_from_system_conf()?)
            }
        };

        Ok(Self {
            client,
            dns,
            asn_url: config.asn_url.clone(),
            headers_url: config.headers_url.clone(),
            timeout,
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn map_reqwest_error(&self, source_kind: Source, e: reqwest::Error) -> LookupError {
        if e.is_timeout() {
            LookupError::Timeout {
                source_kind,
                after: self.timeout,
            }
        } else if let Some(status) = e.status() {
            LookupError::Status {
                source_kind,
                status: status.as_u16(),
            }
        } else {
            LookupError::Transport {
                source_kind,
                reason: e.to_string(),
            }
        }
    }

    /// One GET with the configured deadline applied to headers and body alike
    async fn get_text(
        &self,
        source_kind: Source,
        request: reqwest::RequestBuilder,
    ) -> Result<String, LookupError> {
        let call = async {
            let response = request
                .send()
                .await
                .map_err(|e| self.map_reqwest_error(source_kind, e))?;

            let status = response.status();
            if !status.is_success() {
                return Err(LookupError::Status {
                    source_kind,
                    status: status.as_u16(),
                });
            }

            response
                .text()
                .await
                .map_err(|e| self.map_reqwest_error(source_kind, e))
        };

        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(LookupError::Timeout {
                source_kind,
                after: self.timeout,
            }),
        }
    }

    async fn doh_lookup(
        &self,
        url: &str,
        name: &str,
        record_type: RecordType,
    ) -> Result<Vec<DnsAnswer>, LookupError> {
        log::debug!("DoH {} lookup for {name}", record_type.as_str());

        let request = self
            .client
            .get(url)
            .query(&[("name", name), ("type", record_type.as_str())])
            .header("Accept", "application/dns-json");

        let body = self.get_text(Source::Dns, request).await?;
        let answers = parse_doh_response(&body)?;
        log::debug!("DoH found {} answers for {name}", answers.len());
        Ok(answers)
    }

    async fn system_lookup(
        &self,
        resolver: &TokioAsyncResolver,
        name: &str,
        record_type: RecordType,
    ) -> Result<Vec<DnsAnswer>, LookupError> {
        log::debug!("System DNS {} lookup for {name}", record_type.as_str());

        let query_type = match record_type {
            RecordType::A => HickoryRecordType::A,
            RecordType::Cname => HickoryRecordType::CNAME,
            RecordType::Ptr => HickoryRecordType::PTR,
        };

        // Absolute name so search domains and ndots never rewrite the query
        let lookup_future = resolver.lookup(fully_qualified(name), query_type);
        let lookup = match tokio::time::timeout(self.timeout, lookup_future).await {
            Ok(Ok(lookup)) => lookup,
            Ok(Err(e)) => {
                if matches!(e.kind(), ResolveErrorKind::NoRecordsFound { .. }) {
                    return Ok(Vec::new());
                }
                return Err(LookupError::Transport {
                    source_kind: Source::Dns,
                    reason: e.to_string(),
                });
            }
            Err(_) => {
                return Err(LookupError::Timeout {
                    source_kind: Source::Dns,
                    after: self.timeout,
                })
            }
        };

        let answers = lookup
            .iter()
            .filter_map(|rdata| match rdata {
                RData::A(a) => Some(DnsAnswer::new(RecordType::A, &a.to_string())),
                RData::CNAME(cname) => Some(DnsAnswer::new(RecordType::Cname, &cname.to_utf8())),
                RData::PTR(ptr) => Some(DnsAnswer::new(RecordType::Ptr, &ptr.to_utf8())),
                _ => None,
            })
            .collect();

        Ok(answers)
    }
}

fn fully_qualified(name: &str) -> String {
    if name.ends_with('.') {
        name.to_string()
    } else {
        format!("{name}.")
    }
}

#[async_trait]
impl Resolver for NetworkResolver {
    async fn dns_lookup(
        &self,
        name: &str,
        record_type: RecordType,
    ) -> Result<Vec<DnsAnswer>, LookupError> {
        match &self.dns {
            DnsBackend::Doh { url } => self.doh_lookup(url, name, record_type).await,
            DnsBackend::System(resolver) => self.system_lookup(resolver, name, record_type).await,
        }
    }

    async fn asn_lookup(&self, ip: Ipv4Addr) -> Result<AsnInfo, LookupError> {
        let url = self.asn_url.replace("{ip}", &ip.to_string());
        log::debug!("ASN lookup for {ip}");

        let body = self.get_text(Source::Asn, self.client.get(&url)).await?;
        let info = parse_org_response(&body)?;
        log::debug!("ASN for {ip}: {:?}", info.asn);
        Ok(info)
    }

    async fn fetch_headers(&self, domain: &str) -> Result<Headers, LookupError> {
        let url = self.headers_url.replace("{domain}", domain);
        log::debug!("Fetching response headers for {domain}");

        let body = self
            .get_text(Source::Headers, self.client.get(&url))
            .await?;
        let headers = parse_header_dump(&body);
        log::debug!("Got {} headers for {domain}", headers.len());
        Ok(headers)
    }
}
