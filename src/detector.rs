use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::classifier::{classify, Evidence, Observations, ProviderScore};
use crate::discovery::{discover, DiscoveryResult, DEFAULT_LOOKUP_BUDGET};
use crate::domain_utils::DomainUtils;
use crate::enrichment::{enrich, BatchReport, Enrichment, EnrichmentRecord};
use crate::resolvers::{Headers, Resolver};
use crate::signatures::SignatureCatalog;

#[derive(Debug, thiserror::Error)]
pub enum DetectError {
    #[error("invalid domain: {0:?}")]
    InvalidDomain(String),
}

/// Everything gathered while collecting evidence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawData {
    pub discovery: DiscoveryResult,
    pub asn_records: Vec<EnrichmentRecord>,
    pub ptr_names: BTreeSet<String>,
    pub headers: Headers,
    pub asn_batch: BatchReport,
    pub ptr_batch: BatchReport,
    pub header_fetch: BatchReport,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub domain: String,
    pub cdn_detected: bool,
    pub cdn_provider: Option<String>,
    /// Winner's share of the total evidence weight, 0..=1
    pub confidence: f64,
    pub evidence: Vec<Evidence>,
    pub provider_scores: Vec<ProviderScore>,
    pub raw: RawData,
}

impl DetectionResult {
    pub fn confidence_percent(&self) -> u32 {
        (self.confidence * 100.0).round() as u32
    }

    pub fn summary(&self) -> String {
        match &self.cdn_provider {
            Some(provider) => format!(
                "{} is served by {provider} ({}% confidence)",
                self.domain,
                self.confidence_percent()
            ),
            None => format!("No CDN detected for {}", self.domain),
        }
    }
}

/// Detection engine: discovery, enrichment and classification for one domain
/// per call.
pub struct CdnDetector<R> {
    resolver: R,
    catalog: Arc<SignatureCatalog>,
    lookup_budget: usize,
}

impl<R: Resolver> CdnDetector<R> {
    pub fn new(resolver: R, catalog: Arc<SignatureCatalog>) -> Self {
        Self {
            resolver,
            catalog,
            lookup_budget: DEFAULT_LOOKUP_BUDGET,
        }
    }

    pub fn with_lookup_budget(mut self, budget: usize) -> Self {
        self.lookup_budget = budget.max(1);
        self
    }

    pub fn catalog(&self) -> &SignatureCatalog {
        &self.catalog
    }

    pub fn resolver(&self) -> &R {
        &self.resolver
    }

    /// Detect the CDN in front of `input`.
    ///
    /// Upstream failures only reduce the evidence available; the sole error
    /// is input that does not normalize to a hostname.
    pub async fn detect(&self, input: &str) -> Result<DetectionResult, DetectError> {
        let domain = DomainUtils::normalize(input)
            .ok_or_else(|| DetectError::InvalidDomain(input.to_string()))?;
        log::debug!("Starting CDN detection for {domain}");

        let collect_ips = async {
            let discovery = discover(&self.resolver, &domain, self.lookup_budget).await;
            if discovery.is_unresolved() {
                log::warn!(
                    "{domain} did not resolve to any IPv4 address after {} lookups",
                    discovery.lookups_issued
                );
                return (discovery, Enrichment::default());
            }
            let enrichment = enrich(&self.resolver, &discovery.ips).await;
            (discovery, enrichment)
        };
        let fetch_headers = self.resolver.fetch_headers(&domain);

        let ((discovery, enrichment), header_result) = tokio::join!(collect_ips, fetch_headers);

        let header_fetch = BatchReport::single(&header_result);
        let headers = match header_result {
            Ok(headers) => headers,
            Err(e) => {
                log::debug!("Header fetch for {domain} failed: {e}");
                Headers::new()
            }
        };

        let classification = classify(
            &self.catalog,
            &Observations {
                hostnames: &discovery.hostnames_visited,
                asn_records: &enrichment.asn_records,
                ptr_names: &enrichment.ptr_names,
                headers: &headers,
            },
        );

        let result = DetectionResult {
            domain,
            cdn_detected: classification.provider.is_some(),
            cdn_provider: classification.provider,
            confidence: classification.confidence,
            evidence: classification.evidence,
            provider_scores: classification.scores,
            raw: RawData {
                discovery,
                asn_records: enrichment.asn_records,
                ptr_names: enrichment.ptr_names,
                headers,
                asn_batch: enrichment.asn_batch,
                ptr_batch: enrichment.ptr_batch,
                header_fetch,
            },
        };

        log::info!("{}", result.summary());
        Ok(result)
    }
}
