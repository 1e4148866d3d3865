use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::enrichment::EnrichmentRecord;
use crate::resolvers::Headers;
use crate::signatures::SignatureCatalog;

pub const ASN_WEIGHT: u32 = 100;
pub const CNAME_WEIGHT: u32 = 50;
pub const PTR_WEIGHT: u32 = 50;
pub const HEADER_WEIGHT: u32 = 30;
pub const SERVER_WEIGHT: u32 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    Asn,
    Cname,
    ReverseDns,
    Header,
    Server,
}

impl SignalKind {
    pub fn weight(self) -> u32 {
        match self {
            SignalKind::Asn => ASN_WEIGHT,
            SignalKind::Cname => CNAME_WEIGHT,
            SignalKind::ReverseDns => PTR_WEIGHT,
            SignalKind::Header => HEADER_WEIGHT,
            SignalKind::Server => SERVER_WEIGHT,
        }
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SignalKind::Asn => "ASN",
            SignalKind::Cname => "CNAME",
            SignalKind::ReverseDns => "PTR",
            SignalKind::Header => "Header",
            SignalKind::Server => "Server",
        };
        f.write_str(name)
    }
}

/// One weighted observation pointing at a provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evidence {
    pub provider: String,
    pub signal: SignalKind,
    pub weight: u32,
    pub message: String,
}

impl Evidence {
    fn new(provider: &str, signal: SignalKind, message: String) -> Self {
        Self {
            provider: provider.to_string(),
            signal,
            weight: signal.weight(),
            message,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderScore {
    pub provider: String,
    pub weight: u32,
}

/// Everything the classifier looks at, borrowed from the collection phase
#[derive(Debug, Clone, Copy)]
pub struct Observations<'a> {
    pub hostnames: &'a [String],
    pub asn_records: &'a [EnrichmentRecord],
    pub ptr_names: &'a BTreeSet<String>,
    pub headers: &'a Headers,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub provider: Option<String>,
    pub confidence: f64,
    pub evidence: Vec<Evidence>,
    /// Summed weight per provider with any evidence, in catalog order
    pub scores: Vec<ProviderScore>,
}

impl Classification {
    pub fn total_weight(&self) -> u32 {
        self.scores.iter().map(|s| s.weight).sum()
    }
}

fn server_header(headers: &Headers) -> Option<&String> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("server"))
        .map(|(_, v)| v)
}

/// Collect evidence for every catalog entry and pick the best-supported provider.
///
/// Ties go to the provider listed first in the catalog.
pub fn classify(catalog: &SignatureCatalog, observed: &Observations<'_>) -> Classification {
    let mut evidence = Vec::new();
    let server = server_header(observed.headers).map(|v| v.to_lowercase());

    for entry in catalog.entries() {
        let provider = entry.provider.as_str();

        for record in observed.asn_records {
            if let Some(asn) = record.asn.number() {
                if entry.asns.contains(&asn) {
                    evidence.push(Evidence::new(
                        provider,
                        SignalKind::Asn,
                        format!("{} belongs to AS{asn}", record.ip),
                    ));
                }
            }
        }

        for suffix in &entry.domain_suffixes {
            for hostname in observed.hostnames {
                if hostname.contains(suffix.as_str()) {
                    evidence.push(Evidence::new(
                        provider,
                        SignalKind::Cname,
                        format!("CNAME chain includes {hostname} (matches {suffix})"),
                    ));
                }
            }
            for ptr in observed.ptr_names {
                if ptr.contains(suffix.as_str()) {
                    evidence.push(Evidence::new(
                        provider,
                        SignalKind::ReverseDns,
                        format!("Reverse DNS {ptr} (matches {suffix})"),
                    ));
                }
            }
        }

        for header in &entry.header_names {
            if observed.headers.contains_key(header) {
                evidence.push(Evidence::new(
                    provider,
                    SignalKind::Header,
                    format!("Response carries {header} header"),
                ));
            }
        }

        if let Some(server) = &server {
            for token in &entry.server_tokens {
                if server.contains(token.as_str()) {
                    evidence.push(Evidence::new(
                        provider,
                        SignalKind::Server,
                        format!("Server header mentions {token}"),
                    ));
                }
            }
        }
    }

    let scores: Vec<ProviderScore> = catalog
        .entries()
        .iter()
        .filter_map(|entry| {
            let weight: u32 = evidence
                .iter()
                .filter(|e| e.provider == entry.provider)
                .map(|e| e.weight)
                .sum();
            (weight > 0).then(|| ProviderScore {
                provider: entry.provider.clone(),
                weight,
            })
        })
        .collect();

    let total: u32 = scores.iter().map(|s| s.weight).sum();

    let mut winner: Option<&ProviderScore> = None;
    for score in &scores {
        if winner.map_or(true, |w| score.weight > w.weight) {
            winner = Some(score);
        }
    }

    let (provider, confidence) = match winner {
        Some(w) if total > 0 => {
            let tied: Vec<&str> = scores
                .iter()
                .filter(|s| s.weight == w.weight)
                .map(|s| s.provider.as_str())
                .collect();
            if tied.len() > 1 {
                log::warn!(
                    "Providers tied at weight {}: {}; choosing {}",
                    w.weight,
                    tied.join(", "),
                    w.provider
                );
            }
            (Some(w.provider.clone()), f64::from(w.weight) / f64::from(total))
        }
        _ => (None, 0.0),
    };

    Classification {
        provider,
        confidence,
        evidence,
        scores,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolvers::AsnField;
    use crate::signatures::SignatureEntry;
    use std::net::Ipv4Addr;

    fn record(asn: u32) -> EnrichmentRecord {
        EnrichmentRecord {
            ip: Ipv4Addr::new(198, 51, 100, 1),
            asn: AsnField::Number(asn),
            organization: None,
            country: None,
            city: None,
        }
    }

    struct Fixture {
        hostnames: Vec<String>,
        asn_records: Vec<EnrichmentRecord>,
        ptr_names: BTreeSet<String>,
        headers: Headers,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                hostnames: Vec::new(),
                asn_records: Vec::new(),
                ptr_names: BTreeSet::new(),
                headers: Headers::new(),
            }
        }

        fn observations(&self) -> Observations<'_> {
            Observations {
                hostnames: &self.hostnames,
                asn_records: &self.asn_records,
                ptr_names: &self.ptr_names,
                headers: &self.headers,
            }
        }
    }

    #[test]
    fn test_no_evidence_means_no_provider() {
        let mut fixture = Fixture::new();
        fixture.hostnames.push("example.com".to_string());
        fixture.asn_records.push(record(64496));
        fixture
            .headers
            .insert("Server".to_string(), "nginx".to_string());

        let result = classify(&SignatureCatalog::default(), &fixture.observations());
        assert_eq!(result.provider, None);
        assert_eq!(result.confidence, 0.0);
        assert!(result.evidence.is_empty());
        assert!(result.scores.is_empty());
    }

    #[test]
    fn test_asn_only_gives_full_confidence() {
        let mut fixture = Fixture::new();
        fixture.asn_records.push(record(13335));

        let result = classify(&SignatureCatalog::default(), &fixture.observations());
        assert_eq!(result.provider.as_deref(), Some("Cloudflare"));
        assert_eq!(result.evidence.len(), 1);
        assert_eq!(result.evidence[0].weight, 100);
        assert_eq!(result.evidence[0].signal, SignalKind::Asn);
        assert_eq!(result.confidence, 1.0);
    }

    #[test]
    fn test_cname_and_header_for_fastly() {
        let mut fixture = Fixture::new();
        fixture.hostnames = vec![
            "www.example.com".to_string(),
            "example.map.fastly.net".to_string(),
        ];
        fixture
            .headers
            .insert("X-Fastly-Request-ID".to_string(), "abc123".to_string());

        let result = classify(&SignatureCatalog::default(), &fixture.observations());
        assert_eq!(result.provider.as_deref(), Some("Fastly"));
        assert_eq!(result.evidence.len(), 2);
        assert_eq!(result.total_weight(), 80);
        assert_eq!(result.confidence, 1.0);
    }

    #[test]
    fn test_conflicting_evidence_favours_asn() {
        let mut fixture = Fixture::new();
        fixture.asn_records.push(record(13335));
        fixture
            .headers
            .insert("X-Amz-Cf-Id".to_string(), "xyz".to_string());

        let result = classify(&SignatureCatalog::default(), &fixture.observations());
        assert_eq!(result.provider.as_deref(), Some("Cloudflare"));
        assert!((result.confidence - 100.0 / 130.0).abs() < 1e-9);
        assert_eq!(
            result.scores,
            vec![
                ProviderScore {
                    provider: "Cloudflare".to_string(),
                    weight: 100
                },
                ProviderScore {
                    provider: "Amazon CloudFront".to_string(),
                    weight: 30
                },
            ]
        );
    }

    #[test]
    fn test_repeated_hits_are_not_deduplicated() {
        let mut fixture = Fixture::new();
        fixture.hostnames = vec![
            "a.global.fastly.net".to_string(),
            "b.global.fastly.net".to_string(),
        ];
        fixture.ptr_names.insert("c.fastly.net".to_string());

        let result = classify(&SignatureCatalog::default(), &fixture.observations());
        let cname_hits = result
            .evidence
            .iter()
            .filter(|e| e.signal == SignalKind::Cname)
            .count();
        let ptr_hits = result
            .evidence
            .iter()
            .filter(|e| e.signal == SignalKind::ReverseDns)
            .count();
        assert_eq!(cname_hits, 2);
        assert_eq!(ptr_hits, 1);
        assert_eq!(result.total_weight(), 150);
    }

    #[test]
    fn test_header_names_are_case_sensitive() {
        let catalog = SignatureCatalog::new(vec![
            SignatureEntry::new("Exact").with_headers(&["X-Exact-Cache"])
        ])
        .unwrap();
        let mut fixture = Fixture::new();
        fixture
            .headers
            .insert("x-exact-cache".to_string(), "HIT".to_string());

        let result = classify(&catalog, &fixture.observations());
        assert!(result.evidence.is_empty());
    }

    #[test]
    fn test_server_token_requires_server_header() {
        let catalog = SignatureCatalog::new(vec![
            SignatureEntry::new("Tokened").with_server_tokens(&["edgeproxy"])
        ])
        .unwrap();

        let mut fixture = Fixture::new();
        fixture
            .headers
            .insert("Via".to_string(), "1.1 EdgeProxy".to_string());
        assert!(classify(&catalog, &fixture.observations()).evidence.is_empty());

        fixture
            .headers
            .insert("server".to_string(), "EdgeProxy/2.1".to_string());
        let result = classify(&catalog, &fixture.observations());
        assert_eq!(result.evidence.len(), 1);
        assert_eq!(result.evidence[0].signal, SignalKind::Server);
        assert_eq!(result.evidence[0].weight, 30);
    }

    #[test]
    fn test_tie_goes_to_first_catalog_entry() {
        let catalog = SignatureCatalog::new(vec![
            SignatureEntry::new("First").with_headers(&["X-First"]),
            SignatureEntry::new("Second").with_headers(&["X-Second"]),
        ])
        .unwrap();
        let mut fixture = Fixture::new();
        fixture.headers.insert("X-Second".to_string(), "1".to_string());
        fixture.headers.insert("X-First".to_string(), "1".to_string());

        let result = classify(&catalog, &fixture.observations());
        assert_eq!(result.provider.as_deref(), Some("First"));
        assert_eq!(result.confidence, 0.5);
    }

    #[test]
    fn test_confidence_matches_weight_share() {
        let mut fixture = Fixture::new();
        fixture.asn_records = vec![record(54113), record(20940)];
        fixture.hostnames = vec!["www.example.com.edgekey.net".to_string()];
        fixture
            .headers
            .insert("Server".to_string(), "AkamaiGHost".to_string());

        let result = classify(&SignatureCatalog::default(), &fixture.observations());
        let winner = result.provider.clone().unwrap();
        let winner_weight: u32 = result
            .evidence
            .iter()
            .filter(|e| e.provider == winner)
            .map(|e| e.weight)
            .sum();
        let total: u32 = result.evidence.iter().map(|e| e.weight).sum();

        assert_eq!(winner, "Akamai");
        assert_eq!(winner_weight, 180);
        assert_eq!(total, 280);
        assert!((result.confidence - f64::from(winner_weight) / f64::from(total)).abs() < 1e-12);
        assert!(result.confidence > 0.0 && result.confidence <= 1.0);
    }
}
