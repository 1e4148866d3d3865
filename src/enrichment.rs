use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::net::Ipv4Addr;

use crate::resolvers::{AsnField, LookupError, Resolver};

/// ASN data for one discovered address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichmentRecord {
    pub ip: Ipv4Addr,
    pub asn: AsnField,
    pub organization: Option<String>,
    pub country: Option<String>,
    pub city: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    /// Nothing to look up
    Skipped,
    Complete,
    /// Some calls errored
    Partial,
    /// Every call errored
    Failed,
}

/// Outcome of one batch of lookups
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    pub status: BatchStatus,
    pub attempted: usize,
    pub succeeded: usize,
    pub timed_out: usize,
    pub failed: usize,
}

impl BatchReport {
    pub fn skipped() -> Self {
        Self {
            status: BatchStatus::Skipped,
            attempted: 0,
            succeeded: 0,
            timed_out: 0,
            failed: 0,
        }
    }

    /// Tally a batch of results; `failed` counts every error, timeouts included
    pub fn tally<T>(results: &[Result<T, LookupError>]) -> Self {
        let attempted = results.len();
        let succeeded = results.iter().filter(|r| r.is_ok()).count();
        let timed_out = results
            .iter()
            .filter(|r| matches!(r, Err(e) if e.is_timeout()))
            .count();
        let failed = attempted - succeeded;

        let status = if attempted == 0 {
            BatchStatus::Skipped
        } else if failed == 0 {
            BatchStatus::Complete
        } else if succeeded == 0 {
            BatchStatus::Failed
        } else {
            BatchStatus::Partial
        };

        Self {
            status,
            attempted,
            succeeded,
            timed_out,
            failed,
        }
    }

    pub fn single<T>(result: &Result<T, LookupError>) -> Self {
        let outcome = match result {
            Ok(_) => Ok(()),
            Err(e) => Err(e.clone()),
        };
        Self::tally(&[outcome])
    }
}

/// Merged ASN and reverse-DNS data for a set of addresses
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enrichment {
    /// One record per distinct ASN, first seen wins
    pub asn_records: Vec<EnrichmentRecord>,
    pub ptr_names: BTreeSet<String>,
    pub asn_batch: BatchReport,
    pub ptr_batch: BatchReport,
}

impl Default for Enrichment {
    fn default() -> Self {
        Self {
            asn_records: Vec::new(),
            ptr_names: BTreeSet::new(),
            asn_batch: BatchReport::skipped(),
            ptr_batch: BatchReport::skipped(),
        }
    }
}

/// Run the ASN and PTR batches over `ips` concurrently.
///
/// Every address gets exactly one call per batch. Errors are logged and
/// counted; they never discard results from the other batch.
pub async fn enrich<R: Resolver + ?Sized>(resolver: &R, ips: &BTreeSet<Ipv4Addr>) -> Enrichment {
    if ips.is_empty() {
        return Enrichment::default();
    }

    let asn_batch = join_all(ips.iter().map(|ip| async move {
        let result = resolver.asn_lookup(*ip).await;
        (*ip, result)
    }));
    let ptr_batch = join_all(ips.iter().map(|ip| async move {
        let result = resolver.reverse_lookup(*ip).await;
        (*ip, result)
    }));

    let (asn_results, ptr_results) = tokio::join!(asn_batch, ptr_batch);

    let asn_report = BatchReport::tally(
        &asn_results
            .iter()
            .map(|(_, r)| r.as_ref().map(|_| ()).map_err(Clone::clone))
            .collect::<Vec<_>>(),
    );
    let ptr_report = BatchReport::tally(
        &ptr_results
            .iter()
            .map(|(_, r)| r.as_ref().map(|_| ()).map_err(Clone::clone))
            .collect::<Vec<_>>(),
    );

    let mut asn_records = Vec::new();
    let mut seen_asns = HashSet::new();
    for (ip, result) in asn_results {
        match result {
            Ok(info) => match info.asn.number() {
                Some(number) => {
                    if seen_asns.insert(number) {
                        asn_records.push(EnrichmentRecord {
                            ip,
                            asn: info.asn,
                            organization: info.organization,
                            country: info.country,
                            city: info.city,
                        });
                    }
                }
                None => log::debug!("No ASN available for {ip}: {:?}", info.asn),
            },
            Err(e) => log::debug!("ASN lookup for {ip} failed: {e}"),
        }
    }

    let mut ptr_names = BTreeSet::new();
    for (ip, result) in ptr_results {
        match result {
            Ok(Some(name)) => {
                ptr_names.insert(name);
            }
            Ok(None) => log::debug!("No PTR record for {ip}"),
            Err(e) => log::debug!("Reverse lookup for {ip} failed: {e}"),
        }
    }

    if asn_report.status == BatchStatus::Failed {
        log::warn!("All {} ASN lookups failed", asn_report.attempted);
    }
    if ptr_report.status == BatchStatus::Failed {
        log::warn!("All {} reverse DNS lookups failed", ptr_report.attempted);
    }

    Enrichment {
        asn_records,
        ptr_names,
        asn_batch: asn_report,
        ptr_batch: ptr_report,
    }
}
