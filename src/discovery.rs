use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet, VecDeque};
use std::net::Ipv4Addr;

use crate::domain_utils::DomainUtils;
use crate::resolvers::{RecordType, Resolver};

/// Maximum DNS requests a single discovery may issue
pub const DEFAULT_LOOKUP_BUDGET: usize = 10;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryResult {
    pub ips: BTreeSet<Ipv4Addr>,
    /// Hostnames in the order they were queried
    pub hostnames_visited: Vec<String>,
    pub lookups_issued: usize,
}

impl DiscoveryResult {
    pub fn is_unresolved(&self) -> bool {
        self.ips.is_empty()
    }
}

/// Breadth-first walk of a domain's alias chain.
///
/// Seeds the queue with `domain` and its `www.` counterpart, then follows
/// CNAME targets until the queue drains or `budget` lookups have been
/// issued. A name is never queued twice.
pub async fn discover<R: Resolver + ?Sized>(
    resolver: &R,
    domain: &str,
    budget: usize,
) -> DiscoveryResult {
    let mut result = DiscoveryResult::default();
    let mut queue = VecDeque::new();
    let mut seen = HashSet::new();

    for seed in [domain.to_string(), DomainUtils::www_counterpart(domain)] {
        if seen.insert(seed.clone()) {
            queue.push_back(seed);
        }
    }

    while result.lookups_issued < budget {
        let Some(hostname) = queue.pop_front() else {
            break;
        };

        result.lookups_issued += 1;
        result.hostnames_visited.push(hostname.clone());

        let answers = match resolver.dns_lookup(&hostname, RecordType::A).await {
            Ok(answers) => answers,
            Err(e) => {
                log::debug!("DNS lookup for {hostname} failed: {e}");
                continue;
            }
        };

        for answer in &answers {
            if answer.is(RecordType::A) {
                match answer.data.parse::<Ipv4Addr>() {
                    Ok(ip) => {
                        if result.ips.insert(ip) {
                            log::debug!("{hostname} resolves to {ip}");
                        }
                    }
                    Err(_) => log::debug!("Ignoring non-IPv4 A data for {hostname}: {}", answer.data),
                }
            } else if answer.is(RecordType::Cname) {
                let target = DomainUtils::canonical_name(&answer.data);
                if !target.is_empty() && seen.insert(target.clone()) {
                    log::debug!("{hostname} is an alias for {target}");
                    queue.push_back(target);
                }
            }
        }
    }

    if !queue.is_empty() {
        log::debug!(
            "Lookup budget of {budget} exhausted for {domain} with {} names still queued",
            queue.len()
        );
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolvers::{MockResolver, Source};

    fn ip(last: u8) -> Ipv4Addr {
        Ipv4Addr::new(192, 0, 2, last)
    }

    #[tokio::test]
    async fn test_follows_cname_chain() {
        let resolver = MockResolver::new()
            .with_cname("www.example.com", "example.com.cdn.cloudflare.net")
            .with_a("example.com.cdn.cloudflare.net", ip(1))
            .with_a("example.com.cdn.cloudflare.net", ip(2))
            .with_a("example.com", ip(1));

        let result = discover(&resolver, "example.com", DEFAULT_LOOKUP_BUDGET).await;

        assert_eq!(
            result.hostnames_visited,
            vec![
                "example.com".to_string(),
                "www.example.com".to_string(),
                "example.com.cdn.cloudflare.net".to_string(),
            ]
        );
        assert_eq!(result.ips, BTreeSet::from([ip(1), ip(2)]));
        assert_eq!(result.lookups_issued, 3);
    }

    #[tokio::test]
    async fn test_www_input_seeds_bare_domain() {
        let resolver = MockResolver::new().with_a("example.org", ip(7));
        let result = discover(&resolver, "www.example.org", DEFAULT_LOOKUP_BUDGET).await;

        assert_eq!(
            result.hostnames_visited,
            vec!["www.example.org".to_string(), "example.org".to_string()]
        );
        assert_eq!(result.ips, BTreeSet::from([ip(7)]));
    }

    #[tokio::test]
    async fn test_cycle_terminates_without_revisiting() {
        let resolver = MockResolver::new()
            .with_cname("loop.test", "a.loop.test")
            .with_cname("a.loop.test", "b.loop.test")
            .with_cname("b.loop.test", "a.loop.test")
            .with_cname("b.loop.test", "loop.test");

        let result = discover(&resolver, "loop.test", DEFAULT_LOOKUP_BUDGET).await;

        assert_eq!(result.lookups_issued, 4);
        let unique: HashSet<_> = result.hostnames_visited.iter().collect();
        assert_eq!(unique.len(), result.hostnames_visited.len());
        assert!(result.is_unresolved());
    }

    #[tokio::test]
    async fn test_long_chain_respects_budget() {
        let mut resolver = MockResolver::new();
        for i in 0..30 {
            resolver = resolver.with_cname(&format!("hop{i}.chain.test"), &format!("hop{}.chain.test", i + 1));
        }
        resolver = resolver.with_a("hop30.chain.test", ip(9));

        let result = discover(&resolver, "hop0.chain.test", DEFAULT_LOOKUP_BUDGET).await;

        assert_eq!(result.lookups_issued, DEFAULT_LOOKUP_BUDGET);
        assert_eq!(resolver.dns_queries().len(), DEFAULT_LOOKUP_BUDGET);
        assert!(result.ips.is_empty());
    }

    #[tokio::test]
    async fn test_failed_lookups_spend_budget_and_continue() {
        let resolver = MockResolver::new()
            .with_a("example.net", ip(3))
            .failing(Source::Dns);

        let result = discover(&resolver, "example.net", DEFAULT_LOOKUP_BUDGET).await;
        assert_eq!(result.lookups_issued, 2);
        assert_eq!(
            result.hostnames_visited,
            vec!["example.net".to_string(), "www.example.net".to_string()]
        );
        assert!(result.is_unresolved());
    }

    #[tokio::test]
    async fn test_alias_back_to_seed_is_not_requeued() {
        let resolver = MockResolver::new()
            .with_a("example.io", ip(4))
            .with_cname("www.example.io", "example.io");
        let result = discover(&resolver, "example.io", DEFAULT_LOOKUP_BUDGET).await;

        // The alias points back to an already-visited seed
        assert_eq!(result.lookups_issued, 2);
        assert_eq!(result.ips.len(), 1);
    }
}
