use std::net::Ipv4Addr;
use url::Url;

/// Hostname helpers shared by discovery and the resolvers
pub struct DomainUtils;

impl DomainUtils {
    /// Normalize user input into a bare lowercase hostname.
    ///
    /// Accepts plain hosts, full URLs, `host:port` and trailing dots.
    /// Returns `None` when nothing usable remains.
    pub fn normalize(input: &str) -> Option<String> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return None;
        }

        let host = if trimmed.contains("://") {
            Url::parse(trimmed).ok()?.host_str()?.to_string()
        } else {
            // Drop any path, query or port the user pasted along
            let without_path = trimmed
                .split(['/', '?', '#'])
                .next()
                .unwrap_or(trimmed);
            without_path
                .split(':')
                .next()
                .unwrap_or(without_path)
                .to_string()
        };

        let host = Self::canonical_name(&host);
        if host.is_empty() || host.len() > 253 {
            return None;
        }

        let labels_valid = host.split('.').all(|label| {
            !label.is_empty()
                && label.len() <= 63
                && label
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        });

        if labels_valid {
            Some(host)
        } else {
            None
        }
    }

    /// Lowercase a DNS name and strip the root dot
    pub fn canonical_name(name: &str) -> String {
        name.trim().trim_end_matches('.').to_lowercase()
    }

    /// The `www.` twin of a domain: stripped when present, prepended otherwise
    pub fn www_counterpart(domain: &str) -> String {
        if let Some(stripped) = domain.strip_prefix("www.") {
            stripped.to_string()
        } else {
            format!("www.{domain}")
        }
    }

    /// Reversed-octet PTR query name, e.g. `4.3.2.1.in-addr.arpa`
    pub fn reverse_name(ip: Ipv4Addr) -> String {
        let [a, b, c, d] = ip.octets();
        format!("{d}.{c}.{b}.{a}.in-addr.arpa")
    }
}
