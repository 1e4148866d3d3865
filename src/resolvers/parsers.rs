//! Parsers for the three upstream response formats.

use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;

use super::{AsnField, AsnInfo, DnsAnswer, Headers, LookupError, Source};

lazy_static! {
    static ref ASN_PREFIX: Regex = Regex::new(r"^(?i)AS(\d+)(?:\s+(.*))?$").unwrap();
}

#[derive(Debug, Deserialize)]
struct DohResponse {
    #[serde(rename = "Status", default)]
    status: u32,
    #[serde(rename = "Answer", default)]
    answer: Vec<DohAnswer>,
}

#[derive(Debug, Deserialize)]
struct DohAnswer {
    #[serde(rename = "type")]
    record_type: u16,
    #[serde(default)]
    data: String,
}

#[derive(Debug, Deserialize)]
struct OrgResponse {
    org: Option<String>,
    country: Option<String>,
    city: Option<String>,
}

/// Parse a DNS-over-HTTPS JSON body into tagged answers.
///
/// NXDOMAIN and other non-zero rcodes yield an empty list.
pub fn parse_doh_response(body: &str) -> Result<Vec<DnsAnswer>, LookupError> {
    let response: DohResponse =
        serde_json::from_str(body).map_err(|e| LookupError::Malformed {
            source_kind: Source::Dns,
            reason: e.to_string(),
        })?;

    if response.status != 0 {
        log::debug!("DoH answer carried rcode {}", response.status);
        return Ok(Vec::new());
    }

    Ok(response
        .answer
        .into_iter()
        .map(|a| DnsAnswer {
            record_type: a.record_type,
            data: a.data.trim().trim_matches('"').to_string(),
        })
        .collect())
}

/// Split an `AS<number> <name>` organization string.
///
/// Returns the ASN state and the organization name without the AS token.
pub fn parse_org(org: Option<&str>) -> (AsnField, Option<String>) {
    let Some(org) = org.map(str::trim).filter(|o| !o.is_empty()) else {
        return (AsnField::Absent, None);
    };

    match ASN_PREFIX.captures(org) {
        Some(caps) => match caps[1].parse::<u32>() {
            Ok(number) => {
                let name = caps
                    .get(2)
                    .map(|m| m.as_str().trim().to_string())
                    .filter(|n| !n.is_empty());
                (AsnField::Number(number), name)
            }
            // Too many digits for a u32
            Err(_) => (AsnField::Unparsed(org.to_string()), Some(org.to_string())),
        },
        None => (AsnField::Unparsed(org.to_string()), Some(org.to_string())),
    }
}

/// Parse an ipinfo-style JSON body (`org`, `country`, `city`)
pub fn parse_org_response(body: &str) -> Result<AsnInfo, LookupError> {
    let response: OrgResponse =
        serde_json::from_str(body).map_err(|e| LookupError::Malformed {
            source_kind: Source::Asn,
            reason: e.to_string(),
        })?;

    let (asn, organization) = parse_org(response.org.as_deref());
    Ok(AsnInfo {
        asn,
        organization,
        country: response.country.filter(|c| !c.is_empty()),
        city: response.city.filter(|c| !c.is_empty()),
    })
}

/// Parse a raw `Key: Value` header dump.
///
/// Status lines, blank lines and lines without a colon are skipped. When a
/// name repeats, the last value wins.
pub fn parse_header_dump(text: &str) -> Headers {
    let mut headers = Headers::new();

    for line in text.lines() {
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() || line.starts_with("HTTP/") {
            continue;
        }

        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let name = name.trim();
        if name.is_empty() || name.contains(' ') {
            continue;
        }

        headers.insert(name.to_string(), value.trim().to_string());
    }

    headers
}
