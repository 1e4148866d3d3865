use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

/// Known fingerprints for one CDN provider
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SignatureEntry {
    pub provider: String,
    #[serde(default)]
    pub asns: BTreeSet<u32>,
    #[serde(default)]
    pub domain_suffixes: BTreeSet<String>,
    #[serde(default)]
    pub header_names: BTreeSet<String>,
    #[serde(default)]
    pub server_tokens: BTreeSet<String>,
}

impl SignatureEntry {
    pub fn new(provider: &str) -> Self {
        Self {
            provider: provider.to_string(),
            asns: BTreeSet::new(),
            domain_suffixes: BTreeSet::new(),
            header_names: BTreeSet::new(),
            server_tokens: BTreeSet::new(),
        }
    }

    pub fn with_asns(mut self, asns: &[u32]) -> Self {
        self.asns.extend(asns.iter().copied());
        self
    }

    pub fn with_suffixes(mut self, suffixes: &[&str]) -> Self {
        self.domain_suffixes
            .extend(suffixes.iter().map(|s| s.to_lowercase()));
        self
    }

    pub fn with_headers(mut self, headers: &[&str]) -> Self {
        self.header_names
            .extend(headers.iter().map(|h| h.to_string()));
        self
    }

    pub fn with_server_tokens(mut self, tokens: &[&str]) -> Self {
        self.server_tokens
            .extend(tokens.iter().map(|t| t.to_lowercase()));
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("failed to read catalog file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse catalog file: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("duplicate provider in catalog: {0}")]
    DuplicateProvider(String),
    #[error("catalog entry with empty provider name")]
    EmptyProvider,
}

#[derive(Debug, Serialize, Deserialize)]
struct CatalogFile {
    providers: Vec<SignatureEntry>,
}

/// Ordered, read-only set of provider signatures.
///
/// Iteration order matters: the classifier breaks score ties in favour of
/// the provider listed first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureCatalog {
    entries: Vec<SignatureEntry>,
}

impl SignatureCatalog {
    pub fn new(entries: Vec<SignatureEntry>) -> Result<Self, CatalogError> {
        let mut seen = HashSet::new();
        for entry in &entries {
            if entry.provider.trim().is_empty() {
                return Err(CatalogError::EmptyProvider);
            }
            if !seen.insert(entry.provider.as_str()) {
                return Err(CatalogError::DuplicateProvider(entry.provider.clone()));
            }
        }
        Ok(Self { entries })
    }

    pub fn load_from_file(path: &str) -> Result<Self, CatalogError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile = serde_yaml::from_str(content)?;
        let entries = file
            .providers
            .into_iter()
            .map(|mut entry| {
                // Matching against hostnames and server values is done lowercase
                entry.domain_suffixes = entry
                    .domain_suffixes
                    .iter()
                    .map(|s| s.to_lowercase())
                    .collect();
                entry.server_tokens = entry
                    .server_tokens
                    .iter()
                    .map(|t| t.to_lowercase())
                    .collect();
                entry
            })
            .collect();
        Self::new(entries)
    }

    pub fn to_yaml(&self) -> Result<String, CatalogError> {
        let file = CatalogFile {
            providers: self.entries.clone(),
        };
        Ok(serde_yaml::to_string(&file)?)
    }

    pub fn entries(&self) -> &[SignatureEntry] {
        &self.entries
    }

    pub fn get(&self, provider: &str) -> Option<&SignatureEntry> {
        self.entries.iter().find(|e| e.provider == provider)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for SignatureCatalog {
    fn default() -> Self {
        let entries = vec![
            SignatureEntry::new("Cloudflare")
                .with_asns(&[13335, 209242])
                .with_suffixes(&["cloudflare.com", "cloudflare.net", "cloudflare-dns.com"])
                .with_headers(&["CF-RAY", "CF-Cache-Status", "cf-ray", "cf-cache-status"])
                .with_server_tokens(&["cloudflare"]),
            SignatureEntry::new("Fastly")
                .with_asns(&[54113])
                .with_suffixes(&["fastly.net", "fastlylb.net", "fastly.com"])
                .with_headers(&[
                    "X-Fastly",
                    "X-Fastly-Request-ID",
                    "Fastly-Debug-Digest",
                    "x-fastly-request-id",
                ])
                .with_server_tokens(&["fastly"]),
            SignatureEntry::new("Akamai")
                .with_asns(&[20940, 16625, 16702, 21342, 32787])
                .with_suffixes(&[
                    "akamai.net",
                    "akamaiedge.net",
                    "akamaihd.net",
                    "akamaitechnologies.com",
                    "edgekey.net",
                    "edgesuite.net",
                ])
                .with_headers(&["X-Akamai-Transformed", "Akamai-Cache-Status", "Akamai-GRN"])
                .with_server_tokens(&["akamaighost", "akamainetstorage"]),
            SignatureEntry::new("Amazon CloudFront")
                .with_asns(&[16509, 14618])
                .with_suffixes(&["cloudfront.net"])
                .with_headers(&["X-Amz-Cf-Id", "X-Amz-Cf-Pop", "x-amz-cf-id", "x-amz-cf-pop"])
                .with_server_tokens(&["cloudfront"]),
            SignatureEntry::new("Google Cloud CDN")
                .with_asns(&[15169, 396982])
                .with_suffixes(&["googleusercontent.com", "googlehosted.com"])
                .with_headers(&["X-GUploader-UploadID"])
                .with_server_tokens(&["google frontend", "gws"]),
            SignatureEntry::new("Microsoft Azure CDN")
                .with_asns(&[8075])
                .with_suffixes(&["azureedge.net", "azurefd.net", "msecnd.net", "trafficmanager.net"])
                .with_headers(&["X-Azure-Ref", "X-MSEdge-Ref", "x-azure-ref"])
                .with_server_tokens(&[]),
            SignatureEntry::new("Edgio")
                .with_asns(&[15133])
                .with_suffixes(&["edgecastcdn.net", "systemcdn.net", "edgio.net"])
                .with_headers(&["X-EC-Debug"])
                .with_server_tokens(&["ecs (", "ecacc"]),
            SignatureEntry::new("StackPath")
                .with_asns(&[33438, 12989])
                .with_suffixes(&["stackpathdns.com", "stackpathcdn.com", "hwcdn.net"])
                .with_headers(&["X-HW"])
                .with_server_tokens(&["stackpath"]),
            SignatureEntry::new("Sucuri")
                .with_asns(&[30148])
                .with_suffixes(&["sucuri.net"])
                .with_headers(&["X-Sucuri-ID", "X-Sucuri-Cache"])
                .with_server_tokens(&["sucuri"]),
            SignatureEntry::new("Imperva")
                .with_asns(&[19551])
                .with_suffixes(&["incapdns.net", "impervadns.net"])
                .with_headers(&["X-Iinfo", "X-CDN"])
                .with_server_tokens(&[]),
            SignatureEntry::new("Bunny CDN")
                .with_asns(&[200325])
                .with_suffixes(&["b-cdn.net", "bunnycdn.com"])
                .with_headers(&["CDN-PullZone", "CDN-RequestId", "cdn-pullzone"])
                .with_server_tokens(&["bunnycdn"]),
            SignatureEntry::new("CDN77")
                .with_asns(&[60068])
                .with_suffixes(&["cdn77.org", "cdn77.net", "rsc.cdn77.org"])
                .with_headers(&["X-77-Cache", "X-77-POP"])
                .with_server_tokens(&["cdn77"]),
            SignatureEntry::new("Gcore")
                .with_asns(&[199524])
                .with_suffixes(&["gcdn.co", "gcorelabs.net"])
                .with_headers(&["X-ID-FE"])
                .with_server_tokens(&["gcore"]),
            SignatureEntry::new("KeyCDN")
                .with_suffixes(&["kxcdn.com"])
                .with_headers(&["X-Edge-Location"])
                .with_server_tokens(&["keycdn-engine"]),
        ];

        // Built-in entries are unique by construction
        Self { entries }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_catalog_has_unique_providers() {
        let catalog = SignatureCatalog::default();
        let rebuilt = SignatureCatalog::new(catalog.entries().to_vec());
        assert!(rebuilt.is_ok());
        assert!(catalog.get("Cloudflare").unwrap().asns.contains(&13335));
        assert!(catalog
            .get("Fastly")
            .unwrap()
            .domain_suffixes
            .contains("fastly.net"));
    }

    #[test]
    fn test_duplicate_provider_rejected() {
        let entries = vec![SignatureEntry::new("Same"), SignatureEntry::new("Same")];
        assert!(matches!(
            SignatureCatalog::new(entries),
            Err(CatalogError::DuplicateProvider(name)) if name == "Same"
        ));
        assert!(matches!(
            SignatureCatalog::new(vec![SignatureEntry::new("  ")]),
            Err(CatalogError::EmptyProvider)
        ));
    }

    #[test]
    fn test_from_yaml_preserves_order_and_lowercases() {
        let yaml = r#"
providers:
  - provider: Zeta
    domain_suffixes: [Zeta-CDN.NET]
    server_tokens: [ZetaServer]
  - provider: Alpha
    asns: [64500]
    header_names: [X-Alpha-Cache]
"#;
        let catalog = SignatureCatalog::from_yaml(yaml).unwrap();
        let names: Vec<&str> = catalog
            .entries()
            .iter()
            .map(|e| e.provider.as_str())
            .collect();
        assert_eq!(names, vec!["Zeta", "Alpha"]);

        let zeta = catalog.get("Zeta").unwrap();
        assert!(zeta.domain_suffixes.contains("zeta-cdn.net"));
        assert!(zeta.server_tokens.contains("zetaserver"));

        // Header names keep their case
        let alpha = catalog.get("Alpha").unwrap();
        assert!(alpha.header_names.contains("X-Alpha-Cache"));
        assert!(alpha.domain_suffixes.is_empty());
    }

    #[test]
    fn test_yaml_round_trip_of_default() {
        let catalog = SignatureCatalog::default();
        let yaml = catalog.to_yaml().unwrap();
        assert_eq!(SignatureCatalog::from_yaml(&yaml).unwrap(), catalog);
    }
}
