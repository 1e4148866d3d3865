use serde::{Deserialize, Serialize};

use crate::discovery::DEFAULT_LOOKUP_BUDGET;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub resolvers: ResolverConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    /// YAML signature catalog replacing the built-in one
    pub catalog_path: Option<String>,
    pub logging: Option<LoggingConfig>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DnsBackendKind {
    Doh,
    System,
}

impl std::str::FromStr for DnsBackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "doh" => Ok(DnsBackendKind::Doh),
            "system" => Ok(DnsBackendKind::System),
            other => Err(format!("unknown DNS backend '{other}' (expected doh or system)")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    pub dns_backend: DnsBackendKind,
    pub doh_url: String,
    /// `{ip}` is replaced with the address being looked up
    pub asn_url: String,
    /// `{domain}` is replaced with the domain under test
    pub headers_url: String,
    pub timeout_seconds: u64,
    pub user_agent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    pub lookup_budget: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            dns_backend: DnsBackendKind::Doh,
            doh_url: "https://dns.google/resolve".to_string(),
            asn_url: "https://ipinfo.io/{ip}/json".to_string(),
            headers_url: "https://api.hackertarget.com/httpheaders/?q={domain}".to_string(),
            timeout_seconds: 5,
            user_agent: format!("cdn-detect/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            lookup_budget: DEFAULT_LOOKUP_BUDGET,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            resolvers: ResolverConfig::default(),
            discovery: DiscoveryConfig::default(),
            catalog_path: None,
            logging: Some(LoggingConfig {
                level: "info".to_string(),
            }),
        }
    }
}

impl Config {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_file(&self, path: &str) -> anyhow::Result<()> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.discovery.lookup_budget == 0 {
            anyhow::bail!("discovery.lookup_budget must be at least 1");
        }
        if self.resolvers.timeout_seconds == 0 {
            anyhow::bail!("resolvers.timeout_seconds must be at least 1");
        }
        if !self.resolvers.asn_url.contains("{ip}") {
            anyhow::bail!("resolvers.asn_url must contain an {{ip}} placeholder");
        }
        if !self.resolvers.headers_url.contains("{domain}") {
            anyhow::bail!("resolvers.headers_url must contain a {{domain}} placeholder");
        }
        Ok(())
    }
}
