use cdn_detect::config::{Config, DnsBackendKind};
use cdn_detect::{CdnDetector, DetectionResult, NetworkResolver, SignatureCatalog};
use clap::{Arg, Command};
use log::LevelFilter;
use std::process;
use std::str::FromStr;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    let matches = Command::new("cdn-detect")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Identify the CDN in front of a domain")
        .long_about(
            "cdn-detect correlates DNS aliases, ASN ownership, reverse DNS and HTTP \
             response headers to work out which CDN, if any, serves a domain.",
        )
        .arg(
            Arg::new("domains")
                .value_name("DOMAIN")
                .help("Domains or URLs to inspect")
                .num_args(1..)
                .required_unless_present_any(["generate-config", "list-providers"]),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("/etc/cdn-detect.yaml"),
        )
        .arg(
            Arg::new("generate-config")
                .long("generate-config")
                .value_name("FILE")
                .help("Write a default configuration file and exit")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("catalog")
                .long("catalog")
                .value_name("FILE")
                .help("YAML signature catalog to use instead of the built-in one")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("list-providers")
                .long("list-providers")
                .help("List the providers in the signature catalog and exit")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .help("Print results as JSON")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("timeout")
                .long("timeout")
                .value_name("SECONDS")
                .help("Per-lookup timeout")
                .value_parser(clap::value_parser!(u64).range(1..))
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("budget")
                .long("budget")
                .value_name("N")
                .help("Maximum DNS lookups while walking the CNAME chain")
                .value_parser(clap::value_parser!(usize))
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("dns-backend")
                .long("dns-backend")
                .value_name("BACKEND")
                .help("Where DNS questions go: doh or system")
                .value_parser(["doh", "system"])
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable debug logging for every lookup")
                .action(clap::ArgAction::SetTrue),
        )
        .get_matches();

    if let Some(generate_path) = matches.get_one::<String>("generate-config") {
        generate_default_config(generate_path);
        return;
    }

    let config_path = matches
        .get_one::<String>("config")
        .map(String::as_str)
        .unwrap_or("/etc/cdn-detect.yaml");

    let mut config = match load_config(config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            process::exit(1);
        }
    };

    // Initialize logger: --verbose wins over the configured level
    let log_level = if matches.get_flag("verbose") {
        LevelFilter::Debug
    } else {
        config
            .logging
            .as_ref()
            .and_then(|l| LevelFilter::from_str(&l.level).ok())
            .unwrap_or(LevelFilter::Info)
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();

    if let Some(timeout) = matches.get_one::<u64>("timeout") {
        config.resolvers.timeout_seconds = *timeout;
    }
    if let Some(budget) = matches.get_one::<usize>("budget") {
        config.discovery.lookup_budget = *budget;
    }
    if let Some(backend) = matches.get_one::<String>("dns-backend") {
        match DnsBackendKind::from_str(backend) {
            Ok(kind) => config.resolvers.dns_backend = kind,
            Err(e) => {
                eprintln!("❌ {e}");
                process::exit(2);
            }
        }
    }
    if let Some(catalog) = matches.get_one::<String>("catalog") {
        config.catalog_path = Some(catalog.clone());
    }

    if let Err(e) = config.validate() {
        eprintln!("❌ Invalid configuration: {e}");
        process::exit(1);
    }

    let catalog = match load_catalog(&config) {
        Ok(catalog) => Arc::new(catalog),
        Err(e) => {
            eprintln!("❌ Failed to load signature catalog: {e}");
            process::exit(1);
        }
    };

    if matches.get_flag("list-providers") {
        print_providers(&catalog);
        return;
    }

    let resolver = match NetworkResolver::new(&config.resolvers) {
        Ok(resolver) => resolver,
        Err(e) => {
            eprintln!("❌ Failed to set up resolvers: {e}");
            process::exit(1);
        }
    };

    let detector =
        CdnDetector::new(resolver, catalog).with_lookup_budget(config.discovery.lookup_budget);

    let domains: Vec<&String> = matches
        .get_many::<String>("domains")
        .map(|values| values.collect())
        .unwrap_or_default();

    let json = matches.get_flag("json");
    let mut results = Vec::new();
    let mut failures = 0;

    for domain in domains {
        match detector.detect(domain).await {
            Ok(result) => {
                if !json {
                    print_result(&result);
                }
                results.push(result);
            }
            Err(e) => {
                // Distinct from "no CDN detected": the detection itself could not run
                failures += 1;
                eprintln!("❌ Detection failed for {domain}: {e}");
            }
        }
    }

    if json {
        match serde_json::to_string_pretty(&results) {
            Ok(output) => println!("{output}"),
            Err(e) => {
                eprintln!("❌ Failed to serialize results: {e}");
                process::exit(1);
            }
        }
    }

    if failures > 0 {
        process::exit(1);
    }
}

fn load_config(path: &str) -> anyhow::Result<Config> {
    if std::path::Path::new(path).exists() {
        Config::from_file(path)
    } else {
        log::debug!("Configuration file '{path}' not found, using default configuration");
        Ok(Config::default())
    }
}

fn load_catalog(config: &Config) -> anyhow::Result<SignatureCatalog> {
    match &config.catalog_path {
        Some(path) => {
            let catalog = SignatureCatalog::load_from_file(path)?;
            log::info!("Loaded {} providers from {path}", catalog.len());
            Ok(catalog)
        }
        None => Ok(SignatureCatalog::default()),
    }
}

fn generate_default_config(path: &str) {
    let config = Config::default();
    match config.to_file(path) {
        Ok(()) => {
            println!("Default configuration written to: {path}");
            println!("Please edit the configuration file to suit your needs.");
        }
        Err(e) => {
            eprintln!("Error writing configuration file: {e}");
            process::exit(1);
        }
    }
}

fn print_providers(catalog: &SignatureCatalog) {
    println!("📋 Signature catalog ({} providers)", catalog.len());
    println!("═══════════════════════════════════════");
    for entry in catalog.entries() {
        println!("  {}", entry.provider);
        if !entry.asns.is_empty() {
            let asns: Vec<String> = entry.asns.iter().map(|a| format!("AS{a}")).collect();
            println!("    ASNs:     {}", asns.join(", "));
        }
        if !entry.domain_suffixes.is_empty() {
            let suffixes: Vec<&str> = entry.domain_suffixes.iter().map(String::as_str).collect();
            println!("    Domains:  {}", suffixes.join(", "));
        }
        if !entry.header_names.is_empty() {
            let headers: Vec<&str> = entry.header_names.iter().map(String::as_str).collect();
            println!("    Headers:  {}", headers.join(", "));
        }
        if !entry.server_tokens.is_empty() {
            let tokens: Vec<&str> = entry.server_tokens.iter().map(String::as_str).collect();
            println!("    Server:   {}", tokens.join(", "));
        }
    }
}

fn print_result(result: &DetectionResult) {
    println!("🔍 {}", result.domain);
    match &result.cdn_provider {
        Some(provider) => {
            println!(
                "  ✅ CDN: {provider} ({}% confidence)",
                result.confidence_percent()
            );
        }
        None => println!("  ➖ No CDN detected"),
    }

    let discovery = &result.raw.discovery;
    let ips: Vec<String> = discovery.ips.iter().map(|ip| ip.to_string()).collect();
    println!(
        "  IPs: {}",
        if ips.is_empty() {
            "none".to_string()
        } else {
            ips.join(", ")
        }
    );
    println!("  Hostnames: {}", discovery.hostnames_visited.join(" → "));

    if !result.evidence.is_empty() {
        println!("  Evidence:");
        for evidence in &result.evidence {
            println!(
                "    • [{}] {} +{}: {}",
                evidence.signal, evidence.provider, evidence.weight, evidence.message
            );
        }
    }

    if result.provider_scores.len() > 1 {
        println!("  Scores:");
        for score in &result.provider_scores {
            println!("    {:<24} {:>4}", score.provider, score.weight);
        }
    }
    println!();
}
