pub mod classifier;
pub mod config;
pub mod detector;
pub mod discovery;
pub mod domain_utils;
pub mod enrichment;
pub mod resolvers;
pub mod signatures;

pub use classifier::{Evidence, SignalKind};
pub use config::Config;
pub use detector::{CdnDetector, DetectError, DetectionResult};
pub use resolvers::{MockResolver, NetworkResolver, Resolver};
pub use signatures::{SignatureCatalog, SignatureEntry};
