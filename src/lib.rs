//! Concurrent username reconnaissance engine.
//!
//! A [`ScanCoordinator`] takes a catalog of services and a username, probes
//! every service through a bounded worker pool, and hands each
//! [`ScanResult`] to the caller as soon as it completes.

pub mod catalog;
pub mod classifier;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod metrics;
pub mod models;
pub mod prober;
pub mod transport;

pub use catalog::{default_catalog, load_catalog, parse_catalog};
pub use config::Config;
pub use coordinator::{ScanCoordinator, DEFAULT_CONCURRENCY_LIMIT};
pub use error::{CatalogError, ProbeError};
pub use models::{CatalogEntry, ProbeOutcome, ScanResult, ScanSummary, SiteCategory};
pub use prober::{ProbeSettings, Prober};
pub use transport::{HttpTransport, ReqwestTransport};
