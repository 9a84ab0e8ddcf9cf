//! Shared types, error model, and configuration for the ads.txt crawler.
//!
//! This crate is the foundation depended on by all other adstxt crates.
//! It provides:
//! - [`AdsTxtError`] — the unified error type
//! - Domain types ([`AdsRecord`], [`Domain`], [`FetchOutcome`], ...)
//! - Validated runtime settings ([`Settings`])

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{DEFAULT_MAX_CONCURRENT_FETCHES, DiscoverySettings, Settings, SettingsBuilder};
pub use error::{AdsTxtError, Result};
pub use types::{
    AdsRecord, AdsVariable, Domain, FetchOutcome, ParsedLine, Relationship, SupplierRecord,
};
