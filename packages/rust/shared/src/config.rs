//! Runtime settings for the ads.txt crawler.
//!
//! The CLI layer owns option/env parsing; it hands the raw values to
//! [`SettingsBuilder`], which validates them into a [`Settings`] struct
//! before any crawl activity begins. Validation failures are fatal.

use std::path::PathBuf;

use crate::error::{AdsTxtError, Result};

/// Default ceiling for concurrent outbound fetches.
pub const DEFAULT_MAX_CONCURRENT_FETCHES: usize = 100;

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Validated startup configuration, consumed by the core.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Path to the local libSQL database file.
    pub db_path: PathBuf,
    /// Crawler identity string, sent as the HTTP User-Agent.
    pub crawler_tag: String,
    /// Ceiling for in-flight fetches.
    pub max_concurrent_fetches: usize,
    /// Where candidate domains come from.
    pub discovery: DiscoverySettings,
}

/// The selected domain-discovery mode. Exactly one must be configured.
#[derive(Debug, Clone)]
pub enum DiscoverySettings {
    /// Newline-delimited domain list read from a local file.
    File { path: PathBuf },
    /// Opaque query executed against a search/analytics backend.
    Query {
        endpoint: String,
        index: String,
        body: String,
    },
}

// ---------------------------------------------------------------------------
// Builder / validation
// ---------------------------------------------------------------------------

/// Raw, unvalidated option values as collected by the CLI.
#[derive(Debug, Clone, Default)]
pub struct SettingsBuilder {
    pub db_path: Option<PathBuf>,
    pub crawler_tag: Option<String>,
    pub max_concurrent_fetches: Option<usize>,
    pub file_path: Option<PathBuf>,
    pub query_endpoint: Option<String>,
    pub query_index: Option<String>,
    pub query_body: Option<String>,
}

impl SettingsBuilder {
    /// Validate the collected options into [`Settings`].
    ///
    /// Rules: `db_path` and `crawler_tag` are required; exactly one
    /// discovery mode (file or query) must be selected, with all of its
    /// required parameters present.
    pub fn build(self) -> Result<Settings> {
        let db_path = self
            .db_path
            .ok_or_else(|| AdsTxtError::config("db_path is required"))?;
        let crawler_tag = self
            .crawler_tag
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AdsTxtError::config("crawler_tag is required"))?;

        let query_selected = self.query_endpoint.is_some()
            || self.query_index.is_some()
            || self.query_body.is_some();

        let discovery = match (self.file_path, query_selected) {
            (Some(_), true) => {
                return Err(AdsTxtError::config(
                    "both file and query discovery configured; choose exactly one",
                ));
            }
            (Some(path), false) => DiscoverySettings::File { path },
            (None, true) => {
                match (self.query_endpoint, self.query_index, self.query_body) {
                    (Some(endpoint), Some(index), Some(body)) => DiscoverySettings::Query {
                        endpoint,
                        index,
                        body,
                    },
                    (endpoint, index, body) => {
                        return Err(AdsTxtError::config(format!(
                            "query discovery incomplete: endpoint={endpoint:?}, \
                             index={index:?}, body set: {}",
                            body.is_some()
                        )));
                    }
                }
            }
            (None, false) => {
                return Err(AdsTxtError::config(
                    "no discovery source configured; set a file path or query options",
                ));
            }
        };

        Ok(Settings {
            db_path,
            crawler_tag,
            max_concurrent_fetches: self
                .max_concurrent_fetches
                .unwrap_or(DEFAULT_MAX_CONCURRENT_FETCHES),
            discovery,
        })
    }
}
