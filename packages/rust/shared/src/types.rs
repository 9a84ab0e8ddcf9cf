//! Core domain types for the ads.txt crawler.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Relationship
// ---------------------------------------------------------------------------

/// The authorization type a supplier holds for a publisher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Relationship {
    Direct,
    Reseller,
}

impl Relationship {
    /// Canonical lowercase form, as stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Reseller => "reseller",
        }
    }
}

impl std::fmt::Display for Relationship {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Relationship {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "direct" => Ok(Self::Direct),
            "reseller" => Ok(Self::Reseller),
            other => Err(format!("unknown relationship: {other}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Parsed lines
// ---------------------------------------------------------------------------

/// A single supplier declaration parsed from an ads.txt line.
///
/// This is also the composite identity key used for deduplication: two
/// records are the same iff all four fields match (supplier domains are
/// lowercased at parse time, so the comparison is case-insensitive there).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AdsRecord {
    /// Domain of the advertising system, lowercased.
    pub supplier_domain: String,
    /// Publisher account ID, case preserved.
    pub pub_id: String,
    /// Direct or reseller.
    pub relationship: Relationship,
    /// Optional certification authority ID.
    pub cert_authority: Option<String>,
}

/// A `key=value` variable parsed from an ads.txt line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdsVariable {
    pub key: String,
    /// Arbitrary-length value; may itself contain `=`.
    pub value: String,
}

/// One of the two meaningful shapes an ads.txt line can take.
/// Lines that are neither (comments, malformed rows) parse to nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedLine {
    Record(AdsRecord),
    Variable(AdsVariable),
}

// ---------------------------------------------------------------------------
// Persisted entities
// ---------------------------------------------------------------------------

/// A crawled (or crawl-candidate) domain, one row per domain name ever
/// checked for viability. Never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Domain {
    /// Unique row identifier (UUID v7).
    pub id: String,
    /// Registrable domain name. Unique.
    pub name: String,
    /// When the domain was last reconciled. Only ever moves forward;
    /// set to the Unix epoch at creation so the first crawl always runs.
    pub last_updated: DateTime<Utc>,
    /// Tri-state: `None` until the first fetch completes.
    pub adstxt_present: Option<bool>,
}

/// A supplier record persisted for a domain. Rows are never deleted;
/// disappearance from the ads.txt file only flips `active` off.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupplierRecord {
    /// Unique row identifier (UUID v7).
    pub id: String,
    /// Owning domain row.
    pub domain_id: String,
    /// Composite identity within the domain.
    pub key: AdsRecord,
    /// Set once at first observation, never changed across reactivations.
    pub first_seen: DateTime<Utc>,
    /// Whether the record appeared in the most recent crawl.
    pub active: bool,
}

// ---------------------------------------------------------------------------
// FetchOutcome
// ---------------------------------------------------------------------------

/// The immutable result of one fetch attempt for a domain, successful or
/// not. Produced by the fetch engine, consumed once by reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOutcome {
    pub domain: String,
    pub scraped_at: DateTime<Utc>,
    pub adstxt_present: bool,
    /// Raw text lines in file order; empty when unprocessable.
    pub lines: Vec<String>,
}

impl FetchOutcome {
    /// An outcome for a domain whose ads.txt could not be fetched or was
    /// not valid plaintext. Not an error from the caller's perspective.
    pub fn unprocessable(domain: &str) -> Self {
        Self {
            domain: domain.to_string(),
            scraped_at: Utc::now(),
            adstxt_present: false,
            lines: Vec::new(),
        }
    }

    /// A successful outcome carrying the file's non-empty lines.
    pub fn processed(domain: &str, lines: Vec<String>) -> Self {
        Self {
            domain: domain.to_string(),
            scraped_at: Utc::now(),
            adstxt_present: true,
            lines,
        }
    }
}
