//! SQL migration definitions for the adstxt database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a set of SQL statements executed as a batch.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema: domains, records, variables",
        sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- One row per domain ever checked for viability. Never deleted.
-- Full domain names may not exceed 255 chars (RFC 1034 §3.1).
CREATE TABLE IF NOT EXISTS domains (
    id             TEXT PRIMARY KEY,
    name           TEXT NOT NULL UNIQUE,
    last_updated   TEXT NOT NULL,
    adstxt_present INTEGER
);

-- Supplier records. Disappearance flips active off; rows are never deleted.
CREATE TABLE IF NOT EXISTS records (
    id              TEXT PRIMARY KEY,
    domain_id       TEXT NOT NULL REFERENCES domains(id),
    supplier_domain TEXT NOT NULL,
    pub_id          TEXT NOT NULL,
    relationship    TEXT NOT NULL,
    cert_authority  TEXT,
    first_seen      TEXT NOT NULL,
    active          INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_records_domain_active ON records(domain_id, active);
CREATE INDEX IF NOT EXISTS idx_records_key
    ON records(domain_id, supplier_domain, pub_id, relationship);

-- Declared ads.txt variables, one row per (domain, key).
CREATE TABLE IF NOT EXISTS variables (
    id        TEXT PRIMARY KEY,
    domain_id TEXT NOT NULL REFERENCES domains(id),
    key       TEXT NOT NULL,
    value     TEXT NOT NULL,
    UNIQUE(domain_id, key)
);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
