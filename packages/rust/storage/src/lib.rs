//! libSQL storage layer for the ads.txt crawler.
//!
//! The [`Store`] trait is the narrow repository interface the reconciliation
//! engine runs against: composite-key lookups, upserts, and bulk reads of
//! active records. [`Storage`] implements it over a local libSQL database;
//! [`MemoryStore`] is an in-memory fake for tests.
//!
//! Only the single persistence worker writes here — serialization at the
//! call site is the concurrency-control mechanism, so no row locking is
//! needed.

mod memory;
mod migrations;

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database, params};
use uuid::Uuid;

use adstxt_shared::{AdsRecord, AdsTxtError, Domain, Result, SupplierRecord};

pub use memory::MemoryStore;

// ---------------------------------------------------------------------------
// Store trait
// ---------------------------------------------------------------------------

/// Repository interface over the three persisted entities.
#[async_trait]
pub trait Store: Send + Sync {
    /// Fetch the domain row by name, creating it with `last_updated` at the
    /// Unix epoch when absent (so the first crawl is always due).
    async fn ensure_domain(&self, name: &str) -> Result<Domain>;

    /// Fetch the domain row by name.
    async fn get_domain(&self, name: &str) -> Result<Option<Domain>>;

    /// Advance a domain's `last_updated` and set its ads.txt presence.
    async fn update_domain(
        &self,
        name: &str,
        last_updated: DateTime<Utc>,
        adstxt_present: bool,
    ) -> Result<()>;

    /// Look up a supplier record by its composite key within a domain.
    async fn find_record(
        &self,
        domain_id: &str,
        key: &AdsRecord,
    ) -> Result<Option<SupplierRecord>>;

    /// Insert a new supplier record, active, with the given `first_seen`.
    async fn insert_record(
        &self,
        domain_id: &str,
        key: &AdsRecord,
        first_seen: DateTime<Utc>,
    ) -> Result<()>;

    /// Flip the active flag of an existing record. `first_seen` is untouched.
    async fn set_record_active(
        &self,
        domain_id: &str,
        key: &AdsRecord,
        active: bool,
    ) -> Result<()>;

    /// All composite keys currently active for a domain.
    async fn active_record_keys(&self, domain_id: &str) -> Result<Vec<AdsRecord>>;

    /// Current value of a declared variable, if any.
    async fn find_variable(&self, domain_id: &str, key: &str) -> Result<Option<String>>;

    /// Insert a variable or overwrite its value in place.
    async fn upsert_variable(&self, domain_id: &str, key: &str, value: &str) -> Result<()>;
}

// ---------------------------------------------------------------------------
// libSQL implementation
// ---------------------------------------------------------------------------

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
}

impl Storage {
    /// Open or create a database at `path` and apply pending migrations.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| AdsTxtError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| AdsTxtError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| AdsTxtError::Storage(e.to_string()))?;

        let storage = Self { db, conn };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn.execute_batch(migration.sql).await.map_err(|e| {
                    AdsTxtError::Storage(format!("migration v{} failed: {e}", migration.version))
                })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }
}

#[async_trait]
impl Store for Storage {
    async fn ensure_domain(&self, name: &str) -> Result<Domain> {
        if let Some(domain) = self.get_domain(name).await? {
            return Ok(domain);
        }

        let domain = Domain {
            id: Uuid::now_v7().to_string(),
            name: name.to_string(),
            last_updated: DateTime::UNIX_EPOCH,
            adstxt_present: None,
        };
        self.conn
            .execute(
                "INSERT INTO domains (id, name, last_updated, adstxt_present)
                 VALUES (?1, ?2, ?3, NULL)",
                params![
                    domain.id.as_str(),
                    domain.name.as_str(),
                    domain.last_updated.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| AdsTxtError::Storage(e.to_string()))?;
        tracing::debug!(domain = name, "created domain row");
        Ok(domain)
    }

    async fn get_domain(&self, name: &str) -> Result<Option<Domain>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, name, last_updated, adstxt_present FROM domains WHERE name = ?1",
                params![name],
            )
            .await
            .map_err(|e| AdsTxtError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_domain(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(AdsTxtError::Storage(e.to_string())),
        }
    }

    async fn update_domain(
        &self,
        name: &str,
        last_updated: DateTime<Utc>,
        adstxt_present: bool,
    ) -> Result<()> {
        self.conn
            .execute(
                "UPDATE domains SET last_updated = ?1, adstxt_present = ?2 WHERE name = ?3",
                params![
                    last_updated.to_rfc3339(),
                    i64::from(adstxt_present),
                    name
                ],
            )
            .await
            .map_err(|e| AdsTxtError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn find_record(
        &self,
        domain_id: &str,
        key: &AdsRecord,
    ) -> Result<Option<SupplierRecord>> {
        // `IS` instead of `=` so a NULL cert_authority matches NULL.
        let mut rows = self
            .conn
            .query(
                "SELECT id, domain_id, supplier_domain, pub_id, relationship,
                        cert_authority, first_seen, active
                 FROM records
                 WHERE domain_id = ?1 AND supplier_domain = ?2 AND pub_id = ?3
                   AND relationship = ?4 AND cert_authority IS ?5",
                params![
                    domain_id,
                    key.supplier_domain.as_str(),
                    key.pub_id.as_str(),
                    key.relationship.as_str(),
                    key.cert_authority.as_deref(),
                ],
            )
            .await
            .map_err(|e| AdsTxtError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_record(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(AdsTxtError::Storage(e.to_string())),
        }
    }

    async fn insert_record(
        &self,
        domain_id: &str,
        key: &AdsRecord,
        first_seen: DateTime<Utc>,
    ) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO records (id, domain_id, supplier_domain, pub_id, relationship,
                                      cert_authority, first_seen, active)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1)",
                params![
                    Uuid::now_v7().to_string(),
                    domain_id,
                    key.supplier_domain.as_str(),
                    key.pub_id.as_str(),
                    key.relationship.as_str(),
                    key.cert_authority.as_deref(),
                    first_seen.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| AdsTxtError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn set_record_active(
        &self,
        domain_id: &str,
        key: &AdsRecord,
        active: bool,
    ) -> Result<()> {
        self.conn
            .execute(
                "UPDATE records SET active = ?1
                 WHERE domain_id = ?2 AND supplier_domain = ?3 AND pub_id = ?4
                   AND relationship = ?5 AND cert_authority IS ?6",
                params![
                    i64::from(active),
                    domain_id,
                    key.supplier_domain.as_str(),
                    key.pub_id.as_str(),
                    key.relationship.as_str(),
                    key.cert_authority.as_deref(),
                ],
            )
            .await
            .map_err(|e| AdsTxtError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn active_record_keys(&self, domain_id: &str) -> Result<Vec<AdsRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT supplier_domain, pub_id, relationship, cert_authority
                 FROM records WHERE domain_id = ?1 AND active = 1",
                params![domain_id],
            )
            .await
            .map_err(|e| AdsTxtError::Storage(e.to_string()))?;

        let mut keys = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            keys.push(AdsRecord {
                supplier_domain: row
                    .get::<String>(0)
                    .map_err(|e| AdsTxtError::Storage(e.to_string()))?,
                pub_id: row
                    .get::<String>(1)
                    .map_err(|e| AdsTxtError::Storage(e.to_string()))?,
                relationship: parse_relationship(&row, 2)?,
                cert_authority: row.get::<String>(3).ok(),
            });
        }
        Ok(keys)
    }

    async fn find_variable(&self, domain_id: &str, key: &str) -> Result<Option<String>> {
        let mut rows = self
            .conn
            .query(
                "SELECT value FROM variables WHERE domain_id = ?1 AND key = ?2",
                params![domain_id, key],
            )
            .await
            .map_err(|e| AdsTxtError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(
                row.get::<String>(0)
                    .map_err(|e| AdsTxtError::Storage(e.to_string()))?,
            )),
            Ok(None) => Ok(None),
            Err(e) => Err(AdsTxtError::Storage(e.to_string())),
        }
    }

    async fn upsert_variable(&self, domain_id: &str, key: &str, value: &str) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO variables (id, domain_id, key, value)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(domain_id, key) DO UPDATE SET value = excluded.value",
                params![Uuid::now_v7().to_string(), domain_id, key, value],
            )
            .await
            .map_err(|e| AdsTxtError::Storage(e.to_string()))?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

fn row_to_domain(row: &libsql::Row) -> Result<Domain> {
    Ok(Domain {
        id: row
            .get::<String>(0)
            .map_err(|e| AdsTxtError::Storage(e.to_string()))?,
        name: row
            .get::<String>(1)
            .map_err(|e| AdsTxtError::Storage(e.to_string()))?,
        last_updated: parse_timestamp(row, 2)?,
        adstxt_present: row.get::<i64>(3).ok().map(|v| v != 0),
    })
}

fn row_to_record(row: &libsql::Row) -> Result<SupplierRecord> {
    Ok(SupplierRecord {
        id: row
            .get::<String>(0)
            .map_err(|e| AdsTxtError::Storage(e.to_string()))?,
        domain_id: row
            .get::<String>(1)
            .map_err(|e| AdsTxtError::Storage(e.to_string()))?,
        key: AdsRecord {
            supplier_domain: row
                .get::<String>(2)
                .map_err(|e| AdsTxtError::Storage(e.to_string()))?,
            pub_id: row
                .get::<String>(3)
                .map_err(|e| AdsTxtError::Storage(e.to_string()))?,
            relationship: parse_relationship(row, 4)?,
            cert_authority: row.get::<String>(5).ok(),
        },
        first_seen: parse_timestamp(row, 6)?,
        active: row
            .get::<i64>(7)
            .map_err(|e| AdsTxtError::Storage(e.to_string()))?
            != 0,
    })
}

fn parse_timestamp(row: &libsql::Row, idx: i32) -> Result<DateTime<Utc>> {
    let s: String = row
        .get(idx)
        .map_err(|e| AdsTxtError::Storage(e.to_string()))?;
    chrono::DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&chrono::Utc))
        .map_err(|e| AdsTxtError::Storage(format!("invalid timestamp: {e}")))
}

fn parse_relationship(row: &libsql::Row, idx: i32) -> Result<adstxt_shared::Relationship> {
    let s: String = row
        .get(idx)
        .map_err(|e| AdsTxtError::Storage(e.to_string()))?;
    s.parse().map_err(AdsTxtError::Storage)
}

#[cfg(test)]
mod tests {
    use super::*;
    use adstxt_shared::Relationship;
    use chrono::Utc;

    fn reseller(supplier: &str, pub_id: &str) -> AdsRecord {
        AdsRecord {
            supplier_domain: supplier.into(),
            pub_id: pub_id.into(),
            relationship: Relationship::Reseller,
            cert_authority: None,
        }
    }

    /// Create a temp file storage for testing.
    async fn test_storage() -> Storage {
        let tmp = std::env::temp_dir().join(format!("adstxt_test_{}.db", Uuid::now_v7()));
        Storage::open(&tmp).await.expect("open test db")
    }

    #[tokio::test]
    async fn open_and_migrate() {
        let storage = test_storage().await;
        assert_eq!(storage.get_schema_version().await, 1);
    }

    #[tokio::test]
    async fn idempotent_migration() {
        let tmp = std::env::temp_dir().join(format!("adstxt_test_{}.db", Uuid::now_v7()));
        let s1 = Storage::open(&tmp).await.expect("first open");
        drop(s1);
        let s2 = Storage::open(&tmp).await.expect("second open");
        assert_eq!(s2.get_schema_version().await, 1);
    }

    #[tokio::test]
    async fn ensure_domain_creates_with_epoch() {
        let storage = test_storage().await;

        let created = storage.ensure_domain("example.com").await.expect("ensure");
        assert_eq!(created.name, "example.com");
        assert_eq!(created.last_updated, DateTime::UNIX_EPOCH);
        assert_eq!(created.adstxt_present, None);

        // Second ensure returns the same row, not a new one.
        let again = storage.ensure_domain("example.com").await.expect("ensure");
        assert_eq!(again.id, created.id);
    }

    #[tokio::test]
    async fn update_domain_advances_timestamp() {
        let storage = test_storage().await;
        storage.ensure_domain("example.com").await.unwrap();

        let now = Utc::now();
        storage
            .update_domain("example.com", now, true)
            .await
            .expect("update");

        let domain = storage
            .get_domain("example.com")
            .await
            .unwrap()
            .expect("domain exists");
        assert_eq!(domain.adstxt_present, Some(true));
        assert_eq!(domain.last_updated.timestamp(), now.timestamp());
    }

    #[tokio::test]
    async fn record_lifecycle() {
        let storage = test_storage().await;
        let domain = storage.ensure_domain("example.com").await.unwrap();
        let key = reseller("adtech.com", "10217");
        let first_seen = Utc::now();

        assert!(
            storage
                .find_record(&domain.id, &key)
                .await
                .unwrap()
                .is_none()
        );

        storage
            .insert_record(&domain.id, &key, first_seen)
            .await
            .expect("insert");

        let found = storage
            .find_record(&domain.id, &key)
            .await
            .unwrap()
            .expect("record exists");
        assert!(found.active);
        assert_eq!(found.first_seen.timestamp(), first_seen.timestamp());

        storage
            .set_record_active(&domain.id, &key, false)
            .await
            .expect("deactivate");
        let found = storage.find_record(&domain.id, &key).await.unwrap().unwrap();
        assert!(!found.active);
        // first_seen survives the flip
        assert_eq!(found.first_seen.timestamp(), first_seen.timestamp());

        assert!(storage.active_record_keys(&domain.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn composite_key_distinguishes_cert_authority() {
        let storage = test_storage().await;
        let domain = storage.ensure_domain("example.com").await.unwrap();

        let bare = reseller("advertising.com", "10316");
        let certified = AdsRecord {
            cert_authority: Some("7842df1d2fe2db34".into()),
            ..bare.clone()
        };

        storage.insert_record(&domain.id, &bare, Utc::now()).await.unwrap();
        storage
            .insert_record(&domain.id, &certified, Utc::now())
            .await
            .unwrap();

        // NULL-safe lookup finds each independently.
        let found_bare = storage.find_record(&domain.id, &bare).await.unwrap().unwrap();
        assert_eq!(found_bare.key.cert_authority, None);
        let found_cert = storage
            .find_record(&domain.id, &certified)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found_cert.key.cert_authority.as_deref(), Some("7842df1d2fe2db34"));

        assert_eq!(storage.active_record_keys(&domain.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn variable_upsert_overwrites_value() {
        let storage = test_storage().await;
        let domain = storage.ensure_domain("example.com").await.unwrap();

        assert!(
            storage
                .find_variable(&domain.id, "contact")
                .await
                .unwrap()
                .is_none()
        );

        storage
            .upsert_variable(&domain.id, "contact", "ads@example.com")
            .await
            .unwrap();
        assert_eq!(
            storage.find_variable(&domain.id, "contact").await.unwrap(),
            Some("ads@example.com".into())
        );

        storage
            .upsert_variable(&domain.id, "contact", "adops@example.com")
            .await
            .unwrap();
        assert_eq!(
            storage.find_variable(&domain.id, "contact").await.unwrap(),
            Some("adops@example.com".into())
        );
    }
}
