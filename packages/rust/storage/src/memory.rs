//! In-memory [`Store`] implementation.
//!
//! A hash-map-backed fake with the same semantics as the libSQL storage,
//! used by reconciliation and orchestrator tests. It additionally counts
//! record- and variable-level writes so idempotence can be asserted.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use adstxt_shared::{AdsRecord, AdsTxtError, Domain, Result, SupplierRecord};

use crate::Store;

#[derive(Default)]
struct Inner {
    domains: HashMap<String, Domain>,
    /// Keyed by domain row id.
    records: HashMap<String, Vec<SupplierRecord>>,
    /// Keyed by (domain row id, variable key).
    variables: HashMap<(String, String), String>,
    /// Record/variable writes performed (domain timestamp updates excluded).
    write_count: usize,
}

/// In-memory store for tests.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of record/variable writes performed so far.
    pub async fn write_count(&self) -> usize {
        self.inner.lock().await.write_count
    }

    /// All supplier records for a domain name, in insertion order.
    pub async fn records_for(&self, name: &str) -> Vec<SupplierRecord> {
        let inner = self.inner.lock().await;
        let Some(domain) = inner.domains.get(name) else {
            return Vec::new();
        };
        inner.records.get(&domain.id).cloned().unwrap_or_default()
    }

    /// All variables for a domain name as (key, value) pairs.
    pub async fn variables_for(&self, name: &str) -> Vec<(String, String)> {
        let inner = self.inner.lock().await;
        let Some(domain) = inner.domains.get(name) else {
            return Vec::new();
        };
        let mut vars: Vec<(String, String)> = inner
            .variables
            .iter()
            .filter(|((domain_id, _), _)| domain_id == &domain.id)
            .map(|((_, key), value)| (key.clone(), value.clone()))
            .collect();
        vars.sort();
        vars
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn ensure_domain(&self, name: &str) -> Result<Domain> {
        let mut inner = self.inner.lock().await;
        let domain = inner
            .domains
            .entry(name.to_string())
            .or_insert_with(|| Domain {
                id: Uuid::now_v7().to_string(),
                name: name.to_string(),
                last_updated: DateTime::UNIX_EPOCH,
                adstxt_present: None,
            });
        Ok(domain.clone())
    }

    async fn get_domain(&self, name: &str) -> Result<Option<Domain>> {
        Ok(self.inner.lock().await.domains.get(name).cloned())
    }

    async fn update_domain(
        &self,
        name: &str,
        last_updated: DateTime<Utc>,
        adstxt_present: bool,
    ) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let domain = inner
            .domains
            .get_mut(name)
            .ok_or_else(|| AdsTxtError::Storage(format!("no domain row for {name}")))?;
        domain.last_updated = last_updated;
        domain.adstxt_present = Some(adstxt_present);
        Ok(())
    }

    async fn find_record(
        &self,
        domain_id: &str,
        key: &AdsRecord,
    ) -> Result<Option<SupplierRecord>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .records
            .get(domain_id)
            .and_then(|records| records.iter().find(|r| &r.key == key))
            .cloned())
    }

    async fn insert_record(
        &self,
        domain_id: &str,
        key: &AdsRecord,
        first_seen: DateTime<Utc>,
    ) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner
            .records
            .entry(domain_id.to_string())
            .or_default()
            .push(SupplierRecord {
                id: Uuid::now_v7().to_string(),
                domain_id: domain_id.to_string(),
                key: key.clone(),
                first_seen,
                active: true,
            });
        inner.write_count += 1;
        Ok(())
    }

    async fn set_record_active(
        &self,
        domain_id: &str,
        key: &AdsRecord,
        active: bool,
    ) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let record = inner
            .records
            .get_mut(domain_id)
            .and_then(|records| records.iter_mut().find(|r| &r.key == key))
            .ok_or_else(|| AdsTxtError::Storage(format!("no record for key {key:?}")))?;
        record.active = active;
        inner.write_count += 1;
        Ok(())
    }

    async fn active_record_keys(&self, domain_id: &str) -> Result<Vec<AdsRecord>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .records
            .get(domain_id)
            .map(|records| {
                records
                    .iter()
                    .filter(|r| r.active)
                    .map(|r| r.key.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn find_variable(&self, domain_id: &str, key: &str) -> Result<Option<String>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .variables
            .get(&(domain_id.to_string(), key.to_string()))
            .cloned())
    }

    async fn upsert_variable(&self, domain_id: &str, key: &str, value: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner
            .variables
            .insert((domain_id.to_string(), key.to_string()), value.to_string());
        inner.write_count += 1;
        Ok(())
    }
}
