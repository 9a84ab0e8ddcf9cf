//! Reconciliation of fetch outcomes against persisted state.
//!
//! Records are never deleted: a record missing from the latest file is
//! deactivated, and one that reappears is reactivated with its original
//! `first_seen` intact. Re-applying the same outcome performs no writes.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use tracing::{instrument, warn};

use adstxt_shared::{AdsRecord, AdsTxtError, AdsVariable, FetchOutcome, ParsedLine, Result};
use adstxt_storage::Store;

use crate::parser;

/// Apply one fetch outcome to the store.
///
/// The domain row must already exist (viability checking creates it);
/// a missing row is an invariant violation, not a skippable condition.
/// Individual record/variable write failures are logged and skipped so
/// one bad row cannot sink the rest of the file.
#[instrument(skip_all, fields(domain = %outcome.domain))]
pub async fn reconcile(store: &dyn Store, outcome: &FetchOutcome) -> Result<()> {
    let Some(domain) = store.get_domain(&outcome.domain).await? else {
        return Err(AdsTxtError::invariant(format!(
            "no domain row for {}",
            outcome.domain
        )));
    };

    if !outcome.adstxt_present || outcome.lines.is_empty() {
        store
            .update_domain(&outcome.domain, outcome.scraped_at, false)
            .await?;
        return Ok(());
    }
    store
        .update_domain(&outcome.domain, outcome.scraped_at, true)
        .await?;

    let mut seen: HashSet<AdsRecord> = HashSet::new();
    for line in &outcome.lines {
        match parser::parse(line) {
            Some(ParsedLine::Record(key)) => {
                // Duplicate declarations within one file collapse to one.
                if !seen.insert(key.clone()) {
                    continue;
                }
                if let Err(error) = apply_record(store, &domain.id, &key, outcome.scraped_at).await
                {
                    warn!(%error, supplier = %key.supplier_domain, pub_id = %key.pub_id, "skipping record");
                }
            }
            Some(ParsedLine::Variable(variable)) => {
                if let Err(error) = apply_variable(store, &domain.id, &variable).await {
                    warn!(%error, key = %variable.key, "skipping variable");
                }
            }
            None => {}
        }
    }

    // Active records that the latest file no longer declares.
    for stale in store.active_record_keys(&domain.id).await? {
        if !seen.contains(&stale) {
            store.set_record_active(&domain.id, &stale, false).await?;
        }
    }

    Ok(())
}

async fn apply_record(
    store: &dyn Store,
    domain_id: &str,
    key: &AdsRecord,
    scraped_at: DateTime<Utc>,
) -> Result<()> {
    match store.find_record(domain_id, key).await? {
        None => store.insert_record(domain_id, key, scraped_at).await,
        Some(existing) if !existing.active => store.set_record_active(domain_id, key, true).await,
        Some(_) => Ok(()),
    }
}

async fn apply_variable(store: &dyn Store, domain_id: &str, variable: &AdsVariable) -> Result<()> {
    match store.find_variable(domain_id, &variable.key).await? {
        Some(existing) if existing == variable.value => Ok(()),
        _ => {
            store
                .upsert_variable(domain_id, &variable.key, &variable.value)
                .await
        }
    }
}
