//! Crawl-cycle orchestration.
//!
//! A cycle asks discovery for candidates, filters them down to viable
//! domains, fans the fetches out across spawned tasks, and funnels every
//! outcome through a bounded channel into a single persistence worker.
//! The bounded channel applies backpressure: when persistence lags, fetch
//! tasks suspend on `send` instead of piling outcomes up in memory.

use std::sync::{Arc, LazyLock};

use chrono::{Duration, Utc};
use regex::Regex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use adstxt_discovery::DomainSource;
use adstxt_fetch::Fetcher;
use adstxt_shared::{AdsTxtError, FetchOutcome, Result};
use adstxt_storage::Store;

use crate::reconcile::reconcile;

/// Outcomes buffered between fetch tasks and the persistence worker.
const PERSISTENCE_QUEUE_CAPACITY: usize = 256;

/// A domain reconciled more recently than this is skipped for the cycle.
const REFRESH_INTERVAL_MINUTES: i64 = 360;

/// Syntactic check for registrable domain names. Hostnames with ports,
/// bare labels, and free-text junk from discovery all fail here.
static DOMAIN_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?\.)+[a-z]{2,}$")
        .expect("domain name pattern is valid")
});

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Drives crawl cycles: discovery, viability, fetch fan-out, persistence.
pub struct Orchestrator {
    store: Arc<dyn Store>,
    fetcher: Arc<Fetcher>,
    source: DomainSource,
}

impl Orchestrator {
    pub fn new(store: Arc<dyn Store>, fetcher: Fetcher, source: DomainSource) -> Self {
        Self {
            store,
            fetcher: Arc::new(fetcher),
            source,
        }
    }

    /// Run crawl cycles back to back until the token is cancelled.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!("shutdown requested, stopping crawl loop");
                    return Ok(());
                }
                result = self.run_once() => result?,
            }
        }
    }

    /// One full crawl cycle over the current discovery list.
    #[instrument(skip_all)]
    pub async fn run_once(&self) -> Result<()> {
        let candidates = self.source.domains().await?;

        let mut viable = Vec::new();
        for name in candidates {
            if self.is_viable(&name).await? {
                viable.push(name);
            }
        }
        info!(count = viable.len(), "starting crawl cycle");

        self.crawl(viable).await
    }

    /// A domain is worth fetching when its name is syntactically valid and
    /// its last reconciliation is older than the refresh interval. The
    /// `ensure_domain` call doubles as row creation, so every domain that
    /// reaches the fetch stage has a row for reconciliation to find.
    async fn is_viable(&self, name: &str) -> Result<bool> {
        if !DOMAIN_NAME.is_match(name) {
            debug!(name, "rejected syntactically invalid domain");
            return Ok(false);
        }
        let domain = self.store.ensure_domain(name).await?;
        Ok(Utc::now() - domain.last_updated > Duration::minutes(REFRESH_INTERVAL_MINUTES))
    }

    async fn crawl(&self, domains: Vec<String>) -> Result<()> {
        let (tx, mut rx) = mpsc::channel::<FetchOutcome>(PERSISTENCE_QUEUE_CAPACITY);

        // Writes are serialized through one worker so libsql never sees
        // concurrent writers. Reconcile failures cost only that domain.
        let store = Arc::clone(&self.store);
        let worker = tokio::spawn(async move {
            while let Some(outcome) = rx.recv().await {
                if let Err(error) = reconcile(store.as_ref(), &outcome).await {
                    error!(%error, domain = %outcome.domain, "failed to persist fetch outcome");
                }
            }
        });

        let mut fetches = Vec::with_capacity(domains.len());
        for domain in domains {
            let fetcher = Arc::clone(&self.fetcher);
            let tx = tx.clone();
            fetches.push(tokio::spawn(async move {
                let outcome = fetcher.fetch(&domain).await;
                // Send only fails when the worker is gone; nothing to do.
                let _ = tx.send(outcome).await;
            }));
        }
        // The worker drains until every fetch task drops its sender.
        drop(tx);

        for handle in fetches {
            if let Err(error) = handle.await {
                // Its last_updated was never advanced, so the domain is
                // picked up again next cycle.
                warn!(%error, "fetch task panicked, domain deferred to next cycle");
            }
        }

        worker
            .await
            .map_err(|e| AdsTxtError::invariant(format!("persistence worker panicked: {e}")))
    }
}

/// One-off fetch and reconcile of a single domain, bypassing discovery
/// and the viability window.
#[instrument(skip_all, fields(domain = %name))]
pub async fn crawl_single(store: &dyn Store, fetcher: &Fetcher, name: &str) -> Result<()> {
    store.ensure_domain(name).await?;
    let outcome = fetcher.fetch(name).await;
    info!(adstxt_present = outcome.adstxt_present, lines = outcome.lines.len(), "fetched");
    reconcile(store, &outcome).await
}
