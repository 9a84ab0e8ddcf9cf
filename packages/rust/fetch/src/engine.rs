//! The ads.txt fetch engine.
//!
//! [`Fetcher::fetch`] resolves every failure path into an unprocessable
//! [`FetchOutcome`] — callers never see an error. A shared counting
//! semaphore caps in-flight fetches; redirects are followed manually so
//! the chain can be validated against the original registrable root.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{CONTENT_TYPE, LOCATION, USER_AGENT};
use reqwest::{Client, redirect};
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};
use url::Url;

use adstxt_shared::{AdsTxtError, FetchOutcome, Result};

use crate::redirects;

/// Maximum fetch attempts per domain.
const MAX_ATTEMPTS: u32 = 5;

/// Per-attempt timeout.
const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(5);

/// Hop ceiling when following redirects manually.
const MAX_REDIRECT_HOPS: usize = 10;

/// Markers of mislabeled HTML error pages. 404 pages and the like often
/// ship without a correct Content-Type header, so the body is checked too.
const HTML_SENTINELS: [&str; 3] = ["<!doctype html", "<img", "<div class"];

// ---------------------------------------------------------------------------
// Fetcher
// ---------------------------------------------------------------------------

/// Concurrency-limited ads.txt fetcher, shared across all fetch tasks.
pub struct Fetcher {
    transport: HttpTransport,
    limiter: Arc<Semaphore>,
}

impl Fetcher {
    /// Create a fetcher with the given User-Agent and in-flight ceiling.
    pub fn new(user_agent: &str, max_concurrent: usize) -> Result<Self> {
        // Redirects are followed by hand so the chain can be validated.
        let client = Client::builder()
            .redirect(redirect::Policy::none())
            .build()
            .map_err(|e| AdsTxtError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            transport: HttpTransport {
                client,
                user_agent: user_agent.to_string(),
            },
            limiter: Arc::new(Semaphore::new(max_concurrent)),
        })
    }

    /// Fetch `http://<domain>/ads.txt`, suspending until a limiter slot is
    /// free. All failures degrade to an unprocessable outcome.
    #[instrument(skip_all, fields(domain = %domain))]
    pub async fn fetch(&self, domain: &str) -> FetchOutcome {
        let _permit = self.limiter.acquire().await.expect("limiter closed");
        fetch_from(&self.transport, domain).await
    }
}

// ---------------------------------------------------------------------------
// Attempt loop
// ---------------------------------------------------------------------------

/// One request-and-follow-redirects attempt per call; the retry loop in
/// [`fetch_from`] drives it.
trait Transport {
    async fn attempt(&self, url: &str) -> std::result::Result<Fetched, FetchFailure>;
}

async fn fetch_from<T: Transport>(transport: &T, domain: &str) -> FetchOutcome {
    let unprocessable = FetchOutcome::unprocessable(domain);
    let mut url = format!("http://{domain}/ads.txt");

    let mut fetched = None;
    for attempt in 0..MAX_ATTEMPTS {
        match tokio::time::timeout(ATTEMPT_TIMEOUT, transport.attempt(&url)).await {
            Ok(Ok(success)) => {
                fetched = Some(success);
                break;
            }
            // Wildcard certs without the root are common on CDN/static
            // hosts; passing through the www. subdomain normally
            // resolves these, so swap the target and keep looping.
            Ok(Err(FetchFailure::Certificate)) => {
                debug!(attempt, "certificate failure, switching to www variant");
                url = format!("http://www.{domain}/ads.txt");
            }
            Ok(Err(FetchFailure::Abort(reason))) => {
                debug!(attempt, reason, "aborting fetch");
                return unprocessable;
            }
            Ok(Err(FetchFailure::Disconnect)) => {
                debug!(attempt, "remote disconnected on us, retrying");
            }
            Ok(Err(FetchFailure::Transport(error))) => {
                warn!(attempt, error, "transport error, retrying");
            }
            Ok(Err(FetchFailure::Status(code))) => {
                debug!(attempt, code, "non-200 response, retrying");
            }
            Err(_elapsed) => {
                debug!(attempt, "fetch timeout, backing off and retrying");
                tokio::time::sleep(Duration::from_secs(u64::from(attempt * attempt))).await;
            }
        }
    }

    let Some(fetched) = fetched else {
        debug!("unable to fetch, max attempts reached");
        return unprocessable;
    };

    // Check we are still on the right domain after any redirects.
    if !fetched.chain.is_empty() {
        debug!(hops = fetched.chain.len(), "response used a redirect, validating chain");
        if !redirects::chain_stays_on_root(domain, &fetched.chain) {
            info!("invalid off-root redirect chain");
            return unprocessable;
        }
    }

    if !fetched
        .content_type
        .as_deref()
        .unwrap_or("")
        .contains("text/plain")
    {
        debug!(content_type = ?fetched.content_type, "non-plaintext content type");
        return unprocessable;
    }

    if HTML_SENTINELS.iter().any(|s| fetched.body.contains(s)) {
        debug!("HTML elements found in response body");
        return unprocessable;
    }

    let lines: Vec<String> = fetched
        .body
        .split('\n')
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.is_empty())
        .map(str::to_owned)
        .collect();

    FetchOutcome::processed(domain, lines)
}

/// A terminal 200 response with its redirect history.
struct Fetched {
    chain: Vec<Url>,
    content_type: Option<String>,
    body: String,
}

// ---------------------------------------------------------------------------
// HTTP transport
// ---------------------------------------------------------------------------

/// The real transport: follows redirects by hand, recording each location,
/// until a terminal response is reached.
struct HttpTransport {
    client: Client,
    user_agent: String,
}

impl Transport for HttpTransport {
    async fn attempt(&self, url: &str) -> std::result::Result<Fetched, FetchFailure> {
        let mut current = Url::parse(url)
            .map_err(|e| FetchFailure::Abort(format!("invalid url {url}: {e}")))?;
        let mut chain: Vec<Url> = Vec::new();

        for _hop in 0..MAX_REDIRECT_HOPS {
            let response = self
                .client
                .get(current.clone())
                .header(USER_AGENT, &self.user_agent)
                .send()
                .await
                .map_err(|e| classify(&e))?;

            let status = response.status();
            if status.is_redirection() {
                let Some(location) = response
                    .headers()
                    .get(LOCATION)
                    .and_then(|v| v.to_str().ok())
                else {
                    return Err(FetchFailure::Status(status.as_u16()));
                };
                let next = current
                    .join(location)
                    .map_err(|e| FetchFailure::Abort(format!("bad redirect location: {e}")))?;
                chain.push(next.clone());
                current = next;
                continue;
            }

            if status.as_u16() == 200 {
                let content_type = response
                    .headers()
                    .get(CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_owned);
                let body = response.text().await.map_err(|e| classify(&e))?;
                return Ok(Fetched {
                    chain,
                    content_type,
                    body,
                });
            }

            return Err(FetchFailure::Status(status.as_u16()));
        }

        Err(FetchFailure::Abort("redirect hop limit exceeded".into()))
    }
}

// ---------------------------------------------------------------------------
// Error classification
// ---------------------------------------------------------------------------

/// How a failed attempt affects the retry loop.
#[derive(Debug)]
enum FetchFailure {
    /// Certificate validation failed; retry against the www variant.
    Certificate,
    /// Not worth retrying (refused connections, NXDOMAIN, decode errors).
    Abort(String),
    /// Remote closed the connection; retry immediately.
    Disconnect,
    /// Generic transport failure; retry immediately but log it distinctly.
    Transport(String),
    /// Terminal non-200 status; retry immediately.
    Status(u16),
}

fn classify(e: &reqwest::Error) -> FetchFailure {
    if error_chain_contains(e, "certificate") {
        return FetchFailure::Certificate;
    }
    // Catches sockets not open as well as NXDOMAIN responses.
    if e.is_connect() {
        return FetchFailure::Abort(format!("connect error: {e}"));
    }
    if e.is_decode() {
        return FetchFailure::Abort(format!("decode error: {e}"));
    }
    if error_chain_contains(e, "connection closed")
        || error_chain_contains(e, "connection reset")
        || error_chain_contains(e, "incompletemessage")
    {
        return FetchFailure::Disconnect;
    }
    FetchFailure::Transport(e.to_string())
}

/// Walk an error's source chain looking for a lowercase substring.
fn error_chain_contains(e: &(dyn std::error::Error + 'static), needle: &str) -> bool {
    let mut current: Option<&(dyn std::error::Error + 'static)> = Some(e);
    while let Some(err) = current {
        if err.to_string().to_lowercase().contains(needle) {
            return true;
        }
        current = err.source();
    }
    false
}
