//! Domain discovery for the ads.txt crawler.
//!
//! A [`DomainSource`] produces the candidate domain list consumed at the
//! start of each crawl cycle. Two modes exist: a newline-delimited local
//! file, and an opaque aggregation query POSTed to a search backend.

use std::path::PathBuf;

use reqwest::Client;
use serde_json::Value;
use tracing::{debug, instrument};

use adstxt_shared::{AdsTxtError, DiscoverySettings, Result, Settings};

/// Where candidate domains come from.
pub enum DomainSource {
    /// Newline-delimited domain list on local disk.
    File { path: PathBuf },
    /// Aggregation query against a search backend.
    Query(QuerySource),
}

impl DomainSource {
    /// Build the source selected by validated [`Settings`].
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        match &settings.discovery {
            DiscoverySettings::File { path } => Ok(Self::File { path: path.clone() }),
            DiscoverySettings::Query {
                endpoint,
                index,
                body,
            } => Ok(Self::Query(QuerySource::new(endpoint, index, body)?)),
        }
    }

    /// Produce the current candidate list. Queried once per crawl cycle.
    #[instrument(skip_all)]
    pub async fn domains(&self) -> Result<Vec<String>> {
        let domains = match self {
            Self::File { path } => {
                let content = tokio::fs::read_to_string(path)
                    .await
                    .map_err(|e| AdsTxtError::io(path.clone(), e))?;
                content
                    .lines()
                    .map(str::trim)
                    .filter(|line| !line.is_empty())
                    .map(str::to_owned)
                    .collect()
            }
            Self::Query(source) => source.domains().await?,
        };
        debug!(count = domains.len(), "discovered candidate domains");
        Ok(domains)
    }
}

// ---------------------------------------------------------------------------
// Query source
// ---------------------------------------------------------------------------

/// POSTs a caller-supplied JSON query to `<endpoint>/<index>/_search` and
/// reads domain names out of the `top_domains` terms aggregation. The rest
/// of the result shape is opaque to us.
#[derive(Debug)]
pub struct QuerySource {
    client: Client,
    url: String,
    body: Value,
}

impl QuerySource {
    fn new(endpoint: &str, index: &str, body: &str) -> Result<Self> {
        let body: Value = serde_json::from_str(body)
            .map_err(|e| AdsTxtError::config(format!("query body is not valid JSON: {e}")))?;
        let client = Client::builder()
            .build()
            .map_err(|e| AdsTxtError::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            url: format!("{}/{index}/_search", endpoint.trim_end_matches('/')),
            body,
        })
    }

    async fn domains(&self) -> Result<Vec<String>> {
        let response = self
            .client
            .post(&self.url)
            .json(&self.body)
            .send()
            .await
            .map_err(|e| AdsTxtError::Discovery(format!("query request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AdsTxtError::Discovery(format!(
                "query returned status {status}"
            )));
        }

        let result: Value = response
            .json()
            .await
            .map_err(|e| AdsTxtError::Discovery(format!("query result is not JSON: {e}")))?;

        let buckets = result
            .pointer("/aggregations/top_domains/buckets")
            .and_then(Value::as_array)
            .ok_or_else(|| {
                AdsTxtError::Discovery("query result is missing the top_domains buckets".into())
            })?;

        Ok(buckets
            .iter()
            .filter_map(|bucket| bucket.get("key"))
            .filter_map(Value::as_str)
            .map(str::to_owned)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn file_settings(path: PathBuf) -> Settings {
        Settings {
            db_path: "/tmp/adstxt.db".into(),
            crawler_tag: "adstxt-test/0.1".into(),
            max_concurrent_fetches: 4,
            discovery: DiscoverySettings::File { path },
        }
    }

    #[tokio::test]
    async fn file_source_skips_blank_lines() {
        let path = std::env::temp_dir().join(format!("adstxt_domains_{}.txt", Uuid::now_v7()));
        tokio::fs::write(&path, "example.com\n\n  \npublisher.net  \n")
            .await
            .expect("write domain list");

        let source =
            DomainSource::from_settings(&file_settings(path.clone())).expect("build source");
        let domains = source.domains().await.expect("read domains");
        assert_eq!(domains, vec!["example.com", "publisher.net"]);

        tokio::fs::remove_file(&path).await.ok();
    }

    #[tokio::test]
    async fn missing_file_is_an_error() {
        let path = std::env::temp_dir().join(format!("adstxt_missing_{}.txt", Uuid::now_v7()));
        let source = DomainSource::from_settings(&file_settings(path)).expect("build source");
        let err = source.domains().await.unwrap_err();
        assert!(matches!(err, AdsTxtError::Io { .. }));
    }

    #[tokio::test]
    async fn query_source_extracts_bucket_keys() {
        let server = MockServer::start().await;
        let query = json!({"size": 0, "aggs": {"top_domains": {"terms": {"field": "domain"}}}});
        Mock::given(method("POST"))
            .and(path("/requests/_search"))
            .and(body_json(&query))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "took": 3,
                "aggregations": {
                    "top_domains": {
                        "buckets": [
                            {"key": "example.com", "doc_count": 120},
                            {"key": "publisher.net", "doc_count": 40},
                        ]
                    }
                }
            })))
            .mount(&server)
            .await;

        let source = QuerySource::new(&server.uri(), "requests", &query.to_string())
            .expect("build query source");
        let domains = source.domains().await.expect("query domains");
        assert_eq!(domains, vec!["example.com", "publisher.net"]);
    }

    #[tokio::test]
    async fn malformed_query_result_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/requests/_search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"hits": []})))
            .mount(&server)
            .await;

        let source =
            QuerySource::new(&server.uri(), "requests", "{}").expect("build query source");
        let err = source.domains().await.unwrap_err();
        assert!(err.to_string().contains("top_domains"));
    }

    #[test]
    fn invalid_query_body_rejected_up_front() {
        let err = QuerySource::new("http://search.local:9200", "requests", "not json").unwrap_err();
        assert!(matches!(err, AdsTxtError::Config { .. }));
    }
}
