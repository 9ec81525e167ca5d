//! External data-source adapters.
//!
//! Every adapter is an independent call to one external system (REST,
//! paginated search API, GraphQL or plain HTML) wrapped behind the same
//! [`SourceAdapter`] trait. An adapter that is missing credentials or an
//! opt-in toggle reports [`FetchOutcome::Skipped`] so the collector can
//! distinguish "not configured" from a genuine fetch failure in its logs.

pub mod legal;
pub mod patents;
pub mod regulatory;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

/// Sent with every outbound request; several of the scraped sites reject
/// requests without a browser-ish agent string.
const USER_AGENT: &str = "Mozilla/5.0 (compatible; RegwatchBot/0.3)";

const HTTP_TIMEOUT: Duration = Duration::from_secs(25);

const RETRY_ATTEMPTS: u32 = 3;

const RETRY_BASE_DELAY: Duration = Duration::from_secs(1);

/// What one adapter produced for a collection run.
pub enum FetchOutcome<R> {
    Fetched(Vec<R>),
    /// The adapter is not configured (missing credentials or toggle) and
    /// contributed nothing. Informational, not a failure.
    Skipped(&'static str),
}

/// One external source of records.
#[async_trait]
pub trait SourceAdapter<R>: Send + Sync {
    /// Short identifier used in logs and error lists.
    fn name(&self) -> &'static str;

    /// Fetch up to `limit` records. Errors are recoverable at the
    /// collector level: one failing source never aborts the others.
    async fn fetch(&self, limit: u32) -> Result<FetchOutcome<R>>;
}

/// Shared HTTP client for all adapters.
pub fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(HTTP_TIMEOUT)
        .build()
        .context("failed to build HTTP client")
}

/// GET a URL, retrying transient failures with linear backoff.
///
/// 400 and 404 are permanent: retrying cannot fix a bad request, so those
/// fail immediately. Everything else (connect errors, 5xx, 429) gets up to
/// [`RETRY_ATTEMPTS`] tries.
pub(crate) async fn get_text(client: &reqwest::Client, url: &str) -> Result<String> {
    let mut last_err = None;
    for attempt in 1..=RETRY_ATTEMPTS {
        match client.get(url).send().await {
            Ok(resp) => {
                let status = resp.status();
                if status.is_success() {
                    return resp
                        .text()
                        .await
                        .with_context(|| format!("failed to read response body from {url}"));
                }
                if is_permanent(status) {
                    anyhow::bail!("request to {url} failed with {status}");
                }
                last_err = Some(anyhow::anyhow!("request to {url} failed with {status}"));
            }
            Err(e) => {
                last_err = Some(anyhow::Error::from(e).context(format!("request to {url} failed")))
            }
        }
        if attempt < RETRY_ATTEMPTS {
            debug!(url, attempt, "retrying request");
            tokio::time::sleep(RETRY_BASE_DELAY * attempt).await;
        }
    }
    Err(last_err.unwrap_or_else(|| anyhow::anyhow!("request to {url} failed")))
}

/// Client errors that retrying cannot fix.
fn is_permanent(status: StatusCode) -> bool {
    status == StatusCode::BAD_REQUEST || status == StatusCode::NOT_FOUND
}

/// GET a URL and parse the JSON body.
pub(crate) async fn get_json<T: DeserializeOwned>(client: &reqwest::Client, url: &str) -> Result<T> {
    let body = get_text(client, url).await?;
    parse_json_with_context(&body)
}

/// Parse JSON and, on failure, report the serde path where it went wrong
/// rather than a bare "expected X at line Y".
pub(crate) fn parse_json_with_context<T: DeserializeOwned>(body: &str) -> Result<T> {
    let de = &mut serde_json::Deserializer::from_str(body);
    serde_path_to_error::deserialize(de).map_err(|err| {
        let path = err.path().to_string();
        anyhow::anyhow!("at path '{path}': {}", err.inner())
    })
}

/// Some upstream APIs serialize a field as either a scalar or an array.
#[derive(Debug, serde::Deserialize)]
#[serde(untagged)]
pub(crate) enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    pub(crate) fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::One(v) => vec![v],
            OneOrMany::Many(v) => v,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[test]
    fn json_errors_carry_the_field_path() {
        #[derive(Debug, Deserialize)]
        struct Doc {
            #[allow(dead_code)]
            title: String,
        }
        #[derive(Debug, Deserialize)]
        struct Response {
            #[allow(dead_code)]
            docs: Vec<Doc>,
        }

        let body = r#"{"docs": [{"title": null}]}"#;
        let err = parse_json_with_context::<Response>(body).unwrap_err();
        assert!(err.to_string().contains("docs[0].title"));
    }

    #[test]
    fn only_bad_request_and_not_found_are_permanent() {
        assert!(is_permanent(StatusCode::BAD_REQUEST));
        assert!(is_permanent(StatusCode::NOT_FOUND));
        // Transient upstream trouble stays retryable.
        assert!(!is_permanent(StatusCode::TOO_MANY_REQUESTS));
        assert!(!is_permanent(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(!is_permanent(StatusCode::BAD_GATEWAY));
    }

    #[test]
    fn one_or_many_accepts_both_shapes() {
        #[derive(Debug, Deserialize)]
        struct Doc {
            inventors: OneOrMany<String>,
        }

        let one: Doc = serde_json::from_str(r#"{"inventors": "Ada"}"#).unwrap();
        assert_eq!(one.inventors.into_vec(), vec!["Ada"]);

        let many: Doc = serde_json::from_str(r#"{"inventors": ["Ada", "Grace"]}"#).unwrap();
        assert_eq!(many.inventors.into_vec(), vec!["Ada", "Grace"]);
    }
}
