//! Shared JSON-over-HTTP helpers for the model backends and the Graph
//! connector.
//!
//! Retry strategy:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors (including timeouts) → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use anyhow::{anyhow, bail, Result};
use std::time::Duration;

/// Build a pooled client whose every request is bounded by `timeout_secs`.
pub fn build_client(timeout_secs: u64) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?)
}

/// POST `body` to `url` and parse the JSON response.
pub async fn post_json_with_retry(
    client: &reqwest::Client,
    url: &str,
    bearer: Option<&str>,
    body: &serde_json::Value,
    max_retries: u32,
    label: &str,
) -> Result<serde_json::Value> {
    send_with_retry(
        || with_bearer(client.post(url).json(body), bearer),
        max_retries,
        label,
    )
    .await
}

/// GET `url` and parse the JSON response.
pub async fn get_json_with_retry(
    client: &reqwest::Client,
    url: &str,
    bearer: Option<&str>,
    max_retries: u32,
    label: &str,
) -> Result<serde_json::Value> {
    send_with_retry(
        || with_bearer(client.get(url), bearer),
        max_retries,
        label,
    )
    .await
}

fn with_bearer(req: reqwest::RequestBuilder, bearer: Option<&str>) -> reqwest::RequestBuilder {
    match bearer {
        Some(token) => req.bearer_auth(token),
        None => req,
    }
}

/// Send the request built by `build`, retrying transient failures up to
/// `max_retries` times.
async fn send_with_retry<F>(build: F, max_retries: u32, label: &str) -> Result<serde_json::Value>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            tracing::debug!(%label, attempt, ?delay, "retrying request");
            tokio::time::sleep(delay).await;
        }

        match build().send().await {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    return Ok(response.json().await?);
                }

                let body_text = response.text().await.unwrap_or_default();
                let err = anyhow!(
                    "{} API error {}: {}",
                    label,
                    status,
                    body_text.chars().take(500).collect::<String>()
                );

                if status.as_u16() == 429 || status.is_server_error() {
                    last_err = Some(err);
                    continue;
                }

                return Err(err);
            }
            Err(e) => {
                last_err = Some(anyhow!("{} request failed: {}", label, e));
                continue;
            }
        }
    }

    match last_err {
        Some(e) => Err(e),
        None => bail!("{} request failed after retries", label),
    }
}
