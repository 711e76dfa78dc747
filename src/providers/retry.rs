use anyhow::{Context, Result, anyhow};
use reqwest::header::HeaderMap;
use reqwest::{RequestBuilder, StatusCode};
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

pub(crate) const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Backoff applied when a provider answers with a rate-limit/overload status.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RetryPolicy {
    pub(crate) max_attempts: usize,
    pub(crate) base_delay: Duration,
    pub(crate) max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    pub(crate) fn next_delay(&self, current: Duration) -> Duration {
        let next = Duration::from_secs(
            current
                .as_secs()
                .saturating_mul(2)
                .max(self.base_delay.as_secs()),
        );
        next.min(self.max_delay)
    }

    /// Honors `Retry-After` when it asks for longer than the backoff, capped
    /// at `max_delay`.
    pub(crate) fn wait_for(&self, delay: Duration, retry_after: Option<Duration>) -> Duration {
        retry_after
            .map_or(delay, |after| after.max(delay))
            .min(self.max_delay)
    }
}

/// HTTP client shared by the provider calls; requests give up after
/// `REQUEST_TIMEOUT`.
pub(crate) fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .with_context(|| "failed to build HTTP client")
}

/// Sends the request built by `build`, retrying rate-limited answers, and
/// returns the body of the first successful response.
pub(crate) async fn send_with_retry<F>(
    provider: &str,
    policy: RetryPolicy,
    extract_error: fn(&str) -> Option<String>,
    mut build: F,
) -> Result<String>
where
    F: FnMut() -> RequestBuilder,
{
    let mut attempt = 0usize;
    let mut delay = policy.base_delay;
    loop {
        attempt += 1;
        let response = build()
            .send()
            .await
            .with_context(|| format!("{} request failed", provider))?;

        let status = response.status();
        let retry_after = retry_after(response.headers());
        let text = response.text().await.unwrap_or_default();
        if status.is_success() {
            return Ok(text);
        }
        if is_rate_limited(status, &text) && attempt < policy.max_attempts {
            let wait = policy.wait_for(delay, retry_after);
            warn!(
                "{} rate limited; retrying in {:.1}s (attempt {}/{})",
                provider,
                wait.as_secs_f32(),
                attempt,
                policy.max_attempts
            );
            sleep(wait).await;
            delay = policy.next_delay(delay);
            continue;
        }
        return Err(anyhow!(
            "{} API error ({}): {}",
            provider,
            status,
            extract_error(&text).unwrap_or(text)
        ));
    }
}

pub(crate) fn is_rate_limited(status: StatusCode, body: &str) -> bool {
    if matches!(status.as_u16(), 429 | 503 | 529) {
        return true;
    }
    let lower = body.to_lowercase();
    [
        "rate limit",
        "rate_limit",
        "too many requests",
        "resource_exhausted",
        "quota",
        "overloaded",
    ]
    .iter()
    .any(|needle| lower.contains(needle))
}

pub(crate) fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get("retry-after")?.to_str().ok()?.trim();
    value.parse::<u64>().ok().map(Duration::from_secs)
}
