//! Retrying, redirect-aware fetch layer.
//!
//! Wraps any [`Fetcher`] (a single raw GET) with the harvesting policy:
//!
//! - bodies starting with the IIS "Object moved" marker are followed to the
//!   quoted target, through the same retry path, for a bounded number of hops;
//! - empty, too-short or error-marker bodies and transient transport errors
//!   are retried up to [`FetchPolicy::max_attempts`];
//! - anything else that goes wrong yields `None`.
//!
//! Absence is a normal outcome here. Callers get `Option<String>` and never an
//! error, so a dead page can't abort a batch.

use std::time::Duration;

use url::Url;

use crate::models::{EncodingMode, FetchRequest};
use crate::traits::Fetcher;

/// Body prefix of the upstream's soft redirect page.
pub const REDIRECT_MARKER: &str = "<head><title>Object moved</title></head>";

/// Body prefix the upstream uses for failed renders.
pub const ERROR_MARKER: &str = "error";

/// Retry and redirect policy for [`ResilientFetcher`].
#[derive(Debug, Clone)]
pub struct FetchPolicy {
    /// Total attempts per URL, including the first one.
    pub max_attempts: u32,

    /// Bodies shorter than this (in chars) are treated as truncated.
    pub min_content_length: usize,

    /// Redirect markers followed before giving up.
    pub max_redirects: u32,

    /// Pause between attempts. Zero by default.
    pub retry_delay: Duration,

    /// Maximum random jitter added on top of `retry_delay` (uniform [0, jitter]).
    pub jitter: Duration,
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            min_content_length: 1000,
            max_redirects: 3,
            retry_delay: Duration::ZERO,
            jitter: Duration::ZERO,
        }
    }
}

impl FetchPolicy {
    pub fn with_min_content_length(mut self, min: usize) -> Self {
        self.min_content_length = min;
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration, jitter: Duration) -> Self {
        self.retry_delay = delay;
        self.jitter = jitter;
        self
    }

    fn effective_delay(&self) -> Duration {
        if self.jitter.is_zero() {
            return self.retry_delay;
        }
        self.retry_delay + Duration::from_millis(rand_jitter_ms(self.jitter.as_millis() as u64))
    }
}

/// What one attempt told us to do next.
enum Attempt {
    Content(String),
    Redirect(String),
    Retry(&'static str),
    GiveUp(String),
}

/// A [`Fetcher`] wrapper implementing the harvesting retry policy.
///
/// Holds no mutable state, so clones can be used from concurrent tasks.
#[derive(Clone)]
pub struct ResilientFetcher<F> {
    inner: F,
    policy: FetchPolicy,
}

impl<F: Fetcher> ResilientFetcher<F> {
    pub fn new(inner: F, policy: FetchPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn policy(&self) -> &FetchPolicy {
        &self.policy
    }

    /// Fetch `url`, returning its decoded content or `None`.
    pub async fn fetch(&self, url: &str, encoding: EncodingMode) -> Option<String> {
        let mut current = url.to_string();
        let mut redirects = 0;

        'follow: loop {
            let mut attempt = 0;
            loop {
                attempt += 1;
                let request = FetchRequest::new(current.as_str(), encoding);
                let outcome = match self.inner.fetch(&request).await {
                    Ok(body) => self.classify(&current, body),
                    Err(e) if e.is_retryable() => {
                        tracing::debug!(url = %current, error = %e, "Transient fetch failure");
                        Attempt::Retry("transport error")
                    }
                    Err(e) => Attempt::GiveUp(e.to_string()),
                };

                match outcome {
                    Attempt::Content(body) => return Some(body),
                    Attempt::Redirect(target) => {
                        if redirects >= self.policy.max_redirects {
                            tracing::warn!(url = %url, hops = redirects, "Too many redirects");
                            return None;
                        }
                        redirects += 1;
                        tracing::debug!(from = %current, to = %target, "Following redirect marker");
                        current = target;
                        continue 'follow;
                    }
                    Attempt::Retry(reason) => {
                        if attempt >= self.policy.max_attempts {
                            tracing::warn!(url = %current, %attempt, %reason, "No content after retries");
                            return None;
                        }
                        tracing::debug!(url = %current, %attempt, %reason, "Retrying");
                        let delay = self.policy.effective_delay();
                        if !delay.is_zero() {
                            tokio::time::sleep(delay).await;
                        }
                    }
                    Attempt::GiveUp(reason) => {
                        tracing::warn!(url = %current, %reason, "Fetch failed");
                        return None;
                    }
                }
            }
        }
    }

    fn classify(&self, url: &str, body: String) -> Attempt {
        if body.starts_with(REDIRECT_MARKER) {
            return match redirect_target(url, &body) {
                Some(target) => Attempt::Redirect(target),
                None => Attempt::GiveUp("redirect marker without target".into()),
            };
        }
        if body.starts_with(ERROR_MARKER) {
            return Attempt::Retry("upstream error marker");
        }
        if body.trim().is_empty() || body.chars().count() < self.policy.min_content_length {
            return Attempt::Retry("content too short");
        }
        Attempt::Content(body)
    }
}

/// Resolve the quoted target of a redirect marker body against `base`.
fn redirect_target(base: &str, body: &str) -> Option<String> {
    let rest = &body[REDIRECT_MARKER.len()..];
    let open = rest.find(['\'', '"'])?;
    let quote = rest[open..].chars().next()?;
    let after = &rest[open + 1..];
    let target = &after[..after.find(quote)?];
    if target.trim().is_empty() {
        return None;
    }
    let resolved = Url::parse(base).ok()?.join(target.trim()).ok()?;
    Some(resolved.to_string())
}

// Jitter from a time-seeded xorshift; good enough to spread retries.
fn rand_jitter_ms(max_ms: u64) -> u64 {
    if max_ms == 0 {
        return 0;
    }
    let mut x = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64;
    x ^= x << 13;
    x ^= x >> 7;
    x ^= x << 17;
    x % max_ms
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::testutil::MockFetcher;

    fn page(text: &str) -> String {
        format!("<html><body>{text}</body></html>")
    }

    fn fetcher(mock: &MockFetcher) -> ResilientFetcher<MockFetcher> {
        ResilientFetcher::new(mock.clone(), FetchPolicy::default().with_min_content_length(20))
    }

    fn marker(target: &str) -> String {
        format!(
            "{REDIRECT_MARKER}<body><h1>Object Moved</h1>This object may be found <a HREF='{target}'>here</a>.</body>"
        )
    }

    #[tokio::test]
    async fn returns_content_on_first_attempt() {
        let mock = MockFetcher::new().route("http://example.com/a", page("hello world"));
        let body = fetcher(&mock).fetch("http://example.com/a", EncodingMode::Text).await;

        assert_eq!(body, Some(page("hello world")));
        assert_eq!(mock.requested_urls(), vec!["http://example.com/a"]);
    }

    #[tokio::test]
    async fn follows_redirect_marker_exactly_once() {
        let mock = MockFetcher::new()
            .route("http://example.com/a", marker("/deputes/b"))
            .route("http://example.com/deputes/b", page("content of b"));

        let body = fetcher(&mock).fetch("http://example.com/a", EncodingMode::Text).await;

        assert_eq!(body, Some(page("content of b")));
        assert_eq!(
            mock.requested_urls(),
            vec!["http://example.com/a", "http://example.com/deputes/b"]
        );
    }

    #[tokio::test]
    async fn follows_absolute_redirect_target() {
        let mock = MockFetcher::new()
            .route("http://example.com/a", marker("https://other.org/b"))
            .route("https://other.org/b", page("elsewhere content"));

        let body = fetcher(&mock).fetch("http://example.com/a", EncodingMode::Text).await;

        assert_eq!(body, Some(page("elsewhere content")));
    }

    #[tokio::test]
    async fn redirect_chain_is_bounded() {
        let mock = MockFetcher::new()
            .route("http://example.com/1", marker("/2"))
            .route("http://example.com/2", marker("/3"))
            .route("http://example.com/3", marker("/4"))
            .route("http://example.com/4", marker("/5"))
            .route("http://example.com/5", page("never reached"));

        let body = fetcher(&mock).fetch("http://example.com/1", EncodingMode::Text).await;

        assert_eq!(body, None);
        assert_eq!(mock.requested_urls().len(), 4);
    }

    #[tokio::test]
    async fn short_content_is_retried_then_abandoned() {
        let mock = MockFetcher::new().route("http://example.com/a", "tiny");
        let body = fetcher(&mock).fetch("http://example.com/a", EncodingMode::Text).await;

        assert_eq!(body, None);
        assert_eq!(mock.requested_urls().len(), 3);
    }

    #[tokio::test]
    async fn short_content_then_full_page() {
        let mock = MockFetcher::new().route_sequence(
            "http://example.com/a",
            vec![Ok("tiny".into()), Ok(page("second attempt worked"))],
        );
        let body = fetcher(&mock).fetch("http://example.com/a", EncodingMode::Text).await;

        assert_eq!(body, Some(page("second attempt worked")));
        assert_eq!(mock.requested_urls().len(), 2);
    }

    #[tokio::test]
    async fn error_marker_is_retried() {
        let mock = MockFetcher::new().route_sequence(
            "http://example.com/a",
            vec![
                Ok("error: rendering failed, please try again later".into()),
                Ok(page("recovered content")),
            ],
        );
        let body = fetcher(&mock).fetch("http://example.com/a", EncodingMode::Text).await;

        assert_eq!(body, Some(page("recovered content")));
    }

    #[tokio::test]
    async fn transient_errors_are_retried() {
        let mock = MockFetcher::new().route_sequence(
            "http://example.com/a",
            vec![
                Err(AppError::Timeout(Duration::from_secs(60))),
                Err(AppError::NetworkError("connection reset".into())),
                Ok(page("third time lucky")),
            ],
        );
        let body = fetcher(&mock).fetch("http://example.com/a", EncodingMode::Text).await;

        assert_eq!(body, Some(page("third time lucky")));
        assert_eq!(mock.requested_urls().len(), 3);
    }

    #[tokio::test]
    async fn final_errors_are_not_retried() {
        let mock = MockFetcher::new();
        let body = fetcher(&mock).fetch("http://example.com/missing", EncodingMode::Text).await;

        assert_eq!(body, None);
        assert_eq!(mock.requested_urls().len(), 1);
    }

    #[tokio::test]
    async fn encoding_is_forwarded() {
        let mock = MockFetcher::new().route("http://example.com/a", page("latin-1 page here"));
        fetcher(&mock).fetch("http://example.com/a", EncodingMode::Binary).await;

        assert_eq!(mock.requests()[0].encoding, EncodingMode::Binary);
    }

    #[test]
    fn redirect_target_parsing() {
        assert_eq!(
            redirect_target("http://example.com/x/y", &marker("z")),
            Some("http://example.com/x/z".to_string())
        );
        assert_eq!(redirect_target("http://example.com", REDIRECT_MARKER), None);
    }

    #[test]
    fn effective_delay_with_jitter_is_bounded() {
        let policy = FetchPolicy::default()
            .with_retry_delay(Duration::from_millis(100), Duration::from_millis(50));
        for _ in 0..100 {
            let d = policy.effective_delay();
            assert!(d >= Duration::from_millis(100));
            assert!(d < Duration::from_millis(150));
        }
    }
}
