//! Rate-limited HTTP fetching.
//!
//! Wraps a fetch primitive with per-host pacing and retry/back-off. The
//! clock and sleep are injected so tests run without wall time. Pacing state
//! lives behind a mutex; one client may be shared across worker threads.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use thiserror::Error;
use tracing::debug;
use url::Url;

/// Retry-After values above this ceiling are clamped (ms).
const RETRY_AFTER_CEILING_MS: u64 = 300_000;

/// Per-request timeout used by the real fetcher.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// A minimal HTTP response: status plus whatever the caller needs.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub retry_after: Option<String>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Fetch failures that never reached a response.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Timeouts and transport failures; retried up to `max_attempts`.
    #[error("transient fetch error: {0}")]
    Transient(String),
    /// Malformed URLs and other caller mistakes; returned immediately.
    #[error("fetch error: {0}")]
    Fatal(String),
}

/// The injected fetch primitive.
pub trait Fetcher: Send + Sync {
    fn fetch(&self, url: &str) -> Result<HttpResponse, FetchError>;
}

/// Per-host pacing and retry policy.
#[derive(Debug, Clone)]
pub struct HostPolicy {
    pub min_interval_ms: u64,
    pub max_attempts: u32,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for HostPolicy {
    fn default() -> Self {
        HostPolicy {
            min_interval_ms: 250,
            max_attempts: 4,
            base_backoff_ms: 1_000,
            max_backoff_ms: 60_000,
        }
    }
}

type ClockFn = Box<dyn Fn() -> i64 + Send + Sync>;
type SleepFn = Box<dyn Fn(u64) + Send + Sync>;

/// Rate-limited client. `get` paces calls per hostname and retries 429/5xx
/// and transient transport errors with exponential back-off, honoring
/// Retry-After verbatim up to a hard ceiling.
pub struct RateLimitedClient {
    fetcher: Box<dyn Fetcher>,
    policy: HostPolicy,
    last_call_at: Mutex<HashMap<String, i64>>,
    clock: ClockFn,
    sleep: SleepFn,
}

impl RateLimitedClient {
    /// Client over the real wall clock.
    pub fn new(fetcher: Box<dyn Fetcher>, policy: HostPolicy) -> RateLimitedClient {
        RateLimitedClient::with_clock(
            fetcher,
            policy,
            Box::new(|| chrono::Utc::now().timestamp_millis()),
            Box::new(|ms| std::thread::sleep(Duration::from_millis(ms))),
        )
    }

    /// Client with injected time, for tests.
    pub fn with_clock(
        fetcher: Box<dyn Fetcher>,
        policy: HostPolicy,
        clock: ClockFn,
        sleep: SleepFn,
    ) -> RateLimitedClient {
        RateLimitedClient {
            fetcher,
            policy,
            last_call_at: Mutex::new(HashMap::new()),
            clock,
            sleep,
        }
    }

    /// GET with pacing and retries. Returns the last response after retry
    /// exhaustion; non-retryable statuses return immediately.
    pub fn get(&self, url: &str) -> Result<HttpResponse, FetchError> {
        let host = hostname(url)?;
        let mut last_error: Option<FetchError> = None;

        for attempt in 1..=self.policy.max_attempts {
            self.pace(&host);
            match self.fetcher.fetch(url) {
                Ok(response) => {
                    if response.is_success() || !is_retryable_status(response.status) {
                        return Ok(response);
                    }
                    if attempt == self.policy.max_attempts {
                        return Ok(response);
                    }
                    let backoff = self.backoff_ms(attempt, response.retry_after.as_deref());
                    debug!(url, status = response.status, backoff, "retrying after backoff");
                    (self.sleep)(backoff);
                }
                Err(FetchError::Transient(e)) => {
                    if attempt == self.policy.max_attempts {
                        return Err(FetchError::Transient(e));
                    }
                    let backoff = self.backoff_ms(attempt, None);
                    debug!(url, error = %e, backoff, "transient error, retrying");
                    last_error = Some(FetchError::Transient(e));
                    (self.sleep)(backoff);
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_error.unwrap_or_else(|| FetchError::Fatal("no attempts made".to_string())))
    }

    /// Wait until `last_call_at + min_interval` for this host, then stamp
    /// the call time.
    fn pace(&self, host: &str) {
        let now = (self.clock)();
        let wait = {
            let mut last = self.last_call_at.lock().unwrap();
            let wait = match last.get(host) {
                Some(at) => (at + self.policy.min_interval_ms as i64 - now).max(0),
                None => 0,
            };
            last.insert(host.to_string(), now + wait);
            wait
        };
        if wait > 0 {
            (self.sleep)(wait as u64);
        }
    }

    fn backoff_ms(&self, attempt: u32, retry_after: Option<&str>) -> u64 {
        if let Some(header) = retry_after.and_then(parse_retry_after_ms) {
            // Honored verbatim, bypassing max_backoff, up to the ceiling.
            return header.min(RETRY_AFTER_CEILING_MS);
        }
        let exp = self
            .policy
            .base_backoff_ms
            .saturating_mul(1u64 << (attempt - 1).min(16));
        exp.min(self.policy.max_backoff_ms)
    }
}

fn is_retryable_status(status: u16) -> bool {
    status == 429 || (500..600).contains(&status)
}

fn hostname(url: &str) -> Result<String, FetchError> {
    let parsed = Url::parse(url).map_err(|e| FetchError::Fatal(format!("bad url {}: {}", url, e)))?;
    parsed
        .host_str()
        .map(|h| h.to_string())
        .ok_or_else(|| FetchError::Fatal(format!("url has no host: {}", url)))
}

/// Retry-After in seconds (fractional accepted) → milliseconds.
fn parse_retry_after_ms(header: &str) -> Option<u64> {
    let seconds: f64 = header.trim().parse().ok()?;
    if !seconds.is_finite() || seconds < 0.0 {
        return None;
    }
    Some((seconds * 1_000.0).round() as u64)
}

/// Real fetcher over a blocking reqwest client.
pub struct ReqwestFetcher {
    client: reqwest::blocking::Client,
}

impl ReqwestFetcher {
    pub fn new() -> Result<ReqwestFetcher, FetchError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| FetchError::Fatal(format!("build http client: {}", e)))?;
        Ok(ReqwestFetcher { client })
    }
}

impl Fetcher for ReqwestFetcher {
    fn fetch(&self, url: &str) -> Result<HttpResponse, FetchError> {
        let response = self.client.get(url).send().map_err(|e| {
            if e.is_timeout() || e.is_connect() {
                FetchError::Transient(e.to_string())
            } else {
                FetchError::Fatal(e.to_string())
            }
        })?;
        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string());
        let body = response
            .bytes()
            .map_err(|e| FetchError::Transient(e.to_string()))?
            .to_vec();
        Ok(HttpResponse { status, retry_after, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI64, Ordering};
    use std::sync::Arc;

    /// Scripted fetcher: pops responses in order, records call times.
    struct ScriptedFetcher {
        responses: Mutex<Vec<Result<HttpResponse, FetchError>>>,
        calls: Arc<Mutex<Vec<i64>>>,
        clock: Arc<AtomicI64>,
    }

    impl Fetcher for ScriptedFetcher {
        fn fetch(&self, _url: &str) -> Result<HttpResponse, FetchError> {
            self.calls.lock().unwrap().push(self.clock.load(Ordering::SeqCst));
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                return Ok(ok200());
            }
            responses.remove(0)
        }
    }

    fn ok200() -> HttpResponse {
        HttpResponse { status: 200, retry_after: None, body: Vec::new() }
    }

    fn status(code: u16, retry_after: Option<&str>) -> HttpResponse {
        HttpResponse {
            status: code,
            retry_after: retry_after.map(|s| s.to_string()),
            body: Vec::new(),
        }
    }

    /// Client whose sleeps advance a fake clock and are recorded.
    fn scripted(
        responses: Vec<Result<HttpResponse, FetchError>>,
        policy: HostPolicy,
    ) -> (RateLimitedClient, Arc<Mutex<Vec<i64>>>, Arc<Mutex<Vec<u64>>>, Arc<AtomicI64>) {
        let clock = Arc::new(AtomicI64::new(0));
        let calls = Arc::new(Mutex::new(Vec::new()));
        let sleeps = Arc::new(Mutex::new(Vec::new()));
        let fetcher = ScriptedFetcher {
            responses: Mutex::new(responses),
            calls: calls.clone(),
            clock: clock.clone(),
        };
        let clock_read = clock.clone();
        let clock_sleep = clock.clone();
        let sleeps_rec = sleeps.clone();
        let client = RateLimitedClient::with_clock(
            Box::new(fetcher),
            policy,
            Box::new(move || clock_read.load(Ordering::SeqCst)),
            Box::new(move |ms| {
                sleeps_rec.lock().unwrap().push(ms);
                clock_sleep.fetch_add(ms as i64, Ordering::SeqCst);
            }),
        );
        (client, calls, sleeps, clock)
    }

    #[test]
    fn test_success_passes_through() {
        let (client, calls, sleeps, _) = scripted(vec![Ok(ok200())], HostPolicy::default());
        let response = client.get("https://example.com/a").unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(calls.lock().unwrap().len(), 1);
        assert!(sleeps.lock().unwrap().is_empty());
    }

    #[test]
    fn test_per_host_min_interval() {
        let policy = HostPolicy { min_interval_ms: 100, ..HostPolicy::default() };
        let (client, calls, _, _) = scripted(vec![Ok(ok200()), Ok(ok200()), Ok(ok200())], policy);
        client.get("https://example.com/1").unwrap();
        client.get("https://example.com/2").unwrap();
        client.get("https://example.com/3").unwrap();
        let calls = calls.lock().unwrap();
        for pair in calls.windows(2) {
            assert!(pair[1] - pair[0] >= 100, "calls too close: {:?}", *calls);
        }
    }

    #[test]
    fn test_distinct_hosts_do_not_pace_each_other() {
        let policy = HostPolicy { min_interval_ms: 10_000, ..HostPolicy::default() };
        let (client, _, sleeps, _) = scripted(vec![Ok(ok200()), Ok(ok200())], policy);
        client.get("https://one.example.com/a").unwrap();
        client.get("https://two.example.com/b").unwrap();
        assert!(sleeps.lock().unwrap().is_empty());
    }

    #[test]
    fn test_retry_after_fractional_seconds() {
        let (client, calls, sleeps, _) = scripted(
            vec![Ok(status(429, Some("0.2"))), Ok(ok200())],
            HostPolicy { min_interval_ms: 0, ..HostPolicy::default() },
        );
        let response = client.get("https://example.com/a").unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(calls.lock().unwrap().len(), 2);
        assert_eq!(*sleeps.lock().unwrap(), vec![200]);
    }

    #[test]
    fn test_retry_after_caps_at_hard_ceiling() {
        let (client, calls, sleeps, _) = scripted(
            vec![Ok(status(429, Some("9999"))), Ok(ok200())],
            HostPolicy { min_interval_ms: 0, ..HostPolicy::default() },
        );
        let response = client.get("https://example.com/a").unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(calls.lock().unwrap().len(), 2);
        assert_eq!(*sleeps.lock().unwrap(), vec![300_000]);
    }

    #[test]
    fn test_retry_after_bypasses_max_backoff_below_ceiling() {
        let policy = HostPolicy {
            min_interval_ms: 0,
            max_backoff_ms: 1_000,
            ..HostPolicy::default()
        };
        let (client, _, sleeps, _) = scripted(vec![Ok(status(429, Some("60"))), Ok(ok200())], policy);
        client.get("https://example.com/a").unwrap();
        assert_eq!(*sleeps.lock().unwrap(), vec![60_000]);
    }

    #[test]
    fn test_backoff_doubles_and_clamps() {
        let policy = HostPolicy {
            min_interval_ms: 0,
            max_attempts: 4,
            base_backoff_ms: 100,
            max_backoff_ms: 250,
        };
        let (client, calls, sleeps, _) = scripted(
            vec![
                Ok(status(500, None)),
                Ok(status(500, None)),
                Ok(status(500, None)),
                Ok(status(500, None)),
            ],
            policy,
        );
        let response = client.get("https://example.com/a").unwrap();
        assert_eq!(response.status, 500, "exhaustion returns the last response");
        assert_eq!(calls.lock().unwrap().len(), 4);
        // 100, 200, then clamped to 250; no sleep after the final attempt.
        assert_eq!(*sleeps.lock().unwrap(), vec![100, 200, 250]);
    }

    #[test]
    fn test_non_retryable_status_returns_immediately() {
        let (client, calls, _, _) = scripted(
            vec![Ok(status(404, None))],
            HostPolicy { min_interval_ms: 0, ..HostPolicy::default() },
        );
        let response = client.get("https://example.com/missing").unwrap();
        assert_eq!(response.status, 404);
        assert_eq!(calls.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_transient_error_retries_then_surfaces() {
        let policy = HostPolicy {
            min_interval_ms: 0,
            max_attempts: 2,
            base_backoff_ms: 50,
            max_backoff_ms: 1_000,
        };
        let (client, calls, sleeps, _) = scripted(
            vec![
                Err(FetchError::Transient("timeout".to_string())),
                Err(FetchError::Transient("timeout".to_string())),
            ],
            policy,
        );
        let err = client.get("https://example.com/a").unwrap_err();
        assert!(matches!(err, FetchError::Transient(_)));
        assert_eq!(calls.lock().unwrap().len(), 2);
        assert_eq!(*sleeps.lock().unwrap(), vec![50]);
    }

    #[test]
    fn test_bad_url_is_fatal() {
        let (client, calls, _, _) = scripted(vec![], HostPolicy::default());
        let err = client.get("not a url").unwrap_err();
        assert!(matches!(err, FetchError::Fatal(_)));
        assert!(calls.lock().unwrap().is_empty());
    }
}
