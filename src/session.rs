//! Per-operation HTTP sessions.
//!
//! A [`Session`] is opened for one operation and consumed by its single POST,
//! so nothing is shared between calls except the immutable factory settings.

use std::thread;
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::{Client as HttpClient, Response};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use serde_json::Value;
use tracing::{debug, warn};

use crate::envelope::{ResponseEnvelope, parse_envelope};
use crate::error::{Result, UsgsError};
use crate::util::{backoff, retriable_status, truncate_body, urljoin};

/// Header carrying the API key on authenticated requests.
pub const AUTH_HEADER: &str = "X-Auth-Token";

const MAX_ERROR_BODY_LENGTH: usize = 500;

/// Transport-level retry settings. Service envelopes are never retried.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, the first one included.
    pub max_attempts: usize,
    /// Retry `n` waits `backoff_factor * 2^(n - 1)` seconds.
    pub backoff_factor: f64,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff_factor: 2.0,
            max_backoff: Duration::from_secs(120),
        }
    }
}

impl RetryPolicy {
    /// `max_attempts` tries with no sleeping in between.
    pub fn immediate(max_attempts: usize) -> Self {
        Self {
            max_attempts,
            backoff_factor: 0.0,
            ..Self::default()
        }
    }

    /// Delay before retry number `retry` (1-based).
    pub fn delay(&self, retry: usize) -> Duration {
        backoff(self.backoff_factor, retry, self.max_backoff)
    }
}

/// Builds one configured [`Session`] per operation.
#[derive(Debug, Clone)]
pub struct SessionFactory {
    base_url: String,
    user_agent: String,
    timeout: Duration,
    retry: RetryPolicy,
}

impl SessionFactory {
    pub fn new(base_url: impl Into<String>, timeout: Duration, retry: RetryPolicy) -> Self {
        Self {
            base_url: base_url.into(),
            user_agent: format!("Rust usgs v{}", env!("CARGO_PKG_VERSION")),
            timeout,
            retry,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    pub(crate) fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    pub(crate) fn set_retry_policy(&mut self, retry: RetryPolicy) {
        self.retry = retry;
    }

    /// Opens a session, authenticated when `api_key` is present.
    ///
    /// An absent or empty key sends no auth header at all.
    pub fn open(&self, api_key: Option<&str>) -> Result<Session> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&self.user_agent)
                .unwrap_or(HeaderValue::from_static("Rust usgs")),
        );

        let api_key = api_key.filter(|k| !k.is_empty());
        if let Some(key) = api_key {
            let mut value = HeaderValue::from_str(key)
                .map_err(|_| UsgsError::Config("API key is not a valid header value".into()))?;
            value.set_sensitive(true);
            let name = HeaderName::from_bytes(AUTH_HEADER.as_bytes())
                .map_err(|_| UsgsError::Config("invalid auth header name".into()))?;
            default_headers.insert(name, value);
        }

        let http = HttpClient::builder()
            .default_headers(default_headers)
            .timeout(self.timeout)
            .build()
            .map_err(|e| UsgsError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Session {
            http,
            base_url: self.base_url.clone(),
            retry: self.retry,
            authenticated: api_key.is_some(),
        })
    }
}

/// A configured HTTP client good for exactly one exchange.
#[derive(Debug)]
pub struct Session {
    http: HttpClient,
    base_url: String,
    retry: RetryPolicy,
    authenticated: bool,
}

impl Session {
    /// Whether this session carries an [`AUTH_HEADER`].
    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    /// POSTs `payload` (or an empty body) to `{base}/{path}` and parses the
    /// response envelope. The envelope is not classified here.
    pub fn post(self, path: &str, payload: Option<&Value>) -> Result<ResponseEnvelope> {
        let url = urljoin(&self.base_url, path);
        debug!(%url, authenticated = self.authenticated, "POST");

        let (status, text, attempts) = self.robust_request(&url, || {
            let req = self.http.post(&url);
            match payload {
                Some(body) => req.json(body).send(),
                None => req.send(),
            }
        })?;
        debug!(%url, %status, bytes = text.len(), "response");

        if status.is_success() {
            return parse_envelope(&url, &text);
        }

        // The service sometimes reports business errors with a non-2xx status.
        match parse_envelope(&url, &text) {
            Ok(envelope) if !envelope.is_success() => Ok(envelope),
            _ => Err(UsgsError::Status {
                url,
                status,
                attempts,
                body: truncate_body(&text, MAX_ERROR_BODY_LENGTH),
            }),
        }
    }

    /// Sends until a non-retryable answer arrives or attempts run out.
    /// Returns the status, body and number of attempts made.
    ///
    /// A retryable status whose body is a service error envelope is returned
    /// at once: envelopes are classified, never retried.
    fn robust_request<F>(&self, url: &str, mut f: F) -> Result<(StatusCode, String, usize)>
    where
        F: FnMut() -> std::result::Result<Response, reqwest::Error>,
    {
        let max = self.retry.max_attempts.max(1);
        let mut attempt = 0usize;
        loop {
            attempt += 1;

            match f() {
                Ok(resp) => {
                    let status = resp.status();
                    let text = resp.text().map_err(|source| UsgsError::Transport {
                        url: url.to_string(),
                        attempts: attempt,
                        source,
                    })?;
                    if !retriable_status(status.as_u16()) {
                        return Ok((status, text, attempt));
                    }
                    if parse_envelope(url, &text).is_ok_and(|e| !e.is_success()) {
                        return Ok((status, text, attempt));
                    }
                    if attempt >= max {
                        return Err(UsgsError::Status {
                            url: url.to_string(),
                            status,
                            attempts: attempt,
                            body: truncate_body(&text, MAX_ERROR_BODY_LENGTH),
                        });
                    }
                    let delay = self.retry.delay(attempt);
                    warn!(%url, %status, attempt, max, ?delay, "retryable status, retrying");
                    thread::sleep(delay);
                }
                Err(err) => {
                    let transient = err.is_connect() || err.is_timeout() || err.is_request();
                    if !transient || attempt >= max {
                        return Err(UsgsError::Transport {
                            url: url.to_string(),
                            attempts: attempt,
                            source: err,
                        });
                    }
                    let delay = self.retry.delay(attempt);
                    warn!(%url, error = %err, attempt, max, ?delay, "request failed, retrying");
                    thread::sleep(delay);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn factory() -> SessionFactory {
        SessionFactory::new(
            "https://m2m.example.test/api",
            Duration::from_secs(5),
            RetryPolicy::default(),
        )
    }

    #[test]
    fn default_policy_is_five_attempts_factor_two() {
        let p = RetryPolicy::default();
        assert_eq!(p.max_attempts, 5);
        assert_eq!(p.delay(1), Duration::from_secs(2));
        assert_eq!(p.delay(4), Duration::from_secs(16));
    }

    #[test]
    fn key_makes_session_authenticated() {
        assert!(factory().open(Some("abc")).unwrap().is_authenticated());
    }

    #[test]
    fn absent_or_empty_key_is_unauthenticated() {
        for key in [None, Some("")] {
            assert!(!factory().open(key).unwrap().is_authenticated());
        }
    }

    #[test]
    fn auth_header_constant_is_a_valid_header_name() {
        let name = HeaderName::from_bytes(AUTH_HEADER.as_bytes()).unwrap();
        assert_eq!(name.as_str(), "x-auth-token");
    }

    #[test]
    fn invalid_key_is_a_config_error() {
        let err = factory().open(Some("bad\nkey")).unwrap_err();
        assert!(matches!(err, UsgsError::Config(_)));
    }
}
