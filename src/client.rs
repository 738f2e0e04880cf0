use std::fmt;
use std::time::Duration;

use serde_json::Value as JsonValue;
use tokio::time::sleep;

use crate::{
    ClientOptions, HttpError, PreparedRequest, RawResponse, ReqwestTransport, RequestDescriptor,
    ResponseEnvelope, Transport, TransportError,
};

/// Default number of calls made by [`ResilientClient::execute_with_retry`].
pub const DEFAULT_MAX_RETRIES: usize = 3;

/// Base of the outer backoff: waits are `2^attempt × 1000ms`, attempt counted from 1.
const OUTER_BACKOFF_MS: u64 = 1_000;

/// Markers that flag an otherwise ordinary failure as rate limiting.
const RATE_LIMIT_MARKERS: [&str; 4] = [
    "rate limit",
    "rate_limit",
    "ratelimit",
    "too many requests",
];

/// Outcome of one network attempt. Dropped as soon as the retry loop decides.
#[derive(Debug)]
enum AttemptResult {
    Success { status: u16, data: JsonValue },
    Failure(HttpError),
}

/// HTTP client that retries transient failures and always answers with a
/// [`ResponseEnvelope`].
///
/// Cloning is cheap: the default transport shares one connection pool.
#[derive(Clone)]
pub struct ResilientClient<T = ReqwestTransport> {
    transport: T,
    options: ClientOptions,
}

impl<T> fmt::Debug for ResilientClient<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResilientClient")
            .field("transport", &std::any::type_name::<T>())
            .field("options", &self.options)
            .finish()
    }
}

impl ResilientClient<ReqwestTransport> {
    /// Creates a client over a fresh `reqwest` connection pool.
    pub fn new() -> Self {
        Self::with_transport(ReqwestTransport::new())
    }

    /// Creates a client over a caller-configured `reqwest::Client`.
    pub fn from_http_client(http: reqwest::Client) -> Self {
        Self::with_transport(ReqwestTransport::with_client(http))
    }
}

impl Default for ResilientClient<ReqwestTransport> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Transport> ResilientClient<T> {
    pub fn with_transport(transport: T) -> Self {
        Self {
            transport,
            options: ClientOptions::default(),
        }
    }

    /// Applies client options such as timeout and retry behavior.
    pub fn with_options(mut self, opts: ClientOptions) -> Self {
        self.options = opts;
        self
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Runs one logical request to completion.
    ///
    /// Rate limiting and connection-level failures are retried up to
    /// `max_retries` times, waiting `retry_backoff_ms × 2^attempt` between
    /// attempts. Every other failure is returned after a single attempt.
    pub async fn execute(&self, descriptor: &RequestDescriptor) -> ResponseEnvelope {
        let request = match descriptor.prepare(self.options.timeout_ms) {
            Ok(request) => request,
            Err(err) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(url = descriptor.url(), error = %err, "rejected request descriptor");
                return ResponseEnvelope::failure(err);
            }
        };

        let mut attempt = 0usize;
        loop {
            #[cfg(feature = "tracing")]
            tracing::debug!(
                method = %request.method,
                url = %request.url,
                attempt,
                "dispatching request"
            );

            let error = match self.dispatch(&request).await {
                AttemptResult::Success { status, data } => {
                    return ResponseEnvelope::success(data, status)
                }
                AttemptResult::Failure(error) => error,
            };

            if !error.is_transient() {
                return ResponseEnvelope::failure(error);
            }
            if attempt < self.options.max_retries {
                self.wait_before_retry(attempt, &request, &error).await;
                attempt += 1;
                continue;
            }
            if attempt == 0 {
                return ResponseEnvelope::failure(error);
            }
            return ResponseEnvelope::failure(HttpError::ExhaustedRetries {
                attempts: attempt + 1,
                last: Box::new(error),
            });
        }
    }

    /// Runs [`execute`](Self::execute) up to `max_retries` times, building a
    /// fresh descriptor for each call.
    ///
    /// Client errors (`400..500`) stop immediately. Any other failure waits
    /// `2^attempt × 1000ms` (2s, 4s, ...) before the next call. Each call keeps
    /// its own transient retries, so the worst case is
    /// `max_retries × (options.max_retries + 1)` network attempts.
    pub async fn execute_with_retry<F>(&self, mut build: F, max_retries: usize) -> ResponseEnvelope
    where
        F: FnMut() -> RequestDescriptor,
    {
        let max_attempts = max_retries.max(1);
        let mut attempt = 1usize;
        loop {
            let descriptor = build();
            let envelope = self.execute(&descriptor).await;
            if envelope.is_success() || envelope.is_client_error() {
                return envelope;
            }

            if attempt >= max_attempts {
                #[cfg(feature = "tracing")]
                tracing::warn!(
                    method = %descriptor.http_method(),
                    url = descriptor.url(),
                    attempts = max_attempts,
                    "giving up after repeated failures"
                );
                let status = envelope.status();
                return match envelope.into_result() {
                    Err(last) => ResponseEnvelope::failure(HttpError::ExhaustedRetries {
                        attempts: max_attempts,
                        last: Box::new(last),
                    }),
                    Ok(data) => ResponseEnvelope::success(data, status),
                };
            }

            let delay = backoff_delay(OUTER_BACKOFF_MS, attempt);
            #[cfg(feature = "tracing")]
            tracing::warn!(
                method = %descriptor.http_method(),
                url = descriptor.url(),
                attempt,
                status = envelope.status(),
                delay_ms = delay.as_millis() as u64,
                "request failed, retrying"
            );
            sleep(delay).await;
            attempt += 1;
        }
    }

    async fn dispatch(&self, request: &PreparedRequest) -> AttemptResult {
        match self.transport.send(request).await {
            Ok(response) => classify_response(response),
            Err(err) => AttemptResult::Failure(classify_transport_error(err)),
        }
    }

    /// Sleeps `retry_backoff_ms × 2^attempt` before the next attempt.
    #[cfg_attr(not(feature = "tracing"), allow(unused_variables))]
    async fn wait_before_retry(&self, attempt: usize, request: &PreparedRequest, error: &HttpError) {
        let delay = backoff_delay(self.options.retry_backoff_ms, attempt);

        #[cfg(feature = "tracing")]
        tracing::warn!(
            method = %request.method,
            url = %request.url,
            attempt = attempt + 1,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "transient failure, retrying"
        );

        sleep(delay).await;
    }
}

fn backoff_delay(base_ms: u64, attempt: usize) -> Duration {
    let exp = attempt.min(16) as u32;
    let multiplier = 1u64 << exp;
    Duration::from_millis(base_ms.saturating_mul(multiplier))
}

fn classify_response(response: RawResponse) -> AttemptResult {
    let RawResponse { status, body } = response;
    if (200..300).contains(&status) {
        return AttemptResult::Success {
            status,
            data: parse_body(&body),
        };
    }

    let rate_limited = status == 429 || signals_rate_limit(&body);
    let body = parse_body(&body);
    let error = if rate_limited {
        HttpError::RateLimited {
            status: Some(status),
            body,
        }
    } else if status >= 500 {
        HttpError::Server { status, body }
    } else {
        HttpError::Client { status, body }
    };
    AttemptResult::Failure(error)
}

fn classify_transport_error(err: TransportError) -> HttpError {
    if err.is_connection_level() {
        HttpError::Network {
            message: err.message,
        }
    } else if signals_rate_limit(&err.message) {
        HttpError::RateLimited {
            status: None,
            body: JsonValue::String(err.message),
        }
    } else {
        HttpError::Transport {
            message: err.message,
        }
    }
}

/// JSON bodies are decoded; anything else is kept as a string, empty as `null`.
fn parse_body(body: &str) -> JsonValue {
    if body.trim().is_empty() {
        return JsonValue::Null;
    }
    serde_json::from_str(body).unwrap_or_else(|_| JsonValue::String(body.to_owned()))
}

fn signals_rate_limit(text: &str) -> bool {
    let lowered = text.to_ascii_lowercase();
    RATE_LIMIT_MARKERS
        .iter()
        .any(|marker| lowered.contains(marker))
}
