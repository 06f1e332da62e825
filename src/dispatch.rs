//! Outbound HTTP dispatch.
//!
//! One call fires one request and returns a fully-populated [`Outcome`]:
//! status, measured latency, body size, and a deterministic error
//! classification. Nothing here ever propagates an error upward; transport
//! failures are data, not faults.

use std::collections::HashMap;
use std::error::Error as _;
use std::time::{Duration, Instant};

use chrono::NaiveDateTime;
use futures::StreamExt;

use crate::clock::Clock;
use crate::store::{ErrorType, Target};

/// Cap on persisted error messages.
const ERROR_MESSAGE_MAX: usize = 500;

/// What to send: a snapshot of the target taken just before the attempt.
#[derive(Debug, Clone)]
pub struct RequestSpec {
    pub url: String,
    pub method: String,
    pub headers: Option<HashMap<String, String>>,
    pub body: Option<serde_json::Value>,
}

impl RequestSpec {
    pub fn from_target(target: &Target) -> Self {
        Self {
            url: target.url.clone(),
            method: target.method.clone(),
            headers: target.headers.as_ref().map(|h| h.0.clone()),
            body: target.body_template.as_ref().map(|b| b.0.clone()),
        }
    }
}

/// Measured result of a single attempt.
#[derive(Debug, Clone)]
pub struct Outcome {
    pub status_code: Option<i64>,
    pub latency_ms: f64,
    pub response_size_bytes: i64,
    pub error_type: Option<ErrorType>,
    pub error_message: Option<String>,
    pub started_at: NaiveDateTime,
    pub completed_at: NaiveDateTime,
}

impl Outcome {
    /// A response with code in `[200, 400)` counts as success.
    pub fn is_success(&self) -> bool {
        self.error_type.is_none()
    }
}

/// Shared outbound HTTP client.
///
/// Redirects are not followed: a 3xx is recorded as the final status of the
/// attempt. Per-attempt timeouts come from the schedule, so the client itself
/// carries none.
#[derive(Clone)]
pub struct Dispatcher {
    client: reqwest::Client,
    max_response_bytes: usize,
}

impl Dispatcher {
    pub fn new(max_response_bytes: usize) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(concat!("strobe/", env!("CARGO_PKG_VERSION")))
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .expect("failed to build HTTP client");
        Self {
            client,
            max_response_bytes,
        }
    }

    /// Fire one request with the given wall-clock budget.
    ///
    /// Latency is measured from just before send to just after the body is
    /// fully read (or the error observed); the body is streamed so oversize
    /// responses are cut off at `max_response_bytes`.
    pub async fn dispatch(
        &self,
        spec: &RequestSpec,
        timeout: Duration,
        clock: &dyn Clock,
    ) -> Outcome {
        let started_at = clock.now();
        let start = Instant::now();

        let result = tokio::time::timeout(timeout, self.send_and_read(spec)).await;

        let latency_ms = elapsed_ms(start);
        let completed_at = clock.now();
        let base = |status_code, size, error_type, error_message| Outcome {
            status_code,
            latency_ms,
            response_size_bytes: size,
            error_type,
            error_message,
            started_at,
            completed_at,
        };

        match result {
            Err(_) => base(
                None,
                0,
                Some(ErrorType::Timeout),
                Some(format!("request timed out after {}s", timeout.as_secs_f64())),
            ),
            Ok(Ok((status, size))) => {
                let (error_type, error_message) = classify_status(status);
                base(Some(i64::from(status)), size as i64, error_type, error_message)
            }
            Ok(Err(failure)) => {
                let (error_type, error_message) = failure.classify();
                base(None, 0, Some(error_type), Some(error_message))
            }
        }
    }

    async fn send_and_read(&self, spec: &RequestSpec) -> Result<(u16, usize), SendFailure> {
        let method = reqwest::Method::from_bytes(spec.method.as_bytes())
            .map_err(|_| SendFailure::BadRequest(format!("invalid method: {}", spec.method)))?;

        let mut request = self.client.request(method, &spec.url);
        if let Some(body) = &spec.body {
            request = request.json(body);
        }
        if let Some(headers) = &spec.headers {
            for (name, value) in headers {
                request = request.header(name, value);
            }
        }

        let response = request.send().await.map_err(SendFailure::Transport)?;
        let status = response.status().as_u16();

        // Stream the body to measure its size without buffering it whole.
        let mut stream = response.bytes_stream();
        let mut size = 0usize;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(SendFailure::Transport)?;
            size += chunk.len();
            if size > self.max_response_bytes {
                return Err(SendFailure::Oversize);
            }
        }

        Ok((status, size))
    }
}

enum SendFailure {
    Transport(reqwest::Error),
    Oversize,
    BadRequest(String),
}

impl SendFailure {
    fn classify(&self) -> (ErrorType, String) {
        match self {
            SendFailure::Oversize => (ErrorType::Unknown, "response too large".to_string()),
            SendFailure::BadRequest(message) => (ErrorType::Unknown, truncate(message)),
            SendFailure::Transport(error) => {
                let kind = if error.is_timeout() {
                    ErrorType::Timeout
                } else if error.is_connect() {
                    if is_dns_failure(error) {
                        ErrorType::Dns
                    } else {
                        ErrorType::Connection
                    }
                } else {
                    ErrorType::Unknown
                };
                (kind, truncate(&error.to_string()))
            }
        }
    }
}

fn classify_status(status: u16) -> (Option<ErrorType>, Option<String>) {
    match status {
        200..=399 => (None, None),
        400..=499 => (Some(ErrorType::Http4xx), Some(format!("HTTP {status}"))),
        500..=599 => (Some(ErrorType::Http5xx), Some(format!("HTTP {status}"))),
        _ => (Some(ErrorType::Unknown), Some(format!("HTTP {status}"))),
    }
}

/// Hostname-resolution failures surface as connect errors; the resolver is
/// the only part of the chain that mentions lookups.
fn is_dns_failure(error: &reqwest::Error) -> bool {
    let mut source = error.source();
    while let Some(inner) = source {
        let text = inner.to_string().to_ascii_lowercase();
        if text.contains("dns") || text.contains("failed to lookup") {
            return true;
        }
        source = inner.source();
    }
    false
}

fn elapsed_ms(start: Instant) -> f64 {
    let ms = start.elapsed().as_secs_f64() * 1000.0;
    (ms * 100.0).round() / 100.0
}

fn truncate(message: &str) -> String {
    if message.len() <= ERROR_MESSAGE_MAX {
        return message.to_string();
    }
    let mut end = ERROR_MESSAGE_MAX;
    while !message.is_char_boundary(end) {
        end -= 1;
    }
    message[..end].to_string()
}
