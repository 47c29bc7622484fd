//! Alpha Vantage upstream client.
//!
//! Issues one `query` request per call with a bounded timeout and classifies
//! the outcome. The provider reports rate limiting and bad symbols inside
//! HTTP 200 bodies, so classification looks at the body as well as the status.
//!
//! The client never retries. Substitution on failure is the service's job.

use super::provider::{RawPayload, UpstreamClient};
use crate::config::FeedConfig;
use crate::domain::SeriesRequest;
use crate::error::FeedError;
use std::time::Duration;
use tracing::{debug, warn};

/// Top-level keys the provider uses for advisory notices.
const NOTICE_KEYS: &[&str] = &["note", "information"];

/// Top-level key the provider uses for rejected requests.
const ERROR_KEY: &str = "error message";

/// Phrases that mark a notice as a rate-limit response.
const RATE_LIMIT_MARKERS: &[&str] = &["rate limit", "call frequency", "requests per"];

/// Alpha Vantage data client.
pub struct AlphaVantageClient {
    client: reqwest::blocking::Client,
    base_url: String,
    api_key: String,
    timeout: Duration,
}

impl AlphaVantageClient {
    /// Build a client from validated configuration. Fails with
    /// `FeedError::Config` when the API key is missing.
    pub fn new(config: &FeedConfig) -> Result<Self, FeedError> {
        let api_key = config.require_api_key()?.to_string();
        let timeout = config.timeout();
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("quotefeed/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FeedError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            api_key,
            timeout,
        })
    }

    /// Query parameters for a request, without the API key.
    fn query_params(request: &SeriesRequest) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("function", request.function().as_query().to_string()),
            ("symbol", request.symbol.clone()),
            ("outputsize", request.output_size.as_str().to_string()),
            ("datatype", "json".to_string()),
        ];
        if let Some(interval) = request.interval {
            params.push(("interval", interval.as_str().to_string()));
        }
        params
    }

    fn classify_transport_error(&self, e: reqwest::Error) -> FeedError {
        if e.is_timeout() {
            return FeedError::Timeout {
                timeout_secs: self.timeout.as_secs(),
            };
        }
        // The URL carries the API key; keep it out of messages.
        let e = e.without_url();
        if e.is_connect() {
            FeedError::NetworkUnreachable(e.to_string())
        } else if e.is_decode() || e.is_body() {
            FeedError::Malformed(e.to_string())
        } else {
            FeedError::NetworkUnreachable(e.to_string())
        }
    }
}

impl UpstreamClient for AlphaVantageClient {
    fn name(&self) -> &str {
        "alpha_vantage"
    }

    fn fetch(&self, request: &SeriesRequest) -> Result<RawPayload, FeedError> {
        let mut params = Self::query_params(request);
        debug!(
            function = request.function().as_query(),
            symbol = %request.symbol,
            interval = ?request.interval,
            "requesting series"
        );
        params.push(("apikey", self.api_key.clone()));

        let resp = self
            .client
            .get(&self.base_url)
            .query(&params)
            .send()
            .map_err(|e| self.classify_transport_error(e))?;

        let status = resp.status().as_u16();
        if let Some(err) = classify_status(status) {
            warn!(symbol = %request.symbol, status, error = %err, "upstream returned error status");
            return Err(err);
        }

        let body = resp.text().map_err(|e| self.classify_transport_error(e))?;
        let payload = parse_body(&body)?;
        classify_body(payload).map_err(|err| {
            warn!(symbol = %request.symbol, error = %err, "upstream response rejected");
            err
        })
    }
}

/// Map a non-success HTTP status to an error. `None` for 2xx.
pub fn classify_status(status: u16) -> Option<FeedError> {
    match status {
        200..=299 => None,
        429 => Some(FeedError::RateLimited(format!("HTTP {status}"))),
        400..=499 => Some(FeedError::ClientError { status }),
        500..=599 => Some(FeedError::ServerError { status }),
        _ => Some(FeedError::Malformed(format!("unexpected HTTP status {status}"))),
    }
}

/// Parse a response body into a top-level JSON object.
pub fn parse_body(body: &str) -> Result<RawPayload, FeedError> {
    let value: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| FeedError::Malformed(format!("response is not JSON: {e}")))?;
    match value {
        serde_json::Value::Object(map) => Ok(map),
        other => Err(FeedError::Malformed(format!(
            "expected a JSON object, got {}",
            json_kind(&other)
        ))),
    }
}

/// Classify a syntactically valid 2xx body.
///
/// Order: empty body, rate-limit notice, provider error message. A notice that
/// doesn't mention rate limiting is left for the normalizer.
pub fn classify_body(payload: RawPayload) -> Result<RawPayload, FeedError> {
    if payload.is_empty() {
        return Err(FeedError::EmptyResponse);
    }

    for (key, value) in &payload {
        let key_lc = key.trim().to_lowercase();
        if !NOTICE_KEYS.contains(&key_lc.as_str()) {
            continue;
        }
        if let Some(text) = value.as_str() {
            let text_lc = text.to_lowercase();
            if RATE_LIMIT_MARKERS.iter().any(|m| text_lc.contains(m)) {
                return Err(FeedError::RateLimited(text.to_string()));
            }
        }
    }

    if let Some((_, value)) = payload
        .iter()
        .find(|(key, _)| key.trim().to_lowercase() == ERROR_KEY)
    {
        let message = value
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| value.to_string());
        return Err(FeedError::UpstreamRejected(message));
    }

    Ok(payload)
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}
