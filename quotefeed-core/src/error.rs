//! Structured error types for the feed pipeline.
//!
//! Every stage (config, request validation, upstream, normalization, storage)
//! reports through `FeedError` so the service layer can decide per variant
//! whether to propagate, fall back, or absorb.

use thiserror::Error;

/// Errors and absorbed conditions produced by the feed pipeline.
///
/// These are designed to be displayable in both CLI and log contexts.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FeedError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("upstream request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("rate limited by provider: {0}")]
    RateLimited(String),

    #[error("provider rejected the request: {0}")]
    UpstreamRejected(String),

    #[error("provider returned an empty response")]
    EmptyResponse,

    #[error("provider returned client error HTTP {status}")]
    ClientError { status: u16 },

    #[error("provider returned server error HTTP {status}")]
    ServerError { status: u16 },

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("response schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("dropped {dropped} of {total} time-series entries")]
    PartialRecordLoss { dropped: usize, total: usize },

    #[error("storage failure: {0}")]
    StorageFailure(String),
}

impl FeedError {
    /// Whether an intraday request may substitute synthetic data for this error.
    pub fn is_fallback_eligible(&self) -> bool {
        matches!(
            self,
            FeedError::RateLimited(_)
                | FeedError::EmptyResponse
                | FeedError::ClientError { .. }
                | FeedError::SchemaMismatch(_)
        )
    }
}
