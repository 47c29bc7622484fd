//! Upstream client trait and provenance types.
//!
//! The `UpstreamClient` trait abstracts over the data source so the service can
//! run against the real provider or a scripted client in tests.

use crate::domain::SeriesRequest;
use crate::error::FeedError;
use serde::{Deserialize, Serialize};

/// Top-level JSON object exactly as the provider sent it.
///
/// Iteration follows document order (serde_json `preserve_order`), which the
/// normalizer relies on for its first-match key detection.
pub type RawPayload = serde_json::Map<String, serde_json::Value>;

/// Where a returned series came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    Upstream,
    Fallback,
    Store,
}

/// Trait for upstream data clients.
///
/// Implementations classify failures into `FeedError` variants and never
/// retry; retry and substitution policy belong to the caller.
pub trait UpstreamClient: Send + Sync {
    /// Human-readable name of this client.
    fn name(&self) -> &str;

    /// Issue one request and return the provider's payload.
    fn fetch(&self, request: &SeriesRequest) -> Result<RawPayload, FeedError>;
}

impl<T: UpstreamClient + ?Sized> UpstreamClient for Box<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn fetch(&self, request: &SeriesRequest) -> Result<RawPayload, FeedError> {
        (**self).fetch(request)
    }
}
