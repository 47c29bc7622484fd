//! QuoteFeed Core — stock time-series retrieval, normalization and storage.
//!
//! - Upstream client with response classification (rate limits hidden in
//!   HTTP 200 bodies, provider error messages, empty payloads)
//! - Response normalizer mapping loosely-typed payloads onto a strict schema
//! - Reconciler upserting normalized batches into a keyed store
//! - Deterministic synthetic fallback for intraday requests

pub mod config;
pub mod data;
pub mod domain;
pub mod error;
pub mod logging;

pub use config::FeedConfig;
pub use error::FeedError;
