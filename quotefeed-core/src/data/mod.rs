//! Upstream access, normalization, reconciliation and persistence.

pub mod alpha_vantage;
pub mod fallback;
pub mod normalize;
pub mod provider;
pub mod reconcile;
pub mod resolver;
pub mod service;
pub mod store;
pub mod sync;

pub use alpha_vantage::AlphaVantageClient;
pub use fallback::{FallbackSupplier, FALLBACK_INFORMATION};
pub use normalize::{normalize, NormalizeHints, Normalized};
pub use provider::{DataSource, RawPayload, UpstreamClient};
pub use reconcile::{Reconciler, UpsertOutcome};
pub use service::{stored_daily, stored_intraday, FeedResponse, MarketDataService};
pub use store::{JsonFileStore, MemoryStore, SeriesStore};
pub use sync::{sync_daily, StdoutProgress, SyncProgress, SyncSummary};
