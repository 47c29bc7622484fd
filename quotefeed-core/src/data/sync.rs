//! Batch daily sync — refreshes stored daily history for a list of symbols.

use super::service::MarketDataService;
use crate::domain::OutputSize;
use crate::error::FeedError;
use tracing::info;

/// Progress callback for multi-symbol syncs.
pub trait SyncProgress: Send {
    /// Called before a symbol is requested.
    fn on_start(&self, symbol: &str, index: usize, total: usize);

    /// Called when a symbol finishes. `Ok` carries the number of records written.
    fn on_complete(&self, symbol: &str, index: usize, total: usize, result: &Result<usize, FeedError>);

    /// Called once the whole batch is done.
    fn on_batch_complete(&self, succeeded: usize, failed: usize, total: usize);
}

/// Progress reporter that prints to stdout.
pub struct StdoutProgress;

impl SyncProgress for StdoutProgress {
    fn on_start(&self, symbol: &str, index: usize, total: usize) {
        println!("[{}/{}] Syncing {symbol}...", index + 1, total);
    }

    fn on_complete(&self, symbol: &str, _index: usize, _total: usize, result: &Result<usize, FeedError>) {
        match result {
            Ok(applied) => println!("  OK: {symbol} ({applied} records)"),
            Err(e) => println!("  FAIL: {symbol}: {e}"),
        }
    }

    fn on_batch_complete(&self, succeeded: usize, failed: usize, total: usize) {
        println!("\nSync complete: {succeeded}/{total} succeeded, {failed} failed");
    }
}

/// Summary of a batch sync.
#[derive(Debug)]
pub struct SyncSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub errors: Vec<(String, FeedError)>,
}

impl SyncSummary {
    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }
}

/// Fetch and store daily history for each symbol in order. A failing symbol
/// is recorded and the batch moves on.
pub fn sync_daily(
    service: &MarketDataService,
    symbols: &[&str],
    output_size: OutputSize,
    progress: &dyn SyncProgress,
) -> SyncSummary {
    let total = symbols.len();
    let mut succeeded = 0;
    let mut failed = 0;
    let mut errors = Vec::new();

    for (i, symbol) in symbols.iter().enumerate() {
        progress.on_start(symbol, i, total);

        let result = service
            .daily(symbol, output_size)
            .map(|resp| resp.upsert.map_or(0, |u| u.applied));
        progress.on_complete(symbol, i, total, &result);

        match result {
            Ok(_) => succeeded += 1,
            Err(e) => {
                errors.push((symbol.to_string(), e));
                failed += 1;
            }
        }
    }

    progress.on_batch_complete(succeeded, failed, total);
    info!(total, succeeded, failed, "daily sync finished");

    SyncSummary {
        total,
        succeeded,
        failed,
        errors,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::fallback::FallbackSupplier;
    use crate::data::provider::{RawPayload, UpstreamClient};
    use crate::data::store::MemoryStore;
    use crate::domain::SeriesRequest;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    /// Serves a one-point daily series for every symbol except "BAD".
    struct PerSymbolClient;

    impl UpstreamClient for PerSymbolClient {
        fn name(&self) -> &str {
            "per-symbol"
        }

        fn fetch(&self, request: &SeriesRequest) -> Result<RawPayload, FeedError> {
            if request.symbol == "BAD" {
                return Err(FeedError::UpstreamRejected("Invalid API call.".into()));
            }
            let body = json!({
                "Meta Data": {"2. Symbol": request.symbol, "3. Last Refreshed": "2024-01-05"},
                "Time Series (Daily)": {
                    "2024-01-05": {"1. open": "1", "2. high": "2", "3. low": "0.5", "4. close": "1.5", "6. volume": "10"}
                }
            });
            Ok(body.as_object().cloned().unwrap_or_default())
        }
    }

    #[derive(Default)]
    struct RecordingProgress {
        events: Mutex<Vec<String>>,
    }

    impl SyncProgress for RecordingProgress {
        fn on_start(&self, symbol: &str, _: usize, _: usize) {
            self.events.lock().unwrap().push(format!("start {symbol}"));
        }
        fn on_complete(&self, symbol: &str, _: usize, _: usize, result: &Result<usize, FeedError>) {
            let tag = if result.is_ok() { "ok" } else { "fail" };
            self.events.lock().unwrap().push(format!("{tag} {symbol}"));
        }
        fn on_batch_complete(&self, succeeded: usize, failed: usize, total: usize) {
            self.events
                .lock()
                .unwrap()
                .push(format!("done {succeeded}/{failed}/{total}"));
        }
    }

    #[test]
    fn failures_do_not_stop_the_batch() {
        let store = Arc::new(MemoryStore::new());
        let service = MarketDataService::new(
            Box::new(PerSymbolClient),
            store.clone(),
            FallbackSupplier::new(10),
        );
        let progress = RecordingProgress::default();

        let summary = sync_daily(&service, &["IBM", "BAD", "MSFT"], OutputSize::Compact, &progress);

        assert_eq!(summary.total, 3);
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failed, 1);
        assert!(!summary.all_succeeded());
        assert_eq!(summary.errors[0].0, "BAD");
        assert_eq!(store.len(), 2);

        let events = progress.events.lock().unwrap();
        assert_eq!(
            *events,
            vec![
                "start IBM", "ok IBM", "start BAD", "fail BAD", "start MSFT", "ok MSFT",
                "done 2/1/3"
            ]
        );
    }
}
