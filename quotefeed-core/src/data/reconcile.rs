//! Reconciliation of a normalized batch against the store.
//!
//! Two models, picked by the series' data type:
//!
//! - **Intraday snapshot**: one record per (symbol, interval), timestamped by
//!   `last_refreshed`. An identical `last_refreshed` means nothing new arrived
//!   and the write is skipped.
//! - **Dated points** (daily/weekly/monthly): every point is upserted under its
//!   own date key. Keys that aren't `YYYY-MM-DD` are counted and skipped;
//!   their siblings are still written.
//!
//! Storage errors never escape: they are logged, counted in `failed`, and the
//! caller's series is returned unchanged.

use super::store::SeriesStore;
use crate::domain::{
    parse_date_key, KeyPrefix, NormalizedSeries, SeriesPoints, StoredRecord,
};
use crate::error::FeedError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What a reconcile pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpsertOutcome {
    /// Records written.
    pub applied: usize,
    /// True when an intraday snapshot matched the stored `last_refreshed`.
    pub skipped_as_stale: bool,
    /// Point keys that didn't parse as dates.
    pub invalid_keys: usize,
    /// Store operations that failed.
    pub failed: usize,
}

impl UpsertOutcome {
    /// Storage failure notice for the caller, if any write failed.
    pub fn storage_notice(&self) -> Option<FeedError> {
        (self.failed > 0).then(|| {
            FeedError::StorageFailure(format!("{} store operation(s) failed", self.failed))
        })
    }
}

/// Sole writer to the series store.
#[derive(Clone)]
pub struct Reconciler {
    store: Arc<dyn SeriesStore>,
}

impl Reconciler {
    pub fn new(store: Arc<dyn SeriesStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn SeriesStore> {
        &self.store
    }

    /// Merge `series` into the store.
    pub fn reconcile(&self, series: &NormalizedSeries) -> UpsertOutcome {
        let meta = &series.metadata;
        let prefix = KeyPrefix::new(&meta.symbol, meta.data_type, meta.interval);

        let outcome = match &series.points {
            SeriesPoints::Intraday(_) => self.reconcile_snapshot(&prefix, series),
            SeriesPoints::Daily(points) => {
                let mut outcome = UpsertOutcome::default();
                for (date, point) in points {
                    if parse_date_key(date).is_none() {
                        debug!(%prefix, key = %date, "skipping point with invalid date key");
                        outcome.invalid_keys += 1;
                        continue;
                    }
                    let record = StoredRecord::point(
                        prefix.key(date.trim()),
                        &meta.last_refreshed,
                        point.clone(),
                    );
                    self.write(&record, &mut outcome);
                }
                outcome
            }
        };

        if outcome.invalid_keys > 0 {
            warn!(%prefix, invalid_keys = outcome.invalid_keys, "points with invalid date keys were not stored");
        }
        info!(
            %prefix,
            applied = outcome.applied,
            stale = outcome.skipped_as_stale,
            failed = outcome.failed,
            "reconciled series"
        );
        outcome
    }

    fn reconcile_snapshot(&self, prefix: &KeyPrefix, series: &NormalizedSeries) -> UpsertOutcome {
        let mut outcome = UpsertOutcome::default();
        let last_refreshed = series.metadata.last_refreshed.as_str();

        match self.store.find_latest(prefix) {
            Ok(Some(existing)) if existing.last_refreshed == last_refreshed => {
                debug!(%prefix, last_refreshed, "snapshot unchanged; skipping write");
                outcome.skipped_as_stale = true;
                return outcome;
            }
            Ok(_) => {}
            Err(e) => {
                // Can't tell whether it's stale; write anyway.
                warn!(%prefix, error = %e, "latest-record lookup failed");
                outcome.failed += 1;
            }
        }

        let record = StoredRecord::snapshot(prefix.key(last_refreshed), series.clone());
        self.write(&record, &mut outcome);
        outcome
    }

    fn write(&self, record: &StoredRecord, outcome: &mut UpsertOutcome) {
        match self.store.upsert_one(&record.key, record) {
            Ok(()) => outcome.applied += 1,
            Err(e) => {
                warn!(key = %record.key, error = %e, "failed to store record");
                outcome.failed += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::store::MemoryStore;
    use crate::domain::{
        DataType, IntradayBar, Interval, OutputSize, RecordKey, SeriesMetadata, SeriesPoint,
        DEFAULT_TIME_ZONE,
    };
    use std::collections::BTreeMap;

    fn metadata(data_type: DataType, interval: Option<Interval>, refreshed: &str) -> SeriesMetadata {
        SeriesMetadata {
            information: None,
            symbol: "IBM".into(),
            data_type,
            interval,
            last_refreshed: refreshed.into(),
            output_size: OutputSize::Compact,
            time_zone: DEFAULT_TIME_ZONE.into(),
        }
    }

    fn intraday(refreshed: &str) -> NormalizedSeries {
        let bar = IntradayBar {
            open: "1.0".into(),
            high: "1.5".into(),
            low: "0.5".into(),
            close: "1.2".into(),
            volume: "10".into(),
        };
        let mut bars = BTreeMap::new();
        bars.insert(refreshed.to_string(), bar);
        NormalizedSeries {
            metadata: metadata(DataType::Intraday, Some(Interval::Min5), refreshed),
            points: SeriesPoints::Intraday(bars),
        }
    }

    fn daily(keys: &[&str]) -> NormalizedSeries {
        let points = keys
            .iter()
            .map(|k| (k.to_string(), SeriesPoint::from_ohlcv(1.0, 2.0, 0.5, 1.5, 100)))
            .collect();
        NormalizedSeries {
            metadata: metadata(DataType::Daily, None, "2024-01-05"),
            points: SeriesPoints::Daily(points),
        }
    }

    /// Store whose writes always fail.
    struct BrokenStore;

    impl SeriesStore for BrokenStore {
        fn upsert_one(&self, _: &RecordKey, _: &StoredRecord) -> Result<(), FeedError> {
            Err(FeedError::StorageFailure("disk full".into()))
        }
        fn find_latest(&self, _: &KeyPrefix) -> Result<Option<StoredRecord>, FeedError> {
            Ok(None)
        }
        fn scan(&self, _: &KeyPrefix) -> Result<Vec<StoredRecord>, FeedError> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn identical_snapshot_is_skipped_as_stale() {
        let store = Arc::new(MemoryStore::new());
        let reconciler = Reconciler::new(store.clone());
        let series = intraday("2024-01-05 16:00:00");

        let first = reconciler.reconcile(&series);
        assert_eq!(first.applied, 1);
        assert!(!first.skipped_as_stale);

        let prefix = KeyPrefix::new("IBM", DataType::Intraday, Some(Interval::Min5));
        let before = store.scan(&prefix).unwrap();

        let second = reconciler.reconcile(&series);
        assert!(second.skipped_as_stale);
        assert_eq!(second.applied, 0);
        assert_eq!(store.scan(&prefix).unwrap(), before);
    }

    #[test]
    fn newer_snapshot_is_written_under_its_refresh_time() {
        let store = Arc::new(MemoryStore::new());
        let reconciler = Reconciler::new(store.clone());
        reconciler.reconcile(&intraday("2024-01-05 15:55:00"));
        let outcome = reconciler.reconcile(&intraday("2024-01-05 16:00:00"));
        assert_eq!(outcome.applied, 1);

        let prefix = KeyPrefix::new("IBM", DataType::Intraday, Some(Interval::Min5));
        let latest = store.find_latest(&prefix).unwrap().unwrap();
        assert_eq!(latest.key.timestamp, "2024-01-05 16:00:00");
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn invalid_date_key_does_not_block_siblings() {
        let store = Arc::new(MemoryStore::new());
        let reconciler = Reconciler::new(store.clone());
        let outcome = reconciler.reconcile(&daily(&["2024-01-03", "2024-13-45", "2024-01-04"]));

        assert_eq!(outcome.applied, 2);
        assert_eq!(outcome.invalid_keys, 1);
        let stored = store.scan(&KeyPrefix::new("IBM", DataType::Daily, None)).unwrap();
        let keys: Vec<&str> = stored.iter().map(|r| r.key.timestamp.as_str()).collect();
        assert_eq!(keys, vec!["2024-01-03", "2024-01-04"]);
    }

    #[test]
    fn daily_upsert_is_idempotent() {
        let store = Arc::new(MemoryStore::new());
        let reconciler = Reconciler::new(store.clone());
        let series = daily(&["2024-01-03", "2024-01-04"]);
        reconciler.reconcile(&series);
        reconciler.reconcile(&series);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn storage_failures_are_counted_not_raised() {
        let reconciler = Reconciler::new(Arc::new(BrokenStore));
        let outcome = reconciler.reconcile(&daily(&["2024-01-03", "2024-01-04"]));
        assert_eq!(outcome.applied, 0);
        assert_eq!(outcome.failed, 2);
        assert!(matches!(outcome.storage_notice(), Some(FeedError::StorageFailure(_))));
    }
}
