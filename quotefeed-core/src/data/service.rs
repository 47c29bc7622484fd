//! Request pipeline: upstream client → normalizer → reconciler → caller.
//!
//! Intraday requests absorb transient upstream failures by substituting the
//! synthetic fallback series. Daily and historical requests propagate every
//! upstream and normalization error. Storage problems never change what the
//! caller receives; they come back as notices.

use super::alpha_vantage::AlphaVantageClient;
use super::fallback::FallbackSupplier;
use super::normalize::{normalize, NormalizeHints, Normalized};
use super::provider::{DataSource, UpstreamClient};
use super::reconcile::{Reconciler, UpsertOutcome};
use super::store::{JsonFileStore, SeriesStore};
use crate::config::FeedConfig;
use crate::domain::{
    parse_date_key, DataType, DateRange, Interval, KeyPrefix, NormalizedSeries, OutputSize,
    RecordPayload, SeriesMetadata, SeriesPoints, SeriesRequest, DEFAULT_TIME_ZONE,
};
use crate::error::FeedError;
use chrono::NaiveDate;
use std::sync::Arc;
use tracing::{info, warn};

/// A series handed back to the caller, with its provenance.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedResponse {
    pub series: NormalizedSeries,
    pub source: DataSource,
    /// Entries the normalizer dropped.
    pub skipped_entries: usize,
    /// Present when the series went through the reconciler.
    pub upsert: Option<UpsertOutcome>,
    /// Absorbed, non-fatal conditions (partial loss, storage failures, and the
    /// error that triggered a fallback).
    pub notices: Vec<FeedError>,
}

impl FeedResponse {
    fn fallback(series: NormalizedSeries, cause: FeedError) -> Self {
        Self {
            series,
            source: DataSource::Fallback,
            skipped_entries: 0,
            upsert: None,
            notices: vec![cause],
        }
    }

    fn stored(series: NormalizedSeries) -> Self {
        Self {
            series,
            source: DataSource::Store,
            skipped_entries: 0,
            upsert: None,
            notices: Vec::new(),
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.source == DataSource::Fallback
    }
}

pub struct MarketDataService {
    client: Box<dyn UpstreamClient>,
    reconciler: Reconciler,
    fallback: FallbackSupplier,
}

impl MarketDataService {
    pub fn new(
        client: Box<dyn UpstreamClient>,
        store: Arc<dyn SeriesStore>,
        fallback: FallbackSupplier,
    ) -> Self {
        Self {
            client,
            reconciler: Reconciler::new(store),
            fallback,
        }
    }

    /// Wire the Alpha Vantage client and the file store from configuration.
    /// Fails with `Config` before any request when the configuration is invalid.
    pub fn from_config(config: &FeedConfig) -> Result<Self, FeedError> {
        config.validate()?;
        let client = AlphaVantageClient::new(config)?;
        let store = JsonFileStore::new(config.store_dir.clone());
        info!(
            store = %config.store_dir.display(),
            timeout_secs = config.timeout_secs,
            "market data service ready"
        );
        Ok(Self::new(
            Box::new(client),
            Arc::new(store),
            FallbackSupplier::new(config.fallback_points),
        ))
    }

    pub fn store(&self) -> &Arc<dyn SeriesStore> {
        self.reconciler.store()
    }

    /// Latest intraday bars. Falls back to synthetic data on rate limiting,
    /// empty bodies, 4xx statuses and unrecognisable payloads.
    pub fn intraday(
        &self,
        symbol: &str,
        interval: Interval,
        output_size: OutputSize,
    ) -> Result<FeedResponse, FeedError> {
        let request = SeriesRequest::intraday(symbol, interval, output_size)?;

        let normalized = self
            .client
            .fetch(&request)
            .and_then(|payload| normalize(&payload, DataType::Intraday, &hints(&request)));

        match normalized {
            Ok(normalized) => Ok(self.commit(normalized)),
            Err(e) if e.is_fallback_eligible() => {
                warn!(
                    symbol = %request.symbol,
                    %interval,
                    error = %e,
                    "serving synthetic fallback series"
                );
                let series = self.fallback.synthetic_series(&request.symbol, interval);
                Ok(FeedResponse::fallback(series, e))
            }
            Err(e) => Err(e),
        }
    }

    /// Daily adjusted series.
    pub fn daily(&self, symbol: &str, output_size: OutputSize) -> Result<FeedResponse, FeedError> {
        self.periodic(symbol, DataType::Daily, output_size)
    }

    /// Daily, weekly or monthly adjusted series. Errors propagate.
    pub fn periodic(
        &self,
        symbol: &str,
        data_type: DataType,
        output_size: OutputSize,
    ) -> Result<FeedResponse, FeedError> {
        let request = SeriesRequest::periodic(symbol, data_type, output_size)?;
        let payload = self.client.fetch(&request)?;
        let normalized = normalize(&payload, data_type, &hints(&request))?;
        Ok(self.commit(normalized))
    }

    /// Daily points dated within `[start, end]`. The full history is fetched
    /// and stored; only the returned view is narrowed.
    pub fn historical(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<FeedResponse, FeedError> {
        let range = DateRange::new(start, end)?;
        let mut response = self.daily(symbol, OutputSize::Full)?;
        response.series = response.series.filter_dates(range.start, range.end);
        Ok(response)
    }

    /// Most recent stored intraday snapshot.
    pub fn stored_intraday(
        &self,
        symbol: &str,
        interval: Interval,
    ) -> Result<Option<FeedResponse>, FeedError> {
        stored_intraday(self.store().as_ref(), symbol, interval)
    }

    /// Stored daily points within `[start, end]`.
    pub fn stored_daily(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Option<FeedResponse>, FeedError> {
        stored_daily(self.store().as_ref(), symbol, start, end)
    }

    /// Persist a normalized batch and package the response.
    fn commit(&self, normalized: Normalized) -> FeedResponse {
        let mut notices = Vec::new();
        if let Some(loss) = normalized.partial_loss() {
            notices.push(loss);
        }

        let upsert = self.reconciler.reconcile(&normalized.series);
        if let Some(storage) = upsert.storage_notice() {
            notices.push(storage);
        }

        FeedResponse {
            series: normalized.series,
            source: DataSource::Upstream,
            skipped_entries: normalized.skipped,
            upsert: Some(upsert),
            notices,
        }
    }
}

/// Most recent intraday snapshot committed for `symbol` at `interval`.
///
/// Reads straight from the store, so it works without upstream credentials.
pub fn stored_intraday(
    store: &dyn SeriesStore,
    symbol: &str,
    interval: Interval,
) -> Result<Option<FeedResponse>, FeedError> {
    let request = SeriesRequest::intraday(symbol, interval, OutputSize::Compact)?;
    let prefix = KeyPrefix::new(&request.symbol, DataType::Intraday, Some(interval));

    Ok(store.find_latest(&prefix)?.and_then(|record| match record.payload {
        RecordPayload::Snapshot(series) => Some(FeedResponse::stored(series)),
        RecordPayload::Point(_) => {
            warn!(key = %record.key, "intraday prefix holds a point record; ignoring");
            None
        }
    }))
}

/// Committed daily points dated within `[start, end]`, reassembled into a
/// series. `None` when nothing is stored for the symbol.
pub fn stored_daily(
    store: &dyn SeriesStore,
    symbol: &str,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Option<FeedResponse>, FeedError> {
    let range = DateRange::new(start, end)?;
    let request = SeriesRequest::daily(symbol, OutputSize::Full)?;
    let prefix = KeyPrefix::new(&request.symbol, DataType::Daily, None);
    let records = store.scan(&prefix)?;

    let Some(last_refreshed) = records.iter().map(|r| r.last_refreshed.clone()).max() else {
        return Ok(None);
    };

    let points = records
        .into_iter()
        .filter(|r| parse_date_key(&r.key.timestamp).is_some_and(|d| range.contains(d)))
        .filter_map(|r| match r.payload {
            RecordPayload::Point(point) => Some((r.key.timestamp, point)),
            RecordPayload::Snapshot(_) => None,
        })
        .collect();

    let series = NormalizedSeries {
        metadata: SeriesMetadata {
            information: None,
            symbol: request.symbol,
            data_type: DataType::Daily,
            interval: None,
            last_refreshed,
            output_size: OutputSize::Full,
            time_zone: DEFAULT_TIME_ZONE.to_string(),
        },
        points: SeriesPoints::Daily(points),
    };
    Ok(Some(FeedResponse::stored(series)))
}

fn hints(request: &SeriesRequest) -> NormalizeHints<'_> {
    NormalizeHints {
        symbol: &request.symbol,
        interval: request.interval,
        output_size: request.output_size,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::provider::RawPayload;
    use crate::data::store::MemoryStore;
    use crate::domain::{RecordKey, StoredRecord};
    use chrono::NaiveDateTime;
    use serde_json::json;
    use std::sync::Mutex;

    /// Client that replays one canned result and records what it was asked.
    struct ScriptedClient {
        result: Result<RawPayload, FeedError>,
        requests: Arc<Mutex<Vec<SeriesRequest>>>,
    }

    impl UpstreamClient for ScriptedClient {
        fn name(&self) -> &str {
            "scripted"
        }

        fn fetch(&self, request: &SeriesRequest) -> Result<RawPayload, FeedError> {
            self.requests.lock().unwrap().push(request.clone());
            self.result.clone()
        }
    }

    fn anchor() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 5)
            .unwrap()
            .and_hms_opt(16, 0, 0)
            .unwrap()
    }

    fn service(
        result: Result<RawPayload, FeedError>,
    ) -> (MarketDataService, Arc<MemoryStore>, Arc<Mutex<Vec<SeriesRequest>>>) {
        let store = Arc::new(MemoryStore::new());
        let requests = Arc::new(Mutex::new(Vec::new()));
        let client = ScriptedClient {
            result,
            requests: requests.clone(),
        };
        let svc = MarketDataService::new(
            Box::new(client),
            store.clone(),
            FallbackSupplier::with_anchor(anchor(), 20),
        );
        (svc, store, requests)
    }

    fn payload(v: serde_json::Value) -> RawPayload {
        v.as_object().cloned().unwrap()
    }

    fn intraday_payload() -> RawPayload {
        payload(json!({
            "Meta Data": {
                "1. Information": "Intraday (5min) open, high, low, close prices and volume",
                "2. Symbol": "IBM",
                "3. Last Refreshed": "2024-01-05 16:00:00",
                "4. Interval": "5min",
                "5. Output Size": "Compact",
                "6. Time Zone": "US/Eastern"
            },
            "Time Series (5min)": {
                "2024-01-05 16:00:00": {"1. open": "161.0", "2. high": "161.5", "3. low": "160.9", "4. close": "161.2", "5. volume": "1200"},
                "2024-01-05 15:55:00": {"1. open": "160.8", "2. high": "161.1", "3. low": "160.7", "4. close": "161.0", "5. volume": "900"}
            }
        }))
    }

    fn daily_payload() -> RawPayload {
        payload(json!({
            "Meta Data": {
                "1. Information": "Daily Time Series with Splits and Dividend Events",
                "2. Symbol": "IBM",
                "3. Last Refreshed": "2023-02-01",
                "4. Output Size": "Full size",
                "5. Time Zone": "US/Eastern"
            },
            "Time Series (Daily)": {
                "2023-02-01": {"1. open": "10", "2. high": "11", "3. low": "9", "4. close": "10.5", "5. adjusted close": "10.5", "6. volume": "100"},
                "2023-01-31": {"1. open": "10", "2. high": "11", "3. low": "9", "4. close": "10.4", "5. adjusted close": "10.4", "6. volume": "100"},
                "2023-01-01": {"1. open": "10", "2. high": "11", "3. low": "9", "4. close": "10.3", "5. adjusted close": "10.3", "6. volume": "100"},
                "2022-12-30": {"1. open": "10", "2. high": "11", "3. low": "9", "4. close": "10.2", "5. adjusted close": "10.2", "6. volume": "100"}
            }
        }))
    }

    #[test]
    fn intraday_success_is_stored() {
        let (svc, store, requests) = service(Ok(intraday_payload()));
        let resp = svc.intraday("ibm", Interval::Min5, OutputSize::Compact).unwrap();

        assert_eq!(resp.source, DataSource::Upstream);
        assert_eq!(resp.series.points.len(), 2);
        assert_eq!(resp.upsert.as_ref().map(|u| u.applied), Some(1));
        assert!(resp.notices.is_empty());
        assert_eq!(store.len(), 1);
        assert_eq!(requests.lock().unwrap()[0].symbol, "IBM");

        let stored = svc.stored_intraday("IBM", Interval::Min5).unwrap().unwrap();
        assert_eq!(stored.source, DataSource::Store);
        assert_eq!(stored.series, resp.series);
    }

    #[test]
    fn rate_limited_intraday_falls_back_and_is_not_stored() {
        let (svc, store, _) = service(Err(FeedError::RateLimited("5 calls per minute".into())));
        let first = svc.intraday("IBM", Interval::Min5, OutputSize::Compact).unwrap();
        let second = svc.intraday("IBM", Interval::Min5, OutputSize::Compact).unwrap();

        assert!(first.is_fallback());
        assert_eq!(first.series, second.series);
        assert_eq!(first.notices, vec![FeedError::RateLimited("5 calls per minute".into())]);
        assert!(store.is_empty());
    }

    #[test]
    fn unrecognised_intraday_payload_falls_back() {
        let (svc, _, _) = service(Ok(payload(json!({"Something": {"else": 1}}))));
        let resp = svc.intraday("IBM", Interval::Min1, OutputSize::Compact).unwrap();
        assert!(resp.is_fallback());
        assert!(matches!(resp.notices[0], FeedError::SchemaMismatch(_)));
    }

    #[test]
    fn non_eligible_intraday_errors_propagate() {
        let (svc, _, _) = service(Err(FeedError::ServerError { status: 503 }));
        let err = svc.intraday("IBM", Interval::Min5, OutputSize::Compact).unwrap_err();
        assert_eq!(err, FeedError::ServerError { status: 503 });
    }

    #[test]
    fn daily_errors_never_fall_back() {
        let (svc, _, _) = service(Err(FeedError::RateLimited("slow down".into())));
        let err = svc.daily("IBM", OutputSize::Compact).unwrap_err();
        assert!(matches!(err, FeedError::RateLimited(_)));
    }

    #[test]
    fn invalid_symbol_is_rejected_before_fetch() {
        let (svc, _, requests) = service(Ok(intraday_payload()));
        let err = svc.intraday("WAY-TOO-LONG-SYMBOL", Interval::Min5, OutputSize::Compact);
        assert!(matches!(err, Err(FeedError::InvalidRequest(_))));
        assert!(requests.lock().unwrap().is_empty());
    }

    #[test]
    fn historical_filters_range_but_stores_everything() {
        let (svc, store, requests) = service(Ok(daily_payload()));
        let start = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2023, 1, 31).unwrap();
        let resp = svc.historical("IBM", start, end).unwrap();

        assert_eq!(resp.series.points.keys(), vec!["2023-01-01", "2023-01-31"]);
        assert_eq!(store.len(), 4);
        assert_eq!(requests.lock().unwrap()[0].output_size, OutputSize::Full);

        let stored = svc.stored_daily("IBM", start, end).unwrap().unwrap();
        assert_eq!(stored.series.points.keys(), vec!["2023-01-01", "2023-01-31"]);
        assert_eq!(stored.series.metadata.last_refreshed, "2023-02-01");
    }

    #[test]
    fn historical_rejects_inverted_range() {
        let (svc, _, requests) = service(Ok(daily_payload()));
        let start = NaiveDate::from_ymd_opt(2023, 2, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
        assert!(matches!(
            svc.historical("IBM", start, end),
            Err(FeedError::InvalidRequest(_))
        ));
        assert!(requests.lock().unwrap().is_empty());
    }

    #[test]
    fn stored_views_are_empty_without_records() {
        let (svc, _, _) = service(Ok(daily_payload()));
        let day = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
        assert!(svc.stored_daily("IBM", day, day).unwrap().is_none());
        assert!(svc.stored_intraday("IBM", Interval::Min5).unwrap().is_none());
    }

    #[test]
    fn partial_loss_is_reported_as_notice() {
        let mut p = daily_payload();
        p["Time Series (Daily)"]["2023-01-31"]["4. close"] = json!("n/a");
        let (svc, _, _) = service(Ok(p));
        let resp = svc.daily("IBM", OutputSize::Full).unwrap();
        assert_eq!(resp.skipped_entries, 1);
        assert_eq!(
            resp.notices,
            vec![FeedError::PartialRecordLoss { dropped: 1, total: 4 }]
        );
    }

    /// Store where every operation fails.
    struct BrokenStore;

    impl SeriesStore for BrokenStore {
        fn upsert_one(&self, _: &RecordKey, _: &StoredRecord) -> Result<(), FeedError> {
            Err(FeedError::StorageFailure("disk full".into()))
        }
        fn find_latest(&self, _: &KeyPrefix) -> Result<Option<StoredRecord>, FeedError> {
            Err(FeedError::StorageFailure("disk full".into()))
        }
        fn scan(&self, _: &KeyPrefix) -> Result<Vec<StoredRecord>, FeedError> {
            Err(FeedError::StorageFailure("disk full".into()))
        }
    }

    fn broken_service(result: Result<RawPayload, FeedError>) -> MarketDataService {
        let client = ScriptedClient {
            result,
            requests: Arc::new(Mutex::new(Vec::new())),
        };
        MarketDataService::new(
            Box::new(client),
            Arc::new(BrokenStore),
            FallbackSupplier::with_anchor(anchor(), 20),
        )
    }

    #[test]
    fn failing_store_still_returns_daily_series() {
        let svc = broken_service(Ok(daily_payload()));
        let resp = svc.daily("IBM", OutputSize::Full).unwrap();

        assert_eq!(resp.source, DataSource::Upstream);
        assert_eq!(resp.series.points.len(), 4);
        let upsert = resp.upsert.as_ref().unwrap();
        assert_eq!(upsert.applied, 0);
        assert_eq!(upsert.failed, 4);
        assert!(matches!(resp.notices.as_slice(), [FeedError::StorageFailure(_)]));
    }

    #[test]
    fn failing_store_still_returns_intraday_series() {
        let svc = broken_service(Ok(intraday_payload()));
        let resp = svc.intraday("IBM", Interval::Min5, OutputSize::Compact).unwrap();

        assert_eq!(resp.source, DataSource::Upstream);
        assert_eq!(resp.series.points.len(), 2);
        assert!(resp.upsert.as_ref().unwrap().failed > 0);
        assert!(matches!(resp.notices.as_slice(), [FeedError::StorageFailure(_)]));
    }

    #[test]
    fn records_are_keyed_by_the_requested_symbol() {
        let mut p = daily_payload();
        p["Meta Data"]["2. Symbol"] = json!("IBM.US");
        let (svc, store, _) = service(Ok(p));
        let resp = svc.daily("ibm", OutputSize::Full).unwrap();

        assert_eq!(resp.series.metadata.symbol, "IBM");
        assert_eq!(store.len(), 4);
        let start = NaiveDate::from_ymd_opt(2022, 12, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2023, 2, 28).unwrap();
        let stored = svc.stored_daily("IBM", start, end).unwrap().unwrap();
        assert_eq!(stored.series.points.len(), 4);
    }

    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require<T: Send + Sync>() {}
        require::<MarketDataService>();
        require::<FeedResponse>();
        require::<Reconciler>();
        require::<FallbackSupplier>();
        require::<MemoryStore>();
        require::<JsonFileStore>();
        require::<AlphaVantageClient>();
    }
}
