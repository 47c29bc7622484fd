//! Response normalizer.
//!
//! Maps a raw provider payload onto [`NormalizedSeries`]:
//!
//! 1. Locate the metadata object and the time-series object by substring match
//!    on top-level keys (first match in document order wins).
//! 2. Resolve metadata fields through the priority-ordered resolver, filling
//!    gaps from caller hints and defaults.
//! 3. Coerce each time-series entry independently. A bad entry is skipped and
//!    counted; it never fails the batch.
//!
//! Intraday entries keep their OHLCV text as delivered. Daily, weekly and
//! monthly entries are parsed to numbers and gain adjusted close, dividend and
//! split fields; their keys must be bare dates.
//!
//! The series symbol is always the requested one. A payload symbol is only
//! used when the request carried none.

use super::provider::RawPayload;
use super::resolver::{self, FieldSpec};
use crate::domain::{
    parse_date_key, validate_symbol, DataType, IntradayBar, Interval, NormalizedSeries,
    OutputSize, SeriesMetadata, SeriesPoint, SeriesPoints, DEFAULT_TIME_ZONE,
};
use crate::error::FeedError;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Substrings identifying the metadata key ("Meta Data", "Information").
pub const METADATA_KEY_NEEDLES: &[&str] = &["meta", "information"];

/// Substrings identifying the time-series key ("Time Series (5min)", ...).
pub const SERIES_KEY_NEEDLES: &[&str] = &["time series", "timeseries", "time_series"];

/// Extra needle accepted for daily payloads.
pub const DAILY_KEY_NEEDLE: &str = "daily";

/// What the caller asked for; used where the payload is silent.
#[derive(Debug, Clone, Copy)]
pub struct NormalizeHints<'a> {
    pub symbol: &'a str,
    pub interval: Option<Interval>,
    pub output_size: OutputSize,
}

/// A normalized series plus the count of entries that had to be dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    pub series: NormalizedSeries,
    pub skipped: usize,
    /// Entries seen in the time-series object, valid or not.
    pub total: usize,
}

impl Normalized {
    /// `PartialRecordLoss` when any entry was dropped.
    pub fn partial_loss(&self) -> Option<FeedError> {
        (self.skipped > 0).then_some(FeedError::PartialRecordLoss {
            dropped: self.skipped,
            total: self.total,
        })
    }
}

/// Locate the metadata key.
pub fn locate_metadata_key(payload: &RawPayload) -> Option<&str> {
    resolver::find_key_containing(payload, METADATA_KEY_NEEDLES)
}

/// Locate the time-series key for the expected data type.
pub fn locate_series_key(payload: &RawPayload, expected: DataType) -> Option<&str> {
    if expected == DataType::Daily {
        let mut needles = SERIES_KEY_NEEDLES.to_vec();
        needles.push(DAILY_KEY_NEEDLE);
        resolver::find_key_containing(payload, &needles)
    } else {
        resolver::find_key_containing(payload, SERIES_KEY_NEEDLES)
    }
}

/// Normalize a provider payload.
///
/// Fails with `SchemaMismatch` when no time-series object can be located, or
/// when an intraday payload carries no interval and none was requested.
pub fn normalize(
    payload: &RawPayload,
    expected: DataType,
    hints: &NormalizeHints<'_>,
) -> Result<Normalized, FeedError> {
    let series_key = locate_series_key(payload, expected).ok_or_else(|| {
        let keys: Vec<&str> = payload.keys().map(String::as_str).collect();
        FeedError::SchemaMismatch(format!("no time-series key among {keys:?}"))
    })?;

    let entries = payload
        .get(series_key)
        .and_then(Value::as_object)
        .ok_or_else(|| {
            FeedError::SchemaMismatch(format!("time-series key {series_key:?} is not an object"))
        })?;

    let meta = match locate_metadata_key(payload) {
        Some(key) => {
            let obj = payload.get(key).and_then(Value::as_object);
            if obj.is_none() {
                warn!(key, "metadata key is not an object; using request defaults");
            }
            obj
        }
        None => {
            warn!(symbol = hints.symbol, "payload has no metadata key; using request defaults");
            None
        }
    };

    let total = entries.len();
    let (points, skipped) = if expected.is_intraday() {
        let (bars, skipped) = collect_entries(entries, |_| Ok(()), parse_intraday_bar);
        (SeriesPoints::Intraday(bars), skipped)
    } else {
        let (points, skipped) = collect_entries(entries, check_date_key, parse_point);
        (SeriesPoints::Daily(points), skipped)
    };

    let metadata = build_metadata(meta, expected, hints, &points)?;

    let normalized = Normalized {
        series: NormalizedSeries { metadata, points },
        skipped,
        total,
    };

    if let Some(loss) = normalized.partial_loss() {
        warn!(
            symbol = %normalized.series.metadata.symbol,
            data_type = %expected,
            error = %loss,
            "normalized with dropped entries"
        );
    }

    Ok(normalized)
}

/// Run `check_key` and `parse` over every entry; failures are skipped and
/// counted.
fn collect_entries<T, K, F>(
    entries: &Map<String, Value>,
    check_key: K,
    parse: F,
) -> (BTreeMap<String, T>, usize)
where
    K: Fn(&str) -> Result<(), String>,
    F: Fn(&Map<String, Value>) -> Result<T, String>,
{
    let mut out = BTreeMap::new();
    let mut skipped = 0;

    for (key, entry) in entries {
        let parsed = check_key(key).and_then(|()| match entry.as_object() {
            Some(obj) => parse(obj),
            None => Err("entry is not an object".to_string()),
        });
        match parsed {
            Ok(value) => {
                out.insert(key.trim().to_string(), value);
            }
            Err(reason) => {
                debug!(key = %key, reason = %reason, "skipping time-series entry");
                skipped += 1;
            }
        }
    }

    (out, skipped)
}

fn check_date_key(key: &str) -> Result<(), String> {
    parse_date_key(key)
        .map(|_| ())
        .ok_or_else(|| format!("key {key:?} is not a YYYY-MM-DD date"))
}

/// The validated request symbol, or the payload's when the request has none.
fn resolve_symbol(from_payload: Option<String>, requested: &str) -> Result<String, FeedError> {
    match validate_symbol(requested) {
        Ok(symbol) => {
            if let Some(other) = from_payload.filter(|s| !s.trim().eq_ignore_ascii_case(&symbol)) {
                warn!(requested = %symbol, payload = %other, "payload symbol differs from the request; ignoring it");
            }
            Ok(symbol)
        }
        Err(_) => {
            let raw = from_payload.ok_or_else(|| {
                FeedError::SchemaMismatch("no symbol in the request or the payload".into())
            })?;
            validate_symbol(&raw).map_err(|e| FeedError::SchemaMismatch(e.to_string()))
        }
    }
}

fn build_metadata(
    meta: Option<&Map<String, Value>>,
    expected: DataType,
    hints: &NormalizeHints<'_>,
    points: &SeriesPoints,
) -> Result<SeriesMetadata, FeedError> {
    let field = |spec: &FieldSpec| meta.and_then(|m| resolver::resolve_text(m, spec));

    let symbol = resolve_symbol(field(&resolver::SYMBOL), hints.symbol)?;

    let interval = if expected.is_intraday() {
        let from_payload = field(&resolver::INTERVAL).and_then(|s| match s.parse::<Interval>() {
            Ok(i) => Some(i),
            Err(e) => {
                warn!(error = %e, "ignoring unparsable interval in payload");
                None
            }
        });
        let interval = from_payload.or(hints.interval).ok_or_else(|| {
            FeedError::SchemaMismatch("intraday payload has no interval and none was requested".into())
        })?;
        Some(interval)
    } else {
        None
    };

    let last_refreshed = field(&resolver::LAST_REFRESHED)
        .or_else(|| points.latest_key().map(str::to_string))
        .unwrap_or_default();

    let output_size = field(&resolver::OUTPUT_SIZE)
        .map(|s| OutputSize::from_provider(&s))
        .unwrap_or(hints.output_size);

    Ok(SeriesMetadata {
        information: field(&resolver::INFORMATION),
        symbol,
        data_type: expected,
        interval,
        last_refreshed,
        output_size,
        time_zone: field(&resolver::TIME_ZONE).unwrap_or_else(|| DEFAULT_TIME_ZONE.to_string()),
    })
}

/// Required numeric field: text plus its finite value.
fn required_number(obj: &Map<String, Value>, spec: &FieldSpec) -> Result<(String, f64), String> {
    let text = resolver::resolve_text(obj, spec).ok_or_else(|| format!("missing {}", spec.canonical))?;
    let value = parse_finite(&text).ok_or_else(|| format!("{} is not a finite number: {text:?}", spec.canonical))?;
    Ok((text, value))
}

fn required_volume(obj: &Map<String, Value>) -> Result<(String, u64), String> {
    let spec = &resolver::VOLUME;
    let text = resolver::resolve_text(obj, spec).ok_or("missing volume")?;
    let volume = parse_volume(&text).ok_or_else(|| format!("volume is not a non-negative number: {text:?}"))?;
    Ok((text, volume))
}

/// Optional numeric field; absent or unparsable values take `default`.
fn optional_number(obj: &Map<String, Value>, spec: &FieldSpec, default: f64) -> f64 {
    match resolver::resolve_text(obj, spec) {
        None => default,
        Some(text) => parse_finite(&text).unwrap_or_else(|| {
            debug!(field = spec.canonical, value = %text, "unparsable optional field; using default");
            default
        }),
    }
}

fn parse_intraday_bar(obj: &Map<String, Value>) -> Result<IntradayBar, String> {
    let (open, _) = required_number(obj, &resolver::OPEN)?;
    let (high, _) = required_number(obj, &resolver::HIGH)?;
    let (low, _) = required_number(obj, &resolver::LOW)?;
    let (close, _) = required_number(obj, &resolver::CLOSE)?;
    let (volume, _) = required_volume(obj)?;
    Ok(IntradayBar {
        open,
        high,
        low,
        close,
        volume,
    })
}

fn parse_point(obj: &Map<String, Value>) -> Result<SeriesPoint, String> {
    let (_, open) = required_number(obj, &resolver::OPEN)?;
    let (_, high) = required_number(obj, &resolver::HIGH)?;
    let (_, low) = required_number(obj, &resolver::LOW)?;
    let (_, close) = required_number(obj, &resolver::CLOSE)?;
    let (_, volume) = required_volume(obj)?;
    Ok(SeriesPoint {
        open,
        high,
        low,
        close,
        volume,
        adjusted_close: optional_number(obj, &resolver::ADJUSTED_CLOSE, close),
        dividend_amount: optional_number(obj, &resolver::DIVIDEND_AMOUNT, 0.0),
        split_coefficient: optional_number(obj, &resolver::SPLIT_COEFFICIENT, 1.0),
    })
}

/// Parse a finite float. Rejects "NaN", "inf" and friends.
pub fn parse_finite(text: &str) -> Option<f64> {
    text.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parse a volume: an unsigned integer, or a finite non-negative number with
/// no fractional part ("1200.0").
pub fn parse_volume(text: &str) -> Option<u64> {
    let text = text.trim();
    if let Ok(v) = text.parse::<u64>() {
        return Some(v);
    }
    let v = parse_finite(text)?;
    (v >= 0.0 && v.fract() == 0.0 && v <= u64::MAX as f64).then_some(v as u64)
}
