//! Normalized series — the canonical shape every upstream payload is mapped into.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_TIME_ZONE: &str = "US/Eastern";

/// Date-only key format used by daily, weekly and monthly series.
pub const DATE_KEY_FORMAT: &str = "%Y-%m-%d";

/// Intraday key format.
pub const INTRADAY_KEY_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Kind of series a request asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Intraday,
    Daily,
    Weekly,
    Monthly,
}

impl DataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Intraday => "intraday",
            DataType::Daily => "daily",
            DataType::Weekly => "weekly",
            DataType::Monthly => "monthly",
        }
    }

    pub fn is_intraday(&self) -> bool {
        matches!(self, DataType::Intraday)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Intraday sampling interval (granularity).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Interval {
    #[serde(rename = "1min")]
    Min1,
    #[serde(rename = "5min")]
    Min5,
    #[serde(rename = "15min")]
    Min15,
    #[serde(rename = "30min")]
    Min30,
    #[serde(rename = "60min")]
    Min60,
}

impl Interval {
    pub const ALL: [Interval; 5] = [
        Interval::Min1,
        Interval::Min5,
        Interval::Min15,
        Interval::Min30,
        Interval::Min60,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Interval::Min1 => "1min",
            Interval::Min5 => "5min",
            Interval::Min15 => "15min",
            Interval::Min30 => "30min",
            Interval::Min60 => "60min",
        }
    }

    pub fn minutes(&self) -> i64 {
        match self {
            Interval::Min1 => 1,
            Interval::Min5 => 5,
            Interval::Min15 => 15,
            Interval::Min30 => 30,
            Interval::Min60 => 60,
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Interval {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Interval::ALL
            .into_iter()
            .find(|i| i.as_str() == wanted)
            .ok_or_else(|| format!("unsupported interval '{s}' (expected 1min, 5min, 15min, 30min or 60min)"))
    }
}

/// Amount of history the provider was asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputSize {
    #[default]
    Compact,
    Full,
}

impl OutputSize {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputSize::Compact => "compact",
            OutputSize::Full => "full",
        }
    }

    /// Lenient parse of provider spellings ("Compact", "Full size", "full").
    /// Anything unrecognised is compact.
    pub fn from_provider(s: &str) -> Self {
        if s.trim().to_lowercase().starts_with("full") {
            OutputSize::Full
        } else {
            OutputSize::Compact
        }
    }
}

/// Descriptive header of a normalized series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub information: Option<String>,
    pub symbol: String,
    pub data_type: DataType,
    /// Present iff `data_type` is intraday.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<Interval>,
    pub last_refreshed: String,
    pub output_size: OutputSize,
    pub time_zone: String,
}

/// One daily/weekly/monthly observation with parsed numeric fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesPoint {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
    pub adjusted_close: f64,
    pub dividend_amount: f64,
    pub split_coefficient: f64,
}

impl SeriesPoint {
    /// Point with the optional fields at their defaults.
    pub fn from_ohlcv(open: f64, high: f64, low: f64, close: f64, volume: u64) -> Self {
        Self {
            open,
            high,
            low,
            close,
            volume,
            adjusted_close: close,
            dividend_amount: 0.0,
            split_coefficient: 1.0,
        }
    }
}

/// One intraday observation. Fields keep the provider's original text; each
/// is guaranteed to parse as a finite number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntradayBar {
    pub open: String,
    pub high: String,
    pub low: String,
    pub close: String,
    pub volume: String,
}

impl IntradayBar {
    /// Numeric view of the bar. `None` only if the strings were tampered with
    /// after normalization.
    pub fn to_point(&self) -> Option<SeriesPoint> {
        let num = |s: &str| s.trim().parse::<f64>().ok().filter(|v| v.is_finite());
        let volume = self.volume.trim().parse::<f64>().ok()?;
        if !volume.is_finite() || volume < 0.0 {
            return None;
        }
        Some(SeriesPoint::from_ohlcv(
            num(&self.open)?,
            num(&self.high)?,
            num(&self.low)?,
            num(&self.close)?,
            volume as u64,
        ))
    }
}

/// Time-series body. The variant is tied to the metadata's data type:
/// intraday series hold bars keyed by timestamp, everything else holds points
/// keyed by date. Keys iterate ascending.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", content = "entries", rename_all = "snake_case")]
pub enum SeriesPoints {
    Intraday(BTreeMap<String, IntradayBar>),
    Daily(BTreeMap<String, SeriesPoint>),
}

impl SeriesPoints {
    pub fn len(&self) -> usize {
        match self {
            SeriesPoints::Intraday(m) => m.len(),
            SeriesPoints::Daily(m) => m.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn keys(&self) -> Vec<&str> {
        match self {
            SeriesPoints::Intraday(m) => m.keys().map(String::as_str).collect(),
            SeriesPoints::Daily(m) => m.keys().map(String::as_str).collect(),
        }
    }

    /// Greatest key, which is the newest observation for ISO-formatted keys.
    pub fn latest_key(&self) -> Option<&str> {
        match self {
            SeriesPoints::Intraday(m) => m.keys().next_back().map(String::as_str),
            SeriesPoints::Daily(m) => m.keys().next_back().map(String::as_str),
        }
    }

    fn matches(&self, data_type: DataType) -> bool {
        matches!(
            (self, data_type.is_intraday()),
            (SeriesPoints::Intraday(_), true) | (SeriesPoints::Daily(_), false)
        )
    }
}

/// A validated series: metadata plus unique, ordered observations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedSeries {
    pub metadata: SeriesMetadata,
    #[serde(rename = "timeSeries")]
    pub points: SeriesPoints,
}

impl NormalizedSeries {
    /// Whether metadata and body agree (intraday ⇔ interval set ⇔ bar shape)
    /// and every daily, weekly or monthly key is a bare date.
    pub fn is_consistent(&self) -> bool {
        let dt = self.metadata.data_type;
        let keys_ok = match &self.points {
            SeriesPoints::Daily(m) => m.keys().all(|k| parse_date_key(k).is_some()),
            SeriesPoints::Intraday(_) => true,
        };
        self.points.matches(dt) && (dt.is_intraday() == self.metadata.interval.is_some()) && keys_ok
    }

    /// Copy of this series keeping only date keys within `[start, end]`.
    ///
    /// Keys that don't parse as dates are dropped, since they can't be shown
    /// to fall inside the range. Intraday keys are compared by their date part.
    pub fn filter_dates(&self, start: NaiveDate, end: NaiveDate) -> NormalizedSeries {
        let in_range = |key: &str| parse_key_date(key).is_some_and(|d| d >= start && d <= end);
        let points = match &self.points {
            SeriesPoints::Intraday(m) => SeriesPoints::Intraday(
                m.iter()
                    .filter(|(k, _)| in_range(k.as_str()))
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
            ),
            SeriesPoints::Daily(m) => SeriesPoints::Daily(
                m.iter()
                    .filter(|(k, _)| in_range(k.as_str()))
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
            ),
        };
        NormalizedSeries {
            metadata: self.metadata.clone(),
            points,
        }
    }
}

/// Parse the date part of a series key ("2024-01-02" or "2024-01-02 16:00:00").
pub fn parse_key_date(key: &str) -> Option<NaiveDate> {
    let date_part = key.trim().get(..10)?;
    NaiveDate::parse_from_str(date_part, DATE_KEY_FORMAT).ok()
}

/// Parse a key that must be a bare date.
pub fn parse_date_key(key: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(key.trim(), DATE_KEY_FORMAT).ok()
}
