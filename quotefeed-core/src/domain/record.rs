//! Persisted records and the keys that identify them.

use super::series::{DataType, Interval, NormalizedSeries, SeriesPoint};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identity of a stored record: (symbol, data type, interval, timestamp).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordKey {
    pub symbol: String,
    pub data_type: DataType,
    pub interval: Option<Interval>,
    pub timestamp: String,
}

impl RecordKey {
    pub fn prefix(&self) -> KeyPrefix {
        KeyPrefix {
            symbol: self.symbol.clone(),
            data_type: self.data_type,
            interval: self.interval,
        }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.prefix(), self.timestamp)
    }
}

/// Everything in a key except the timestamp. Used for latest-lookups and scans.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyPrefix {
    pub symbol: String,
    pub data_type: DataType,
    pub interval: Option<Interval>,
}

impl KeyPrefix {
    pub fn new(symbol: &str, data_type: DataType, interval: Option<Interval>) -> Self {
        Self {
            symbol: symbol.to_string(),
            data_type,
            interval,
        }
    }

    pub fn key(&self, timestamp: &str) -> RecordKey {
        RecordKey {
            symbol: self.symbol.clone(),
            data_type: self.data_type,
            interval: self.interval,
            timestamp: timestamp.to_string(),
        }
    }

    pub fn matches(&self, key: &RecordKey) -> bool {
        key.symbol == self.symbol && key.data_type == self.data_type && key.interval == self.interval
    }
}

impl fmt::Display for KeyPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.interval {
            Some(interval) => write!(f, "{}/{}-{}", self.symbol, self.data_type, interval),
            None => write!(f, "{}/{}", self.symbol, self.data_type),
        }
    }
}

/// What a record holds: a whole intraday snapshot or one dated point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum RecordPayload {
    Snapshot(NormalizedSeries),
    Point(SeriesPoint),
}

/// A committed record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub key: RecordKey,
    /// `last_refreshed` of the series this record was written from.
    pub last_refreshed: String,
    pub stored_at: DateTime<Utc>,
    pub payload: RecordPayload,
}

impl StoredRecord {
    pub fn snapshot(key: RecordKey, series: NormalizedSeries) -> Self {
        Self {
            key,
            last_refreshed: series.metadata.last_refreshed.clone(),
            stored_at: Utc::now(),
            payload: RecordPayload::Snapshot(series),
        }
    }

    pub fn point(key: RecordKey, last_refreshed: &str, point: SeriesPoint) -> Self {
        Self {
            key,
            last_refreshed: last_refreshed.to_string(),
            stored_at: Utc::now(),
            payload: RecordPayload::Point(point),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_matches_only_same_series() {
        let prefix = KeyPrefix::new("MSFT", DataType::Intraday, Some(Interval::Min5));
        let key = prefix.key("2024-01-02 16:00:00");
        assert!(prefix.matches(&key));
        assert_eq!(key.prefix(), prefix);

        let other_interval = KeyPrefix::new("MSFT", DataType::Intraday, Some(Interval::Min1));
        assert!(!other_interval.matches(&key));

        let daily = KeyPrefix::new("MSFT", DataType::Daily, None);
        assert!(!daily.matches(&key));
    }

    #[test]
    fn keys_order_by_timestamp_within_prefix() {
        let prefix = KeyPrefix::new("IBM", DataType::Daily, None);
        let a = prefix.key("2024-01-02");
        let b = prefix.key("2024-01-03");
        assert!(a < b);
    }

    #[test]
    fn display_names_the_series() {
        let key = KeyPrefix::new("IBM", DataType::Intraday, Some(Interval::Min15)).key("t");
        assert_eq!(key.to_string(), "IBM/intraday-15min@t");
    }
}
