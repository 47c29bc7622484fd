//! Domain types for quotefeed

pub mod record;
pub mod request;
pub mod series;

pub use record::{KeyPrefix, RecordKey, RecordPayload, StoredRecord};
pub use request::{validate_symbol, DateRange, FunctionKind, SeriesRequest};
pub use series::{
    parse_date_key, parse_key_date, DataType, IntradayBar, Interval, NormalizedSeries,
    OutputSize, SeriesMetadata, SeriesPoint, SeriesPoints, DEFAULT_TIME_ZONE,
};
