//! Validated requests for one symbol/series.

use super::series::{DataType, Interval, OutputSize};
use crate::error::FeedError;
use chrono::NaiveDate;

pub const MAX_SYMBOL_LEN: usize = 10;

/// Provider endpoint selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FunctionKind {
    TimeSeriesIntraday,
    TimeSeriesDailyAdjusted,
    TimeSeriesWeeklyAdjusted,
    TimeSeriesMonthlyAdjusted,
}

impl FunctionKind {
    pub fn for_data_type(data_type: DataType) -> Self {
        match data_type {
            DataType::Intraday => FunctionKind::TimeSeriesIntraday,
            DataType::Daily => FunctionKind::TimeSeriesDailyAdjusted,
            DataType::Weekly => FunctionKind::TimeSeriesWeeklyAdjusted,
            DataType::Monthly => FunctionKind::TimeSeriesMonthlyAdjusted,
        }
    }

    /// Value of the provider's `function` query parameter.
    pub fn as_query(&self) -> &'static str {
        match self {
            FunctionKind::TimeSeriesIntraday => "TIME_SERIES_INTRADAY",
            FunctionKind::TimeSeriesDailyAdjusted => "TIME_SERIES_DAILY_ADJUSTED",
            FunctionKind::TimeSeriesWeeklyAdjusted => "TIME_SERIES_WEEKLY_ADJUSTED",
            FunctionKind::TimeSeriesMonthlyAdjusted => "TIME_SERIES_MONTHLY_ADJUSTED",
        }
    }
}

/// A request for one series. Construct through the validating constructors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesRequest {
    pub symbol: String,
    pub data_type: DataType,
    pub interval: Option<Interval>,
    pub output_size: OutputSize,
}

impl SeriesRequest {
    pub fn intraday(symbol: &str, interval: Interval, output_size: OutputSize) -> Result<Self, FeedError> {
        Ok(Self {
            symbol: validate_symbol(symbol)?,
            data_type: DataType::Intraday,
            interval: Some(interval),
            output_size,
        })
    }

    /// Daily, weekly or monthly request.
    pub fn periodic(symbol: &str, data_type: DataType, output_size: OutputSize) -> Result<Self, FeedError> {
        if data_type.is_intraday() {
            return Err(FeedError::InvalidRequest(
                "intraday requests need an interval".into(),
            ));
        }
        Ok(Self {
            symbol: validate_symbol(symbol)?,
            data_type,
            interval: None,
            output_size,
        })
    }

    pub fn daily(symbol: &str, output_size: OutputSize) -> Result<Self, FeedError> {
        Self::periodic(symbol, DataType::Daily, output_size)
    }

    pub fn function(&self) -> FunctionKind {
        FunctionKind::for_data_type(self.data_type)
    }
}

/// Inclusive calendar date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, FeedError> {
        if end < start {
            return Err(FeedError::InvalidRequest(format!(
                "end date {end} is before start date {start}"
            )));
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }
}

/// Trim, uppercase and check a ticker symbol.
pub fn validate_symbol(raw: &str) -> Result<String, FeedError> {
    let symbol = raw.trim().to_uppercase();
    if symbol.is_empty() || symbol.chars().count() > MAX_SYMBOL_LEN {
        return Err(FeedError::InvalidRequest(format!(
            "symbol must be 1-{MAX_SYMBOL_LEN} characters, got {raw:?}"
        )));
    }
    if let Some(bad) = symbol
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '.' || *c == '-'))
    {
        return Err(FeedError::InvalidRequest(format!(
            "symbol {raw:?} contains invalid character {bad:?}"
        )));
    }
    Ok(symbol)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbol_is_trimmed_and_uppercased() {
        assert_eq!(validate_symbol("  brk.b ").unwrap(), "BRK.B");
        assert_eq!(validate_symbol("ibm").unwrap(), "IBM");
    }

    #[test]
    fn symbol_length_limits() {
        assert!(validate_symbol("").is_err());
        assert!(validate_symbol("   ").is_err());
        assert!(validate_symbol("ABCDEFGHIJ").is_ok());
        assert!(validate_symbol("ABCDEFGHIJK").is_err());
    }

    #[test]
    fn symbol_rejects_query_characters() {
        let err = validate_symbol("IBM&apikey=x").unwrap_err();
        assert!(matches!(err, FeedError::InvalidRequest(_)));
    }

    #[test]
    fn periodic_rejects_intraday() {
        assert!(SeriesRequest::periodic("IBM", DataType::Intraday, OutputSize::Compact).is_err());
        let req = SeriesRequest::periodic("IBM", DataType::Weekly, OutputSize::Full).unwrap();
        assert_eq!(req.function().as_query(), "TIME_SERIES_WEEKLY_ADJUSTED");
    }

    #[test]
    fn date_range_requires_ordered_bounds() {
        let a = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
        let b = NaiveDate::from_ymd_opt(2023, 1, 31).unwrap();
        assert!(DateRange::new(a, b).is_ok());
        assert!(DateRange::new(a, a).is_ok());
        assert!(DateRange::new(b, a).is_err());
        assert!(DateRange::new(a, b).unwrap().contains(b));
    }
}
