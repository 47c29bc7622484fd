//! Deterministic synthetic intraday series.
//!
//! Substituted for the real upstream on transient intraday failures. Output
//! depends only on the symbol, the interval, and the anchor time captured when
//! the supplier is built, so repeated calls within one process agree exactly.

use crate::domain::{
    DataType, IntradayBar, Interval, NormalizedSeries, OutputSize, SeriesMetadata, SeriesPoints,
    DEFAULT_TIME_ZONE,
};
use crate::config::MAX_FALLBACK_POINTS;
use crate::domain::series::INTRADAY_KEY_FORMAT;
use chrono::{Duration, NaiveDateTime, Timelike, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;

pub const FALLBACK_INFORMATION: &str = "Synthetic fallback series";

/// Lowest and highest base price a symbol can hash to.
const BASE_PRICE_MIN: f64 = 20.0;
const BASE_PRICE_SPAN: f64 = 480.0;

#[derive(Debug, Clone)]
pub struct FallbackSupplier {
    anchor: NaiveDateTime,
    points: usize,
}

impl FallbackSupplier {
    /// Supplier anchored at the current minute (UTC).
    pub fn new(points: usize) -> Self {
        let now = Utc::now().naive_utc();
        let anchor = now
            .with_second(0)
            .and_then(|t| t.with_nanosecond(0))
            .unwrap_or(now);
        Self::with_anchor(anchor, points)
    }

    /// `points` is clamped to `1..=MAX_FALLBACK_POINTS`.
    pub fn with_anchor(anchor: NaiveDateTime, points: usize) -> Self {
        Self {
            anchor,
            points: points.clamp(1, MAX_FALLBACK_POINTS),
        }
    }

    /// Synthetic bars ending at the anchor, one per `interval`.
    pub fn synthetic_series(&self, symbol: &str, interval: Interval) -> NormalizedSeries {
        let symbol = symbol.trim().to_uppercase();
        let mut rng = StdRng::from_seed(self.seed(&symbol, interval));
        let minutes = interval.minutes();
        let offset = |i: usize| Duration::minutes(minutes * i as i64);
        let first = self.anchor - offset(self.points - 1);

        let mut bars = BTreeMap::new();
        let mut price = base_price(&symbol);
        for i in 0..self.points {
            let ts = first + offset(i);
            let bar_return: f64 = rng.gen_range(-0.004..0.004);
            let open = price;
            let close = price * (1.0 + bar_return);
            let high = open.max(close) * (1.0 + rng.gen_range(0.0..0.002));
            let low = open.min(close) * (1.0 - rng.gen_range(0.0..0.002));
            let volume = rng.gen_range(1_000..50_000u64);

            bars.insert(
                ts.format(INTRADAY_KEY_FORMAT).to_string(),
                IntradayBar {
                    open: format!("{open:.4}"),
                    high: format!("{high:.4}"),
                    low: format!("{low:.4}"),
                    close: format!("{close:.4}"),
                    volume: volume.to_string(),
                },
            );
            price = close;
        }

        NormalizedSeries {
            metadata: SeriesMetadata {
                information: Some(FALLBACK_INFORMATION.to_string()),
                symbol,
                data_type: DataType::Intraday,
                interval: Some(interval),
                last_refreshed: self.anchor.format(INTRADAY_KEY_FORMAT).to_string(),
                output_size: OutputSize::Compact,
                time_zone: DEFAULT_TIME_ZONE.to_string(),
            },
            points: SeriesPoints::Intraday(bars),
        }
    }

    fn seed(&self, symbol: &str, interval: Interval) -> [u8; 32] {
        let mut hasher = blake3::Hasher::new();
        hasher.update(symbol.as_bytes());
        hasher.update(b"|");
        hasher.update(interval.as_str().as_bytes());
        hasher.update(b"|");
        hasher.update(self.anchor.format(INTRADAY_KEY_FORMAT).to_string().as_bytes());
        *hasher.finalize().as_bytes()
    }
}

/// Starting price for a symbol, stable across processes.
fn base_price(symbol: &str) -> f64 {
    let hash = blake3::hash(symbol.as_bytes());
    let bytes = hash.as_bytes();
    let n = u16::from_le_bytes([bytes[0], bytes[1]]);
    BASE_PRICE_MIN + BASE_PRICE_SPAN * (n as f64 / u16::MAX as f64)
}
