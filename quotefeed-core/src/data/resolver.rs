//! Priority-ordered field resolver.
//!
//! The provider spells the same field several ways ("2. Symbol", "Symbol",
//! "4. close", "close", numbered differently per endpoint). Each canonical
//! field carries an ordered candidate list; the first candidate present wins.
//! Exact matches are tried before case-insensitive ones so a well-formed
//! payload never depends on casing rules.

use serde_json::{Map, Value};

/// Canonical field name plus the provider spellings that map to it.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub canonical: &'static str,
    pub candidates: &'static [&'static str],
}

// ── Metadata fields ──────────────────────────────────────────────────

pub const INFORMATION: FieldSpec = FieldSpec {
    canonical: "information",
    candidates: &["1. Information", "Information"],
};

pub const SYMBOL: FieldSpec = FieldSpec {
    canonical: "symbol",
    candidates: &["2. Symbol", "Symbol"],
};

pub const LAST_REFRESHED: FieldSpec = FieldSpec {
    canonical: "last_refreshed",
    candidates: &["3. Last Refreshed", "Last Refreshed"],
};

pub const INTERVAL: FieldSpec = FieldSpec {
    canonical: "interval",
    candidates: &["4. Interval", "Interval"],
};

pub const OUTPUT_SIZE: FieldSpec = FieldSpec {
    canonical: "output_size",
    candidates: &["4. Output Size", "5. Output Size", "Output Size"],
};

pub const TIME_ZONE: FieldSpec = FieldSpec {
    canonical: "time_zone",
    candidates: &["5. Time Zone", "6. Time Zone", "4. Time Zone", "Time Zone"],
};

// ── Observation fields ───────────────────────────────────────────────

pub const OPEN: FieldSpec = FieldSpec {
    canonical: "open",
    candidates: &["1. open", "open"],
};

pub const HIGH: FieldSpec = FieldSpec {
    canonical: "high",
    candidates: &["2. high", "high"],
};

pub const LOW: FieldSpec = FieldSpec {
    canonical: "low",
    candidates: &["3. low", "low"],
};

pub const CLOSE: FieldSpec = FieldSpec {
    canonical: "close",
    candidates: &["4. close", "close"],
};

/// Plain endpoints number volume 5, adjusted endpoints number it 6.
pub const VOLUME: FieldSpec = FieldSpec {
    canonical: "volume",
    candidates: &["5. volume", "6. volume", "volume"],
};

pub const ADJUSTED_CLOSE: FieldSpec = FieldSpec {
    canonical: "adjusted_close",
    candidates: &["5. adjusted close", "adjusted close", "adjusted_close"],
};

pub const DIVIDEND_AMOUNT: FieldSpec = FieldSpec {
    canonical: "dividend_amount",
    candidates: &["7. dividend amount", "dividend amount", "dividend_amount"],
};

pub const SPLIT_COEFFICIENT: FieldSpec = FieldSpec {
    canonical: "split_coefficient",
    candidates: &["8. split coefficient", "split coefficient", "split_coefficient"],
};

/// Look up a field by its candidates: exact pass first, then case-insensitive.
pub fn resolve<'a>(obj: &'a Map<String, Value>, spec: &FieldSpec) -> Option<&'a Value> {
    for candidate in spec.candidates {
        if let Some(v) = obj.get(*candidate) {
            return Some(v);
        }
    }
    for candidate in spec.candidates {
        if let Some((_, v)) = obj
            .iter()
            .find(|(k, _)| k.trim().eq_ignore_ascii_case(candidate))
        {
            return Some(v);
        }
    }
    None
}

/// Resolve a field as trimmed text. Numbers are rendered with serde_json's
/// formatting; other JSON types and blank strings count as absent.
pub fn resolve_text(obj: &Map<String, Value>, spec: &FieldSpec) -> Option<String> {
    resolve(obj, spec).and_then(value_text)
}

/// Text form of a scalar JSON value.
pub fn value_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

/// First key, in iteration order, whose lowercase form contains any needle.
///
/// Ambiguity is not resolved semantically: with several matching keys the
/// earliest one wins.
pub fn find_key_containing<'a>(obj: &'a Map<String, Value>, needles: &[&str]) -> Option<&'a str> {
    obj.keys()
        .find(|key| {
            let key_lc = key.to_lowercase();
            needles.iter().any(|n| key_lc.contains(n))
        })
        .map(String::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn numbered_spelling_wins_over_bare() {
        let m = obj(json!({"close": "1.0", "4. close": "2.0"}));
        assert_eq!(resolve_text(&m, &CLOSE).as_deref(), Some("2.0"));
    }

    #[test]
    fn bare_spelling_used_when_numbered_absent() {
        let m = obj(json!({"Symbol": "ibm"}));
        assert_eq!(resolve_text(&m, &SYMBOL).as_deref(), Some("ibm"));
    }

    #[test]
    fn case_variants_resolve() {
        let m = obj(json!({"4. CLOSE": "3.5", " Last refreshed ": "2024-01-02"}));
        assert_eq!(resolve_text(&m, &CLOSE).as_deref(), Some("3.5"));
        assert_eq!(resolve_text(&m, &LAST_REFRESHED).as_deref(), Some("2024-01-02"));
    }

    #[test]
    fn numbers_and_blanks() {
        let m = obj(json!({"5. volume": 1200, "1. open": "  ", "2. high": null}));
        assert_eq!(resolve_text(&m, &VOLUME).as_deref(), Some("1200"));
        assert_eq!(resolve_text(&m, &OPEN), None);
        assert_eq!(resolve_text(&m, &HIGH), None);
    }

    #[test]
    fn adjusted_volume_numbering() {
        let m = obj(json!({"5. adjusted close": "10.0", "6. volume": "77"}));
        assert_eq!(resolve_text(&m, &VOLUME).as_deref(), Some("77"));
        assert_eq!(resolve_text(&m, &ADJUSTED_CLOSE).as_deref(), Some("10.0"));
    }

    #[test]
    fn find_key_takes_first_in_order() {
        let m = obj(json!({"Meta Data": {}, "Time Series (5min)": {}, "Time Series (1min)": {}}));
        assert_eq!(find_key_containing(&m, &["time series"]), Some("Time Series (5min)"));
        assert_eq!(find_key_containing(&m, &["meta"]), Some("Meta Data"));
        assert_eq!(find_key_containing(&m, &["nothing"]), None);
    }
}
