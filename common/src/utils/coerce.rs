//! Permissive numeric coercion for loosely typed input fields.
//!
//! Source records carry prices, ratings and counts as native JSON numbers, as
//! numeric strings, or as placeholder text. Placeholders collapse to `None`.

use chrono::{DateTime, NaiveDateTime};
use serde_json::Value;

/// Text values treated as "no value".
const MISSING_MARKERS: [&str; 5] = ["", "\u{2014}", "-", "NA", "N/A"];

fn numeric_text(raw: &str) -> Option<&str> {
    let trimmed = raw.trim();
    if MISSING_MARKERS.contains(&trimmed) {
        None
    } else {
        Some(trimmed)
    }
}

/// Coerces a JSON value into a finite float.
pub fn coerce_float(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(number) => number.as_f64(),
        Value::String(raw) => numeric_text(raw).and_then(|text| text.parse::<f64>().ok()),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

/// Coerces a JSON value into an integer; fractional input is truncated toward
/// zero, so `"12.7"` becomes `12`.
#[allow(clippy::cast_possible_truncation)]
pub fn coerce_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().filter(|v| v.is_finite()).map(|v| v.trunc() as i64)),
        Value::String(raw) => {
            let text = numeric_text(raw)?;
            text.parse::<i64>().ok().or_else(|| {
                text.parse::<f64>()
                    .ok()
                    .filter(|v| v.is_finite())
                    .map(|v| v.trunc() as i64)
            })
        }
        _ => None,
    }
}

/// Reads a text field. Numbers and booleans keep their JSON spelling;
/// arrays, objects and `null` yield `None`.
pub fn coerce_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

/// Reads a boolean field, accepting `"true"` and `"false"` in any case.
pub fn coerce_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(flag) => Some(*flag),
        Value::String(text) => match text.trim().to_ascii_lowercase().as_str() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Trimmed, non-empty record key.
pub fn coerce_key(value: &Value) -> Option<String> {
    coerce_text(value)
        .map(|key| key.trim().to_string())
        .filter(|key| !key.is_empty())
}

/// Converts an epoch-milliseconds value into a UTC calendar timestamp with
/// second precision. Zero, missing and unparseable values yield `None`.
pub fn epoch_millis_to_timestamp(value: &Value) -> Option<NaiveDateTime> {
    let millis = coerce_int(value).filter(|ms| *ms != 0)?;
    DateTime::from_timestamp(millis.div_euclid(1000), 0).map(|dt| dt.naive_utc())
}

/// Serializes a structured value into its canonical text form (object keys in
/// sorted order, no insignificant whitespace). JSON `null` stays absent.
pub fn canonical_json(value: Option<&Value>) -> Option<String> {
    match value {
        None | Some(Value::Null) => None,
        Some(value) => serde_json::to_string(value).ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn placeholders_and_null_coerce_to_none() {
        for raw in [
            json!("\u{2014}"),
            json!("-"),
            json!("NA"),
            json!("N/A"),
            json!(""),
            json!("   "),
            Value::Null,
        ] {
            assert_eq!(coerce_float(&raw), None, "float for {raw}");
            assert_eq!(coerce_int(&raw), None, "int for {raw}");
        }
    }

    #[test]
    fn scalars_coerce_to_text_and_containers_do_not() {
        assert_eq!(coerce_text(&json!("Acme")).as_deref(), Some("Acme"));
        assert_eq!(coerce_text(&json!(5)).as_deref(), Some("5"));
        assert_eq!(coerce_text(&json!(2.5)).as_deref(), Some("2.5"));
        assert_eq!(coerce_text(&json!(true)).as_deref(), Some("true"));
        assert_eq!(coerce_text(&json!(["a"])), None);
        assert_eq!(coerce_text(&json!({"a": 1})), None);
        assert_eq!(coerce_text(&Value::Null), None);
    }

    #[test]
    fn booleans_accept_textual_spellings() {
        assert_eq!(coerce_bool(&json!(true)), Some(true));
        assert_eq!(coerce_bool(&json!("true")), Some(true));
        assert_eq!(coerce_bool(&json!(" False ")), Some(false));
        assert_eq!(coerce_bool(&json!("yes")), None);
        assert_eq!(coerce_bool(&json!(1)), None);
        assert_eq!(coerce_bool(&Value::Null), None);
    }

    #[test]
    fn keys_are_trimmed_and_blank_keys_dropped() {
        assert_eq!(coerce_key(&json!(" P1 ")).as_deref(), Some("P1"));
        assert_eq!(coerce_key(&json!(42)).as_deref(), Some("42"));
        assert_eq!(coerce_key(&json!("   ")), None);
        assert_eq!(coerce_key(&Value::Null), None);
    }

    #[test]
    fn numeric_strings_and_numbers_coerce_to_float() {
        assert_eq!(coerce_float(&json!("4.5")), Some(4.5));
        assert_eq!(coerce_float(&json!(" 19.99 ")), Some(19.99));
        assert_eq!(coerce_float(&json!(7)), Some(7.0));
        assert_eq!(coerce_float(&json!(7.0)), Some(7.0));
    }

    #[test]
    fn non_numeric_input_coerces_to_none() {
        assert_eq!(coerce_float(&json!("from $5")), None);
        assert_eq!(coerce_float(&json!(["1"])), None);
        assert_eq!(coerce_float(&json!({"v": 1})), None);
        assert_eq!(coerce_float(&json!(true)), None);
        assert_eq!(coerce_float(&json!("NaN")), None);
        assert_eq!(coerce_int(&json!("many")), None);
    }

    #[test]
    fn integers_accept_float_text_and_truncate() {
        assert_eq!(coerce_int(&json!(1234)), Some(1234));
        assert_eq!(coerce_int(&json!("1234")), Some(1234));
        assert_eq!(coerce_int(&json!("12.7")), Some(12));
        assert_eq!(coerce_int(&json!(3.9)), Some(3));
    }

    #[test]
    fn epoch_millis_convert_to_utc_seconds() {
        let ts = epoch_millis_to_timestamp(&json!(1_588_687_728_923_i64)).expect("timestamp");
        assert_eq!(ts.to_string(), "2020-05-05 14:08:48");

        let from_text = epoch_millis_to_timestamp(&json!("1588687728923")).expect("timestamp");
        assert_eq!(from_text, ts);
    }

    #[test]
    fn absent_or_zero_epoch_is_none() {
        assert_eq!(epoch_millis_to_timestamp(&Value::Null), None);
        assert_eq!(epoch_millis_to_timestamp(&json!(0)), None);
        assert_eq!(epoch_millis_to_timestamp(&json!("soon")), None);
    }

    #[test]
    fn canonical_json_sorts_keys_and_keeps_null_absent() {
        let value = json!({"b": 1, "a": [1, 2]});
        assert_eq!(
            canonical_json(Some(&value)).as_deref(),
            Some(r#"{"a":[1,2],"b":1}"#)
        );
        assert_eq!(canonical_json(Some(&Value::Null)), None);
        assert_eq!(canonical_json(None), None);
        assert_eq!(canonical_json(Some(&json!([]))).as_deref(), Some("[]"));
    }
}
