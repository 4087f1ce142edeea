//! Lenient field deserializers for marketplace payloads.
//!
//! Upstream sends numbers as strings, ids as numbers or strings, and `null`
//! where a list is expected. None of that should fail a whole order.

use chrono::{DateTime, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Number or numeric string; anything else (or non-finite) becomes `None`.
pub(crate) fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value
        .and_then(|v| match v {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        })
        .filter(|v| v.is_finite()))
}

fn scalar_to_string(value: Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_owned())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// String or number rendered as a string; blank and non-scalars become `None`.
pub(crate) fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Value>::deserialize(deserializer)?.and_then(scalar_to_string))
}

/// Required identifier given as a number or a string.
pub(crate) fn id_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    lenient_string(deserializer)?.ok_or_else(|| D::Error::custom("missing or empty id"))
}

/// `null` or a missing list become an empty `Vec`.
pub(crate) fn vec_or_null<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

/// List of scalars rendered as strings; other entries are dropped.
pub(crate) fn string_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let values: Vec<Value> = vec_or_null(deserializer)?;
    Ok(values.into_iter().filter_map(scalar_to_string).collect())
}

/// RFC 3339 timestamp in any offset, converted to UTC; unparseable becomes `None`.
pub(crate) fn lenient_datetime<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(match raw {
        Some(Value::String(s)) => DateTime::parse_from_rfc3339(s.trim())
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Deserialize)]
    struct Probe {
        #[serde(default, deserialize_with = "lenient_f64")]
        amount: Option<f64>,
        #[serde(deserialize_with = "id_string")]
        id: String,
        #[serde(default, deserialize_with = "string_list")]
        tags: Vec<String>,
        #[serde(default, deserialize_with = "lenient_datetime")]
        at: Option<DateTime<Utc>>,
    }

    #[test]
    fn accepts_numeric_strings_and_numeric_ids() {
        let probe: Probe = serde_json::from_value(json!({
            "amount": "130.5",
            "id": 2_000_123_456_u64,
            "tags": ["paid", null, 3],
            "at": "2024-03-01T10:00:00.000-03:00"
        }))
        .unwrap();
        assert_eq!(probe.amount, Some(130.5));
        assert_eq!(probe.id, "2000123456");
        assert_eq!(probe.tags, vec!["paid".to_string(), "3".to_string()]);
        assert_eq!(
            probe.at.unwrap().to_rfc3339(),
            "2024-03-01T13:00:00+00:00"
        );
    }

    #[test]
    fn tolerates_nulls_and_garbage() {
        let probe: Probe = serde_json::from_value(json!({
            "amount": "n/a",
            "id": "  77 ",
            "tags": null,
            "at": "yesterday"
        }))
        .unwrap();
        assert_eq!(probe.amount, None);
        assert_eq!(probe.id, "77");
        assert!(probe.tags.is_empty());
        assert!(probe.at.is_none());
    }

    #[test]
    fn rejects_missing_id() {
        let result = serde_json::from_value::<Probe>(json!({ "id": null }));
        assert!(result.is_err());
    }
}
