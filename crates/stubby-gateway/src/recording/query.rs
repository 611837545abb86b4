//! Query string parsing and canonical encoding for fingerprint keys.

use super::types::QueryMap;
use crate::error::GatewayError;
use serde_json::Value;
use std::collections::BTreeMap;

/// Parameter name to values, in the order they appeared.
pub type QueryValues = BTreeMap<String, Vec<String>>;

/// Parse a raw query string (`a=1&b=x+y`) into decoded name/value lists.
pub fn parse_query(raw: Option<&str>) -> QueryValues {
    let mut values = QueryValues::new();
    let Some(raw) = raw else {
        return values;
    };

    for pair in raw.split('&').filter(|pair| !pair.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        values
            .entry(unescape(key))
            .or_default()
            .push(unescape(value));
    }
    values
}

/// Stored form of parsed query values: one string, or a list for repeated names.
pub fn to_query_map(values: &QueryValues) -> QueryMap {
    values
        .iter()
        .map(|(key, vals)| {
            let value = match vals.as_slice() {
                [single] => Value::String(single.clone()),
                many => Value::Array(many.iter().cloned().map(Value::String).collect()),
            };
            (key.clone(), value)
        })
        .collect()
}

/// Canonical encoding: names sorted, repeated values kept in order.
pub fn encode_values(values: &QueryValues) -> String {
    values
        .iter()
        .flat_map(|(key, vals)| {
            vals.iter()
                .map(move |val| format!("{}={}", escape(key), escape(val)))
        })
        .collect::<Vec<_>>()
        .join("&")
}

/// Canonical encoding of a stored query map.
///
/// Fails with `UnsupportedQueryValueType` for values other than strings,
/// non-empty string lists, numbers and booleans.
pub fn encode_map(map: &QueryMap) -> Result<String, GatewayError> {
    let mut values = QueryValues::new();
    for (key, value) in map {
        let unsupported = |kind: &'static str| GatewayError::UnsupportedQueryValueType {
            key: key.clone(),
            kind,
        };
        let vals = match value {
            Value::String(s) => vec![s.clone()],
            Value::Number(n) => vec![n.to_string()],
            Value::Bool(b) => vec![b.to_string()],
            Value::Array(items) if items.is_empty() => return Err(unsupported("empty list")),
            Value::Array(items) => items
                .iter()
                .map(|item| match item {
                    Value::String(s) => Ok(s.clone()),
                    _ => Err(unsupported("non-string list element")),
                })
                .collect::<Result<Vec<_>, _>>()?,
            Value::Null => return Err(unsupported("null")),
            Value::Object(_) => return Err(unsupported("object")),
        };
        values.insert(key.clone(), vals);
    }
    Ok(encode_values(&values))
}

fn escape(s: &str) -> String {
    urlencoding::encode(s).replace("%20", "+")
}

fn unescape(s: &str) -> String {
    let spaced = s.replace('+', " ");
    match urlencoding::decode(&spaced) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => spaced,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_query_groups_repeated_names() {
        let values = parse_query(Some("tag=b&id=1&tag=a&name=john+doe"));
        assert_eq!(values["tag"], vec!["b", "a"]);
        assert_eq!(values["id"], vec!["1"]);
        assert_eq!(values["name"], vec!["john doe"]);
    }

    #[test]
    fn test_parse_query_empty() {
        assert!(parse_query(None).is_empty());
        assert!(parse_query(Some("")).is_empty());
    }

    #[test]
    fn test_encode_sorts_names_and_keeps_value_order() {
        let values = parse_query(Some("z=2&a=1&z=1"));
        assert_eq!(encode_values(&values), "a=1&z=2&z=1");
    }

    #[test]
    fn test_encode_escapes() {
        let values = parse_query(Some("q=a%26b&name=john%20doe"));
        assert_eq!(encode_values(&values), "name=john+doe&q=a%26b");
    }

    #[test]
    fn test_map_and_live_encodings_agree() {
        let live = parse_query(Some("tag=x&tag=y&page=2"));
        let stored = to_query_map(&live);
        assert_eq!(stored["page"], json!("2"));
        assert_eq!(stored["tag"], json!(["x", "y"]));
        assert_eq!(encode_map(&stored).unwrap(), encode_values(&live));
    }

    #[test]
    fn test_encode_map_numbers_and_bools() {
        let map: QueryMap = serde_json::from_value(json!({"page": 2, "all": true, "ratio": 1.5}))
            .unwrap();
        assert_eq!(encode_map(&map).unwrap(), "all=true&page=2&ratio=1.5");
    }

    #[test]
    fn test_encode_map_rejects_unsupported_values() {
        let map: QueryMap = serde_json::from_value(json!({"filter": {"a": 1}})).unwrap();
        assert!(matches!(
            encode_map(&map),
            Err(GatewayError::UnsupportedQueryValueType { ref key, .. }) if key == "filter"
        ));

        let map: QueryMap = serde_json::from_value(json!({"ids": [1, 2]})).unwrap();
        assert!(encode_map(&map).is_err());
    }

    #[test]
    fn test_encode_map_rejects_empty_list() {
        let map: QueryMap = serde_json::from_value(json!({"a": []})).unwrap();
        assert!(matches!(
            encode_map(&map),
            Err(GatewayError::UnsupportedQueryValueType { ref key, kind: "empty list" }) if key == "a"
        ));
    }
}
