//! Structural normalization stages.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use regex::Regex;
use serde_json::{Map, Value};

use super::{ArrayToMap, FilterKeys, RenameKeys, RenameRule};
use crate::error::{Error, Result};

/// Naive layouts tried after RFC 3339 and RFC 2822. Interpreted as UTC.
const NAIVE_TIMESTAMP_FORMATS: [&str; 3] = [
    "%a %b %e %H:%M:%S %Y",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
];

/// Drill into `data` along a `/`-separated path.
///
/// Mapping segments are keys, sequence segments are indexes. A path that does
/// not exist yields an empty mapping.
pub(super) fn extract_key(data: Value, path: &str) -> Value {
    let mut current = data;
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        let next = match current {
            Value::Object(mut map) => map.remove(segment),
            Value::Array(mut items) => segment
                .parse::<usize>()
                .ok()
                .filter(|index| *index < items.len())
                .map(|index| items.swap_remove(index)),
            _ => None,
        };

        match next {
            Some(value) => current = value,
            None => {
                tracing::debug!(path = %path, segment = %segment, "Key path not present in payload");
                return Value::Object(Map::new());
            }
        }
    }
    current
}

pub(super) fn filter_by_keys(mut data: Value, filter: &FilterKeys) -> Value {
    if let (Some(include), Value::Object(map)) = (&filter.include, &mut data) {
        map.retain(|key, _| include.iter().any(|allowed| allowed == key));
    }
    if let Some(exclude) = &filter.exclude {
        exclude_keys(&mut data, exclude);
    }
    data
}

fn exclude_keys(data: &mut Value, exclude: &[String]) {
    match data {
        Value::Object(map) => {
            map.retain(|key, _| !exclude.iter().any(|denied| denied == key));
            for value in map.values_mut() {
                exclude_keys(value, exclude);
            }
        }
        Value::Array(items) => {
            for item in items {
                exclude_keys(item, exclude);
            }
        }
        _ => {}
    }
}

struct CompiledRule<'a> {
    regex: Regex,
    rule: &'a RenameRule,
}

pub(super) fn rename_keys(data: Value, rename: &RenameKeys) -> Result<Value> {
    let rules = rename
        .patterns
        .iter()
        .map(|(_, rule)| compile_rule(rule))
        .collect::<Result<Vec<_>>>()?;

    if rules.is_empty() {
        return Ok(data);
    }
    Ok(rename_value(data, &rules))
}

fn compile_rule(rule: &RenameRule) -> Result<CompiledRule<'_>> {
    Ok(CompiledRule {
        regex: Regex::new(&rule.pattern)?,
        rule,
    })
}

fn rename_value(value: Value, rules: &[CompiledRule<'_>]) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, value)| (rename_key(key, rules), rename_value(value, rules)))
                .collect(),
        ),
        Value::Array(items) => {
            Value::Array(items.into_iter().map(|v| rename_value(v, rules)).collect())
        }
        other => other,
    }
}

/// The first matching rule wins.
fn rename_key(key: String, rules: &[CompiledRule<'_>]) -> String {
    for compiled in rules {
        let Some(caps) = compiled.regex.captures(&key) else {
            continue;
        };
        if let Some(constant) = &compiled.rule.constant {
            return constant.clone();
        }
        if let Some(group) = caps.get(compiled.rule.group) {
            return group.as_str().to_string();
        }
    }
    key
}

/// Accepts a sequence, or a mapping holding an `items` sequence.
pub(super) fn convert_array_to_map(data: Value, spec: &ArrayToMap) -> Result<Value> {
    let items = match data {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("items") {
            Some(Value::Array(items)) => items,
            _ => {
                return Err(Error::normalization(
                    "convertArrayToMap: mapping has no 'items' sequence",
                ));
            }
        },
        other => {
            return Err(Error::normalization(format!(
                "convertArrayToMap: expected a sequence, got {}",
                kind_of(&other)
            )));
        }
    };

    let prefix = spec.key_name_prefix.as_deref().unwrap_or("");
    let mut map = Map::with_capacity(items.len());
    for item in items {
        let key = match item.get(&spec.key_name) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => {
                tracing::trace!(key_name = %spec.key_name, "Skipping item without key field");
                continue;
            }
        };
        map.insert(format!("{}{}", prefix, key), item);
    }
    Ok(Value::Object(map))
}

/// Reduce a mapping to its first entry, in payload order.
pub(super) fn include_first_entry(data: Value) -> Value {
    match data {
        Value::Object(map) if map.len() > 1 => {
            Value::Object(map.into_iter().take(1).collect())
        }
        other => other,
    }
}

pub(super) fn format_timestamps(data: &mut Value, keys: &[String]) {
    match data {
        Value::Object(map) => {
            for (key, value) in map.iter_mut() {
                match value {
                    Value::String(raw) => {
                        if keys.iter().any(|k| k == key) {
                            if let Some(formatted) = format_timestamp(raw) {
                                *raw = formatted;
                            }
                        }
                    }
                    nested => format_timestamps(nested, keys),
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                format_timestamps(item, keys);
            }
        }
        _ => {}
    }
}

/// Reformat a timestamp string as RFC 3339 UTC with millisecond precision.
///
/// Returns `None` when the input is not a recognised timestamp.
pub fn format_timestamp(raw: &str) -> Option<String> {
    let raw = raw.trim();
    let parsed = DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::parse_from_rfc2822(raw))
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NAIVE_TIMESTAMP_FORMATS
                .iter()
                .find_map(|layout| NaiveDateTime::parse_from_str(raw, layout).ok())
                .map(|naive| naive.and_utc())
        })?;

    Some(parsed.to_rfc3339_opts(SecondsFormat::Millis, true))
}

pub(super) fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a sequence",
        Value::Object(_) => "a mapping",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn keys(value: &Value) -> Vec<&str> {
        value.as_object().unwrap().keys().map(String::as_str).collect()
    }

    #[test]
    fn test_extract_key_through_sequence() {
        let data = json!({ "a": [{ "b": 1 }, { "b": 2 }] });
        assert_eq!(extract_key(data, "a/1/b"), json!(2));
    }

    #[test]
    fn test_extract_missing_key() {
        let data = json!({ "a": { "b": 1 } });
        assert_eq!(extract_key(data.clone(), "a/c"), json!({}));
        assert_eq!(extract_key(data, "a/b/c"), json!({}));
    }

    #[test]
    fn test_exclude_is_recursive() {
        let data = json!({
            "kind": "x",
            "items": [{ "kind": "y", "name": "a" }],
            "nested": { "kind": "z", "keep": true },
        });
        let result = filter_by_keys(data, &FilterKeys::exclude(["kind"]));
        assert_eq!(
            result,
            json!({ "items": [{ "name": "a" }], "nested": { "keep": true } })
        );
    }

    #[test]
    fn test_include_is_top_level_only() {
        let data = json!({ "a": { "b": 1, "c": 2 }, "d": 3 });
        let result = filter_by_keys(data, &FilterKeys::include(["a"]));
        assert_eq!(result, json!({ "a": { "b": 1, "c": 2 } }));
    }

    #[test]
    fn test_include_ignores_scalars() {
        assert_eq!(filter_by_keys(json!("text"), &FilterKeys::include(["a"])), json!("text"));
    }

    #[test]
    fn test_rename_first_rule_wins_and_keeps_order() {
        let rename: RenameKeys = serde_json::from_value(json!({
            "patterns": {
                "stats": { "pattern": "^stats\\.(.*)$" },
                "startsWithS": { "pattern": "^s", "constant": "s_other" },
            }
        }))
        .unwrap();

        let data = json!({ "z": 0, "stats.a": 1, "size": 3, "nested": [{ "stats.b": 2 }] });
        let result = rename_keys(data, &rename).unwrap();

        assert_eq!(keys(&result), vec!["z", "a", "s_other", "nested"]);
        assert_eq!(result["nested"], json!([{ "b": 2 }]));
    }

    #[test]
    fn test_rename_group_and_constant() {
        let rename: RenameKeys = serde_json::from_value(json!({
            "patterns": {
                "rate": { "pattern": "^rate/(.*)$", "group": 1 },
                "status": { "pattern": "^status\\.availabilityState$", "constant": "availabilityState" },
            }
        }))
        .unwrap();

        let data = json!({
            "rate/bitsIn": 10,
            "status.availabilityState": "available",
            "other": { "rate/bitsOut": 5 },
        });
        let result = rename_keys(data, &rename).unwrap();

        assert_eq!(keys(&result), vec!["bitsIn", "availabilityState", "other"]);
        assert_eq!(result["other"], json!({ "bitsOut": 5 }));
    }

    #[test]
    fn test_rename_invalid_pattern() {
        let rename: RenameKeys =
            serde_json::from_value(json!({ "patterns": { "bad": { "pattern": "(" } } })).unwrap();
        let err = rename_keys(json!({}), &rename).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_convert_array_to_map() {
        let spec = ArrayToMap {
            key_name: "name".to_string(),
            key_name_prefix: None,
        };

        let result = convert_array_to_map(
            json!([{ "name": "b", "v": 1 }, { "v": 2 }, { "name": 7, "v": 3 }]),
            &spec,
        )
        .unwrap();
        assert_eq!(keys(&result), vec!["b", "7"]);

        let result = convert_array_to_map(json!({ "kind": "x", "items": [] }), &spec).unwrap();
        assert_eq!(result, json!({}));

        let err = convert_array_to_map(json!("text"), &spec).unwrap_err();
        assert!(matches!(err, Error::Normalization(_)));
        assert!(err.to_string().contains("a string"));
    }

    #[test]
    fn test_include_first_entry() {
        let data = json!({ "second": 2, "first": 1 });
        assert_eq!(include_first_entry(data), json!({ "second": 2 }));
        assert_eq!(include_first_entry(json!([1, 2])), json!([1, 2]));
    }

    #[test]
    fn test_format_timestamp_layouts() {
        assert_eq!(
            format_timestamp("2021-01-18T14:30:00Z").as_deref(),
            Some("2021-01-18T14:30:00.000Z")
        );
        assert_eq!(
            format_timestamp("Mon, 18 Jan 2021 14:30:00 +0000").as_deref(),
            Some("2021-01-18T14:30:00.000Z")
        );
        assert_eq!(
            format_timestamp("Mon Jan 18 14:30:00 2021").as_deref(),
            Some("2021-01-18T14:30:00.000Z")
        );
        assert_eq!(
            format_timestamp("2021-01-18 14:30:00").as_deref(),
            Some("2021-01-18T14:30:00.000Z")
        );
        assert_eq!(format_timestamp("yesterday"), None);
    }

    #[test]
    fn test_format_timestamps_nested() {
        let mut data = json!({
            "configSyncSucceeded": { "lastSync": "2021-01-18 14:30:00" },
            "lastSync": 12,
            "other": "2021-01-18 14:30:00",
        });
        format_timestamps(&mut data, &["lastSync".to_string()]);

        assert_eq!(data["configSyncSucceeded"]["lastSync"], "2021-01-18T14:30:00.000Z");
        assert_eq!(data["lastSync"], 12);
        assert_eq!(data["other"], "2021-01-18 14:30:00");
    }
}
