//! Custom transform functions referenced by `runFunctions`.
//!
//! The set of functions is closed. A `runFunctions` entry is validated when it
//! is deserialized, so unknown names and unsupported arguments fail at
//! property-table load time rather than during a collection.

use serde::Deserialize;
use serde_json::{Map, Number, Value};

use super::stages::kind_of;
use crate::error::{Error, Result};

/// Text formats understood by `formatAsJson`.
pub const SUPPORTED_TEXT_FORMATS: [&str; 1] = ["csv"];

/// A validated custom function invocation.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "RawFunction")]
pub enum CustomFunction {
    /// Average of the entries (or of one field of each entry).
    GetAverage { key_with_value: Option<String> },
    /// Per-field sum across entries; plain numbers sum to a scalar.
    GetSum,
    /// First key of a mapping, optionally split and prefixed.
    GetFirstKey {
        split_on_value: Option<String>,
        key_prefix: Option<String>,
    },
    /// `partial / total` as a rounded percentage.
    GetPercentFromKeys {
        partial_key: String,
        total_key: String,
        inverse: bool,
    },
    /// Structured text (command output) to a mapping or sequence.
    FormatAsJson {
        format: String,
        map_key: Option<String>,
    },
}

#[derive(Deserialize)]
struct RawFunction {
    name: String,
    #[serde(default)]
    args: Map<String, Value>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct AverageArgs {
    key_with_value: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct FirstKeyArgs {
    split_on_value: Option<String>,
    key_prefix: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PercentArgs {
    partial_key: String,
    total_key: String,
    #[serde(default)]
    inverse: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FormatArgs {
    #[serde(rename = "type")]
    format: String,
    map_key: Option<String>,
}

impl TryFrom<RawFunction> for CustomFunction {
    type Error = Error;

    fn try_from(raw: RawFunction) -> Result<Self> {
        CustomFunction::from_parts(&raw.name, raw.args)
    }
}

fn parse_args<T: for<'de> Deserialize<'de>>(name: &str, args: Map<String, Value>) -> Result<T> {
    serde_json::from_value(Value::Object(args))
        .map_err(|e| Error::configuration(format!("{}: invalid arguments: {}", name, e)))
}

impl CustomFunction {
    /// Build a function from its registry name and raw arguments.
    pub fn from_parts(name: &str, args: Map<String, Value>) -> Result<Self> {
        let function = match name {
            "getAverage" => {
                let args: AverageArgs = parse_args(name, args)?;
                Self::GetAverage {
                    key_with_value: args.key_with_value,
                }
            }
            "getSum" => Self::GetSum,
            "getFirstKey" => {
                let args: FirstKeyArgs = parse_args(name, args)?;
                Self::GetFirstKey {
                    split_on_value: args.split_on_value,
                    key_prefix: args.key_prefix,
                }
            }
            "getPercentFromKeys" => {
                let args: PercentArgs = parse_args(name, args)?;
                Self::GetPercentFromKeys {
                    partial_key: args.partial_key,
                    total_key: args.total_key,
                    inverse: args.inverse,
                }
            }
            "formatAsJson" => {
                let args: FormatArgs = parse_args(name, args)?;
                check_text_format(&args.format)?;
                Self::FormatAsJson {
                    format: args.format,
                    map_key: args.map_key,
                }
            }
            other => {
                return Err(Error::configuration(format!(
                    "Unknown custom function: '{}'",
                    other
                )));
            }
        };
        Ok(function)
    }

    /// Registry name of this function.
    pub fn name(&self) -> &'static str {
        match self {
            Self::GetAverage { .. } => "getAverage",
            Self::GetSum => "getSum",
            Self::GetFirstKey { .. } => "getFirstKey",
            Self::GetPercentFromKeys { .. } => "getPercentFromKeys",
            Self::FormatAsJson { .. } => "formatAsJson",
        }
    }

    /// Apply the function to `data`, returning the replacement data.
    pub fn invoke(&self, data: Value) -> Result<Value> {
        match self {
            Self::GetAverage { key_with_value } => get_average(&data, key_with_value.as_deref()),
            Self::GetSum => get_sum(&data),
            Self::GetFirstKey {
                split_on_value,
                key_prefix,
            } => get_first_key(&data, split_on_value.as_deref(), key_prefix.as_deref()),
            Self::GetPercentFromKeys {
                partial_key,
                total_key,
                inverse,
            } => get_percent_from_keys(&data, partial_key, total_key, *inverse),
            Self::FormatAsJson { format, map_key } => {
                format_as_json(&data, format, map_key.as_deref())
            }
        }
    }
}

fn check_text_format(format: &str) -> Result<()> {
    if SUPPORTED_TEXT_FORMATS.contains(&format) {
        Ok(())
    } else {
        Err(Error::configuration(format!(
            "formatAsJson: unsupported type '{}'",
            format
        )))
    }
}

/// Numbers, and strings that parse as numbers.
fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Integral results are emitted as integers.
fn number(value: f64) -> Value {
    if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        Value::Number(Number::from(value as i64))
    } else {
        Number::from_f64(value).map_or(Value::Null, Value::Number)
    }
}

fn entries<'a>(name: &str, data: &'a Value) -> Result<Box<dyn Iterator<Item = &'a Value> + 'a>> {
    match data {
        Value::Object(map) => Ok(Box::new(map.values())),
        Value::Array(items) => Ok(Box::new(items.iter())),
        other => Err(Error::normalization(format!(
            "{}: expected a mapping or sequence, got {}",
            name,
            kind_of(other)
        ))),
    }
}

fn get_average(data: &Value, key_with_value: Option<&str>) -> Result<Value> {
    let values: Vec<f64> = entries("getAverage", data)?
        .filter_map(|entry| match key_with_value {
            Some(key) => entry.get(key).and_then(as_number),
            None => as_number(entry),
        })
        .collect();

    if values.is_empty() {
        return Ok(number(0.0));
    }
    Ok(number(values.iter().sum::<f64>() / values.len() as f64))
}

fn get_sum(data: &Value) -> Result<Value> {
    let mut sums: Vec<(String, f64)> = Vec::new();
    let mut scalar = 0.0;
    let mut saw_mapping = false;

    for entry in entries("getSum", data)? {
        match entry {
            Value::Object(fields) => {
                saw_mapping = true;
                for (key, value) in fields {
                    let Some(n) = as_number(value) else {
                        continue;
                    };
                    match sums.iter_mut().find(|(k, _)| k == key) {
                        Some((_, total)) => *total += n,
                        None => sums.push((key.clone(), n)),
                    }
                }
            }
            other => scalar += as_number(other).unwrap_or(0.0),
        }
    }

    if saw_mapping {
        Ok(Value::Object(
            sums.into_iter().map(|(k, total)| (k, number(total))).collect(),
        ))
    } else {
        Ok(number(scalar))
    }
}

fn get_first_key(data: &Value, split_on_value: Option<&str>, key_prefix: Option<&str>) -> Result<Value> {
    let Value::Object(map) = data else {
        return Err(Error::normalization(format!(
            "getFirstKey: expected a mapping, got {}",
            kind_of(data)
        )));
    };
    let Some(first) = map.keys().next() else {
        return Ok(Value::Null);
    };

    let mut key = match split_on_value {
        Some(separator) if !separator.is_empty() => {
            first.rsplit(separator).next().unwrap_or(first).to_string()
        }
        _ => first.clone(),
    };
    if let Some(prefix) = key_prefix {
        key.insert_str(0, prefix);
    }
    Ok(Value::String(key))
}

fn get_percent_from_keys(data: &Value, partial_key: &str, total_key: &str, inverse: bool) -> Result<Value> {
    let read = |key: &str| {
        data.get(key).and_then(as_number).ok_or_else(|| {
            Error::normalization(format!(
                "getPercentFromKeys: key '{}' is missing or not numeric",
                key
            ))
        })
    };
    let partial = read(partial_key)?;
    let total = read(total_key)?;

    if total == 0.0 {
        return Ok(number(0.0));
    }
    let percent = (partial / total * 100.0).round();
    Ok(number(if inverse { 100.0 - percent } else { percent }))
}

/// Parse command output into a mapping (keyed by `map_key`) or a sequence of rows.
///
/// Accepts the text directly or a mapping carrying it under `commandResult`.
pub fn format_as_json(data: &Value, format: &str, map_key: Option<&str>) -> Result<Value> {
    check_text_format(format)?;

    let text = match data {
        Value::String(text) => text.as_str(),
        Value::Object(map) => map
            .get("commandResult")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::normalization("formatAsJson: mapping has no 'commandResult' text"))?,
        other => {
            return Err(Error::normalization(format!(
                "formatAsJson: expected text, got {}",
                kind_of(other)
            )));
        }
    };

    let rows = parse_csv(text)?;
    match map_key {
        Some(key) => {
            let mut map = Map::with_capacity(rows.len());
            for row in rows {
                if let Some(Value::String(id)) = row.get(key) {
                    map.insert(id.clone(), Value::Object(row));
                }
            }
            Ok(Value::Object(map))
        }
        None => Ok(Value::Array(rows.into_iter().map(Value::Object).collect())),
    }
}

fn parse_csv(text: &str) -> Result<Vec<Map<String, Value>>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(text.as_bytes());
    let columns = reader.headers().map_err(csv_error)?.clone();

    reader
        .records()
        .map(|record| {
            let record = record.map_err(csv_error)?;
            Ok(columns
                .iter()
                .zip(record.iter())
                .map(|(column, cell)| (column.to_string(), Value::String(cell.to_string())))
                .collect())
        })
        .collect()
}

fn csv_error(err: csv::Error) -> Error {
    Error::normalization(format!("formatAsJson: malformed csv: {}", err))
}
