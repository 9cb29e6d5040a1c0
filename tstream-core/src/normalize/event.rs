//! `key="value",key2=value2` event lines.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

/// A key followed by a quoted (escapes allowed) or bare value.
static PAIR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"([^\s,="]+)\s*=\s*(?:"((?:[^"\\]|\\.)*)"|([^,]*))"#).unwrap()
});

/// Parse an event line into an ordered mapping of string values.
///
/// Quoted values may contain commas and `\"` escapes. Whitespace around bare
/// values is trimmed. A repeated key keeps its last value.
pub fn parse_event(line: &str) -> Map<String, Value> {
    let mut fields = Map::new();
    for caps in PAIR.captures_iter(line.trim()) {
        let value = match (caps.get(2), caps.get(3)) {
            (Some(quoted), _) => unescape(quoted.as_str()),
            (None, Some(bare)) => bare.as_str().trim().to_string(),
            (None, None) => String::new(),
        };
        fields.insert(caps[1].to_string(), Value::String(value));
    }
    fields
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}
