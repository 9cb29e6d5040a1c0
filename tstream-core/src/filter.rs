//! Per-sink blacklist filter.
//!
//! A [`DataFilter`] is built once per sink configuration and applied to every
//! collection snapshot handed to that sink. Matching is done in three passes
//! over a private copy: collect paths, delete them, then close the gaps left in
//! sequences whose elements were emptied by the deletions.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Keys suppressed for every sink except the legacy Splunk format.
const LEGACY_DIAGNOSTICS: &str = "tmstats";

/// Sink configuration. Only `type` and `config.format` are inspected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SinkConfig {
    #[serde(rename = "type")]
    pub sink_type: String,

    #[serde(default)]
    pub config: SinkOptions,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SinkOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,

    /// Sink-specific settings, opaque here.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SinkConfig {
    pub fn new(sink_type: impl Into<String>, format: Option<&str>) -> Self {
        Self {
            sink_type: sink_type.into(),
            config: SinkOptions {
                format: format.map(str::to_string),
                extra: Map::new(),
            },
        }
    }

    fn is_legacy_splunk(&self) -> bool {
        self.sink_type == "Splunk" && self.config.format.as_deref() == Some("legacy")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum Segment {
    Key(String),
    Index(usize),
}

/// Removes blacklisted keys, at any depth, from collection snapshots.
#[derive(Debug, Clone)]
pub struct DataFilter {
    blacklist: Vec<String>,
}

impl DataFilter {
    pub fn new(sink: &SinkConfig) -> Self {
        let mut blacklist = Vec::new();
        if !sink.is_legacy_splunk() {
            blacklist.push(LEGACY_DIAGNOSTICS.to_string());
        }
        tracing::debug!(sink_type = %sink.sink_type, ?blacklist, "Created data filter");
        Self { blacklist }
    }

    pub fn blacklist(&self) -> &[String] {
        &self.blacklist
    }

    /// Return a filtered copy of `snapshot`.
    pub fn apply(&self, snapshot: &Value) -> Value {
        let mut data = snapshot.clone();
        if self.blacklist.is_empty() {
            return data;
        }

        let mut matches = Vec::new();
        self.collect_matches(&data, &mut Vec::new(), &mut matches);
        if matches.is_empty() {
            return data;
        }

        let mut emptied = Vec::new();
        for path in &matches {
            let Some((Segment::Key(key), parent_path)) = path.split_last() else {
                continue;
            };
            let Some(Value::Object(parent)) = lookup_mut(&mut data, parent_path) else {
                continue;
            };
            parent.retain(|k, _| k != key);
            if parent.is_empty() {
                if let Some((Segment::Index(index), array_path)) = parent_path.split_last() {
                    emptied.push((array_path.to_vec(), *index));
                }
            }
        }

        // Deepest sequences first, highest index first, so earlier removals
        // never shift a slot still waiting to be removed.
        emptied.sort_by(|(a_path, a_index), (b_path, b_index)| {
            b_path
                .len()
                .cmp(&a_path.len())
                .then_with(|| a_path.cmp(b_path))
                .then_with(|| b_index.cmp(a_index))
        });
        emptied.dedup();

        for (array_path, index) in &emptied {
            if let Some(Value::Array(items)) = lookup_mut(&mut data, array_path) {
                if items.get(*index).is_some_and(is_empty_mapping) {
                    items.remove(*index);
                }
            }
        }

        data
    }

    fn collect_matches(&self, value: &Value, path: &mut Vec<Segment>, matches: &mut Vec<Vec<Segment>>) {
        match value {
            Value::Object(map) => {
                for (key, child) in map {
                    path.push(Segment::Key(key.clone()));
                    if self.blacklist.iter().any(|b| b == key) {
                        matches.push(path.clone());
                    } else {
                        self.collect_matches(child, path, matches);
                    }
                    path.pop();
                }
            }
            Value::Array(items) => {
                for (index, child) in items.iter().enumerate() {
                    path.push(Segment::Index(index));
                    self.collect_matches(child, path, matches);
                    path.pop();
                }
            }
            _ => {}
        }
    }
}

fn is_empty_mapping(value: &Value) -> bool {
    matches!(value, Value::Object(map) if map.is_empty())
}

fn lookup_mut<'a>(value: &'a mut Value, path: &[Segment]) -> Option<&'a mut Value> {
    path.iter().try_fold(value, |current, segment| match (current, segment) {
        (Value::Object(map), Segment::Key(key)) => map.get_mut(key),
        (Value::Array(items), Segment::Index(index)) => items.get_mut(*index),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn snapshot() -> Value {
        json!({
            "system": { "hostname": "bigip1" },
            "tmstats": { "cpuInfoStat": [{ "cpu": 0 }] },
        })
    }

    #[test]
    fn test_blacklist_per_sink() {
        assert_eq!(DataFilter::new(&SinkConfig::new("Generic_HTTP", None)).blacklist(), ["tmstats"]);
        assert_eq!(DataFilter::new(&SinkConfig::new("Splunk", Some("default"))).blacklist(), ["tmstats"]);
        assert!(DataFilter::new(&SinkConfig::new("Splunk", Some("legacy"))).blacklist().is_empty());
    }

    #[test]
    fn test_removes_tmstats_and_leaves_input_alone() {
        let filter = DataFilter::new(&SinkConfig::new("Kafka", None));
        let input = snapshot();

        let first = filter.apply(&input);
        let second = filter.apply(&snapshot());

        assert_eq!(first, json!({ "system": { "hostname": "bigip1" } }));
        assert_eq!(first, second);
        assert_eq!(input, snapshot());
    }

    #[test]
    fn test_legacy_splunk_keeps_tmstats() {
        let filter = DataFilter::new(&SinkConfig::new("Splunk", Some("legacy")));
        assert_eq!(filter.apply(&snapshot()), snapshot());
    }

    #[test]
    fn test_sequence_reindex() {
        let filter = DataFilter::new(&SinkConfig::new("Generic_HTTP", None));
        let input = json!({
            "records": [
                { "name": "A" },
                { "tmstats": { "rows": 3 } },
                { "name": "C" },
            ]
        });

        assert_eq!(
            filter.apply(&input),
            json!({ "records": [{ "name": "A" }, { "name": "C" }] })
        );
    }

    #[test]
    fn test_nested_sequences_and_untouched_empties() {
        let filter = DataFilter::new(&SinkConfig::new("Generic_HTTP", None));
        let input = json!({
            "outer": [
                { "inner": [{ "tmstats": 1 }, { "tmstats": 2 }, {}] },
                { "tmstats": 3 },
                { "tmstats": 4, "keep": true },
            ]
        });

        assert_eq!(
            filter.apply(&input),
            json!({ "outer": [{ "inner": [{}] }, { "keep": true }] })
        );
    }

    #[test]
    fn test_sink_config_deserializes() {
        let sink: SinkConfig = serde_json::from_value(json!({
            "type": "Splunk",
            "config": { "format": "legacy", "host": "splunk.example.com" }
        }))
        .unwrap();

        assert!(sink.is_legacy_splunk());
        assert_eq!(sink.config.extra["host"], "splunk.example.com");
    }
}
