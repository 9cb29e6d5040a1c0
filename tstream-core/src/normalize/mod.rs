//! Normalization engine.
//!
//! [`normalize`] is a pure function of `(payload, options)`. The stages always
//! run in the same order and each one is skipped when its option is unset:
//!
//! 1. key extraction
//! 2. key filtering
//! 3. key renaming
//! 4. array-to-map conversion
//! 5. first-entry reduction
//! 6. timestamp formatting
//! 7. custom functions
//! 8. tag injection
//!
//! Event strings (`key="value",...`) have their own entry point,
//! [`parse_event`].

mod event;
mod functions;
mod stages;
mod tags;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

pub use event::parse_event;
pub use functions::{CustomFunction, SUPPORTED_TEXT_FORMATS};
pub use stages::format_timestamp;
pub use tags::add_keys_by_tag;

/// Key filter set.
///
/// `include` keeps only the listed top-level keys; `exclude` drops the listed
/// keys at any depth. A bare list is shorthand for `include`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawFilterKeys")]
pub struct FilterKeys {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude: Option<Vec<String>>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawFilterKeys {
    List(Vec<String>),
    Sets {
        #[serde(default)]
        include: Option<Vec<String>>,
        #[serde(default)]
        exclude: Option<Vec<String>>,
    },
}

impl From<RawFilterKeys> for FilterKeys {
    fn from(raw: RawFilterKeys) -> Self {
        match raw {
            RawFilterKeys::List(include) => Self {
                include: Some(include),
                exclude: None,
            },
            RawFilterKeys::Sets { include, exclude } => Self { include, exclude },
        }
    }
}

impl FilterKeys {
    /// Allow-list shorthand.
    pub fn include<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            include: Some(keys.into_iter().map(Into::into).collect()),
            exclude: None,
        }
    }

    /// Deny-list shorthand.
    pub fn exclude<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            include: None,
            exclude: Some(keys.into_iter().map(Into::into).collect()),
        }
    }
}

/// An ordered set of rename rules.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RenameKeys {
    #[serde(deserialize_with = "crate::ordered::deserialize")]
    pub patterns: Vec<(String, RenameRule)>,
}

/// Rename any key matching `pattern` to capture `group`, or to `constant`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenameRule {
    pub pattern: String,
    #[serde(default = "default_group")]
    pub group: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constant: Option<String>,
}

fn default_group() -> usize {
    1
}

/// Turn a sequence of items into a mapping keyed by one of their fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArrayToMap {
    pub key_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_name_prefix: Option<String>,
}

/// A named regular expression used to derive tag values from record keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagPattern {
    pub pattern: String,
    #[serde(default = "default_group")]
    pub group: usize,
}

impl TagPattern {
    pub fn new(pattern: impl Into<String>, group: usize) -> Self {
        Self {
            pattern: pattern.into(),
            group,
        }
    }
}

/// Value of a configured tag.
///
/// A literal that names a pattern definition (for example `` `T` ``) is
/// resolved through the definitions table; other literals are injected as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TagValue {
    Pattern(TagPattern),
    Literal(String),
}

/// Options controlling which records receive tags, and which tags.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TagOptions {
    /// Replaces the collection's tag set (`name` plus caller tags) when present.
    #[serde(default, deserialize_with = "crate::ordered::deserialize_some")]
    pub tags: Option<Vec<(String, TagValue)>>,
    /// Record keys that never receive tags.
    #[serde(default)]
    pub skip: Vec<String>,
}

/// Everything tag injection needs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TagInjection {
    pub tags: Vec<(String, TagValue)>,
    pub definitions: HashMap<String, TagPattern>,
    pub options: TagOptions,
}

/// Options for a single [`normalize`] call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizeOptions {
    /// `/`-separated path to drill into before anything else.
    pub key: Option<String>,
    /// Filter sets; a key must pass all of them.
    pub filter_by_keys: Vec<FilterKeys>,
    /// Rename sets, applied in order.
    pub rename_keys_by_pattern: Vec<RenameKeys>,
    pub convert_array_to_map: Option<ArrayToMap>,
    pub include_first_entry: bool,
    /// Keys whose string values are reformatted as RFC 3339 UTC.
    pub format_timestamps: Vec<String>,
    pub run_custom_functions: Vec<CustomFunction>,
    pub add_keys_by_tag: Option<TagInjection>,
}

/// Normalize a raw payload.
///
/// With default options the payload is returned unchanged.
pub fn normalize(payload: &Value, options: &NormalizeOptions) -> Result<Value> {
    let mut data = payload.clone();

    if let Some(key) = options.key.as_deref().filter(|k| !k.is_empty()) {
        data = stages::extract_key(data, key);
    }

    for filter in &options.filter_by_keys {
        data = stages::filter_by_keys(data, filter);
    }

    for rename in &options.rename_keys_by_pattern {
        data = stages::rename_keys(data, rename)?;
    }

    if let Some(spec) = &options.convert_array_to_map {
        data = stages::convert_array_to_map(data, spec)?;
    }

    if options.include_first_entry {
        data = stages::include_first_entry(data);
    }

    if !options.format_timestamps.is_empty() {
        stages::format_timestamps(&mut data, &options.format_timestamps);
    }

    for function in &options.run_custom_functions {
        tracing::trace!(function = function.name(), "Running custom function");
        data = function.invoke(data)?;
    }

    if let Some(injection) = &options.add_keys_by_tag {
        add_keys_by_tag(&mut data, injection)?;
    }

    Ok(data)
}
