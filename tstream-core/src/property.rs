//! Property tables and conditional property definitions.
//!
//! A property table is a JSON5 document with ordered `context` phases, ordered
//! `stats`, tag pattern `definitions` and `global` normalization options. It is
//! parsed and validated once and then shared read-only between collections.

use std::collections::HashMap;

use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

use crate::context::Context;
use crate::error::{Error, Result};
use crate::normalize::{
    ArrayToMap, CustomFunction, FilterKeys, RenameKeys, TagOptions, TagPattern, TagValue,
};
use crate::predicate::{Condition, PredicateRegistry};

/// Placement hints for the final output tree.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Structure {
    /// The property is a grouping node with no data of its own.
    #[serde(default)]
    pub folder: bool,

    /// Move the property's output under this top-level entry.
    #[serde(default)]
    pub parent_key: Option<String>,
}

/// `addKeysByTag: true` uses the global tag options; an object overrides them.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum AddKeysByTag {
    Enabled(bool),
    Options(TagOptions),
}

/// The non-conditional fields of a property definition.
///
/// Every field is optional so that the fields of nested conditional levels can
/// be layered with [`PropertyFields::merge`].
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyFields {
    pub key: Option<String>,
    pub key_args: Option<Value>,
    pub structure: Option<Structure>,
    pub filter_keys: Option<FilterKeys>,
    pub rename_keys: Option<RenameKeys>,
    pub convert_array_to_map: Option<ArrayToMap>,
    pub include_first_entry: Option<bool>,
    pub run_functions: Option<Vec<CustomFunction>>,
    pub add_keys_by_tag: Option<AddKeysByTag>,
    pub disabled: Option<bool>,
    pub normalize: Option<bool>,
}

macro_rules! overlay {
    ($target:expr, $source:expr, $($field:ident),+ $(,)?) => {
        $(
            if $source.$field.is_some() {
                $target.$field = $source.$field.clone();
            }
        )+
    };
}

impl PropertyFields {
    /// Overlay the fields set in `deeper` onto `self`.
    pub fn merge(&mut self, deeper: &PropertyFields) {
        overlay!(
            self,
            deeper,
            key,
            key_args,
            structure,
            filter_keys,
            rename_keys,
            convert_array_to_map,
            include_first_entry,
            run_functions,
            add_keys_by_tag,
            disabled,
            normalize,
        );
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled.unwrap_or(false)
    }

    pub fn is_folder(&self) -> bool {
        self.structure.as_ref().is_some_and(|s| s.folder)
    }

    pub fn parent_key(&self) -> Option<&str> {
        self.structure.as_ref().and_then(|s| s.parent_key.as_deref())
    }

    fn validate(&self) -> Result<()> {
        if let Some(rename) = &self.rename_keys {
            validate_rename(rename)?;
        }
        if let Some(AddKeysByTag::Options(options)) = &self.add_keys_by_tag {
            validate_tags(options)?;
        }
        Ok(())
    }
}

fn validate_tags(options: &TagOptions) -> Result<()> {
    for (_, value) in options.tags.iter().flatten() {
        if let TagValue::Pattern(pattern) = value {
            Regex::new(&pattern.pattern)?;
        }
    }
    Ok(())
}

fn validate_rename(rename: &RenameKeys) -> Result<()> {
    for (_, rule) in &rename.patterns {
        Regex::new(&rule.pattern)?;
    }
    Ok(())
}

/// A property definition: plain fields, or fields plus an `if`/`then`/`else` block.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "RawNode")]
pub enum PropertyNode {
    Conditional {
        fields: PropertyFields,
        condition: Condition,
        then: Option<Box<PropertyNode>>,
        otherwise: Option<Box<PropertyNode>>,
    },
    Leaf(PropertyFields),
}

#[derive(Deserialize)]
struct RawNode {
    #[serde(flatten)]
    fields: PropertyFields,
    #[serde(rename = "if", default)]
    condition: Option<Condition>,
    #[serde(default)]
    then: Option<Box<PropertyNode>>,
    #[serde(rename = "else", default)]
    otherwise: Option<Box<PropertyNode>>,
}

impl TryFrom<RawNode> for PropertyNode {
    type Error = Error;

    fn try_from(raw: RawNode) -> Result<Self> {
        match raw.condition {
            Some(condition) => Ok(Self::Conditional {
                fields: raw.fields,
                condition,
                then: raw.then,
                otherwise: raw.otherwise,
            }),
            None if raw.then.is_some() || raw.otherwise.is_some() => Err(Error::configuration(
                "conditional branch without an 'if' block",
            )),
            None => Ok(Self::Leaf(raw.fields)),
        }
    }
}

impl PropertyNode {
    /// Resolve the conditional chain down to a set of plain fields.
    ///
    /// Fields accumulate level by level, deeper levels winning. A missing branch
    /// ends resolution with what has been accumulated so far.
    pub fn resolve(&self, registry: &PredicateRegistry, context: &Context) -> Result<PropertyFields> {
        let mut resolved = PropertyFields::default();
        let mut node = self;
        loop {
            match node {
                Self::Leaf(fields) => {
                    resolved.merge(fields);
                    return Ok(resolved);
                }
                Self::Conditional {
                    fields,
                    condition,
                    then,
                    otherwise,
                } => {
                    resolved.merge(fields);
                    let branch = if registry.evaluate(condition, context)? {
                        then
                    } else {
                        otherwise
                    };
                    match branch {
                        Some(next) => node = &**next,
                        None => return Ok(resolved),
                    }
                }
            }
        }
    }

    fn validate(&self, registry: &PredicateRegistry) -> Result<()> {
        match self {
            Self::Leaf(fields) => fields.validate(),
            Self::Conditional {
                fields,
                condition,
                then,
                otherwise,
            } => {
                registry.check(condition)?;
                fields.validate()?;
                for branch in [then, otherwise].into_iter().flatten() {
                    branch.validate(registry)?;
                }
                Ok(())
            }
        }
    }
}

/// Split a property key into its endpoint id and optional child path.
pub fn split_key(key: &str) -> (&str, Option<&str>) {
    match key.split_once('/') {
        Some((root, child)) if !child.is_empty() => (root, Some(child)),
        Some((root, _)) => (root, None),
        None => (key, None),
    }
}

/// Ordered `name -> property` entries.
pub type Properties = Vec<(String, PropertyNode)>;

/// One context phase.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Phase(pub Properties);

impl<'de> Deserialize<'de> for Phase {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        crate::ordered::deserialize(deserializer).map(Phase)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawPhases {
    Many(Vec<Phase>),
    One(Phase),
}

fn deserialize_phases<'de, D>(deserializer: D) -> std::result::Result<Vec<Phase>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(match RawPhases::deserialize(deserializer)? {
        RawPhases::Many(phases) => phases,
        RawPhases::One(phase) => vec![phase],
    })
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct FormatTimestamps {
    #[serde(default)]
    pub keys: Vec<String>,
}

/// Options applied to every stats property.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalOptions {
    #[serde(default)]
    pub filter_keys: Option<FilterKeys>,
    #[serde(default)]
    pub rename_keys: Option<RenameKeys>,
    #[serde(default)]
    pub format_timestamps: FormatTimestamps,
    #[serde(default)]
    pub add_keys_by_tag: TagOptions,
}

/// A loaded property table.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PropertyTable {
    #[serde(default, deserialize_with = "deserialize_phases")]
    pub context: Vec<Phase>,

    #[serde(default, deserialize_with = "crate::ordered::deserialize")]
    pub stats: Properties,

    #[serde(default)]
    pub definitions: HashMap<String, TagPattern>,

    #[serde(default)]
    pub global: GlobalOptions,
}

impl PropertyTable {
    /// Parse and validate a JSON5 property table.
    pub fn parse(source: &str) -> Result<Self> {
        let table: PropertyTable = json5::from_str(source)?;
        table.validate()?;
        tracing::debug!(
            phases = table.context.len(),
            stats = table.stats.len(),
            definitions = table.definitions.len(),
            "Loaded property table"
        );
        Ok(table)
    }

    /// Check every conditional operator and regular expression.
    ///
    /// Custom functions are checked when the table is deserialized.
    pub fn validate(&self) -> Result<()> {
        let registry = PredicateRegistry::builtin();

        let properties = self
            .context
            .iter()
            .flat_map(|phase| phase.0.iter())
            .chain(self.stats.iter());
        for (name, node) in properties {
            node.validate(registry)
                .map_err(|e| e.for_property(name, property_key(node)))?;
        }

        validate_tags(&self.global.add_keys_by_tag)?;

        for (name, definition) in &self.definitions {
            Regex::new(&definition.pattern).map_err(|e| {
                Error::configuration(format!("tag definition '{}': invalid pattern: {}", name, e))
            })?;
        }

        if let Some(rename) = &self.global.rename_keys {
            validate_rename(rename)?;
        }
        Ok(())
    }
}

/// Best-effort key of a property for error messages, before resolution.
pub(crate) fn property_key(node: &PropertyNode) -> &str {
    let fields = match node {
        PropertyNode::Leaf(fields) => fields,
        PropertyNode::Conditional { fields, .. } => fields,
    };
    fields.key.as_deref().unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn context(version: &str) -> Context {
        let mut ctx = Context::new();
        ctx.publish("deviceVersion", json!(version));
        ctx
    }

    fn node(value: Value) -> PropertyNode {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_split_key() {
        assert_eq!(split_key("sysInfo"), ("sysInfo", None));
        assert_eq!(split_key("sysInfo/items/0"), ("sysInfo", Some("items/0")));
        assert_eq!(split_key("sysInfo/"), ("sysInfo", None));
    }

    #[test]
    fn test_nested_conditional_resolution() {
        let property = node(json!({
            "key": "a",
            "filterKeys": ["x"],
            "if": { "deviceVersionGreaterOrEqual": "14.0" },
            "then": {
                "key": "b",
                "if": { "deviceVersionGreaterOrEqual": "15.0" },
                "then": { "key": "c" },
                "else": { "normalize": false }
            },
            "else": { "disabled": true }
        }));
        let registry = PredicateRegistry::builtin();

        let resolved = property.resolve(registry, &context("15.1")).unwrap();
        assert_eq!(resolved.key.as_deref(), Some("c"));
        assert_eq!(resolved.filter_keys, Some(FilterKeys::include(["x"])));

        let resolved = property.resolve(registry, &context("14.1.2")).unwrap();
        assert_eq!(resolved.key.as_deref(), Some("b"));
        assert_eq!(resolved.normalize, Some(false));

        let resolved = property.resolve(registry, &context("13.1")).unwrap();
        assert_eq!(resolved.key.as_deref(), Some("a"));
        assert!(resolved.is_disabled());
    }

    #[test]
    fn test_missing_branch_keeps_accumulated_fields() {
        let property = node(json!({
            "key": "a",
            "if": { "deviceVersionGreaterOrEqual": "99" },
            "then": { "key": "b" }
        }));

        let resolved = property
            .resolve(PredicateRegistry::builtin(), &context("15.1"))
            .unwrap();
        assert_eq!(resolved.key.as_deref(), Some("a"));
    }

    #[test]
    fn test_unknown_operator_rejected() {
        let property = node(json!({ "key": "a", "if": { "isTuesday": true }, "then": {} }));
        let registry = PredicateRegistry::builtin();

        let err = property.resolve(registry, &context("15.1")).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Configuration error: Unknown property in conditional block: 'isTuesday'"
        );

        let table = PropertyTable {
            stats: vec![("weekday".to_string(), property)],
            ..Default::default()
        };
        let err = table.validate().unwrap_err();
        assert!(matches!(err.root(), Error::Configuration(_)));
        assert!(err.to_string().contains("weekday"));
    }

    #[test]
    fn test_branch_without_if_rejected() {
        let result: std::result::Result<PropertyNode, _> =
            serde_json::from_value(json!({ "key": "a", "then": { "key": "b" } }));
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_table() {
        let table = PropertyTable::parse(
            r#"{
                // comments are allowed
                context: [
                    { deviceVersion: { key: "deviceInfo/version" } },
                    { provisioning: { key: "provisioning", convertArrayToMap: { keyName: "name" } } },
                ],
                stats: {
                    system: { key: "deviceInfo", structure: { folder: false } },
                    pools: { key: "pools", addKeysByTag: true },
                    poolMembers: { key: "poolMembers", structure: { parentKey: "pools" } },
                },
                definitions: { "`T`": { pattern: "^/([^/]*)/.*", group: 1 } },
                global: {
                    formatTimestamps: { keys: ["lastChange"] },
                    addKeysByTag: { skip: ["totals"] },
                },
            }"#,
        )
        .unwrap();

        assert_eq!(table.context.len(), 2);
        let names: Vec<&str> = table.stats.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, ["system", "pools", "poolMembers"]);
        assert_eq!(table.global.format_timestamps.keys, ["lastChange"]);
        assert_eq!(table.global.add_keys_by_tag.skip, ["totals"]);

        let single = PropertyTable::parse(r#"{ context: { deviceVersion: { key: "v" } } }"#).unwrap();
        assert_eq!(single.context.len(), 1);
        assert!(single.stats.is_empty());
    }

    #[test]
    fn test_parse_rejects_bad_pattern_and_function() {
        let err = PropertyTable::parse(
            r#"{ stats: { a: { key: "a", renameKeys: { patterns: { x: { pattern: "(" } } } } } }"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("invalid pattern"));

        let err = PropertyTable::parse(
            r#"{ stats: { a: { key: "a", runFunctions: [{ name: "formatAsJson", args: { type: "xml" } }] } } }"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("xml"));
    }
}
