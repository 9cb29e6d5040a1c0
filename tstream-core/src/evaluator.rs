//! Context resolution and property evaluation.
//!
//! [`PropertyEvaluator::collect`] drives one collection against one host:
//!
//! 1. connect and authenticate through the endpoint collaborator
//! 2. resolve the context phases, one after another, publishing each entry
//! 3. resolve all stats properties concurrently
//! 4. reshape the results into the final, ordered output tree
//!
//! All per-run state lives in a [`CollectionRun`] created inside `collect`, so
//! an evaluator can serve concurrent collections against different hosts.

use std::sync::Arc;

use futures::future::try_join_all;
use serde_json::{Map, Value};

use crate::context::Context;
use crate::endpoint::{ConnectionOptions, EndpointClient, EndpointConnector};
use crate::error::{Error, Result};
use crate::normalize::{self, NormalizeOptions, TagInjection, TagPattern, TagValue};
use crate::predicate::PredicateRegistry;
use crate::property::{AddKeysByTag, PropertyFields, PropertyNode, PropertyTable, split_key};
use crate::template;

/// Caller-supplied options for one collection.
#[derive(Debug, Clone, Default)]
pub struct CollectOptions {
    /// Tags injected into records, after the built-in `name` tag.
    pub tags: Vec<(String, TagValue)>,
    /// Forwarded to the connector only.
    pub connection: ConnectionOptions,
}

/// Evaluates a property table against hosts.
pub struct PropertyEvaluator<K> {
    table: Arc<PropertyTable>,
    endpoints: Map<String, Value>,
    connector: K,
}

impl<K: EndpointConnector> PropertyEvaluator<K> {
    pub fn new(table: Arc<PropertyTable>, endpoints: Map<String, Value>, connector: K) -> Self {
        Self {
            table,
            endpoints,
            connector,
        }
    }

    /// Collect every stats property from `host`.
    ///
    /// Fails on the first error; no partial output is returned.
    pub async fn collect(&self, host: &str, options: &CollectOptions) -> Result<Map<String, Value>> {
        let mut client = self.connector.connect(host, &options.connection)?;
        client.authenticate().await?;
        client.set_endpoints(self.endpoints.clone());
        tracing::debug!(host = %host, "Authenticated");

        let mut run = CollectionRun::new(&self.table, &client, &options.tags);
        run.resolve_context().await?;
        let output = run.resolve_stats().await?;

        tracing::info!(
            host = %host,
            context = run.context.len(),
            properties = output.len(),
            "Collection complete"
        );
        Ok(output)
    }
}

/// Result of processing one property.
struct Collected {
    value: Value,
    parent_key: Option<String>,
}

/// State of a single collection: the client, the tag set and the context
/// resolved so far.
pub struct CollectionRun<'a, C> {
    table: &'a PropertyTable,
    client: &'a C,
    registry: &'static PredicateRegistry,
    tags: Vec<(String, TagValue)>,
    context: Context,
}

impl<'a, C: EndpointClient> CollectionRun<'a, C> {
    pub fn new(table: &'a PropertyTable, client: &'a C, caller_tags: &[(String, TagValue)]) -> Self {
        let mut tags = vec![(
            "name".to_string(),
            TagValue::Pattern(TagPattern::new("(.*)", 1)),
        )];
        tags.extend(caller_tags.iter().cloned());

        Self {
            table,
            client,
            registry: PredicateRegistry::builtin(),
            tags,
            context: Context::new(),
        }
    }

    /// Resolve the context phases in order.
    ///
    /// Entries of one phase are fetched concurrently and published together
    /// once the whole phase has resolved.
    pub async fn resolve_context(&mut self) -> Result<()> {
        let table = self.table;
        for (index, phase) in table.context.iter().enumerate() {
            let results = try_join_all(
                phase
                    .0
                    .iter()
                    .map(|(name, node)| self.process(name, node)),
            )
            .await?;

            for ((name, _), collected) in phase.0.iter().zip(results) {
                if let Some(collected) = collected {
                    self.context.publish(name.clone(), collected.value);
                }
            }
            tracing::debug!(phase = index, entries = phase.0.len(), "Context phase resolved");
        }
        Ok(())
    }

    /// Resolve every stats property and reshape the results.
    pub async fn resolve_stats(&self) -> Result<Map<String, Value>> {
        let stats = &self.table.stats;
        let results = try_join_all(stats.iter().map(|(name, node)| self.process(name, node))).await?;

        let collected = stats
            .iter()
            .zip(results)
            .filter_map(|((name, _), collected)| collected.map(|c| (name.as_str(), c)));
        reshape(collected)
    }

    async fn process(&self, name: &str, node: &PropertyNode) -> Result<Option<Collected>> {
        let raw_key = crate::property::property_key(node);
        let fields = node
            .resolve(self.registry, &self.context)
            .map_err(|e| e.for_property(name, raw_key))?;
        let key = fields.key.as_deref().unwrap_or(raw_key);

        if fields.is_disabled() {
            tracing::trace!(property = %name, "Disabled");
            return Ok(None);
        }

        let parent_key = fields.parent_key().map(str::to_string);
        if fields.is_folder() {
            return Ok(Some(Collected {
                value: Value::Object(Map::new()),
                parent_key: None,
            }));
        }

        let rendered = template::render(key, &self.context);
        let value = self
            .load(&rendered, &fields)
            .await
            .map_err(|e| e.for_property(name, rendered.as_str()))?;
        tracing::debug!(property = %name, key = %rendered, "Property collected");

        Ok(Some(Collected { value, parent_key }))
    }

    async fn load(&self, key: &str, fields: &PropertyFields) -> Result<Value> {
        let (root, child) = split_key(key);
        if root.is_empty() {
            return Err(Error::configuration("property has no key"));
        }

        let mut response = self
            .client
            .load_endpoint(root, fields.key_args.as_ref())
            .await?;
        response.ensure_items();

        if fields.normalize == Some(false) {
            return Ok(response.data);
        }
        normalize::normalize(&response.data, &self.normalize_options(fields, child))
    }

    fn normalize_options(&self, fields: &PropertyFields, child: Option<&str>) -> NormalizeOptions {
        let global = &self.table.global;

        let tag_options = match &fields.add_keys_by_tag {
            Some(AddKeysByTag::Enabled(true)) => Some(global.add_keys_by_tag.clone()),
            Some(AddKeysByTag::Options(options)) => Some(options.clone()),
            Some(AddKeysByTag::Enabled(false)) | None => None,
        };

        NormalizeOptions {
            key: child.map(str::to_string),
            filter_by_keys: [&fields.filter_keys, &global.filter_keys]
                .into_iter()
                .flatten()
                .cloned()
                .collect(),
            rename_keys_by_pattern: [&fields.rename_keys, &global.rename_keys]
                .into_iter()
                .flatten()
                .cloned()
                .collect(),
            convert_array_to_map: fields.convert_array_to_map.clone(),
            include_first_entry: fields.include_first_entry.unwrap_or(false),
            format_timestamps: global.format_timestamps.keys.clone(),
            run_custom_functions: fields.run_functions.clone().unwrap_or_default(),
            add_keys_by_tag: tag_options.map(|options| TagInjection {
                tags: options.tags.clone().unwrap_or_else(|| self.tags.clone()),
                definitions: self.table.definitions.clone(),
                options,
            }),
        }
    }
}

/// Build the output tree in declared order, then move structural children
/// under their parent.
fn reshape<'n>(collected: impl Iterator<Item = (&'n str, Collected)>) -> Result<Map<String, Value>> {
    let mut output = Map::new();
    let mut children = Vec::new();

    for (name, item) in collected {
        match item.parent_key {
            Some(parent) => children.push((name, parent, item.value)),
            None => {
                output.insert(name.to_string(), item.value);
            }
        }
    }

    for (name, parent, value) in children {
        let slot = output
            .entry(parent.clone())
            .or_insert_with(|| Value::Object(Map::new()));
        match slot {
            Value::Object(map) => {
                map.insert(name.to_string(), value);
            }
            _ => {
                return Err(Error::configuration(format!(
                    "parent '{}' of property '{}' is not a mapping",
                    parent, name
                )));
            }
        }
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn item(value: Value, parent: Option<&str>) -> Collected {
        Collected {
            value,
            parent_key: parent.map(str::to_string),
        }
    }

    #[test]
    fn test_reshape_order_and_children() {
        let output = reshape(
            vec![
                ("system", item(json!({ "a": 1 }), None)),
                ("poolMembers", item(json!({ "m": 1 }), Some("pools"))),
                ("pools", item(json!({}), None)),
                ("orphan", item(json!(5), Some("missing"))),
            ]
            .into_iter(),
        )
        .unwrap();

        let keys: Vec<&str> = output.keys().map(String::as_str).collect();
        assert_eq!(keys, ["system", "pools", "missing"]);
        assert_eq!(output["pools"], json!({ "poolMembers": { "m": 1 } }));
        assert_eq!(output["missing"], json!({ "orphan": 5 }));
    }

    #[test]
    fn test_reshape_scalar_parent_is_an_error() {
        let err = reshape(
            vec![
                ("count", item(json!(3), None)),
                ("child", item(json!({}), Some("count"))),
            ]
            .into_iter(),
        )
        .unwrap_err();

        assert!(matches!(err, Error::Configuration(_)));
        assert!(err.to_string().contains("count"));
    }
}
