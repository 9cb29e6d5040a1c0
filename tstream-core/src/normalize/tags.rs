//! Tag injection.

use regex::Regex;
use serde_json::Value;

use super::{TagInjection, TagPattern, TagValue};
use crate::error::Result;

enum ResolvedTag<'a> {
    Literal(&'a str),
    Pattern { regex: Regex, group: usize },
}

fn compile(pattern: &TagPattern) -> Result<ResolvedTag<'static>> {
    Ok(ResolvedTag::Pattern {
        regex: Regex::new(&pattern.pattern)?,
        group: pattern.group,
    })
}

/// Inject tags into every record of a mapping.
///
/// Records are the top-level entries whose values are mappings; record keys in
/// `options.skip` are left alone. Pattern tags are matched against the record
/// key, never its contents, and are omitted when the pattern does not match.
pub fn add_keys_by_tag(data: &mut Value, injection: &TagInjection) -> Result<()> {
    let Value::Object(records) = data else {
        return Ok(());
    };

    let mut tags = Vec::with_capacity(injection.tags.len());
    for (name, value) in &injection.tags {
        let resolved = match value {
            TagValue::Pattern(pattern) => compile(pattern)?,
            TagValue::Literal(literal) => match injection.definitions.get(literal) {
                Some(pattern) => compile(pattern)?,
                None => ResolvedTag::Literal(literal),
            },
        };
        tags.push((name.as_str(), resolved));
    }

    for (record_key, record) in records.iter_mut() {
        if injection.options.skip.iter().any(|skip| skip == record_key) {
            continue;
        }
        let Value::Object(fields) = record else {
            continue;
        };

        for (name, tag) in &tags {
            match tag {
                ResolvedTag::Literal(value) => {
                    fields.insert(name.to_string(), Value::String(value.to_string()));
                }
                ResolvedTag::Pattern { regex, group } => {
                    if let Some(found) = regex.captures(record_key).and_then(|c| c.get(*group)) {
                        fields.insert(name.to_string(), Value::String(found.as_str().to_string()));
                    }
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::TagOptions;
    use serde_json::json;
    use std::collections::HashMap;

    fn injection(tags: Vec<(&str, TagValue)>, skip: Vec<&str>) -> TagInjection {
        TagInjection {
            tags: tags.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
            definitions: HashMap::from([(
                "`T`".to_string(),
                TagPattern::new("^/([^/]*)/.*", 1),
            )]),
            options: TagOptions {
                skip: skip.into_iter().map(String::from).collect(),
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_literal_and_definition_tags() {
        let mut data = json!({
            "/Common/vs1": { "a": 1 },
            "/Sample/vs2": { "a": 2 },
        });
        let inj = injection(
            vec![
                ("tenant", TagValue::Literal("`T`".to_string())),
                ("env", TagValue::Literal("prod".to_string())),
            ],
            vec![],
        );

        add_keys_by_tag(&mut data, &inj).unwrap();

        assert_eq!(data["/Common/vs1"], json!({ "a": 1, "tenant": "Common", "env": "prod" }));
        assert_eq!(data["/Sample/vs2"], json!({ "a": 2, "tenant": "Sample", "env": "prod" }));
    }

    #[test]
    fn test_no_match_omits_tag() {
        let mut data = json!({ "noSlashes": { "a": 1 } });
        let inj = injection(vec![("tenant", TagValue::Literal("`T`".to_string()))], vec![]);

        add_keys_by_tag(&mut data, &inj).unwrap();

        assert_eq!(data, json!({ "noSlashes": { "a": 1 } }));
    }

    #[test]
    fn test_skip_and_scalar_records() {
        let mut data = json!({
            "/Common/vs1": { "a": 1 },
            "/Common/skipped": { "a": 2 },
            "/Common/scalar": 5,
        });
        let inj = injection(
            vec![("name", TagValue::Pattern(TagPattern::new("(.*)", 1)))],
            vec!["/Common/skipped"],
        );

        add_keys_by_tag(&mut data, &inj).unwrap();

        assert_eq!(data["/Common/vs1"]["name"], "/Common/vs1");
        assert_eq!(data["/Common/skipped"], json!({ "a": 2 }));
        assert_eq!(data["/Common/scalar"], 5);
    }

    #[test]
    fn test_non_mapping_data_untouched() {
        let mut data = json!([{ "a": 1 }]);
        let inj = injection(vec![("env", TagValue::Literal("prod".to_string()))], vec![]);

        add_keys_by_tag(&mut data, &inj).unwrap();
        assert_eq!(data, json!([{ "a": 1 }]));
    }
}
