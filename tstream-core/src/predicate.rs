//! Conditional predicates.
//!
//! A conditional block (`if: { deviceVersionGreaterOrEqual: "14.1" }`) is a set
//! of predicate invocations. Every name must exist in the closed registry
//! below; all invocations must hold for the block to be true.

use std::cmp::Ordering;
use std::collections::HashMap;

use once_cell::sync::Lazy;
use serde::Deserialize;
use serde_json::Value;

use crate::context::Context;
use crate::error::{Error, Result};

/// Signature of a registered predicate.
pub type PredicateFn = fn(&Context, &Value) -> Result<bool>;

/// Provisioning levels that count as "provisioned".
const PROVISIONED_LEVELS: [&str; 3] = ["nominal", "minimum", "dedicated"];

static BUILTIN: Lazy<PredicateRegistry> = Lazy::new(|| {
    let mut registry = PredicateRegistry::empty();
    registry.register("deviceVersionGreaterOrEqual", device_version_greater_or_equal);
    registry.register("isModuleProvisioned", is_module_provisioned);
    registry
});

/// A parsed conditional block, in declared order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Condition {
    clauses: Vec<(String, Value)>,
}

impl<'de> Deserialize<'de> for Condition {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        crate::ordered::deserialize(deserializer).map(Condition::new)
    }
}

impl Condition {
    pub fn new(clauses: Vec<(String, Value)>) -> Self {
        Self { clauses }
    }

    /// Names of the predicates used by this block.
    pub fn operators(&self) -> impl Iterator<Item = &str> {
        self.clauses.iter().map(|(name, _)| name.as_str())
    }
}

/// Closed table of predicate name to implementation.
pub struct PredicateRegistry {
    predicates: HashMap<&'static str, PredicateFn>,
}

impl std::fmt::Debug for PredicateRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.predicates.keys().collect();
        names.sort();
        f.debug_struct("PredicateRegistry")
            .field("predicates", &names)
            .finish()
    }
}

impl PredicateRegistry {
    fn empty() -> Self {
        Self {
            predicates: HashMap::new(),
        }
    }

    fn register(&mut self, name: &'static str, predicate: PredicateFn) {
        self.predicates.insert(name, predicate);
    }

    /// The registry of built-in predicates.
    pub fn builtin() -> &'static PredicateRegistry {
        &BUILTIN
    }

    pub fn contains(&self, name: &str) -> bool {
        self.predicates.contains_key(name)
    }

    /// Reject a condition that names an unregistered predicate.
    pub fn check(&self, condition: &Condition) -> Result<()> {
        match condition.operators().find(|name| !self.contains(name)) {
            Some(unknown) => Err(Error::configuration(format!(
                "Unknown property in conditional block: '{}'",
                unknown
            ))),
            None => Ok(()),
        }
    }

    /// Evaluate a condition against the context.
    ///
    /// All operator names are checked before any predicate runs; evaluation
    /// stops at the first clause that does not hold.
    pub fn evaluate(&self, condition: &Condition, context: &Context) -> Result<bool> {
        self.check(condition)?;
        for (name, argument) in &condition.clauses {
            let predicate = self.predicates[name.as_str()];
            if !predicate(context, argument)? {
                tracing::trace!(predicate = %name, "Condition does not hold");
                return Ok(false);
            }
        }
        Ok(true)
    }
}

fn device_version_greater_or_equal(context: &Context, argument: &Value) -> Result<bool> {
    let device_version = context
        .get("deviceVersion")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            Error::context("deviceVersionGreaterOrEqual: context has no property 'deviceVersion'")
        })?;
    let wanted = argument.as_str().ok_or_else(|| {
        Error::configuration("deviceVersionGreaterOrEqual: argument must be a version string")
    })?;

    Ok(compare_versions(device_version, wanted) != Ordering::Less)
}

fn is_module_provisioned(context: &Context, argument: &Value) -> Result<bool> {
    let provisioning = context
        .get("provisioning")
        .and_then(Value::as_object)
        .ok_or_else(|| Error::context("isModuleProvisioned: context has no property 'provisioning'"))?;
    let module = argument.as_str().ok_or_else(|| {
        Error::configuration("isModuleProvisioned: argument must be a module name")
    })?;

    let level = match provisioning.get(module) {
        Some(Value::Object(entry)) => entry.get("level").and_then(Value::as_str),
        Some(Value::String(level)) => Some(level.as_str()),
        _ => None,
    };

    Ok(level.is_some_and(|level| PROVISIONED_LEVELS.contains(&level)))
}

/// Compare dotted version strings numerically (`14.1.0.1` vs `14.1`).
///
/// Missing components count as zero; non-numeric suffixes are ignored.
pub fn compare_versions(left: &str, right: &str) -> Ordering {
    fn components(version: &str) -> Vec<u64> {
        version
            .split('.')
            .map(|part| {
                let digits: String = part.chars().take_while(char::is_ascii_digit).collect();
                digits.parse().unwrap_or(0)
            })
            .collect()
    }

    let (left, right) = (components(left), components(right));
    let len = left.len().max(right.len());
    for i in 0..len {
        let l = left.get(i).copied().unwrap_or(0);
        let r = right.get(i).copied().unwrap_or(0);
        match l.cmp(&r) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn context() -> Context {
        let mut ctx = Context::new();
        ctx.publish("deviceVersion", json!("14.1.2.3"));
        ctx.publish(
            "provisioning",
            json!({
                "asm": { "name": "asm", "level": "nominal" },
                "gtm": { "name": "gtm", "level": "none" },
                "avr": "dedicated",
            }),
        );
        ctx
    }

    fn condition(value: Value) -> Condition {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_compare_versions() {
        assert_eq!(compare_versions("14.1.2.3", "14.1"), Ordering::Greater);
        assert_eq!(compare_versions("14.1", "14.1.0.0"), Ordering::Equal);
        assert_eq!(compare_versions("13.1.0", "14.0"), Ordering::Less);
        assert_eq!(compare_versions("15.0.0-build7", "15"), Ordering::Equal);
    }

    #[test]
    fn test_device_version() {
        let registry = PredicateRegistry::builtin();
        let ctx = context();

        assert!(registry
            .evaluate(&condition(json!({ "deviceVersionGreaterOrEqual": "14.0" })), &ctx)
            .unwrap());
        assert!(!registry
            .evaluate(&condition(json!({ "deviceVersionGreaterOrEqual": "15.1" })), &ctx)
            .unwrap());
    }

    #[test]
    fn test_module_provisioned() {
        let registry = PredicateRegistry::builtin();
        let ctx = context();

        let check = |module: &str| {
            registry
                .evaluate(&condition(json!({ "isModuleProvisioned": module })), &ctx)
                .unwrap()
        };

        assert!(check("asm"));
        assert!(check("avr"));
        assert!(!check("gtm"));
        assert!(!check("apm"));
    }

    #[test]
    fn test_clauses_are_anded() {
        let registry = PredicateRegistry::builtin();
        let ctx = context();

        let both = condition(json!({
            "deviceVersionGreaterOrEqual": "14.0",
            "isModuleProvisioned": "asm",
        }));
        let one_fails = condition(json!({
            "deviceVersionGreaterOrEqual": "14.0",
            "isModuleProvisioned": "gtm",
        }));

        assert!(registry.evaluate(&both, &ctx).unwrap());
        assert!(!registry.evaluate(&one_fails, &ctx).unwrap());
    }

    #[test]
    fn test_unknown_operator_is_configuration_error() {
        let registry = PredicateRegistry::builtin();
        let err = registry
            .evaluate(&condition(json!({ "isTuesday": true })), &context())
            .unwrap_err();

        assert!(matches!(err, Error::Configuration(_)));
        assert!(err.to_string().contains("isTuesday"));
    }

    #[test]
    fn test_missing_context_is_context_error() {
        let registry = PredicateRegistry::builtin();
        let err = registry
            .evaluate(
                &condition(json!({ "deviceVersionGreaterOrEqual": "14.0" })),
                &Context::new(),
            )
            .unwrap_err();

        assert!(matches!(err, Error::Context(_)));

        let err = registry
            .evaluate(&condition(json!({ "isModuleProvisioned": "asm" })), &Context::new())
            .unwrap_err();
        assert!(matches!(err, Error::Context(_)));
    }
}
