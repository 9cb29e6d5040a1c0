//! Single-pass `{{variable}}` substitution for property keys.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::Value;

use crate::context::Context;

/// `{{name}}` or `{{ a.b.c }}`. Sections (`{{#x}}`) and partials are not matched.
static VARIABLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{\s*([A-Za-z0-9_][A-Za-z0-9_.\-]*)\s*\}\}").unwrap());

/// Render a key template against the context.
///
/// Variables resolve through [`Context::lookup`]. Missing variables and
/// non-scalar values render as the empty string. Substituted text is not
/// rescanned.
pub fn render(template: &str, context: &Context) -> String {
    if !template.contains("{{") {
        return template.to_string();
    }

    VARIABLE
        .replace_all(template, |caps: &Captures<'_>| match context.lookup(&caps[1]) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            Some(Value::Bool(b)) => b.to_string(),
            _ => String::new(),
        })
        .into_owned()
}
