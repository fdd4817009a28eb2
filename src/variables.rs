//! Template variable resolution.
//!
//! Table identifiers may contain `${var}` references to dashboard template
//! variables. The frontend interpolates dashboard-level variables itself,
//! but targets executed in the backend carry their scoped variables along
//! in the query JSON, and every table identifier is passed through a
//! [`VariableResolver`] before use.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;

/// The scoped template variables attached to a query target,
/// keyed by variable name.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ScopedVars(HashMap<String, ScopedVar>);

/// A single scoped variable value.
#[derive(Clone, Debug, Deserialize)]
pub struct ScopedVar {
    /// The display text for the value, if different from the value itself.
    #[serde(default)]
    pub text: Option<Value>,
    /// The variable's current value.
    pub value: Value,
}

impl ScopedVars {
    /// Look up a variable's value as a string.
    pub fn lookup(&self, name: &str) -> Option<String> {
        self.0.get(name).map(|var| match &var.value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }
}

/// Substitutes `${var}` references in text.
pub trait VariableResolver: std::fmt::Debug + Send + Sync {
    /// Replace every `${var}` reference in `text` with the variable's value
    /// from `scope`, leaving unknown references intact.
    fn resolve(&self, text: &str, scope: Option<&ScopedVars>) -> String;
}

/// The default resolver: plain `${var}` substitution against the target's
/// scoped variables.
#[derive(Clone, Copy, Debug, Default)]
pub struct TemplateResolver;

impl VariableResolver for TemplateResolver {
    fn resolve(&self, text: &str, scope: Option<&ScopedVars>) -> String {
        if !text.contains("${") {
            return text.to_string();
        }
        let mut out = String::with_capacity(text.len());
        let mut rest = text;
        while let Some(start) = rest.find("${") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            match after.find('}') {
                Some(end) => {
                    let name = &after[..end];
                    match scope.and_then(|vars| vars.lookup(name)) {
                        Some(value) => out.push_str(&value),
                        None => {
                            out.push_str("${");
                            out.push_str(name);
                            out.push('}');
                        }
                    }
                    rest = &after[end + 1..];
                }
                None => {
                    // Unterminated reference; keep the tail verbatim.
                    out.push_str(&rest[start..]);
                    rest = "";
                }
            }
        }
        out.push_str(rest);
        out
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn scope(vars: &[(&str, Value)]) -> ScopedVars {
        ScopedVars(
            vars.iter()
                .map(|(name, value)| {
                    (
                        name.to_string(),
                        ScopedVar {
                            text: None,
                            value: value.clone(),
                        },
                    )
                })
                .collect(),
        )
    }

    #[test]
    fn plain_text_passes_through() {
        assert_eq!(TemplateResolver.resolve("table-1", None), "table-1");
    }

    #[test]
    fn replaces_known_variables() {
        let vars = scope(&[("tableId", Value::String("t-42".to_string()))]);
        assert_eq!(
            TemplateResolver.resolve("${tableId}", Some(&vars)),
            "t-42"
        );
        assert_eq!(
            TemplateResolver.resolve("prefix-${tableId}-suffix", Some(&vars)),
            "prefix-t-42-suffix"
        );
    }

    #[test]
    fn non_string_values_are_stringified() {
        let vars = scope(&[("n", Value::from(7))]);
        assert_eq!(TemplateResolver.resolve("table-${n}", Some(&vars)), "table-7");
    }

    #[test]
    fn unknown_variables_are_left_intact() {
        let vars = scope(&[("other", Value::String("x".to_string()))]);
        assert_eq!(
            TemplateResolver.resolve("${tableId}", Some(&vars)),
            "${tableId}"
        );
        assert_eq!(TemplateResolver.resolve("${tableId}", None), "${tableId}");
    }

    #[test]
    fn unterminated_reference_is_kept_verbatim() {
        assert_eq!(TemplateResolver.resolve("a-${oops", None), "a-${oops");
    }

    #[test]
    fn deserializes_grafana_scoped_vars() {
        let vars: ScopedVars = serde_json::from_value(serde_json::json!({
            "tableId": {"text": "My table", "value": "t-1"},
        }))
        .unwrap();
        assert_eq!(vars.lookup("tableId").as_deref(), Some("t-1"));
        assert_eq!(vars.lookup("missing"), None);
    }
}
