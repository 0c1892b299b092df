//! Validation engine
//!
//! Evaluates rule expressions such as `"required|min:5"` against a candidate
//! record. Every rule of every field is evaluated, one after the other, and
//! all failures are returned together.

use super::rules::{RuleInput, RuleSet, is_missing};
use crate::core::error::FieldViolation;
use crate::core::store::{Document, DocumentStore};
use anyhow::{Result, anyhow};
use indexmap::IndexMap;
use regex::{Captures, Regex};
use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([\w.]+)\s*\}\}").expect("placeholder regex is valid")
});

/// Rule expressions keyed by field, evaluated in insertion order
pub type FieldRules = IndexMap<&'static str, String>;

/// Message templates keyed by `field.rule` or `rule`
pub type RuleMessages = HashMap<&'static str, &'static str>;

/// One `name:arg1,arg2` segment of a rule expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleCall {
    pub name: String,
    pub args: Vec<String>,
}

/// Split a rule expression into its calls
///
/// `"required|unique:users,email"` yields `required()` and
/// `unique(users, email)`. Empty segments are ignored.
pub fn parse_expression(expression: &str) -> Vec<RuleCall> {
    expression
        .split('|')
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .map(|segment| match segment.split_once(':') {
            Some((name, args)) => RuleCall {
                name: name.trim().to_string(),
                args: args.split(',').map(|a| a.trim().to_string()).collect(),
            },
            None => RuleCall {
                name: segment.to_string(),
                args: Vec::new(),
            },
        })
        .collect()
}

/// Render a message template
///
/// Supports `{{ field }}`, `{{ validation }}` and `{{ argument.N }}`.
/// Unknown placeholders render as an empty string.
pub fn render_message(template: &str, field: &str, validation: &str, args: &[String]) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures| {
            let key = &caps[1];
            match key {
                "field" => field.to_string(),
                "validation" => validation.to_string(),
                _ => key
                    .strip_prefix("argument.")
                    .and_then(|n| n.parse::<usize>().ok())
                    .and_then(|n| args.get(n))
                    .cloned()
                    .unwrap_or_default(),
            }
        })
        .into_owned()
}

const DEFAULT_MESSAGE: &str = "{{ validation }} validation failed on {{ field }}";

/// Validation engine bound to a rule set and a store
#[derive(Clone)]
pub struct Validator {
    rules: RuleSet,
    store: Arc<dyn DocumentStore>,
}

impl Validator {
    pub fn new(rules: RuleSet, store: Arc<dyn DocumentStore>) -> Self {
        Self { rules, store }
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Validate a record against per-field rule expressions
    ///
    /// Returns every violation found, in field then rule order. An empty
    /// vector means the record is valid. Unknown rule names and store
    /// failures are errors, not violations.
    pub async fn validate(
        &self,
        data: &Document,
        rules: &FieldRules,
        messages: &RuleMessages,
    ) -> Result<Vec<FieldViolation>> {
        let mut violations = Vec::new();

        for (&field, expression) in rules {
            let value = data.get(field);

            for call in parse_expression(expression) {
                let rule = self
                    .rules
                    .get(&call.name)
                    .ok_or_else(|| anyhow!("unknown validation rule '{}' on '{}'", call.name, field))?;

                if is_missing(value) && !rule.validates_missing() {
                    continue;
                }

                let input = RuleInput {
                    data,
                    field,
                    value,
                    args: &call.args,
                    store: self.store.as_ref(),
                };

                if !rule.passes(&input).await? {
                    let template = messages
                        .get(format!("{}.{}", field, call.name).as_str())
                        .or_else(|| messages.get(call.name.as_str()))
                        .copied()
                        .unwrap_or(DEFAULT_MESSAGE);

                    violations.push(FieldViolation::new(
                        field,
                        call.name.as_str(),
                        render_message(template, field, &call.name, &call.args),
                    ));
                }
            }
        }

        Ok(violations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStore;
    use serde_json::{Value, json};

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    fn validator() -> (Validator, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        (Validator::new(RuleSet::builtin(), store.clone()), store)
    }

    fn user_rules() -> FieldRules {
        let mut rules = FieldRules::new();
        rules.insert("email", "required|email|unique:users,email".to_string());
        rules.insert("password", "required|min:5".to_string());
        rules
    }

    #[test]
    fn test_parse_expression() {
        let calls = parse_expression("required| unique:users,email ,x |");
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].name, "required");
        assert!(calls[0].args.is_empty());
        assert_eq!(calls[1].name, "unique");
        assert_eq!(calls[1].args, vec!["users", "email", "x"]);
    }

    #[test]
    fn test_render_message() {
        let args = vec!["5".to_string()];
        assert_eq!(
            render_message(
                "{{ field }} must be at least {{ argument.0 }} characters long",
                "password",
                "min",
                &args
            ),
            "password must be at least 5 characters long"
        );
        assert_eq!(
            render_message(DEFAULT_MESSAGE, "email", "email", &[]),
            "email validation failed on email"
        );
        assert_eq!(render_message("{{argument.3}}!", "f", "r", &args), "!");
    }

    #[tokio::test]
    async fn test_collects_every_failure() {
        let (validator, _) = validator();
        let violations = validator
            .validate(&doc(json!({"email": "bad"})), &user_rules(), &RuleMessages::new())
            .await
            .unwrap();

        assert_eq!(violations.len(), 2);
        assert_eq!(violations[0].field, "email");
        assert_eq!(violations[0].validation, "email");
        assert_eq!(violations[1].field, "password");
        assert_eq!(violations[1].validation, "required");
        assert_eq!(
            violations[1].message,
            "required validation failed on password"
        );
    }

    #[tokio::test]
    async fn test_valid_record_has_no_violations() {
        let (validator, _) = validator();
        let violations = validator
            .validate(
                &doc(json!({"email": "a@b.com", "password": "secret"})),
                &user_rules(),
                &RuleMessages::new(),
            )
            .await
            .unwrap();
        assert!(violations.is_empty());
    }

    #[tokio::test]
    async fn test_async_rules_are_awaited() {
        let (validator, store) = validator();
        store
            .save("users", doc(json!({"email": "a@b.com"})))
            .await
            .unwrap();

        let violations = validator
            .validate(
                &doc(json!({"email": "a@b.com", "password": "1"})),
                &user_rules(),
                &RuleMessages::new(),
            )
            .await
            .unwrap();

        let rules: Vec<_> = violations.iter().map(|v| v.validation.as_str()).collect();
        assert_eq!(rules, vec!["unique", "min"]);
    }

    #[tokio::test]
    async fn test_field_specific_message_wins() {
        let (validator, _) = validator();
        let mut messages = RuleMessages::new();
        messages.insert(
            "password.min",
            "{{ field }} must be at least {{ argument.0 }} characters long",
        );
        messages.insert("min", "too short");

        let violations = validator
            .validate(
                &doc(json!({"email": "a@b.com", "password": "abc"})),
                &user_rules(),
                &messages,
            )
            .await
            .unwrap();

        assert_eq!(violations.len(), 1);
        assert_eq!(
            violations[0].message,
            "password must be at least 5 characters long"
        );
    }

    #[tokio::test]
    async fn test_empty_values_skip_optional_rules() {
        let (validator, _) = validator();
        let mut rules = FieldRules::new();
        rules.insert("nickname", "email|min:3".to_string());

        let violations = validator
            .validate(&doc(json!({"nickname": ""})), &rules, &RuleMessages::new())
            .await
            .unwrap();
        assert!(violations.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_rule_is_an_error() {
        let (validator, _) = validator();
        let mut rules = FieldRules::new();
        rules.insert("name", "required|between:1,3".to_string());

        let result = validator
            .validate(&doc(json!({"name": "x"})), &rules, &RuleMessages::new())
            .await;
        assert!(result.is_err());
    }
}
