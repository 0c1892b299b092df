//! Validation rules
//!
//! A rule is a named evaluator invoked by the [`Validator`](super::Validator)
//! for one field at a time. Rules that need persisted state (`unique`,
//! `exists`) query the store through the input they receive.

use crate::core::store::{Document, DocumentStore, Filter, ID_FIELD};
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use validator::ValidateEmail;

/// Everything a rule may look at while evaluating one field
pub struct RuleInput<'a> {
    /// Full candidate record
    pub data: &'a Document,
    /// Field under validation
    pub field: &'a str,
    /// Current value of the field, if any
    pub value: Option<&'a Value>,
    /// Arguments given after `rule:` in the expression
    pub args: &'a [String],
    /// Persistence collaborator
    pub store: &'a dyn DocumentStore,
}

impl RuleInput<'_> {
    fn arg(&self, index: usize) -> Option<&str> {
        self.args
            .get(index)
            .map(String::as_str)
            .filter(|a| !a.is_empty())
    }

    fn required_arg(&self, index: usize, rule: &str) -> Result<&str> {
        self.arg(index)
            .ok_or_else(|| anyhow!("rule '{}' on '{}' is missing argument {}", rule, self.field, index))
    }
}

/// A single named validation rule
#[async_trait]
pub trait Rule: Send + Sync {
    /// Whether the value satisfies the rule
    async fn passes(&self, input: &RuleInput<'_>) -> Result<bool>;

    /// Rules returning false here are skipped for absent or empty values
    fn validates_missing(&self) -> bool {
        false
    }
}

/// Whether a value counts as absent for validation purposes
pub fn is_missing(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.is_empty(),
        _ => false,
    }
}

/// `required`: value present and non-empty
pub struct Required;

#[async_trait]
impl Rule for Required {
    async fn passes(&self, input: &RuleInput<'_>) -> Result<bool> {
        Ok(match input.value {
            Some(Value::Array(items)) => !items.is_empty(),
            other => !is_missing(other),
        })
    }

    fn validates_missing(&self) -> bool {
        true
    }
}

/// `email`: well-formed email string
pub struct Email;

#[async_trait]
impl Rule for Email {
    async fn passes(&self, input: &RuleInput<'_>) -> Result<bool> {
        Ok(match input.value {
            Some(Value::String(s)) => s.validate_email(),
            _ => false,
        })
    }
}

/// `min:<n>`: string (or array) length of at least n
pub struct Min;

#[async_trait]
impl Rule for Min {
    async fn passes(&self, input: &RuleInput<'_>) -> Result<bool> {
        let min: usize = input
            .required_arg(0, "min")?
            .parse()
            .map_err(|_| anyhow!("rule 'min' on '{}' expects an integer", input.field))?;

        Ok(match input.value {
            Some(Value::String(s)) => s.chars().count() >= min,
            Some(Value::Array(items)) => items.len() >= min,
            _ => false,
        })
    }
}

/// `unique:<collection>[,field][,exclude_value][,exclude_field]`
///
/// Passes when no stored record of the collection has the same value. The
/// field defaults to the validated field and `exclude_field` to `_id`, so
/// `unique:users,email,<id>` ignores the record being updated.
pub struct Unique;

#[async_trait]
impl Rule for Unique {
    async fn passes(&self, input: &RuleInput<'_>) -> Result<bool> {
        let collection = input.required_arg(0, "unique")?;
        let field = input.arg(1).unwrap_or(input.field);
        let Some(value) = input.value else {
            return Ok(true);
        };

        let mut filter = Filter::new().eq(field, value.clone());
        if let Some(exclude_value) = input.arg(2) {
            let exclude_field = input.arg(3).unwrap_or(ID_FIELD);
            filter = filter.ne(exclude_field, exclude_value);
        }

        Ok(input.store.count(collection, &filter).await? == 0)
    }
}

/// `exists:<collection>[,field]`: a stored record has this value (field defaults to `_id`)
pub struct Exists;

#[async_trait]
impl Rule for Exists {
    async fn passes(&self, input: &RuleInput<'_>) -> Result<bool> {
        let collection = input.required_arg(0, "exists")?;
        let field = input.arg(1).unwrap_or(ID_FIELD);
        let Some(value) = input.value else {
            return Ok(false);
        };

        let filter = Filter::new().eq(field, value.clone());
        Ok(input.store.find_one(collection, &filter).await?.is_some())
    }
}

/// Immutable mapping from rule name to evaluator
///
/// Built once at startup and handed to the [`Validator`](super::Validator).
///
/// # Example
///
/// ```rust,ignore
/// let rules = RuleSet::builder()
///     .with_builtins()
///     .with_rule("slug", SlugRule)
///     .build();
/// ```
#[derive(Clone, Default)]
pub struct RuleSet {
    rules: Arc<HashMap<String, Arc<dyn Rule>>>,
}

impl RuleSet {
    /// Rule set with `required`, `email`, `min`, `unique` and `exists`
    pub fn builtin() -> Self {
        Self::builder().with_builtins().build()
    }

    pub fn builder() -> RuleSetBuilder {
        RuleSetBuilder::default()
    }

    /// Look up a rule by name
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Rule>> {
        self.rules.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.rules.contains_key(name)
    }

    /// Registered rule names
    pub fn names(&self) -> Vec<&str> {
        self.rules.keys().map(|s| s.as_str()).collect()
    }
}

/// Builder for [`RuleSet`]
#[derive(Default)]
pub struct RuleSetBuilder {
    rules: HashMap<String, Arc<dyn Rule>>,
}

impl RuleSetBuilder {
    /// Register the built-in rules
    pub fn with_builtins(self) -> Self {
        self.with_rule("required", Required)
            .with_rule("email", Email)
            .with_rule("min", Min)
            .with_rule("unique", Unique)
            .with_rule("exists", Exists)
    }

    /// Register (or replace) a rule under a name
    pub fn with_rule(mut self, name: impl Into<String>, rule: impl Rule + 'static) -> Self {
        self.rules.insert(name.into(), Arc::new(rule));
        self
    }

    pub fn build(self) -> RuleSet {
        RuleSet {
            rules: Arc::new(self.rules),
        }
    }
}
