//! Field filters
//!
//! Filters normalize request values before validation runs, so rules like
//! `unique` compare the stored form of a value.

use crate::core::store::Document;
use serde_json::Value;

/// A value transformation applied to one field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldFilter {
    /// Strip leading and trailing whitespace
    Trim,
    /// Lower-case the string
    Lowercase,
}

impl FieldFilter {
    /// Apply the filter to a value; non-strings pass through untouched
    pub fn apply(self, value: Value) -> Value {
        let Value::String(s) = value else {
            return value;
        };
        match self {
            FieldFilter::Trim => Value::String(s.trim().to_string()),
            FieldFilter::Lowercase => Value::String(s.to_lowercase()),
        }
    }
}

/// Run a chain of filters over one field of a document, in order
pub fn apply_filters(document: &mut Document, field: &str, filters: &[FieldFilter]) {
    if let Some(value) = document.remove(field) {
        let filtered = filters.iter().fold(value, |v, f| f.apply(v));
        document.insert(field.to_string(), filtered);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_trim_removes_whitespace() {
        assert_eq!(FieldFilter::Trim.apply(json!("  hello  ")), json!("hello"));
        assert_eq!(FieldFilter::Trim.apply(json!("   ")), json!(""));
    }

    #[test]
    fn test_lowercase_converts_string() {
        assert_eq!(
            FieldFilter::Lowercase.apply(json!("Hello@WORLD.com")),
            json!("hello@world.com")
        );
    }

    #[test]
    fn test_non_string_passthrough() {
        assert_eq!(FieldFilter::Trim.apply(json!(42)), json!(42));
        assert_eq!(FieldFilter::Lowercase.apply(json!(true)), json!(true));
        assert_eq!(FieldFilter::Lowercase.apply(json!(null)), json!(null));
    }

    #[test]
    fn test_apply_filters_chains_in_order() {
        let mut doc = json!({"email": "  Someone@Example.COM "})
            .as_object()
            .cloned()
            .unwrap();
        apply_filters(
            &mut doc,
            "email",
            &[FieldFilter::Trim, FieldFilter::Lowercase],
        );
        assert_eq!(doc["email"], "someone@example.com");
    }

    #[test]
    fn test_apply_filters_ignores_missing_field() {
        let mut doc = Document::new();
        apply_filters(&mut doc, "email", &[FieldFilter::Lowercase]);
        assert!(doc.is_empty());
    }
}
