//! Validation and filtering system
//!
//! Resources declare rule expressions per field (`"required|email"`); the
//! [`Validator`] evaluates them against the record about to be saved using an
//! immutable [`RuleSet`] registered once at startup.

pub mod engine;
pub mod filters;
pub mod rules;

pub use engine::{FieldRules, RuleMessages, Validator};
pub use filters::{FieldFilter, apply_filters};
pub use rules::{Rule, RuleInput, RuleSet, RuleSetBuilder};
