//! Rule-driven field and form validation
//!
//! Field rules run in declaration order and stop at the first failure.
//! Form validation collects every field error, then appends form-level
//! errors. Failures are ordinary return values, never errors.
//!
//! `custom` rules name a token looked up in a [`CustomRuleRegistry`]. Field
//! tokens see the field value and its siblings; collection tokens see the
//! whole form and are only valid as form-level rules.

use crate::i18n::{interpolate, Language, LocalizedText, TextResolver};
use crate::schema::{is_blank, FieldSchema, FormSchema, FormValues, RuleKind, ValidationRule};
use crate::visibility::is_visible;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

/// Field key reported for form-level errors
pub const FORM_ERROR_FIELD: &str = "form";

static EMAIL_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email regex"));

/// Message for a `required` field that carries no explicit `required` rule
static REQUIRED_MESSAGE: Lazy<LocalizedText> = Lazy::new(|| {
    LocalizedText::from([(Language::En, "{label} is required"), (Language::Zh, "{label}为必填项")])
});

/// Where a validation error originates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorScope {
    Field,
    Form,
}

/// A failed rule, with its message resolved for the requested language
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
    pub kind: RuleKind,
    pub scope: ErrorScope,
}

/// Check run for a field-level custom token: `(value, sibling values)`
pub type FieldCheck = Arc<dyn Fn(Option<&Value>, &FormValues) -> bool + Send + Sync>;

/// Check run for a form-level collection token over all form values
pub type CollectionCheck = Arc<dyn Fn(&FormValues) -> bool + Send + Sync>;

/// Table of custom rule tokens
#[derive(Clone, Default)]
pub struct CustomRuleRegistry {
    field_checks: HashMap<String, FieldCheck>,
    collection_checks: HashMap<String, CollectionCheck>,
}

impl CustomRuleRegistry {
    /// Empty registry: every custom token passes
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry with the gateway console's built-in tokens
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register_field("at_least_one_limiter", |_, siblings| at_least_one_limiter(siblings));
        // These can only be decided against the whole collection; the
        // collection tokens below do the actual work.
        registry.register_field("unique_domain_path", |_, _| true);
        registry.register_field("unique_header_name", |_, _| true);
        registry.register_field("unique_cookie_name", |_, _| true);

        registry.register_collection("unique_header_names", |values| {
            ["request", "response"]
                .iter()
                .all(|list| !has_duplicate_names(values.get(*list), "name"))
        });
        registry.register_collection("unique_cookie_names", |values| {
            !has_duplicate_names(values.get("exceptions"), "cookieName")
        });
        registry
    }

    pub fn register_field<F>(&mut self, token: &str, check: F)
    where
        F: Fn(Option<&Value>, &FormValues) -> bool + Send + Sync + 'static,
    {
        self.field_checks.insert(token.to_string(), Arc::new(check));
    }

    pub fn register_collection<F>(&mut self, token: &str, check: F)
    where
        F: Fn(&FormValues) -> bool + Send + Sync + 'static,
    {
        self.collection_checks.insert(token.to_string(), Arc::new(check));
    }

    pub fn field_check(&self, token: &str) -> Option<&FieldCheck> {
        self.field_checks.get(token)
    }

    pub fn collection_check(&self, token: &str) -> Option<&CollectionCheck> {
        self.collection_checks.get(token)
    }

    pub fn is_known(&self, token: &str) -> bool {
        self.field_checks.contains_key(token) || self.collection_checks.contains_key(token)
    }
}

impl std::fmt::Debug for CustomRuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut field: Vec<_> = self.field_checks.keys().collect();
        let mut collection: Vec<_> = self.collection_checks.keys().collect();
        field.sort();
        collection.sort();
        f.debug_struct("CustomRuleRegistry")
            .field("field_checks", &field)
            .field("collection_checks", &collection)
            .finish()
    }
}

/// At least one of: IP rules, max concurrent, max per minute, allowed methods
fn at_least_one_limiter(values: &FormValues) -> bool {
    let non_empty_list = |key: &str| {
        values
            .get(key)
            .and_then(Value::as_array)
            .is_some_and(|items| !items.is_empty())
    };
    let set_number = |key: &str| match values.get(key) {
        Some(Value::Number(n)) => n.as_f64().is_some_and(|n| n != 0.0),
        Some(Value::String(s)) => !s.is_empty(),
        _ => false,
    };

    non_empty_list("ipRules")
        || set_number("maxConcurrent")
        || set_number("maxPerMinute")
        || non_empty_list("allowedMethods")
}

/// True iff two entries of `collection` share the same non-empty `key` value
pub fn has_duplicate_names(collection: Option<&Value>, key: &str) -> bool {
    let Some(entries) = collection.and_then(Value::as_array) else {
        return false;
    };
    let mut seen = HashSet::new();
    entries
        .iter()
        .filter_map(|entry| entry.get(key).and_then(Value::as_str))
        .filter(|name| !name.is_empty())
        .any(|name| !seen.insert(name))
}

/// Evaluates field and form schemas against candidate values
#[derive(Debug)]
pub struct Validator {
    default_language: Language,
    registry: CustomRuleRegistry,
    patterns: Mutex<HashMap<String, Option<Regex>>>,
}

impl Default for Validator {
    fn default() -> Self {
        Self::new(Language::default(), CustomRuleRegistry::builtin())
    }
}

impl Validator {
    pub fn new(default_language: Language, registry: CustomRuleRegistry) -> Self {
        Self {
            default_language,
            registry,
            patterns: Mutex::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &CustomRuleRegistry {
        &self.registry
    }

    /// First failing rule of `field` for `value`, or `None` when all pass.
    ///
    /// A `required` field with no explicit `required` rule still rejects
    /// blank values, with a message built from its label.
    pub fn validate_field(
        &self,
        field: &FieldSchema,
        value: Option<&Value>,
        language: Language,
        siblings: &FormValues,
    ) -> Option<ValidationError> {
        let resolver = TextResolver::new(language, self.default_language);
        let has_required_rule = field.rules.iter().any(|rule| rule.kind == RuleKind::Required);
        if field.required && !has_required_rule && is_blank(value) {
            let template = resolver.resolve(Some(&*REQUIRED_MESSAGE), None);
            return Some(ValidationError {
                field: field.key.clone(),
                message: interpolate(&template, &[("label", field.label_text(&resolver))]),
                kind: RuleKind::Required,
                scope: ErrorScope::Field,
            });
        }

        self.first_failure(&field.key, &field.rules, value, siblings)
            .map(|rule| ValidationError {
                field: field.key.clone(),
                message: rule.message.resolve(&resolver),
                kind: rule.kind,
                scope: ErrorScope::Field,
            })
    }

    /// All field errors in field order, followed by form-level errors
    pub fn validate_form(&self, form: &FormSchema, values: &FormValues, language: Language) -> Vec<ValidationError> {
        let mut errors: Vec<ValidationError> = form
            .fields
            .iter()
            .filter_map(|field| self.validate_field(field, values.get(&field.key), language, values))
            .collect();
        errors.extend(self.validate_form_rules(form, values, language));
        errors
    }

    /// Like [`Validator::validate_form`] but skips fields that are hidden
    pub fn validate_visible(&self, form: &FormSchema, values: &FormValues, language: Language) -> Vec<ValidationError> {
        let mut errors: Vec<ValidationError> = form
            .fields
            .iter()
            .filter(|field| is_visible(field, values))
            .filter_map(|field| self.validate_field(field, values.get(&field.key), language, values))
            .collect();
        errors.extend(self.validate_form_rules(form, values, language));
        errors
    }

    /// Form-level rules only; field rules are not run
    pub fn validate_form_rules(&self, form: &FormSchema, values: &FormValues, language: Language) -> Vec<ValidationError> {
        let resolver = TextResolver::new(language, self.default_language);
        let whole = Value::Object(values.clone());
        let mut errors = Vec::new();

        for rule in &form.rules {
            if rule.kind != RuleKind::Custom {
                debug!(form = %form.key, kind = rule.kind.as_str(), "Skipping non-custom form rule");
                continue;
            }
            let passed = match rule
                .text_operand()
                .and_then(|token| self.registry.collection_check(token))
            {
                Some(check) => check(values),
                None => self
                    .first_failure(FORM_ERROR_FIELD, std::slice::from_ref(rule), Some(&whole), values)
                    .is_none(),
            };
            if !passed {
                errors.push(ValidationError {
                    field: FORM_ERROR_FIELD.to_string(),
                    message: rule.message.resolve(&resolver),
                    kind: rule.kind,
                    scope: ErrorScope::Form,
                });
            }
        }
        errors
    }

    fn first_failure<'r>(
        &self,
        key: &str,
        rules: &'r [ValidationRule],
        value: Option<&Value>,
        siblings: &FormValues,
    ) -> Option<&'r ValidationRule> {
        rules
            .iter()
            .find(|rule| !self.rule_passes(key, rule, value, siblings))
    }

    fn rule_passes(&self, key: &str, rule: &ValidationRule, value: Option<&Value>, siblings: &FormValues) -> bool {
        match rule.kind {
            RuleKind::Required => !is_blank(value),
            RuleKind::Min => match value {
                Some(Value::Number(n)) => n.as_f64().is_some_and(|n| n >= rule.numeric_operand()),
                Some(Value::String(s)) => s.chars().count() as f64 >= rule.numeric_operand(),
                _ => true,
            },
            RuleKind::Max => match value {
                Some(Value::Number(n)) => n.as_f64().is_some_and(|n| n <= rule.numeric_operand()),
                Some(Value::String(s)) => s.chars().count() as f64 <= rule.numeric_operand(),
                _ => true,
            },
            RuleKind::Pattern => match (value, rule.text_operand()) {
                (Some(Value::String(s)), Some(source)) if !source.is_empty() => self.matches_pattern(key, source, s),
                _ => true,
            },
            RuleKind::Email => match value {
                Some(Value::String(s)) => EMAIL_REGEX.is_match(s),
                _ => true,
            },
            RuleKind::Url => match value {
                Some(Value::String(s)) => url::Url::parse(s).is_ok(),
                _ => true,
            },
            RuleKind::Custom => {
                let Some(token) = rule.text_operand() else {
                    return true;
                };
                match self.registry.field_check(token) {
                    Some(check) => check(value, siblings),
                    None => {
                        if !self.registry.is_known(token) {
                            debug!(field = key, token, "Unknown custom rule token, treating as pass");
                        }
                        true
                    }
                }
            }
        }
    }

    /// Compiled patterns are cached; an uncompilable pattern fails the value
    fn matches_pattern(&self, key: &str, source: &str, candidate: &str) -> bool {
        let mut cache = self.patterns.lock();
        let compiled = cache.entry(source.to_string()).or_insert_with(|| match Regex::new(source) {
            Ok(re) => Some(re),
            Err(e) => {
                warn!(field = key, pattern = source, error = %e, "Invalid validation pattern");
                None
            }
        });
        compiled.as_ref().is_some_and(|re| re.is_match(candidate))
    }
}
