//! Declarative page, form and field schemas
//!
//! These types are the wire format of the meta-information document served
//! at `/api/meta-info`, and the input to the visibility and validation
//! engines. Field names serialize in camelCase to match what the console
//! front end consumes.

use crate::i18n::{interpolate, Language, LocalizedText, TextResolver};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};

/// Current values of a form, keyed by field key
pub type FormValues = serde_json::Map<String, Value>;

/// Input widget kind of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Text,
    Textarea,
    Number,
    Select,
    Multiselect,
    Checkbox,
    Switch,
}

impl FieldKind {
    /// Whether the field carries a list of selectable options
    pub fn has_options(&self) -> bool {
        matches!(self, FieldKind::Select | FieldKind::Multiselect)
    }

    /// Convert raw widget input into the value type this field stores.
    ///
    /// Numbers: empty input clears the value, unparseable input also clears
    /// it. Checkboxes and switches accept `true`/`on`/`1`. Multiselects take
    /// a comma-separated list.
    pub fn coerce(&self, raw: &str) -> Value {
        match self {
            FieldKind::Text | FieldKind::Textarea | FieldKind::Select => {
                Value::String(raw.to_string())
            }
            FieldKind::Number => {
                let trimmed = raw.trim();
                if trimmed.is_empty() {
                    return Value::Null;
                }
                if let Ok(n) = trimmed.parse::<i64>() {
                    return Value::from(n);
                }
                trimmed
                    .parse::<f64>()
                    .ok()
                    .and_then(serde_json::Number::from_f64)
                    .map(Value::Number)
                    .unwrap_or(Value::Null)
            }
            FieldKind::Checkbox | FieldKind::Switch => Value::Bool(matches!(
                raw.trim().to_ascii_lowercase().as_str(),
                "true" | "on" | "1" | "yes"
            )),
            FieldKind::Multiselect => Value::Array(
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(|s| Value::String(s.to_string()))
                    .collect(),
            ),
        }
    }
}

/// Kind of a validation rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleKind {
    Required,
    Min,
    Max,
    Pattern,
    Email,
    Url,
    Custom,
}

impl RuleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleKind::Required => "required",
            RuleKind::Min => "min",
            RuleKind::Max => "max",
            RuleKind::Pattern => "pattern",
            RuleKind::Email => "email",
            RuleKind::Url => "url",
            RuleKind::Custom => "custom",
        }
    }
}

/// Rule message: either a literal string or per-language text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RuleMessage {
    Literal(String),
    Localized(LocalizedText),
}

impl RuleMessage {
    pub fn resolve(&self, resolver: &TextResolver) -> String {
        match self {
            RuleMessage::Literal(text) => text.clone(),
            RuleMessage::Localized(text) => resolver.resolve(Some(text), None),
        }
    }
}

impl From<&str> for RuleMessage {
    fn from(text: &str) -> Self {
        RuleMessage::Literal(text.to_string())
    }
}

impl From<LocalizedText> for RuleMessage {
    fn from(text: LocalizedText) -> Self {
        RuleMessage::Localized(text)
    }
}

/// One validation rule attached to a field or a form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationRule {
    pub kind: RuleKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operand: Option<Value>,
    pub message: RuleMessage,
}

impl ValidationRule {
    pub fn new(kind: RuleKind, operand: Option<Value>, message: impl Into<RuleMessage>) -> Self {
        Self {
            kind,
            operand,
            message: message.into(),
        }
    }

    pub fn required(message: impl Into<RuleMessage>) -> Self {
        Self::new(RuleKind::Required, None, message)
    }

    pub fn min(bound: f64, message: impl Into<RuleMessage>) -> Self {
        Self::new(RuleKind::Min, Some(number(bound)), message)
    }

    pub fn max(bound: f64, message: impl Into<RuleMessage>) -> Self {
        Self::new(RuleKind::Max, Some(number(bound)), message)
    }

    pub fn pattern(regex: &str, message: impl Into<RuleMessage>) -> Self {
        Self::new(RuleKind::Pattern, Some(Value::from(regex)), message)
    }

    pub fn email(message: impl Into<RuleMessage>) -> Self {
        Self::new(RuleKind::Email, None, message)
    }

    pub fn url(message: impl Into<RuleMessage>) -> Self {
        Self::new(RuleKind::Url, None, message)
    }

    pub fn custom(token: &str, message: impl Into<RuleMessage>) -> Self {
        Self::new(RuleKind::Custom, Some(Value::from(token)), message)
    }

    /// Numeric operand; a missing or non-numeric operand reads as 0
    pub fn numeric_operand(&self) -> f64 {
        self.operand.as_ref().and_then(Value::as_f64).unwrap_or(0.0)
    }

    /// String operand (pattern source or custom token)
    pub fn text_operand(&self) -> Option<&str> {
        self.operand.as_ref().and_then(Value::as_str)
    }
}

fn number(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}

/// A selectable option of a select or multiselect field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldOption {
    pub label: LocalizedText,
    pub value: String,
    /// Value of the parent field this option belongs to (dependent selects)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_value: Option<String>,
}

impl FieldOption {
    pub fn new(label: LocalizedText, value: &str) -> Self {
        Self {
            label,
            value: value.to_string(),
            parent_value: None,
        }
    }

    pub fn under(mut self, parent_value: &str) -> Self {
        self.parent_value = Some(parent_value.to_string());
        self
    }

    /// Display label; the raw value when no translation exists
    pub fn label_text(&self, resolver: &TextResolver) -> String {
        resolver.resolve(Some(&self.label), Some(&self.value))
    }
}

/// Comparison used by a visibility condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    Equals,
    NotEquals,
    Contains,
    Exists,
}

/// Show a field only when another field's value satisfies a comparison
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub field: String,
    pub operator: ConditionOperator,
    #[serde(default)]
    pub value: Value,
}

impl Condition {
    pub fn new(field: &str, operator: ConditionOperator, value: Value) -> Self {
        Self {
            field: field.to_string(),
            operator,
            value,
        }
    }
}

/// Declarative description of one form input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldSchema {
    pub key: String,
    pub label: LocalizedText,
    pub kind: FieldKind,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub default_value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<LocalizedText>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<ValidationRule>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<FieldOption>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visible_when: Option<Condition>,
}

impl FieldSchema {
    pub fn new(key: &str, kind: FieldKind) -> Self {
        Self {
            key: key.to_string(),
            label: LocalizedText::new(),
            kind,
            required: false,
            default_value: Value::Null,
            placeholder: None,
            rules: Vec::new(),
            options: Vec::new(),
            depends_on: Vec::new(),
            visible_when: None,
        }
    }

    pub fn with_label(mut self, label: LocalizedText) -> Self {
        self.label = label;
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default_value = value;
        self
    }

    pub fn with_rule(mut self, rule: ValidationRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn with_option(mut self, option: FieldOption) -> Self {
        self.options.push(option);
        self
    }

    pub fn depends_on(mut self, key: &str) -> Self {
        self.depends_on.push(key.to_string());
        self
    }

    pub fn visible_when(mut self, condition: Condition) -> Self {
        self.visible_when = Some(condition);
        self
    }

    /// Options selectable given the currently chosen parent value.
    ///
    /// Options without a parent are always offered.
    pub fn options_for(&self, parent: Option<&str>) -> Vec<&FieldOption> {
        self.options
            .iter()
            .filter(|opt| match (&opt.parent_value, parent) {
                (None, _) => true,
                (Some(p), Some(selected)) => p == selected,
                (Some(_), None) => false,
            })
            .collect()
    }

    pub fn label_text(&self, resolver: &TextResolver) -> String {
        resolver.resolve(Some(&self.label), Some(&self.key))
    }

    pub fn placeholder_text(&self, resolver: &TextResolver) -> String {
        resolver.resolve(self.placeholder.as_ref(), None)
    }
}

/// A named, ordered group of fields plus cross-field rules
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormSchema {
    pub key: String,
    pub label: LocalizedText,
    pub fields: Vec<FieldSchema>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<ValidationRule>,
}

impl FormSchema {
    pub fn new(key: &str) -> Self {
        Self {
            key: key.to_string(),
            label: LocalizedText::new(),
            fields: Vec::new(),
            rules: Vec::new(),
        }
    }

    pub fn with_field(mut self, field: FieldSchema) -> Self {
        self.fields.push(field);
        self
    }

    pub fn with_rule(mut self, rule: ValidationRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn field(&self, key: &str) -> Option<&FieldSchema> {
        self.fields.iter().find(|f| f.key == key)
    }

    /// Initial values taken from each field's `defaultValue`
    pub fn default_values(&self) -> FormValues {
        self.fields
            .iter()
            .filter(|f| !f.default_value.is_null())
            .map(|f| (f.key.clone(), f.default_value.clone()))
            .collect()
    }

    /// Field keys that appear more than once
    pub fn duplicate_keys(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        let mut dupes = Vec::new();
        for field in &self.fields {
            if !seen.insert(field.key.as_str()) && !dupes.contains(&field.key.as_str()) {
                dupes.push(field.key.as_str());
            }
        }
        dupes
    }
}

/// Visual weight of a page action button
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Primary,
    Secondary,
    Danger,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageAction {
    pub key: String,
    pub label: LocalizedText,
    pub kind: ActionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

/// One console page and the forms it renders
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageSchema {
    pub key: String,
    pub label: LocalizedText,
    pub forms: Vec<FormSchema>,
    #[serde(default)]
    pub actions: Vec<PageAction>,
}

impl PageSchema {
    pub fn form(&self, key: &str) -> Option<&FormSchema> {
        self.forms.iter().find(|f| f.key == key)
    }
}

/// Shared label, message and validation-message dictionaries
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommonText {
    #[serde(default)]
    pub labels: BTreeMap<String, LocalizedText>,
    #[serde(default)]
    pub messages: BTreeMap<String, LocalizedText>,
    #[serde(default)]
    pub validation_messages: BTreeMap<String, LocalizedText>,
}

/// Root configuration document consumed by the form renderer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetaInformation {
    pub supported_languages: Vec<Language>,
    pub default_language: Language,
    /// Language this document was built for
    #[serde(default)]
    pub language: Language,
    pub pages: Vec<PageSchema>,
    #[serde(default)]
    pub common: CommonText,
}

impl MetaInformation {
    pub fn get_page(&self, page_key: &str) -> Option<&PageSchema> {
        self.pages.iter().find(|p| p.key == page_key)
    }

    pub fn get_form(&self, page_key: &str, form_key: &str) -> Option<&FormSchema> {
        self.get_page(page_key)?.form(form_key)
    }

    pub fn get_field(&self, page_key: &str, form_key: &str, field_key: &str) -> Option<&FieldSchema> {
        self.get_form(page_key, form_key)?.field(field_key)
    }

    /// Copy of this document restricted to a single page
    pub fn with_only_page(&self, page_key: &str) -> Option<MetaInformation> {
        let page = self.get_page(page_key)?.clone();
        Some(MetaInformation {
            pages: vec![page],
            ..self.clone()
        })
    }

    pub fn resolver(&self, language: Language) -> TextResolver {
        TextResolver::new(language, self.default_language)
    }

    /// Common label by key; the key itself when no entry exists
    pub fn common_label(&self, key: &str, language: Language) -> String {
        self.resolver(language)
            .resolve(self.common.labels.get(key), Some(key))
    }

    /// Common message by key; the key itself when no entry exists
    pub fn common_message(&self, key: &str, language: Language) -> String {
        self.resolver(language)
            .resolve(self.common.messages.get(key), Some(key))
    }

    /// Validation message by key with `{param}` substitution
    pub fn validation_message(&self, key: &str, language: Language, params: &[(&str, String)]) -> String {
        let template = self
            .resolver(language)
            .resolve(self.common.validation_messages.get(key), Some(key));
        interpolate(&template, params)
    }
}

/// Null, missing, and the empty string all count as "no value"
pub fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.is_empty(),
        Some(_) => false,
    }
}

/// Strict equality: same JSON type and value, numbers compared numerically
pub fn strict_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn region_field() -> FieldSchema {
        FieldSchema::new("dataCenter", FieldKind::Select)
            .depends_on("region")
            .with_option(FieldOption::new(LocalizedText::uniform("WK"), "WK").under("EU"))
            .with_option(FieldOption::new(LocalizedText::uniform("SDC"), "SDC").under("AS"))
            .with_option(FieldOption::new(LocalizedText::uniform("Any"), "ANY"))
    }

    #[test]
    fn test_field_schema_deserialize() {
        let field: FieldSchema = serde_json::from_value(json!({
            "key": "port",
            "label": {"en": "Port", "zh": "端口"},
            "kind": "number",
            "required": true,
            "defaultValue": 80,
            "rules": [
                {"kind": "min", "operand": 1, "message": "Port must be at least 1"},
                {"kind": "max", "operand": 65535, "message": {"en": "Too big", "zh": "太大"}}
            ]
        }))
        .unwrap();

        assert_eq!(field.kind, FieldKind::Number);
        assert!(field.required);
        assert_eq!(field.default_value, json!(80));
        assert_eq!(field.rules.len(), 2);
        assert_eq!(field.rules[0].numeric_operand(), 1.0);
        assert!(matches!(field.rules[1].message, RuleMessage::Localized(_)));
        assert!(field.visible_when.is_none());
    }

    #[test]
    fn test_unknown_field_kind_rejected() {
        let result: Result<FieldSchema, _> = serde_json::from_value(json!({
            "key": "x", "label": {}, "kind": "slider"
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_condition_operator_names() {
        let cond: Condition = serde_json::from_value(json!({
            "field": "enabled", "operator": "not_equals", "value": true
        }))
        .unwrap();
        assert_eq!(cond.operator, ConditionOperator::NotEquals);
    }

    #[test]
    fn test_rule_builders() {
        let rule = ValidationRule::max(65535.0, "too big");
        assert_eq!(rule.operand, Some(json!(65535)));
        assert_eq!(ValidationRule::custom("at_least_one_limiter", "x").text_operand(), Some("at_least_one_limiter"));
        assert_eq!(ValidationRule::required("x").numeric_operand(), 0.0);
    }

    #[test]
    fn test_options_for_parent() {
        let field = region_field();
        let eu: Vec<_> = field.options_for(Some("EU")).into_iter().map(|o| o.value.as_str()).collect();
        assert_eq!(eu, vec!["WK", "ANY"]);
        let none: Vec<_> = field.options_for(None).into_iter().map(|o| o.value.as_str()).collect();
        assert_eq!(none, vec!["ANY"]);
    }

    #[test]
    fn test_coerce_number() {
        assert_eq!(FieldKind::Number.coerce(""), Value::Null);
        assert_eq!(FieldKind::Number.coerce("8080"), json!(8080));
        assert_eq!(FieldKind::Number.coerce("1.5"), json!(1.5));
        assert_eq!(FieldKind::Number.coerce("abc"), Value::Null);
    }

    #[test]
    fn test_coerce_other_kinds() {
        assert_eq!(FieldKind::Switch.coerce("on"), json!(true));
        assert_eq!(FieldKind::Checkbox.coerce("false"), json!(false));
        assert_eq!(FieldKind::Text.coerce(" a "), json!(" a "));
        assert_eq!(FieldKind::Multiselect.coerce("GET, POST,,"), json!(["GET", "POST"]));
    }

    #[test]
    fn test_form_defaults_and_duplicates() {
        let form = FormSchema::new("backends")
            .with_field(FieldSchema::new("port", FieldKind::Number).with_default(json!(80)))
            .with_field(FieldSchema::new("enabled", FieldKind::Switch).with_default(json!(true)))
            .with_field(FieldSchema::new("hostname", FieldKind::Text))
            .with_field(FieldSchema::new("port", FieldKind::Number));

        let defaults = form.default_values();
        assert_eq!(defaults.get("port"), Some(&json!(80)));
        assert_eq!(defaults.get("enabled"), Some(&json!(true)));
        assert!(!defaults.contains_key("hostname"));
        assert_eq!(form.duplicate_keys(), vec!["port"]);
    }

    #[test]
    fn test_is_blank() {
        assert!(is_blank(None));
        assert!(is_blank(Some(&Value::Null)));
        assert!(is_blank(Some(&json!(""))));
        assert!(!is_blank(Some(&json!(0))));
        assert!(!is_blank(Some(&json!(false))));
        assert!(!is_blank(Some(&json!([]))));
    }

    #[test]
    fn test_strict_eq_numbers() {
        assert!(strict_eq(&json!(1), &json!(1.0)));
        assert!(!strict_eq(&json!(1), &json!("1")));
        assert!(strict_eq(&json!("custom"), &json!("custom")));
    }

    #[test]
    fn test_common_lookups() {
        let mut common = CommonText::default();
        common.labels.insert(
            "save".to_string(),
            LocalizedText::from([(Language::En, "Save"), (Language::Zh, "保存")]),
        );
        common.validation_messages.insert(
            "minValue".to_string(),
            LocalizedText::from([(Language::En, "Minimum value is {min}"), (Language::Zh, "最小值为{min}")]),
        );
        let meta = MetaInformation {
            supported_languages: Language::ALL.to_vec(),
            default_language: Language::En,
            language: Language::Zh,
            pages: vec![],
            common,
        };

        assert_eq!(meta.common_label("save", Language::Zh), "保存");
        assert_eq!(meta.common_label("missing", Language::Zh), "missing");
        assert_eq!(meta.common_message("saveSuccess", Language::En), "saveSuccess");
        assert_eq!(
            meta.validation_message("minValue", Language::Zh, &[("min", "1".to_string())]),
            "最小值为1"
        );
    }
}
