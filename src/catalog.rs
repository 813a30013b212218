//! Meta-information catalog
//!
//! The console's page/form/field configuration ships as an embedded JSON
//! document. It is parsed and audited once at startup, then one read-only
//! copy per supported language is shared with every request.

use crate::i18n::{Language, LocalizedText};
use crate::schema::{MetaInformation, RuleKind};
use anyhow::{bail, Context};
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

const META_INFO_JSON: &str = include_str!("../assets/meta_info.json");

/// Per-language meta-information documents
#[derive(Debug, Clone)]
pub struct MetaCatalog {
    default_language: Language,
    documents: HashMap<Language, Arc<MetaInformation>>,
}

impl MetaCatalog {
    /// Load the embedded document with `default_language` as fallback
    pub fn load(default_language: Language) -> anyhow::Result<Self> {
        Self::from_json(META_INFO_JSON, default_language)
    }

    pub fn from_json(json: &str, default_language: Language) -> anyhow::Result<Self> {
        let mut base: MetaInformation =
            serde_json::from_str(json).context("Failed to parse meta-information document")?;
        base.default_language = default_language;
        if !base.supported_languages.contains(&default_language) {
            base.supported_languages.push(default_language);
        }

        audit(&base)?;

        let documents = base
            .supported_languages
            .iter()
            .map(|lang| {
                let doc = MetaInformation {
                    language: *lang,
                    ..base.clone()
                };
                (*lang, Arc::new(doc))
            })
            .collect::<HashMap<_, _>>();

        debug!(
            languages = documents.len(),
            pages = base.pages.len(),
            "Meta-information catalog loaded"
        );

        Ok(Self {
            default_language,
            documents,
        })
    }

    pub fn default_language(&self) -> Language {
        self.default_language
    }

    pub fn supports(&self, language: Language) -> bool {
        self.documents.contains_key(&language)
    }

    /// Full document for `language`
    pub fn document(&self, language: Language) -> Option<Arc<MetaInformation>> {
        self.documents.get(&language).cloned()
    }

    /// Document for `language` restricted to one page.
    ///
    /// `None` when the language is unsupported or the page does not exist.
    pub fn page_document(&self, language: Language, page_key: &str) -> Option<MetaInformation> {
        self.documents.get(&language)?.with_only_page(page_key)
    }
}

fn missing(errors: &mut Vec<String>, default: Language, what: String, text: &LocalizedText) {
    if !text.has(default) {
        errors.push(format!("{} has no '{}' text", what, default));
    }
}

/// Check the structural invariants of a document, reporting every problem
fn audit(meta: &MetaInformation) -> anyhow::Result<()> {
    let default = meta.default_language;
    let mut errors = Vec::new();

    let mut page_keys = HashSet::new();
    for page in &meta.pages {
        missing(&mut errors, default, format!("page '{}'", page.key), &page.label);
        for action in &page.actions {
            missing(&mut errors, default, format!("action '{}.{}'", page.key, action.key), &action.label);
        }

        let mut form_keys = HashSet::new();
        for form in &page.forms {
            let form_path = format!("{}.{}", page.key, form.key);
            missing(&mut errors, default, format!("form '{}'", form_path), &form.label);
            if !form_keys.insert(form.key.as_str()) {
                errors.push(format!("form key '{}' is duplicated", form_path));
            }

            for field in &form.fields {
                let field_path = format!("{}.{}", form_path, field.key);
                missing(&mut errors, default, format!("field '{}'", field_path), &field.label);
                if let Some(placeholder) = &field.placeholder {
                    missing(&mut errors, default, format!("placeholder of '{}'", field_path), placeholder);
                }
                for option in &field.options {
                    missing(&mut errors, default, format!("option '{}' of '{}'", option.value, field_path), &option.label);
                }
            }
        }
        if !page_keys.insert(page.key.as_str()) {
            errors.push(format!("page key '{}' is duplicated", page.key));
        }
    }
    for (group, entries) in [
        ("label", &meta.common.labels),
        ("message", &meta.common.messages),
        ("validation message", &meta.common.validation_messages),
    ] {
        for (key, text) in entries {
            missing(&mut errors, default, format!("common {} '{}'", group, key), text);
        }
    }

    for page in &meta.pages {
        for form in &page.forms {
            let form_path = format!("{}.{}", page.key, form.key);
            for key in form.duplicate_keys() {
                errors.push(format!("field key '{}.{}' is duplicated", form_path, key));
            }

            let rules = form
                .fields
                .iter()
                .flat_map(|f| f.rules.iter().map(move |r| (f.key.as_str(), r)))
                .chain(form.rules.iter().map(|r| ("form", r)));
            for (owner, rule) in rules {
                match rule.kind {
                    RuleKind::Pattern => match rule.text_operand() {
                        Some(source) => {
                            if let Err(e) = Regex::new(source) {
                                errors.push(format!("pattern of '{}.{}' does not compile: {}", form_path, owner, e));
                            }
                        }
                        None => errors.push(format!("pattern rule of '{}.{}' has no pattern", form_path, owner)),
                    },
                    RuleKind::Min | RuleKind::Max => {
                        if !rule.operand.as_ref().is_some_and(|v| v.is_number()) {
                            errors.push(format!(
                                "{} rule of '{}.{}' needs a numeric operand",
                                rule.kind.as_str(),
                                form_path,
                                owner
                            ));
                        }
                    }
                    _ => {}
                }
            }

            for field in &form.fields {
                if let Some(condition) = &field.visible_when {
                    if condition.field == field.key || form.field(&condition.field).is_none() {
                        warn!(
                            form = %form_path,
                            field = %field.key,
                            condition_field = %condition.field,
                            "Visibility condition does not reference a sibling field"
                        );
                    }
                }
            }
        }
    }

    if !errors.is_empty() {
        bail!("Meta-information validation failed:\n  - {}", errors.join("\n  - "));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldKind;
    use crate::validation::Validator;
    use serde_json::json;

    #[test]
    fn test_embedded_document_loads() {
        let catalog = MetaCatalog::load(Language::En).unwrap();
        assert!(catalog.supports(Language::En));
        assert!(catalog.supports(Language::Zh));

        let zh = catalog.document(Language::Zh).unwrap();
        assert_eq!(zh.language, Language::Zh);
        assert_eq!(zh.default_language, Language::En);
        assert!(zh.get_page("gateway-mapping").is_some());
    }

    #[test]
    fn test_page_lookup() {
        let catalog = MetaCatalog::load(Language::En).unwrap();
        let page = catalog.page_document(Language::En, "gateway-mapping").unwrap();
        assert_eq!(page.pages.len(), 1);
        assert!(catalog.page_document(Language::En, "nope").is_none());
    }

    #[test]
    fn test_field_lookup_in_embedded_document() {
        let catalog = MetaCatalog::load(Language::En).unwrap();
        let meta = catalog.document(Language::En).unwrap();

        let port = meta.get_field("gateway-mapping", "backends", "port").unwrap();
        assert_eq!(port.kind, FieldKind::Number);
        assert_eq!(port.default_value, json!(80));
        assert!(meta.get_form("gateway-mapping", "missing").is_none());
        assert!(meta.get_field("gateway-mapping", "backends", "missing").is_none());

        let dc = meta.get_field("gateway-mapping", "backends", "dataCenter").unwrap();
        let asia: Vec<_> = dc.options_for(Some("AS")).into_iter().map(|o| o.value.as_str()).collect();
        assert_eq!(asia, vec!["SDC", "TDC"]);
    }

    #[test]
    fn test_embedded_labels_resolve_in_both_languages() {
        let catalog = MetaCatalog::load(Language::En).unwrap();
        let meta = catalog.document(Language::Zh).unwrap();
        let domain = meta.get_field("gateway-mapping", "basic", "domain").unwrap();

        assert_eq!(domain.label_text(&meta.resolver(Language::Zh)), "域名");
        assert_eq!(domain.label_text(&meta.resolver(Language::En)), "Domain");
        assert_eq!(meta.common_label("save", Language::Zh), "保存");
    }

    #[test]
    fn test_embedded_port_rules() {
        let catalog = MetaCatalog::load(Language::En).unwrap();
        let meta = catalog.document(Language::En).unwrap();
        let port = meta.get_field("gateway-mapping", "backends", "port").unwrap();
        let validator = Validator::default();

        let err = validator
            .validate_field(port, Some(&json!(70000)), Language::Zh, &Default::default())
            .unwrap();
        assert_eq!(err.kind, RuleKind::Max);
        assert_eq!(err.message, "端口不能大于65535");
    }

    #[test]
    fn test_embedded_required_select_rejects_blank() {
        let catalog = MetaCatalog::load(Language::En).unwrap();
        let meta = catalog.document(Language::En).unwrap();
        let protocol = meta.get_field("gateway-mapping", "backends", "protocol").unwrap();
        assert!(protocol.rules.iter().all(|rule| rule.kind != RuleKind::Required));
        let validator = Validator::default();

        let err = validator
            .validate_field(protocol, Some(&json!("")), Language::En, &Default::default())
            .unwrap();
        assert_eq!(err.kind, RuleKind::Required);
        assert_eq!(err.message, "Protocol is required");
        assert!(validator
            .validate_field(protocol, Some(&json!("HTTPS")), Language::En, &Default::default())
            .is_none());
    }

    #[test]
    fn test_cookie_name_pattern() {
        let catalog = MetaCatalog::load(Language::En).unwrap();
        let meta = catalog.document(Language::En).unwrap();
        let cookie = meta.get_field("gateway-mapping", "cookies", "cookieName").unwrap();
        let validator = Validator::default();

        assert!(validator
            .validate_field(cookie, Some(&json!("session_id")), Language::En, &Default::default())
            .is_none());
        let err = validator
            .validate_field(cookie, Some(&json!("bad name;")), Language::En, &Default::default())
            .unwrap();
        assert_eq!(err.kind, RuleKind::Pattern);
    }

    #[test]
    fn test_zh_default_language() {
        let catalog = MetaCatalog::load(Language::Zh).unwrap();
        assert_eq!(catalog.default_language(), Language::Zh);
        assert_eq!(catalog.document(Language::En).unwrap().default_language, Language::Zh);
    }

    #[test]
    fn test_audit_rejects_missing_default_text() {
        let json = r#"{
            "supportedLanguages": ["en", "zh"],
            "defaultLanguage": "en",
            "pages": [{
                "key": "p",
                "label": {"zh": "页面"},
                "forms": []
            }]
        }"#;
        let err = MetaCatalog::from_json(json, Language::En).unwrap_err();
        assert!(err.to_string().contains("page 'p'"));
    }

    #[test]
    fn test_audit_rejects_bad_pattern_and_duplicate_keys() {
        let json = r#"{
            "supportedLanguages": ["en"],
            "defaultLanguage": "en",
            "pages": [{
                "key": "p",
                "label": {"en": "Page"},
                "forms": [{
                    "key": "f",
                    "label": {"en": "Form"},
                    "fields": [
                        {"key": "a", "label": {"en": "A"}, "kind": "text",
                         "rules": [{"kind": "pattern", "operand": "([a-z", "message": "bad"}]},
                        {"key": "a", "label": {"en": "A"}, "kind": "text"}
                    ]
                }]
            }]
        }"#;
        let err = MetaCatalog::from_json(json, Language::En).unwrap_err().to_string();
        assert!(err.contains("does not compile"));
        assert!(err.contains("field key 'p.f.a' is duplicated"));
    }
}
