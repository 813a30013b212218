//! Localized text resolution
//!
//! Every user-facing label or message in the console is stored as a
//! [`LocalizedText`]: a map from language code to display text. Resolution
//! goes requested language, then the default language, then a caller-supplied
//! literal, then the empty string.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Languages the console ships translations for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    /// English (default)
    #[default]
    En,
    /// Simplified Chinese
    Zh,
}

impl Language {
    /// All supported languages, in the order they are advertised
    pub const ALL: [Language; 2] = [Language::En, Language::Zh];

    /// Two-letter code used in query strings and `LocalizedText` keys
    pub fn code(&self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Zh => "zh",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Returned when a language code is not one of [`Language::ALL`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported language: {0}")]
pub struct UnsupportedLanguage(pub String);

impl FromStr for Language {
    type Err = UnsupportedLanguage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "en" => Ok(Language::En),
            "zh" => Ok(Language::Zh),
            other => Err(UnsupportedLanguage(other.to_string())),
        }
    }
}

/// Display text keyed by language code
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocalizedText(BTreeMap<String, String>);

impl LocalizedText {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the text for one language
    pub fn with(mut self, language: Language, text: impl Into<String>) -> Self {
        self.0.insert(language.code().to_string(), text.into());
        self
    }

    /// Same text for every supported language
    pub fn uniform(text: impl Into<String>) -> Self {
        let text = text.into();
        Language::ALL
            .iter()
            .fold(Self::new(), |acc, lang| acc.with(*lang, text.clone()))
    }

    /// Raw lookup; empty entries count as missing
    pub fn get(&self, language: Language) -> Option<&str> {
        self.0
            .get(language.code())
            .map(String::as_str)
            .filter(|s| !s.is_empty())
    }

    pub fn has(&self, language: Language) -> bool {
        self.get(language).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<const N: usize> From<[(Language, &str); N]> for LocalizedText {
    fn from(entries: [(Language, &str); N]) -> Self {
        entries
            .into_iter()
            .fold(Self::new(), |acc, (lang, text)| acc.with(lang, text))
    }
}

/// Resolve `text` for `language`, falling back to `default_language`,
/// then `fallback`, then the empty string. Never fails.
pub fn resolve(
    text: Option<&LocalizedText>,
    language: Language,
    default_language: Language,
    fallback: Option<&str>,
) -> String {
    text.and_then(|t| t.get(language).or_else(|| t.get(default_language)))
        .or(fallback)
        .unwrap_or_default()
        .to_string()
}

/// The active language of one session plus its fallback language.
///
/// Passed explicitly to everything that produces user-facing text; there is
/// no process-wide "current language".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextResolver {
    language: Language,
    default_language: Language,
}

impl TextResolver {
    pub fn new(language: Language, default_language: Language) -> Self {
        Self {
            language,
            default_language,
        }
    }

    pub fn language(&self) -> Language {
        self.language
    }

    pub fn default_language(&self) -> Language {
        self.default_language
    }

    pub fn resolve(&self, text: Option<&LocalizedText>, fallback: Option<&str>) -> String {
        resolve(text, self.language, self.default_language, fallback)
    }
}

/// Replace `{name}` placeholders in `template` with the matching parameter
pub fn interpolate(template: &str, params: &[(&str, String)]) -> String {
    params.iter().fold(template.to_string(), |acc, (name, value)| {
        acc.replace(&format!("{{{}}}", name), value)
    })
}
