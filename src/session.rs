//! Per-client language session
//!
//! Holds the active language and the meta-information last fetched for it.
//! A language switch drops the held document and hands out a new fetch
//! ticket; only the result of the most recent ticket is accepted, so a slow
//! fetch for an earlier language can never overwrite a later one.

use crate::i18n::{Language, TextResolver};
use crate::schema::{FormSchema, MetaInformation};
use std::sync::Arc;
use tracing::debug;

/// Proof that a fetch was started for a particular language and generation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchTicket {
    generation: u64,
    language: Language,
}

impl FetchTicket {
    pub fn language(&self) -> Language {
        self.language
    }
}

#[derive(Debug)]
pub struct Session {
    language: Language,
    default_language: Language,
    generation: u64,
    meta: Option<Arc<MetaInformation>>,
}

impl Session {
    pub fn new(language: Language, default_language: Language) -> Self {
        Self {
            language,
            default_language,
            generation: 0,
            meta: None,
        }
    }

    pub fn language(&self) -> Language {
        self.language
    }

    /// Resolver for the session's active language
    pub fn resolver(&self) -> TextResolver {
        TextResolver::new(self.language, self.default_language)
    }

    /// Switch language. The held document is discarded and must be
    /// re-fetched with the returned ticket.
    pub fn set_language(&mut self, language: Language) -> FetchTicket {
        debug!(from = %self.language, to = %language, "Session language changed");
        self.language = language;
        self.meta = None;
        self.begin_fetch()
    }

    /// Start a fetch for the current language, superseding any in flight
    pub fn begin_fetch(&mut self) -> FetchTicket {
        self.generation += 1;
        FetchTicket {
            generation: self.generation,
            language: self.language,
        }
    }

    /// Deliver a fetched document. Returns `false` and drops it when a
    /// newer fetch has been started since `ticket` was issued.
    pub fn complete(&mut self, ticket: FetchTicket, meta: Arc<MetaInformation>) -> bool {
        if ticket.generation != self.generation || ticket.language != self.language {
            debug!(
                ticket = ticket.generation,
                current = self.generation,
                "Discarding stale meta-information"
            );
            return false;
        }
        self.meta = Some(meta);
        true
    }

    /// The held document; `None` while loading
    pub fn meta(&self) -> Option<&Arc<MetaInformation>> {
        self.meta.as_ref()
    }

    pub fn form(&self, page_key: &str, form_key: &str) -> Option<&FormSchema> {
        self.meta.as_ref()?.get_form(page_key, form_key)
    }
}
