use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::views::{LanguageView, ModuleView};

/// Language every lookup falls back to.
pub const BASE_LANGUAGE: &str = "en";

/// String tables of the registered language modules.
#[derive(Debug, Clone)]
pub struct Localizer {
    languages: HashMap<String, Map<String, Value>>,
    current: String,
}

impl Default for Localizer {
    fn default() -> Self {
        Self {
            languages: HashMap::new(),
            current: BASE_LANGUAGE.to_owned(),
        }
    }
}

impl Localizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, language_id: impl Into<String>, strings: Map<String, Value>) {
        let language_id = language_id.into();
        tracing::debug!(language = %language_id, count = strings.len(), "registered language");
        self.languages.insert(language_id, strings);
    }

    pub fn register_view(&mut self, view: &LanguageView) {
        self.register(view.info().id.clone(), view.strings().clone());
    }

    /// Switches language; ignored when the language is not registered.
    pub fn set_current_language(&mut self, language_id: &str) -> bool {
        if !self.languages.contains_key(language_id) {
            tracing::warn!(language = %language_id, "language not registered");
            return false;
        }
        self.current = language_id.to_owned();
        true
    }

    pub fn current_language(&self) -> &str {
        &self.current
    }

    pub fn get(&self, key: &str) -> String {
        self.get_or(key, None)
    }

    /// Looks `key` up in the current language, then English, then returns
    /// `fallback` or the key itself.
    pub fn get_or(&self, key: &str, fallback: Option<&str>) -> String {
        self.lookup(&self.current, key)
            .or_else(|| {
                (self.current != BASE_LANGUAGE)
                    .then(|| self.lookup(BASE_LANGUAGE, key))
                    .flatten()
            })
            .unwrap_or_else(|| fallback.unwrap_or(key).to_owned())
    }

    /// Strings of the current language; empty when none are registered.
    pub fn all_strings(&self) -> Map<String, Value> {
        self.languages.get(&self.current).cloned().unwrap_or_default()
    }

    fn lookup(&self, language: &str, key: &str) -> Option<String> {
        match self.languages.get(language)?.get(key)? {
            Value::String(text) => Some(text.clone()),
            Value::Number(number) => Some(number.to_string()),
            Value::Bool(flag) => Some(flag.to_string()),
            _ => None,
        }
    }
}
