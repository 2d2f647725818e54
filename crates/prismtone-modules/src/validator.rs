use std::collections::BTreeSet;

use serde_json::{Map, Value};
use thiserror::Error;

use crate::info::ModuleKind;

const REQUIRED_TEXT_FIELDS: [&str; 5] = ["id", "type", "name", "version", "description"];

/// First structural rule a document broke.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("document is not a JSON object")]
    NotAnObject,
    #[error("required field `{0}` is missing or empty")]
    MissingField(&'static str),
    #[error("field `active` is missing or not a boolean")]
    MissingActive,
    #[error("id `{0}` is not usable as a file name")]
    UnsafeId(String),
    #[error("unknown module type `{0}`")]
    UnknownType(String),
    #[error("`data` is not a JSON object")]
    DataNotAnObject,
    #[error("{module_type} data {rule}")]
    Data {
        module_type: &'static str,
        rule: &'static str,
    },
}

/// Structural checks applied to every document before it enters the catalog.
#[derive(Debug, Clone)]
pub struct ModuleValidator {
    known_types: BTreeSet<String>,
}

impl Default for ModuleValidator {
    fn default() -> Self {
        Self {
            known_types: ModuleKind::ALL
                .iter()
                .map(|kind| kind.as_str().to_owned())
                .collect(),
        }
    }
}

impl ModuleValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validator accepting exactly the given type tags.
    pub fn with_known_types<I, S>(types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            known_types: types.into_iter().map(Into::into).collect(),
        }
    }

    pub fn add_known_type(&mut self, module_type: impl Into<String>) {
        self.known_types.insert(module_type.into());
    }

    pub fn is_known_type(&self, module_type: &str) -> bool {
        self.known_types.contains(module_type)
    }

    pub fn validate(&self, document: Option<&Value>) -> bool {
        document.is_some_and(|document| self.check(document).is_ok())
    }

    pub fn check(&self, document: &Value) -> Result<(), ValidationError> {
        let object = document.as_object().ok_or(ValidationError::NotAnObject)?;
        for field in REQUIRED_TEXT_FIELDS {
            match object.get(field).and_then(Value::as_str) {
                Some(text) if !text.is_empty() => {}
                _ => return Err(ValidationError::MissingField(field)),
            }
        }
        let id = object.get("id").and_then(Value::as_str).unwrap_or_default();
        if !is_file_safe_id(id) {
            return Err(ValidationError::UnsafeId(id.to_owned()));
        }
        if !object.get("active").is_some_and(Value::is_boolean) {
            return Err(ValidationError::MissingActive);
        }

        let module_type = object
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default();
        if !self.is_known_type(module_type) {
            return Err(ValidationError::UnknownType(module_type.to_owned()));
        }

        match object.get("data") {
            None => Ok(()),
            Some(Value::Object(data)) => match ModuleKind::from_tag(module_type) {
                Some(kind) => check_data(kind, data),
                // Registered extension types carry no built-in data rules.
                None => Ok(()),
            },
            Some(_) => Err(ValidationError::DataNotAnObject),
        }
    }
}

/// Ids name files in the stores, so they must stay a single path component.
pub(crate) fn is_file_safe_id(id: &str) -> bool {
    !id.is_empty() && !id.contains(['/', '\\', '\0']) && !id.contains("..")
}

fn check_data(kind: ModuleKind, data: &Map<String, Value>) -> Result<(), ValidationError> {
    let fail = |rule| {
        Err(ValidationError::Data {
            module_type: kind.as_str(),
            rule,
        })
    };
    let is_array = |key: &str| data.get(key).is_some_and(Value::is_array);
    let is_object = |key: &str| data.get(key).is_some_and(Value::is_object);

    match kind {
        ModuleKind::SoundPreset => {
            if ["oscillator", "envelope", "filter"]
                .iter()
                .any(|key| data.contains_key(*key))
            {
                Ok(())
            } else {
                fail("needs `oscillator`, `envelope` or `filter`")
            }
        }
        ModuleKind::FxChain if !is_array("effects") => fail("needs an `effects` array"),
        ModuleKind::Theme if !is_object("colors") => fail("needs a `colors` object"),
        ModuleKind::Language if !is_object("strings") => fail("needs a `strings` object"),
        ModuleKind::Effect if !is_array("parameters") => fail("needs a `parameters` array"),
        ModuleKind::Scale => match data.get("intervals").and_then(Value::as_array) {
            Some(intervals) if !intervals.is_empty() => Ok(()),
            _ => fail("needs a non-empty `intervals` array"),
        },
        ModuleKind::ChordProgression if !is_array("chordIds") => {
            fail("needs a `chordIds` array")
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    fn base(module_type: &str) -> Value {
        json!({
            "id": "sample",
            "type": module_type,
            "name": "Sample",
            "version": "1.0.0",
            "description": "A sample module",
            "active": false
        })
    }

    fn with_data(module_type: &str, data: Value) -> Value {
        let mut document = base(module_type);
        document["data"] = data;
        document
    }

    #[test]
    fn absent_document_is_invalid() {
        assert!(!ModuleValidator::new().validate(None));
    }

    #[test]
    fn document_without_data_is_valid_for_every_builtin_type() {
        let validator = ModuleValidator::new();
        for kind in ModuleKind::ALL {
            assert!(validator.validate(Some(&base(kind.as_str()))), "{kind}");
        }
    }

    #[test]
    fn empty_or_missing_text_fields_fail() {
        let validator = ModuleValidator::new();
        for field in REQUIRED_TEXT_FIELDS {
            let mut empty = base("theme");
            empty[field] = json!("");
            assert_eq!(
                validator.check(&empty),
                Err(ValidationError::MissingField(field))
            );

            let mut missing = base("theme");
            missing.as_object_mut().unwrap().remove(field);
            assert!(!validator.validate(Some(&missing)));
        }
    }

    #[test]
    fn active_flag_is_required() {
        let mut document = base("theme");
        document.as_object_mut().unwrap().remove("active");
        assert_eq!(
            ModuleValidator::new().check(&document),
            Err(ValidationError::MissingActive)
        );
    }

    #[test]
    fn unknown_type_fails_until_registered() {
        let document = base("audioComponent");
        let mut validator = ModuleValidator::new();
        assert_eq!(
            validator.check(&document),
            Err(ValidationError::UnknownType("audioComponent".into()))
        );
        validator.add_known_type("audioComponent");
        assert!(validator.validate(Some(&document)));
    }

    #[test]
    fn type_specific_data_rules() {
        let validator = ModuleValidator::new();
        let cases = [
            ("fxchain", json!({ "effects": [] }), true),
            ("fxchain", json!({ "effects": {} }), false),
            ("theme", json!({ "colors": { "primary": "#fff" } }), true),
            ("theme", json!({ "colors": ["#fff"] }), false),
            ("scale", json!({ "intervals": [0, 2, 4] }), true),
            ("scale", json!({ "intervals": [] }), false),
            ("soundpreset", json!({ "envelope": {} }), true),
            ("soundpreset", json!({ "volume": 0.5 }), false),
            ("language", json!({ "strings": {} }), true),
            ("effect", json!({ "parameters": 3 }), false),
            ("visualizer", json!({}), true),
            ("chordProgression", json!({ "chordIds": ["C4M"] }), true),
        ];
        for (module_type, data, expected) in cases {
            let document = with_data(module_type, data);
            assert_eq!(
                validator.validate(Some(&document)),
                expected,
                "{module_type}: {document}"
            );
        }
    }

    #[test]
    fn ids_must_be_single_path_components() {
        let validator = ModuleValidator::new();
        for id in ["../../escaped", "nested/theme", "back\\slash", ".."] {
            let mut document = base("theme");
            document["id"] = json!(id);
            assert_eq!(
                validator.check(&document),
                Err(ValidationError::UnsafeId(id.into()))
            );
        }
        let mut dotted = base("theme");
        dotted["id"] = json!("night.v2");
        assert!(validator.validate(Some(&dotted)));
    }

    #[test]
    fn non_object_data_fails() {
        let document = with_data("visualizer", json!("waves"));
        assert_eq!(
            ModuleValidator::new().check(&document),
            Err(ValidationError::DataNotAnObject)
        );
    }
}
