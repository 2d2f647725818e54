use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::validator::ValidationError;

/// A raw module document as it appears on disk.
pub type Document = Map<String, Value>;

/// Built-in module kinds understood by the validator and the default registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ModuleKind {
    #[serde(rename = "soundpreset")]
    SoundPreset,
    #[serde(rename = "fxchain")]
    FxChain,
    #[serde(rename = "theme")]
    Theme,
    #[serde(rename = "language")]
    Language,
    #[serde(rename = "visualizer")]
    Visualizer,
    #[serde(rename = "effect")]
    Effect,
    #[serde(rename = "scale")]
    Scale,
    #[serde(rename = "touchEffect")]
    TouchEffect,
    #[serde(rename = "chordProgression")]
    ChordProgression,
}

impl ModuleKind {
    pub const ALL: [ModuleKind; 9] = [
        ModuleKind::SoundPreset,
        ModuleKind::FxChain,
        ModuleKind::Theme,
        ModuleKind::Language,
        ModuleKind::Visualizer,
        ModuleKind::Effect,
        ModuleKind::Scale,
        ModuleKind::TouchEffect,
        ModuleKind::ChordProgression,
    ];

    /// Kinds with a user-facing selection stored in the settings.
    pub const SELECTABLE: [ModuleKind; 7] = [
        ModuleKind::SoundPreset,
        ModuleKind::FxChain,
        ModuleKind::Theme,
        ModuleKind::Language,
        ModuleKind::Visualizer,
        ModuleKind::TouchEffect,
        ModuleKind::Scale,
    ];

    /// Kinds the user can author and persist through a repository.
    pub const PERSISTED: [ModuleKind; 3] = [
        ModuleKind::SoundPreset,
        ModuleKind::FxChain,
        ModuleKind::ChordProgression,
    ];

    /// Type tag used in documents and as the content directory name.
    pub fn as_str(self) -> &'static str {
        match self {
            ModuleKind::SoundPreset => "soundpreset",
            ModuleKind::FxChain => "fxchain",
            ModuleKind::Theme => "theme",
            ModuleKind::Language => "language",
            ModuleKind::Visualizer => "visualizer",
            ModuleKind::Effect => "effect",
            ModuleKind::Scale => "scale",
            ModuleKind::TouchEffect => "touchEffect",
            ModuleKind::ChordProgression => "chordProgression",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == tag)
    }

    /// Id preferred when the settings hold no selection for this kind.
    ///
    /// An empty fx chain bucket still resolves to "no chain".
    pub fn builtin_fallback(self) -> Option<&'static str> {
        match self {
            ModuleKind::SoundPreset => Some("default_piano"),
            ModuleKind::FxChain => Some("default_ambient"),
            ModuleKind::Theme => Some("day"),
            ModuleKind::Language => Some("en"),
            ModuleKind::Visualizer => Some("waves"),
            ModuleKind::TouchEffect => Some("glow"),
            ModuleKind::Scale => Some("major"),
            ModuleKind::Effect | ModuleKind::ChordProgression => None,
        }
    }
}

impl fmt::Display for ModuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Store a module was discovered in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleOrigin {
    Bundled,
    User,
}

impl ModuleOrigin {
    pub fn scheme(self) -> &'static str {
        match self {
            ModuleOrigin::Bundled => "bundled",
            ModuleOrigin::User => "user",
        }
    }
}

/// Canonical description of one module instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleInfo {
    pub id: String,
    #[serde(rename = "type")]
    pub module_type: String,
    pub name: String,
    pub version: String,
    pub description: String,
    pub active: bool,
    /// Provenance, `<origin>://<type>/<file>`.
    pub path: String,
    #[serde(default)]
    pub data: Value,
}

impl ModuleInfo {
    /// Builds a record from a document that already passed validation.
    pub fn from_document(
        document: &Document,
        origin: ModuleOrigin,
        relative_path: &str,
    ) -> Result<Self, ValidationError> {
        let text = |key: &'static str| {
            document
                .get(key)
                .and_then(Value::as_str)
                .map(str::to_owned)
                .ok_or(ValidationError::MissingField(key))
        };
        Ok(Self {
            id: text("id")?,
            module_type: text("type")?,
            name: text("name")?,
            version: text("version")?,
            description: text("description")?,
            active: document
                .get("active")
                .and_then(Value::as_bool)
                .ok_or(ValidationError::MissingActive)?,
            path: format!("{}://{}", origin.scheme(), relative_path),
            data: document.get("data").cloned().unwrap_or(Value::Null),
        })
    }

    pub fn kind(&self) -> Option<ModuleKind> {
        ModuleKind::from_tag(&self.module_type)
    }

    pub fn origin(&self) -> Option<ModuleOrigin> {
        let (scheme, _) = self.path.split_once("://")?;
        [ModuleOrigin::Bundled, ModuleOrigin::User]
            .into_iter()
            .find(|origin| origin.scheme() == scheme)
    }

    /// Looks up a field of the `data` object.
    pub fn data_field(&self, key: &str) -> Option<&Value> {
        self.data.as_object().and_then(|data| data.get(key))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn kind_tags_roundtrip() {
        for kind in ModuleKind::ALL {
            assert_eq!(ModuleKind::from_tag(kind.as_str()), Some(kind));
        }
        assert_eq!(ModuleKind::from_tag("audioComponent"), None);
    }

    #[test]
    fn info_serializes_with_type_key() {
        let document = json!({
            "id": "major",
            "type": "scale",
            "name": "Major",
            "version": "1.0.0",
            "description": "Ionian",
            "active": false,
            "data": { "intervals": [0, 2, 4, 5, 7, 9, 11] }
        });
        let info = ModuleInfo::from_document(
            document.as_object().unwrap(),
            ModuleOrigin::Bundled,
            "scale/major.json",
        )
        .unwrap();
        assert_eq!(info.path, "bundled://scale/major.json");
        assert_eq!(info.origin(), Some(ModuleOrigin::Bundled));
        assert_eq!(info.kind(), Some(ModuleKind::Scale));

        let value = serde_json::to_value(&info).unwrap();
        assert_eq!(value["type"], "scale");
        assert_eq!(value["data"]["intervals"][2], 4);
    }
}
