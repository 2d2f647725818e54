//! Typed, read-only projections over a module's `data` payload.
//!
//! A view is constructed empty from its [`ModuleInfo`] and filled in by
//! [`ModuleView::initialize`]. The loader only hands out views whose
//! initialization succeeded.

use std::any::Any;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::info::ModuleInfo;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ViewError {
    #[error("module has no `data` object")]
    MissingData,
    #[error("`data.{0}` is missing or empty")]
    MissingField(&'static str),
    #[error("`data.{field}` is malformed: {reason}")]
    Malformed { field: &'static str, reason: String },
}

/// Capability interface shared by every module kind.
pub trait ModuleView: Any + Send + Sync + fmt::Debug {
    fn info(&self) -> &ModuleInfo;

    /// Extracts the type-specific fields from the module data.
    fn initialize(&mut self) -> Result<(), ViewError>;

    /// Serializable projection handed to the presentation layer.
    fn values(&self) -> Value;

    /// Teardown hook run before the loader drops the view.
    fn on_unload(&mut self) -> bool {
        true
    }

    fn as_any(&self) -> &dyn Any;
}

fn data_object(info: &ModuleInfo) -> Result<&Map<String, Value>, ViewError> {
    info.data.as_object().ok_or(ViewError::MissingData)
}

fn non_empty_object<'a>(
    data: &'a Map<String, Value>,
    field: &'static str,
) -> Result<&'a Map<String, Value>, ViewError> {
    data.get(field)
        .and_then(Value::as_object)
        .filter(|object| !object.is_empty())
        .ok_or(ViewError::MissingField(field))
}

fn non_empty_array<'a>(
    data: &'a Map<String, Value>,
    field: &'static str,
) -> Result<&'a Vec<Value>, ViewError> {
    data.get(field)
        .and_then(Value::as_array)
        .filter(|array| !array.is_empty())
        .ok_or(ViewError::MissingField(field))
}

macro_rules! view_boilerplate {
    () => {
        fn info(&self) -> &ModuleInfo {
            &self.info
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    };
}

#[derive(Debug)]
pub struct SoundPresetView {
    info: ModuleInfo,
    settings: Map<String, Value>,
}

impl SoundPresetView {
    const SECTIONS: [&'static str; 3] = ["oscillator", "envelope", "filter"];

    pub fn new(info: ModuleInfo) -> Self {
        Self {
            info,
            settings: Map::new(),
        }
    }

    /// Synth sections present in the preset.
    pub fn settings(&self) -> &Map<String, Value> {
        &self.settings
    }

    pub fn section(&self, name: &str) -> Option<&Value> {
        self.settings.get(name)
    }
}

impl ModuleView for SoundPresetView {
    view_boilerplate!();

    fn initialize(&mut self) -> Result<(), ViewError> {
        let data = data_object(&self.info)?;
        self.settings = Self::SECTIONS
            .iter()
            .filter_map(|section| {
                data.get(*section)
                    .map(|value| ((*section).to_owned(), value.clone()))
            })
            .collect();
        Ok(())
    }

    fn values(&self) -> Value {
        Value::Object(self.settings.clone())
    }
}

/// One effect slot of an fx chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectSpec {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub params: Map<String, Value>,
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug)]
pub struct FxChainView {
    info: ModuleInfo,
    effects: Vec<EffectSpec>,
}

impl FxChainView {
    pub fn new(info: ModuleInfo) -> Self {
        Self {
            info,
            effects: Vec::new(),
        }
    }

    pub fn effects(&self) -> &[EffectSpec] {
        &self.effects
    }

    pub fn enabled_effects(&self) -> impl Iterator<Item = &EffectSpec> {
        self.effects.iter().filter(|effect| effect.enabled)
    }
}

impl ModuleView for FxChainView {
    view_boilerplate!();

    fn initialize(&mut self) -> Result<(), ViewError> {
        let data = data_object(&self.info)?;
        let effects = non_empty_array(data, "effects")?;
        self.effects = effects
            .iter()
            .map(|effect| EffectSpec::deserialize(effect))
            .collect::<Result<_, _>>()
            .map_err(|err| ViewError::Malformed {
                field: "effects",
                reason: err.to_string(),
            })?;
        Ok(())
    }

    fn values(&self) -> Value {
        json!({ "effects": self.effects })
    }
}

#[derive(Debug)]
pub struct ThemeView {
    info: ModuleInfo,
    colors: Map<String, Value>,
}

impl ThemeView {
    pub fn new(info: ModuleInfo) -> Self {
        Self {
            info,
            colors: Map::new(),
        }
    }

    pub fn colors(&self) -> &Map<String, Value> {
        &self.colors
    }

    pub fn color(&self, name: &str) -> Option<&str> {
        self.colors.get(name).and_then(Value::as_str)
    }
}

impl ModuleView for ThemeView {
    view_boilerplate!();

    fn initialize(&mut self) -> Result<(), ViewError> {
        let data = data_object(&self.info)?;
        self.colors = non_empty_object(data, "colors")?.clone();
        Ok(())
    }

    fn values(&self) -> Value {
        json!({ "colors": self.colors })
    }
}

#[derive(Debug)]
pub struct LanguageView {
    info: ModuleInfo,
    strings: Map<String, Value>,
}

impl LanguageView {
    pub fn new(info: ModuleInfo) -> Self {
        Self {
            info,
            strings: Map::new(),
        }
    }

    pub fn strings(&self) -> &Map<String, Value> {
        &self.strings
    }

    pub fn string(&self, key: &str) -> Option<&str> {
        self.strings.get(key).and_then(Value::as_str)
    }
}

impl ModuleView for LanguageView {
    view_boilerplate!();

    fn initialize(&mut self) -> Result<(), ViewError> {
        let data = data_object(&self.info)?;
        self.strings = non_empty_object(data, "strings")?.clone();
        Ok(())
    }

    fn values(&self) -> Value {
        json!({ "strings": self.strings })
    }
}

#[derive(Debug)]
pub struct VisualizerView {
    info: ModuleInfo,
    settings: Map<String, Value>,
}

impl VisualizerView {
    pub fn new(info: ModuleInfo) -> Self {
        Self {
            info,
            settings: Map::new(),
        }
    }

    pub fn settings(&self) -> &Map<String, Value> {
        &self.settings
    }
}

impl ModuleView for VisualizerView {
    view_boilerplate!();

    fn initialize(&mut self) -> Result<(), ViewError> {
        self.settings = data_object(&self.info)?.clone();
        Ok(())
    }

    fn values(&self) -> Value {
        Value::Object(self.settings.clone())
    }
}

#[derive(Debug)]
pub struct EffectView {
    info: ModuleInfo,
    parameters: Vec<Value>,
}

impl EffectView {
    pub fn new(info: ModuleInfo) -> Self {
        Self {
            info,
            parameters: Vec::new(),
        }
    }

    pub fn parameters(&self) -> &[Value] {
        &self.parameters
    }
}

impl ModuleView for EffectView {
    view_boilerplate!();

    fn initialize(&mut self) -> Result<(), ViewError> {
        let data = data_object(&self.info)?;
        self.parameters = non_empty_array(data, "parameters")?.clone();
        Ok(())
    }

    fn values(&self) -> Value {
        json!({ "parameters": self.parameters })
    }
}

#[derive(Debug)]
pub struct ScaleView {
    info: ModuleInfo,
    intervals: Vec<i32>,
}

impl ScaleView {
    pub fn new(info: ModuleInfo) -> Self {
        Self {
            info,
            intervals: Vec::new(),
        }
    }

    /// Semitone offsets from the tonic, in scale order.
    pub fn intervals(&self) -> &[i32] {
        &self.intervals
    }
}

impl ModuleView for ScaleView {
    view_boilerplate!();

    fn initialize(&mut self) -> Result<(), ViewError> {
        let data = data_object(&self.info)?;
        self.intervals = non_empty_array(data, "intervals")?
            .iter()
            .map(|interval| {
                interval
                    .as_i64()
                    .and_then(|value| i32::try_from(value).ok())
                    .ok_or_else(|| ViewError::Malformed {
                        field: "intervals",
                        reason: format!("{interval} is not an integer"),
                    })
            })
            .collect::<Result<_, _>>()?;
        Ok(())
    }

    fn values(&self) -> Value {
        json!({ "intervals": self.intervals })
    }
}

/// Touch effects are rendered entirely by the front-end.
#[derive(Debug)]
pub struct TouchEffectView {
    info: ModuleInfo,
}

impl TouchEffectView {
    pub fn new(info: ModuleInfo) -> Self {
        Self { info }
    }
}

impl ModuleView for TouchEffectView {
    view_boilerplate!();

    fn initialize(&mut self) -> Result<(), ViewError> {
        Ok(())
    }

    fn values(&self) -> Value {
        match &self.info.data {
            Value::Object(settings) => Value::Object(settings.clone()),
            _ => Value::Object(Map::new()),
        }
    }
}

#[derive(Debug)]
pub struct ChordProgressionView {
    info: ModuleInfo,
    chord_ids: Vec<String>,
}

impl ChordProgressionView {
    pub fn new(info: ModuleInfo) -> Self {
        Self {
            info,
            chord_ids: Vec::new(),
        }
    }

    pub fn chord_ids(&self) -> &[String] {
        &self.chord_ids
    }
}

impl ModuleView for ChordProgressionView {
    view_boilerplate!();

    fn initialize(&mut self) -> Result<(), ViewError> {
        let data = data_object(&self.info)?;
        self.chord_ids = non_empty_array(data, "chordIds")?
            .iter()
            .map(|chord| {
                chord
                    .as_str()
                    .map(str::to_owned)
                    .ok_or_else(|| ViewError::Malformed {
                        field: "chordIds",
                        reason: format!("{chord} is not a string"),
                    })
            })
            .collect::<Result<_, _>>()?;
        Ok(())
    }

    fn values(&self) -> Value {
        json!({ "chordIds": self.chord_ids })
    }
}
