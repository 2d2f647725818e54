//! User selections and display preferences, and the stores that persist them.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::info::ModuleKind;

const SETTINGS_FILE: &str = "settings.json";
const APP_DIR: &str = "Prismtone";

/// Zone layouts the pad surface can be split into.
pub const ZONE_COUNTS: [u32; 4] = [7, 12, 24, 36];
pub const OCTAVE_OFFSET_RANGE: (i32, i32) = (-7, 7);

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to access settings: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse settings: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("no config directory available")]
    NoConfigDir,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default = "default_theme")]
    pub theme: String,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_sound_preset")]
    pub sound_preset: String,
    /// `None` means no effect chain is applied.
    #[serde(default)]
    pub fx_chain: Option<String>,
    #[serde(default = "default_visualizer")]
    pub visualizer: String,
    #[serde(default = "default_touch_effect")]
    pub touch_effect: String,
    #[serde(default = "default_scale")]
    pub scale: String,
    #[serde(default = "default_tonic")]
    pub current_tonic: String,
    #[serde(default)]
    octave_offset: i32,
    #[serde(default = "default_zone_count")]
    zone_count: u32,
    #[serde(default = "default_true")]
    pub show_note_names: bool,
    #[serde(default = "default_true")]
    pub show_lines: bool,
    #[serde(default = "default_volume_ceiling")]
    pub master_volume_ceiling: f32,
    #[serde(default = "default_true")]
    pub enable_polyphony_volume_scaling: bool,
    #[serde(default = "default_true")]
    pub highlight_sharps_flats: bool,
}

fn default_theme() -> String {
    "aurora".into()
}

fn default_language() -> String {
    "en".into()
}

fn default_sound_preset() -> String {
    "default_piano".into()
}

fn default_visualizer() -> String {
    "nebula".into()
}

fn default_touch_effect() -> String {
    "ballLightningLink".into()
}

fn default_scale() -> String {
    "major".into()
}

fn default_tonic() -> String {
    "C4".into()
}

fn default_zone_count() -> u32 {
    12
}

fn default_true() -> bool {
    true
}

fn default_volume_ceiling() -> f32 {
    1.0
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            theme: default_theme(),
            language: default_language(),
            sound_preset: default_sound_preset(),
            fx_chain: None,
            visualizer: default_visualizer(),
            touch_effect: default_touch_effect(),
            scale: default_scale(),
            current_tonic: default_tonic(),
            octave_offset: 0,
            zone_count: default_zone_count(),
            show_note_names: true,
            show_lines: true,
            master_volume_ceiling: default_volume_ceiling(),
            enable_polyphony_volume_scaling: true,
            highlight_sharps_flats: true,
        }
    }
}

impl Settings {
    /// Selected module id for a selectable kind.
    pub fn selection(&self, kind: ModuleKind) -> Option<&str> {
        match kind {
            ModuleKind::SoundPreset => Some(&self.sound_preset),
            ModuleKind::FxChain => self.fx_chain.as_deref(),
            ModuleKind::Theme => Some(&self.theme),
            ModuleKind::Language => Some(&self.language),
            ModuleKind::Visualizer => Some(&self.visualizer),
            ModuleKind::TouchEffect => Some(&self.touch_effect),
            ModuleKind::Scale => Some(&self.scale),
            ModuleKind::Effect | ModuleKind::ChordProgression => None,
        }
    }

    /// Stores a selection. Only the fx chain accepts `None`; other kinds
    /// keep their previous value, as do kinds without a selection.
    pub fn set_selection(&mut self, kind: ModuleKind, id: Option<String>) {
        if kind == ModuleKind::FxChain {
            self.fx_chain = id;
            return;
        }
        let Some(id) = id else {
            return;
        };
        match kind {
            ModuleKind::SoundPreset => self.sound_preset = id,
            ModuleKind::Theme => self.theme = id,
            ModuleKind::Language => self.language = id,
            ModuleKind::Visualizer => self.visualizer = id,
            ModuleKind::TouchEffect => self.touch_effect = id,
            ModuleKind::Scale => self.scale = id,
            ModuleKind::FxChain | ModuleKind::Effect | ModuleKind::ChordProgression => {}
        }
    }

    pub fn octave_offset(&self) -> i32 {
        self.octave_offset
    }

    /// Clamps the offset to the supported octave range.
    pub fn set_octave_offset(&mut self, offset: i32) {
        let (low, high) = OCTAVE_OFFSET_RANGE;
        self.octave_offset = offset.clamp(low, high);
    }

    pub fn zone_count(&self) -> u32 {
        self.zone_count
    }

    /// Accepts only the supported zone layouts; returns whether it applied.
    pub fn set_zone_count(&mut self, count: u32) -> bool {
        if ZONE_COUNTS.contains(&count) {
            self.zone_count = count;
            true
        } else {
            false
        }
    }

    /// Repairs values a hand-edited file may carry.
    fn sanitize(mut self) -> Self {
        self.set_octave_offset(self.octave_offset);
        if !ZONE_COUNTS.contains(&self.zone_count) {
            self.zone_count = default_zone_count();
        }
        self
    }
}

/// Opaque key-value backend the catalog reads defaults from.
pub trait SettingsStore: Send + Sync {
    fn load_settings(&self) -> Result<Settings, SettingsError>;
    fn save_settings(&self, settings: &Settings) -> Result<(), SettingsError>;
}

/// Settings persisted as pretty JSON in the user's config directory.
#[derive(Debug, Clone)]
pub struct JsonSettingsStore {
    path: PathBuf,
}

impl JsonSettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn open_default() -> Result<Self, SettingsError> {
        Ok(Self::new(Self::default_path()?))
    }

    pub fn default_path() -> Result<PathBuf, SettingsError> {
        let mut path = dirs::config_dir().ok_or(SettingsError::NoConfigDir)?;
        path.push(APP_DIR);
        path.push(SETTINGS_FILE);
        Ok(path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SettingsStore for JsonSettingsStore {
    fn load_settings(&self) -> Result<Settings, SettingsError> {
        if !self.path.exists() {
            tracing::debug!(path = %self.path.display(), "no settings file, using defaults");
            return Ok(Settings::default());
        }
        let raw = fs::read_to_string(&self.path)?;
        let settings: Settings = serde_json::from_str(&raw)?;
        Ok(settings.sanitize())
    }

    fn save_settings(&self, settings: &Settings) -> Result<(), SettingsError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(settings)?;
        let mut file = fs::File::create(&self.path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}

/// In-process store for embedders that keep settings elsewhere.
#[derive(Debug, Default)]
pub struct MemorySettingsStore {
    settings: Mutex<Option<Settings>>,
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SettingsStore for MemorySettingsStore {
    fn load_settings(&self) -> Result<Settings, SettingsError> {
        Ok(self.settings.lock().clone().unwrap_or_default())
    }

    fn save_settings(&self, settings: &Settings) -> Result<(), SettingsError> {
        *self.settings.lock() = Some(settings.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn octave_offset_is_clamped() {
        let mut settings = Settings::default();
        settings.set_octave_offset(12);
        assert_eq!(settings.octave_offset(), 7);
        settings.set_octave_offset(-9);
        assert_eq!(settings.octave_offset(), -7);
        settings.set_octave_offset(3);
        assert_eq!(settings.octave_offset(), 3);
    }

    #[test]
    fn zone_count_accepts_supported_layouts_only() {
        let mut settings = Settings::default();
        assert!(!settings.set_zone_count(10));
        assert_eq!(settings.zone_count(), 12);
        assert!(settings.set_zone_count(24));
        assert_eq!(settings.zone_count(), 24);
    }

    #[test]
    fn fx_chain_selection_can_be_cleared() {
        let mut settings = Settings::default();
        settings.set_selection(ModuleKind::FxChain, Some("ambient".into()));
        assert_eq!(settings.selection(ModuleKind::FxChain), Some("ambient"));
        settings.set_selection(ModuleKind::FxChain, None);
        assert_eq!(settings.selection(ModuleKind::FxChain), None);

        settings.set_selection(ModuleKind::Theme, None);
        assert_eq!(settings.selection(ModuleKind::Theme), Some("aurora"));
    }

    #[test]
    fn json_store_roundtrips_and_defaults_missing_file() {
        let dir = tempdir().unwrap();
        let store = JsonSettingsStore::new(dir.path().join("nested/settings.json"));
        assert_eq!(store.load_settings().unwrap(), Settings::default());

        let mut settings = Settings::default();
        settings.theme = "night".into();
        settings.fx_chain = Some("user_1".into());
        settings.set_octave_offset(-2);
        settings.show_lines = false;
        store.save_settings(&settings).unwrap();

        assert_eq!(store.load_settings().unwrap(), settings);
        let raw = fs::read_to_string(store.path()).unwrap();
        assert!(raw.contains("\"fxChain\": \"user_1\""));
    }

    #[test]
    fn json_store_repairs_out_of_range_values() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{ "octaveOffset": 40, "zoneCount": 5, "theme": "day" }"#).unwrap();
        let settings = JsonSettingsStore::new(&path).load_settings().unwrap();
        assert_eq!(settings.octave_offset(), 7);
        assert_eq!(settings.zone_count(), 12);
        assert_eq!(settings.theme, "day");
        assert_eq!(settings.language, "en");
    }

    #[test]
    fn memory_store_returns_last_saved() {
        let store = MemorySettingsStore::new();
        assert_eq!(store.load_settings().unwrap(), Settings::default());
        let mut settings = Settings::default();
        settings.scale = "minor".into();
        store.save_settings(&settings).unwrap();
        assert_eq!(store.load_settings().unwrap().scale, "minor");
    }
}
