use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;
use walkdir::WalkDir;

use crate::info::{ModuleInfo, ModuleKind, ModuleOrigin};
use crate::registry::ModuleTypeRegistry;
use crate::settings::Settings;
use crate::validator::{ModuleValidator, ValidationError};

/// Locations of the bundled and user content stores.
///
/// `user_root` holds one repository directory per persisted type and is
/// written only by those repositories. Updated versions of catalog modules
/// go to `override_root`, which shares the `<type>/<id>.json` layout.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub bundled_root: PathBuf,
    pub user_root: PathBuf,
    pub override_root: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        let data_root = dirs::data_dir()
            .map(|dir| dir.join("Prismtone"))
            .unwrap_or_else(|| PathBuf::from(".prismtone"));
        Self::under(PathBuf::from("/usr/share/prismtone/modules"), data_root)
    }
}

impl StoreConfig {
    /// User and override stores side by side below `data_root`.
    pub fn under(bundled_root: impl Into<PathBuf>, data_root: impl AsRef<Path>) -> Self {
        let data_root = data_root.as_ref();
        Self {
            bundled_root: bundled_root.into(),
            user_root: data_root.join("modules"),
            override_root: data_root.join("overrides"),
        }
    }
}

/// Why a single file was left out of the catalog.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed document: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("invalid module: {0}")]
    Invalid(ValidationError),
    #[error("unknown module type `{0}`")]
    UnknownType(String),
    #[error("declared type `{declared}` does not match directory `{directory}`")]
    TypeMismatch { declared: String, directory: String },
}

impl From<ValidationError> for ScanError {
    fn from(err: ValidationError) -> Self {
        match err {
            ValidationError::UnknownType(module_type) => ScanError::UnknownType(module_type),
            other => ScanError::Invalid(other),
        }
    }
}

#[derive(Debug)]
pub struct ScanIssue {
    pub path: PathBuf,
    pub error: ScanError,
}

#[derive(Debug, Default)]
pub struct ScanReport {
    pub added: usize,
    pub replaced: usize,
    pub skipped: Vec<ScanIssue>,
}

impl ScanReport {
    pub fn admitted(&self) -> usize {
        self.added + self.replaced
    }

    fn merge(&mut self, other: ScanReport) {
        self.added += other.added;
        self.replaced += other.replaced;
        self.skipped.extend(other.skipped);
    }
}

/// Default id chosen per selectable kind by [`ModuleCatalog::apply_defaults`].
pub type DefaultSelections = BTreeMap<ModuleKind, Option<String>>;

/// In-memory catalog of discovered modules, grouped by type.
#[derive(Debug)]
pub struct ModuleCatalog {
    bundled_root: PathBuf,
    registry: Arc<ModuleTypeRegistry>,
    validator: ModuleValidator,
    buckets: RwLock<HashMap<String, Vec<ModuleInfo>>>,
}

impl ModuleCatalog {
    pub fn new(bundled_root: impl Into<PathBuf>, registry: Arc<ModuleTypeRegistry>) -> Self {
        let type_names = registry.type_names();
        let buckets: HashMap<_, _> = type_names
            .iter()
            .map(|module_type| (module_type.clone(), Vec::new()))
            .collect();
        let mut validator = ModuleValidator::new();
        for module_type in &type_names {
            validator.add_known_type(module_type.clone());
        }
        Self {
            bundled_root: bundled_root.into(),
            validator,
            registry,
            buckets: RwLock::new(buckets),
        }
    }

    /// Catalog over the built-in module kinds.
    pub fn with_builtin_types(bundled_root: impl Into<PathBuf>) -> Self {
        Self::new(bundled_root, Arc::new(ModuleTypeRegistry::new()))
    }

    pub fn registry(&self) -> Arc<ModuleTypeRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn bundled_root(&self) -> &Path {
        &self.bundled_root
    }

    /// Scans the bundled store. Per-file failures are logged and reported,
    /// never fatal.
    pub fn scan(&self) -> ScanReport {
        tracing::info!(root = %self.bundled_root.display(), "scanning bundled modules");
        let report = self.scan_root(&self.bundled_root, ModuleOrigin::Bundled);
        self.log_summary(&report);
        report
    }

    /// Scans a user store laid out like the bundled one. User documents
    /// replace bundled ones sharing the same `(type, id)`.
    pub fn scan_user_store(&self, root: &Path) -> ScanReport {
        tracing::info!(root = %root.display(), "scanning user modules");
        let report = self.scan_root(root, ModuleOrigin::User);
        self.log_summary(&report);
        report
    }

    /// Scans the bundled store, then the user and override stores in `config`.
    pub fn scan_all(&self, config: &StoreConfig) -> ScanReport {
        let mut report = self.scan();
        report.merge(self.scan_user_store(&config.user_root));
        report.merge(self.scan_user_store(&config.override_root));
        report
    }

    /// Inserts `info` or replaces the record sharing its `(type, id)`.
    /// Returns `true` when an existing record was replaced.
    pub fn insert_or_replace(&self, info: ModuleInfo) -> bool {
        let mut buckets = self.buckets.write();
        let bucket = buckets.entry(info.module_type.clone()).or_default();
        if let Some(existing) = bucket.iter_mut().find(|module| module.id == info.id) {
            tracing::debug!(id = %info.id, module_type = %info.module_type, "replaced module");
            *existing = info;
            true
        } else {
            tracing::debug!(id = %info.id, module_type = %info.module_type, "added module");
            bucket.push(info);
            false
        }
    }

    /// Modules of `module_type` in scan order; empty for unknown types.
    pub fn get_modules(&self, module_type: &str) -> Vec<ModuleInfo> {
        self.buckets
            .read()
            .get(module_type)
            .cloned()
            .unwrap_or_default()
    }

    pub fn find(&self, module_type: &str, id: &str) -> Option<ModuleInfo> {
        self.buckets
            .read()
            .get(module_type)?
            .iter()
            .find(|module| module.id == id)
            .cloned()
    }

    /// Type tags with their module counts, sorted by tag.
    pub fn summary(&self) -> Vec<(String, usize)> {
        let mut summary: Vec<_> = self
            .buckets
            .read()
            .iter()
            .map(|(module_type, modules)| (module_type.clone(), modules.len()))
            .collect();
        summary.sort();
        summary
    }

    /// Picks the initial module of a type.
    ///
    /// In order: the first active module, `fallback` when it is in the list,
    /// the first module. An empty list yields `fallback` unchanged, except
    /// for fx chains where it yields `None` ("no chain").
    pub fn resolve_default(&self, module_type: &str, fallback: Option<&str>) -> Option<String> {
        let buckets = self.buckets.read();
        let modules = buckets
            .get(module_type)
            .map(Vec::as_slice)
            .unwrap_or_default();

        let Some(first) = modules.first() else {
            if module_type == ModuleKind::FxChain.as_str() {
                tracing::debug!("no fx chains available, leaving chain unset");
                return None;
            }
            tracing::warn!(%module_type, ?fallback, "no modules of type, keeping fallback");
            return fallback.map(str::to_owned);
        };

        if let Some(active) = modules.iter().find(|module| module.active) {
            return Some(active.id.clone());
        }
        if let Some(fallback) = fallback.filter(|id| modules.iter().any(|module| module.id == *id))
        {
            return Some(fallback.to_owned());
        }
        Some(first.id.clone())
    }

    /// Resolves and stores a default for every selectable kind.
    ///
    /// The current selection in `settings` acts as the fallback, then the
    /// kind's built-in id.
    pub fn apply_defaults(&self, settings: &mut Settings) -> DefaultSelections {
        let mut selections = DefaultSelections::new();
        for kind in ModuleKind::SELECTABLE {
            let fallback = settings
                .selection(kind)
                .or_else(|| kind.builtin_fallback())
                .map(str::to_owned);
            let selected = self.resolve_default(kind.as_str(), fallback.as_deref());
            tracing::debug!(module_type = %kind, ?selected, "resolved default module");
            settings.set_selection(kind, selected.clone());
            selections.insert(kind, selected);
        }
        selections
    }

    fn scan_root(&self, root: &Path, origin: ModuleOrigin) -> ScanReport {
        let mut report = ScanReport::default();
        if !root.is_dir() {
            tracing::warn!(root = %root.display(), "module store does not exist");
            return report;
        }

        for type_dir in sorted_children(root, &mut report) {
            if !type_dir.is_dir() {
                continue;
            }
            let Some(dir_type) = type_dir.file_name().and_then(|name| name.to_str()) else {
                continue;
            };
            if !self.registry.contains(dir_type) {
                tracing::warn!(directory = %type_dir.display(), "skipping directory of unknown module type");
                continue;
            }

            for path in sorted_children(&type_dir, &mut report) {
                if !is_json_file(&path) {
                    continue;
                }
                match self.read_module(&path, dir_type, origin) {
                    Ok(info) => {
                        if self.insert_or_replace(info) {
                            report.replaced += 1;
                        } else {
                            report.added += 1;
                        }
                    }
                    Err(error) => {
                        tracing::warn!(path = %path.display(), %error, "skipping module file");
                        report.skipped.push(ScanIssue { path, error });
                    }
                }
            }
        }
        report
    }

    fn read_module(
        &self,
        path: &Path,
        dir_type: &str,
        origin: ModuleOrigin,
    ) -> Result<ModuleInfo, ScanError> {
        let raw = fs::read_to_string(path)?;
        let document: Value = serde_json::from_str(&raw)?;
        self.validator.check(&document)?;

        let object = document.as_object().ok_or(ValidationError::NotAnObject)?;
        let declared = object
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default();
        if declared != dir_type {
            return Err(ScanError::TypeMismatch {
                declared: declared.to_owned(),
                directory: dir_type.to_owned(),
            });
        }

        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let relative = format!("{dir_type}/{file_name}");
        Ok(ModuleInfo::from_document(object, origin, &relative)?)
    }

    fn log_summary(&self, report: &ScanReport) {
        tracing::info!(
            added = report.added,
            replaced = report.replaced,
            skipped = report.skipped.len(),
            "module scan complete"
        );
        for (module_type, count) in self.summary() {
            tracing::debug!(%module_type, count, "catalog bucket");
        }
    }
}

fn sorted_children(dir: &Path, report: &mut ScanReport) -> Vec<PathBuf> {
    let mut children = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        match entry {
            Ok(entry) => children.push(entry.into_path()),
            Err(err) => {
                let path = err
                    .path()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| dir.to_path_buf());
                tracing::warn!(path = %path.display(), error = %err, "failed to read module store entry");
                report.skipped.push(ScanIssue {
                    path,
                    error: ScanError::Io(err.into()),
                });
            }
        }
    }
    children
}

pub(crate) fn is_json_file(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    fn info(id: &str, module_type: &str, active: bool) -> ModuleInfo {
        ModuleInfo {
            id: id.into(),
            module_type: module_type.into(),
            name: id.into(),
            version: "1.0.0".into(),
            description: "test".into(),
            active,
            path: format!("bundled://{module_type}/{id}.json"),
            data: json!({}),
        }
    }

    fn catalog() -> ModuleCatalog {
        ModuleCatalog::with_builtin_types("/nonexistent")
    }

    #[test]
    fn insert_or_replace_keeps_ids_unique() {
        let catalog = catalog();
        assert!(!catalog.insert_or_replace(info("day", "theme", false)));
        assert!(!catalog.insert_or_replace(info("night", "theme", false)));
        let mut renamed = info("day", "theme", false);
        renamed.name = "Bright Day".into();
        assert!(catalog.insert_or_replace(renamed));

        let themes = catalog.get_modules("theme");
        assert_eq!(themes.len(), 2);
        assert_eq!(catalog.find("theme", "day").unwrap().name, "Bright Day");
    }

    #[test]
    fn unknown_type_yields_empty_list() {
        assert!(catalog().get_modules("hologram").is_empty());
    }

    #[test]
    fn resolve_default_prefers_active_then_fallback_then_first() {
        let catalog = catalog();
        catalog.insert_or_replace(info("night", "theme", false));
        catalog.insert_or_replace(info("day", "theme", false));
        assert_eq!(catalog.resolve_default("theme", Some("day")).as_deref(), Some("day"));
        assert_eq!(catalog.resolve_default("theme", Some("dusk")).as_deref(), Some("night"));
        assert_eq!(catalog.resolve_default("theme", None).as_deref(), Some("night"));

        catalog.insert_or_replace(info("dusk", "theme", true));
        assert_eq!(catalog.resolve_default("theme", Some("day")).as_deref(), Some("dusk"));
    }

    #[test]
    fn empty_bucket_resolution() {
        let catalog = catalog();
        assert_eq!(catalog.resolve_default("fxchain", None), None);
        assert_eq!(catalog.resolve_default("fxchain", Some("default_ambient")), None);
        assert_eq!(catalog.resolve_default("scale", Some("major")).as_deref(), Some("major"));
        assert_eq!(catalog.resolve_default("scale", None), None);
    }

    #[test]
    fn apply_defaults_updates_settings() {
        let catalog = catalog();
        catalog.insert_or_replace(info("day", "theme", false));
        catalog.insert_or_replace(info("warm_pad", "soundpreset", true));

        let mut settings = Settings::default();
        settings.fx_chain = Some("user_42".into());
        let selections = catalog.apply_defaults(&mut settings);

        // "aurora" from the settings is not in the list, so the first theme wins.
        assert_eq!(settings.theme, "day");
        assert_eq!(settings.sound_preset, "warm_pad");
        assert_eq!(settings.fx_chain, None);
        assert_eq!(settings.scale, "major");
        assert_eq!(selections[&ModuleKind::FxChain], None);
        assert_eq!(selections.len(), ModuleKind::SELECTABLE.len());
    }

    #[test]
    fn fx_chain_prefers_builtin_ambient_chain() {
        let catalog = catalog();
        catalog.insert_or_replace(info("crunch", "fxchain", false));
        catalog.insert_or_replace(info("default_ambient", "fxchain", false));

        let mut settings = Settings::default();
        let selections = catalog.apply_defaults(&mut settings);
        assert_eq!(settings.fx_chain.as_deref(), Some("default_ambient"));
        assert_eq!(
            selections[&ModuleKind::FxChain].as_deref(),
            Some("default_ambient")
        );
    }
}
