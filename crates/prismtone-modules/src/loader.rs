use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use crate::info::ModuleInfo;
use crate::registry::ModuleTypeRegistry;
use crate::views::{ModuleView, ViewError};

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("unknown type: {0}")]
    UnknownType(String),
    #[error("initialization failed for {id}: {source}")]
    Initialization {
        id: String,
        #[source]
        source: ViewError,
    },
}

/// Builds typed views on demand and caches the ones that initialized.
#[derive(Debug)]
pub struct ModuleLoader {
    registry: Arc<ModuleTypeRegistry>,
    loaded: HashMap<String, Box<dyn ModuleView>>,
}

impl ModuleLoader {
    pub fn new(registry: Arc<ModuleTypeRegistry>) -> Self {
        Self {
            registry,
            loaded: HashMap::new(),
        }
    }

    /// Returns the cached view for `info.id`, building it on first use.
    ///
    /// A cached view built from a different record (the catalog replaced it
    /// on a rescan) is dropped and rebuilt from `info`.
    pub fn load(&mut self, info: &ModuleInfo) -> Result<&dyn ModuleView, LoadError> {
        let stale = self
            .loaded
            .get(&info.id)
            .is_some_and(|view| view.info() != info);
        if stale {
            tracing::debug!(id = %info.id, "discarding superseded module view");
            self.loaded.remove(&info.id);
        }

        if !self.loaded.contains_key(&info.id) {
            let factory = self
                .registry
                .resolve(&info.module_type)
                .ok_or_else(|| LoadError::UnknownType(info.module_type.clone()))?;
            let mut view = factory(info.clone());
            if let Err(source) = view.initialize() {
                tracing::warn!(id = %info.id, error = %source, "module view failed to initialize");
                return Err(LoadError::Initialization {
                    id: info.id.clone(),
                    source,
                });
            }
            self.loaded.insert(info.id.clone(), view);
        }

        self.loaded
            .get(&info.id)
            .map(|view| view.as_ref())
            .ok_or_else(|| LoadError::UnknownType(info.module_type.clone()))
    }

    /// Runs the view's teardown hook and forgets it when the hook succeeds.
    pub fn unload(&mut self, id: &str) -> bool {
        let Some(view) = self.loaded.get_mut(id) else {
            return false;
        };
        if !view.on_unload() {
            tracing::warn!(%id, "module view refused to unload");
            return false;
        }
        self.loaded.remove(id);
        true
    }

    pub fn get(&self, id: &str) -> Option<&dyn ModuleView> {
        self.loaded.get(id).map(|view| view.as_ref())
    }

    /// Cached view for `id` when it is of kind `V`.
    pub fn get_as<V: ModuleView>(&self, id: &str) -> Option<&V> {
        self.loaded.get(id)?.as_any().downcast_ref::<V>()
    }

    pub fn is_loaded(&self, id: &str) -> bool {
        self.loaded.contains_key(id)
    }

    pub fn loaded_ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.loaded.keys().cloned().collect();
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    use std::any::Any;

    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};

    use super::*;
    use crate::views::{ScaleView, ThemeView};

    fn info(id: &str, module_type: &str, data: Value) -> ModuleInfo {
        ModuleInfo {
            id: id.into(),
            module_type: module_type.into(),
            name: id.into(),
            version: "1.0.0".into(),
            description: "test".into(),
            active: false,
            path: format!("bundled://{module_type}/{id}.json"),
            data,
        }
    }

    fn loader() -> ModuleLoader {
        ModuleLoader::new(Arc::new(ModuleTypeRegistry::new()))
    }

    #[test]
    fn load_caches_initialized_views() {
        let mut loader = loader();
        let major = info("major", "scale", json!({ "intervals": [0, 2, 4] }));
        loader.load(&major).unwrap();
        assert!(loader.is_loaded("major"));
        let scale = loader.get_as::<ScaleView>("major").unwrap();
        assert_eq!(scale.intervals(), &[0, 2, 4]);
        assert!(loader.get_as::<ThemeView>("major").is_none());
    }

    #[test]
    fn failed_initialization_is_not_cached() {
        let mut loader = loader();
        let broken = info("broken", "theme", json!({ "colors": {} }));
        let err = loader.load(&broken).unwrap_err();
        assert!(err.to_string().starts_with("initialization failed for broken"));
        assert!(!loader.is_loaded("broken"));
        assert!(loader.get("broken").is_none());
    }

    #[test]
    fn unknown_type_is_reported() {
        let mut loader = loader();
        let odd = info("odd", "audioComponent", Value::Null);
        assert!(matches!(loader.load(&odd), Err(LoadError::UnknownType(t)) if t == "audioComponent"));
    }

    #[test]
    fn superseded_record_rebuilds_view() {
        let mut loader = loader();
        loader
            .load(&info("minor", "scale", json!({ "intervals": [0, 2, 3] })))
            .unwrap();
        let updated = info("minor", "scale", json!({ "intervals": [0, 2, 3, 5] }));
        let view = loader.load(&updated).unwrap();
        assert_eq!(view.values(), json!({ "intervals": [0, 2, 3, 5] }));
    }

    #[derive(Debug)]
    struct Sticky {
        info: ModuleInfo,
    }

    impl ModuleView for Sticky {
        fn info(&self) -> &ModuleInfo {
            &self.info
        }

        fn initialize(&mut self) -> Result<(), ViewError> {
            Ok(())
        }

        fn values(&self) -> Value {
            Value::Null
        }

        fn on_unload(&mut self) -> bool {
            false
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[test]
    fn unload_honours_teardown_hook() {
        let mut registry = ModuleTypeRegistry::new();
        registry.register("sticky", |info| Box::new(Sticky { info }));
        let mut loader = ModuleLoader::new(Arc::new(registry));

        loader
            .load(&info("major", "scale", json!({ "intervals": [0] })))
            .unwrap();
        loader.load(&info("glue", "sticky", Value::Null)).unwrap();

        assert!(loader.unload("major"));
        assert!(!loader.is_loaded("major"));
        assert!(!loader.unload("major"));
        assert!(!loader.unload("glue"));
        assert_eq!(loader.loaded_ids(), vec!["glue".to_string()]);
    }
}
