use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::info::{ModuleInfo, ModuleKind};
use crate::views::{
    ChordProgressionView, EffectView, FxChainView, LanguageView, ModuleView, ScaleView,
    SoundPresetView, ThemeView, TouchEffectView, VisualizerView,
};

/// Constructor producing an uninitialized view for a module record.
pub type ViewFactory = Arc<dyn Fn(ModuleInfo) -> Box<dyn ModuleView> + Send + Sync>;

/// Maps type tags to view constructors.
///
/// Built-in kinds are registered on construction. Registering a tag again
/// replaces the earlier constructor.
#[derive(Clone)]
pub struct ModuleTypeRegistry {
    factories: HashMap<String, ViewFactory>,
}

impl fmt::Debug for ModuleTypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleTypeRegistry")
            .field("types", &self.type_names())
            .finish()
    }
}

impl Default for ModuleTypeRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        for kind in ModuleKind::ALL {
            registry.register_kind(kind);
        }
        registry
    }
}

impl ModuleTypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with no handlers at all.
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    pub fn register<F>(&mut self, module_type: impl Into<String>, factory: F)
    where
        F: Fn(ModuleInfo) -> Box<dyn ModuleView> + Send + Sync + 'static,
    {
        let module_type = module_type.into();
        if self.factories.contains_key(&module_type) {
            tracing::debug!(%module_type, "replacing registered module handler");
        }
        self.factories.insert(module_type, Arc::new(factory));
    }

    pub fn resolve(&self, module_type: &str) -> Option<ViewFactory> {
        self.factories.get(module_type).cloned()
    }

    pub fn contains(&self, module_type: &str) -> bool {
        self.factories.contains_key(module_type)
    }

    /// Registered type tags in sorted order.
    pub fn type_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }

    fn register_kind(&mut self, kind: ModuleKind) {
        match kind {
            ModuleKind::SoundPreset => {
                self.register(kind.as_str(), |info| Box::new(SoundPresetView::new(info)))
            }
            ModuleKind::FxChain => {
                self.register(kind.as_str(), |info| Box::new(FxChainView::new(info)))
            }
            ModuleKind::Theme => self.register(kind.as_str(), |info| Box::new(ThemeView::new(info))),
            ModuleKind::Language => {
                self.register(kind.as_str(), |info| Box::new(LanguageView::new(info)))
            }
            ModuleKind::Visualizer => {
                self.register(kind.as_str(), |info| Box::new(VisualizerView::new(info)))
            }
            ModuleKind::Effect => {
                self.register(kind.as_str(), |info| Box::new(EffectView::new(info)))
            }
            ModuleKind::Scale => self.register(kind.as_str(), |info| Box::new(ScaleView::new(info))),
            ModuleKind::TouchEffect => {
                self.register(kind.as_str(), |info| Box::new(TouchEffectView::new(info)))
            }
            ModuleKind::ChordProgression => self.register(kind.as_str(), |info| {
                Box::new(ChordProgressionView::new(info))
            }),
        }
    }
}
