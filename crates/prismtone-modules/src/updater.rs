use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use thiserror::Error;

use crate::info::{Document, ModuleInfo};
use crate::validator::{is_file_safe_id, ModuleValidator, ValidationError};

#[derive(Debug, Error)]
pub enum UpdateError {
    #[error("replacement document is invalid: {0}")]
    Invalid(#[from] ValidationError),
    #[error("replacement changes {field} from `{expected}` to `{found}`")]
    IdentityChanged {
        field: &'static str,
        expected: String,
        found: String,
    },
    #[error("failed to write module: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to serialize module: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Writes newer versions of catalog modules into the override store.
///
/// The override store is never a repository directory. The next
/// [`crate::ModuleCatalog::scan_user_store`] over it replaces the catalog
/// record sharing the written `(type, id)`.
#[derive(Debug, Clone)]
pub struct ModuleUpdater {
    override_root: PathBuf,
    validator: ModuleValidator,
}

impl ModuleUpdater {
    pub fn new(override_root: impl Into<PathBuf>) -> Self {
        Self {
            override_root: override_root.into(),
            validator: ModuleValidator::new(),
        }
    }

    pub fn with_validator(mut self, validator: ModuleValidator) -> Self {
        self.validator = validator;
        self
    }

    pub fn override_root(&self) -> &Path {
        &self.override_root
    }

    /// Replaces `current` with `replacement`, which must keep its id and type.
    pub fn update_module(
        &self,
        current: &ModuleInfo,
        replacement: &Document,
    ) -> Result<PathBuf, UpdateError> {
        if !is_file_safe_id(&current.id) {
            return Err(ValidationError::UnsafeId(current.id.clone()).into());
        }
        let document = Value::Object(replacement.clone());
        self.validator.check(&document)?;
        for (field, expected) in [("id", &current.id), ("type", &current.module_type)] {
            let found = replacement
                .get(field)
                .and_then(Value::as_str)
                .unwrap_or_default();
            if found != expected {
                return Err(UpdateError::IdentityChanged {
                    field,
                    expected: expected.clone(),
                    found: found.to_owned(),
                });
            }
        }

        let dir = self.override_root.join(&current.module_type);
        fs::create_dir_all(&dir)?;
        let path = dir.join(format!("{}.json", current.id));
        fs::write(&path, serde_json::to_string_pretty(&document)?)?;
        tracing::info!(id = %current.id, module_type = %current.module_type, path = %path.display(), "updated module");
        Ok(path)
    }
}
