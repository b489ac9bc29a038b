//! Spec document store.
//!
//! One pretty-printed JSON document per module at
//! `<prefix>/modules/<module>/spec.json`. Writes go to a sibling temp file
//! that is renamed over the document, so readers observe either the old or
//! the new document and never a torn write.

use crate::core::error::ModsetError;
use crate::core::time;
use crate::modset::types::{STATUS_ENABLED, Spec};
use crate::modset::validate;
use crate::modset::version::SPEC_BASE_VERSION;
use std::fs;
use std::path::PathBuf;

const SPEC_FILE_NAME: &str = "spec.json";
const LEASE_FILE_NAME: &str = ".lock";

/// File-backed store handle rooted at the configured prefix.
#[derive(Debug, Clone)]
pub struct SpecStore {
    root: PathBuf,
}

impl SpecStore {
    pub fn new(prefix: impl Into<PathBuf>) -> Self {
        Self {
            root: prefix.into(),
        }
    }

    /// Directory owned by `module`. The name is validated first so a module
    /// name can never address a path outside `<prefix>/modules`.
    pub fn module_dir(&self, module: &str) -> Result<PathBuf, ModsetError> {
        let name = validate::module_name(module)?;
        Ok(self.root.join("modules").join(name))
    }

    pub fn spec_path(&self, module: &str) -> Result<PathBuf, ModsetError> {
        Ok(self.module_dir(module)?.join(SPEC_FILE_NAME))
    }

    /// Lock file guarding writers of `module` across processes.
    pub fn lease_path(&self, module: &str) -> Result<PathBuf, ModsetError> {
        Ok(self.module_dir(module)?.join(LEASE_FILE_NAME))
    }

    pub fn exists(&self, module: &str) -> Result<bool, ModsetError> {
        Ok(self.spec_path(module)?.exists())
    }

    /// Latest persisted document for `module`.
    pub fn fetch(&self, module: &str) -> Result<Spec, ModsetError> {
        let path = self.spec_path(module)?;
        if !path.exists() {
            return Err(ModsetError::NotFound(format!(
                "spec '{}' not found at {}",
                module,
                path.display()
            )));
        }
        let raw = fs::read_to_string(&path)?;
        serde_json::from_str(&raw).map_err(|e| {
            ModsetError::Persistence(format!("invalid spec document {}: {}", path.display(), e))
        })
    }

    /// Persists a brand-new spec at the baseline version.
    pub fn create(&self, mut entry: Spec) -> Result<Spec, ModsetError> {
        if entry.meta.name.is_empty() {
            return Err(ModsetError::InvalidArgument("spec name is empty".to_string()));
        }
        if entry.title.is_empty() {
            return Err(ModsetError::InvalidArgument("spec title is empty".to_string()));
        }
        if entry.srv_name.is_empty() {
            return Err(ModsetError::InvalidArgument(
                "spec service name is empty".to_string(),
            ));
        }
        entry.meta.name = validate::module_name(&entry.meta.name)?;
        entry.srv_name = validate::srv_name(&entry.srv_name)?;

        if self.exists(&entry.meta.name)? {
            return Err(ModsetError::AlreadyExists(format!(
                "spec '{}' already exists",
                entry.meta.name
            )));
        }

        entry.status = STATUS_ENABLED;
        entry.meta.version = SPEC_BASE_VERSION.to_string();
        entry.meta.created = time::now_unix();
        entry.meta.updated = 0;

        fs::create_dir_all(self.module_dir(&entry.meta.name)?)?;
        self.save(&entry)?;
        Ok(entry)
    }

    /// Overwrites the module's document. Timestamps are not persisted.
    pub fn save(&self, entry: &Spec) -> Result<PathBuf, ModsetError> {
        let path = self.spec_path(&entry.meta.name)?;
        let dir = path.parent().ok_or_else(|| {
            ModsetError::Persistence(format!("invalid spec path {}", path.display()))
        })?;
        fs::create_dir_all(dir)?;

        let mut doc = entry.clone();
        doc.meta.created = 0;
        doc.meta.updated = 0;
        let bytes = serde_json::to_vec_pretty(&doc)?;

        let tmp = dir.join(format!(".{}.{}.tmp", SPEC_FILE_NAME, time::new_event_id()));
        fs::write(&tmp, bytes)?;
        if let Err(e) = fs::rename(&tmp, &path) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        Ok(path)
    }
}
