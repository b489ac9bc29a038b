//! Configuration and the explicit context object handed to every caller.

use crate::core::error::ModsetError;
use crate::core::locks::ModuleLocks;
use crate::core::store::SpecStore;
use crate::modset::driver::{REGISTRY_TABLE_DEFAULT, SchemaSyncDriver, SyncReport};
use crate::modset::modeler::{CancelToken, SqliteModeler, StorageModeler};
use crate::modset::schema::{self, Schema};
use crate::modset::sync::SpecSynchronizer;
use crate::modset::validate;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

pub const CONFIG_FILE_DEFAULT: &str = "modset.toml";
const DATABASE_FILE_DEFAULT: &str = "modset.db";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Root directory; spec documents live under `<prefix>/modules/`.
    pub prefix: PathBuf,
    /// Live store path, `<prefix>/modset.db` when unset.
    pub database: Option<PathBuf>,
    pub registry_table: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            prefix: PathBuf::from("."),
            database: None,
            registry_table: REGISTRY_TABLE_DEFAULT.to_string(),
        }
    }
}

impl Config {
    pub fn with_prefix(prefix: impl Into<PathBuf>) -> Self {
        Self {
            prefix: prefix.into(),
            ..Self::default()
        }
    }

    /// Missing file is not an error: defaults apply.
    pub fn load(path: &Path) -> Result<Self, ModsetError> {
        if !path.exists() {
            debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| {
            ModsetError::InvalidArgument(format!("config {}: {}", path.display(), e))
        })
    }

    pub fn database_path(&self) -> PathBuf {
        match &self.database {
            Some(path) => path.clone(),
            None => self.prefix.join(DATABASE_FILE_DEFAULT),
        }
    }
}

/// Everything an operation needs, built once from a [`Config`].
pub struct Context {
    config: Config,
    synchronizer: SpecSynchronizer,
    driver: SchemaSyncDriver,
}

impl Context {
    pub fn open(config: Config) -> Result<Self, ModsetError> {
        let modeler = Arc::new(SqliteModeler::new(config.database_path()));
        Self::with_modeler(config, modeler)
    }

    /// Same as [`Context::open`] but against a caller-supplied live store.
    pub fn with_modeler(
        config: Config,
        modeler: Arc<dyn StorageModeler>,
    ) -> Result<Self, ModsetError> {
        if config.registry_table.trim().is_empty() {
            return Err(ModsetError::InvalidArgument(
                "registry_table is empty".to_string(),
            ));
        }
        fs::create_dir_all(&config.prefix)?;

        let synchronizer =
            SpecSynchronizer::new(SpecStore::new(&config.prefix), Arc::new(ModuleLocks::new()));
        let driver = SchemaSyncDriver::new(modeler, &config.registry_table);

        Ok(Self {
            config,
            synchronizer,
            driver,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn synchronizer(&self) -> &SpecSynchronizer {
        &self.synchronizer
    }

    pub fn derive_schema(&self, module: &str) -> Result<Schema, ModsetError> {
        let spec = self.synchronizer.fetch(module)?;
        Ok(schema::derive_schema(&spec))
    }

    /// Projects the current persisted spec of `module` onto the live store.
    /// Holds the module write lease so the registry row matches a single
    /// persisted version.
    pub fn synchronize_schema(
        &self,
        module: &str,
        cancel: &CancelToken,
    ) -> Result<SyncReport, ModsetError> {
        let module = validate::module_name(module)?;
        // Unknown modules fail before any lease file is created.
        self.synchronizer.fetch(&module)?;
        self.synchronizer.exclusive(&module, || {
            let spec = self.synchronizer.fetch(&module)?;
            self.driver.synchronize(&spec, cancel)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_config_uses_defaults() {
        let tmp = tempdir().unwrap();
        let cfg = Config::load(&tmp.path().join("absent.toml")).unwrap();
        assert_eq!(cfg, Config::default());
        assert_eq!(cfg.database_path(), PathBuf::from(".").join("modset.db"));
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join(CONFIG_FILE_DEFAULT);
        fs::write(&path, "prefix = \"/var/lib/modset\"\n").unwrap();

        let cfg = Config::load(&path).unwrap();
        assert_eq!(cfg.prefix, PathBuf::from("/var/lib/modset"));
        assert_eq!(cfg.registry_table, REGISTRY_TABLE_DEFAULT);
        assert_eq!(cfg.database_path(), PathBuf::from("/var/lib/modset/modset.db"));
    }

    #[test]
    fn test_malformed_config_is_invalid_argument() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join(CONFIG_FILE_DEFAULT);
        fs::write(&path, "prefix = [unterminated").unwrap();
        assert!(Config::load(&path).unwrap_err().is_invalid_argument());
    }
}
