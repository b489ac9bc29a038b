//! Schema sync driver: projects a spec onto the live store.
//!
//! The live schema is reconciled first. The registry row and the taxonomy
//! default rows are only written once reconciliation has committed, so a
//! failed or cancelled reconciliation leaves both the schema and the
//! registry exactly as they were.

use crate::core::error::ModsetError;
use crate::core::time;
use crate::modset::modeler::{CancelToken, Filter, Row, StorageModeler};
use crate::modset::schema::{self, Column, ColumnType, Index, IndexKind, Table};
use crate::modset::types::{STATUS_ENABLED, Spec, TermType};
use crate::modset::validate;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const REGISTRY_TABLE_DEFAULT: &str = "modset_modules";

const TAXONOMY_DEFAULT_TITLE: &str = "Default";

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RegistryWrite {
    Inserted,
    Updated,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub module: String,
    pub version: String,
    pub srv_name: String,
    pub tables: Vec<String>,
    pub registry: RegistryWrite,
    /// Taxonomy tables that received their default root row.
    pub seeded: Vec<String>,
}

pub struct SchemaSyncDriver {
    modeler: Arc<dyn StorageModeler>,
    registry_table: String,
}

impl SchemaSyncDriver {
    pub fn new(modeler: Arc<dyn StorageModeler>, registry_table: &str) -> Self {
        Self {
            modeler,
            registry_table: registry_table.to_string(),
        }
    }

    /// Description of the row-per-module bookkeeping table.
    pub fn registry_table(&self) -> Table {
        let mut tbl = Table::new(&self.registry_table);
        tbl.add_column(Column::string("name", 30));
        tbl.add_column(Column::string("srvname", 30));
        tbl.add_column(Column::new("status", ColumnType::Int16));
        tbl.add_column(Column::string("title", 100));
        tbl.add_column(Column::string("version", 20));
        tbl.add_column(Column::new("created", ColumnType::Uint32));
        tbl.add_column(Column::new("updated", ColumnType::Uint32));
        tbl.add_column(Column::new("body", ColumnType::Text));
        tbl.add_index(Index::single("name", IndexKind::Primary));
        tbl
    }

    pub fn synchronize(&self, spec: &Spec, cancel: &CancelToken) -> Result<SyncReport, ModsetError> {
        let mut spec = spec.clone();
        if spec.srv_name.is_empty() || spec.srv_name.contains('/') {
            spec.srv_name = validate::srv_name(&spec.meta.name)?;
        }
        let body = serde_json::to_string_pretty(&spec)?;

        let mut target = schema::derive_schema(&spec);
        target.tables.insert(0, self.registry_table());

        cancel.check("schema derivation")?;
        self.modeler.sync_schema(&target, cancel)?;

        let now = time::now_unix();
        let registry = self.upsert_registry(&spec, body, now)?;
        let seeded = self.seed_taxonomies(&spec, now)?;

        info!(
            module = %spec.meta.name,
            version = %spec.meta.version,
            tables = target.tables.len(),
            seeded = seeded.len(),
            "schema synchronized"
        );

        Ok(SyncReport {
            module: spec.meta.name.clone(),
            version: spec.meta.version.clone(),
            srv_name: spec.srv_name.clone(),
            tables: target.tables.into_iter().map(|t| t.name).collect(),
            registry,
            seeded,
        })
    }

    fn upsert_registry(
        &self,
        spec: &Spec,
        body: String,
        now: u64,
    ) -> Result<RegistryWrite, ModsetError> {
        let mut set = Row::new();
        set.insert("srvname".to_string(), spec.srv_name.clone().into());
        set.insert("status".to_string(), spec.status.into());
        set.insert("title".to_string(), spec.title.clone().into());
        set.insert("version".to_string(), spec.meta.version.clone().into());
        set.insert("updated".to_string(), now.into());
        set.insert("body".to_string(), body.into());

        let key = Filter::new().and("name", spec.meta.name.clone());
        if self.modeler.fetch_row(&self.registry_table, &key)?.is_some() {
            self.modeler.update_rows(&self.registry_table, &set, &key)?;
            return Ok(RegistryWrite::Updated);
        }

        set.insert("name".to_string(), spec.meta.name.clone().into());
        set.insert("created".to_string(), now.into());
        self.modeler.insert_row(&self.registry_table, &set)?;
        Ok(RegistryWrite::Inserted)
    }

    /// Every taxonomy gets one root category when its table is empty.
    fn seed_taxonomies(&self, spec: &Spec, now: u64) -> Result<Vec<String>, ModsetError> {
        let mut seeded = Vec::new();

        for model in spec
            .term_models
            .iter()
            .filter(|m| m.term_type == TermType::Taxonomy)
        {
            let table = schema::term_table_name(&spec.meta.name, &model.name);
            if self.modeler.fetch_row(&table, &Filter::new())?.is_some() {
                continue;
            }

            let mut row = Row::new();
            row.insert("pid".to_string(), 0.into());
            row.insert("title".to_string(), TAXONOMY_DEFAULT_TITLE.into());
            row.insert("status".to_string(), STATUS_ENABLED.into());
            row.insert("weight".to_string(), 0.into());
            row.insert("created".to_string(), now.into());
            row.insert("userid".to_string(), "".into());
            self.modeler.insert_row(&table, &row).inspect_err(|e| {
                warn!(module = %spec.meta.name, term = %model.name, error = %e, "taxonomy seeding failed");
            })?;

            debug!(module = %spec.meta.name, term = %model.name, "taxonomy default row seeded");
            seeded.push(table);
        }

        Ok(seeded)
    }
}
