//! Storage schema descriptions and their derivation from a spec.
//!
//! `derive_schema` is a pure function of the spec: one table per node model
//! and one per tag/taxonomy term model, in spec order, with no timestamps or
//! other ambient input, so deriving twice yields identical output.

use crate::modset::types::{Field, FieldType, IndexType, NodeModel, Spec, TermModel, TermType};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub const NODE_TABLE_PREFIX: &str = "hpn";
pub const TERM_TABLE_PREFIX: &str = "hpt";

/// Hex characters of the module digest embedded in table names.
const TABLE_HASH_LEN: usize = 12;

const TITLE_FIELD: &str = "title";
const TITLE_FIELD_LENGTH: u32 = 100;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ColumnType {
    #[serde(rename = "string")]
    String,
    #[serde(rename = "string-text")]
    Text,
    #[serde(rename = "int8")]
    Int8,
    #[serde(rename = "int16")]
    Int16,
    #[serde(rename = "int32")]
    Int32,
    #[serde(rename = "int64")]
    Int64,
    #[serde(rename = "uint8")]
    Uint8,
    #[serde(rename = "uint16")]
    Uint16,
    #[serde(rename = "uint32")]
    Uint32,
    #[serde(rename = "uint64")]
    Uint64,
}

impl ColumnType {
    fn from_integer_field(field_type: FieldType) -> Option<Self> {
        Some(match field_type {
            FieldType::Int8 => ColumnType::Int8,
            FieldType::Int16 => ColumnType::Int16,
            FieldType::Int32 => ColumnType::Int32,
            FieldType::Int64 => ColumnType::Int64,
            FieldType::Uint8 => ColumnType::Uint8,
            FieldType::Uint16 => ColumnType::Uint16,
            FieldType::Uint32 => ColumnType::Uint32,
            FieldType::Uint64 => ColumnType::Uint64,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum IndexKind {
    Index,
    Unique,
    Primary,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    #[serde(rename = "type")]
    pub col_type: ColumnType,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub length: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub increment: bool,
}

fn is_zero(v: &u32) -> bool {
    *v == 0
}

impl Column {
    pub fn new(name: &str, col_type: ColumnType) -> Self {
        Self {
            name: name.to_string(),
            col_type,
            length: 0,
            default: None,
            increment: false,
        }
    }

    pub fn string(name: &str, length: u32) -> Self {
        Self {
            length,
            ..Self::new(name, ColumnType::String)
        }
    }

    pub fn with_default(mut self, value: &str) -> Self {
        self.default = Some(value.to_string());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Index {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: IndexKind,
    pub cols: Vec<String>,
}

impl Index {
    pub fn single(name: &str, kind: IndexKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            cols: vec![name.to_string()],
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Table {
    pub name: String,
    #[serde(default)]
    pub columns: Vec<Column>,
    #[serde(default)]
    pub indexes: Vec<Index>,
}

impl Table {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Table::default()
        }
    }

    /// Adds a column, replacing any column of the same name in place.
    pub fn add_column(&mut self, column: Column) {
        match self.columns.iter_mut().find(|c| c.name == column.name) {
            Some(existing) => *existing = column,
            None => self.columns.push(column),
        }
    }

    /// Adds an index, replacing any index of the same name in place.
    pub fn add_index(&mut self, index: Index) {
        match self.indexes.iter_mut().find(|i| i.name == index.name) {
            Some(existing) => *existing = index,
            None => self.indexes.push(index),
        }
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn index(&self, name: &str) -> Option<&Index> {
        self.indexes.iter().find(|i| i.name == name)
    }

    pub fn primary_key(&self) -> Option<&Index> {
        self.indexes.iter().find(|i| i.kind == IndexKind::Primary)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Schema {
    #[serde(default)]
    pub tables: Vec<Table>,
}

impl Schema {
    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name == name)
    }
}

/// `<prefix>_<first 12 hex of sha256(module)>_<model>`
fn table_name(prefix: &str, module: &str, model: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(module.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    format!("{}_{}_{}", prefix, &digest[..TABLE_HASH_LEN], model)
}

pub fn node_table_name(module: &str, model: &str) -> String {
    table_name(NODE_TABLE_PREFIX, module, model)
}

pub fn term_table_name(module: &str, model: &str) -> String {
    table_name(TERM_TABLE_PREFIX, module, model)
}

fn node_table_template(name: &str) -> Table {
    let mut tbl = Table::new(name);
    tbl.add_column(Column::string("id", 16));
    tbl.add_column(Column::string("pid", 16));
    tbl.add_column(Column::new("status", ColumnType::Int16).with_default("0"));
    tbl.add_column(Column::string("userid", 30));
    tbl.add_column(Column::string("title", 100));
    tbl.add_column(Column::new("created", ColumnType::Uint32));
    tbl.add_column(Column::new("updated", ColumnType::Uint32));

    tbl.add_index(Index::single("id", IndexKind::Primary));
    for col in ["pid", "status", "userid", "created", "updated"] {
        tbl.add_index(Index::single(col, IndexKind::Index));
    }
    tbl
}

fn term_table_template(name: &str) -> Table {
    let mut tbl = Table::new(name);
    tbl.add_column(Column {
        increment: true,
        ..Column::new("id", ColumnType::Uint32)
    });
    tbl.add_column(Column::new("status", ColumnType::Int16).with_default("0"));
    tbl.add_column(Column::string("userid", 30));
    tbl.add_column(Column::string("title", 100));
    tbl.add_column(Column::new("created", ColumnType::Uint32));
    tbl.add_column(Column::new("updated", ColumnType::Uint32));

    tbl.add_index(Index::single("id", IndexKind::Primary));
    tbl.add_index(Index::single("status", IndexKind::Index));
    tbl
}

/// A `langs` attribute with more than one short language tag.
fn has_langs(field: &Field) -> bool {
    field.attrs.get("langs").is_some_and(|v| v.len() > 3)
}

pub fn node_model_table(module: &str, model: &NodeModel) -> Table {
    let mut tbl = node_table_template(&node_table_name(module, &model.name));
    let ext = &model.extensions;

    if ext.access_counter {
        tbl.add_column(Column::new("ext_access_counter", ColumnType::Uint32));
    }

    if ext.comment_perentry {
        tbl.add_column(Column::new("ext_comment_perentry", ColumnType::Uint8).with_default("1"));
    }

    if ext.permalink_enabled() {
        tbl.add_column(Column::string("ext_permalink_name", 100));
        tbl.add_column(Column::string("ext_permalink_idx", 12));
        tbl.add_index(Index::single("ext_permalink_idx", IndexKind::Index));
    }

    if !ext.node_refer.is_empty() {
        tbl.add_column(Column::string("ext_node_refer", 16));
        tbl.add_index(Index::single("ext_node_refer", IndexKind::Index));
    }

    for field in &model.fields {
        let col = format!("field_{}", field.name);

        match field.field_type {
            FieldType::String => {
                let length = if field.name == TITLE_FIELD {
                    TITLE_FIELD_LENGTH
                } else {
                    field.length
                };
                tbl.add_column(Column::string(&col, length));

                if has_langs(field) {
                    tbl.add_column(Column::new(&format!("{}_langs", col), ColumnType::Text));
                }

                match field.index_type {
                    IndexType::Unique => tbl.add_index(Index::single(&col, IndexKind::Unique)),
                    IndexType::Index => tbl.add_index(Index::single(&col, IndexKind::Index)),
                    IndexType::None => {}
                }
            }
            FieldType::Text => {
                tbl.add_column(Column::new(&col, ColumnType::Text));
                tbl.add_column(Column::string(&format!("{}_attrs", col), 200));

                if has_langs(field) {
                    tbl.add_column(Column::new(&format!("{}_langs", col), ColumnType::Text));
                }
            }
            other => {
                if let Some(col_type) = ColumnType::from_integer_field(other) {
                    tbl.add_column(Column::new(&col, col_type));
                }
            }
        }
    }

    for term in &model.terms {
        let col = format!("term_{}", term.name);
        match term.term_type {
            TermType::Tag => {
                let idx = format!("{}_idx", col);
                tbl.add_column(Column::string(&col, 200));
                tbl.add_column(Column::string(&idx, 100));
                tbl.add_index(Index::single(&idx, IndexKind::Index));
            }
            TermType::Taxonomy => {
                tbl.add_column(Column::new(&col, ColumnType::Uint32));
                tbl.add_index(Index::single(&col, IndexKind::Index));
            }
            TermType::Unknown => {}
        }
    }

    tbl
}

/// `None` for term types that have no backing table.
pub fn term_model_table(module: &str, model: &TermModel) -> Option<Table> {
    let mut tbl = term_table_template(&term_table_name(module, &model.name));

    match model.term_type {
        TermType::Tag => {
            tbl.add_column(Column::string("uid", 16));
            tbl.add_index(Index::single("uid", IndexKind::Unique));
        }
        TermType::Taxonomy => {
            tbl.add_column(Column::new("pid", ColumnType::Uint32));
            tbl.add_index(Index::single("pid", IndexKind::Index));
            tbl.add_column(Column::new("weight", ColumnType::Int16));
            tbl.add_index(Index::single("weight", IndexKind::Index));
        }
        TermType::Unknown => return None,
    }

    Some(tbl)
}

/// Target storage schema of every node and term model in `spec`.
pub fn derive_schema(spec: &Spec) -> Schema {
    let module = spec.name();
    let mut schema = Schema::default();

    for model in &spec.node_models {
        schema.tables.push(node_model_table(module, model));
    }
    for model in &spec.term_models {
        if let Some(tbl) = term_model_table(module, model) {
            schema.tables.push(tbl);
        }
    }

    schema
}
