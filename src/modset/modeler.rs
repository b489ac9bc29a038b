//! Storage modeler boundary and its SQLite implementation.
//!
//! The modeler turns a [`Schema`] description into live tables: missing
//! tables are created, missing columns are added, indexes are created if
//! absent and rebuilt when their kind or columns differ. Existing columns
//! and rows are never dropped or rewritten. Row
//! primitives are limited to what schema synchronization needs: fetch,
//! insert and update keyed by table name and an equality filter.

use crate::core::db;
use crate::core::error::ModsetError;
use crate::modset::schema::{Column, ColumnType, IndexKind, Schema, Table};
use regex::Regex;
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, params_from_iter};
use serde_json::Value as JsonValue;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, LazyLock, Mutex};
use std::time::{Duration, Instant};
use tracing::debug;

pub type Row = serde_json::Map<String, JsonValue>;

static IDENT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[a-z_][0-9a-z_]{0,127}$").unwrap());

/// Caller-held cancellation handle with an optional deadline.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            cancelled: Arc::default(),
            deadline: Some(deadline),
        }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst) || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Fails with `SchemaReconciliation` once cancelled or past the deadline.
    pub fn check(&self, stage: &str) -> Result<(), ModsetError> {
        if self.is_cancelled() {
            return Err(ModsetError::SchemaReconciliation(format!(
                "cancelled during {}",
                stage
            )));
        }
        Ok(())
    }
}

/// Equality filter: every condition must match (`AND`).
#[derive(Debug, Clone, Default)]
pub struct Filter {
    conds: Vec<(String, JsonValue)>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn and(mut self, col: &str, value: impl Into<JsonValue>) -> Self {
        self.conds.push((col.to_string(), value.into()));
        self
    }

    pub fn conds(&self) -> &[(String, JsonValue)] {
        &self.conds
    }
}

/// Reconciles schema descriptions against a live store.
pub trait StorageModeler: Send + Sync {
    /// Applies additive changes so the store contains every table, column
    /// and index of `schema`. Either all changes land or none do.
    fn sync_schema(&self, schema: &Schema, cancel: &CancelToken) -> Result<(), ModsetError>;

    fn fetch_row(&self, table: &str, filter: &Filter) -> Result<Option<Row>, ModsetError>;

    fn insert_row(&self, table: &str, row: &Row) -> Result<(), ModsetError>;

    /// Returns the number of rows updated.
    fn update_rows(&self, table: &str, set: &Row, filter: &Filter) -> Result<usize, ModsetError>;
}

/// SQLite-backed modeler. Schema changes run in one transaction and are
/// serialized within the process.
pub struct SqliteModeler {
    db_path: PathBuf,
    write_lock: Mutex<()>,
}

impl SqliteModeler {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
            write_lock: Mutex::new(()),
        }
    }

    fn connect(&self) -> Result<Connection, ModsetError> {
        db::db_connect(&self.db_path)
    }

    fn reconcile(&self, schema: &Schema, cancel: &CancelToken) -> Result<(), ModsetError> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| ModsetError::SchemaReconciliation("modeler lock poisoned".to_string()))?;

        let mut conn = self.connect()?;
        let tx = conn.transaction()?;

        for table in &schema.tables {
            cancel.check(&format!("table {}", table.name))?;
            reconcile_table(&tx, table)?;
        }

        cancel.check("commit")?;
        tx.commit()?;
        Ok(())
    }
}

impl StorageModeler for SqliteModeler {
    fn sync_schema(&self, schema: &Schema, cancel: &CancelToken) -> Result<(), ModsetError> {
        self.reconcile(schema, cancel).map_err(|e| match e {
            ModsetError::SchemaReconciliation(_) => e,
            other => ModsetError::SchemaReconciliation(other.to_string()),
        })
    }

    fn fetch_row(&self, table: &str, filter: &Filter) -> Result<Option<Row>, ModsetError> {
        let (where_sql, params) = where_clause(filter, 1)?;
        let sql = format!("SELECT * FROM {}{} LIMIT 1", quote(table)?, where_sql);

        let conn = self.connect()?;
        let mut stmt = conn.prepare(&sql)?;
        let names: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();
        let mut rows = stmt.query(params_from_iter(params))?;

        let Some(row) = rows.next()? else {
            return Ok(None);
        };
        let mut out = Row::new();
        for (i, name) in names.iter().enumerate() {
            let value: SqlValue = row.get(i)?;
            out.insert(name.clone(), from_sql(value));
        }
        Ok(Some(out))
    }

    fn insert_row(&self, table: &str, row: &Row) -> Result<(), ModsetError> {
        if row.is_empty() {
            return Err(ModsetError::InvalidArgument(format!(
                "empty insert into {}",
                table
            )));
        }
        let cols = row.keys().map(|k| quote(k)).collect::<Result<Vec<_>, _>>()?;
        let marks: Vec<String> = (1..=row.len()).map(|i| format!("?{}", i)).collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote(table)?,
            cols.join(", "),
            marks.join(", ")
        );

        let conn = self.connect()?;
        conn.execute(&sql, params_from_iter(row.values().map(to_sql)))?;
        Ok(())
    }

    fn update_rows(&self, table: &str, set: &Row, filter: &Filter) -> Result<usize, ModsetError> {
        if set.is_empty() {
            return Ok(0);
        }
        let mut assigns = Vec::with_capacity(set.len());
        for (i, col) in set.keys().enumerate() {
            assigns.push(format!("{} = ?{}", quote(col)?, i + 1));
        }
        let (where_sql, where_params) = where_clause(filter, set.len() + 1)?;
        let sql = format!(
            "UPDATE {} SET {}{}",
            quote(table)?,
            assigns.join(", "),
            where_sql
        );

        let params: Vec<SqlValue> = set.values().map(to_sql).chain(where_params).collect();
        let conn = self.connect()?;
        Ok(conn.execute(&sql, params_from_iter(params))?)
    }
}

fn quote(ident: &str) -> Result<String, ModsetError> {
    if !IDENT.is_match(ident) {
        return Err(ModsetError::InvalidArgument(format!(
            "invalid identifier ({})",
            ident
        )));
    }
    Ok(format!("\"{}\"", ident))
}

fn where_clause(filter: &Filter, first: usize) -> Result<(String, Vec<SqlValue>), ModsetError> {
    if filter.conds().is_empty() {
        return Ok((String::new(), Vec::new()));
    }
    let mut parts = Vec::with_capacity(filter.conds().len());
    let mut params = Vec::with_capacity(filter.conds().len());
    for (i, (col, value)) in filter.conds().iter().enumerate() {
        parts.push(format!("{} = ?{}", quote(col)?, first + i));
        params.push(to_sql(value));
    }
    Ok((format!(" WHERE {}", parts.join(" AND ")), params))
}

fn to_sql(value: &JsonValue) -> SqlValue {
    match value {
        JsonValue::Null => SqlValue::Null,
        JsonValue::Bool(b) => SqlValue::Integer(i64::from(*b)),
        JsonValue::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or_default()),
        },
        JsonValue::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

fn from_sql(value: SqlValue) -> JsonValue {
    match value {
        SqlValue::Null => JsonValue::Null,
        SqlValue::Integer(i) => JsonValue::from(i),
        SqlValue::Real(f) => serde_json::Number::from_f64(f)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
        SqlValue::Text(s) => JsonValue::String(s),
        SqlValue::Blob(b) => JsonValue::String(String::from_utf8_lossy(&b).into_owned()),
    }
}

fn existing_columns(conn: &Connection, table: &str) -> Result<Vec<String>, ModsetError> {
    let mut stmt = conn.prepare("SELECT name FROM pragma_table_info(?1)")?;
    let cols = stmt
        .query_map([table], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(cols)
}

/// Live index shape: uniqueness and ordered columns.
struct LiveIndex {
    unique: bool,
    cols: Vec<String>,
}

fn existing_index(
    conn: &Connection,
    table: &str,
    index: &str,
) -> Result<Option<LiveIndex>, ModsetError> {
    let mut stmt =
        conn.prepare("SELECT \"unique\" FROM pragma_index_list(?1) WHERE name = ?2")?;
    let mut rows = stmt.query([table, index])?;
    let Some(row) = rows.next()? else {
        return Ok(None);
    };
    let unique: i64 = row.get(0)?;

    let mut stmt = conn.prepare("SELECT name FROM pragma_index_info(?1) ORDER BY seqno")?;
    let cols = stmt
        .query_map([index], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Some(LiveIndex {
        unique: unique != 0,
        cols,
    }))
}

fn column_sql(col: &Column) -> Result<String, ModsetError> {
    let name = quote(&col.name)?;
    let def = match col.col_type {
        ColumnType::String => {
            let default = col.default.as_deref().unwrap_or("").replace('\'', "''");
            format!("{} VARCHAR({}) NOT NULL DEFAULT '{}'", name, col.length.max(1), default)
        }
        ColumnType::Text => format!("{} TEXT NOT NULL DEFAULT ''", name),
        _ => {
            let default: i64 = col
                .default
                .as_deref()
                .unwrap_or("0")
                .parse()
                .map_err(|_| {
                    ModsetError::SchemaReconciliation(format!(
                        "invalid integer default for column {}",
                        col.name
                    ))
                })?;
            format!("{} INTEGER NOT NULL DEFAULT {}", name, default)
        }
    };
    Ok(def)
}

fn create_table_sql(table: &Table) -> Result<String, ModsetError> {
    let pk = table.primary_key();
    let auto_pk = pk.and_then(|idx| match idx.cols.as_slice() {
        [only] => table.column(only).filter(|c| c.increment),
        _ => None,
    });

    let mut defs = Vec::with_capacity(table.columns.len() + 1);
    for col in &table.columns {
        match auto_pk {
            Some(auto) if auto.name == col.name => {
                defs.push(format!("{} INTEGER PRIMARY KEY AUTOINCREMENT", quote(&col.name)?));
            }
            _ => defs.push(column_sql(col)?),
        }
    }
    if let (Some(pk), None) = (pk, auto_pk) {
        let cols = pk.cols.iter().map(|c| quote(c)).collect::<Result<Vec<_>, _>>()?;
        defs.push(format!("PRIMARY KEY ({})", cols.join(", ")));
    }

    Ok(format!(
        "CREATE TABLE {} ({})",
        quote(&table.name)?,
        defs.join(", ")
    ))
}

fn reconcile_table(conn: &Connection, table: &Table) -> Result<(), ModsetError> {
    let existing = existing_columns(conn, &table.name)?;

    let mut added = 0usize;
    if existing.is_empty() {
        conn.execute(&create_table_sql(table)?, [])?;
        added = table.columns.len();
    } else {
        for col in table.columns.iter().filter(|c| !existing.contains(&c.name)) {
            let sql = format!("ALTER TABLE {} ADD COLUMN {}", quote(&table.name)?, column_sql(col)?);
            conn.execute(&sql, [])?;
            added += 1;
        }
    }

    let mut rebuilt = 0usize;
    for idx in table.indexes.iter().filter(|i| i.kind != IndexKind::Primary) {
        let name = format!("{}__{}", table.name, idx.name);
        let unique = idx.kind == IndexKind::Unique;

        match existing_index(conn, &table.name, &name)? {
            Some(live) if live.unique == unique && live.cols == idx.cols => continue,
            Some(_) => {
                conn.execute(&format!("DROP INDEX {}", quote(&name)?), [])?;
                rebuilt += 1;
            }
            None => {}
        }

        let cols = idx.cols.iter().map(|c| quote(c)).collect::<Result<Vec<_>, _>>()?;
        let sql = format!(
            "CREATE {}INDEX {} ON {} ({})",
            if unique { "UNIQUE " } else { "" },
            quote(&name)?,
            quote(&table.name)?,
            cols.join(", ")
        );
        conn.execute(&sql, [])?;
    }

    debug!(table = %table.name, columns_added = added, indexes_rebuilt = rebuilt, "table reconciled");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modset::schema::Index;
    use tempfile::tempdir;

    fn sample_table(name: &str) -> Table {
        let mut tbl = Table::new(name);
        tbl.add_column(Column {
            increment: true,
            ..Column::new("id", ColumnType::Uint32)
        });
        tbl.add_column(Column::string("title", 100));
        tbl.add_column(Column::new("weight", ColumnType::Int16));
        tbl.add_index(Index::single("id", IndexKind::Primary));
        tbl.add_index(Index::single("weight", IndexKind::Index));
        tbl
    }

    #[test]
    fn test_cancel_token_deadline() {
        let token = CancelToken::with_deadline(Instant::now());
        assert!(token.is_cancelled());
        assert!(CancelToken::new().check("x").is_ok());

        let token = CancelToken::new();
        let shared = token.clone();
        shared.cancel();
        assert!(token.check("commit").is_err());
    }

    #[test]
    fn test_create_then_add_column_is_additive() {
        let tmp = tempdir().unwrap();
        let modeler = SqliteModeler::new(tmp.path().join("live.db"));

        let mut tbl = sample_table("terms");
        let schema = Schema {
            tables: vec![tbl.clone()],
        };
        modeler.sync_schema(&schema, &CancelToken::new()).unwrap();

        let mut row = Row::new();
        row.insert("title".to_string(), "Default".into());
        modeler.insert_row("terms", &row).unwrap();

        tbl.add_column(Column::new("pid", ColumnType::Uint32));
        let schema = Schema { tables: vec![tbl] };
        modeler.sync_schema(&schema, &CancelToken::new()).unwrap();
        modeler.sync_schema(&schema, &CancelToken::new()).unwrap();

        let fetched = modeler
            .fetch_row("terms", &Filter::new().and("title", "Default"))
            .unwrap()
            .unwrap();
        assert_eq!(fetched["pid"], 0);
        assert_eq!(fetched["id"], 1);
    }

    #[test]
    fn test_cancelled_sync_leaves_store_untouched() {
        let tmp = tempdir().unwrap();
        let modeler = SqliteModeler::new(tmp.path().join("live.db"));
        let schema = Schema {
            tables: vec![sample_table("terms")],
        };

        let token = CancelToken::new();
        token.cancel();
        let err = modeler.sync_schema(&schema, &token).unwrap_err();
        assert_eq!(err.kind(), "schema_reconciliation");
        assert!(modeler.fetch_row("terms", &Filter::new()).is_err());
    }

    #[test]
    fn test_update_rows_by_filter() {
        let tmp = tempdir().unwrap();
        let modeler = SqliteModeler::new(tmp.path().join("live.db"));
        let schema = Schema {
            tables: vec![sample_table("terms")],
        };
        modeler.sync_schema(&schema, &CancelToken::new()).unwrap();

        let mut row = Row::new();
        row.insert("title".to_string(), "a".into());
        modeler.insert_row("terms", &row).unwrap();

        let mut set = Row::new();
        set.insert("weight".to_string(), 5.into());
        let n = modeler
            .update_rows("terms", &set, &Filter::new().and("title", "a"))
            .unwrap();
        assert_eq!(n, 1);
        let n = modeler
            .update_rows("terms", &set, &Filter::new().and("title", "zzz"))
            .unwrap();
        assert_eq!(n, 0);
    }

    #[test]
    fn test_index_kind_change_is_applied() {
        let tmp = tempdir().unwrap();
        let modeler = SqliteModeler::new(tmp.path().join("live.db"));
        let mut tbl = sample_table("terms");
        modeler
            .sync_schema(&Schema { tables: vec![tbl.clone()] }, &CancelToken::new())
            .unwrap();

        tbl.add_index(Index::single("weight", IndexKind::Unique));
        modeler
            .sync_schema(&Schema { tables: vec![tbl] }, &CancelToken::new())
            .unwrap();

        let mut row = Row::new();
        row.insert("weight".to_string(), 3.into());
        modeler.insert_row("terms", &row).unwrap();
        assert!(modeler.insert_row("terms", &row).is_err());
    }

    #[test]
    fn test_unique_index_conflict_rolls_back_whole_sync() {
        let tmp = tempdir().unwrap();
        let modeler = SqliteModeler::new(tmp.path().join("live.db"));
        let mut tbl = sample_table("terms");
        modeler
            .sync_schema(&Schema { tables: vec![tbl.clone()] }, &CancelToken::new())
            .unwrap();

        let mut row = Row::new();
        row.insert("weight".to_string(), 3.into());
        modeler.insert_row("terms", &row).unwrap();
        modeler.insert_row("terms", &row).unwrap();

        tbl.add_column(Column::new("pid", ColumnType::Uint32));
        tbl.add_index(Index::single("weight", IndexKind::Unique));
        let err = modeler
            .sync_schema(&Schema { tables: vec![tbl] }, &CancelToken::new())
            .unwrap_err();
        assert_eq!(err.kind(), "schema_reconciliation");

        // Old non-unique index and columns survive the failed attempt.
        let conn = modeler.connect().unwrap();
        let live = existing_index(&conn, "terms", "terms__weight").unwrap().unwrap();
        assert!(!live.unique);
        assert!(!existing_columns(&conn, "terms").unwrap().contains(&"pid".to_string()));
    }

    #[test]
    fn test_rejects_unsafe_identifiers() {
        assert!(quote("hpn_abc_post").is_ok());
        assert!(quote("x\"; DROP TABLE y").is_err());
    }
}
