// used for persistence
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{json, Value};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::error::{KeyfolderError, Result};
use crate::folder::FOLDER_TAG;

lazy_static! {
    static ref DATASET: Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap();
}

// ------------- Schema file -------------
/// The durable JSON projection of a schema. Always rewritten whole.
#[derive(Debug, Clone)]
pub struct SchemaFile {
    path: PathBuf,
}

// Removes a half-written temporary file unless the write went through.
struct TempGuard {
    path: PathBuf,
    armed: bool,
}
impl Drop for TempGuard {
    fn drop(&mut self) {
        if self.armed {
            if let Err(e) = std::fs::remove_file(&self.path) {
                warn!(path = %self.path.display(), error = %e, "could not remove temporary schema file");
            }
        }
    }
}

impl SchemaFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
    pub fn path(&self) -> &Path {
        &self.path
    }
    fn temp_path(&self) -> Result<PathBuf> {
        let mut name = self
            .path
            .file_name()
            .ok_or_else(|| {
                std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("'{}' does not name a file", self.path.display()),
                )
            })?
            .to_os_string();
        name.push(".tmp");
        Ok(self.path.with_file_name(name))
    }
    /// Reads the definition, creating an empty root folder file when there is none yet.
    pub async fn load(&self) -> Result<Value> {
        match fs::read(&self.path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let empty = json!({ "type": FOLDER_TAG });
                self.write(&empty).await?;
                Ok(empty)
            }
            Err(e) => Err(e.into()),
        }
    }
    /// Writes to a sibling temporary file, syncs it and renames it over the
    /// schema file, so readers only ever see a complete document.
    pub async fn write(&self, definition: &Value) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(definition)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        let temp = self.temp_path()?;
        let mut guard = TempGuard { path: temp.clone(), armed: true };
        let mut file = fs::File::create(&temp).await?;
        file.write_all(&bytes).await?;
        file.sync_all().await?;
        drop(file);
        fs::rename(&temp, &self.path).await?;
        guard.armed = false;
        debug!(path = %self.path.display(), bytes = bytes.len(), "schema file written");
        Ok(())
    }
}

// ------------- Storage providers -------------
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteOptions {
    /// Address values as table columns named by path instead of inside a JSON document.
    pub relational: bool,
}

/// Applies a single-value change to every stored record of a dataset.
#[async_trait]
pub trait StorageProvider: Send + Sync {
    async fn update_value(&self, dataset: &str, path: &str, value: &Value, options: WriteOptions) -> Result<()>;
    async fn remove_value(&self, dataset: &str, path: &str, options: WriteOptions) -> Result<()>;
    /// Makes sure a relational column exists before values are written to it.
    /// Providers without a relational layout have nothing to do.
    async fn ensure_column(&self, _dataset: &str, _column: &(String, String)) -> Result<()> {
        Ok(())
    }
}

fn identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn table(dataset: &str) -> Result<String> {
    if !DATASET.is_match(dataset) {
        return Err(KeyfolderError::Persistence(format!("'{}' is not a valid dataset name", dataset)));
    }
    Ok(identifier(dataset))
}

fn json_path(path: &str) -> String {
    let mut json_path = String::from("$");
    for segment in path.split('.') {
        json_path.push_str(&format!(".\"{}\"", segment));
    }
    json_path
}

pub fn to_sql_value(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(flag) => SqlValue::Integer(i64::from(*flag)),
        Value::Number(n) => match n.as_i64() {
            Some(integer) => SqlValue::Integer(integer),
            None => n.as_f64().map_or(SqlValue::Null, SqlValue::Real),
        },
        Value::String(text) => SqlValue::Text(text.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

pub fn from_sql_value(value: ValueRef) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(integer) => Value::from(integer),
        ValueRef::Real(real) => json!(real),
        ValueRef::Text(text) => Value::String(String::from_utf8_lossy(text).into_owned()),
        ValueRef::Blob(blob) => Value::String(String::from_utf8_lossy(blob).into_owned()),
    }
}

/// SQLite backed records: one table per dataset, each row a record holding a
/// JSON `Document` plus any relational columns projected from the schema.
pub struct SqliteProvider {
    db: Mutex<Connection>,
}

impl SqliteProvider {
    pub fn new(connection: Connection) -> Self {
        Self { db: Mutex::new(connection) }
    }
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::new(Connection::open_in_memory()?))
    }
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(Connection::open(path)?))
    }
    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.db.lock().map_err(|e| KeyfolderError::Lock(e.to_string()))
    }
    fn ensure(db: &Connection, dataset: &str) -> Result<String> {
        let table = table(dataset)?;
        db.execute_batch(&format!(
            "
            create table if not exists {} (
                Record_Identity text not null,
                Document text not null default '{{}}',
                constraint referenceable_Record_Identity primary key (
                    Record_Identity
                )
            );
            ",
            table
        ))?;
        Ok(table)
    }
    fn columns(db: &Connection, table: &str) -> Result<Vec<String>> {
        let mut statement = db.prepare(&format!("pragma table_info({})", table))?;
        let names = statement
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(names)
    }
    pub fn ensure_dataset(&self, dataset: &str) -> Result<()> {
        let db = self.lock()?;
        Self::ensure(&db, dataset)?;
        Ok(())
    }
    /// Creates the dataset table and adds every missing column. Returns how many were added.
    pub fn sync_columns(&self, dataset: &str, columns: &[(String, String)]) -> Result<usize> {
        let db = self.lock()?;
        let table = Self::ensure(&db, dataset)?;
        let existing = Self::columns(&db, &table)?;
        let mut added = 0;
        for (name, definition) in columns {
            if existing.iter().any(|column| column == name) {
                continue;
            }
            db.execute_batch(&format!(
                "alter table {} add column {} {};",
                table,
                identifier(name),
                definition
            ))?;
            added += 1;
        }
        debug!(dataset, added, "relational columns synchronized");
        Ok(added)
    }
    pub fn column_names(&self, dataset: &str) -> Result<Vec<String>> {
        let db = self.lock()?;
        let table = Self::ensure(&db, dataset)?;
        Self::columns(&db, &table)
    }
    pub fn insert_record(&self, dataset: &str, id: &str, document: &Value) -> Result<()> {
        let db = self.lock()?;
        let table = Self::ensure(&db, dataset)?;
        db.prepare_cached(&format!(
            "insert into {} (Record_Identity, Document) values (?, ?)",
            table
        ))?
        .execute(params![id, document.to_string()])?;
        Ok(())
    }
    pub fn document(&self, dataset: &str, id: &str) -> Result<Option<Value>> {
        let db = self.lock()?;
        let table = Self::ensure(&db, dataset)?;
        let text: Option<String> = db
            .prepare_cached(&format!("select Document from {} where Record_Identity = ?", table))?
            .query_row(params![id], |row| row.get(0))
            .optional()?;
        match text {
            Some(text) => Ok(Some(serde_json::from_str(&text)?)),
            None => Ok(None),
        }
    }
    pub fn column(&self, dataset: &str, id: &str, column: &str) -> Result<Option<Value>> {
        let db = self.lock()?;
        let table = Self::ensure(&db, dataset)?;
        let value = db
            .prepare(&format!(
                "select {} from {} where Record_Identity = ?",
                identifier(column),
                table
            ))?
            .query_row(params![id], |row| Ok(from_sql_value(row.get_ref(0)?)))
            .optional()?;
        Ok(value)
    }
}

#[async_trait]
impl StorageProvider for SqliteProvider {
    async fn update_value(&self, dataset: &str, path: &str, value: &Value, options: WriteOptions) -> Result<()> {
        let db = self.lock()?;
        let table = Self::ensure(&db, dataset)?;
        let changed = if options.relational {
            db.execute(
                &format!("update {} set {} = ?", table, identifier(path)),
                params![to_sql_value(value)],
            )?
        } else {
            db.execute(
                &format!("update {} set Document = json_set(Document, ?, json(?))", table),
                params![json_path(path), value.to_string()],
            )?
        };
        debug!(dataset, path, changed, relational = options.relational, "value updated");
        Ok(())
    }
    async fn remove_value(&self, dataset: &str, path: &str, options: WriteOptions) -> Result<()> {
        let db = self.lock()?;
        let table = Self::ensure(&db, dataset)?;
        if options.relational {
            if Self::columns(&db, &table)?.iter().any(|column| column == path) {
                db.execute_batch(&format!("alter table {} drop column {};", table, identifier(path)))?;
            }
        } else {
            db.execute(
                &format!("update {} set Document = json_remove(Document, ?)", table),
                params![json_path(path)],
            )?;
        }
        debug!(dataset, path, relational = options.relational, "value removed");
        Ok(())
    }
    async fn ensure_column(&self, dataset: &str, column: &(String, String)) -> Result<()> {
        self.sync_columns(dataset, std::slice::from_ref(column))?;
        Ok(())
    }
}
