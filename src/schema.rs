//! The owner of a schema tree.
//!
//! [`Schema`] ties the in-memory [`Folder`] tree to its schema file, the
//! storage provider and the record cache. Every structural change goes
//! through the same sequence: validate and mutate the tree, rewrite the
//! schema file, then (when asked to) propagate the change to stored records.
//! A propagation failure is reported after the tree and file have already
//! changed; the caller reconciles, nothing is rolled back.
//!
//! Mutations take `&mut self`, so two of them can never interleave on one
//! schema. Sharing a schema between tasks is up to the caller (for example
//! behind a `tokio::sync::Mutex`).

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::cache::{Record, RecordCache};
use crate::datatype::TypeRegistry;
use crate::error::{KeyfolderError, Result};
use crate::field::{Field, FieldOptions, Parsed};
use crate::folder::Folder;
use crate::persist::{SchemaFile, StorageProvider, WriteOptions};
use crate::resolver::{Guild, Resolvers};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForceAction {
    Add,
    Edit,
    Delete,
}

impl FromStr for ForceAction {
    type Err = KeyfolderError;
    fn from_str(action: &str) -> Result<Self> {
        match action {
            "add" => Ok(ForceAction::Add),
            "edit" => Ok(ForceAction::Edit),
            "delete" => Ok(ForceAction::Delete),
            _ => Err(KeyfolderError::UnknownAction(action.to_string())),
        }
    }
}
impl fmt::Display for ForceAction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ForceAction::Add => write!(f, "add"),
            ForceAction::Edit => write!(f, "edit"),
            ForceAction::Delete => write!(f, "delete"),
        }
    }
}

pub struct SchemaOptions {
    pub dataset: String,
    pub relational: bool,
    pub registry: TypeRegistry,
    pub resolvers: Resolvers,
}

impl Default for SchemaOptions {
    fn default() -> Self {
        Self {
            dataset: "guilds".to_string(),
            relational: false,
            registry: TypeRegistry::builtin(),
            resolvers: Resolvers::builtin(),
        }
    }
}

pub struct Schema {
    root: Folder,
    file: SchemaFile,
    provider: Arc<dyn StorageProvider>,
    cache: Arc<dyn RecordCache>,
    options: SchemaOptions,
}

impl Schema {
    /// Reads the schema file (creating it when missing) and builds the tree.
    pub async fn load(
        file: SchemaFile,
        provider: Arc<dyn StorageProvider>,
        cache: Arc<dyn RecordCache>,
        options: SchemaOptions,
    ) -> Result<Self> {
        let definition = file.load().await?;
        let root = Folder::from_value("", &definition)?;
        info!(path = %file.path().display(), keys = root.key_paths().len(), "schema loaded");
        Ok(Self {
            root,
            file,
            provider,
            cache,
            options,
        })
    }

    pub fn root(&self) -> &Folder {
        &self.root
    }
    pub fn dataset(&self) -> &str {
        &self.options.dataset
    }
    pub fn relational(&self) -> bool {
        self.options.relational
    }
    pub fn registry(&self) -> &TypeRegistry {
        &self.options.registry
    }
    pub fn resolvers(&self) -> &Resolvers {
        &self.options.resolvers
    }
    pub fn file(&self) -> &SchemaFile {
        &self.file
    }

    /// A handle for mutating the folder at `path` (empty for the root).
    pub fn at(&mut self, path: &str) -> Result<FolderHandle<'_>> {
        target(&mut self.root, path)?;
        Ok(FolderHandle {
            schema: self,
            path: path.to_string(),
        })
    }

    async fn persist(&self) -> Result<()> {
        self.file.write(&self.root.to_json()).await
    }

    // ------------- Mutation -------------
    pub async fn add_folder(&mut self, folder: &str, name: &str, definition: Value, propagate: bool) -> Result<&Folder> {
        let created = target(&mut self.root, folder)?.insert_folder(name, &definition)?.clone();
        self.persist().await?;
        info!(path = created.path(), keys = created.key_paths().len(), "folder added");
        if propagate {
            self.force_many(ForceAction::Add, &created).await?;
        }
        Ok(&self.root)
    }

    pub async fn remove_folder(&mut self, folder: &str, name: &str, propagate: bool) -> Result<&Folder> {
        let removed = target(&mut self.root, folder)?.remove_folder(name)?;
        self.persist().await?;
        info!(path = removed.path(), keys = removed.key_paths().len(), "folder removed");
        if propagate {
            self.force_many(ForceAction::Delete, &removed).await?;
        }
        Ok(&self.root)
    }

    pub async fn add_key(&mut self, folder: &str, name: &str, options: FieldOptions, propagate: bool) -> Result<&Folder> {
        let created = target(&mut self.root, folder)?
            .insert_key(name, options, &self.options.registry)?
            .clone();
        self.persist().await?;
        info!(path = created.path(), kind = created.kind(), array = created.array(), "key added");
        if propagate {
            self.force(ForceAction::Add, &created).await?;
        }
        Ok(&self.root)
    }

    pub async fn remove_key(&mut self, folder: &str, name: &str, propagate: bool) -> Result<&Folder> {
        let removed = target(&mut self.root, folder)?.remove_key(name)?;
        self.persist().await?;
        info!(path = removed.path(), "key removed");
        if propagate {
            self.force(ForceAction::Delete, &removed).await?;
        }
        Ok(&self.root)
    }

    // ------------- Propagation -------------
    /// Brings every stored record in line with one field: writes its default
    /// on add/edit, drops the value on delete. Cached records are patched in
    /// place, then the provider is called once for the whole dataset.
    pub async fn force(&self, action: ForceAction, field: &Field) -> Result<()> {
        let segments: Vec<&str> = field.path().split('.').collect();
        let (last, parents) = segments
            .split_last()
            .ok_or_else(|| KeyfolderError::NotFound { path: field.path().to_string() })?;
        let options = WriteOptions { relational: self.options.relational };
        let dataset = self.options.dataset.as_str();
        let mut touched = 0usize;
        match action {
            ForceAction::Add | ForceAction::Edit => {
                self.cache.for_each_record(dataset, &mut |record: &mut Record| {
                    if let Some(container) = descend_or_create(record, parents) {
                        container.insert(last.to_string(), field.default().clone());
                        touched += 1;
                    }
                })?;
                if options.relational {
                    self.provider
                        .ensure_column(dataset, field.relational_column())
                        .await
                        .map_err(|e| propagation_failed(action, field, e))?;
                }
                self.provider
                    .update_value(dataset, field.path(), field.default(), options)
                    .await
                    .map_err(|e| propagation_failed(action, field, e))?;
            }
            ForceAction::Delete => {
                self.cache.for_each_record(dataset, &mut |record: &mut Record| {
                    if let Some(container) = descend(record, parents) {
                        if container.remove(*last).is_some() {
                            touched += 1;
                        }
                    }
                })?;
                self.provider
                    .remove_value(dataset, field.path(), options)
                    .await
                    .map_err(|e| propagation_failed(action, field, e))?;
            }
        }
        debug!(path = field.path(), %action, cached = touched, "propagated");
        Ok(())
    }

    /// Folder-wide propagation has no defined semantics yet, so it always
    /// refuses instead of guessing at how records should be rewritten.
    pub async fn force_many(&self, action: ForceAction, folder: &Folder) -> Result<()> {
        if action == ForceAction::Edit {
            return Err(KeyfolderError::UnknownAction(action.to_string()));
        }
        warn!(path = folder.path(), %action, "folder propagation requested but not supported");
        Err(KeyfolderError::Unsupported(format!(
            "propagating '{}' of folder '{}' to stored records",
            action,
            folder.path()
        )))
    }

    // ------------- Values -------------
    fn field(&self, path: &str) -> Result<&Field> {
        match self.root.get(path) {
            None => Err(KeyfolderError::NotFound { path: path.to_string() }),
            Some(child) => child
                .as_field()
                .ok_or_else(|| KeyfolderError::NotAKey { path: path.to_string() }),
        }
    }
    pub async fn parse(&self, path: &str, raw: &str, guild: Option<&Guild>) -> Result<Parsed> {
        self.field(path)?
            .parse(raw, guild, &self.options.resolvers, self.options.relational)
            .await
    }
    pub fn default_of(&self, path: &str) -> Result<Parsed> {
        Ok(self.field(path)?.default_of(self.options.relational))
    }

    // ------------- Derivations -------------
    pub fn defaults(&self) -> Map<String, Value> {
        self.root.defaults()
    }
    pub fn key_paths(&self) -> Vec<String> {
        self.root.key_paths()
    }
    pub fn relational_columns(&self) -> Vec<(String, String)> {
        self.root.relational_columns()
    }
    pub fn to_json(&self) -> Value {
        self.root.to_json()
    }
}

fn propagation_failed(action: ForceAction, field: &Field, e: KeyfolderError) -> KeyfolderError {
    warn!(path = field.path(), %action, error = %e, "propagation failed, schema is ahead of stored records");
    KeyfolderError::Propagation(format!("{} of '{}': {}", action, field.path(), e))
}

fn target<'f>(root: &'f mut Folder, path: &str) -> Result<&'f mut Folder> {
    if !path.is_empty() && root.get(path).is_none() {
        return Err(KeyfolderError::NotFound { path: path.to_string() });
    }
    root.folder_mut(path)
        .ok_or_else(|| KeyfolderError::NotAFolder { path: path.to_string() })
}

// Intermediate containers that are missing (or not objects) are replaced by empty objects.
fn descend_or_create<'r>(record: &'r mut Record, segments: &[&str]) -> Option<&'r mut Record> {
    let mut container = record;
    for (depth, segment) in segments.iter().enumerate() {
        let slot = container
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !slot.is_object() {
            warn!(
                path = segments[..=depth].join("."),
                replaced = %slot,
                "cached record held a value where a folder is expected, replacing it"
            );
            *slot = Value::Object(Map::new());
        }
        container = slot.as_object_mut()?;
    }
    Some(container)
}

fn descend<'r>(record: &'r mut Record, segments: &[&str]) -> Option<&'r mut Record> {
    let mut container = record;
    for segment in segments {
        container = container.get_mut(*segment)?.as_object_mut()?;
    }
    Some(container)
}

/// Mutation entry points scoped to one folder of a schema.
pub struct FolderHandle<'s> {
    schema: &'s mut Schema,
    path: String,
}

impl FolderHandle<'_> {
    pub fn path(&self) -> &str {
        &self.path
    }
    pub async fn add_folder(&mut self, name: &str, definition: Value, propagate: bool) -> Result<&Folder> {
        self.schema.add_folder(&self.path, name, definition, propagate).await
    }
    pub async fn remove_folder(&mut self, name: &str, propagate: bool) -> Result<&Folder> {
        self.schema.remove_folder(&self.path, name, propagate).await
    }
    pub async fn add_key(&mut self, name: &str, options: FieldOptions, propagate: bool) -> Result<&Folder> {
        self.schema.add_key(&self.path, name, options, propagate).await
    }
    pub async fn remove_key(&mut self, name: &str, propagate: bool) -> Result<&Folder> {
        self.schema.remove_key(&self.path, name, propagate).await
    }
}
