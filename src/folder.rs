//! Folders: named containers of fields and further folders.
//!
//! Children live in one ordered map keyed by name, so the set of names, their
//! sorted order and the child lookup can never disagree. Everything here is
//! synchronous and touches no storage; writing the schema file and rewriting
//! stored records is done by [`crate::schema::Schema`].

use std::collections::BTreeMap;
// used to print out the folder summary
use std::fmt;

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{Map, Value};

use crate::datatype::TypeRegistry;
use crate::error::{KeyfolderError, Result};
use crate::field::{Field, FieldOptions};
use crate::resolver::Guild;

/// Type tag carried by every folder object in the persisted JSON.
pub const FOLDER_TAG: &str = "Folder";

lazy_static! {
    static ref NAME: Regex = Regex::new(r"^[A-Za-z0-9_-]+$").unwrap();
}

/// Checks that a child name is usable as a single path segment.
pub fn validate_name(name: &str) -> Result<()> {
    // "type" is the tag slot of the persisted folder object
    if !NAME.is_match(name) || name == "type" {
        return Err(KeyfolderError::InvalidName { name: name.to_string() });
    }
    Ok(())
}

fn join(path: &str, name: &str) -> String {
    if path.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", path, name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Child {
    Folder(Folder),
    Field(Field),
}

impl Child {
    pub fn path(&self) -> &str {
        match self {
            Child::Folder(folder) => folder.path(),
            Child::Field(field) => field.path(),
        }
    }
    pub fn as_folder(&self) -> Option<&Folder> {
        match self {
            Child::Folder(folder) => Some(folder),
            Child::Field(_) => None,
        }
    }
    pub fn as_field(&self) -> Option<&Field> {
        match self {
            Child::Field(field) => Some(field),
            Child::Folder(_) => None,
        }
    }
    /// Folders are always shown; fields only when flagged configurable.
    pub fn is_configurable(&self) -> bool {
        match self {
            Child::Folder(_) => true,
            Child::Field(field) => field.configurable(),
        }
    }
    pub fn to_json(&self) -> Value {
        match self {
            Child::Folder(folder) => folder.to_json(),
            Child::Field(field) => field.to_json(),
        }
    }
    /// Decodes one child definition. Objects without a `type` tag predate the
    /// tag and are read as folders.
    pub fn from_value(path: &str, definition: &Value) -> Result<Self> {
        let object = definition
            .as_object()
            .ok_or_else(|| KeyfolderError::definition(path, "definition", "expected an object"))?;
        match object.get("type") {
            None => Ok(Child::Folder(Folder::from_value(path, definition)?)),
            Some(Value::String(tag)) if tag == FOLDER_TAG => {
                Ok(Child::Folder(Folder::from_value(path, definition)?))
            }
            Some(_) => Ok(Child::Field(Field::new(path, FieldOptions::from_value(path, definition)?)?)),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Folder {
    path: String,
    children: BTreeMap<String, Child>,
}

impl Folder {
    pub fn root() -> Self {
        Self::default()
    }
    pub fn new(path: &str) -> Self {
        Self {
            path: path.to_string(),
            children: BTreeMap::new(),
        }
    }
    /// Builds a folder and its whole subtree from its persisted definition.
    pub fn from_value(path: &str, definition: &Value) -> Result<Self> {
        let object = definition
            .as_object()
            .ok_or_else(|| KeyfolderError::definition(path, "definition", "expected an object"))?;
        let mut folder = Folder::new(path);
        for (name, child) in object {
            if name == "type" {
                if child.as_str() != Some(FOLDER_TAG) {
                    return Err(KeyfolderError::definition(path, "type", "a folder must be tagged 'Folder'"));
                }
                continue;
            }
            validate_name(name)?;
            let child = Child::from_value(&join(path, name), child)?;
            folder.children.insert(name.clone(), child);
        }
        Ok(folder)
    }

    pub fn path(&self) -> &str {
        &self.path
    }
    pub fn key(&self) -> &str {
        self.path.rsplit('.').next().unwrap_or("")
    }
    pub fn is_root(&self) -> bool {
        self.path.is_empty()
    }
    pub fn len(&self) -> usize {
        self.children.len()
    }
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
    pub fn contains(&self, name: &str) -> bool {
        self.children.contains_key(name)
    }
    /// Child names in display order (sorted).
    pub fn key_order(&self) -> Vec<&str> {
        self.children.keys().map(String::as_str).collect()
    }
    pub fn children(&self) -> impl Iterator<Item = (&str, &Child)> {
        self.children.iter().map(|(name, child)| (name.as_str(), child))
    }
    pub fn child(&self, name: &str) -> Option<&Child> {
        self.children.get(name)
    }

    /// Walks a dotted path below this folder. The empty path is not a child.
    pub fn get(&self, path: &str) -> Option<&Child> {
        let (head, rest) = match path.split_once('.') {
            Some((head, rest)) => (head, Some(rest)),
            None => (path, None),
        };
        let child = self.children.get(head)?;
        match rest {
            None => Some(child),
            Some(rest) => child.as_folder()?.get(rest),
        }
    }
    /// The folder at a dotted path; the empty path is this folder.
    pub fn folder(&self, path: &str) -> Option<&Folder> {
        if path.is_empty() {
            return Some(self);
        }
        self.get(path)?.as_folder()
    }
    pub fn folder_mut(&mut self, path: &str) -> Option<&mut Folder> {
        if path.is_empty() {
            return Some(self);
        }
        let (head, rest) = match path.split_once('.') {
            Some((head, rest)) => (head, rest),
            None => (path, ""),
        };
        match self.children.get_mut(head)? {
            Child::Folder(folder) => folder.folder_mut(rest),
            Child::Field(_) => None,
        }
    }
    pub fn field(&self, path: &str) -> Option<&Field> {
        self.get(path)?.as_field()
    }

    // ------------- Mutation -------------
    fn vacant(&self, name: &str) -> Result<String> {
        validate_name(name)?;
        let path = join(&self.path, name);
        if self.children.contains_key(name) {
            return Err(KeyfolderError::Duplicate { path });
        }
        Ok(path)
    }

    pub fn insert_folder(&mut self, name: &str, definition: &Value) -> Result<&Folder> {
        let path = self.vacant(name)?;
        let folder = Folder::from_value(&path, definition)?;
        let child = self
            .children
            .entry(name.to_string())
            .or_insert(Child::Folder(folder));
        child
            .as_folder()
            .ok_or_else(|| KeyfolderError::NotAFolder { path: path.clone() })
    }

    pub fn remove_folder(&mut self, name: &str) -> Result<Folder> {
        let path = join(&self.path, name);
        match self.children.get(name) {
            None => return Err(KeyfolderError::NotFound { path }),
            Some(Child::Field(_)) => return Err(KeyfolderError::NotAFolder { path }),
            Some(Child::Folder(_)) => {}
        }
        match self.children.remove(name) {
            Some(Child::Folder(folder)) => Ok(folder),
            _ => Err(KeyfolderError::NotFound { path }),
        }
    }

    /// Registers a new field. The type must be known to the registry; its
    /// canonical lowercase name is what gets stored.
    pub fn insert_key(
        &mut self,
        name: &str,
        mut options: FieldOptions,
        registry: &TypeRegistry,
    ) -> Result<&Field> {
        let path = join(&self.path, name);
        options.kind = registry
            .canonical(&options.kind)
            .ok_or_else(|| KeyfolderError::UnsupportedType {
                path: path.clone(),
                kind: options.kind.clone(),
            })?
            .to_string();
        let path = self.vacant(name)?;
        let field = Field::new(&path, options)?;
        let child = self
            .children
            .entry(name.to_string())
            .or_insert(Child::Field(field));
        child.as_field().ok_or(KeyfolderError::NotAKey { path })
    }

    pub fn remove_key(&mut self, name: &str) -> Result<Field> {
        let path = join(&self.path, name);
        match self.children.get(name) {
            None => return Err(KeyfolderError::NotFound { path }),
            Some(Child::Folder(_)) => return Err(KeyfolderError::NotAKey { path }),
            Some(Child::Field(_)) => {}
        }
        match self.children.remove(name) {
            Some(Child::Field(field)) => Ok(field),
            _ => Err(KeyfolderError::NotFound { path }),
        }
    }

    // ------------- Derivations -------------
    /// Default values shaped like the tree.
    pub fn defaults(&self) -> Map<String, Value> {
        self.children
            .iter()
            .map(|(name, child)| {
                let value = match child {
                    Child::Folder(folder) => Value::Object(folder.defaults()),
                    Child::Field(field) => field.default().clone(),
                };
                (name.clone(), value)
            })
            .collect()
    }

    /// Every field path below this folder, depth first in key order.
    pub fn key_paths(&self) -> Vec<String> {
        let mut paths = Vec::new();
        self.key_paths_into(&mut paths);
        paths
    }
    pub fn key_paths_into(&self, paths: &mut Vec<String>) {
        for child in self.children.values() {
            match child {
                Child::Folder(folder) => folder.key_paths_into(paths),
                Child::Field(field) => paths.push(field.path().to_string()),
            }
        }
    }

    pub fn relational_columns(&self) -> Vec<(String, String)> {
        let mut columns = Vec::new();
        self.relational_columns_into(&mut columns);
        columns
    }
    pub fn relational_columns_into(&self, columns: &mut Vec<(String, String)>) {
        for child in self.children.values() {
            match child {
                Child::Folder(folder) => folder.relational_columns_into(columns),
                Child::Field(field) => columns.push(field.relational_column().clone()),
            }
        }
    }

    pub fn fields(&self) -> Vec<&Field> {
        let mut fields = Vec::new();
        self.collect_fields(&mut fields);
        fields
    }
    fn collect_fields<'a>(&'a self, fields: &mut Vec<&'a Field>) {
        for child in self.children.values() {
            match child {
                Child::Folder(folder) => folder.collect_fields(fields),
                Child::Field(field) => fields.push(field),
            }
        }
    }

    pub fn configurable_children(&self) -> Vec<&str> {
        self.children
            .iter()
            .filter(|(_, child)| child.is_configurable())
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// One `name :: value` line per configurable child, names padded to the
    /// longest one. `values` holds this folder's stored values.
    pub fn render_list(&self, guild: Option<&Guild>, values: &Value) -> String {
        let names = self.configurable_children();
        let width = names.iter().map(|name| name.chars().count()).max().unwrap_or(0);
        let mut lines = Vec::with_capacity(names.len());
        for name in names {
            let shown = match self.children.get(name) {
                Some(Child::Folder(folder)) => folder.to_string(),
                Some(Child::Field(field)) => field.display(values.get(name), guild),
                None => continue,
            };
            lines.push(format!("{:<width$} :: {}", name, shown, width = width));
        }
        lines.join("\n")
    }

    pub fn to_json(&self) -> Value {
        let mut object = Map::new();
        object.insert("type".to_string(), Value::String(FOLDER_TAG.to_string()));
        for (name, child) in &self.children {
            object.insert(name.clone(), child.to_json());
        }
        Value::Object(object)
    }
}

impl fmt::Display for Folder {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.children.values().any(Child::is_configurable) {
            write!(f, "[ Folder")
        } else {
            write!(f, "[ Empty Folder")
        }
    }
}
