//! Leaf entries of a schema: one configurable value each.
//!
//! A [`Field`] knows its type name, whether it holds a list, its default,
//! optional bounds and whether end users may configure it. It is validated
//! once when built and never changes afterwards; folders replace fields
//! rather than editing them.

use serde_json::{json, Map, Number, Value};

use crate::datatype::{literal, quote, Resolved, SqlType};
use crate::error::{KeyfolderError, Result};
use crate::resolver::{Bounds, Guild, Resolvers};

/// Raw options a field is built from. Everything but the type may be omitted
/// and is then filled in by [`Field::new`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldOptions {
    pub kind: String,
    pub array: Option<bool>,
    pub default: Option<Value>,
    pub min: Option<Number>,
    pub max: Option<Number>,
    pub configurable: Option<bool>,
}

impl FieldOptions {
    pub fn new(kind: &str) -> Self {
        Self {
            kind: kind.to_string(),
            ..Self::default()
        }
    }
    pub fn array(mut self, array: bool) -> Self {
        self.array = Some(array);
        self
    }
    pub fn default_value(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }
    pub fn min(mut self, min: impl Into<Number>) -> Self {
        self.min = Some(min.into());
        self
    }
    pub fn max(mut self, max: impl Into<Number>) -> Self {
        self.max = Some(max.into());
        self
    }
    pub fn configurable(mut self, configurable: bool) -> Self {
        self.configurable = Some(configurable);
        self
    }

    /// Reads options out of a persisted definition object. Each option is
    /// checked against the JSON kind it must have; unknown options are refused.
    /// An explicit `null` counts as "not given".
    pub fn from_value(path: &str, definition: &Value) -> Result<Self> {
        let object = definition
            .as_object()
            .ok_or_else(|| KeyfolderError::definition(path, "definition", "expected an object"))?;
        let mut options = FieldOptions::default();
        let mut kind = None;
        for (param, value) in object {
            match param.as_str() {
                "type" => match value {
                    Value::String(name) => kind = Some(name.clone()),
                    _ => return Err(KeyfolderError::definition(path, param, "must be a string")),
                },
                "array" => options.array = boolean(path, param, value)?,
                "configurable" => options.configurable = boolean(path, param, value)?,
                "min" => options.min = number(path, param, value)?,
                "max" => options.max = number(path, param, value)?,
                "default" => {
                    if !value.is_null() {
                        options.default = Some(value.clone());
                    }
                }
                _ => return Err(KeyfolderError::definition(path, param, "unknown option")),
            }
        }
        options.kind =
            kind.ok_or_else(|| KeyfolderError::definition(path, "type", "is required"))?;
        Ok(options)
    }
}

fn boolean(path: &str, param: &str, value: &Value) -> Result<Option<bool>> {
    match value {
        Value::Null => Ok(None),
        Value::Bool(flag) => Ok(Some(*flag)),
        _ => Err(KeyfolderError::definition(path, param, "must be a boolean")),
    }
}

fn number(path: &str, param: &str, value: &Value) -> Result<Option<Number>> {
    match value {
        Value::Null => Ok(None),
        Value::Number(n) => Ok(Some(n.clone())),
        _ => Err(KeyfolderError::definition(path, param, "must be a number")),
    }
}

/// Outcome of resolving or defaulting a value: the data itself plus, for
/// relationally backed schemas, the assignment that stores it.
#[derive(Debug, Clone, PartialEq)]
pub struct Parsed {
    pub data: Value,
    pub fragment: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    path: String,
    key: String,
    kind: String,
    array: bool,
    default: Value,
    min: Option<Number>,
    max: Option<Number>,
    configurable: bool,
    column: (String, String),
}

impl Field {
    pub fn new(path: &str, options: FieldOptions) -> Result<Self> {
        let kind = options.kind.trim().to_lowercase();
        if kind.is_empty() {
            return Err(KeyfolderError::definition(path, "type", "must not be empty"));
        }
        if let (Some(min), Some(max)) = (&options.min, &options.max) {
            let (low, high) = (as_f64(min), as_f64(max));
            if low > high {
                return Err(KeyfolderError::definition(
                    path,
                    "min",
                    format!("{} is greater than max {}", min, max),
                ));
            }
        }
        let array = options.array.unwrap_or(false);
        let default = match options.default {
            Some(value) if array && !value.is_array() => {
                return Err(KeyfolderError::definition(
                    path,
                    "default",
                    "an array key needs an array default",
                ));
            }
            Some(value) => value,
            None if array => Value::Array(Vec::new()),
            None if kind == "boolean" => Value::Bool(false),
            None => Value::Null,
        };
        let configurable = options.configurable.unwrap_or(kind != "any");
        let key = path.rsplit('.').next().unwrap_or(path).to_string();
        let mut ddl = SqlType::for_kind(&kind).to_string();
        if !default.is_null() {
            ddl.push_str(" DEFAULT ");
            ddl.push_str(&literal(&default));
        }
        Ok(Self {
            path: path.to_string(),
            key,
            kind,
            array,
            default,
            min: options.min,
            max: options.max,
            configurable,
            // named by the full path, not the key, so nested keys get distinct
            // columns and match the `'<path>' = ...` fragments
            column: (path.to_string(), ddl),
        })
    }
    pub fn path(&self) -> &str {
        &self.path
    }
    pub fn key(&self) -> &str {
        &self.key
    }
    pub fn kind(&self) -> &str {
        &self.kind
    }
    pub fn array(&self) -> bool {
        self.array
    }
    pub fn default(&self) -> &Value {
        &self.default
    }
    pub fn min(&self) -> Option<&Number> {
        self.min.as_ref()
    }
    pub fn max(&self) -> Option<&Number> {
        self.max.as_ref()
    }
    pub fn configurable(&self) -> bool {
        self.configurable
    }
    /// Column name and column definition for a relational table. The column
    /// is named by the dotted path (the bare key only at the root).
    pub fn relational_column(&self) -> &(String, String) {
        &self.column
    }
    pub fn bounds(&self) -> Bounds {
        Bounds {
            min: self.min.as_ref().map(as_f64),
            max: self.max.as_ref().map(as_f64),
        }
    }
    /// The options that rebuild this field when given back to [`Field::new`].
    pub fn options(&self) -> FieldOptions {
        FieldOptions {
            kind: self.kind.clone(),
            array: Some(self.array),
            default: Some(self.default.clone()),
            min: self.min.clone(),
            max: self.max.clone(),
            configurable: Some(self.configurable),
        }
    }

    /// `'<path>' = <literal>`
    pub fn fragment(&self, value: &Value) -> String {
        format!("{} = {}", quote(&self.path), literal(value))
    }

    pub fn default_of(&self, relational: bool) -> Parsed {
        Parsed {
            fragment: relational.then(|| self.fragment(&self.default)),
            data: self.default.clone(),
        }
    }

    /// Resolves raw input with the resolver registered for this field's type.
    /// Array fields resolve one element; merging it into the stored list is
    /// left to the caller, who holds the record's current value.
    pub async fn parse(
        &self,
        raw: &str,
        guild: Option<&Guild>,
        resolvers: &Resolvers,
        relational: bool,
    ) -> Result<Parsed> {
        let resolver = resolvers.get(&self.kind).ok_or_else(|| KeyfolderError::Resolution {
            path: self.path.clone(),
            message: format!("no resolver is registered for the type '{}'", self.kind),
        })?;
        let data = resolver.resolve(raw, guild, &self.key, self.bounds()).await?;
        Ok(Parsed {
            fragment: relational.then(|| self.fragment(&data)),
            data,
        })
    }

    /// Renders an already resolved value; `None` stands for a value that was never provided.
    pub fn format(&self, value: Option<&Resolved>) -> String {
        match value {
            None => format!("{{SchemaPiece:{}}}", self.kind),
            Some(resolved) => resolved.to_string(),
        }
    }

    /// Looks a stored value up in the guild and renders it.
    pub fn display(&self, value: Option<&Value>, guild: Option<&Guild>) -> String {
        match value {
            None => self.format(None),
            Some(Value::Array(items)) if self.array => {
                let resolved = items.iter().map(|item| lookup(&self.kind, item, guild)).collect();
                self.format(Some(&Resolved::List(resolved)))
            }
            Some(value) => self.format(Some(&lookup(&self.kind, value, guild))),
        }
    }

    pub fn to_json(&self) -> Value {
        let mut object = Map::new();
        object.insert("type".to_string(), json!(self.kind));
        object.insert("array".to_string(), json!(self.array));
        object.insert("default".to_string(), self.default.clone());
        object.insert("min".to_string(), json!(self.min));
        object.insert("max".to_string(), json!(self.max));
        object.insert("configurable".to_string(), json!(self.configurable));
        Value::Object(object)
    }
}

fn lookup(kind: &str, value: &Value, guild: Option<&Guild>) -> Resolved {
    match guild {
        Some(guild) => guild.lookup(kind, value),
        None if value.is_null() => Resolved::Null,
        None => Resolved::Plain(value.clone()),
    }
}

fn as_f64(n: &Number) -> f64 {
    n.as_f64().unwrap_or(f64::NAN)
}
