// used to keep the registered type names ordered and unique
use std::collections::BTreeSet;
// used to print out readable forms of a data type
use std::fmt;

use serde_json::Value;

/// Type names every registry starts out with. Each names a resolver, although
/// not every one of them has a built-in resolver (see `resolver`).
pub const BUILTIN_TYPES: &[&str] = &[
    "any", "boolean", "channel", "command", "float", "guild", "integer", "language", "role",
    "string", "url", "user",
];

// The set of type names a field may carry. Lookups ignore case and
// hand back the canonical lowercase name.
#[derive(Debug, Clone)]
pub struct TypeRegistry {
    names: BTreeSet<String>,
}

impl TypeRegistry {
    pub fn empty() -> Self {
        Self { names: BTreeSet::new() }
    }
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        for name in BUILTIN_TYPES {
            registry.register(name);
        }
        registry
    }
    pub fn register(&mut self, name: &str) -> bool {
        self.names.insert(name.to_lowercase())
    }
    pub fn canonical(&self, name: &str) -> Option<&str> {
        self.names.get(&name.to_lowercase()).map(String::as_str)
    }
    pub fn contains(&self, name: &str) -> bool {
        self.canonical(name).is_some()
    }
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }
    pub fn len(&self) -> usize {
        self.names.len()
    }
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

// ------------- SQL typing -------------
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlType {
    Integer,
    Text,
}

impl SqlType {
    pub fn for_kind(kind: &str) -> Self {
        match kind {
            "integer" | "float" => SqlType::Integer,
            _ => SqlType::Text,
        }
    }
}
impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SqlType::Integer => write!(f, "INTEGER"),
            SqlType::Text => write!(f, "TEXT"),
        }
    }
}

/// Single-quotes a string for SQL, doubling any embedded single quotes.
pub fn quote(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

/// Renders a JSON value as an SQL literal. Assumes a dialect where strings
/// are delimited by single quotes; this is not a substitute for bound parameters.
pub fn literal(value: &Value) -> String {
    match value {
        Value::Null | Value::Bool(_) | Value::Number(_) => value.to_string(),
        Value::String(text) => quote(text),
        Value::Array(_) | Value::Object(_) => quote(&value.to_string()),
    }
}

// ------------- Resolved values -------------
// A value after it has been looked up against its context, ready to be shown.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolved {
    Null,
    User { username: String },
    Channel { name: String },
    Role { name: String },
    Guild { name: String },
    Plain(Value),
    List(Vec<Resolved>),
}

impl fmt::Display for Resolved {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Resolved::Null => write!(f, "Not set"),
            Resolved::User { username } => write!(f, "@{}", username),
            Resolved::Channel { name } => write!(f, "#{}", name),
            Resolved::Role { name } => write!(f, "@{}", name),
            Resolved::Guild { name } => write!(f, "{}", name),
            Resolved::Plain(Value::String(text)) => write!(f, "{}", text),
            Resolved::Plain(value) => write!(f, "{}", value),
            Resolved::List(items) if items.is_empty() => write!(f, "None"),
            Resolved::List(items) => {
                let shown: Vec<String> = items.iter().map(|item| item.to_string()).collect();
                write!(f, "[ {} ]", shown.join(" | "))
            }
        }
    }
}
