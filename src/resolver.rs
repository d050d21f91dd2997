//! Turning raw user input into typed values.
//!
//! Every field type name maps to a [`Resolver`]. The [`Builtin`] resolvers
//! cover the primitive types and the guild references (`user`, `channel`,
//! `role`, `guild`); anything else has to be registered by the owner.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{Number, Value};

use crate::datatype::Resolved;
use crate::error::{KeyfolderError, Result};

lazy_static! {
    // <@123>, <@!123>, <#123>, <@&123> or a bare snowflake
    static ref MENTION: Regex = Regex::new(r"^(?:<(?:@[!&]?|#))?(\d+)>?$").unwrap();
}

const TRUTHS: &[&str] = &["true", "t", "yes", "y", "on", "enable", "enabled", "1", "+"];
const FALSITIES: &[&str] = &["false", "f", "no", "n", "off", "disable", "disabled", "0", "-"];

/// Inclusive limits a resolver applies: string length for text, the value
/// itself for numbers.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Bounds {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl Bounds {
    pub fn check(&self, key: &str, measure: f64, what: &str) -> Result<()> {
        if let Some(min) = self.min {
            if measure < min {
                return Err(out_of_bounds(key, what, format!("at least {}", min)));
            }
        }
        if let Some(max) = self.max {
            if measure > max {
                return Err(out_of_bounds(key, what, format!("at most {}", max)));
            }
        }
        Ok(())
    }
}

fn out_of_bounds(key: &str, what: &str, limit: String) -> KeyfolderError {
    KeyfolderError::Resolution {
        path: key.to_string(),
        message: format!("the {} must be {}", what, limit),
    }
}

fn rejected(key: &str, message: impl Into<String>) -> KeyfolderError {
    KeyfolderError::Resolution {
        path: key.to_string(),
        message: message.into(),
    }
}

// ------------- Guild context -------------
/// The record owner that reference types are looked up in.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Guild {
    pub id: String,
    pub name: String,
    users: BTreeMap<String, String>,
    channels: BTreeMap<String, String>,
    roles: BTreeMap<String, String>,
}

impl Guild {
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            ..Self::default()
        }
    }
    pub fn with_user(mut self, id: &str, username: &str) -> Self {
        self.users.insert(id.to_string(), username.to_string());
        self
    }
    pub fn with_channel(mut self, id: &str, name: &str) -> Self {
        self.channels.insert(id.to_string(), name.to_string());
        self
    }
    pub fn with_role(mut self, id: &str, name: &str) -> Self {
        self.roles.insert(id.to_string(), name.to_string());
        self
    }
    fn entries(&self, kind: &str) -> Option<&BTreeMap<String, String>> {
        match kind {
            "user" => Some(&self.users),
            "channel" => Some(&self.channels),
            "role" => Some(&self.roles),
            _ => None,
        }
    }
    /// Finds the id of a user, channel or role by mention, id or (case-insensitive) name.
    pub fn find(&self, kind: &str, raw: &str) -> Option<&str> {
        let entries = self.entries(kind)?;
        let raw = raw.trim();
        if let Some(id) = MENTION.captures(raw).and_then(|c| c.get(1)) {
            if let Some((id, _)) = entries.get_key_value(id.as_str()) {
                return Some(id.as_str());
            }
        }
        let name = raw.trim_start_matches(['@', '#']).to_lowercase();
        entries
            .iter()
            .find(|(_, candidate)| candidate.to_lowercase() == name)
            .map(|(id, _)| id.as_str())
    }
    /// Turns a stored value into its displayable form.
    pub fn lookup(&self, kind: &str, value: &Value) -> Resolved {
        let id = match value {
            Value::Null => return Resolved::Null,
            Value::String(id) => id.as_str(),
            _ => return Resolved::Plain(value.clone()),
        };
        match kind {
            "user" => match self.users.get(id) {
                Some(username) => Resolved::User { username: username.clone() },
                None => Resolved::Plain(value.clone()),
            },
            "channel" => match self.channels.get(id) {
                Some(name) => Resolved::Channel { name: name.clone() },
                None => Resolved::Plain(value.clone()),
            },
            "role" => match self.roles.get(id) {
                Some(name) => Resolved::Role { name: name.clone() },
                None => Resolved::Plain(value.clone()),
            },
            "guild" if id == self.id => Resolved::Guild { name: self.name.clone() },
            _ => Resolved::Plain(value.clone()),
        }
    }
}

// ------------- Resolvers -------------
#[async_trait]
pub trait Resolver: Send + Sync {
    async fn resolve(
        &self,
        raw: &str,
        guild: Option<&Guild>,
        key: &str,
        bounds: Bounds,
    ) -> Result<Value>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    String,
    Integer,
    Float,
    Boolean,
    Any,
    User,
    Channel,
    Role,
    Guild,
}

impl Builtin {
    pub const ALL: [(&'static str, Builtin); 9] = [
        ("string", Builtin::String),
        ("integer", Builtin::Integer),
        ("float", Builtin::Float),
        ("boolean", Builtin::Boolean),
        ("any", Builtin::Any),
        ("user", Builtin::User),
        ("channel", Builtin::Channel),
        ("role", Builtin::Role),
        ("guild", Builtin::Guild),
    ];
}

#[async_trait]
impl Resolver for Builtin {
    async fn resolve(
        &self,
        raw: &str,
        guild: Option<&Guild>,
        key: &str,
        bounds: Bounds,
    ) -> Result<Value> {
        match self {
            Builtin::String => {
                bounds.check(key, raw.chars().count() as f64, "length")?;
                Ok(Value::String(raw.to_string()))
            }
            Builtin::Integer => {
                let number: i64 = raw
                    .trim()
                    .parse()
                    .map_err(|_| rejected(key, format!("'{}' is not an integer", raw)))?;
                bounds.check(key, number as f64, "value")?;
                Ok(Value::from(number))
            }
            Builtin::Float => {
                let number = raw
                    .trim()
                    .parse::<f64>()
                    .ok()
                    .and_then(Number::from_f64)
                    .ok_or_else(|| rejected(key, format!("'{}' is not a number", raw)))?;
                bounds.check(key, number.as_f64().unwrap_or(f64::NAN), "value")?;
                Ok(Value::Number(number))
            }
            Builtin::Boolean => {
                let word = raw.trim().to_lowercase();
                if TRUTHS.contains(&word.as_str()) {
                    Ok(Value::Bool(true))
                } else if FALSITIES.contains(&word.as_str()) {
                    Ok(Value::Bool(false))
                } else {
                    Err(rejected(key, format!("'{}' is not a boolean", raw)))
                }
            }
            Builtin::Any => Ok(Value::String(raw.to_string())),
            Builtin::User | Builtin::Channel | Builtin::Role => {
                let kind = match self {
                    Builtin::User => "user",
                    Builtin::Channel => "channel",
                    _ => "role",
                };
                let guild = guild
                    .ok_or_else(|| rejected(key, format!("a {} needs a guild to be resolved", kind)))?;
                guild
                    .find(kind, raw)
                    .map(|id| Value::String(id.to_string()))
                    .ok_or_else(|| rejected(key, format!("'{}' is not a known {}", raw, kind)))
            }
            Builtin::Guild => {
                let guild =
                    guild.ok_or_else(|| rejected(key, "a guild needs a guild to be resolved"))?;
                let raw = raw.trim();
                if raw == guild.id || raw.eq_ignore_ascii_case(&guild.name) {
                    Ok(Value::String(guild.id.clone()))
                } else {
                    Err(rejected(key, format!("'{}' is not this guild", raw)))
                }
            }
        }
    }
}

/// Type name to resolver mapping.
#[derive(Clone, Default)]
pub struct Resolvers {
    by_kind: HashMap<String, Arc<dyn Resolver>>,
}

impl Resolvers {
    pub fn empty() -> Self {
        Self::default()
    }
    pub fn builtin() -> Self {
        let mut resolvers = Self::empty();
        for (name, builtin) in Builtin::ALL {
            resolvers.register(name, Arc::new(builtin));
        }
        resolvers
    }
    pub fn register(&mut self, kind: &str, resolver: Arc<dyn Resolver>) {
        self.by_kind.insert(kind.to_lowercase(), resolver);
    }
    pub fn get(&self, kind: &str) -> Option<Arc<dyn Resolver>> {
        self.by_kind.get(&kind.to_lowercase()).cloned()
    }
    pub fn len(&self) -> usize {
        self.by_kind.len()
    }
    pub fn is_empty(&self) -> bool {
        self.by_kind.is_empty()
    }
}
