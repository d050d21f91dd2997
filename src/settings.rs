// config lets the binary read a separate settings file, overlaid by KEYFOLDER_* variables
use std::path::{Path, PathBuf};

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Where the schema definition lives.
    pub schema_file: PathBuf,
    /// SQLite database holding the records, `:memory:` for a scratch database.
    pub database: String,
    pub dataset: String,
    pub relational: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            schema_file: PathBuf::from("schema.json"),
            database: ":memory:".to_string(),
            dataset: "guilds".to_string(),
            relational: false,
        }
    }
}

impl Settings {
    /// Reads `file` when given (it must then exist), otherwise an optional
    /// `keyfolder.*` next to the working directory.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let source = match file {
            Some(path) => File::from(path).required(true),
            None => File::with_name("keyfolder").required(false),
        };
        let settings = Config::builder()
            .add_source(source)
            .add_source(Environment::with_prefix("KEYFOLDER").try_parsing(true))
            .build()?
            .try_deserialize()?;
        Ok(settings)
    }
}
