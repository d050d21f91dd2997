use thiserror::Error;

#[derive(Error, Debug)]
pub enum KeyfolderError {
    #[error("Invalid definition for '{path}' ({param}): {message}")]
    Definition { path: String, param: String, message: String },
    #[error("The key '{path}' already exists")]
    Duplicate { path: String },
    #[error("The key '{path}' does not exist")]
    NotFound { path: String },
    #[error("The key '{path}' is not a folder")]
    NotAFolder { path: String },
    #[error("The key '{path}' is a folder, not a key")]
    NotAKey { path: String },
    #[error("Invalid key name '{name}'")]
    InvalidName { name: String },
    #[error("The type '{kind}' for '{path}' is not supported")]
    UnsupportedType { path: String, kind: String },
    #[error("Could not resolve '{path}': {message}")]
    Resolution { path: String, message: String },
    #[error("Propagation error: {0}")]
    Propagation(String),
    #[error("Unknown propagation action '{0}'")]
    UnknownAction(String),
    #[error("Unsupported operation: {0}")]
    Unsupported(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Persistence error: {0}")]
    Persistence(String),
    #[error("Config error: {0}")]
    Config(String),
    #[error("Lock poisoned: {0}")]
    Lock(String),
}

pub type Result<T> = std::result::Result<T, KeyfolderError>;

impl KeyfolderError {
    pub(crate) fn definition(path: &str, param: &str, message: impl Into<String>) -> Self {
        Self::Definition {
            path: path.to_string(),
            param: param.to_string(),
            message: message.into(),
        }
    }
    /// True for errors raised before anything was mutated or written.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::Definition { .. }
                | Self::Duplicate { .. }
                | Self::NotFound { .. }
                | Self::NotAFolder { .. }
                | Self::NotAKey { .. }
                | Self::InvalidName { .. }
                | Self::UnsupportedType { .. }
        )
    }
}

// Helper conversions
impl From<rusqlite::Error> for KeyfolderError {
    fn from(e: rusqlite::Error) -> Self { Self::Persistence(e.to_string()) }
}
impl From<config::ConfigError> for KeyfolderError {
    fn from(e: config::ConfigError) -> Self { Self::Config(e.to_string()) }
}
