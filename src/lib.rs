//! Keyfolder – a self-describing, hierarchical settings schema for per-guild configuration.
//!
//! A schema is a tree of *folders* holding *keys*:
//! * A [`folder::Folder`] is a named container of further folders and keys, kept in name order.
//! * A [`field::Field`] (a key) describes one value: its type name, whether it is a list,
//!   its default, optional `min`/`max` bounds and whether end users may configure it.
//!
//! The tree derives everything the persistence layer needs from itself: the JSON
//! definition it is saved as, the flat list of dotted key paths, the nested defaults
//! object and the column definitions for a relational table.
//!
//! ## Modules
//! * [`datatype`] – the registry of type names, SQL typing and literal escaping.
//! * [`field`] – keys and the typed options they are built from.
//! * [`folder`] – folders, tree walking, mutation and derivations.
//! * [`resolver`] – the [`resolver::Resolver`] trait turning raw input into values.
//! * [`cache`] – the in-memory record cache consulted during propagation.
//! * [`persist`] – the atomic schema file and the SQLite [`persist::StorageProvider`].
//! * [`schema`] – [`schema::Schema`], which sequences mutation, file write and propagation.
//! * [`settings`] – configuration for the `keyfolder` binary.
//!
//! ## Persisted shape
//! The root and every folder carry `"type": "Folder"`; every key carries
//! `type`, `array`, `default`, `min`, `max` and `configurable`. Nested objects
//! without a `type` come from older files and are read as folders.
//!
//! ## Quick Start
//! ```
//! use serde_json::json;
//! use keyfolder::{field::FieldOptions, folder::Folder, datatype::TypeRegistry};
//! let registry = TypeRegistry::builtin();
//! let mut root = Folder::root();
//! root.insert_folder("guild", &json!({})).unwrap();
//! root.folder_mut("guild").unwrap()
//!     .insert_key("prefix", FieldOptions::new("string").default_value("!"), &registry)
//!     .unwrap();
//! assert_eq!(root.key_paths(), vec!["guild.prefix"]);
//! assert_eq!(root.defaults()["guild"], json!({ "prefix": "!" }));
//! ```
//!
//! ## Concurrency
//! Mutations on a [`schema::Schema`] take `&mut self` and await only the schema
//! file write and the storage provider. Concurrent callers must serialize access
//! themselves.

pub mod cache;
pub mod datatype;
pub mod error;
pub mod field;
pub mod folder;
pub mod persist;
pub mod resolver;
pub mod schema;
pub mod settings;

pub use error::{KeyfolderError, Result};
