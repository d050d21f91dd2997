use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use keyfolder::cache::MemoryCache;
use keyfolder::field::FieldOptions;
use keyfolder::persist::{SchemaFile, SqliteProvider, StorageProvider, WriteOptions};
use keyfolder::resolver::Guild;
use keyfolder::schema::{ForceAction, Schema, SchemaOptions};
use keyfolder::{KeyfolderError, Result};
use serde_json::{Value, json};

// Scratch directory per test, as the file-backed persistence tests do.
fn scratch(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("keyfolder_{}_{}", name, std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    dir
}

fn on_disk(schema: &Schema) -> Value {
    let text = std::fs::read_to_string(schema.file().path()).expect("schema file");
    serde_json::from_str(&text).expect("json")
}

async fn open(dir: &Path, provider: Arc<dyn StorageProvider>, cache: Arc<MemoryCache>) -> Schema {
    Schema::load(
        SchemaFile::new(dir.join("schema.json")),
        provider,
        cache,
        SchemaOptions::default(),
    )
    .await
    .expect("schema")
}

struct Unreachable;

#[async_trait]
impl StorageProvider for Unreachable {
    async fn update_value(&self, _dataset: &str, _path: &str, _value: &Value, _options: WriteOptions) -> Result<()> {
        Err(KeyfolderError::Persistence("connection refused".to_string()))
    }
    async fn remove_value(&self, _dataset: &str, _path: &str, _options: WriteOptions) -> Result<()> {
        Err(KeyfolderError::Persistence("connection refused".to_string()))
    }
}

#[tokio::test]
async fn missing_files_start_as_an_empty_root() {
    let dir = scratch("empty");
    let schema = open(&dir, Arc::new(SqliteProvider::open_in_memory().expect("db")), Arc::new(MemoryCache::new())).await;
    assert!(schema.root().is_empty());
    assert_eq!(on_disk(&schema), json!({ "type": "Folder" }));
    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn keys_are_added_through_their_folder() {
    let dir = scratch("scenario");
    let provider = Arc::new(SqliteProvider::open_in_memory().expect("db"));
    let mut schema = open(&dir, provider, Arc::new(MemoryCache::new())).await;

    schema.at("").expect("root").add_folder("guild", json!({}), false).await.expect("folder");
    let err = schema
        .add_key("", "guild.prefix", FieldOptions::new("string").default_value("!"), true)
        .await
        .unwrap_err();
    assert!(err.is_precondition());

    let mut guild = schema.at("guild").expect("guild");
    assert_eq!(guild.path(), "guild");
    let root = guild
        .add_key("prefix", FieldOptions::new("string").default_value("!"), true)
        .await
        .expect("key");
    assert_eq!(root.key_paths(), vec!["guild.prefix"]);
    assert_eq!(schema.default_of("guild.prefix").expect("default").data, json!("!"));
    assert_eq!(on_disk(&schema), schema.to_json());
    assert_eq!(on_disk(&schema)["guild"]["prefix"]["default"], json!("!"));

    assert!(matches!(schema.at("nowhere"), Err(KeyfolderError::NotFound { .. })));
    assert!(matches!(schema.at("guild.prefix"), Err(KeyfolderError::NotAFolder { .. })));
    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn reloading_gives_back_the_same_tree() {
    let dir = scratch("reload");
    let provider = Arc::new(SqliteProvider::open_in_memory().expect("db"));
    let mut schema = open(&dir, provider.clone(), Arc::new(MemoryCache::new())).await;
    schema
        .add_folder("", "music", json!({ "volume": { "type": "integer", "default": 50, "min": 0, "max": 100 } }), false)
        .await
        .expect("folder");
    schema
        .add_key("", "roles", FieldOptions::new("role").array(true), false)
        .await
        .expect("key");
    let reloaded = open(&dir, provider, Arc::new(MemoryCache::new())).await;
    assert_eq!(reloaded.root(), schema.root());
    assert_eq!(reloaded.key_paths(), vec!["music.volume", "roles"]);
    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn failed_preconditions_write_nothing() {
    let dir = scratch("preconditions");
    let provider = Arc::new(SqliteProvider::open_in_memory().expect("db"));
    let mut schema = open(&dir, provider, Arc::new(MemoryCache::new())).await;
    schema.add_key("", "prefix", FieldOptions::new("string"), false).await.expect("key");
    let before = on_disk(&schema);

    let attempts = [
        schema.add_key("", "prefix", FieldOptions::new("string"), true).await.map(|_| ()),
        schema.add_key("", "when", FieldOptions::new("timestamp"), true).await.map(|_| ()),
        schema.remove_key("", "missing", true).await.map(|_| ()),
        schema.remove_folder("", "prefix", true).await.map(|_| ()),
        schema.add_key("", "ids", FieldOptions::new("user").array(true).default_value("1"), true).await.map(|_| ()),
    ];
    for attempt in attempts {
        let err = attempt.unwrap_err();
        assert!(err.is_precondition(), "{err}");
    }
    assert_eq!(on_disk(&schema), before);
    assert!(!dir.join("schema.json.tmp").exists());
    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn added_keys_reach_cached_and_stored_records() {
    let dir = scratch("propagate_add");
    let provider = Arc::new(SqliteProvider::open_in_memory().expect("db"));
    provider.insert_record("guilds", "1", &json!({ "guild": { "prefix": "?" } })).expect("insert");
    let cache = Arc::new(MemoryCache::new());
    cache.insert("guilds", json!({ "guild": { "prefix": "?" } })).expect("cache");
    cache.insert("guilds", json!({})).expect("cache");
    let mut schema = open(&dir, provider.clone(), cache.clone()).await;
    schema.add_folder("", "guild", json!({}), false).await.expect("folder");

    schema
        .add_key("guild", "language", FieldOptions::new("language").default_value("en-US"), true)
        .await
        .expect("key");

    let records = cache.records("guilds").expect("records");
    assert_eq!(Value::Object(records[0].clone()), json!({ "guild": { "prefix": "?", "language": "en-US" } }));
    assert_eq!(Value::Object(records[1].clone()), json!({ "guild": { "language": "en-US" } }));
    assert_eq!(
        provider.document("guilds", "1").expect("read"),
        Some(json!({ "guild": { "prefix": "?", "language": "en-US" } }))
    );

    schema.add_key("guild", "prefix", FieldOptions::new("string"), false).await.expect("key");
    let records = cache.records("guilds").expect("records");
    assert_eq!(records[0]["guild"]["prefix"], json!("?"));
    assert!(records[1]["guild"].get("prefix").is_none(), "not propagated");

    schema.remove_key("guild", "prefix", true).await.expect("remove");
    let records = cache.records("guilds").expect("records");
    assert!(records.iter().all(|record| record["guild"].get("prefix").is_none()));
    assert_eq!(
        provider.document("guilds", "1").expect("read"),
        Some(json!({ "guild": { "language": "en-US" } }))
    );
    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn provider_failures_leave_the_schema_ahead() {
    let dir = scratch("propagate_fail");
    let cache = Arc::new(MemoryCache::new());
    cache.insert("guilds", json!({})).expect("cache");
    let mut schema = open(&dir, Arc::new(Unreachable), cache.clone()).await;

    let err = schema
        .add_key("", "prefix", FieldOptions::new("string").default_value("!"), true)
        .await
        .unwrap_err();
    assert!(matches!(err, KeyfolderError::Propagation(_)), "{err}");
    assert!(!err.is_precondition());
    assert_eq!(schema.key_paths(), vec!["prefix"]);
    assert_eq!(on_disk(&schema)["prefix"]["default"], json!("!"));
    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn folder_propagation_is_refused_after_the_write() {
    let dir = scratch("propagate_many");
    let provider = Arc::new(SqliteProvider::open_in_memory().expect("db"));
    let mut schema = open(&dir, provider, Arc::new(MemoryCache::new())).await;

    let err = schema.add_folder("", "music", json!({}), true).await.unwrap_err();
    assert!(matches!(err, KeyfolderError::Unsupported(_)));
    assert!(schema.root().folder("music").is_some());
    assert_eq!(on_disk(&schema)["music"], json!({ "type": "Folder" }));

    let err = schema.remove_folder("", "music", true).await.unwrap_err();
    assert!(matches!(err, KeyfolderError::Unsupported(_)));
    assert!(schema.root().is_empty());
    assert_eq!(on_disk(&schema), json!({ "type": "Folder" }));

    let root = schema.root().clone();
    assert!(matches!(
        schema.force_many(ForceAction::Edit, &root).await,
        Err(KeyfolderError::UnknownAction(_))
    ));
    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn removing_a_folder_removes_its_keys() {
    let dir = scratch("remove_folder");
    let provider = Arc::new(SqliteProvider::open_in_memory().expect("db"));
    let mut schema = open(&dir, provider, Arc::new(MemoryCache::new())).await;
    schema
        .add_folder("", "mod", json!({ "log": { "type": "channel" }, "roles": { "type": "role", "array": true } }), false)
        .await
        .expect("folder");
    schema.add_key("", "prefix", FieldOptions::new("string"), false).await.expect("key");
    schema.remove_folder("", "mod", false).await.expect("remove");
    assert_eq!(schema.key_paths(), vec!["prefix"]);
    assert!(schema.key_paths().iter().all(|path| !path.starts_with("mod.")));
    assert_eq!(Value::Object(schema.defaults()), json!({ "prefix": null }));
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn actions_parse_from_their_names() {
    assert_eq!("add".parse::<ForceAction>().expect("add"), ForceAction::Add);
    assert_eq!("edit".parse::<ForceAction>().expect("edit"), ForceAction::Edit);
    assert_eq!("delete".parse::<ForceAction>().expect("delete"), ForceAction::Delete);
    assert!(matches!("rename".parse::<ForceAction>(), Err(KeyfolderError::UnknownAction(_))));
}

#[tokio::test]
async fn relational_schemas_hand_out_fragments() {
    let dir = scratch("relational");
    let provider = Arc::new(SqliteProvider::open_in_memory().expect("db"));
    let options = SchemaOptions { relational: true, ..SchemaOptions::default() };
    let mut schema = Schema::load(
        SchemaFile::new(dir.join("schema.json")),
        provider.clone(),
        Arc::new(MemoryCache::new()),
        options,
    )
    .await
    .expect("schema");
    schema.add_key("", "owner", FieldOptions::new("user"), false).await.expect("key");
    schema.add_key("", "nick", FieldOptions::new("string").default_value("O'Brien"), false).await.expect("key");
    provider.sync_columns(schema.dataset(), &schema.relational_columns()).expect("columns");
    provider.insert_record("guilds", "1", &json!({})).expect("insert");

    let guild = Guild::new("1", "Lounge").with_user("200", "ana");
    let parsed = schema.parse("owner", "ana", Some(&guild)).await.expect("parse");
    assert_eq!(parsed.data, json!("200"));
    assert_eq!(parsed.fragment.as_deref(), Some("'owner' = '200'"));
    assert_eq!(schema.default_of("nick").expect("default").fragment.as_deref(), Some("'nick' = 'O''Brien'"));
    assert!(matches!(schema.parse("missing", "x", None).await, Err(KeyfolderError::NotFound { .. })));

    let field = schema.root().field("nick").expect("nick").clone();
    schema.force(ForceAction::Edit, &field).await.expect("force");
    assert_eq!(provider.column("guilds", "1", "nick").expect("read"), Some(json!("O'Brien")));
    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn relational_keys_reach_stored_rows() {
    let dir = scratch("relational_add");
    let provider = Arc::new(SqliteProvider::open_in_memory().expect("db"));
    provider.insert_record("guilds", "1", &json!({})).expect("insert");
    provider.insert_record("guilds", "2", &json!({})).expect("insert");
    let options = SchemaOptions { relational: true, ..SchemaOptions::default() };
    let mut schema = Schema::load(
        SchemaFile::new(dir.join("schema.json")),
        provider.clone(),
        Arc::new(MemoryCache::new()),
        options,
    )
    .await
    .expect("schema");
    provider.sync_columns(schema.dataset(), &schema.relational_columns()).expect("columns");

    schema
        .add_key("", "prefix", FieldOptions::new("string").default_value("!"), true)
        .await
        .expect("key");
    schema.add_folder("", "stats", json!({}), false).await.expect("folder");
    schema
        .add_key("stats", "count", FieldOptions::new("integer").default_value(5), true)
        .await
        .expect("nested key");

    for id in ["1", "2"] {
        assert_eq!(provider.column("guilds", id, "prefix").expect("read"), Some(json!("!")));
        assert_eq!(provider.column("guilds", id, "stats.count").expect("read"), Some(json!(5)));
    }

    schema.remove_key("", "prefix", true).await.expect("remove");
    assert!(!provider.column_names("guilds").expect("names").contains(&"prefix".to_string()));
    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn scalars_in_the_way_of_a_folder_are_replaced() {
    let dir = scratch("scalar_container");
    let provider = Arc::new(SqliteProvider::open_in_memory().expect("db"));
    let cache = Arc::new(MemoryCache::new());
    cache.insert("guilds", json!({ "guild": "legacy" })).expect("cache");
    let mut schema = open(&dir, provider, cache.clone()).await;
    schema.add_folder("", "guild", json!({}), false).await.expect("folder");
    schema
        .add_key("guild", "prefix", FieldOptions::new("string").default_value("!"), true)
        .await
        .expect("key");
    let records = cache.records("guilds").expect("records");
    assert_eq!(Value::Object(records[0].clone()), json!({ "guild": { "prefix": "!" } }));
    let _ = std::fs::remove_dir_all(&dir);
}
