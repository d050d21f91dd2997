//! `keyfolder` – inspect and reshape a settings schema from the command line.
//!
//! ```text
//! keyfolder show | keys | defaults | columns
//! keyfolder add-folder <folder> <name>
//! keyfolder remove-folder <folder> <name>
//! keyfolder add-key <folder> <name> <type> [default-json]
//! keyfolder remove-key <folder> <name>
//! ```
//! `<folder>` is a dotted path, `.` for the root. Settings come from an optional
//! `keyfolder.*` file and `KEYFOLDER_*` environment variables (see `Settings`).
use std::process::ExitCode;
use std::sync::Arc;

use serde_json::Value;
use tracing::error;
use tracing_subscriber::EnvFilter;

use keyfolder::cache::MemoryCache;
use keyfolder::field::FieldOptions;
use keyfolder::persist::{SchemaFile, SqliteProvider};
use keyfolder::schema::{Schema, SchemaOptions};
use keyfolder::settings::Settings;
use keyfolder::{KeyfolderError, Result};

const USAGE: &str = "usage: keyfolder <show|keys|defaults|columns|add-folder|remove-folder|add-key|remove-key> [args]";

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();
    let args: Vec<String> = std::env::args().skip(1).collect();
    match run(&args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "command failed");
            ExitCode::FAILURE
        }
    }
}

fn folder_arg(arg: &str) -> &str {
    if arg == "." { "" } else { arg }
}

fn arg<'a>(args: &'a [String], index: usize) -> Result<&'a str> {
    args.get(index)
        .map(String::as_str)
        .ok_or_else(|| KeyfolderError::Config(USAGE.to_string()))
}

async fn run(args: &[String]) -> Result<()> {
    let settings = Settings::load(None)?;
    let provider = if settings.database == ":memory:" {
        SqliteProvider::open_in_memory()?
    } else {
        SqliteProvider::open(&settings.database)?
    };
    let provider = Arc::new(provider);
    provider.ensure_dataset(&settings.dataset)?;
    let options = SchemaOptions {
        dataset: settings.dataset.clone(),
        relational: settings.relational,
        ..SchemaOptions::default()
    };
    let mut schema = Schema::load(
        SchemaFile::new(&settings.schema_file),
        provider,
        Arc::new(MemoryCache::new()),
        options,
    )
    .await?;

    match arg(args, 0)? {
        "show" => println!("{}", serde_json::to_string_pretty(&schema.to_json())?),
        "keys" => {
            for path in schema.key_paths() {
                println!("{}", path);
            }
        }
        "defaults" => println!("{}", serde_json::to_string_pretty(&schema.defaults())?),
        "columns" => {
            for (name, definition) in schema.relational_columns() {
                println!("{} {}", name, definition);
            }
        }
        "add-folder" => {
            schema
                .add_folder(folder_arg(arg(args, 1)?), arg(args, 2)?, Value::Object(Default::default()), false)
                .await?;
        }
        "remove-folder" => {
            schema.remove_folder(folder_arg(arg(args, 1)?), arg(args, 2)?, false).await?;
        }
        "add-key" => {
            let mut field = FieldOptions::new(arg(args, 3)?);
            if let Some(default) = args.get(4) {
                field = field.default_value(serde_json::from_str::<Value>(default)?);
            }
            schema.add_key(folder_arg(arg(args, 1)?), arg(args, 2)?, field, true).await?;
        }
        "remove-key" => {
            schema.remove_key(folder_arg(arg(args, 1)?), arg(args, 2)?, true).await?;
        }
        _ => return Err(KeyfolderError::Config(USAGE.to_string())),
    }
    Ok(())
}
