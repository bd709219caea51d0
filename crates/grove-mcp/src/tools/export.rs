//! export_memory Tool
//!
//! Two export shapes: a deterministic Markdown rendering (default), or a
//! native SQLite-to-SQLite copy with secret rows stripped, written to
//! `destPath`.

use std::path::PathBuf;
use std::sync::Arc;

use grove_core::{Role, Store};
use serde::Deserialize;
use serde_json::Value;

use super::render_error;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct Args {
    #[serde(default)]
    format: Format,
    dest_path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Format {
    #[default]
    Markdown,
    Native,
}

pub fn schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "format": {
                "type": "string",
                "enum": ["markdown", "native"],
                "default": "markdown"
            },
            "destPath": {
                "type": "string",
                "description": "Required when format is 'native': where to write the stripped copy"
            }
        }
    })
}

pub async fn execute(
    store: &Arc<Store>,
    _caller_role: Role,
    args: Option<Value>,
) -> Result<Value, String> {
    let args: Args = match args {
        Some(v) => serde_json::from_value(v).map_err(|e| format!("Invalid arguments: {}", e))?,
        None => Args { format: Format::Markdown, dest_path: None },
    };

    match args.format {
        Format::Markdown => {
            let markdown = store.export_markdown().map_err(render_error)?;
            Ok(serde_json::json!({ "format": "markdown", "content": markdown }))
        }
        Format::Native => {
            let dest = args
                .dest_path
                .ok_or_else(|| "destPath is required for format='native'".to_string())?;
            store.export_native(&dest).map_err(render_error)?;
            Ok(serde_json::json!({
                "format": "native",
                "destPath": dest.display().to_string(),
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grove_core::{Config, WriteInput};
    use tempfile::TempDir;

    fn test_store() -> (Arc<Store>, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = Store::open(Some(dir.path().join("test.db")), Config::default()).unwrap();
        (Arc::new(store), dir)
    }

    #[tokio::test]
    async fn defaults_to_markdown() {
        let (store, _dir) = test_store();
        store
            .write(
                WriteInput {
                    prefix: "E".to_string(),
                    content: "A memory".to_string(),
                    links: vec![],
                    min_role: None,
                    favorite: false,
                    pinned: false,
                    active: true,
                    secret: false,
                    tags: vec![],
                },
                Role::Al,
            )
            .unwrap();
        let result = execute(&store, Role::Al, None).await;
        assert!(result.is_ok());
        let value = result.unwrap();
        assert_eq!(value["format"], "markdown");
        assert!(value["content"].as_str().unwrap().contains("A memory"));
    }

    #[tokio::test]
    async fn native_requires_dest_path() {
        let (store, _dir) = test_store();
        let args = serde_json::json!({ "format": "native" });
        let result = execute(&store, Role::Al, Some(args)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn native_writes_a_stripped_copy() {
        let (store, dir) = test_store();
        let dest = dir.path().join("export.db");
        let args = serde_json::json!({ "format": "native", "destPath": dest.to_str().unwrap() });
        let result = execute(&store, Role::Al, Some(args)).await;
        assert!(result.is_ok());
        assert!(dest.exists());
    }
}
