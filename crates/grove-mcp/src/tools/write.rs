//! write_memory Tool
//!
//! Create a new root entry in the shared store.

use std::sync::Arc;

use grove_core::{Role, Store, WriteInput};
use serde_json::Value;

use super::render_error;

pub fn schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "prefix": {
                "type": "string",
                "description": "Single-letter prefix declared in the store's configuration"
            },
            "content": {
                "type": "string",
                "description": "Tab-indented content; the first line becomes the title and depth-1 body"
            },
            "links": {
                "type": "array",
                "items": { "type": "string" },
                "description": "IDs of related entries or nodes"
            },
            "minRole": {
                "type": "string",
                "enum": ["worker", "al", "pl", "ceo"],
                "description": "Minimum caller role able to see this entry"
            },
            "favorite": { "type": "boolean" },
            "pinned": { "type": "boolean" },
            "active": { "type": "boolean", "default": true },
            "secret": { "type": "boolean" },
            "tags": {
                "type": "array",
                "items": { "type": "string" }
            }
        },
        "required": ["prefix", "content"]
    })
}

pub async fn execute(
    store: &Arc<Store>,
    caller_role: Role,
    args: Option<Value>,
) -> Result<Value, String> {
    let input: WriteInput = match args {
        Some(v) => serde_json::from_value(v).map_err(|e| format!("Invalid arguments: {}", e))?,
        None => return Err("Missing arguments".to_string()),
    };

    let (id, created_at) = store.write(input, caller_role).map_err(render_error)?;

    Ok(serde_json::json!({
        "id": id,
        "createdAt": created_at.to_rfc3339(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use grove_core::Config;
    use tempfile::TempDir;

    fn test_store() -> (Arc<Store>, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = Store::open(Some(dir.path().join("test.db")), Config::default()).unwrap();
        (Arc::new(store), dir)
    }

    #[tokio::test]
    async fn missing_arguments_fails() {
        let (store, _dir) = test_store();
        let result = execute(&store, Role::Al, None).await;
        assert!(result.is_err());
        assert!(result.unwrap_err().contains("Missing arguments"));
    }

    #[tokio::test]
    async fn worker_role_is_denied() {
        let (store, _dir) = test_store();
        let args = serde_json::json!({ "prefix": "E", "content": "Title line" });
        let result = execute(&store, Role::Worker, Some(args)).await;
        assert!(result.is_err());
        assert!(result.unwrap_err().contains("role_denied"));
    }

    #[tokio::test]
    async fn basic_write_succeeds() {
        let (store, _dir) = test_store();
        let args = serde_json::json!({ "prefix": "E", "content": "A new memory" });
        let result = execute(&store, Role::Al, Some(args)).await;
        assert!(result.is_ok());
        let value = result.unwrap();
        assert!(value["id"].as_str().unwrap().starts_with('E'));
        assert!(value["createdAt"].is_string());
    }
}
