//! search_memory Tool
//!
//! Full-text search across root entries, respecting role visibility.

use std::sync::Arc;

use grove_core::{ReadOptions, Role, Store};
use serde_json::Value;

use super::render_error;

pub fn schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "query": { "type": "string", "description": "Search text" },
            "prefix": { "type": "string", "description": "Restrict results to a single prefix letter" },
            "limit": { "type": "integer", "minimum": 1 },
            "followObsolete": { "type": "boolean", "default": true },
            "showObsoletePath": { "type": "boolean", "default": false },
            "showObsolete": { "type": "boolean", "default": false },
            "linkDepth": { "type": "integer", "default": 1, "minimum": 0 }
        },
        "required": ["query"]
    })
}

pub async fn execute(
    store: &Arc<Store>,
    caller_role: Role,
    args: Option<Value>,
) -> Result<Value, String> {
    let value = match args {
        Some(v) => v,
        None => return Err("Missing arguments".to_string()),
    };
    let opts: ReadOptions =
        serde_json::from_value(value).map_err(|e| format!("Invalid arguments: {}", e))?;
    let query = opts
        .query
        .clone()
        .ok_or_else(|| "Invalid arguments: missing field `query`".to_string())?;
    if query.trim().is_empty() {
        return Err("Query cannot be empty".to_string());
    }

    let results = store
        .search(&query, &opts, caller_role)
        .map_err(render_error)?;

    Ok(serde_json::json!({
        "query": query,
        "total": results.len(),
        "results": results,
    }))
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
    async fn empty_query_fails() {
        let (store, _dir) = test_store();
        let args = serde_json::json!({ "query": "" });
        let result = execute(&store, Role::Al, Some(args)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn basic_search_succeeds() {
        let (store, _dir) = test_store();
        store
            .write(
                WriteInput {
                    prefix: "E".to_string(),
                    content: "A note about rust ownership".to_string(),
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

        let args = serde_json::json!({ "query": "ownership" });
        let result = execute(&store, Role::Al, Some(args)).await;
        assert!(result.is_ok());
        let value = result.unwrap();
        assert_eq!(value["query"], "ownership");
        assert!(value["total"].is_number());
    }
}
