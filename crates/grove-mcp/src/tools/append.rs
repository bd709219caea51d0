//! append_memory Tool
//!
//! Add indented children under an existing root or node, continuing its
//! sibling sequence.

use std::sync::Arc;

use grove_core::{Role, Store};
use serde::Deserialize;
use serde_json::Value;

use super::render_error;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct Args {
    parent_id: String,
    content: String,
}

pub fn schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "parentId": {
                "type": "string",
                "description": "Root or node ID to append children under"
            },
            "content": {
                "type": "string",
                "description": "Tab-indented content, relative to the parent's depth"
            }
        },
        "required": ["parentId", "content"]
    })
}

pub async fn execute(
    store: &Arc<Store>,
    caller_role: Role,
    args: Option<Value>,
) -> Result<Value, String> {
    if caller_role < Role::write_floor() {
        return Err(format!(
            "role_denied: {} cannot append to the shared store",
            caller_role
        ));
    }
    let args: Args = match args {
        Some(v) => serde_json::from_value(v).map_err(|e| format!("Invalid arguments: {}", e))?,
        None => return Err("Missing arguments".to_string()),
    };

    let (count, ids) = store
        .append_children(&args.parent_id, &args.content, caller_role)
        .map_err(render_error)?;

    Ok(serde_json::json!({
        "appended": count,
        "ids": ids,
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

    fn write_one(store: &Arc<Store>) -> String {
        let input = WriteInput {
            prefix: "E".to_string(),
            content: "Root entry".to_string(),
            links: vec![],
            min_role: None,
            favorite: false,
            pinned: false,
            active: true,
            secret: false,
            tags: vec![],
        };
        store.write(input, Role::Al).unwrap().0
    }

    #[tokio::test]
    async fn worker_role_is_denied() {
        let (store, _dir) = test_store();
        let id = write_one(&store);
        let args = serde_json::json!({ "parentId": id, "content": "New child" });
        let result = execute(&store, Role::Worker, Some(args)).await;
        assert!(result.is_err());
        assert!(result.unwrap_err().contains("role_denied"));
    }

    #[tokio::test]
    async fn appends_children_under_root() {
        let (store, _dir) = test_store();
        let id = write_one(&store);
        let args = serde_json::json!({ "parentId": id, "content": "\tFirst child\n\tSecond child" });
        let result = execute(&store, Role::Al, Some(args)).await;
        assert!(result.is_ok());
        let value = result.unwrap();
        assert_eq!(value["appended"], 2);
        assert_eq!(value["ids"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn missing_parent_errors() {
        let (store, _dir) = test_store();
        let args = serde_json::json!({ "parentId": "E9999", "content": "orphan" });
        let result = execute(&store, Role::Al, Some(args)).await;
        assert!(result.is_err());
        assert!(result.unwrap_err().contains("not_found"));
    }
}
