//! update_memory Tool
//!
//! Edit an existing root or node in place: content, links, and the flag
//! set (favorite/pinned/obsolete/active/secret/irrelevant).

use std::sync::Arc;

use grove_core::{Role, Store, UpdateInput};
use serde_json::Value;

use super::render_error;

pub fn schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "id": { "type": "string", "description": "Root or node ID to update" },
            "content": { "type": "string" },
            "links": { "type": "array", "items": { "type": "string" } },
            "obsolete": { "type": "boolean" },
            "favorite": { "type": "boolean" },
            "irrelevant": { "type": "boolean" },
            "pinned": { "type": "boolean" },
            "active": { "type": "boolean" },
            "secret": { "type": "boolean" },
            "curatorBypass": {
                "type": "boolean",
                "default": false,
                "description": "Lift the [✓ID] correction-marker requirement when setting obsolete=true"
            }
        },
        "required": ["id"]
    })
}

pub async fn execute(
    store: &Arc<Store>,
    caller_role: Role,
    args: Option<Value>,
) -> Result<Value, String> {
    let input: UpdateInput = match args {
        Some(v) => serde_json::from_value(v).map_err(|e| format!("Invalid arguments: {}", e))?,
        None => return Err("Missing arguments".to_string()),
    };

    let updated = store.update_node(input, caller_role).map_err(render_error)?;

    Ok(serde_json::json!({ "updated": updated }))
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

    fn write_one(store: &Arc<Store>, content: &str) -> String {
        let input = WriteInput {
            prefix: "E".to_string(),
            content: content.to_string(),
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
    async fn missing_arguments_fails() {
        let (store, _dir) = test_store();
        let result = execute(&store, Role::Al, None).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn updates_content_in_place() {
        let (store, _dir) = test_store();
        let id = write_one(&store, "Original");
        let args = serde_json::json!({ "id": id, "content": "Revised" });
        let result = execute(&store, Role::Al, Some(args)).await;
        assert!(result.is_ok());
        assert_eq!(result.unwrap()["updated"], true);
    }

    #[tokio::test]
    async fn worker_role_is_denied() {
        let (store, _dir) = test_store();
        let id = write_one(&store, "Original");
        let args = serde_json::json!({ "id": id, "content": "Revised" });
        let result = execute(&store, Role::Worker, Some(args)).await;
        assert!(result.is_err());
        assert!(result.unwrap_err().contains("role_denied"));
    }

    #[tokio::test]
    async fn obsolete_without_correction_marker_fails() {
        let (store, _dir) = test_store();
        let id = write_one(&store, "Stale fact");
        let args = serde_json::json!({ "id": id, "obsolete": true });
        let result = execute(&store, Role::Al, Some(args)).await;
        assert!(result.is_err());
        assert!(result.unwrap_err().contains("missing_correction_ref"));
    }
}
