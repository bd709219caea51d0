//! read_agent_memory / fix_agent_memory / append_agent_memory /
//! delete_agent_memory Tools
//!
//! Curator-only variants of the plain memory tools. Every call here
//! requires [`Role::Ceo`] and registers the named agent into the audit
//! queue ([`super::audit`]) on first touch, independent of the caller's
//! own identity.

use std::sync::Arc;

use grove_core::{IdReadResult, ReadOptions, Role, SessionCache, Store, UpdateInput};
use serde::Deserialize;
use serde_json::Value;

use super::render_error;

fn require_ceo(caller_role: Role) -> Result<(), String> {
    if caller_role < Role::Ceo {
        return Err(format!("role_denied: {} does not have curator clearance", caller_role));
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReadArgs {
    agent: String,
    #[serde(flatten)]
    opts: ReadOptions,
}

pub fn read_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "agent": { "type": "string", "description": "Agent identifier this audit applies to" },
            "id": { "type": "string" },
            "prefix": { "type": "string" },
            "limit": { "type": "integer", "minimum": 1 },
            "followObsolete": { "type": "boolean", "default": true },
            "showObsoletePath": { "type": "boolean", "default": false },
            "showObsolete": { "type": "boolean", "default": false },
            "linkDepth": { "type": "integer", "default": 1, "minimum": 0 }
        },
        "required": ["agent"]
    })
}

pub async fn execute_read(
    store: &Arc<Store>,
    caller_role: Role,
    session: &mut SessionCache,
    args: Option<Value>,
) -> Result<Value, String> {
    require_ceo(caller_role)?;
    let args: ReadArgs = match args {
        Some(v) => serde_json::from_value(v).map_err(|e| format!("Invalid arguments: {}", e))?,
        None => return Err("Missing arguments".to_string()),
    };
    store.touch_agent(&args.agent).map_err(render_error)?;

    let mut value = match &args.opts.id {
        Some(id) => {
            let result = store
                .read_id(id, &args.opts, Role::Ceo)
                .map_err(render_error)?;
            match result {
                IdReadResult::Root(view) => serde_json::to_value(&view).map_err(|e| e.to_string())?,
                IdReadResult::Node(view) => serde_json::to_value(&view).map_err(|e| e.to_string())?,
            }
        }
        None => {
            let result = store
                .read_bulk(&args.opts, Role::Ceo, session)
                .map_err(render_error)?;
            serde_json::json!({
                "groups": result.groups.iter().map(|g| serde_json::json!({
                    "prefix": g.prefix.to_string(),
                    "headerTitle": g.header_title,
                    "expanded": g.expanded,
                })).collect::<Vec<_>>(),
                "obsoleteTail": result.obsolete_tail,
                "obsoleteHidden": result.obsolete_hidden,
            })
        }
    };
    if let Some(obj) = value.as_object_mut() {
        obj.insert("agent".to_string(), serde_json::json!(args.agent));
    }
    Ok(value)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FixArgs {
    agent: String,
    #[serde(flatten)]
    update: UpdateInput,
}

pub fn fix_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "agent": { "type": "string" },
            "id": { "type": "string" },
            "content": { "type": "string" },
            "links": { "type": "array", "items": { "type": "string" } },
            "obsolete": { "type": "boolean" },
            "favorite": { "type": "boolean" },
            "irrelevant": { "type": "boolean" },
            "pinned": { "type": "boolean" },
            "active": { "type": "boolean" },
            "secret": { "type": "boolean" }
        },
        "required": ["agent", "id"]
    })
}

pub async fn execute_fix(
    store: &Arc<Store>,
    caller_role: Role,
    args: Option<Value>,
) -> Result<Value, String> {
    require_ceo(caller_role)?;
    let mut args: FixArgs = match args {
        Some(v) => serde_json::from_value(v).map_err(|e| format!("Invalid arguments: {}", e))?,
        None => return Err("Missing arguments".to_string()),
    };
    store.touch_agent(&args.agent).map_err(render_error)?;
    args.update.curator_bypass = true;

    let updated = store
        .update_node(args.update, Role::Ceo)
        .map_err(render_error)?;
    Ok(serde_json::json!({ "agent": args.agent, "updated": updated }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct AppendArgs {
    agent: String,
    parent_id: String,
    content: String,
}

pub fn append_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "agent": { "type": "string" },
            "parentId": { "type": "string" },
            "content": { "type": "string" }
        },
        "required": ["agent", "parentId", "content"]
    })
}

pub async fn execute_append(
    store: &Arc<Store>,
    caller_role: Role,
    args: Option<Value>,
) -> Result<Value, String> {
    require_ceo(caller_role)?;
    let args: AppendArgs = match args {
        Some(v) => serde_json::from_value(v).map_err(|e| format!("Invalid arguments: {}", e))?,
        None => return Err("Missing arguments".to_string()),
    };
    store.touch_agent(&args.agent).map_err(render_error)?;

    let (count, ids) = store
        .append_children(&args.parent_id, &args.content, Role::Ceo)
        .map_err(render_error)?;
    Ok(serde_json::json!({ "agent": args.agent, "appended": count, "ids": ids }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct DeleteArgs {
    agent: String,
    id: String,
}

pub fn delete_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "agent": { "type": "string" },
            "id": { "type": "string", "description": "Root ID to delete; compound node IDs are rejected" }
        },
        "required": ["agent", "id"]
    })
}

pub async fn execute_delete(
    store: &Arc<Store>,
    caller_role: Role,
    args: Option<Value>,
) -> Result<Value, String> {
    require_ceo(caller_role)?;
    let args: DeleteArgs = match args {
        Some(v) => serde_json::from_value(v).map_err(|e| format!("Invalid arguments: {}", e))?,
        None => return Err("Missing arguments".to_string()),
    };
    store.touch_agent(&args.agent).map_err(render_error)?;

    let deleted = store.delete(&args.id).map_err(render_error)?;
    Ok(serde_json::json!({ "agent": args.agent, "deleted": deleted }))
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
        store
            .write(
                WriteInput {
                    prefix: "E".to_string(),
                    content: "Root entry".to_string(),
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
            .unwrap()
            .0
    }

    #[tokio::test]
    async fn pl_role_is_denied_on_every_curator_tool() {
        let (store, _dir) = test_store();
        let mut session = SessionCache::new();
        let args = serde_json::json!({ "agent": "a1" });
        assert!(execute_read(&store, Role::Pl, &mut session, Some(args.clone())).await.is_err());
        assert!(execute_delete(&store, Role::Pl, Some(serde_json::json!({ "agent": "a1", "id": "E0001" }))).await.is_err());
    }

    #[tokio::test]
    async fn ceo_read_touches_the_audit_queue() {
        let (store, _dir) = test_store();
        let mut session = SessionCache::new();
        let args = serde_json::json!({ "agent": "a1" });
        let result = execute_read(&store, Role::Ceo, &mut session, Some(args)).await;
        assert!(result.is_ok());
        let queue = store.audit_queue().unwrap();
        assert_eq!(queue.len(), 1);
        assert_eq!(queue[0].agent, "a1");
        assert!(queue[0].last_audit.is_none());
    }

    #[tokio::test]
    async fn ceo_fix_bypasses_the_correction_marker_requirement() {
        let (store, _dir) = test_store();
        let id = write_one(&store);
        let args = serde_json::json!({ "agent": "a1", "id": id, "obsolete": true });
        let result = execute_fix(&store, Role::Ceo, Some(args)).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn ceo_delete_removes_a_root() {
        let (store, _dir) = test_store();
        let id = write_one(&store);
        let args = serde_json::json!({ "agent": "a1", "id": id });
        let result = execute_delete(&store, Role::Ceo, Some(args)).await;
        assert!(result.is_ok());
        assert_eq!(result.unwrap()["deleted"], true);
    }
}
