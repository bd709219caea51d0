//! mark_audited / get_audit_queue Tools
//!
//! Curator-only bookkeeping over the `audit_state` sidecar table. An
//! agent is registered into the queue the first time a curator tool
//! touches its entries ([`super::curator`]); these two tools let the
//! curator record a review and see who's overdue.

use std::sync::Arc;

use grove_core::{Role, Store};
use serde::Deserialize;
use serde_json::Value;

use super::render_error;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct MarkAuditedArgs {
    agent: String,
}

pub fn mark_audited_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "agent": { "type": "string", "description": "Agent identifier being reviewed" }
        },
        "required": ["agent"]
    })
}

pub async fn execute_mark_audited(
    store: &Arc<Store>,
    caller_role: Role,
    args: Option<Value>,
) -> Result<Value, String> {
    if caller_role < Role::Ceo {
        return Err(format!("role_denied: {} cannot mark agents as audited", caller_role));
    }
    let args: MarkAuditedArgs = match args {
        Some(v) => serde_json::from_value(v).map_err(|e| format!("Invalid arguments: {}", e))?,
        None => return Err("Missing arguments".to_string()),
    };
    store.mark_audited(&args.agent).map_err(render_error)?;
    Ok(serde_json::json!({ "agent": args.agent, "audited": true }))
}

pub fn get_audit_queue_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {}
    })
}

pub async fn execute_get_audit_queue(
    store: &Arc<Store>,
    caller_role: Role,
    _args: Option<Value>,
) -> Result<Value, String> {
    if caller_role < Role::Ceo {
        return Err(format!("role_denied: {} cannot view the audit queue", caller_role));
    }
    let queue = store.audit_queue().map_err(render_error)?;
    let rows: Vec<Value> = queue
        .iter()
        .map(|r| {
            serde_json::json!({
                "agent": r.agent,
                "lastAudit": r.last_audit.map(|d| d.to_rfc3339()),
            })
        })
        .collect();
    Ok(serde_json::json!({ "queue": rows }))
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
    async fn non_ceo_cannot_mark_audited() {
        let (store, _dir) = test_store();
        let args = serde_json::json!({ "agent": "a1" });
        let result = execute_mark_audited(&store, Role::Pl, Some(args)).await;
        assert!(result.is_err());
        assert!(result.unwrap_err().contains("role_denied"));
    }

    #[tokio::test]
    async fn ceo_can_mark_audited_and_queue_reflects_it() {
        let (store, _dir) = test_store();
        store.touch_agent("a1").unwrap();
        let args = serde_json::json!({ "agent": "a1" });
        let result = execute_mark_audited(&store, Role::Ceo, Some(args)).await;
        assert!(result.is_ok());

        let queue = execute_get_audit_queue(&store, Role::Ceo, None).await.unwrap();
        let rows = queue["queue"].as_array().unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0]["lastAudit"].is_string());
    }
}
