//! read_memory Tool
//!
//! Dispatches to ID-mode or bulk-mode reads depending on whether `id` is
//! present in the arguments. Search mode lives in its own tool
//! ([`super::search`]) so the schemas don't have to apologize for which
//! fields matter in which mode.

use std::sync::Arc;

use grove_core::{BulkReadGroup, BulkReadResult, IdReadResult, ReadOptions, Role, SessionCache, Store};
use serde_json::Value;

use super::render_error;

pub fn schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "id": {
                "type": "string",
                "description": "Read a single root or node by ID instead of a bulk scan"
            },
            "prefix": {
                "type": "string",
                "description": "Restrict a bulk read to a single prefix letter"
            },
            "limit": { "type": "integer", "minimum": 1 },
            "followObsolete": { "type": "boolean", "default": true },
            "showObsoletePath": { "type": "boolean", "default": false },
            "showObsolete": { "type": "boolean", "default": false },
            "linkDepth": { "type": "integer", "default": 1, "minimum": 0 }
        }
    })
}

pub async fn execute(
    store: &Arc<Store>,
    caller_role: Role,
    session: &mut SessionCache,
    args: Option<Value>,
) -> Result<Value, String> {
    let opts: ReadOptions = match args {
        Some(v) => serde_json::from_value(v).map_err(|e| format!("Invalid arguments: {}", e))?,
        None => ReadOptions::default(),
    };

    match &opts.id {
        Some(id) => {
            let result = store
                .read_id(id, &opts, caller_role)
                .map_err(render_error)?;
            render_id_result(result)
        }
        None => {
            let result = store
                .read_bulk(&opts, caller_role, session)
                .map_err(render_error)?;
            render_bulk_read(result)
        }
    }
}

fn render_id_result(result: IdReadResult) -> Result<Value, String> {
    let (mut value, kind) = match result {
        IdReadResult::Root(view) => (
            serde_json::to_value(&view).map_err(|e| e.to_string())?,
            "root",
        ),
        IdReadResult::Node(view) => (
            serde_json::to_value(&view).map_err(|e| e.to_string())?,
            "node",
        ),
    };
    value
        .as_object_mut()
        .expect("RootView/NodeView always serialize to a JSON object")
        .insert("kind".to_string(), serde_json::json!(kind));
    Ok(value)
}

fn render_group(group: &BulkReadGroup) -> Result<Value, String> {
    let compact: Result<Vec<Value>, String> = group
        .compact
        .iter()
        .map(|c| {
            Ok(serde_json::json!({
                "entry": c.entry,
                "latestChild": c.latest_child,
                "hiddenChildren": c.hidden_children,
            }))
        })
        .collect();
    Ok(serde_json::json!({
        "prefix": group.prefix.to_string(),
        "headerTitle": group.header_title,
        "expanded": group.expanded,
        "compact": compact?,
    }))
}

fn render_bulk_read(result: BulkReadResult) -> Result<Value, String> {
    let groups: Result<Vec<Value>, String> = result.groups.iter().map(render_group).collect();
    let hot_nodes: Vec<Value> = result
        .hot_nodes
        .iter()
        .map(|n| {
            serde_json::json!({
                "id": n.id,
                "breadcrumb": n.breadcrumb,
                "score": n.score,
            })
        })
        .collect();

    Ok(serde_json::json!({
        "groups": groups?,
        "obsoleteTail": result.obsolete_tail,
        "obsoleteHidden": result.obsolete_hidden,
        "hotNodes": hot_nodes,
    }))
}
