//! import_memory Tool
//!
//! Merge or allocate incoming roots from a native export file, returning
//! the ID-remap report for anything that couldn't be merged in place.

use std::path::PathBuf;
use std::sync::Arc;

use grove_core::{Role, Store};
use serde::Deserialize;
use serde_json::Value;

use super::render_error;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct Args {
    source_path: PathBuf,
}

pub fn schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "sourcePath": {
                "type": "string",
                "description": "Path to an external native store file to merge in"
            }
        },
        "required": ["sourcePath"]
    })
}

pub async fn execute(
    store: &Arc<Store>,
    _caller_role: Role,
    args: Option<Value>,
) -> Result<Value, String> {
    let args: Args = match args {
        Some(v) => serde_json::from_value(v).map_err(|e| format!("Invalid arguments: {}", e))?,
        None => return Err("Missing arguments".to_string()),
    };

    let report = store.import_native(&args.source_path).map_err(render_error)?;

    let remapped: Vec<Value> = report
        .remapped
        .iter()
        .map(|r| serde_json::json!({ "oldHint": r.old_hint, "newId": r.new_id }))
        .collect();

    Ok(serde_json::json!({
        "mergedRoots": report.merged_roots,
        "remapped": remapped,
    }))
}
