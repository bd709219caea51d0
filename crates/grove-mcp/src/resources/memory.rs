//! Memory Resources
//!
//! `memory://` URI scheme resources for the MCP server. The store is
//! synchronous, so resource reads are plain blocking calls like every
//! other engine call — no `tokio` primitives involved.

use std::sync::Arc;

use grove_core::Store;

/// Read a `memory://` resource.
pub fn read(store: &Arc<Store>, uri: &str) -> Result<String, String> {
    let path = uri.strip_prefix("memory://").unwrap_or("");
    match path {
        "stats" => read_stats(store),
        _ => Err(format!("unknown memory resource: {}", path)),
    }
}

fn read_stats(store: &Arc<Store>) -> Result<String, String> {
    let stats = store.stats().map_err(|e| e.to_string())?;
    let by_prefix: serde_json::Map<String, serde_json::Value> = stats
        .by_prefix
        .iter()
        .map(|(prefix, count)| (prefix.to_string(), serde_json::json!(count)))
        .collect();

    let result = serde_json::json!({
        "total": stats.total,
        "byPrefix": by_prefix,
    });

    serde_json::to_string_pretty(&result).map_err(|e| e.to_string())
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

    #[test]
    fn stats_resource_reports_total_and_by_prefix() {
        let (store, _dir) = test_store();
        let text = read(&store, "memory://stats").unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert!(value["total"].is_number());
        assert!(value["byPrefix"].is_object());
    }

    #[test]
    fn unknown_resource_errors() {
        let (store, _dir) = test_store();
        assert!(read(&store, "memory://nonsense").is_err());
    }
}
