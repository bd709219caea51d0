//! reset_memory_cache Tool
//!
//! Clears the connection's session cache: history and generation counter
//! both go back to zero, so the next bulk read reports `discover` mode.

use grove_core::SessionCache;
use serde_json::Value;

pub fn schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {}
    })
}

pub async fn execute(session: &mut SessionCache, _args: Option<Value>) -> Result<Value, String> {
    session.reset();
    Ok(serde_json::json!({ "reset": true }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use grove_core::Mode;

    #[tokio::test]
    async fn reset_returns_the_cache_to_discover_mode() {
        let mut session = SessionCache::new();
        session.record_generation(
            ["E0001".to_string()].into_iter().collect(),
            Default::default(),
        );
        assert_eq!(session.mode(), Mode::Essentials);

        let result = execute(&mut session, None).await;
        assert!(result.is_ok());
        assert_eq!(session.mode(), Mode::Discover);
    }
}
