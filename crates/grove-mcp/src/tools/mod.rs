//! MCP Tools
//!
//! Each tool gets its own file: a JSON-Schema `schema()`, a private `Args`
//! DTO, and an `execute()` that turns engine calls into JSON-RPC results.

pub mod append;
pub mod audit;
pub mod curator;
pub mod export;
pub mod import;
pub mod read;
pub mod reset_cache;
pub mod search;
pub mod update;
pub mod write;

use grove_core::StoreError;

/// Map an engine error to the string surfaced as a tool result.
pub(crate) fn render_error(err: StoreError) -> String {
    format!("{}: {}", err.kind(), err)
}
