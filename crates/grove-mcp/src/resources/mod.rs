//! MCP Resources
//!
//! `memory://` URI-scheme resources exposed alongside the tool surface.

pub mod memory;
