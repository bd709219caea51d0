//! Storage Module
//!
//! The SQLite-backed [`Store`] (C1): schema migrations, CRUD/read
//! primitives, and the export/import file operations. `migrations` holds
//! the numbered, idempotent schema migrations (§6); `sqlite` holds the
//! `Store` implementation itself.

mod migrations;
mod sqlite;

pub use migrations::{apply_migrations, get_current_version, Migration, MIGRATIONS};
pub use sqlite::{
    AuditRecord, BulkReadGroup, BulkReadResult, CompactRoot, HotNode, IdReadResult, ImportReport,
    Stats, Store,
};
