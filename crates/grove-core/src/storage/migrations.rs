//! Database Migrations
//!
//! Schema migration definitions for the storage layer. Per-prefix header
//! entries (`X0000`) are not a SQL migration — they depend on the
//! configured prefix table, a runtime [`crate::config::Config`] value, not
//! something the schema itself knows about — so they are inserted
//! procedurally by `Store::open` after migrations run (see
//! `storage::sqlite::Store::ensure_header_entries`).

/// Migration definitions, applied in order.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "Initial schema: memories with inline level_2..level_5 columns",
        up: MIGRATION_V1_UP,
    },
    Migration {
        version: 2,
        description: "Flatten legacy level_2..level_5 columns into memory_nodes",
        up: MIGRATION_V2_UP,
    },
    Migration {
        version: 3,
        description: "Zero out access_count on pre-existing obsolete entries",
        up: MIGRATION_V3_UP,
    },
];

/// A database migration.
#[derive(Debug, Clone)]
pub struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub up: &'static str,
}

/// V1: the original flat schema, before sub-entries had their own table.
/// `level_2`..`level_5` held nested content inline, one column per depth —
/// workable only up to a fixed `max_depth` of 5.
const MIGRATION_V1_UP: &str = r#"
CREATE TABLE IF NOT EXISTS memories (
    id TEXT PRIMARY KEY,
    prefix TEXT NOT NULL,
    seq INTEGER NOT NULL,
    created_at TEXT NOT NULL,
    title TEXT NOT NULL,
    level_1 TEXT NOT NULL,
    level_2 TEXT,
    level_3 TEXT,
    level_4 TEXT,
    level_5 TEXT,
    links TEXT NOT NULL DEFAULT '[]',
    min_role TEXT NOT NULL DEFAULT 'worker',
    access_count INTEGER NOT NULL DEFAULT 0,
    last_accessed TEXT,
    obsolete INTEGER NOT NULL DEFAULT 0,
    favorite INTEGER NOT NULL DEFAULT 0,
    pinned INTEGER NOT NULL DEFAULT 0,
    irrelevant INTEGER NOT NULL DEFAULT 0,
    active INTEGER NOT NULL DEFAULT 1,
    secret INTEGER NOT NULL DEFAULT 0,
    tags TEXT NOT NULL DEFAULT '[]',
    effective_date TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_memories_prefix ON memories(prefix, seq);
CREATE INDEX IF NOT EXISTS idx_memories_effective_date ON memories(effective_date);

CREATE TABLE IF NOT EXISTS audit_state (
    agent TEXT PRIMARY KEY,
    last_audit TEXT
);

CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL
);
"#;

/// V2: give sub-entries a real table with unbounded depth instead of five
/// hardcoded columns, and migrate whatever was packed into `level_2..5`.
const MIGRATION_V2_UP: &str = r#"
CREATE TABLE IF NOT EXISTS memory_nodes (
    id TEXT PRIMARY KEY,
    parent_id TEXT NOT NULL,
    root_id TEXT NOT NULL REFERENCES memories(id) ON DELETE CASCADE,
    depth INTEGER NOT NULL,
    seq INTEGER NOT NULL,
    title TEXT NOT NULL,
    content TEXT NOT NULL,
    created_at TEXT NOT NULL,
    access_count INTEGER NOT NULL DEFAULT 0,
    last_accessed TEXT,
    links TEXT NOT NULL DEFAULT '[]',
    obsolete INTEGER NOT NULL DEFAULT 0,
    favorite INTEGER NOT NULL DEFAULT 0,
    secret INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_nodes_root_id ON memory_nodes(root_id);
CREATE INDEX IF NOT EXISTS idx_nodes_parent_id ON memory_nodes(parent_id);

INSERT INTO memory_nodes (id, parent_id, root_id, depth, seq, title, content, created_at)
SELECT id || '.1', id, id, 2, 1, substr(level_2, 1, 80), level_2, created_at
FROM memories WHERE level_2 IS NOT NULL AND level_2 != '';

INSERT INTO memory_nodes (id, parent_id, root_id, depth, seq, title, content, created_at)
SELECT id || '.1.1', id || '.1', id, 3, 1, substr(level_3, 1, 80), level_3, created_at
FROM memories WHERE level_3 IS NOT NULL AND level_3 != '' AND level_2 IS NOT NULL;

INSERT INTO memory_nodes (id, parent_id, root_id, depth, seq, title, content, created_at)
SELECT id || '.1.1.1', id || '.1.1', id, 4, 1, substr(level_4, 1, 80), level_4, created_at
FROM memories WHERE level_4 IS NOT NULL AND level_4 != '' AND level_3 IS NOT NULL;

INSERT INTO memory_nodes (id, parent_id, root_id, depth, seq, title, content, created_at)
SELECT id || '.1.1.1.1', id || '.1.1.1', id, 5, 1, substr(level_5, 1, 80), level_5, created_at
FROM memories WHERE level_5 IS NOT NULL AND level_5 != '' AND level_4 IS NOT NULL;

ALTER TABLE memories DROP COLUMN level_2;
ALTER TABLE memories DROP COLUMN level_3;
ALTER TABLE memories DROP COLUMN level_4;
ALTER TABLE memories DROP COLUMN level_5;
"#;

/// V3: the obsolete-workflow invariant (access count transfers to the
/// correction entry) didn't exist yet when some of these rows were
/// written; normalize them so the invariant holds going forward.
const MIGRATION_V3_UP: &str = r#"
UPDATE memories SET access_count = 0 WHERE obsolete = 1 AND access_count != 0;
"#;

pub fn get_current_version(conn: &rusqlite::Connection) -> rusqlite::Result<u32> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )
    .or(Ok(0))
}

/// Apply pending migrations, in order, recording the applied version.
pub fn apply_migrations(conn: &rusqlite::Connection) -> rusqlite::Result<u32> {
    let current_version = get_current_version(conn)?;
    let mut applied = 0;

    for migration in MIGRATIONS {
        if migration.version > current_version {
            tracing::info!(
                version = migration.version,
                description = migration.description,
                "applying migration"
            );
            conn.execute_batch(migration.up)?;
            conn.execute(
                "INSERT INTO schema_version (version, applied_at) VALUES (?1, ?2)",
                rusqlite::params![migration.version, chrono::Utc::now().to_rfc3339()],
            )?;
            applied += 1;
        }
    }

    Ok(applied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn fresh_database_applies_all_migrations() {
        let conn = Connection::open_in_memory().unwrap();
        let applied = apply_migrations(&conn).unwrap();
        assert_eq!(applied as usize, MIGRATIONS.len());
        assert_eq!(get_current_version(&conn).unwrap(), MIGRATIONS.len() as u32);
    }

    #[test]
    fn migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        apply_migrations(&conn).unwrap();
        let second_pass = apply_migrations(&conn).unwrap();
        assert_eq!(second_pass, 0);
    }

    #[test]
    fn legacy_level_columns_are_migrated_into_nodes() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(MIGRATIONS[0].up).unwrap();
        conn.execute(
            "INSERT INTO memories (id, prefix, seq, created_at, title, level_1, level_2, effective_date)
             VALUES ('E0001', 'E', 1, '2024-01-01T00:00:00Z', 'Title', 'Body', 'Child body', '2024-01-01T00:00:00Z')",
            [],
        )
        .unwrap();
        conn.execute_batch(MIGRATIONS[1].up).unwrap();
        let content: String = conn
            .query_row(
                "SELECT content FROM memory_nodes WHERE id = 'E0001.1'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(content, "Child body");
    }
}
