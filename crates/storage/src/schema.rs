use rusqlite::Connection;

use crate::error::StorageError;

pub const SCHEMA_VERSION: i32 = 1;

pub fn init_schema(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA foreign_keys = ON;
        PRAGMA busy_timeout = 5000;
    ",
    )?;
    conn.execute_batch(SCHEMA_SQL)?;
    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (?1, unixepoch())",
        [SCHEMA_VERSION],
    )?;
    Ok(())
}

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS operations (
    op_id BLOB PRIMARY KEY CHECK (length(op_id) = 16),
    kind TEXT NOT NULL,
    target_type TEXT NOT NULL,
    target_id TEXT NOT NULL,
    before_state BLOB NOT NULL,
    change_spec BLOB NOT NULL,
    items BLOB NOT NULL,
    executed_at INTEGER NOT NULL,
    rolled_back_by BLOB CHECK (rolled_back_by IS NULL OR length(rolled_back_by) = 16),
    reverts BLOB CHECK (reverts IS NULL OR length(reverts) = 16),
    recorded_at INTEGER NOT NULL DEFAULT (CAST(unixepoch('now','subsec') * 1000 AS INTEGER))
);
CREATE INDEX IF NOT EXISTS idx_operations_target
    ON operations (target_type, target_id, executed_at DESC, recorded_at DESC);
";
