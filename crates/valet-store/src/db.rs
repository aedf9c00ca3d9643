use rusqlite::{Connection, Result};

/// Initialise KV tables. Safe to call on every startup (idempotent).
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS kv (
            key        TEXT PRIMARY KEY,
            value      TEXT NOT NULL,
            expires_at INTEGER
        );
        CREATE TABLE IF NOT EXISTS kv_sets (
            key        TEXT NOT NULL,
            member     TEXT NOT NULL,
            expires_at INTEGER,
            PRIMARY KEY (key, member)
        );
        CREATE INDEX IF NOT EXISTS idx_kv_expiry
            ON kv(expires_at) WHERE expires_at IS NOT NULL;",
    )
}
