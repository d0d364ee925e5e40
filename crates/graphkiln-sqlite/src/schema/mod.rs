//! Schema management and migrations
//!
//! Two versions live in the database: the SQL layout version in
//! `schema_migrations`, and the sync record schema version the file was
//! created for, in `graphkiln_meta`. A file created for another record schema
//! is refused rather than silently reinterpreted.

use crate::error::{SqliteError, SqliteResult};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

/// SQL layout version - increment when making schema changes
const SCHEMA_VERSION: i32 = 1;

const RECORD_SCHEMA_KEY: &str = "record_schema_version";

/// Apply all pending migrations
pub fn apply_migrations(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )?;

    let current_version = get_current_version(conn)?;
    debug!(current_version, target_version = SCHEMA_VERSION, "Checking migrations");

    if current_version > SCHEMA_VERSION {
        return Err(SqliteError::Schema(format!(
            "database layout v{current_version} is newer than this build (v{SCHEMA_VERSION})"
        )));
    }
    if current_version < SCHEMA_VERSION {
        info!(from = current_version, to = SCHEMA_VERSION, "Applying schema migrations");
        apply_migration_v1(conn)?;
    }

    Ok(())
}

/// Check (or stamp, on a fresh database) the sync record schema version
pub fn ensure_record_schema(conn: &Connection, expected: u32) -> SqliteResult<()> {
    let stored: Option<String> = conn
        .query_row(
            "SELECT value FROM graphkiln_meta WHERE key = ?1",
            [RECORD_SCHEMA_KEY],
            |row| row.get(0),
        )
        .optional()?;

    match stored {
        None => {
            conn.execute(
                "INSERT INTO graphkiln_meta (key, value) VALUES (?1, ?2)",
                params![RECORD_SCHEMA_KEY, expected.to_string()],
            )?;
            debug!(version = expected, "Stamped record schema version");
            Ok(())
        }
        Some(value) => {
            let found: u32 = value.parse().map_err(|_| {
                SqliteError::Schema(format!("unreadable record schema version '{value}'"))
            })?;
            if found == expected {
                Ok(())
            } else {
                Err(SqliteError::SchemaVersion { found, expected })
            }
        }
    }
}

fn get_current_version(conn: &Connection) -> SqliteResult<i32> {
    let version: Option<i32> =
        conn.query_row("SELECT MAX(version) FROM schema_migrations", [], |row| row.get(0))?;
    Ok(version.unwrap_or(0))
}

fn record_migration(conn: &Connection, version: i32) -> SqliteResult<()> {
    conn.execute("INSERT INTO schema_migrations (version) VALUES (?)", [version])?;
    Ok(())
}

/// Migration v1: metadata records and the meta table
fn apply_migration_v1(conn: &Connection) -> SqliteResult<()> {
    debug!("Applying migration v1: metadata records");

    conn.execute_batch(SCHEMA_V1)
        .map_err(|e| SqliteError::Schema(format!("Failed to apply v1 schema: {}", e)))?;

    record_migration(conn, 1)?;
    info!("Migration v1 applied successfully");
    Ok(())
}

const SCHEMA_V1: &str = r#"
-- One row per MetadataRecord; payload is a JSON object
CREATE TABLE IF NOT EXISTS metadata_records (
    id TEXT PRIMARY KEY NOT NULL,
    keyspace TEXT NOT NULL,
    payload TEXT NOT NULL CHECK (json_valid(payload)),
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_records_keyspace ON metadata_records(keyspace);

-- Reference counting looks edges up by entity
CREATE INDEX IF NOT EXISTS idx_records_entity
    ON metadata_records(keyspace, json_extract(payload, '$.entity'));

CREATE TABLE IF NOT EXISTS graphkiln_meta (
    key TEXT PRIMARY KEY NOT NULL,
    value TEXT NOT NULL
);
"#;
