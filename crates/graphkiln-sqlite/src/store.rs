//! MetadataStore implementation for SQLite
//!
//! [`RecordFilter`] trees compile to a parameterized `WHERE` clause. Field
//! predicates use SQLite's JSON1 functions against the `payload` column, so
//! every filter is evaluated inside the database.

use crate::connection::SqlitePool;
use crate::error::{SqliteError, SqliteResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use graphkiln_core::storage::{
    BackendDescriptor, MetadataRecord, MetadataStore, Op, RecordFilter, StoreError, StoreResult,
};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use serde_json::Value;

/// SQLite implementation of [`MetadataStore`]
#[derive(Debug, Clone)]
pub struct SqliteMetadataStore {
    pool: SqlitePool,
    descriptor: BackendDescriptor,
}

impl SqliteMetadataStore {
    /// Wrap an open pool
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            descriptor: crate::factory::sqlite_descriptor(),
        }
    }

    /// The underlying pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn blocking<T, F>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&Connection) -> SqliteResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || pool.with_connection(f))
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?
            .map_err(Into::into)
    }
}

#[async_trait]
impl MetadataStore for SqliteMetadataStore {
    async fn save(&self, record: MetadataRecord) -> StoreResult<String> {
        self.blocking(move |conn| {
            conn.execute(
                r#"
                INSERT INTO metadata_records (id, keyspace, payload, updated_at)
                VALUES (?1, ?2, ?3, ?4)
                ON CONFLICT(id) DO UPDATE SET
                    keyspace = excluded.keyspace,
                    payload = excluded.payload,
                    updated_at = excluded.updated_at
                "#,
                params![
                    record.id,
                    record.keyspace,
                    record.payload.to_string(),
                    record.updated_at.to_rfc3339(),
                ],
            )?;
            Ok(record.id)
        })
        .await
    }

    async fn get(&self, id: &str) -> StoreResult<Option<MetadataRecord>> {
        let id = id.to_string();
        self.blocking(move |conn| {
            let row = conn
                .query_row(
                    "SELECT id, keyspace, payload, updated_at FROM metadata_records WHERE id = ?1",
                    [&id],
                    read_row,
                )
                .optional()?;
            row.map(into_record).transpose()
        })
        .await
    }

    async fn list(&self) -> StoreResult<Vec<String>> {
        self.blocking(|conn| {
            let mut stmt = conn.prepare("SELECT id FROM metadata_records")?;
            let ids = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(ids)
        })
        .await
    }

    async fn search(&self, filter: &RecordFilter) -> StoreResult<Vec<String>> {
        let mut clause = String::new();
        let mut values = Vec::new();
        compile_filter(filter, &mut clause, &mut values)?;

        self.blocking(move |conn| {
            let sql = format!("SELECT id FROM metadata_records WHERE {clause}");
            let mut stmt = conn.prepare(&sql)?;
            let ids = stmt
                .query_map(params_from_iter(values.iter()), |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(ids)
        })
        .await
    }

    async fn delete(&self, id: &str) -> StoreResult<()> {
        let id = id.to_string();
        self.blocking(move |conn| {
            conn.execute("DELETE FROM metadata_records WHERE id = ?1", [&id])?;
            Ok(())
        })
        .await
    }

    async fn close(&self) -> StoreResult<()> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || pool.close())
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?
            .map_err(Into::into)
    }

    fn descriptor(&self) -> &BackendDescriptor {
        &self.descriptor
    }
}

type RawRow = (String, String, String, String);

fn read_row(row: &Row<'_>) -> rusqlite::Result<RawRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

fn into_record((id, keyspace, payload, updated_at): RawRow) -> SqliteResult<MetadataRecord> {
    let payload: Value = serde_json::from_str(&payload)?;
    let updated_at = DateTime::parse_from_rfc3339(&updated_at)
        .map_err(|e| SqliteError::Serialization(format!("record {id}: bad updated_at: {e}")))?
        .with_timezone(&Utc);
    Ok(MetadataRecord {
        id,
        keyspace,
        payload,
        updated_at,
    })
}

/// Compile a filter tree into `clause`, appending bound values in order
fn compile_filter(
    filter: &RecordFilter,
    clause: &mut String,
    values: &mut Vec<SqlValue>,
) -> SqliteResult<()> {
    match filter {
        RecordFilter::Keyspace(keyspace) => {
            clause.push_str("keyspace = ?");
            values.push(SqlValue::Text(keyspace.clone()));
        }
        RecordFilter::IdPrefix(prefix) => {
            clause.push_str("substr(id, 1, length(?)) = ?");
            values.push(SqlValue::Text(prefix.clone()));
            values.push(SqlValue::Text(prefix.clone()));
        }
        RecordFilter::Field(path, op, expected) => {
            let json_path = json_path(path)?;
            let bound = to_sql_value(expected)?;
            match op {
                Op::Eq | Op::Ne => {
                    let cmp = if *op == Op::Eq { "IS" } else { "IS NOT" };
                    clause.push_str(&format!(
                        "(json_type(payload, ?) IS NOT NULL AND json_extract(payload, ?) {cmp} ?)"
                    ));
                    values.push(SqlValue::Text(json_path.clone()));
                    values.push(SqlValue::Text(json_path));
                }
                Op::Contains => {
                    clause.push_str("EXISTS (SELECT 1 FROM json_each(payload, ?) WHERE value IS ?)");
                    values.push(SqlValue::Text(json_path));
                }
            }
            values.push(bound);
        }
        RecordFilter::And(filters) | RecordFilter::Or(filters) => {
            let (joiner, empty) = match filter {
                RecordFilter::And(_) => (" AND ", "1"),
                _ => (" OR ", "0"),
            };
            if filters.is_empty() {
                clause.push_str(empty);
                return Ok(());
            }
            clause.push('(');
            for (i, inner) in filters.iter().enumerate() {
                if i > 0 {
                    clause.push_str(joiner);
                }
                compile_filter(inner, clause, values)?;
            }
            clause.push(')');
        }
    }
    Ok(())
}

/// Dotted payload path to a JSON1 path
fn json_path(path: &str) -> SqliteResult<String> {
    let valid = !path.is_empty()
        && path.split('.').all(|segment| {
            !segment.is_empty() && segment.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        });
    if valid {
        Ok(format!("$.{path}"))
    } else {
        Err(SqliteError::UnsupportedFilter(format!("field path '{path}'")))
    }
}

fn to_sql_value(value: &Value) -> SqliteResult<SqlValue> {
    match value {
        Value::Null => Ok(SqlValue::Null),
        Value::Bool(b) => Ok(SqlValue::Integer(i64::from(*b))),
        Value::Number(n) => n
            .as_i64()
            .map(SqlValue::Integer)
            .or_else(|| n.as_f64().map(SqlValue::Real))
            .ok_or_else(|| SqliteError::UnsupportedFilter(format!("number {n}"))),
        Value::String(s) => Ok(SqlValue::Text(s.clone())),
        Value::Array(_) | Value::Object(_) => Err(SqliteError::UnsupportedFilter(
            "comparison against arrays or objects".to_string(),
        )),
    }
}
