use super::{Adapter, ListParams};
use crate::error::{AdapterError, CoreError};
use crate::record::Record;
use crate::transaction::{AbortSignal, TransactionProxy, WriteOp};
use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::collections::{HashMap, HashSet};

/// The durable [`Adapter`] variant, backed by SQLite through `rusqlite`:
/// WAL mode, a transaction-scoped connection, and JSON-as-TEXT storage for
/// dynamically shaped payloads.
///
/// Every logical collection gets its own pair of tables, named from a
/// sanitized `(bucket, name)` collection key, so one physical database file
/// can be shared across collections without their records or metadata
/// colliding.
pub struct SqliteAdapter {
    conn: Mutex<Connection>,
    records_table: String,
    legacy_table: String,
    migrate_old_data: bool,
}

fn sanitize(part: &str) -> String {
    part.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

impl SqliteAdapter {
    /// `db_name` is the SQLite file path (or `:memory:`).
    pub fn open(
        db_name: &str,
        bucket: &str,
        name: &str,
        migrate_old_data: bool,
    ) -> Result<Self, AdapterError> {
        let conn = Connection::open(db_name)
            .map_err(|e| AdapterError::Sqlite { op: "open", source: e })?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
            .map_err(|e| AdapterError::Sqlite { op: "open", source: e })?;
        let records_table = format!("records_{}_{}", sanitize(bucket), sanitize(name));
        let legacy_table = format!("records_{}", sanitize(name));
        let adapter = SqliteAdapter {
            conn: Mutex::new(conn),
            records_table,
            legacy_table,
            migrate_old_data,
        };
        Ok(adapter)
    }

    fn metadata_table(&self) -> String {
        format!("{}_meta", self.records_table)
    }

    fn init_schema(&self, conn: &Connection) -> Result<(), AdapterError> {
        let records = &self.records_table;
        let meta = self.metadata_table();
        conn.execute_batch(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {records} (
                id TEXT PRIMARY KEY,
                data TEXT NOT NULL,
                status TEXT NOT NULL,
                last_modified INTEGER
            );
            CREATE INDEX IF NOT EXISTS idx_{records}_status ON {records}(status);
            CREATE INDEX IF NOT EXISTS idx_{records}_last_modified ON {records}(last_modified);

            CREATE TABLE IF NOT EXISTS {meta} (
                name TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            "#,
        ))
        .map_err(|e| AdapterError::Sqlite { op: "open", source: e })
    }

    /// One-shot migration from a bare-name legacy table into the namespaced
    /// schema. Guarded by a flag row
    /// in the new metadata table so it only ever runs once.
    fn migrate_legacy(&self, conn: &Connection) -> Result<(), AdapterError> {
        if !self.migrate_old_data {
            return Ok(());
        }
        let meta = self.metadata_table();
        let already: Option<String> = conn
            .query_row(
                &format!("SELECT value FROM {meta} WHERE name = 'migrated'"),
                [],
                |r| r.get(0),
            )
            .optional()
            .map_err(|e| AdapterError::Sqlite { op: "migrate", source: e })?;
        if already.is_some() {
            return Ok(());
        }
        let legacy_exists: Option<String> = conn
            .query_row(
                "SELECT name FROM sqlite_master WHERE type='table' AND name=?1",
                params![&self.legacy_table],
                |r| r.get(0),
            )
            .optional()
            .map_err(|e| AdapterError::Sqlite { op: "migrate", source: e })?;
        if legacy_exists.is_some() {
            conn.execute(
                &format!(
                    "INSERT OR IGNORE INTO {} (id, data, status, last_modified) \
                     SELECT id, data, status, last_modified FROM {}",
                    self.records_table, self.legacy_table
                ),
                [],
            )
            .map_err(|e| AdapterError::Sqlite { op: "migrate", source: e })?;
            conn.execute(&format!("DROP TABLE {}", self.legacy_table), [])
                .map_err(|e| AdapterError::Sqlite { op: "migrate", source: e })?;
        }
        log::info!("migrated legacy schema into {}", self.records_table);
        conn.execute(
            &format!(
                "INSERT INTO {meta}(name, value) VALUES ('migrated', '1') \
                 ON CONFLICT(name) DO UPDATE SET value = excluded.value"
            ),
            [],
        )
        .map_err(|e| AdapterError::Sqlite { op: "migrate", source: e })?;
        Ok(())
    }

    fn row_to_record(id: String, data: String, status: String, last_modified: Option<i64>) -> Result<Record, AdapterError> {
        let value: Value = serde_json::from_str(&data)
            .map_err(|e| AdapterError::Serde { op: "get", source: e })?;
        let mut record = Record::from_map(value.as_object().cloned().unwrap_or_default());
        record.set_id(id);
        record.set_status(
            crate::record::RecordStatus::parse(&status).unwrap_or(crate::record::RecordStatus::Synced),
        );
        record.set_last_modified(last_modified);
        Ok(record)
    }

    fn write_record(conn: &Connection, table: &str, record: &Record) -> Result<(), AdapterError> {
        let id = record.id().expect("queued write missing id").to_string();
        let status = record.status().map(|s| s.as_str()).unwrap_or("synced").to_string();
        let last_modified = record.last_modified();
        let payload = serde_json::to_string(&record.to_value())
            .map_err(|e| AdapterError::Serde { op: "execute", source: e })?;
        conn.execute(
            &format!(
                "INSERT INTO {table}(id, data, status, last_modified) VALUES (?1, ?2, ?3, ?4) \
                 ON CONFLICT(id) DO UPDATE SET data=excluded.data, status=excluded.status, last_modified=excluded.last_modified"
            ),
            params![id, payload, status, last_modified],
        )
        .map_err(|e| AdapterError::Sqlite { op: "execute", source: e })?;
        Ok(())
    }
}

#[async_trait(?Send)]
impl Adapter for SqliteAdapter {
    async fn open(&self) -> Result<(), AdapterError> {
        let conn = self.conn.lock();
        self.init_schema(&conn)?;
        self.migrate_legacy(&conn)?;
        log::debug!("opened sqlite adapter for {}", self.records_table);
        Ok(())
    }

    async fn close(&self) -> Result<(), AdapterError> {
        log::debug!("closed sqlite adapter for {}", self.records_table);
        Ok(())
    }

    async fn clear(&self) -> Result<(), AdapterError> {
        let conn = self.conn.lock();
        conn.execute(&format!("DELETE FROM {}", self.records_table), [])
            .map_err(|e| AdapterError::Sqlite { op: "clear", source: e })?;
        Ok(())
    }

    async fn execute<F, R>(&self, preload: &[String], local_fields: &[String], callback: F) -> Result<R, CoreError>
    where
        F: FnOnce(&mut TransactionProxy, &AbortSignal) -> Result<R, CoreError>,
    {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction()
            .map_err(|e| CoreError::Adapter(AdapterError::Sqlite { op: "execute", source: e }))?;

        let mut snapshot = HashMap::new();
        let mut declared = HashSet::new();
        for id in preload {
            declared.insert(id.clone());
            let row: Option<(String, String, Option<i64>)> = tx
                .query_row(
                    &format!("SELECT data, status, last_modified FROM {} WHERE id = ?1", self.records_table),
                    params![id],
                    |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
                )
                .optional()
                .map_err(|e| CoreError::Adapter(AdapterError::Sqlite { op: "execute", source: e }))?;
            if let Some((data, status, last_modified)) = row {
                let record = Self::row_to_record(id.clone(), data, status, last_modified)
                    .map_err(CoreError::Adapter)?;
                snapshot.insert(id.clone(), record);
            }
        }

        let mut proxy = TransactionProxy::new(snapshot, declared, local_fields.to_vec());
        let abort = AbortSignal::default();
        let result = callback(&mut proxy, &abort)?;
        if abort.is_aborted() {
            return Err(CoreError::Adapter(AdapterError::other(
                "execute",
                "callback requested abort",
            )));
        }

        for op in proxy.into_writes() {
            match op {
                WriteOp::Put(record) => Self::write_record(&tx, &self.records_table, &record)
                    .map_err(CoreError::Adapter)?,
                WriteOp::Purge(id) => {
                    tx.execute(
                        &format!("DELETE FROM {} WHERE id = ?1", self.records_table),
                        params![id],
                    )
                    .map_err(|e| CoreError::Adapter(AdapterError::Sqlite { op: "execute", source: e }))?;
                }
            }
        }
        tx.commit()
            .map_err(|e| CoreError::Adapter(AdapterError::Sqlite { op: "execute", source: e }))?;
        Ok(result)
    }

    async fn get(&self, id: &str) -> Result<Option<Record>, AdapterError> {
        let conn = self.conn.lock();
        let row: Option<(String, String, Option<i64>)> = conn
            .query_row(
                &format!("SELECT data, status, last_modified FROM {} WHERE id = ?1", self.records_table),
                params![id],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )
            .optional()
            .map_err(|e| AdapterError::Sqlite { op: "get", source: e })?;
        row.map(|(data, status, last_modified)| Self::row_to_record(id.to_string(), data, status, last_modified))
            .transpose()
    }

    async fn list(&self, params_: &ListParams) -> Result<Vec<Record>, AdapterError> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(&format!("SELECT id, data, status, last_modified FROM {}", self.records_table))
            .map_err(|e| AdapterError::Sqlite { op: "list", source: e })?;
        let rows = stmt
            .query_map([], |r| {
                Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?, r.get::<_, String>(2)?, r.get::<_, Option<i64>>(3)?))
            })
            .map_err(|e| AdapterError::Sqlite { op: "list", source: e })?;
        let mut out = Vec::new();
        for row in rows {
            let (id, data, status, last_modified) =
                row.map_err(|e| AdapterError::Sqlite { op: "list", source: e })?;
            let record = Self::row_to_record(id, data, status, last_modified)?;
            if params_.matches(&record) {
                out.push(record);
            }
        }
        params_.sort(&mut out);
        Ok(out)
    }

    async fn save_last_modified(&self, value: Option<i64>) -> Result<(), AdapterError> {
        let conn = self.conn.lock();
        let meta = self.metadata_table();
        match value {
            Some(v) => {
                conn.execute(
                    &format!(
                        "INSERT INTO {meta}(name, value) VALUES ('lastModified', ?1) \
                         ON CONFLICT(name) DO UPDATE SET value = excluded.value"
                    ),
                    params![v.to_string()],
                )
                .map_err(|e| AdapterError::Sqlite { op: "saveLastModified", source: e })?;
            }
            None => {
                conn.execute(&format!("DELETE FROM {meta} WHERE name = 'lastModified'"), [])
                    .map_err(|e| AdapterError::Sqlite { op: "saveLastModified", source: e })?;
            }
        }
        Ok(())
    }

    async fn get_last_modified(&self) -> Result<Option<i64>, AdapterError> {
        let conn = self.conn.lock();
        let meta = self.metadata_table();
        let value: Option<String> = conn
            .query_row(&format!("SELECT value FROM {meta} WHERE name = 'lastModified'"), [], |r| r.get(0))
            .optional()
            .map_err(|e| AdapterError::Sqlite { op: "getLastModified", source: e })?;
        Ok(value.and_then(|v| v.parse::<i64>().ok()))
    }

    async fn save_metadata(&self, metadata: Value) -> Result<(), AdapterError> {
        let conn = self.conn.lock();
        let meta = self.metadata_table();
        let payload = serde_json::to_string(&metadata)
            .map_err(|e| AdapterError::Serde { op: "saveMetadata", source: e })?;
        conn.execute(
            &format!(
                "INSERT INTO {meta}(name, value) VALUES ('collection', ?1) \
                 ON CONFLICT(name) DO UPDATE SET value = excluded.value"
            ),
            params![payload],
        )
        .map_err(|e| AdapterError::Sqlite { op: "saveMetadata", source: e })?;
        Ok(())
    }

    async fn get_metadata(&self) -> Result<Option<Value>, AdapterError> {
        let conn = self.conn.lock();
        let meta = self.metadata_table();
        let value: Option<String> = conn
            .query_row(&format!("SELECT value FROM {meta} WHERE name = 'collection'"), [], |r| r.get(0))
            .optional()
            .map_err(|e| AdapterError::Sqlite { op: "getMetadata", source: e })?;
        value
            .map(|v| serde_json::from_str(&v).map_err(|e| AdapterError::Serde { op: "getMetadata", source: e }))
            .transpose()
    }

    async fn import_bulk(&self, records: Vec<Record>) -> Result<usize, AdapterError> {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction()
            .map_err(|e| AdapterError::Sqlite { op: "importBulk", source: e })?;
        let count = records.len();
        for record in &records {
            Self::write_record(&tx, &self.records_table, record)?;
        }
        tx.commit()
            .map_err(|e| AdapterError::Sqlite { op: "importBulk", source: e })?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RecordStatus;
    use serde_json::json;

    fn rec(v: serde_json::Value) -> Record {
        Record::from_map(v.as_object().unwrap().clone())
    }

    #[tokio::test]
    async fn round_trips_a_record_through_sqlite() {
        let adapter = SqliteAdapter::open(":memory:", "default", "articles", false).unwrap();
        adapter.open().await.unwrap();
        let mut r = rec(json!({"id": "a", "title": "hi"}));
        r.set_status(RecordStatus::Synced);
        r.set_last_modified(Some(5));
        adapter.import_bulk(vec![r]).await.unwrap();
        let fetched = adapter.get("a").await.unwrap().unwrap();
        assert_eq!(fetched.get("title"), Some(&json!("hi")));
        assert_eq!(fetched.last_modified(), Some(5));
    }

    #[tokio::test]
    async fn execute_rolls_back_sqlite_transaction_on_error() {
        let adapter = SqliteAdapter::open(":memory:", "default", "articles", false).unwrap();
        adapter.open().await.unwrap();
        let result: Result<(), CoreError> = adapter
            .execute(&[], &[], |proxy, _abort| {
                proxy.create(rec(json!({"id": "a", "title": "hi"})))?;
                Err(CoreError::Adapter(AdapterError::other("test", "boom")))
            })
            .await;
        assert!(result.is_err());
        assert!(adapter.get("a").await.unwrap().is_none());
    }

    /// `:memory:` databases don't exercise actual file persistence; this one
    /// writes to a real file and reopens it to check records survive the
    /// adapter being dropped and recreated, the way a host process restart
    /// would.
    #[tokio::test]
    async fn records_survive_reopening_the_same_database_file() {
        let _ = env_logger::try_init();
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("collection.sqlite3");
        let db_path = db_path.to_str().unwrap();

        {
            let adapter = SqliteAdapter::open(db_path, "default", "articles", false).unwrap();
            adapter.open().await.unwrap();
            let mut r = rec(json!({"id": "a", "title": "hi"}));
            r.set_status(RecordStatus::Synced);
            r.set_last_modified(Some(5));
            adapter.import_bulk(vec![r]).await.unwrap();
            adapter.close().await.unwrap();
        }

        let reopened = SqliteAdapter::open(db_path, "default", "articles", false).unwrap();
        reopened.open().await.unwrap();
        let fetched = reopened.get("a").await.unwrap().unwrap();
        assert_eq!(fetched.get("title"), Some(&json!("hi")));
        assert_eq!(fetched.last_modified(), Some(5));
    }
}
