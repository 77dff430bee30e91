use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::{DedupKey, TableBackend, TableSchema};
use crate::error::StoreError;
use crate::models::StoredRow;

const TABLE: &str = "records";

/// SQLite file with a single `records` table
pub struct SqliteTable {
    conn: Connection,
    path: Option<PathBuf>,
}

impl SqliteTable {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Ok(Self {
            conn,
            path: Some(path.to_path_buf()),
        })
    }

    pub fn in_memory() -> Result<Self, StoreError> {
        Ok(Self {
            conn: Connection::open_in_memory()?,
            path: None,
        })
    }

    fn select_sql(schema_columns: &[&str]) -> String {
        format!("SELECT {} FROM {} ORDER BY rowid", schema_columns.join(", "), TABLE)
    }
}

impl TableBackend for SqliteTable {
    fn location(&self) -> String {
        match &self.path {
            Some(path) => format!("sqlite:{}", path.display()),
            None => "sqlite::memory:".to_string(),
        }
    }

    fn table_exists(&self) -> Result<bool, StoreError> {
        let found: Option<String> = self
            .conn
            .query_row(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1",
                params![TABLE],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn create_table(&mut self, schema: &TableSchema) -> Result<(), StoreError> {
        let columns: Vec<String> = schema
            .columns
            .iter()
            .map(|column| format!("{column} TEXT NOT NULL"))
            .collect();
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {TABLE} ({}, UNIQUE({}))",
            columns.join(", "),
            schema.key.join(", ")
        );
        self.conn.execute(&sql, [])?;
        Ok(())
    }

    fn validate_schema(&self, schema: &TableSchema) -> Result<(), StoreError> {
        let mut stmt = self.conn.prepare(&format!("PRAGMA table_info({TABLE})"))?;
        let found = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<Result<Vec<_>, _>>()?;
        schema.check_columns(&found)
    }

    fn read_all_keys(&self) -> Result<HashSet<DedupKey>, StoreError> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT email, password FROM {TABLE}"))?;
        let keys = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
            .collect::<Result<HashSet<_>, _>>()?;
        Ok(keys)
    }

    fn append_rows(&mut self, rows: &[StoredRow]) -> Result<(), StoreError> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(&format!(
                "INSERT INTO {TABLE} (timestamp, filename, file_type, content_type, email, \
                 domain, password, additional_data, source_message_id) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"
            ))?;
            for row in rows {
                stmt.execute(params![
                    row.timestamp,
                    row.filename,
                    row.file_type,
                    row.content_type,
                    row.email,
                    row.domain,
                    row.password,
                    row.additional_data,
                    row.source_message_id,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn read_all_rows(&self) -> Result<Vec<StoredRow>, StoreError> {
        let mut stmt = self.conn.prepare(&Self::select_sql(super::RECORD_SCHEMA.columns))?;
        let rows = stmt
            .query_map([], |row| {
                Ok(StoredRow {
                    timestamp: row.get(0)?,
                    filename: row.get(1)?,
                    file_type: row.get(2)?,
                    content_type: row.get(3)?,
                    email: row.get(4)?,
                    domain: row.get(5)?,
                    password: row.get(6)?,
                    additional_data: row.get(7)?,
                    source_message_id: row.get(8)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}
