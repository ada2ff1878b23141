//! Embedded DuckDB backend.
//!
//! Runs in-process against a database file, or in memory when the spec
//! has no path. Enable with `--features duckdb`.

use std::path::PathBuf;

use ::duckdb::{params, Connection, Row};
use chrono::{NaiveDateTime, TimeZone, Utc};

use crate::config::BackendSpec;
use crate::error::{Error, Result};
use crate::record::Record;
use crate::size::bytes_to_kb;

use super::{Backend, BackendKind, START_TIME_INDEX, TABLE_NAME};

/// DuckDB backend for benchmarks.
pub struct DuckDbBackend {
    name: String,
    conn: Option<Connection>,
    path: Option<PathBuf>,
}

impl DuckDbBackend {
    /// Open the database named by the spec.
    pub fn open(spec: &BackendSpec) -> Result<Self> {
        let conn = match &spec.duckdb_path {
            Some(path) => Connection::open(path),
            None => Connection::open_in_memory(),
        }
        .map_err(|e| Error::Connection {
            backend: spec.name.clone(),
            message: e.to_string(),
        })?;

        Ok(Self {
            name: spec.name.clone(),
            conn: Some(conn),
            path: spec.duckdb_path.clone(),
        })
    }

    /// Database file, `None` when in memory.
    pub fn path(&self) -> Option<&PathBuf> {
        self.path.as_ref()
    }

    fn conn(&mut self) -> Result<&mut Connection> {
        self.conn
            .as_mut()
            .ok_or_else(|| Error::Closed(self.name.clone()))
    }
}

fn upsert_sql() -> String {
    format!(
        r#"
        INSERT INTO {TABLE_NAME} (created_at, updated_at, start_time, interval_ms, area, source, value)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT (start_time, interval_ms, area) DO UPDATE
        SET updated_at = EXCLUDED.updated_at, source = EXCLUDED.source, value = EXCLUDED.value
        "#
    )
}

fn upsert_all(conn: &Connection, records: &[Record]) -> Result<()> {
    let mut stmt = conn.prepare_cached(&upsert_sql())?;
    for record in records {
        stmt.execute(params![
            record.created_at.naive_utc(),
            record.updated_at.naive_utc(),
            record.start_time.naive_utc(),
            record.interval_ms,
            record.area,
            record.source,
            record.value,
        ])?;
    }
    Ok(())
}

fn row_to_record(row: &Row<'_>) -> ::duckdb::Result<Record> {
    let at = |naive: NaiveDateTime| Utc.from_utc_datetime(&naive);
    Ok(Record {
        created_at: at(row.get(0)?),
        updated_at: at(row.get(1)?),
        start_time: at(row.get(2)?),
        interval_ms: row.get(3)?,
        area: row.get(4)?,
        source: row.get(5)?,
        value: row.get(6)?,
    })
}

impl Backend for DuckDbBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> BackendKind {
        BackendKind::DuckDb
    }

    fn setup(&mut self) -> Result<()> {
        self.conn()?.execute_batch(&format!(
            r#"
            DROP TABLE IF EXISTS {TABLE_NAME};
            CREATE TABLE {TABLE_NAME} (
                created_at   TIMESTAMP NOT NULL,
                updated_at   TIMESTAMP NOT NULL,
                start_time   TIMESTAMP NOT NULL,
                interval_ms  BIGINT    NOT NULL,
                area         VARCHAR   NOT NULL,
                source       VARCHAR   NOT NULL,
                value        DOUBLE    NOT NULL,
                PRIMARY KEY (start_time, interval_ms, area)
            );
            CREATE INDEX {START_TIME_INDEX} ON {TABLE_NAME} (start_time);
            "#
        ))?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        match self.conn.take() {
            Some(conn) => conn.close().map_err(|(_, e)| Error::from(e)),
            None => Ok(()),
        }
    }

    fn upsert_single(&mut self, records: &[Record]) -> Result<()> {
        upsert_all(self.conn()?, records)
    }

    fn upsert_bulk(&mut self, records: &[Record]) -> Result<()> {
        let tx = self.conn()?.transaction()?;
        upsert_all(&tx, records)?;
        tx.commit()?;
        Ok(())
    }

    fn get_ordered_with_limit(&mut self, limit: usize) -> Result<Vec<Record>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT created_at, updated_at, start_time, interval_ms, area, source, value \
             FROM {TABLE_NAME} ORDER BY start_time DESC LIMIT ?"
        ))?;
        let rows = stmt.query_map(params![limit as i64], row_to_record)?;
        Ok(rows.collect::<::duckdb::Result<Vec<_>>>()?)
    }

    fn table_size_kb(&mut self) -> Result<u64> {
        let conn = self.conn()?;
        // Flush the WAL so the block count reflects every write.
        conn.execute_batch("CHECKPOINT")?;
        let bytes: i64 = conn.query_row(
            "SELECT CAST(block_size * used_blocks AS BIGINT) FROM pragma_database_size() \
             WHERE database_name = current_database()",
            [],
            |row| row.get(0),
        )?;
        Ok(bytes_to_kb(bytes))
    }
}
