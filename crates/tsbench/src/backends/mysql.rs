//! MySQL (InnoDB) backend.
//!
//! Requires a running MySQL 8 instance. Enable with `--features mysql`.

use chrono::{DateTime, Utc};
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection, MySqlRow};
use sqlx::{Connection, Executor, Row};
use tokio::runtime::Runtime;

use crate::config::BackendSpec;
use crate::error::{Error, Result};
use crate::record::Record;
use crate::size::bytes_to_kb;

use super::{Backend, BackendKind, START_TIME_INDEX, TABLE_NAME};

/// MySQL backend for benchmarks.
pub struct MySqlBackend {
    name: String,
    conn: Option<MySqlConnection>,
    rt: Runtime,
}

impl MySqlBackend {
    /// Connect using the spec's parameters.
    pub fn connect(spec: &BackendSpec) -> Result<Self> {
        let rt = Runtime::new()?;
        let params = &spec.params;
        let options = MySqlConnectOptions::new()
            .host(&params.host)
            .port(params.port)
            .username(&params.username)
            .password(&params.password)
            .database(&params.database);

        let conn = rt
            .block_on(MySqlConnection::connect_with(&options))
            .map_err(|e| Error::Connection {
                backend: spec.name.clone(),
                message: e.to_string(),
            })?;

        Ok(Self {
            name: spec.name.clone(),
            conn: Some(conn),
            rt,
        })
    }

    fn session(&mut self) -> Result<(&Runtime, &mut MySqlConnection)> {
        let conn = self
            .conn
            .as_mut()
            .ok_or_else(|| Error::Closed(self.name.clone()))?;
        Ok((&self.rt, conn))
    }
}

fn upsert_sql() -> String {
    format!(
        r#"
        INSERT INTO {TABLE_NAME} (created_at, updated_at, start_time, interval_ms, area, source, value)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        ON DUPLICATE KEY UPDATE
            updated_at = VALUES(updated_at),
            source = VALUES(source),
            value = VALUES(value)
        "#
    )
}

fn bind_record<'q>(
    query: sqlx::query::Query<'q, sqlx::MySql, sqlx::mysql::MySqlArguments>,
    record: &'q Record,
) -> sqlx::query::Query<'q, sqlx::MySql, sqlx::mysql::MySqlArguments> {
    query
        .bind(record.created_at)
        .bind(record.updated_at)
        .bind(record.start_time)
        .bind(record.interval_ms)
        .bind(&record.area)
        .bind(&record.source)
        .bind(record.value)
}

fn row_to_record(row: MySqlRow) -> std::result::Result<Record, sqlx::Error> {
    Ok(Record {
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
        start_time: row.try_get::<DateTime<Utc>, _>("start_time")?,
        interval_ms: row.try_get("interval_ms")?,
        area: row.try_get("area")?,
        source: row.try_get("source")?,
        value: row.try_get("value")?,
    })
}

impl Backend for MySqlBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> BackendKind {
        BackendKind::MySql
    }

    fn setup(&mut self) -> Result<()> {
        let (rt, conn) = self.session()?;

        rt.block_on(async {
            sqlx::query(&format!("DROP TABLE IF EXISTS {TABLE_NAME}"))
                .execute(&mut *conn)
                .await?;

            // DATETIME(6): TIMESTAMP stops at 2038. Values are stored as UTC.
            sqlx::query(&format!(
                r#"
                CREATE TABLE {TABLE_NAME} (
                    created_at   DATETIME(6)  NOT NULL,
                    updated_at   DATETIME(6)  NOT NULL,
                    start_time   DATETIME(6)  NOT NULL,
                    interval_ms  BIGINT       NOT NULL,
                    area         VARCHAR(64)  NOT NULL,
                    source       VARCHAR(255) NOT NULL,
                    value        DOUBLE       NOT NULL,
                    PRIMARY KEY (start_time, interval_ms, area),
                    INDEX {START_TIME_INDEX} (start_time DESC)
                ) ENGINE = InnoDB
                "#
            ))
            .execute(&mut *conn)
            .await?;

            Ok(())
        })
    }

    fn close(&mut self) -> Result<()> {
        match self.conn.take() {
            Some(conn) => Ok(self.rt.block_on(conn.close())?),
            None => Ok(()),
        }
    }

    fn upsert_single(&mut self, records: &[Record]) -> Result<()> {
        let (rt, conn) = self.session()?;
        let sql = upsert_sql();

        rt.block_on(async {
            for record in records {
                bind_record(sqlx::query(&sql), record)
                    .execute(&mut *conn)
                    .await?;
            }
            Ok(())
        })
    }

    fn upsert_bulk(&mut self, records: &[Record]) -> Result<()> {
        let (rt, conn) = self.session()?;
        let sql = upsert_sql();

        rt.block_on(async {
            let mut tx = conn.begin().await?;
            for record in records {
                bind_record(sqlx::query(&sql), record)
                    .execute(&mut *tx)
                    .await?;
            }
            tx.commit().await?;
            Ok(())
        })
    }

    fn get_ordered_with_limit(&mut self, limit: usize) -> Result<Vec<Record>> {
        let (rt, conn) = self.session()?;
        let sql = format!(
            "SELECT created_at, updated_at, start_time, interval_ms, area, source, value \
             FROM {TABLE_NAME} ORDER BY start_time DESC LIMIT ?"
        );

        rt.block_on(async {
            let rows = sqlx::query(&sql)
                .bind(limit as i64)
                .fetch_all(&mut *conn)
                .await?;
            rows.into_iter()
                .map(|row| row_to_record(row).map_err(Error::from))
                .collect()
        })
    }

    fn table_size_kb(&mut self) -> Result<u64> {
        let (rt, conn) = self.session()?;

        rt.block_on(async {
            // information_schema statistics are cached until analyzed.
            (&mut *conn)
                .execute(format!("ANALYZE TABLE {TABLE_NAME}").as_str())
                .await?;

            let bytes: i64 = sqlx::query_scalar(
                r#"
                SELECT CAST(COALESCE(SUM(data_length + index_length), 0) AS SIGNED)
                FROM information_schema.tables
                WHERE table_schema = DATABASE() AND table_name = ?
                "#,
            )
            .bind(TABLE_NAME)
            .fetch_one(&mut *conn)
            .await?;

            Ok(bytes_to_kb(bytes))
        })
    }
}
