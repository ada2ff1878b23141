//! PostgreSQL backend, with optional TimescaleDB hypertable.
//!
//! Requires a running PostgreSQL instance (with the timescaledb extension
//! available for the hypertable variant). Enable with `--features postgres`.

use chrono::{DateTime, Utc};
use sqlx::postgres::{PgConnectOptions, PgConnection, PgRow};
use sqlx::{Connection, Row};
use tokio::runtime::Runtime;

use crate::config::{BackendSpec, TimescaleOptions};
use crate::error::{Error, Result};
use crate::record::Record;
use crate::size::{bytes_to_kb, parse_size_kb};

use super::{Backend, BackendKind, ManualCompression, START_TIME_INDEX, TABLE_NAME};

/// PostgreSQL backend for benchmarks.
pub struct PostgresBackend {
    name: String,
    conn: Option<PgConnection>,
    rt: Runtime,
    /// Hypertable options; `None` for plain PostgreSQL.
    timescale: Option<TimescaleOptions>,
}

impl PostgresBackend {
    /// Connect using the spec's parameters. A `Timescale` spec enables the
    /// hypertable variant.
    pub fn connect(spec: &BackendSpec) -> Result<Self> {
        let rt = Runtime::new()?;
        let params = &spec.params;
        let options = PgConnectOptions::new()
            .host(&params.host)
            .port(params.port)
            .username(&params.username)
            .password(&params.password)
            .database(&params.database)
            .application_name("tsbench");

        let conn = rt
            .block_on(PgConnection::connect_with(&options))
            .map_err(|e| Error::Connection {
                backend: spec.name.clone(),
                message: e.to_string(),
            })?;

        let timescale =
            (spec.kind == BackendKind::Timescale).then(|| spec.timescale.clone());

        Ok(Self {
            name: spec.name.clone(),
            conn: Some(conn),
            rt,
            timescale,
        })
    }

    /// Whether the table is a TimescaleDB hypertable.
    pub fn is_timescale(&self) -> bool {
        self.timescale.is_some()
    }

    fn session(&mut self) -> Result<(&Runtime, &mut PgConnection)> {
        let conn = self
            .conn
            .as_mut()
            .ok_or_else(|| Error::Closed(self.name.clone()))?;
        Ok((&self.rt, conn))
    }
}

/// The time index is created by `setup` for both variants, so the
/// hypertable skips its own.
const CREATE_HYPERTABLE_SQL: &str = "SELECT create_hypertable($1::regclass, \
     by_range('start_time', make_interval(secs => $2)), create_default_indexes => false)";

fn upsert_sql() -> String {
    format!(
        r#"
        INSERT INTO {TABLE_NAME} (created_at, updated_at, start_time, interval_ms, area, source, value)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ON CONFLICT (start_time, interval_ms, area) DO UPDATE
        SET updated_at = EXCLUDED.updated_at, source = EXCLUDED.source, value = EXCLUDED.value
        "#
    )
}

fn bind_record<'q>(
    query: sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>,
    record: &'q Record,
) -> sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments> {
    query
        .bind(record.created_at)
        .bind(record.updated_at)
        .bind(record.start_time)
        .bind(record.interval_ms)
        .bind(&record.area)
        .bind(&record.source)
        .bind(record.value)
}

fn row_to_record(row: PgRow) -> std::result::Result<Record, sqlx::Error> {
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

impl Backend for PostgresBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> BackendKind {
        if self.is_timescale() {
            BackendKind::Timescale
        } else {
            BackendKind::Postgres
        }
    }

    fn setup(&mut self) -> Result<()> {
        let timescale = self.timescale.clone();
        let (rt, conn) = self.session()?;

        rt.block_on(async {
            if timescale.is_some() {
                sqlx::query("CREATE EXTENSION IF NOT EXISTS timescaledb")
                    .execute(&mut *conn)
                    .await?;
            }

            sqlx::query(&format!("DROP TABLE IF EXISTS {TABLE_NAME}"))
                .execute(&mut *conn)
                .await?;

            sqlx::query(&format!(
                r#"
                CREATE TABLE {TABLE_NAME} (
                    created_at   TIMESTAMPTZ      NOT NULL,
                    updated_at   TIMESTAMPTZ      NOT NULL,
                    start_time   TIMESTAMPTZ      NOT NULL,
                    interval_ms  BIGINT           NOT NULL,
                    area         TEXT             NOT NULL,
                    source       TEXT             NOT NULL,
                    value        DOUBLE PRECISION NOT NULL,
                    PRIMARY KEY (start_time, interval_ms, area)
                )
                "#
            ))
            .execute(&mut *conn)
            .await?;

            if let Some(options) = &timescale {
                tracing::debug!(chunk_interval = ?options.chunk_interval, "creating hypertable");
                sqlx::query(CREATE_HYPERTABLE_SQL)
                    .bind(TABLE_NAME)
                    .bind(options.chunk_interval.as_secs_f64())
                    .execute(&mut *conn)
                    .await?;

                sqlx::query(&format!(
                    r#"
                    ALTER TABLE {TABLE_NAME} SET (
                        timescaledb.compress,
                        timescaledb.compress_segmentby = 'area',
                        timescaledb.compress_orderby = 'start_time DESC'
                    )
                    "#
                ))
                .execute(&mut *conn)
                .await?;

                if let Some(after) = options.compression_policy {
                    sqlx::query("SELECT add_compression_policy($1::regclass, make_interval(secs => $2))")
                        .bind(TABLE_NAME)
                        .bind(after.as_secs_f64())
                        .execute(&mut *conn)
                        .await?;
                }
            }

            sqlx::query(&format!(
                "CREATE INDEX IF NOT EXISTS {START_TIME_INDEX} ON {TABLE_NAME} (start_time DESC)"
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
            // Dropping the transaction on error rolls it back.
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
             FROM {TABLE_NAME} ORDER BY start_time DESC LIMIT $1"
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
        let timescale = self.is_timescale();
        let (rt, conn) = self.session()?;

        rt.block_on(async {
            if timescale {
                let bytes: Option<i64> = sqlx::query_scalar("SELECT hypertable_size($1::regclass)")
                    .bind(TABLE_NAME)
                    .fetch_one(&mut *conn)
                    .await?;
                return Ok(bytes_to_kb(bytes.unwrap_or(0)));
            }

            let pretty: String =
                sqlx::query_scalar("SELECT pg_size_pretty(pg_total_relation_size($1::regclass))")
                    .bind(TABLE_NAME)
                    .fetch_one(&mut *conn)
                    .await?;
            Ok(parse_size_kb(&pretty)?)
        })
    }

    fn manual_compression(&mut self) -> Option<&mut dyn ManualCompression> {
        if self.is_timescale() {
            Some(self)
        } else {
            None
        }
    }
}

impl ManualCompression for PostgresBackend {
    /// Compress every chunk of the hypertable.
    ///
    /// Freshly written chunks stay uncompressed until the background policy
    /// runs, so size measurements need this first.
    fn exec_manual_compression(&mut self) -> Result<()> {
        if !self.is_timescale() {
            return Err(Error::Unsupported {
                backend: self.name.clone(),
                operation: "manual compression",
            });
        }

        let (rt, conn) = self.session()?;
        rt.block_on(async {
            let compressed = sqlx::query(
                "SELECT compress_chunk(c, if_not_compressed => true) FROM show_chunks($1::regclass) c",
            )
            .bind(TABLE_NAME)
            .fetch_all(&mut *conn)
            .await?;
            tracing::debug!(chunks = compressed.len(), "chunks compressed");
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConnectionParams, RunContext};
    use crate::fixtures::generate_records;

    /// Spec pointing at `TSBENCH_HOST` and `TSBENCH_<KIND>_PORT`.
    fn spec_from_env(kind: BackendKind) -> BackendSpec {
        let mut params = ConnectionParams::for_kind(kind);
        if let Ok(host) = std::env::var("TSBENCH_HOST") {
            params = params.with_host(host);
        }
        let port_var = match kind {
            BackendKind::Timescale => "TSBENCH_TIMESCALE_PORT",
            _ => "TSBENCH_POSTGRES_PORT",
        };
        if let Some(port) = std::env::var(port_var).ok().and_then(|p| p.parse().ok()) {
            params = params.with_port(port);
        }
        BackendSpec::new(kind).with_params(params)
    }

    #[test]
    fn test_upsert_sql_targets_natural_key() {
        let sql = upsert_sql();
        assert!(sql.contains("ON CONFLICT (start_time, interval_ms, area)"));
        assert!(!sql.contains("created_at = "));
    }

    #[test]
    fn test_hypertable_skips_default_time_index() {
        assert!(CREATE_HYPERTABLE_SQL.contains("create_default_indexes => false"));
    }

    #[test]
    #[ignore = "requires PostgreSQL on TSBENCH_HOST:TSBENCH_POSTGRES_PORT"]
    fn test_postgres_end_to_end() {
        let mut backend = PostgresBackend::connect(&spec_from_env(BackendKind::Postgres)).unwrap();
        backend.setup().unwrap();
        assert!(backend.manual_compression().is_none());

        let records = generate_records(100, &RunContext::new());
        backend.upsert_bulk(&records).unwrap();
        backend.upsert_single(&records[..10]).unwrap();

        let rows = backend.get_ordered_with_limit(100).unwrap();
        assert_eq!(rows.len(), 100);
        assert_eq!(rows[0], records[99]);
        assert_eq!(rows[99], records[0]);
        assert!(backend.table_size_kb().unwrap() > 0);
        backend.close().unwrap();
        backend.close().unwrap();
    }

    #[test]
    #[ignore = "requires TimescaleDB on TSBENCH_HOST:TSBENCH_TIMESCALE_PORT"]
    fn test_timescale_compression() {
        let mut backend = PostgresBackend::connect(&spec_from_env(BackendKind::Timescale)).unwrap();
        backend.setup().unwrap();
        backend
            .upsert_bulk(&generate_records(2_000, &RunContext::new()))
            .unwrap();

        backend
            .manual_compression()
            .expect("timescale exposes compression")
            .exec_manual_compression()
            .unwrap();
        assert_eq!(backend.get_ordered_with_limit(2_000).unwrap().len(), 2_000);
        backend.close().unwrap();
    }

    #[test]
    #[ignore = "requires TimescaleDB on TSBENCH_HOST:TSBENCH_TIMESCALE_PORT"]
    fn test_timescale_has_one_time_index() {
        let mut backend = PostgresBackend::connect(&spec_from_env(BackendKind::Timescale)).unwrap();
        backend.setup().unwrap();

        let (rt, conn) = backend.session().unwrap();
        let indexes: Vec<String> = rt
            .block_on(
                sqlx::query_scalar("SELECT indexname::text FROM pg_indexes WHERE tablename = $1")
                    .bind(TABLE_NAME)
                    .fetch_all(&mut *conn),
            )
            .unwrap();
        assert_eq!(indexes.len(), 2, "{indexes:?}");
        assert!(indexes.iter().any(|name| name == START_TIME_INDEX));
        backend.close().unwrap();
    }
}
