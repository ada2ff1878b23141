//! Storage backends under benchmark.
//!
//! Every engine implements the same [`Backend`] capability set so the
//! harness can drive them through identical phases. [`AnyBackend`] is the
//! closed set of engines this crate knows about.

pub mod memory;

#[cfg(feature = "duckdb")]
pub mod duckdb;
#[cfg(feature = "mongodb")]
pub mod mongo;
#[cfg(feature = "mysql")]
pub mod mysql;
#[cfg(feature = "postgres")]
pub mod postgres;

use std::str::FromStr;

use serde::Serialize;

use crate::config::{BackendSpec, PORT_MONGODB, PORT_MYSQL, PORT_POSTGRES, PORT_TIMESCALE};
use crate::error::Result;
use crate::record::Record;

pub use memory::MemoryBackend;

#[cfg(feature = "duckdb")]
pub use self::duckdb::DuckDbBackend;
#[cfg(feature = "mongodb")]
pub use mongo::MongoBackend;
#[cfg(feature = "mysql")]
pub use mysql::MySqlBackend;
#[cfg(feature = "postgres")]
pub use postgres::PostgresBackend;

/// Table (or collection) holding the benchmark rows.
pub const TABLE_NAME: &str = "data_objects";

/// Secondary index serving the newest-first read.
pub const START_TIME_INDEX: &str = "idx_start_time";

/// Capability contract shared by every storage engine.
///
/// All writes are upserts on the natural key `(start_time, interval_ms,
/// area)`: a conflicting write overwrites `updated_at`, `source` and
/// `value` and keeps the stored `created_at`.
pub trait Backend {
    /// Display name used in logs and reports.
    fn name(&self) -> &str;

    /// Engine behind this backend.
    fn kind(&self) -> BackendKind;

    /// Drop and recreate the benchmark table with its unique key and
    /// `start_time` index.
    fn setup(&mut self) -> Result<()>;

    /// Release the connection. Calling it again is a no-op.
    fn close(&mut self) -> Result<()>;

    /// Upsert each record as an independent operation.
    fn upsert_single(&mut self, records: &[Record]) -> Result<()>;

    /// Upsert all records as one grouped operation, returning the first
    /// error.
    fn upsert_bulk(&mut self, records: &[Record]) -> Result<()>;

    /// At most `limit` records, newest `start_time` first.
    fn get_ordered_with_limit(&mut self, limit: usize) -> Result<Vec<Record>>;

    /// Best-effort storage footprint in kilobytes.
    fn table_size_kb(&mut self) -> Result<u64>;

    /// Manual compaction hook, for engines that defer compression.
    fn manual_compression(&mut self) -> Option<&mut dyn ManualCompression> {
        None
    }
}

/// Optional extension for engines that compress in the background.
///
/// Without a manual run the size measurement would show uncompressed data.
pub trait ManualCompression {
    /// Compress everything written so far.
    fn exec_manual_compression(&mut self) -> Result<()>;
}

/// Storage engines known to the benchmark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// In-process baseline.
    Memory,
    /// MongoDB document store.
    MongoDb,
    /// Plain PostgreSQL.
    Postgres,
    /// PostgreSQL with a TimescaleDB hypertable.
    Timescale,
    /// MySQL (InnoDB).
    MySql,
    /// Embedded DuckDB.
    DuckDb,
}

impl BackendKind {
    /// Every kind, in report order.
    pub const ALL: [BackendKind; 6] = [
        BackendKind::MongoDb,
        BackendKind::Postgres,
        BackendKind::Timescale,
        BackendKind::MySql,
        BackendKind::DuckDb,
        BackendKind::Memory,
    ];

    /// Identifier used on the command line.
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Memory => "memory",
            BackendKind::MongoDb => "mongodb",
            BackendKind::Postgres => "postgres",
            BackendKind::Timescale => "timescale",
            BackendKind::MySql => "mysql",
            BackendKind::DuckDb => "duckdb",
        }
    }

    /// Default display name in reports.
    pub fn default_name(&self) -> &'static str {
        match self {
            BackendKind::Memory => "memory",
            BackendKind::MongoDb => "mongodb",
            BackendKind::Postgres => "pg-native",
            BackendKind::Timescale => "pg-timescale",
            BackendKind::MySql => "mysql",
            BackendKind::DuckDb => "duckdb",
        }
    }

    /// Default server port, for network backends.
    pub fn default_port(&self) -> Option<u16> {
        match self {
            BackendKind::MongoDb => Some(PORT_MONGODB),
            BackendKind::Postgres => Some(PORT_POSTGRES),
            BackendKind::Timescale => Some(PORT_TIMESCALE),
            BackendKind::MySql => Some(PORT_MYSQL),
            BackendKind::Memory | BackendKind::DuckDb => None,
        }
    }

    /// Whether this build includes the driver for this kind.
    pub fn is_available(&self) -> bool {
        match self {
            BackendKind::Memory => true,
            BackendKind::MongoDb => cfg!(feature = "mongodb"),
            BackendKind::Postgres | BackendKind::Timescale => cfg!(feature = "postgres"),
            BackendKind::MySql => cfg!(feature = "mysql"),
            BackendKind::DuckDb => cfg!(feature = "duckdb"),
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        BackendKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == wanted)
            .ok_or_else(|| {
                let known: Vec<_> = BackendKind::ALL.iter().map(|k| k.as_str()).collect();
                format!("unknown backend {s:?} (expected one of: {})", known.join(", "))
            })
    }
}

/// Any backend this crate can drive.
pub enum AnyBackend {
    Memory(MemoryBackend),
    #[cfg(feature = "mongodb")]
    Mongo(MongoBackend),
    #[cfg(feature = "postgres")]
    Postgres(PostgresBackend),
    #[cfg(feature = "mysql")]
    MySql(MySqlBackend),
    #[cfg(feature = "duckdb")]
    DuckDb(DuckDbBackend),
}

macro_rules! dispatch {
    ($self:ident, $backend:ident => $call:expr) => {
        match $self {
            AnyBackend::Memory($backend) => $call,
            #[cfg(feature = "mongodb")]
            AnyBackend::Mongo($backend) => $call,
            #[cfg(feature = "postgres")]
            AnyBackend::Postgres($backend) => $call,
            #[cfg(feature = "mysql")]
            AnyBackend::MySql($backend) => $call,
            #[cfg(feature = "duckdb")]
            AnyBackend::DuckDb($backend) => $call,
        }
    };
}

impl AnyBackend {
    /// Open the backend described by `spec`.
    ///
    /// Network backends connect eagerly; an unreachable server fails here.
    pub fn connect(spec: &BackendSpec) -> Result<Self> {
        tracing::debug!(backend = %spec.name, kind = %spec.kind, "connecting");

        match spec.kind {
            BackendKind::Memory => Ok(Self::Memory(MemoryBackend::new(spec.name.clone()))),
            BackendKind::MongoDb => {
                #[cfg(feature = "mongodb")]
                let backend = MongoBackend::connect(spec).map(Self::Mongo);
                #[cfg(not(feature = "mongodb"))]
                let backend = Err(crate::error::Error::Unavailable("mongodb"));
                backend
            }
            BackendKind::Postgres | BackendKind::Timescale => {
                #[cfg(feature = "postgres")]
                let backend = PostgresBackend::connect(spec).map(Self::Postgres);
                #[cfg(not(feature = "postgres"))]
                let backend = Err(crate::error::Error::Unavailable("postgres"));
                backend
            }
            BackendKind::MySql => {
                #[cfg(feature = "mysql")]
                let backend = MySqlBackend::connect(spec).map(Self::MySql);
                #[cfg(not(feature = "mysql"))]
                let backend = Err(crate::error::Error::Unavailable("mysql"));
                backend
            }
            BackendKind::DuckDb => {
                #[cfg(feature = "duckdb")]
                let backend = DuckDbBackend::open(spec).map(Self::DuckDb);
                #[cfg(not(feature = "duckdb"))]
                let backend = Err(crate::error::Error::Unavailable("duckdb"));
                backend
            }
        }
    }

    /// Open every backend in order, closing the ones already open if a
    /// later one fails.
    pub fn connect_all(specs: &[BackendSpec]) -> Result<Vec<Self>> {
        let mut backends = Vec::with_capacity(specs.len());
        for spec in specs {
            match Self::connect(spec) {
                Ok(backend) => backends.push(backend),
                Err(e) => {
                    for backend in &mut backends {
                        if let Err(close_err) = backend.close() {
                            tracing::warn!(backend = backend.name(), error = %close_err, "close failed");
                        }
                    }
                    return Err(e);
                }
            }
        }
        Ok(backends)
    }
}

impl Backend for AnyBackend {
    fn name(&self) -> &str {
        dispatch!(self, b => b.name())
    }

    fn kind(&self) -> BackendKind {
        dispatch!(self, b => b.kind())
    }

    fn setup(&mut self) -> Result<()> {
        dispatch!(self, b => b.setup())
    }

    fn close(&mut self) -> Result<()> {
        dispatch!(self, b => b.close())
    }

    fn upsert_single(&mut self, records: &[Record]) -> Result<()> {
        dispatch!(self, b => b.upsert_single(records))
    }

    fn upsert_bulk(&mut self, records: &[Record]) -> Result<()> {
        dispatch!(self, b => b.upsert_bulk(records))
    }

    fn get_ordered_with_limit(&mut self, limit: usize) -> Result<Vec<Record>> {
        dispatch!(self, b => b.get_ordered_with_limit(limit))
    }

    fn table_size_kb(&mut self) -> Result<u64> {
        dispatch!(self, b => b.table_size_kb())
    }

    fn manual_compression(&mut self) -> Option<&mut dyn ManualCompression> {
        dispatch!(self, b => b.manual_compression())
    }
}
