//! Benchmark and backend configuration.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, SubsecRound, TimeZone, Utc};
use serde::Serialize;

use crate::backends::BackendKind;
use crate::error::{Error, Result};

/// Default number of generated records.
pub const DEFAULT_RECORDS: usize = 500_000;

/// Default size of the steady-state upsert subset and of the ordered read.
pub const DEFAULT_SUBSET: usize = 4_000;

/// Default repetitions of each steady-state phase.
pub const DEFAULT_ITERATIONS: u32 = 10;

/// Default pause before the second size measurement.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(60);

/// Default generator seed.
pub const DEFAULT_SEED: u64 = 42;

/// Database (or MongoDB database) holding the benchmark table.
pub const DEFAULT_DATABASE: &str = "timeseries_benchmark";

/// Default credentials of the benchmark containers.
pub const DEFAULT_USERNAME: &str = "test";
pub const DEFAULT_PASSWORD: &str = "test";

/// Default host for every network backend.
pub const DEFAULT_HOST: &str = "localhost";

/// Default ports, one container per backend.
pub const PORT_MONGODB: u16 = 5551;
pub const PORT_POSTGRES: u16 = 5552;
pub const PORT_TIMESCALE: u16 = 5553;
pub const PORT_MYSQL: u16 = 5554;

/// Default DuckDB database file.
pub const DEFAULT_DUCKDB_PATH: &str = "./duckdb.db";

/// Default TimescaleDB chunk interval (30 days).
pub const DEFAULT_CHUNK_INTERVAL: Duration = Duration::from_secs(30 * 24 * 3600);

/// Default MongoDB connection pool size.
pub const DEFAULT_MONGO_POOL_SIZE: u32 = 20;

/// How the full dataset is written during the bulk-load phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum LoadMode {
    /// One upsert per record.
    Single,
    /// One grouped upsert for the whole dataset.
    Bulk,
}

impl std::fmt::Display for LoadMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadMode::Single => write!(f, "single"),
            LoadMode::Bulk => write!(f, "bulk"),
        }
    }
}

impl FromStr for LoadMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "single" => Ok(LoadMode::Single),
            "bulk" => Ok(LoadMode::Bulk),
            other => Err(format!("unknown load mode {other:?} (expected single or bulk)")),
        }
    }
}

/// Order in which phases and backends are interleaved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Schedule {
    /// Every backend completes a phase before the next phase starts.
    PhaseMajor,
    /// One backend completes every phase before the next backend starts.
    BackendMajor,
}

impl std::fmt::Display for Schedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Schedule::PhaseMajor => write!(f, "phase-major"),
            Schedule::BackendMajor => write!(f, "backend-major"),
        }
    }
}

impl FromStr for Schedule {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "phase-major" => Ok(Schedule::PhaseMajor),
            "backend-major" => Ok(Schedule::BackendMajor),
            other => Err(format!(
                "unknown schedule {other:?} (expected phase-major or backend-major)"
            )),
        }
    }
}

/// Run-scoped values shared by the generator and the backends.
#[derive(Debug, Clone, PartialEq)]
pub struct RunContext {
    /// `start_time` of the first generated record.
    pub base_time: DateTime<Utc>,
    /// Audit timestamp stamped on generated records.
    pub written_at: DateTime<Utc>,
    /// Seed of the value generator.
    pub seed: u64,
}

impl RunContext {
    /// Context for a run starting now.
    ///
    /// `written_at` is truncated to milliseconds, the coarsest precision of
    /// any backend, so timestamps round-trip exactly.
    pub fn new() -> Self {
        Self {
            base_time: default_base_time(),
            written_at: Utc::now().trunc_subsecs(3),
            seed: DEFAULT_SEED,
        }
    }

    /// Set the base timestamp.
    pub fn with_base_time(mut self, base_time: DateTime<Utc>) -> Self {
        self.base_time = base_time;
        self
    }

    /// Set the audit timestamp.
    pub fn with_written_at(mut self, written_at: DateTime<Utc>) -> Self {
        self.written_at = written_at.trunc_subsecs(3);
        self
    }

    /// Set the generator seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new()
    }
}

/// 2021-01-01T00:00:00Z.
pub fn default_base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or_default()
}

/// Benchmark run configuration.
#[derive(Debug, Clone)]
pub struct BenchConfig {
    /// Size of the generated dataset.
    pub records: usize,
    /// Records re-upserted by the steady-state phases. Must be smaller than
    /// `records`.
    pub subset: usize,
    /// Row limit of the ordered read. Follows `subset` until set explicitly.
    pub read_limit: usize,
    /// Repetitions of each steady-state phase.
    pub iterations: u32,
    /// How the full dataset is loaded.
    pub load_mode: LoadMode,
    /// Phase/backend interleaving.
    pub schedule: Schedule,
    /// Pause before the second size measurement.
    pub settle_delay: Duration,
    /// Run-scoped generator inputs.
    pub context: RunContext,
    read_limit_set: bool,
}

impl BenchConfig {
    /// Configuration with the default workload.
    pub fn new() -> Self {
        Self {
            records: DEFAULT_RECORDS,
            subset: DEFAULT_SUBSET,
            read_limit: DEFAULT_SUBSET,
            iterations: DEFAULT_ITERATIONS,
            load_mode: LoadMode::Single,
            schedule: Schedule::PhaseMajor,
            settle_delay: DEFAULT_SETTLE_DELAY,
            context: RunContext::new(),
            read_limit_set: false,
        }
    }

    /// Set the dataset size.
    pub fn with_records(mut self, records: usize) -> Self {
        self.records = records;
        self
    }

    /// Set the steady-state subset size. The read limit follows unless it
    /// was set with [`with_read_limit`](Self::with_read_limit).
    pub fn with_subset(mut self, subset: usize) -> Self {
        self.subset = subset;
        if !self.read_limit_set {
            self.read_limit = subset;
        }
        self
    }

    /// Set the ordered read limit.
    pub fn with_read_limit(mut self, read_limit: usize) -> Self {
        self.read_limit = read_limit;
        self.read_limit_set = true;
        self
    }

    /// Set the steady-state repetitions.
    pub fn with_iterations(mut self, iterations: u32) -> Self {
        self.iterations = iterations;
        self
    }

    /// Set the load mode.
    pub fn with_load_mode(mut self, load_mode: LoadMode) -> Self {
        self.load_mode = load_mode;
        self
    }

    /// Set the schedule.
    pub fn with_schedule(mut self, schedule: Schedule) -> Self {
        self.schedule = schedule;
        self
    }

    /// Set the settling delay.
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// Set the run context.
    pub fn with_context(mut self, context: RunContext) -> Self {
        self.context = context;
        self
    }

    /// Check the workload shape against a generated dataset.
    pub fn validate(&self, dataset_len: usize) -> Result<()> {
        if self.records == 0 {
            return Err(Error::Config("records must be greater than zero".into()));
        }
        if dataset_len != self.records {
            return Err(Error::Config(format!(
                "dataset has {} records, configuration expects {}",
                dataset_len, self.records
            )));
        }
        if self.subset == 0 || self.subset >= self.records {
            return Err(Error::Config(format!(
                "subset must be in 1..{} (got {})",
                self.records, self.subset
            )));
        }
        if self.read_limit == 0 || self.read_limit > self.records {
            return Err(Error::Config(format!(
                "read limit must be in 1..={} (got {})",
                self.records, self.read_limit
            )));
        }
        if self.iterations == 0 {
            return Err(Error::Config("iterations must be greater than zero".into()));
        }
        Ok(())
    }
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Network location and credentials of one backend.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionParams {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub database: String,
}

impl ConnectionParams {
    /// Defaults for the given backend kind.
    pub fn for_kind(kind: BackendKind) -> Self {
        Self::default().with_port(kind.default_port().unwrap_or(PORT_POSTGRES))
    }

    /// Set the host.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Set the port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the credentials. An empty username disables authentication on
    /// backends that allow it.
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = username.into();
        self.password = password.into();
        self
    }

    /// Set the database name.
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    /// Whether credentials were supplied.
    pub fn has_credentials(&self) -> bool {
        !self.username.is_empty() && !self.password.is_empty()
    }
}

impl Default for ConnectionParams {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: PORT_POSTGRES,
            username: DEFAULT_USERNAME.to_string(),
            password: DEFAULT_PASSWORD.to_string(),
            database: DEFAULT_DATABASE.to_string(),
        }
    }
}

/// TimescaleDB hypertable options.
#[derive(Debug, Clone, PartialEq)]
pub struct TimescaleOptions {
    /// Time range covered by one chunk.
    pub chunk_interval: Duration,
    /// Age after which the background policy compresses chunks. `None`
    /// leaves compression to manual runs.
    pub compression_policy: Option<Duration>,
}

impl Default for TimescaleOptions {
    fn default() -> Self {
        Self {
            chunk_interval: DEFAULT_CHUNK_INTERVAL,
            compression_policy: None,
        }
    }
}

/// Everything needed to open one backend.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendSpec {
    /// Display name used in logs and reports.
    pub name: String,
    pub kind: BackendKind,
    pub params: ConnectionParams,
    pub timescale: TimescaleOptions,
    /// DuckDB database file. `None` opens an in-memory database.
    pub duckdb_path: Option<PathBuf>,
    /// Upper bound of the MongoDB connection pool.
    pub mongo_pool_size: u32,
}

impl BackendSpec {
    /// Spec with the defaults of the given kind.
    pub fn new(kind: BackendKind) -> Self {
        Self {
            name: kind.default_name().to_string(),
            kind,
            params: ConnectionParams::for_kind(kind),
            timescale: TimescaleOptions::default(),
            duckdb_path: Some(PathBuf::from(DEFAULT_DUCKDB_PATH)),
            mongo_pool_size: DEFAULT_MONGO_POOL_SIZE,
        }
    }

    /// Set the display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the connection parameters.
    pub fn with_params(mut self, params: ConnectionParams) -> Self {
        self.params = params;
        self
    }

    /// Set the TimescaleDB options.
    pub fn with_timescale(mut self, options: TimescaleOptions) -> Self {
        self.timescale = options;
        self
    }

    /// Set the DuckDB database file.
    pub fn with_duckdb_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.duckdb_path = Some(path.into());
        self
    }

    /// Use an in-memory DuckDB database.
    pub fn with_duckdb_in_memory(mut self) -> Self {
        self.duckdb_path = None;
        self
    }

    /// Set the MongoDB pool size.
    pub fn with_mongo_pool_size(mut self, size: u32) -> Self {
        self.mongo_pool_size = size.max(1);
        self
    }
}
