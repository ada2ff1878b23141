//! Command-line arguments.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tsbench::config::{
    TimescaleOptions, DEFAULT_DATABASE, DEFAULT_DUCKDB_PATH, DEFAULT_HOST, DEFAULT_ITERATIONS,
    DEFAULT_MONGO_POOL_SIZE, DEFAULT_PASSWORD, DEFAULT_RECORDS, DEFAULT_SEED, DEFAULT_SUBSET,
    DEFAULT_USERNAME, PORT_MONGODB, PORT_MYSQL, PORT_POSTGRES, PORT_TIMESCALE,
};
use tsbench::{BackendKind, BackendSpec, BenchConfig, ConnectionParams, LoadMode, RunContext, Schedule};

use crate::formatter::OutputFormat;

const SECONDS_PER_DAY: u64 = 24 * 3600;

/// Time-series storage benchmark
#[derive(Parser, Debug)]
#[command(name = "tsbench")]
#[command(version, about = "Compare time-series storage engines on one workload")]
pub struct Args {
    /// Backends to run, comma separated
    #[arg(long, value_delimiter = ',', default_value = "mongodb,postgres,timescale")]
    pub backends: Vec<BackendKind>,

    /// Records in the generated dataset
    #[arg(long, default_value_t = DEFAULT_RECORDS)]
    pub records: usize,

    /// Records re-upserted by each steady-state iteration
    #[arg(long, default_value_t = DEFAULT_SUBSET)]
    pub subset: usize,

    /// Row limit of the ordered read (defaults to --subset)
    #[arg(long)]
    pub read_limit: Option<usize>,

    /// Repetitions of each steady-state phase
    #[arg(long, default_value_t = DEFAULT_ITERATIONS)]
    pub iterations: u32,

    /// How the full dataset is loaded (single, bulk)
    #[arg(long, default_value = "single")]
    pub load_mode: LoadMode,

    /// Phase/backend interleaving (phase-major, backend-major)
    #[arg(long, default_value = "phase-major")]
    pub schedule: Schedule,

    /// Seconds to wait before the final size measurement
    #[arg(long, default_value_t = 60)]
    pub settle_secs: u64,

    /// Seed of the value generator
    #[arg(long, default_value_t = DEFAULT_SEED)]
    pub seed: u64,

    /// Host of every server backend
    #[arg(short = 'H', long, default_value = DEFAULT_HOST)]
    pub host: String,

    /// Username of every server backend
    #[arg(short, long, default_value = DEFAULT_USERNAME)]
    pub username: String,

    /// Password of every server backend
    #[arg(short, long, default_value = DEFAULT_PASSWORD)]
    pub password: String,

    /// Database holding the benchmark table
    #[arg(long, default_value = DEFAULT_DATABASE)]
    pub database: String,

    /// MongoDB port
    #[arg(long, default_value_t = PORT_MONGODB)]
    pub mongodb_port: u16,

    /// PostgreSQL port
    #[arg(long, default_value_t = PORT_POSTGRES)]
    pub postgres_port: u16,

    /// TimescaleDB port
    #[arg(long, default_value_t = PORT_TIMESCALE)]
    pub timescale_port: u16,

    /// MySQL port
    #[arg(long, default_value_t = PORT_MYSQL)]
    pub mysql_port: u16,

    /// MongoDB connection pool size
    #[arg(long, default_value_t = DEFAULT_MONGO_POOL_SIZE)]
    pub mongodb_pool_size: u32,

    /// DuckDB database file (":memory:" for an in-memory database)
    #[arg(long, default_value = DEFAULT_DUCKDB_PATH)]
    pub duckdb_path: String,

    /// TimescaleDB chunk interval in days
    #[arg(long, default_value_t = 30)]
    pub chunk_interval_days: u64,

    /// Compress TimescaleDB chunks older than this many days (0 = no policy)
    #[arg(long, default_value_t = 0)]
    pub compression_policy_days: u64,

    /// Output format
    #[arg(long, default_value = "table", value_enum)]
    pub format: OutputFormat,

    /// Also write the JSON report to this file
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Everything a run needs, resolved from the arguments.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub bench: BenchConfig,
    pub backends: Vec<BackendSpec>,
    pub format: OutputFormat,
    pub output: Option<PathBuf>,
}

impl Args {
    /// Convert arguments to a run configuration.
    pub fn into_config(self) -> RunConfig {
        let context = RunContext::new().with_seed(self.seed);
        let bench = BenchConfig::new()
            .with_records(self.records)
            .with_subset(self.subset)
            .with_read_limit(self.read_limit.unwrap_or(self.subset))
            .with_iterations(self.iterations)
            .with_load_mode(self.load_mode)
            .with_schedule(self.schedule)
            .with_settle_delay(Duration::from_secs(self.settle_secs))
            .with_context(context);

        let timescale = TimescaleOptions {
            chunk_interval: Duration::from_secs(self.chunk_interval_days.max(1) * SECONDS_PER_DAY),
            compression_policy: (self.compression_policy_days > 0)
                .then(|| Duration::from_secs(self.compression_policy_days * SECONDS_PER_DAY)),
        };

        let backends = self
            .backends
            .iter()
            .map(|&kind| {
                let port = match kind {
                    BackendKind::MongoDb => self.mongodb_port,
                    BackendKind::Postgres => self.postgres_port,
                    BackendKind::Timescale => self.timescale_port,
                    BackendKind::MySql => self.mysql_port,
                    BackendKind::Memory | BackendKind::DuckDb => 0,
                };
                let params = ConnectionParams::default()
                    .with_host(&self.host)
                    .with_port(port)
                    .with_credentials(&self.username, &self.password)
                    .with_database(&self.database);

                let spec = BackendSpec::new(kind)
                    .with_params(params)
                    .with_timescale(timescale.clone())
                    .with_mongo_pool_size(self.mongodb_pool_size);
                if self.duckdb_path == ":memory:" {
                    spec.with_duckdb_in_memory()
                } else {
                    spec.with_duckdb_path(&self.duckdb_path)
                }
            })
            .collect();

        RunConfig {
            bench,
            backends,
            format: self.format,
            output: self.output,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> RunConfig {
        let mut argv = vec!["tsbench"];
        argv.extend_from_slice(args);
        Args::try_parse_from(argv).unwrap().into_config()
    }

    #[test]
    fn test_defaults() {
        let config = parse(&[]);

        assert_eq!(config.bench.records, DEFAULT_RECORDS);
        assert_eq!(config.bench.read_limit, DEFAULT_SUBSET);
        assert_eq!(config.bench.settle_delay, Duration::from_secs(60));
        assert_eq!(config.format, OutputFormat::Table);

        let kinds: Vec<_> = config.backends.iter().map(|s| s.kind).collect();
        assert_eq!(
            kinds,
            [BackendKind::MongoDb, BackendKind::Postgres, BackendKind::Timescale]
        );
        assert_eq!(config.backends[2].params.port, PORT_TIMESCALE);
        assert_eq!(config.backends[2].timescale.compression_policy, None);
        assert_eq!(config.backends[0].name, "mongodb");
    }

    #[test]
    fn test_overrides() {
        let config = parse(&[
            "--backends",
            "mysql,duckdb",
            "--records",
            "1000",
            "--subset",
            "50",
            "--read-limit",
            "20",
            "--load-mode",
            "bulk",
            "--schedule",
            "backend-major",
            "--mysql-port",
            "3306",
            "--duckdb-path",
            ":memory:",
            "--compression-policy-days",
            "7",
            "--format",
            "json",
        ]);

        assert_eq!(config.bench.records, 1000);
        assert_eq!(config.bench.subset, 50);
        assert_eq!(config.bench.read_limit, 20);
        assert_eq!(config.bench.load_mode, LoadMode::Bulk);
        assert_eq!(config.bench.schedule, Schedule::BackendMajor);
        assert_eq!(config.format, OutputFormat::Json);
        assert_eq!(config.backends[0].params.port, 3306);
        assert_eq!(config.backends[1].duckdb_path, None);
        assert_eq!(
            config.backends[0].timescale.compression_policy,
            Some(Duration::from_secs(7 * SECONDS_PER_DAY))
        );
        assert!(config.bench.validate(1000).is_ok());
    }

    #[test]
    fn test_unknown_backend_rejected() {
        assert!(Args::try_parse_from(["tsbench", "--backends", "influxdb"]).is_err());
        assert!(Args::try_parse_from(["tsbench", "--load-mode", "batch"]).is_err());
    }
}
