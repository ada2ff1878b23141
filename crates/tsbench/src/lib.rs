//! Time-series storage benchmark.
//!
//! Drives several storage engines through the same synthetic workload and
//! reports comparable timings and storage footprints.
//!
//! # Benchmark Phases
//!
//! - **Setup**: drop and recreate the `data_objects` table/collection
//! - **Bulk load**: write the full generated dataset
//! - **Upsert single**: repeated per-row upserts of a fixed subset
//! - **Upsert bulk**: the same subset as one grouped operation
//! - **Compaction**: manual compression for backends that defer it
//! - **Ordered read**: newest-first range read with a row limit
//! - **Size**: storage footprint, immediately and after a settling delay
//!
//! # Backends
//!
//! MongoDB, PostgreSQL, PostgreSQL + TimescaleDB, MySQL, DuckDB and an
//! in-process baseline. Each network backend sits behind a cargo feature.

pub mod backends;
pub mod config;
pub mod error;
pub mod fixtures;
pub mod harness;
pub mod record;
pub mod report;
pub mod size;

pub use backends::{AnyBackend, Backend, BackendKind, ManualCompression, MemoryBackend};
pub use config::{BackendSpec, BenchConfig, ConnectionParams, LoadMode, RunContext, Schedule};
pub use error::{Error, Result};
pub use fixtures::generate_records;
pub use harness::{Harness, Phase};
pub use record::{NaturalKey, Record};
pub use report::{BackendReport, BenchReport, PhaseTiming};
pub use size::{bytes_to_kb, parse_size_kb, SizeParseError};
