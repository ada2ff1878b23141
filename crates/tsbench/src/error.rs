//! Benchmark error types.

use thiserror::Error;

use crate::harness::Phase;
use crate::size::SizeParseError;

/// Result type for benchmark operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Benchmark errors.
///
/// Every variant is fatal: the orchestrator never retries and never reports
/// partial metrics.
#[derive(Debug, Error)]
pub enum Error {
    /// Backend could not be reached.
    #[error("connection to {backend} failed: {message}")]
    Connection { backend: String, message: String },

    /// SQL driver error (PostgreSQL, TimescaleDB, MySQL).
    #[cfg(any(feature = "postgres", feature = "mysql"))]
    #[error("sql error: {0}")]
    Sql(#[from] sqlx::Error),

    /// MongoDB driver error.
    #[cfg(feature = "mongodb")]
    #[error("mongodb error: {0}")]
    Mongo(#[from] mongodb::error::Error),

    /// Missing or mistyped field in a BSON document.
    #[cfg(feature = "mongodb")]
    #[error("bson error: {0}")]
    Bson(#[from] bson::document::ValueAccessError),

    /// DuckDB error.
    #[cfg(feature = "duckdb")]
    #[error("duckdb error: {0}")]
    DuckDb(#[from] duckdb::Error),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The backend rejected a write.
    #[error("write rejected: {0}")]
    Write(String),

    /// Ordered read returned a different number of rows than requested.
    #[error("{backend}: expected {expected} rows, got {actual}")]
    CountMismatch {
        backend: String,
        expected: usize,
        actual: usize,
    },

    /// Storage size report could not be parsed.
    #[error("size parse error: {0}")]
    SizeParse(#[from] SizeParseError),

    /// Operation not offered by this backend.
    #[error("{backend} does not support {operation}")]
    Unsupported {
        backend: String,
        operation: &'static str,
    },

    /// Backend kind compiled out of this build.
    #[error("backend {0} is not available in this build (enable its cargo feature)")]
    Unavailable(&'static str),

    /// Operation attempted after close.
    #[error("{0} is closed")]
    Closed(String),

    /// Invalid benchmark configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Failure inside a benchmark phase.
    #[error("{backend} failed during {phase}: {source}")]
    Phase {
        backend: String,
        phase: Phase,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Attach backend and phase context.
    ///
    /// Errors that already carry that context pass through unchanged.
    pub fn in_phase(self, backend: &str, phase: Phase) -> Self {
        match self {
            Error::Phase { .. } | Error::CountMismatch { .. } => self,
            other => Error::Phase {
                backend: backend.to_string(),
                phase,
                source: Box::new(other),
            },
        }
    }

    /// The innermost error, skipping phase context.
    pub fn root(&self) -> &Error {
        match self {
            Error::Phase { source, .. } => source.root(),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_phase_wraps_once() {
        let err = Error::Write("duplicate".to_string())
            .in_phase("pg-native", Phase::UpsertBulk)
            .in_phase("pg-native", Phase::UpsertBulk);

        match &err {
            Error::Phase { backend, phase, source } => {
                assert_eq!(backend, "pg-native");
                assert_eq!(*phase, Phase::UpsertBulk);
                assert!(matches!(**source, Error::Write(_)));
            }
            other => panic!("expected phase error, got {other:?}"),
        }
        assert!(matches!(err.root(), Error::Write(_)));
    }

    #[test]
    fn test_count_mismatch_is_not_wrapped() {
        let err = Error::CountMismatch {
            backend: "mongodb".to_string(),
            expected: 10,
            actual: 3,
        }
        .in_phase("mongodb", Phase::OrderedRead);

        assert!(matches!(err, Error::CountMismatch { expected: 10, actual: 3, .. }));
    }

    #[test]
    fn test_display() {
        let err = Error::Unsupported {
            backend: "pg-native".to_string(),
            operation: "manual compression",
        };
        assert_eq!(err.to_string(), "pg-native does not support manual compression");
    }
}
