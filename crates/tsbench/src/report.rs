//! Benchmark results.
//!
//! Everything here is plain data, serializable with serde for JSON output.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Serialize, Serializer};

use crate::backends::BackendKind;
use crate::config::{LoadMode, Schedule};
use crate::harness::Phase;

/// Durations are reported as fractional milliseconds.
fn as_millis<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_secs_f64() * 1_000.0)
}

/// Timing of one phase on one backend.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhaseTiming {
    pub phase: Phase,
    pub iterations: u32,
    #[serde(rename = "total_ms", serialize_with = "as_millis")]
    pub total: Duration,
    #[serde(rename = "mean_ms", serialize_with = "as_millis")]
    pub mean: Duration,
    #[serde(rename = "min_ms", serialize_with = "as_millis")]
    pub min: Duration,
    #[serde(rename = "max_ms", serialize_with = "as_millis")]
    pub max: Duration,
    /// Rows written or read by each iteration.
    pub rows_per_iteration: usize,
}

impl PhaseTiming {
    /// Aggregate per-iteration samples.
    pub fn from_samples(phase: Phase, rows_per_iteration: usize, samples: &[Duration]) -> Self {
        let total: Duration = samples.iter().sum();
        let iterations = samples.len() as u32;
        let mean = if iterations == 0 {
            Duration::ZERO
        } else {
            total / iterations
        };

        Self {
            phase,
            iterations,
            total,
            mean,
            min: samples.iter().min().copied().unwrap_or_default(),
            max: samples.iter().max().copied().unwrap_or_default(),
            rows_per_iteration,
        }
    }

    /// Mean throughput, or `None` for phases that move no rows.
    pub fn rows_per_second(&self) -> Option<f64> {
        let secs = self.mean.as_secs_f64();
        (self.rows_per_iteration > 0 && secs > 0.0)
            .then(|| self.rows_per_iteration as f64 / secs)
    }
}

/// Results of one backend.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackendReport {
    pub name: String,
    pub kind: BackendKind,
    /// Timings in execution order.
    pub phases: Vec<PhaseTiming>,
    /// Size measured right before manual compaction, for backends that
    /// support it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_before_compaction_kb: Option<u64>,
    /// Size measured right after the workload.
    pub size_kb: u64,
    /// Size measured after the settling delay.
    pub settled_size_kb: u64,
}

impl BackendReport {
    pub fn new(name: impl Into<String>, kind: BackendKind) -> Self {
        Self {
            name: name.into(),
            kind,
            phases: Vec::new(),
            size_before_compaction_kb: None,
            size_kb: 0,
            settled_size_kb: 0,
        }
    }

    /// Timing of `phase`, if it ran.
    pub fn timing(&self, phase: Phase) -> Option<&PhaseTiming> {
        self.phases.iter().find(|t| t.phase == phase)
    }
}

/// Results of a whole run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BenchReport {
    pub schedule: Schedule,
    pub load_mode: LoadMode,
    pub records: usize,
    pub subset: usize,
    pub read_limit: usize,
    pub iterations: u32,
    pub backends: Vec<BackendReport>,
}

impl BenchReport {
    /// Settled size of every backend, keyed by name.
    pub fn sizes(&self) -> BTreeMap<&str, u64> {
        self.backends
            .iter()
            .map(|b| (b.name.as_str(), b.settled_size_kb))
            .collect()
    }

    /// Report of the backend called `name`.
    pub fn backend(&self, name: &str) -> Option<&BackendReport> {
        self.backends.iter().find(|b| b.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_samples() {
        let samples = [
            Duration::from_millis(10),
            Duration::from_millis(30),
            Duration::from_millis(20),
        ];
        let timing = PhaseTiming::from_samples(Phase::UpsertSingle, 4_000, &samples);

        assert_eq!(timing.iterations, 3);
        assert_eq!(timing.total, Duration::from_millis(60));
        assert_eq!(timing.mean, Duration::from_millis(20));
        assert_eq!(timing.min, Duration::from_millis(10));
        assert_eq!(timing.max, Duration::from_millis(30));
        assert_eq!(timing.rows_per_second(), Some(200_000.0));
    }

    #[test]
    fn test_empty_samples() {
        let timing = PhaseTiming::from_samples(Phase::Size, 0, &[]);
        assert_eq!(timing.mean, Duration::ZERO);
        assert_eq!(timing.rows_per_second(), None);
    }

    #[test]
    fn test_report_lookup_and_json() {
        let mut pg = BackendReport::new("pg-timescale", BackendKind::Timescale);
        pg.phases.push(PhaseTiming::from_samples(
            Phase::Compaction,
            0,
            &[Duration::from_millis(5)],
        ));
        pg.size_before_compaction_kb = Some(2_048);
        pg.settled_size_kb = 512;

        let mut mem = BackendReport::new("memory", BackendKind::Memory);
        mem.settled_size_kb = 64;

        let report = BenchReport {
            schedule: Schedule::PhaseMajor,
            load_mode: LoadMode::Bulk,
            records: 100,
            subset: 10,
            read_limit: 10,
            iterations: 1,
            backends: vec![pg, mem],
        };

        assert_eq!(report.sizes().get("pg-timescale"), Some(&512));
        assert!(report.backend("memory").unwrap().timing(Phase::Compaction).is_none());

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["schedule"], "phase-major");
        assert_eq!(json["load_mode"], "bulk");
        assert_eq!(json["backends"][0]["kind"], "timescale");
        assert_eq!(json["backends"][0]["phases"][0]["phase"], "compaction");
        assert_eq!(json["backends"][0]["phases"][0]["total_ms"], 5.0);
        assert!(json["backends"][1].get("size_before_compaction_kb").is_none());
    }
}
