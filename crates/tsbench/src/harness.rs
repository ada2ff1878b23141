//! Benchmark orchestration.
//!
//! [`Harness`] drives a set of backends through the same phases against the
//! same dataset and collects a [`BenchReport`].

use std::time::{Duration, Instant};

use serde::Serialize;

use crate::backends::Backend;
use crate::config::{BenchConfig, LoadMode, Schedule};
use crate::error::{Error, Result};
use crate::record::Record;
use crate::report::{BackendReport, BenchReport, PhaseTiming};

/// Benchmark phases, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Setup,
    BulkLoad,
    UpsertSingle,
    UpsertBulk,
    Compaction,
    OrderedRead,
    Size,
}

impl Phase {
    /// Phases that run after setup and before the size measurement.
    const WORKLOAD: [Phase; 5] = [
        Phase::BulkLoad,
        Phase::UpsertSingle,
        Phase::UpsertBulk,
        Phase::Compaction,
        Phase::OrderedRead,
    ];

    /// Stable name used in logs and reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Setup => "setup",
            Phase::BulkLoad => "bulk_load",
            Phase::UpsertSingle => "upsert_single",
            Phase::UpsertBulk => "upsert_bulk",
            Phase::Compaction => "compaction",
            Phase::OrderedRead => "ordered_read",
            Phase::Size => "size",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Runs the benchmark phases over a set of backends.
pub struct Harness<'a> {
    config: &'a BenchConfig,
}

impl<'a> Harness<'a> {
    pub fn new(config: &'a BenchConfig) -> Self {
        Self { config }
    }

    /// Run every phase on every backend.
    ///
    /// Backends are closed before returning, whether the run succeeded or
    /// not. The first failure aborts the run and no partial report is
    /// returned.
    pub fn run<B: Backend>(&self, backends: &mut [B], dataset: &[Record]) -> Result<BenchReport> {
        let mut reports: Vec<BackendReport> = backends
            .iter()
            .map(|b| BackendReport::new(b.name(), b.kind()))
            .collect();

        let outcome = self.run_phases(backends, dataset, &mut reports);

        for backend in backends.iter_mut() {
            if let Err(e) = backend.close() {
                tracing::warn!(backend = backend.name(), error = %e, "close failed");
            }
        }
        outcome?;

        let config = self.config;
        Ok(BenchReport {
            schedule: config.schedule,
            load_mode: config.load_mode,
            records: config.records,
            subset: config.subset,
            read_limit: config.read_limit,
            iterations: config.iterations,
            backends: reports,
        })
    }

    fn run_phases<B: Backend>(
        &self,
        backends: &mut [B],
        dataset: &[Record],
        reports: &mut [BackendReport],
    ) -> Result<()> {
        self.config.validate(dataset.len())?;

        for (backend, report) in backends.iter_mut().zip(reports.iter_mut()) {
            self.exec(Phase::Setup, backend, report, dataset)?;
        }

        match self.config.schedule {
            Schedule::PhaseMajor => {
                for phase in Phase::WORKLOAD {
                    for (backend, report) in backends.iter_mut().zip(reports.iter_mut()) {
                        self.exec(phase, backend, report, dataset)?;
                    }
                }
                for (backend, report) in backends.iter_mut().zip(reports.iter_mut()) {
                    self.exec(Phase::Size, backend, report, dataset)?;
                }
                self.settle();
                for (backend, report) in backends.iter_mut().zip(reports.iter_mut()) {
                    settled_size(backend, report)?;
                }
            }
            Schedule::BackendMajor => {
                for (backend, report) in backends.iter_mut().zip(reports.iter_mut()) {
                    for phase in Phase::WORKLOAD {
                        self.exec(phase, backend, report, dataset)?;
                    }
                    self.exec(Phase::Size, backend, report, dataset)?;
                    self.settle();
                    settled_size(backend, report)?;
                }
            }
        }

        Ok(())
    }

    /// Run one phase on one backend and record its timing.
    fn exec<B: Backend>(
        &self,
        phase: Phase,
        backend: &mut B,
        report: &mut BackendReport,
        dataset: &[Record],
    ) -> Result<()> {
        let name = backend.name().to_string();
        let _span = tracing::info_span!("phase", backend = %name, phase = %phase).entered();

        let timing = self
            .phase_timing(phase, backend, report, dataset)
            .map_err(|e| e.in_phase(&name, phase))?;

        if let Some(timing) = timing {
            tracing::info!(
                iterations = timing.iterations,
                rows = timing.rows_per_iteration,
                mean = ?timing.mean,
                "phase complete"
            );
            report.phases.push(timing);
        }
        Ok(())
    }

    fn phase_timing<B: Backend>(
        &self,
        phase: Phase,
        backend: &mut B,
        report: &mut BackendReport,
        dataset: &[Record],
    ) -> Result<Option<PhaseTiming>> {
        let config = self.config;
        let subset = &dataset[..config.subset];

        let timing = match phase {
            Phase::Setup => measure(phase, 1, 0, || backend.setup())?,
            Phase::BulkLoad => measure(phase, 1, dataset.len(), || match config.load_mode {
                LoadMode::Single => backend.upsert_single(dataset),
                LoadMode::Bulk => backend.upsert_bulk(dataset),
            })?,
            Phase::UpsertSingle => measure(phase, config.iterations, subset.len(), || {
                backend.upsert_single(subset)
            })?,
            Phase::UpsertBulk => measure(phase, config.iterations, subset.len(), || {
                backend.upsert_bulk(subset)
            })?,
            Phase::Compaction => {
                if backend.manual_compression().is_none() {
                    tracing::debug!("no manual compression, skipping");
                    return Ok(None);
                }
                let before = backend.table_size_kb()?;
                tracing::info!(size_kb = before, "size before compaction");
                report.size_before_compaction_kb = Some(before);

                measure(phase, 1, 0, || match backend.manual_compression() {
                    Some(compression) => compression.exec_manual_compression(),
                    None => Ok(()),
                })?
            }
            Phase::OrderedRead => {
                let limit = config.read_limit;
                measure(phase, config.iterations, limit, || {
                    let rows = backend.get_ordered_with_limit(limit)?;
                    if rows.len() != limit {
                        return Err(Error::CountMismatch {
                            backend: backend.name().to_string(),
                            expected: limit,
                            actual: rows.len(),
                        });
                    }
                    Ok(())
                })?
            }
            Phase::Size => {
                let mut size = 0;
                let timing = measure(phase, 1, 0, || {
                    size = backend.table_size_kb()?;
                    Ok(())
                })?;
                tracing::info!(size_kb = size, "size");
                report.size_kb = size;
                timing
            }
        };

        Ok(Some(timing))
    }

    fn settle(&self) {
        let delay = self.config.settle_delay;
        if delay.is_zero() {
            return;
        }
        tracing::info!(?delay, "waiting before final size measurement");
        std::thread::sleep(delay);
    }
}

/// Second size measurement, after the settling delay.
fn settled_size<B: Backend>(backend: &mut B, report: &mut BackendReport) -> Result<()> {
    let name = backend.name().to_string();
    let size = backend
        .table_size_kb()
        .map_err(|e| e.in_phase(&name, Phase::Size))?;
    tracing::info!(backend = %name, size_kb = size, "settled size");
    report.settled_size_kb = size;
    Ok(())
}

/// Time `iterations` runs of `op`.
fn measure<F>(phase: Phase, iterations: u32, rows: usize, mut op: F) -> Result<PhaseTiming>
where
    F: FnMut() -> Result<()>,
{
    let mut samples: Vec<Duration> = Vec::with_capacity(iterations as usize);
    for _ in 0..iterations {
        let start = Instant::now();
        op()?;
        samples.push(start.elapsed());
    }
    Ok(PhaseTiming::from_samples(phase, rows, &samples))
}
