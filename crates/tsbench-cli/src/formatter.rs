//! Output formatters for benchmark reports.

use std::time::Duration;

use clap::ValueEnum;
use comfy_table::{Cell, CellAlignment, Table};
use tsbench::{BackendReport, BenchReport, PhaseTiming};

/// Output format for reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// ASCII table format
    Table,
    /// JSON format
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Table => write!(f, "table"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

/// Trait for formatting reports.
pub trait Formatter {
    /// Format a complete benchmark report.
    fn format_report(&self, report: &BenchReport) -> String;
}

/// Create a formatter for the given output format.
pub fn create_formatter(format: OutputFormat) -> Box<dyn Formatter> {
    match format {
        OutputFormat::Table => Box::new(TableFormatter),
        OutputFormat::Json => Box::new(JsonFormatter),
    }
}

/// Table formatter using comfy-table.
pub struct TableFormatter;

impl Formatter for TableFormatter {
    fn format_report(&self, report: &BenchReport) -> String {
        if report.backends.is_empty() {
            return "No results".to_string();
        }

        let summary = format!(
            "{} records, subset {}, read limit {}, {} iterations, {} load, {}",
            report.records,
            report.subset,
            report.read_limit,
            report.iterations,
            report.load_mode,
            report.schedule
        );

        format!(
            "{}\n\n{}\n\n{}",
            summary,
            timings_table(&report.backends),
            sizes_table(&report.backends)
        )
    }
}

/// JSON formatter.
pub struct JsonFormatter;

impl Formatter for JsonFormatter {
    fn format_report(&self, report: &BenchReport) -> String {
        serde_json::to_string_pretty(report).unwrap_or_else(|_| "{}".to_string())
    }
}

fn timings_table(backends: &[BackendReport]) -> Table {
    let mut table = Table::new();
    table.set_header(vec![
        "Backend", "Phase", "Iterations", "Rows", "Mean", "Min", "Max", "Rows/s",
    ]);

    for backend in backends {
        for timing in &backend.phases {
            table.add_row(timing_row(&backend.name, timing));
        }
    }
    table
}

fn timing_row(backend: &str, timing: &PhaseTiming) -> Vec<Cell> {
    let throughput = timing
        .rows_per_second()
        .map(|r| format!("{:.0}", r))
        .unwrap_or_else(|| "-".to_string());

    vec![
        Cell::new(backend),
        Cell::new(timing.phase),
        number(timing.iterations.to_string()),
        number(timing.rows_per_iteration.to_string()),
        number(format_duration(timing.mean)),
        number(format_duration(timing.min)),
        number(format_duration(timing.max)),
        number(throughput),
    ]
}

fn sizes_table(backends: &[BackendReport]) -> Table {
    let mut table = Table::new();
    table.set_header(vec![
        "Backend",
        "Kind",
        "Before compaction (KB)",
        "Size (KB)",
        "Settled (KB)",
    ]);

    for backend in backends {
        let before = backend
            .size_before_compaction_kb
            .map(|kb| kb.to_string())
            .unwrap_or_else(|| "-".to_string());
        table.add_row(vec![
            Cell::new(&backend.name),
            Cell::new(backend.kind),
            number(before),
            number(backend.size_kb.to_string()),
            number(backend.settled_size_kb.to_string()),
        ]);
    }
    table
}

fn number(text: String) -> Cell {
    Cell::new(text).set_alignment(CellAlignment::Right)
}

/// Format a duration with a unit suited to its magnitude.
fn format_duration(duration: Duration) -> String {
    let micros = duration.as_secs_f64() * 1_000_000.0;
    if micros < 1_000.0 {
        format!("{:.1}µs", micros)
    } else if micros < 1_000_000.0 {
        format!("{:.2}ms", micros / 1_000.0)
    } else {
        format!("{:.2}s", micros / 1_000_000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tsbench::{BackendKind, LoadMode, Phase, Schedule};

    fn report() -> BenchReport {
        let mut timescale = BackendReport::new("pg-timescale", BackendKind::Timescale);
        timescale.phases.push(PhaseTiming::from_samples(
            Phase::UpsertBulk,
            4_000,
            &[Duration::from_millis(40), Duration::from_millis(60)],
        ));
        timescale.size_before_compaction_kb = Some(90_112);
        timescale.size_kb = 8_192;
        timescale.settled_size_kb = 8_000;

        BenchReport {
            schedule: Schedule::PhaseMajor,
            load_mode: LoadMode::Single,
            records: 500_000,
            subset: 4_000,
            read_limit: 4_000,
            iterations: 2,
            backends: vec![timescale],
        }
    }

    #[test]
    fn test_table_output() {
        let output = TableFormatter.format_report(&report());

        assert!(output.starts_with("500000 records, subset 4000"));
        assert!(output.contains("phase-major"));
        assert!(output.contains("pg-timescale"));
        assert!(output.contains("upsert_bulk"));
        assert!(output.contains("50.00ms"));
        assert!(output.contains("80000"));
        assert!(output.contains("90112"));
        assert!(output.contains("timescale"));
    }

    #[test]
    fn test_empty_report() {
        let mut report = report();
        report.backends.clear();
        assert_eq!(TableFormatter.format_report(&report), "No results");
    }

    #[test]
    fn test_json_output() {
        let output = create_formatter(OutputFormat::Json).format_report(&report());
        let json: serde_json::Value = serde_json::from_str(&output).unwrap();

        assert_eq!(json["records"], 500_000);
        assert_eq!(json["backends"][0]["size_before_compaction_kb"], 90_112);
        assert_eq!(json["backends"][0]["phases"][0]["mean_ms"], 50.0);
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_micros(250)), "250.0µs");
        assert_eq!(format_duration(Duration::from_micros(1_500)), "1.50ms");
        assert_eq!(format_duration(Duration::from_millis(2_500)), "2.50s");
    }
}
