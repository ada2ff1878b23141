//! Test data generation for benchmarks.
//!
//! Generators are deterministic for a given [`RunContext`] so every backend
//! in a run stores exactly the same rows.

use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::RunContext;
use crate::record::Record;

/// Observation window of every generated record (1 hour).
pub const INTERVAL_MS: i64 = 3_600_000;

/// Area label of every generated record.
pub const AREA: &str = "lv";

/// Source label of every generated record.
pub const SOURCE: &str = "source-of-data";

/// Values are drawn uniformly from `-VALUE_RANGE..VALUE_RANGE`.
const VALUE_RANGE: f64 = 7_000.0;

/// Generate `count` hourly records starting at the context's base time.
pub fn generate_records(count: usize, ctx: &RunContext) -> Vec<Record> {
    let mut rng = StdRng::seed_from_u64(ctx.seed);

    (0..count)
        .map(|i| Record {
            created_at: ctx.written_at,
            updated_at: ctx.written_at,
            start_time: ctx.base_time + Duration::hours(i as i64),
            interval_ms: INTERVAL_MS,
            area: AREA.to_string(),
            source: SOURCE.to_string(),
            value: rng.gen_range(-VALUE_RANGE..VALUE_RANGE),
        })
        .collect()
}

/// Copies of `records` rewritten at `at`.
pub fn touch(records: &[Record], at: DateTime<Utc>) -> Vec<Record> {
    records.iter().map(|r| r.touched(at)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ctx() -> RunContext {
        RunContext::new().with_written_at(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
    }

    #[test]
    fn test_generate_records() {
        let records = generate_records(100, &ctx());
        assert_eq!(records.len(), 100);

        // Check deterministic generation
        let again = generate_records(100, &ctx());
        assert_eq!(records, again);
    }

    #[test]
    fn test_start_times_are_hourly() {
        let ctx = ctx();
        let records = generate_records(50, &ctx);

        assert_eq!(records[0].start_time, ctx.base_time);
        for pair in records.windows(2) {
            assert_eq!(pair[1].start_time - pair[0].start_time, Duration::hours(1));
        }
        for record in &records {
            assert_eq!(record.interval_ms, INTERVAL_MS);
            assert_eq!(record.area, AREA);
            assert_eq!(record.source, SOURCE);
            assert_eq!(record.created_at, ctx.written_at);
            assert!(record.value >= -VALUE_RANGE && record.value < VALUE_RANGE);
        }
    }

    #[test]
    fn test_seed_changes_values() {
        let a = generate_records(10, &ctx());
        let b = generate_records(10, &ctx().with_seed(7));
        assert_ne!(
            a.iter().map(|r| r.value).collect::<Vec<_>>(),
            b.iter().map(|r| r.value).collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_touch_only_moves_updated_at() {
        let records = generate_records(3, &ctx());
        let later = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
        let touched = touch(&records, later);

        for (old, new) in records.iter().zip(&touched) {
            assert_eq!(new.updated_at, later);
            assert_eq!(new.created_at, old.created_at);
            assert_eq!(new.key(), old.key());
            assert_eq!(new.value, old.value);
        }
    }
}
