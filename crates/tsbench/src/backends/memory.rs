//! In-process baseline backend.
//!
//! Keeps rows in a `BTreeMap` keyed by the natural key, so the newest-first
//! read is a reverse scan. Gives the floor cost of the harness itself and
//! needs no server.

use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::record::{NaturalKey, Record};

use super::{Backend, BackendKind};

/// Fixed per-row cost of the size estimate: three timestamps, the interval
/// and the value, 8 bytes each.
const FIXED_ROW_BYTES: usize = 5 * 8;

/// In-memory backend.
pub struct MemoryBackend {
    name: String,
    rows: Option<BTreeMap<NaturalKey, Record>>,
}

impl MemoryBackend {
    /// Create an empty, open backend.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rows: Some(BTreeMap::new()),
        }
    }

    /// Number of stored rows.
    pub fn len(&self) -> usize {
        self.rows.as_ref().map_or(0, BTreeMap::len)
    }

    /// Whether no rows are stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn rows(&mut self) -> Result<&mut BTreeMap<NaturalKey, Record>> {
        self.rows
            .as_mut()
            .ok_or_else(|| Error::Closed(self.name.clone()))
    }
}

fn upsert(rows: &mut BTreeMap<NaturalKey, Record>, record: &Record) {
    rows.entry(record.key())
        .and_modify(|stored| stored.merge_from(record))
        .or_insert_with(|| record.clone());
}

impl Backend for MemoryBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Memory
    }

    fn setup(&mut self) -> Result<()> {
        self.rows()?.clear();
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.rows = None;
        Ok(())
    }

    fn upsert_single(&mut self, records: &[Record]) -> Result<()> {
        let rows = self.rows()?;
        for record in records {
            upsert(rows, record);
        }
        Ok(())
    }

    fn upsert_bulk(&mut self, records: &[Record]) -> Result<()> {
        // Stage first so the batch lands as one unit.
        let mut staged: BTreeMap<NaturalKey, Record> = BTreeMap::new();
        let rows = self.rows()?;
        for record in records {
            let key = record.key();
            match staged.get_mut(&key) {
                Some(pending) => pending.merge_from(record),
                None => {
                    let base = match rows.get(&key) {
                        Some(stored) => {
                            let mut merged = stored.clone();
                            merged.merge_from(record);
                            merged
                        }
                        None => record.clone(),
                    };
                    staged.insert(key, base);
                }
            }
        }
        rows.extend(staged);
        Ok(())
    }

    fn get_ordered_with_limit(&mut self, limit: usize) -> Result<Vec<Record>> {
        Ok(self.rows()?.values().rev().take(limit).cloned().collect())
    }

    fn table_size_kb(&mut self) -> Result<u64> {
        let bytes: usize = self
            .rows()?
            .values()
            .map(|r| FIXED_ROW_BYTES + r.area.len() + r.source.len())
            .sum();
        Ok((bytes / 1024) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RunContext;
    use crate::fixtures::{generate_records, touch};
    use chrono::{TimeZone, Utc};

    fn ctx() -> RunContext {
        RunContext::new().with_written_at(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
    }

    #[test]
    fn test_upsert_is_idempotent() {
        let mut backend = MemoryBackend::new("memory");
        backend.setup().unwrap();

        let first = generate_records(20, &ctx());
        backend.upsert_single(&first).unwrap();

        let later = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let mut second = touch(&first, later);
        for r in &mut second {
            r.created_at = later;
            r.value += 1.0;
        }
        backend.upsert_bulk(&second).unwrap();

        assert_eq!(backend.len(), 20);
        let rows = backend.get_ordered_with_limit(20).unwrap();
        for row in rows {
            assert_eq!(row.created_at, ctx().written_at);
            assert_eq!(row.updated_at, later);
        }
    }

    #[test]
    fn test_bulk_with_repeated_key_keeps_last_write() {
        let mut backend = MemoryBackend::new("memory");
        let base = generate_records(1, &ctx()).remove(0);
        let mut a = base.touched(Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap());
        a.value = 1.0;
        let mut b = base.touched(Utc.with_ymd_and_hms(2024, 1, 3, 0, 0, 0).unwrap());
        b.value = 2.0;
        b.created_at = b.updated_at;

        backend.upsert_bulk(&[a.clone(), b.clone()]).unwrap();

        let rows = backend.get_ordered_with_limit(10).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].value, 2.0);
        assert_eq!(rows[0].updated_at, b.updated_at);
        assert_eq!(rows[0].created_at, a.created_at);
    }

    #[test]
    fn test_setup_wipes_rows() {
        let mut backend = MemoryBackend::new("memory");
        backend.upsert_single(&generate_records(5, &ctx())).unwrap();
        assert_eq!(backend.len(), 5);
        backend.setup().unwrap();
        assert!(backend.is_empty());
    }

    #[test]
    fn test_closed_backend_rejects_calls() {
        let mut backend = MemoryBackend::new("memory");
        backend.close().unwrap();
        backend.close().unwrap();
        assert!(matches!(backend.setup(), Err(Error::Closed(_))));
        assert!(matches!(backend.table_size_kb(), Err(Error::Closed(_))));
    }

    #[test]
    fn test_size_grows_with_rows() {
        let mut backend = MemoryBackend::new("memory");
        assert_eq!(backend.table_size_kb().unwrap(), 0);
        backend.upsert_bulk(&generate_records(1_000, &ctx())).unwrap();
        assert!(backend.table_size_kb().unwrap() > 0);
    }
}
