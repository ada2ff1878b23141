//! Time-series record model.

use chrono::{DateTime, Utc};

/// One time-series observation.
///
/// `(start_time, interval_ms, area)` is the natural key; every backend
/// upserts on it.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// When the row was first written. Preserved on update.
    pub created_at: DateTime<Utc>,
    /// When the row was last written.
    pub updated_at: DateTime<Utc>,
    /// Beginning of the observation window.
    pub start_time: DateTime<Utc>,
    /// Length of the observation window in milliseconds.
    pub interval_ms: i64,
    /// Measured entity or location.
    pub area: String,
    /// Provenance label.
    pub source: String,
    /// Measured value.
    pub value: f64,
}

impl Record {
    /// The natural key of this record.
    pub fn key(&self) -> NaturalKey {
        NaturalKey {
            start_time: self.start_time,
            interval_ms: self.interval_ms,
            area: self.area.clone(),
        }
    }

    /// Apply an upsert of `incoming` onto this stored row.
    ///
    /// The key and `created_at` stay; `updated_at`, `source` and `value`
    /// are overwritten.
    pub fn merge_from(&mut self, incoming: &Record) {
        self.updated_at = incoming.updated_at;
        self.source.clone_from(&incoming.source);
        self.value = incoming.value;
    }

    /// Copy of this record written again at `at`.
    pub fn touched(&self, at: DateTime<Utc>) -> Self {
        Self {
            updated_at: at,
            ..self.clone()
        }
    }
}

/// Natural key of a [`Record`].
///
/// Orders by `start_time`, then `interval_ms`, then `area`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NaturalKey {
    pub start_time: DateTime<Utc>,
    pub interval_ms: i64,
    pub area: String,
}
