//! Shared row counters for progress reporting.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use serde::Serialize;

/// Counters for one table.
#[derive(Debug)]
pub struct TableProgress {
    /// Advisory row count, -1 when unknown.
    expected_rows: AtomicI64,
    rows_copied: AtomicI64,
    done: AtomicBool,
}

impl TableProgress {
    fn new() -> Self {
        Self {
            expected_rows: AtomicI64::new(-1),
            rows_copied: AtomicI64::new(0),
            done: AtomicBool::new(false),
        }
    }

    pub fn set_expected(&self, rows: Option<i64>) {
        self.expected_rows
            .store(rows.unwrap_or(-1), Ordering::Relaxed);
    }

    pub fn add_rows(&self, count: i64) {
        self.rows_copied.fetch_add(count, Ordering::Relaxed);
    }

    pub fn finish(&self) {
        self.done.store(true, Ordering::Relaxed);
    }

    pub fn rows_copied(&self) -> i64 {
        self.rows_copied.load(Ordering::Relaxed)
    }
}

/// Point-in-time view of one table.
#[derive(Debug, Clone, Serialize)]
pub struct TableSnapshot {
    pub table: String,
    pub rows_copied: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_rows: Option<i64>,
    pub done: bool,
}

/// Point-in-time view of the whole run.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressSnapshot {
    pub elapsed_seconds: f64,
    pub rows_copied: i64,
    pub rows_per_second: i64,
    pub tables_done: usize,
    pub tables_total: usize,
    pub tables: Vec<TableSnapshot>,
}

/// Progress of all tables in a run.
///
/// Tables register when their copy starts; counters are updated lock-free.
#[derive(Debug)]
pub struct ProgressTracker {
    tables: Mutex<BTreeMap<String, Arc<TableProgress>>>,
    start_time: Instant,
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressTracker {
    /// Create a new progress tracker.
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(BTreeMap::new()),
            start_time: Instant::now(),
        }
    }

    /// Get or create the counters for `table`.
    pub fn table(&self, table: &str) -> Arc<TableProgress> {
        let mut tables = self
            .tables
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        tables
            .entry(table.to_string())
            .or_insert_with(|| Arc::new(TableProgress::new()))
            .clone()
    }

    /// Total rows copied so far.
    pub fn rows_copied(&self) -> i64 {
        let tables = self
            .tables
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        tables.values().map(|t| t.rows_copied()).sum()
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        let tables = self
            .tables
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let snapshots: Vec<TableSnapshot> = tables
            .iter()
            .map(|(name, p)| {
                let expected = p.expected_rows.load(Ordering::Relaxed);
                TableSnapshot {
                    table: name.clone(),
                    rows_copied: p.rows_copied(),
                    expected_rows: (expected >= 0).then_some(expected),
                    done: p.done.load(Ordering::Relaxed),
                }
            })
            .collect();

        let rows_copied: i64 = snapshots.iter().map(|t| t.rows_copied).sum();
        let elapsed = self.start_time.elapsed().as_secs_f64();
        let rows_per_second = if elapsed > 0.0 {
            (rows_copied as f64 / elapsed) as i64
        } else {
            0
        };

        ProgressSnapshot {
            elapsed_seconds: elapsed,
            rows_copied,
            rows_per_second,
            tables_done: snapshots.iter().filter(|t| t.done).count(),
            tables_total: snapshots.len(),
            tables: snapshots,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_per_table() {
        let tracker = ProgressTracker::new();
        let a = tracker.table("a");
        a.set_expected(Some(10));
        a.add_rows(4);
        tracker.table("b").add_rows(3);
        tracker.table("a").add_rows(1);
        a.finish();

        assert_eq!(tracker.rows_copied(), 8);
        let snap = tracker.snapshot();
        assert_eq!(snap.tables_total, 2);
        assert_eq!(snap.tables_done, 1);
        assert_eq!(snap.tables[0].table, "a");
        assert_eq!(snap.tables[0].rows_copied, 5);
        assert_eq!(snap.tables[0].expected_rows, Some(10));
        assert_eq!(snap.tables[1].expected_rows, None);
    }

    #[test]
    fn test_snapshot_serializes() {
        let tracker = ProgressTracker::new();
        tracker.table("orders").add_rows(2);
        let json = serde_json::to_string(&tracker.snapshot()).unwrap();
        assert!(json.contains("\"table\":\"orders\""));
        assert!(!json.contains("expected_rows"));
    }
}
