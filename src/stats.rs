//! Per-payload success/error tallies shared by every runner.
//!
//! Two independent tables, each behind its own lock. An increment takes the
//! write side of one table; a snapshot takes the read side of each table in
//! turn, so the merged view is a point-in-time read per table, not across both.

use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock};

/// Success and error counts for one key at snapshot time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatCount {
    pub successes: u64,
    pub errors: u64,
}

#[derive(Debug, Default)]
struct CounterTable {
    counts: RwLock<HashMap<String, u64>>,
}

impl CounterTable {
    fn inc(&self, key: &str) {
        // A panicking writer cannot leave a half-applied `+= 1` behind.
        let mut counts = self.counts.write().unwrap_or_else(PoisonError::into_inner);
        match counts.get_mut(key) {
            Some(count) => *count += 1,
            None => {
                counts.insert(key.to_string(), 1);
            }
        }
    }

    fn get(&self, key: &str) -> u64 {
        let counts = self.counts.read().unwrap_or_else(PoisonError::into_inner);
        counts.get(key).copied().unwrap_or(0)
    }

    fn merge_into<F>(&self, merged: &mut BTreeMap<String, StatCount>, mut apply: F)
    where
        F: FnMut(&mut StatCount, u64),
    {
        let counts = self.counts.read().unwrap_or_else(PoisonError::into_inner);
        for (key, value) in counts.iter() {
            apply(merged.entry(key.clone()).or_default(), *value);
        }
    }
}

/// Thread-safe named counters for successes and errors, keyed by request body.
///
/// Counts only ever go up. Construct one per run and share it by `Arc`.
#[derive(Debug, Default)]
pub struct StatCounter {
    successes: CounterTable,
    errors: CounterTable,
}

impl StatCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_success(&self, key: &str) {
        self.successes.inc(key);
    }

    pub fn increment_error(&self, key: &str) {
        self.errors.inc(key);
    }

    pub fn successes(&self, key: &str) -> u64 {
        self.successes.get(key)
    }

    pub fn errors(&self, key: &str) -> u64 {
        self.errors.get(key)
    }

    /// Merged view of both tables, ordered by key.
    ///
    /// A key seen in only one table reports zero for the other.
    pub fn snapshot(&self) -> BTreeMap<String, StatCount> {
        let mut merged = BTreeMap::new();
        self.successes
            .merge_into(&mut merged, |count, v| count.successes = v);
        self.errors.merge_into(&mut merged, |count, v| count.errors = v);
        merged
    }
}
