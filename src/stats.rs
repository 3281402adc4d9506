//! Cumulative cycle counters (spec §6 "stats(): read-only snapshot"),
//! kept in memory since process start. Grounded in the teacher's
//! `view::stats_filtered`, which folds ledger events into running totals;
//! generalized here from "fold once over a file on demand" to "a shared
//! counter updated after every cycle," since this pipeline runs
//! continuously rather than being queried against a static log.

use std::sync::Mutex;

use crate::aging::AgingStats;
use crate::orchestrator::ConsolidationStats;

#[derive(Debug, Clone, Default)]
pub struct StatsSnapshot {
    pub cycles_run: u64,
    pub messages_seen: u64,
    pub messages_unique: u64,
    pub duplicates_removed: u64,
    pub conversations_written: u64,
    pub artifacts_moved: u64,
    pub artifacts_compressed: u64,
}

/// Thread-safe accumulator the scheduler updates after each cycle and the
/// `stats()` public operation reads from (spec §6).
#[derive(Debug, Default)]
pub struct Stats {
    inner: Mutex<StatsSnapshot>,
}

impl Stats {
    pub fn new() -> Self {
        Stats::default()
    }

    pub fn record_cycle(
        &self,
        consolidation: &ConsolidationStats,
        conversations_written: usize,
        aging: AgingStats,
    ) {
        let mut snapshot = self.inner.lock().expect("stats mutex poisoned");
        snapshot.cycles_run += 1;
        snapshot.messages_seen += consolidation.total_seen as u64;
        snapshot.messages_unique += consolidation.total_unique as u64;
        snapshot.duplicates_removed += consolidation.duplicates_removed as u64;
        snapshot.conversations_written += conversations_written as u64;
        snapshot.artifacts_moved += aging.moved as u64;
        snapshot.artifacts_compressed += aging.compressed as u64;
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        self.inner.lock().expect("stats mutex poisoned").clone()
    }
}
