//! Time-ordered event storage and correlation queries
//!
//! Both sequences are kept sorted by `timestamp_ns` at all times, not by
//! insertion order. Insertion pays O(log n) search plus O(n) shift so the
//! correlation queries run in logarithmic time plus a short walk; the
//! workload has far more queries than inserts and the event rate is
//! bounded by scheduler activity.
//!
//! All operations are single-threaded; callers synchronise externally.

use crate::domain::{MigrationEvent, PmuSample};

/// Sorted in-memory store of migrations and PMU samples.
#[derive(Debug, Default)]
pub struct EventStore {
    migrations: Vec<MigrationEvent>,
    pmu_samples: Vec<PmuSample>,
}

impl EventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a migration at its timestamp position.
    ///
    /// Equal timestamps land after existing equals, so arrival order is
    /// preserved among ties.
    pub fn add_migration(&mut self, event: MigrationEvent) {
        let at = self
            .migrations
            .partition_point(|existing| existing.timestamp_ns <= event.timestamp_ns);
        self.migrations.insert(at, event);
    }

    /// Inserts a PMU sample at its timestamp position (stable for ties).
    pub fn add_pmu_sample(&mut self, sample: PmuSample) {
        let at = self
            .pmu_samples
            .partition_point(|existing| existing.timestamp_ns <= sample.timestamp_ns);
        self.pmu_samples.insert(at, sample);
    }

    /// All migrations in timestamp order.
    pub fn all_migrations(&self) -> &[MigrationEvent] {
        &self.migrations
    }

    /// All PMU samples in timestamp order.
    pub fn all_pmu_samples(&self) -> &[PmuSample] {
        &self.pmu_samples
    }

    /// Migrations for one thread, timestamp order preserved.
    pub fn migrations_for_thread(&self, tid: u32) -> Vec<MigrationEvent> {
        self.migrations
            .iter()
            .filter(|m| m.tid == tid)
            .copied()
            .collect()
    }

    /// PMU samples for one thread, timestamp order preserved.
    pub fn pmu_samples_for_thread(&self, tid: u32) -> Vec<PmuSample> {
        self.pmu_samples
            .iter()
            .filter(|s| s.tid == tid)
            .copied()
            .collect()
    }

    /// Migrations with `start_ns <= timestamp_ns <= end_ns`, both
    /// endpoints inclusive.
    pub fn migrations_in_range(&self, start_ns: u64, end_ns: u64) -> Vec<MigrationEvent> {
        let first = self
            .migrations
            .partition_point(|m| m.timestamp_ns < start_ns);

        self.migrations[first..]
            .iter()
            .take_while(|m| m.timestamp_ns <= end_ns)
            .copied()
            .collect()
    }

    /// Last sample for the migration's thread at or before the migration.
    ///
    /// A sample with exactly the migration's timestamp counts as
    /// "before". Samples from other threads are skipped, however close.
    pub fn pmu_before_migration(&self, migration: &MigrationEvent) -> Option<&PmuSample> {
        // First index past every candidate (timestamp > migration's)
        let bound = self
            .pmu_samples
            .partition_point(|s| s.timestamp_ns <= migration.timestamp_ns);

        self.pmu_samples[..bound]
            .iter()
            .rev()
            .find(|s| s.tid == migration.tid)
    }

    /// First sample for the migration's thread at or after the migration.
    ///
    /// Ties on timestamp favour the "after" side.
    pub fn pmu_after_migration(&self, migration: &MigrationEvent) -> Option<&PmuSample> {
        let bound = self
            .pmu_samples
            .partition_point(|s| s.timestamp_ns < migration.timestamp_ns);

        self.pmu_samples[bound..]
            .iter()
            .find(|s| s.tid == migration.tid)
    }

    pub fn migration_count(&self) -> usize {
        self.migrations.len()
    }

    pub fn pmu_sample_count(&self) -> usize {
        self.pmu_samples.len()
    }

    /// Empties both sequences.
    pub fn clear(&mut self) {
        self.migrations.clear();
        self.pmu_samples.clear();
    }
}
