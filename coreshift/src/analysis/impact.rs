//! Per-migration impact attribution
//!
//! Joins every captured migration with the PMU samples that bracket it
//! (same thread, nearest at-or-before and at-or-after) and aggregates
//! IPC and LLC deltas per migration class. This is the consumer of the
//! event store's correlation queries.

use std::collections::BTreeMap;

use crate::classification::classify_migration;
use crate::domain::{MigrationEvent, MigrationType, PmuSample};
use crate::topology::TopologyMap;

use super::event_store::EventStore;

/// One migration joined with its bracketing samples.
#[derive(Debug, Clone, Copy)]
pub struct MigrationImpact {
    pub migration: MigrationEvent,
    pub kind: MigrationType,
    pub before: Option<PmuSample>,
    pub after: Option<PmuSample>,
}

impl MigrationImpact {
    /// IPC change across the migration, when both samples exist.
    pub fn ipc_delta(&self) -> Option<f64> {
        Some(self.after?.ipc() - self.before?.ipc())
    }

    /// LLC miss-rate change across the migration, when both samples exist.
    pub fn llc_miss_rate_delta(&self) -> Option<f64> {
        Some(self.after?.llc_miss_rate() - self.before?.llc_miss_rate())
    }
}

/// Aggregate statistics for one migration class.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClassSummary {
    /// Migrations of this class.
    pub count: usize,
    /// Migrations with both bracketing samples present.
    pub correlated: usize,
    /// Mean IPC delta over the correlated migrations.
    pub mean_ipc_delta: f64,
    /// Mean LLC miss-rate delta over the correlated migrations.
    pub mean_llc_miss_rate_delta: f64,
}

/// The joined view over a whole capture session.
#[derive(Debug, Default)]
pub struct ImpactReport {
    impacts: Vec<MigrationImpact>,
}

impl ImpactReport {
    /// Joins every migration in the store with its bracketing samples.
    pub fn build(store: &EventStore, topology: &TopologyMap) -> Self {
        let impacts = store
            .all_migrations()
            .iter()
            .map(|migration| MigrationImpact {
                migration: *migration,
                kind: classify_migration(migration, topology),
                before: store.pmu_before_migration(migration).copied(),
                after: store.pmu_after_migration(migration).copied(),
            })
            .collect();

        Self { impacts }
    }

    pub fn impacts(&self) -> &[MigrationImpact] {
        &self.impacts
    }

    /// Per-class aggregates, keyed in a stable display order.
    pub fn class_summaries(&self) -> Vec<(MigrationType, ClassSummary)> {
        let mut by_class: BTreeMap<u8, (MigrationType, ClassSummary, f64, f64)> = BTreeMap::new();

        for impact in &self.impacts {
            let entry = by_class
                .entry(class_order(impact.kind))
                .or_insert((impact.kind, ClassSummary::default(), 0.0, 0.0));
            entry.1.count += 1;

            if let (Some(ipc), Some(llc)) = (impact.ipc_delta(), impact.llc_miss_rate_delta()) {
                entry.1.correlated += 1;
                entry.2 += ipc;
                entry.3 += llc;
            }
        }

        by_class
            .into_values()
            .map(|(kind, mut summary, ipc_sum, llc_sum)| {
                if summary.correlated > 0 {
                    summary.mean_ipc_delta = ipc_sum / summary.correlated as f64;
                    summary.mean_llc_miss_rate_delta = llc_sum / summary.correlated as f64;
                }
                (kind, summary)
            })
            .collect()
    }
}

fn class_order(kind: MigrationType) -> u8 {
    match kind {
        MigrationType::PToP => 0,
        MigrationType::PToE => 1,
        MigrationType::EToP => 2,
        MigrationType::EToE => 3,
        MigrationType::Unknown => 4,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coreshift_common::MAX_COMM_LEN;

    fn migration(timestamp_ns: u64, tid: u32, src: u32, dst: u32) -> MigrationEvent {
        MigrationEvent {
            timestamp_ns,
            pid: tid,
            tid,
            src_cpu: src,
            dst_cpu: dst,
            comm: [0u8; MAX_COMM_LEN],
        }
    }

    fn sample(timestamp_ns: u64, tid: u32, instructions: u64, cycles: u64) -> PmuSample {
        PmuSample {
            timestamp_ns,
            tid,
            cpu_id: 0,
            instructions,
            cycles,
            llc_misses: 0,
            llc_references: 0,
            branch_misses: 0,
        }
    }

    #[test]
    fn joins_bracketing_samples_and_classifies() {
        let topo = TopologyMap::new(&[0, 1], &[2, 3]);
        let mut store = EventStore::new();

        // IPC 2.0 before, 1.0 after a P→E move
        store.add_pmu_sample(sample(1000, 42, 2_000_000, 1_000_000));
        store.add_migration(migration(1500, 42, 0, 2));
        store.add_pmu_sample(sample(2000, 42, 1_000_000, 1_000_000));

        let report = ImpactReport::build(&store, &topo);
        assert_eq!(report.impacts().len(), 1);

        let impact = &report.impacts()[0];
        assert_eq!(impact.kind, MigrationType::PToE);
        assert!((impact.ipc_delta().unwrap() - (-1.0)).abs() < 1e-9);
    }

    #[test]
    fn uncorrelated_migrations_have_no_delta() {
        let topo = TopologyMap::new(&[0, 1], &[2, 3]);
        let mut store = EventStore::new();
        store.add_migration(migration(1500, 42, 0, 2));

        let report = ImpactReport::build(&store, &topo);
        let impact = &report.impacts()[0];
        assert!(impact.before.is_none());
        assert!(impact.after.is_none());
        assert!(impact.ipc_delta().is_none());
    }

    #[test]
    fn class_summaries_average_only_correlated_migrations() {
        let topo = TopologyMap::new(&[0, 1], &[2, 3]);
        let mut store = EventStore::new();

        store.add_pmu_sample(sample(1000, 42, 2_000_000, 1_000_000));
        store.add_migration(migration(1500, 42, 0, 2)); // correlated P→E
        store.add_pmu_sample(sample(2000, 42, 1_000_000, 1_000_000));
        store.add_migration(migration(9000, 7, 0, 2)); // uncorrelated P→E

        let report = ImpactReport::build(&store, &topo);
        let summaries = report.class_summaries();
        assert_eq!(summaries.len(), 1);

        let (kind, summary) = summaries[0];
        assert_eq!(kind, MigrationType::PToE);
        assert_eq!(summary.count, 2);
        assert_eq!(summary.correlated, 1);
        assert!((summary.mean_ipc_delta - (-1.0)).abs() < 1e-9);
    }
}
