//! Migration and PMU sample events
//!
//! The two event streams the profiler correlates. Both carry timestamps
//! from the monotonic boot clock so they are directly comparable.

use std::borrow::Cow;

use coreshift_common::{MigrationRecord, MAX_COMM_LEN};

use super::types::CpuId;

/// A scheduler migration captured from the kernel.
///
/// Mirrors the wire record produced by the eBPF program attached to the
/// `sched/sched_migrate_task` tracepoint. Immutable once constructed.
#[derive(Debug, Clone, Copy)]
pub struct MigrationEvent {
    /// Nanoseconds since boot.
    pub timestamp_ns: u64,
    /// Thread-group id of the migrated task.
    pub pid: u32,
    /// Task id of the migrated task.
    pub tid: u32,
    /// CPU the task was running on before the migration.
    pub src_cpu: CpuId,
    /// CPU the task moved to.
    pub dst_cpu: CpuId,
    /// Command name, NUL-terminated or fully used (kernel limit 16 bytes).
    pub comm: [u8; MAX_COMM_LEN],
}

impl MigrationEvent {
    /// Command name as text, stopping at the first NUL.
    pub fn comm_str(&self) -> Cow<'_, str> {
        let len = self.comm.iter().position(|&b| b == 0).unwrap_or(MAX_COMM_LEN);
        String::from_utf8_lossy(&self.comm[..len])
    }
}

impl From<MigrationRecord> for MigrationEvent {
    fn from(record: MigrationRecord) -> Self {
        Self {
            timestamp_ns: record.timestamp_ns,
            pid: record.pid,
            tid: record.tid,
            src_cpu: record.src_cpu,
            dst_cpu: record.dst_cpu,
            comm: record.comm,
        }
    }
}

/// A hardware performance counter snapshot.
///
/// Collected periodically by [`crate::pmu::PmuSampler`] and correlated with
/// migration events to measure their performance impact.
#[derive(Debug, Clone, Copy)]
pub struct PmuSample {
    /// Nanoseconds since boot, same clock domain as [`MigrationEvent`].
    pub timestamp_ns: u64,
    /// Thread id this sample belongs to.
    pub tid: u32,
    /// CPU observed at read time. This is the sampler worker's CPU, a
    /// best-effort hint only; the counters themselves follow the target
    /// thread wherever it runs.
    pub cpu_id: CpuId,
    /// Retired instructions.
    pub instructions: u64,
    /// CPU cycles elapsed.
    pub cycles: u64,
    /// Last-level cache load misses.
    pub llc_misses: u64,
    /// Last-level cache load references.
    pub llc_references: u64,
    /// Branch mispredictions.
    pub branch_misses: u64,
}

impl PmuSample {
    /// Instructions per cycle, or 0 if no cycles elapsed.
    pub fn ipc(&self) -> f64 {
        if self.cycles == 0 {
            return 0.0;
        }
        self.instructions as f64 / self.cycles as f64
    }

    /// LLC miss rate in [0, 1], or 0 if there were no references.
    pub fn llc_miss_rate(&self) -> f64 {
        if self.llc_references == 0 {
            return 0.0;
        }
        self.llc_misses as f64 / self.llc_references as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(instructions: u64, cycles: u64, misses: u64, references: u64) -> PmuSample {
        PmuSample {
            timestamp_ns: 0,
            tid: 1,
            cpu_id: 0,
            instructions,
            cycles,
            llc_misses: misses,
            llc_references: references,
            branch_misses: 0,
        }
    }

    #[test]
    fn ipc_is_zero_without_cycles() {
        assert_eq!(sample(1000, 0, 0, 0).ipc(), 0.0);
    }

    #[test]
    fn ipc_divides_instructions_by_cycles() {
        let s = sample(2_000_000, 1_000_000, 0, 0);
        assert!((s.ipc() - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn llc_miss_rate_is_zero_without_references() {
        assert_eq!(sample(0, 0, 100, 0).llc_miss_rate(), 0.0);
    }

    #[test]
    fn llc_miss_rate_divides_misses_by_references() {
        let s = sample(0, 0, 250, 1000);
        assert!((s.llc_miss_rate() - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn comm_str_stops_at_nul() {
        let mut comm = [0u8; MAX_COMM_LEN];
        comm[..4].copy_from_slice(b"work");
        let event = MigrationEvent {
            timestamp_ns: 0,
            pid: 1,
            tid: 1,
            src_cpu: 0,
            dst_cpu: 1,
            comm,
        };
        assert_eq!(event.comm_str(), "work");
    }

    #[test]
    fn comm_str_handles_fully_used_buffer() {
        let comm = [b'x'; MAX_COMM_LEN];
        let event = MigrationEvent {
            timestamp_ns: 0,
            pid: 1,
            tid: 1,
            src_cpu: 0,
            dst_cpu: 1,
            comm,
        };
        assert_eq!(event.comm_str().len(), MAX_COMM_LEN);
    }
}
