#![no_std]

// Data structures shared between the eBPF program and userspace.
//
// Everything here must have an explicit, stable layout: the kernel half
// writes these bytes into the ring buffer and userspace reinterprets them.
// Field order, widths and alignment are part of the wire contract.

/// Maximum length of a task command name.
///
/// The kernel limits `comm` to 16 bytes including the NUL terminator
/// (`TASK_COMM_LEN`). A fully-used buffer carries no terminator.
pub const MAX_COMM_LEN: usize = 16;

/// Config-map key holding the target PID (0 = no filter).
pub const CONFIG_TARGET_PID: u32 = 0;

/// Ring buffer capacity in bytes.
///
/// Migrations occur at kilohertz scale at worst; 256 KiB holds several
/// thousand records before the kernel starts dropping, which only happens
/// when userspace stops draining.
pub const MIGRATION_RING_CAPACITY: u32 = 256 * 1024;

/// Migration record written by the eBPF program, read by userspace.
///
/// Exactly 40 bytes, naturally aligned to 8. Userspace must drop any
/// ring-buffer record shorter than this size.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct MigrationRecord {
    /// Nanoseconds since boot (`bpf_ktime_get_ns`).
    pub timestamp_ns: u64,
    /// Thread-group id of the migrated task.
    pub pid: u32,
    /// Task id of the migrated task.
    pub tid: u32,
    /// CPU the task was running on before the migration.
    pub src_cpu: u32,
    /// CPU the task is moving to.
    pub dst_cpu: u32,
    /// Command name, NUL-terminated or fully used.
    pub comm: [u8; MAX_COMM_LEN],
}

/// Tracepoint arguments for `sched_migrate_task`.
///
/// Layout from `/sys/kernel/debug/tracing/events/sched/sched_migrate_task/format`.
#[repr(C)]
pub struct SchedMigrateTaskArgs {
    /// Common tracepoint header (type, flags, preempt count, pid).
    #[allow(clippy::pub_underscore_fields)]
    pub _common: u64,
    pub comm: [u8; MAX_COMM_LEN],
    pub pid: i32,
    pub prio: i32,
    pub orig_cpu: i32,
    pub dest_cpu: i32,
}

#[cfg(feature = "user")]
use aya::Pod;

// Required for reading records out of eBPF maps in userspace.
// Pod asserts the type is valid for any bit pattern and carries no pointers.
#[cfg(feature = "user")]
#[allow(unsafe_code)]
unsafe impl Pod for MigrationRecord {}
