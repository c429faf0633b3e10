//! # coreshift — eBPF kernel-side migration capture
//!
//! This program runs **inside the Linux kernel**, attached to the
//! `sched/sched_migrate_task` tracepoint. It fires every time the scheduler
//! moves a task from one logical CPU to another.
//!
//! ## Data flow
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                   Linux Kernel                      │
//! │                                                     │
//! │   sched_migrate_task tracepoint                     │
//! │            │                                        │
//! │            ▼                                        │
//! │   sched_migrate_task handler (this file)            │
//! │      • optional target-PID filter                   │
//! │      • reserve/submit into EVENTS ring buffer       │
//! │            │                                        │
//! └────────────┼────────────────────────────────────────┘
//!              │ mmap'd into userspace
//!              ▼
//!   coreshift::probe::MigrationProbe::poll()
//! ```
//!
//! ## Maps
//!
//! - **`EVENTS` (RingBuf, 256 KiB)**: lock-free record stream to userspace.
//!   If a reservation fails (buffer full) the event is dropped; the handler
//!   never blocks the scheduler.
//! - **`MIGRATION_CONFIG` (Array, 1 slot)**: key 0 holds the target PID
//!   (0 = capture every process). Written from userspace only.
//!
//! ## Build
//!
//! Compiled to BPF bytecode with `cargo xtask build-ebpf` (release mode,
//! `bpfel-unknown-none` target) and embedded into the userspace binary via
//! `include_bytes_aligned!`.

#![no_std]
#![no_main]
#![allow(unused_unsafe)]

use aya_ebpf::{
    helpers::{bpf_get_current_comm, bpf_get_current_pid_tgid, bpf_ktime_get_ns},
    macros::{map, tracepoint},
    maps::{Array, RingBuf},
    programs::TracePointContext,
    EbpfContext,
};
use coreshift_common::{
    MigrationRecord, SchedMigrateTaskArgs, CONFIG_TARGET_PID, MAX_COMM_LEN,
    MIGRATION_RING_CAPACITY,
};

/// Ring buffer carrying migration records to userspace.
#[map]
static EVENTS: RingBuf = RingBuf::with_byte_size(MIGRATION_RING_CAPACITY, 0);

/// Single-slot config map; key 0 is the target PID (0 = no filter).
#[map]
static MIGRATION_CONFIG: Array<u32> = Array::with_max_entries(1, 0);

#[tracepoint]
pub fn sched_migrate_task(ctx: TracePointContext) -> u32 {
    match try_sched_migrate_task(&ctx) {
        Ok(()) => 0,
        Err(_) => 1,
    }
}

fn try_sched_migrate_task(ctx: &TracePointContext) -> Result<(), i64> {
    let pid_tgid = unsafe { bpf_get_current_pid_tgid() };
    let pid = (pid_tgid >> 32) as u32; // Thread-group id
    let tid = pid_tgid as u32; // Task id

    // Filter enabled: only capture events for the target process
    if let Some(target) = MIGRATION_CONFIG.get(CONFIG_TARGET_PID) {
        if *target != 0 && pid != *target {
            return Ok(());
        }
    }

    // Source and destination CPUs come from the tracepoint payload
    let args = ctx.as_ptr() as *const SchedMigrateTaskArgs;
    let src_cpu = unsafe { (*args).orig_cpu as u32 };
    let dst_cpu = unsafe { (*args).dest_cpu as u32 };

    // Ring full means userspace is not draining fast enough; drop the
    // event rather than stall the scheduler path.
    let Some(mut entry) = EVENTS.reserve::<MigrationRecord>(0) else {
        return Ok(());
    };

    let comm = bpf_get_current_comm().unwrap_or([0u8; MAX_COMM_LEN]);

    entry.write(MigrationRecord {
        timestamp_ns: unsafe { bpf_ktime_get_ns() },
        pid,
        tid,
        src_cpu,
        dst_cpu,
        comm,
    });
    entry.submit(0);

    Ok(())
}

// GPL-compatible license declaration, required for the
// bpf_get_current_comm helper.
#[no_mangle]
#[link_section = "license"]
pub static LICENSE: [u8; 4] = *b"GPL\0";

#[cfg(all(not(test), target_os = "none"))]
#[panic_handler]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    unsafe { core::hint::unreachable_unchecked() }
}
