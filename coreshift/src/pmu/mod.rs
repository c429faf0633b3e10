//! Hardware performance counter collection
//!
//! Three layers, bottom up:
//!
//! - [`counter`]: one perf_event file descriptor wrapping a single
//!   hardware event.
//! - [`group`]: a fixed five-counter group (cycles leader, instructions,
//!   LLC loads, LLC load misses, branch misses) read atomically through
//!   the leader.
//! - [`sampler`]: a background worker reading the group every interval
//!   and delivering timestamped [`crate::domain::PmuSample`] records.
//!
//! glibc provides no wrapper for perf_event_open(2), so the syscall is
//! invoked directly with attribute structs from `perf-event-open-sys`.
//! Counters are opened with kernel and hypervisor exclusion so that
//! `perf_event_paranoid <= 1` is sufficient; no extra capabilities are
//! needed.

pub mod counter;
pub mod group;
pub mod sampler;

pub use counter::{PmuCounter, PmuEventType};
pub use group::{PmuGroup, PmuGroupReading};
pub use sampler::{PmuSampler, SampleCallback, DEFAULT_INTERVAL, MIN_INTERVAL};

use perf_event_open_sys as sys;
use perf_event_open_sys::bindings::perf_event_attr;

use crate::domain::PmuError;

/// Invokes perf_event_open(2).
///
/// Returns the new file descriptor, or the mapped [`PmuError`] with errno
/// translated per the table in [`errno_to_pmu_error`].
pub(crate) fn perf_event_open(
    attr: &mut perf_event_attr,
    tid: libc::pid_t,
    cpu: i32,
    group_fd: i32,
) -> Result<i32, PmuError> {
    // tid=-1 with cpu=-1 is invalid per perf_event_open(2); treat -1 as
    // "calling thread" the same way 0 is.
    let effective_tid = if tid == -1 { 0 } else { tid };

    // SAFETY: attr points to a fully initialized perf_event_attr and the
    // kernel only reads it during the call.
    let fd = unsafe { sys::perf_event_open(attr, effective_tid, cpu, group_fd, 0) };

    if fd < 0 {
        let errno = std::io::Error::last_os_error().raw_os_error().unwrap_or(0);
        return Err(errno_to_pmu_error(errno));
    }

    Ok(fd)
}

/// Base attribute struct shared by every counter we open.
///
/// Counters exclude kernel and hypervisor events so elevated privileges
/// are not required beyond `perf_event_paranoid <= 1`.
pub(crate) fn base_attr(type_: u32, config: u64) -> perf_event_attr {
    // Zero everything first; perf_event_attr has many optional fields
    // that must be zero if unused.
    // SAFETY: perf_event_attr is a plain C struct, valid when zeroed.
    let mut attr = unsafe { std::mem::zeroed::<perf_event_attr>() };
    attr.type_ = type_;
    attr.size = std::mem::size_of::<perf_event_attr>() as u32;
    attr.config = config;
    attr.set_exclude_kernel(1);
    attr.set_exclude_hv(1);
    attr
}

/// Composite config for a PERF_TYPE_HW_CACHE event.
///
/// Bits 0-7 select the cache, 8-15 the operation, 16-23 the result.
pub(crate) fn cache_config(cache_id: u32, op_id: u32, result_id: u32) -> u64 {
    u64::from(cache_id) | (u64::from(op_id) << 8) | (u64::from(result_id) << 16)
}

/// Maps errno values from perf_event syscalls to [`PmuError`].
pub(crate) fn errno_to_pmu_error(errno: i32) -> PmuError {
    match errno {
        // Lacking CAP_PERFMON or perf_event_paranoid too restrictive
        libc::EACCES | libc::EPERM => PmuError::PermissionDenied,
        // Event unavailable on this CPU or kernel
        libc::ENOENT | libc::ENODEV | libc::EOPNOTSUPP => PmuError::EventNotSupported,
        // Bad PID/TID or parameter combination
        libc::ESRCH | libc::EINVAL => PmuError::InvalidTarget,
        // fd table or hardware counters exhausted
        libc::EMFILE | libc::ENFILE => PmuError::TooManyEvents,
        _ => PmuError::OpenFailed,
    }
}
