//! Single hardware performance counter
//!
//! [`PmuCounter`] owns one perf_event file descriptor for one event kind.
//! Counters are constructed disabled; call [`PmuCounter::enable`] to start
//! counting. The descriptor is closed exactly once on drop.

use std::fmt;
use std::os::unix::io::RawFd;

use perf_event_open_sys as sys;
use perf_event_open_sys::bindings::{
    PERF_COUNT_HW_BRANCH_MISSES, PERF_COUNT_HW_CACHE_LL, PERF_COUNT_HW_CACHE_OP_READ,
    PERF_COUNT_HW_CACHE_RESULT_ACCESS, PERF_COUNT_HW_CACHE_RESULT_MISS,
    PERF_COUNT_HW_CPU_CYCLES, PERF_COUNT_HW_INSTRUCTIONS, PERF_TYPE_HARDWARE,
    PERF_TYPE_HW_CACHE,
};

use crate::domain::PmuError;

use super::{base_attr, cache_config, perf_event_open};

/// Hardware events used for migration impact analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PmuEventType {
    /// CPU cycles elapsed (PERF_COUNT_HW_CPU_CYCLES).
    Cycles,
    /// Instructions retired (PERF_COUNT_HW_INSTRUCTIONS).
    Instructions,
    /// Last-level cache load references.
    LlcLoads,
    /// Last-level cache load misses.
    LlcLoadMisses,
    /// Branch mispredictions (PERF_COUNT_HW_BRANCH_MISSES).
    BranchMisses,
}

impl fmt::Display for PmuEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PmuEventType::Cycles => "cycles",
            PmuEventType::Instructions => "instructions",
            PmuEventType::LlcLoads => "LLC-loads",
            PmuEventType::LlcLoadMisses => "LLC-load-misses",
            PmuEventType::BranchMisses => "branch-misses",
        };
        f.write_str(label)
    }
}

impl PmuEventType {
    /// perf_event_attr for this event, disabled and with kernel and
    /// hypervisor events excluded.
    pub(crate) fn attr(self) -> sys::bindings::perf_event_attr {
        let mut attr = match self {
            PmuEventType::Cycles => base_attr(PERF_TYPE_HARDWARE, u64::from(PERF_COUNT_HW_CPU_CYCLES)),
            PmuEventType::Instructions => {
                base_attr(PERF_TYPE_HARDWARE, u64::from(PERF_COUNT_HW_INSTRUCTIONS))
            }
            PmuEventType::BranchMisses => {
                base_attr(PERF_TYPE_HARDWARE, u64::from(PERF_COUNT_HW_BRANCH_MISSES))
            }
            PmuEventType::LlcLoads => base_attr(
                PERF_TYPE_HW_CACHE,
                cache_config(
                    PERF_COUNT_HW_CACHE_LL,
                    PERF_COUNT_HW_CACHE_OP_READ,
                    PERF_COUNT_HW_CACHE_RESULT_ACCESS,
                ),
            ),
            PmuEventType::LlcLoadMisses => base_attr(
                PERF_TYPE_HW_CACHE,
                cache_config(
                    PERF_COUNT_HW_CACHE_LL,
                    PERF_COUNT_HW_CACHE_OP_READ,
                    PERF_COUNT_HW_CACHE_RESULT_MISS,
                ),
            ),
        };
        attr.set_disabled(1);
        attr
    }
}

/// One perf_event counter bound to a thread.
///
/// Move-only by construction (no `Clone`); dropping closes the file
/// descriptor.
#[derive(Debug)]
pub struct PmuCounter {
    fd: RawFd,
    event_type: PmuEventType,
}

impl PmuCounter {
    /// Opens a counter for `event` on thread `tid`.
    ///
    /// `tid` 0 or -1 means the calling thread; `cpu` -1 follows the
    /// thread across CPU migrations. The counter starts disabled.
    pub fn open(event: PmuEventType, tid: libc::pid_t, cpu: i32) -> Result<Self, PmuError> {
        let mut attr = event.attr();
        let fd = perf_event_open(&mut attr, tid, cpu, -1)?;
        Ok(Self { fd, event_type: event })
    }

    /// Reads the accumulated count since enable or last reset.
    pub fn read(&self) -> Result<u64, PmuError> {
        let mut value: u64 = 0;
        // SAFETY: fd is a valid perf_event descriptor owned by self and
        // the buffer is exactly the 8 bytes the default read format fills.
        let bytes = unsafe {
            libc::read(
                self.fd,
                std::ptr::addr_of_mut!(value).cast::<libc::c_void>(),
                std::mem::size_of::<u64>(),
            )
        };

        if bytes != std::mem::size_of::<u64>() as isize {
            return Err(PmuError::ReadFailed);
        }

        Ok(value)
    }

    /// Zeroes the counter; the enabled/disabled state is unchanged.
    pub fn reset(&self) -> Result<(), PmuError> {
        // SAFETY: fd is a valid perf_event descriptor owned by self.
        if unsafe { sys::ioctls::RESET(self.fd, 0) } < 0 {
            return Err(PmuError::InvalidState);
        }
        Ok(())
    }

    /// Starts accumulating events.
    pub fn enable(&self) -> Result<(), PmuError> {
        // SAFETY: fd is a valid perf_event descriptor owned by self.
        if unsafe { sys::ioctls::ENABLE(self.fd, 0) } < 0 {
            return Err(PmuError::InvalidState);
        }
        Ok(())
    }

    /// Stops accumulating; the current value stays readable.
    pub fn disable(&self) -> Result<(), PmuError> {
        // SAFETY: fd is a valid perf_event descriptor owned by self.
        if unsafe { sys::ioctls::DISABLE(self.fd, 0) } < 0 {
            return Err(PmuError::InvalidState);
        }
        Ok(())
    }

    /// The event this counter measures.
    pub fn event_type(&self) -> PmuEventType {
        self.event_type
    }

    /// The underlying file descriptor, for grouping or polling.
    pub fn as_raw_fd(&self) -> RawFd {
        self.fd
    }
}

impl Drop for PmuCounter {
    fn drop(&mut self) {
        // SAFETY: fd was returned by perf_event_open and is closed
        // exactly once here.
        unsafe {
            libc::close(self.fd);
        }
    }
}
