//! Atomic five-counter perf_event group
//!
//! The group leader (cycles) is opened first with `PERF_FORMAT_GROUP`;
//! the four members join via the leader's file descriptor. Enable,
//! disable and reset apply to all members through `PERF_IOC_FLAG_GROUP`,
//! and a single read on the leader returns every value from the same
//! moment in time. That atomicity is what makes derived ratios (IPC,
//! LLC miss rate) meaningful.

use std::os::unix::io::RawFd;

use perf_event_open_sys as sys;
use perf_event_open_sys::bindings::{PERF_FORMAT_GROUP, PERF_IOC_FLAG_GROUP};

use crate::domain::PmuError;

use super::counter::PmuEventType;
use super::perf_event_open;

/// Number of counters in the group.
pub const COUNTER_COUNT: usize = 5;

// Fixed registration order; the leader must be index 0.
const CYCLES: usize = 0;
const INSTRUCTIONS: usize = 1;
const LLC_LOADS: usize = 2;
const LLC_LOAD_MISSES: usize = 3;
const BRANCH_MISSES: usize = 4;

const EVENT_ORDER: [PmuEventType; COUNTER_COUNT] = [
    PmuEventType::Cycles,
    PmuEventType::Instructions,
    PmuEventType::LlcLoads,
    PmuEventType::LlcLoadMisses,
    PmuEventType::BranchMisses,
];

/// One atomic snapshot of all five counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PmuGroupReading {
    pub cycles: u64,
    pub instructions: u64,
    pub llc_loads: u64,
    pub llc_load_misses: u64,
    pub branch_misses: u64,
}

/// Kernel layout for PERF_FORMAT_GROUP reads: nr followed by one value
/// per member, in registration order.
#[repr(C)]
#[derive(Default)]
struct GroupReadBuffer {
    nr: u64,
    values: [u64; COUNTER_COUNT],
}

/// A fixed group of five counters bound to one thread.
///
/// Move-only; dropping closes every descriptor. Construction either
/// opens all five descriptors or closes the ones it managed to open
/// before returning the error.
#[derive(Debug)]
pub struct PmuGroup {
    fds: [RawFd; COUNTER_COUNT],
}

impl PmuGroup {
    /// Opens the counter group for thread `tid` (`cpu = -1`, so the
    /// kernel follows the thread across CPU migrations).
    ///
    /// The group starts disabled; only the leader carries the disabled
    /// flag, members inherit its state.
    pub fn open(tid: libc::pid_t) -> Result<Self, PmuError> {
        let mut fds: [RawFd; COUNTER_COUNT] = [-1; COUNTER_COUNT];

        for (slot, event) in EVENT_ORDER.iter().enumerate() {
            let is_leader = slot == CYCLES;

            let mut attr = event.attr();
            if is_leader {
                attr.read_format = u64::from(PERF_FORMAT_GROUP);
            } else {
                // Members inherit the leader's enabled/disabled state
                attr.set_disabled(0);
            }

            let group_fd = if is_leader { -1 } else { fds[CYCLES] };
            match perf_event_open(&mut attr, tid, -1, group_fd) {
                Ok(fd) => fds[slot] = fd,
                Err(err) => {
                    close_fds(&fds);
                    return Err(err);
                }
            }
        }

        Ok(Self { fds })
    }

    /// Reads all five counters atomically through the leader.
    pub fn read(&self) -> Result<PmuGroupReading, PmuError> {
        let mut buffer = GroupReadBuffer::default();

        // SAFETY: the leader fd is valid and owned by self; the buffer
        // matches the PERF_FORMAT_GROUP layout for five members.
        let bytes = unsafe {
            libc::read(
                self.fds[CYCLES],
                std::ptr::addr_of_mut!(buffer).cast::<libc::c_void>(),
                std::mem::size_of::<GroupReadBuffer>(),
            )
        };

        if bytes < 0 {
            return Err(PmuError::ReadFailed);
        }
        // Short read or unexpected member count means the group is not
        // what we registered
        if (bytes as usize) < std::mem::size_of::<GroupReadBuffer>()
            || buffer.nr != COUNTER_COUNT as u64
        {
            return Err(PmuError::ReadFailed);
        }

        Ok(PmuGroupReading {
            cycles: buffer.values[CYCLES],
            instructions: buffer.values[INSTRUCTIONS],
            llc_loads: buffer.values[LLC_LOADS],
            llc_load_misses: buffer.values[LLC_LOAD_MISSES],
            branch_misses: buffer.values[BRANCH_MISSES],
        })
    }

    /// Zeroes all members atomically.
    pub fn reset(&self) -> Result<(), PmuError> {
        // SAFETY: the leader fd is valid and owned by self.
        let rc = unsafe { sys::ioctls::RESET(self.fds[CYCLES], PERF_IOC_FLAG_GROUP as _) };
        if rc < 0 {
            return Err(PmuError::InvalidState);
        }
        Ok(())
    }

    /// Enables all members atomically.
    pub fn enable(&self) -> Result<(), PmuError> {
        // SAFETY: the leader fd is valid and owned by self.
        let rc = unsafe { sys::ioctls::ENABLE(self.fds[CYCLES], PERF_IOC_FLAG_GROUP as _) };
        if rc < 0 {
            return Err(PmuError::InvalidState);
        }
        Ok(())
    }

    /// Disables all members atomically; values stay readable.
    pub fn disable(&self) -> Result<(), PmuError> {
        // SAFETY: the leader fd is valid and owned by self.
        let rc = unsafe { sys::ioctls::DISABLE(self.fds[CYCLES], PERF_IOC_FLAG_GROUP as _) };
        if rc < 0 {
            return Err(PmuError::InvalidState);
        }
        Ok(())
    }
}

impl Drop for PmuGroup {
    fn drop(&mut self) {
        close_fds(&self.fds);
    }
}

fn close_fds(fds: &[RawFd; COUNTER_COUNT]) {
    for &fd in fds {
        if fd >= 0 {
            // SAFETY: fd came from perf_event_open; each slot is closed
            // at most once because open() either transfers the whole
            // array into a PmuGroup or calls this on the error path.
            unsafe {
                libc::close(fd);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_buffer_matches_group_format() {
        // nr + 5 values, naturally aligned u64s
        assert_eq!(std::mem::size_of::<GroupReadBuffer>(), 48);
    }

    #[test]
    fn leader_is_cycles() {
        assert_eq!(EVENT_ORDER[CYCLES], PmuEventType::Cycles);
        assert_eq!(EVENT_ORDER[INSTRUCTIONS], PmuEventType::Instructions);
        assert_eq!(EVENT_ORDER[LLC_LOADS], PmuEventType::LlcLoads);
        assert_eq!(EVENT_ORDER[LLC_LOAD_MISSES], PmuEventType::LlcLoadMisses);
        assert_eq!(EVENT_ORDER[BRANCH_MISSES], PmuEventType::BranchMisses);
    }
}
