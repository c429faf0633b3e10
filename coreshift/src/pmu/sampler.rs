//! Periodic PMU sampling
//!
//! [`PmuSampler`] owns a [`PmuGroup`] and a background worker thread that
//! reads the group every interval, building a [`PmuSample`] per read and
//! delivering it synchronously through the caller's callback. The worker
//! is cooperatively cancellable: `stop` raises a flag the loop polls each
//! iteration, then joins.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use log::debug;

use crate::domain::{CpuId, PmuError, PmuSample};

use super::group::PmuGroup;

/// Callback receiving each sample.
///
/// Invoked on the sampler's worker thread; implementations must be
/// thread-safe and finish well within the sampling interval.
pub type SampleCallback = Box<dyn Fn(&PmuSample) + Send + Sync>;

/// Default sampling interval.
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(1);

/// Floor for the sampling interval; requests below this are clamped.
pub const MIN_INTERVAL: Duration = Duration::from_micros(100);

// State shared with the worker thread.
struct Shared {
    group: PmuGroup,
    callback: SampleCallback,
    tid: u32,
    interval: Duration,
    stop_requested: AtomicBool,
    sample_count: AtomicU64,
}

/// Background sampler for one thread's counter group.
///
/// Move-only; dropping a running sampler stops it first (which blocks
/// until the worker joins).
pub struct PmuSampler {
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
    running: AtomicBool,
}

impl PmuSampler {
    /// Opens the counter group for `tid` and prepares a sampler.
    ///
    /// Sampling does not begin until [`PmuSampler::start`]. `interval` is
    /// clamped to [`MIN_INTERVAL`].
    pub fn create(
        tid: libc::pid_t,
        callback: SampleCallback,
        interval: Duration,
    ) -> Result<Self, PmuError> {
        let interval = clamp_interval(interval);

        let group = PmuGroup::open(tid)?;

        Ok(Self {
            shared: Arc::new(Shared {
                group,
                callback,
                tid: if tid <= 0 { 0 } else { tid as u32 },
                interval,
                stop_requested: AtomicBool::new(false),
                sample_count: AtomicU64::new(0),
            }),
            worker: None,
            running: AtomicBool::new(false),
        })
    }

    /// Starts the sampling worker.
    ///
    /// Resets and enables the counter group, zeroes the sample counter,
    /// then launches the worker. Fails with [`PmuError::InvalidState`] if
    /// already running; if reset or enable fails no worker is launched.
    pub fn start(&mut self) -> Result<(), PmuError> {
        if self.running.load(Ordering::Acquire) {
            return Err(PmuError::InvalidState);
        }

        self.shared.group.reset()?;
        self.shared.group.enable()?;

        self.shared.sample_count.store(0, Ordering::Relaxed);
        self.shared.stop_requested.store(false, Ordering::Release);
        self.running.store(true, Ordering::Release);

        let shared = Arc::clone(&self.shared);
        self.worker = Some(std::thread::spawn(move || sampling_loop(&shared)));

        Ok(())
    }

    /// Stops the sampling worker and disables the counter group.
    ///
    /// Blocks until the worker has joined. A no-op when not running;
    /// disable errors on this shutdown path are discarded.
    pub fn stop(&mut self) {
        if !self.running.load(Ordering::Acquire) {
            return;
        }

        self.shared.stop_requested.store(true, Ordering::Release);
        if let Some(worker) = self.worker.take() {
            // A callback that blocks forever blocks this join; that is
            // the controller's contract.
            let _ = worker.join();
        }

        if let Err(err) = self.shared.group.disable() {
            debug!("ignoring PMU disable failure on stop: {err}");
        }

        self.running.store(false, Ordering::Release);
    }

    /// True while the worker is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Samples collected since the last `start` (eventually consistent).
    pub fn sample_count(&self) -> u64 {
        self.shared.sample_count.load(Ordering::Relaxed)
    }

    /// The clamped sampling interval.
    pub fn interval(&self) -> Duration {
        self.shared.interval
    }

    /// The thread being sampled.
    pub fn target_tid(&self) -> u32 {
        self.shared.tid
    }
}

impl Drop for PmuSampler {
    fn drop(&mut self) {
        self.stop();
    }
}

fn sampling_loop(shared: &Shared) {
    while !shared.stop_requested.load(Ordering::Acquire) {
        if collect_sample(shared) {
            shared.sample_count.fetch_add(1, Ordering::Relaxed);
        }
        std::thread::sleep(shared.interval);
    }
}

fn collect_sample(shared: &Shared) -> bool {
    // A failed read drops this sample but never stops the loop
    let Ok(reading) = shared.group.read() else {
        return false;
    };

    let sample = PmuSample {
        timestamp_ns: monotonic_ns(),
        tid: shared.tid,
        cpu_id: current_cpu(),
        instructions: reading.instructions,
        cycles: reading.cycles,
        llc_misses: reading.llc_load_misses,
        llc_references: reading.llc_loads,
        branch_misses: reading.branch_misses,
    };

    (shared.callback)(&sample);
    true
}

fn clamp_interval(interval: Duration) -> Duration {
    interval.max(MIN_INTERVAL)
}

/// Nanoseconds since boot on the monotonic clock, the same domain as
/// `bpf_ktime_get_ns` in the kernel half.
pub(crate) fn monotonic_ns() -> u64 {
    let mut ts = libc::timespec { tv_sec: 0, tv_nsec: 0 };
    // SAFETY: ts outlives the call and CLOCK_MONOTONIC is always valid.
    unsafe {
        libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts);
    }
    (ts.tv_sec as u64) * 1_000_000_000 + ts.tv_nsec as u64
}

// The CPU the *sampler worker* runs on, used only as a hint; the
// counters follow the target thread regardless.
fn current_cpu() -> CpuId {
    // SAFETY: sched_getcpu has no preconditions.
    let cpu = unsafe { libc::sched_getcpu() };
    if cpu < 0 {
        return 0;
    }
    cpu as CpuId
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_clamps_to_floor() {
        assert_eq!(clamp_interval(Duration::from_micros(10)), MIN_INTERVAL);
        assert_eq!(
            clamp_interval(Duration::from_micros(250)),
            Duration::from_micros(250)
        );
        assert_eq!(clamp_interval(DEFAULT_INTERVAL), DEFAULT_INTERVAL);
    }

    #[test]
    fn default_interval_is_one_millisecond() {
        assert_eq!(DEFAULT_INTERVAL, Duration::from_millis(1));
        assert_eq!(MIN_INTERVAL, Duration::from_micros(100));
    }

    #[test]
    fn monotonic_clock_does_not_go_backwards() {
        let a = monotonic_ns();
        let b = monotonic_ns();
        assert!(b >= a);
    }
}
