//! User half of the migration probe
//!
//! Loads the embedded eBPF bytecode, attaches it to the
//! `sched/sched_migrate_task` tracepoint, and drains the kernel ring
//! buffer into user callbacks. See `coreshift-ebpf` for the kernel half.
//!
//! Lifecycle: [`MigrationProbe::create`] opens and loads the program and
//! binds the ring-buffer consumer; [`MigrationProbe::start`] attaches;
//! [`MigrationProbe::stop`] detaches (records already in the buffer stay
//! consumable); drop detaches and releases the consumer before the
//! program handle.

use std::error::Error as StdError;
use std::io::ErrorKind;
use std::mem;
use std::ptr;
use std::time::{Duration, Instant};

use aya::maps::{Array, MapData, RingBuf};
use aya::programs::{trace_point::TracePointLinkId, TracePoint};
use aya::{include_bytes_aligned, Ebpf};
use log::{debug, warn};

use coreshift_common::{MigrationRecord, CONFIG_TARGET_PID};

use crate::domain::{EbpfError, MigrationEvent};

const TRACEPOINT_CATEGORY: &str = "sched";
const TRACEPOINT_NAME: &str = "sched_migrate_task";
const PROGRAM_NAME: &str = "sched_migrate_task";

// How long poll() naps between drain attempts while waiting for records.
const POLL_NAP: Duration = Duration::from_millis(10);

/// Callback receiving each well-formed migration record.
///
/// Invoked on whatever thread calls [`MigrationProbe::poll`].
pub type MigrationCallback = Box<dyn FnMut(&MigrationEvent) + Send>;

/// Owns the loaded eBPF program and its ring-buffer consumer.
///
/// Move-only; drop order is detach, then the ring consumer, then the
/// program handle (field order below is load-bearing).
pub struct MigrationProbe {
    // Declared before `bpf` so the consumer is freed before the program
    ring: RingBuf<MapData>,
    bpf: Ebpf,
    callback: MigrationCallback,
    link: Option<TracePointLinkId>,
    event_count: u64,
    short_record_count: u64,
}

impl MigrationProbe {
    /// Opens and loads the eBPF object and creates the ring-buffer
    /// consumer. The program is not attached yet.
    pub fn create(callback: MigrationCallback) -> Result<Self, EbpfError> {
        let mut bpf = Ebpf::load(include_bytes_aligned!(
            "../../target/bpfel-unknown-none/release/coreshift-ebpf"
        ))
        .map_err(|err| classify_aya_error(&err, EbpfError::LoadFailed))?;

        let ring = RingBuf::try_from(bpf.take_map("EVENTS").ok_or(EbpfError::MapAccessFailed)?)
            .map_err(|_| EbpfError::MapAccessFailed)?;

        let program: &mut TracePoint = bpf
            .program_mut(PROGRAM_NAME)
            .ok_or(EbpfError::OpenFailed)?
            .try_into()
            .map_err(|_| EbpfError::InvalidState)?;
        program
            .load()
            .map_err(|err| classify_aya_error(&err, EbpfError::LoadFailed))?;

        Ok(Self {
            ring,
            bpf,
            callback,
            link: None,
            event_count: 0,
            short_record_count: 0,
        })
    }

    /// Attaches the program to the tracepoint. Idempotent.
    pub fn start(&mut self) -> Result<(), EbpfError> {
        if self.link.is_some() {
            return Ok(());
        }

        let program: &mut TracePoint = self
            .bpf
            .program_mut(PROGRAM_NAME)
            .ok_or(EbpfError::InvalidState)?
            .try_into()
            .map_err(|_| EbpfError::InvalidState)?;

        let link = program
            .attach(TRACEPOINT_CATEGORY, TRACEPOINT_NAME)
            .map_err(|err| classify_aya_error(&err, EbpfError::AttachFailed))?;

        self.link = Some(link);
        Ok(())
    }

    /// Detaches the program. Records already in the ring buffer remain
    /// consumable through [`MigrationProbe::poll`].
    pub fn stop(&mut self) {
        let Some(link) = self.link.take() else {
            return;
        };

        let detached = self
            .bpf
            .program_mut(PROGRAM_NAME)
            .and_then(|p| TryInto::<&mut TracePoint>::try_into(p).ok())
            .map(|p| p.detach(link));

        if !matches!(detached, Some(Ok(()))) {
            warn!("failed to detach migration tracepoint");
        }
    }

    /// Drains ready records, invoking the callback for each well-formed
    /// one, waiting up to `timeout` for the first record to arrive.
    ///
    /// Returns the number of records processed. Records shorter than the
    /// wire size are dropped silently and counted.
    pub fn poll(&mut self, timeout: Duration) -> usize {
        let deadline = Instant::now() + timeout;
        let mut processed = 0;

        loop {
            while let Some(item) = self.ring.next() {
                let bytes: &[u8] = &item;
                if bytes.len() < mem::size_of::<MigrationRecord>() {
                    self.short_record_count += 1;
                    continue;
                }

                // SAFETY: length checked above; the kernel half writes a
                // valid MigrationRecord and the layout is #[repr(C)] on
                // both sides.
                #[allow(unsafe_code)]
                let record =
                    unsafe { ptr::read_unaligned(bytes.as_ptr().cast::<MigrationRecord>()) };

                let event = MigrationEvent::from(record);
                (self.callback)(&event);
                self.event_count += 1;
                processed += 1;
            }

            let now = Instant::now();
            if processed > 0 || now >= deadline {
                break;
            }
            std::thread::sleep(POLL_NAP.min(deadline - now));
        }

        processed
    }

    /// Writes the target-PID filter; `None` clears it (0 = no filter).
    pub fn set_target_pid(&mut self, pid: Option<u32>) -> Result<(), EbpfError> {
        let mut config: Array<_, u32> = Array::try_from(
            self.bpf
                .map_mut("MIGRATION_CONFIG")
                .ok_or(EbpfError::MapAccessFailed)?,
        )
        .map_err(|_| EbpfError::MapAccessFailed)?;

        config
            .set(CONFIG_TARGET_PID, pid.unwrap_or(0), 0)
            .map_err(|_| EbpfError::MapAccessFailed)
    }

    /// True while the program is attached.
    pub fn is_running(&self) -> bool {
        self.link.is_some()
    }

    /// Records delivered to the callback so far.
    pub fn event_count(&self) -> u64 {
        self.event_count
    }

    /// Malformed (short) records dropped so far.
    pub fn short_record_count(&self) -> u64 {
        self.short_record_count
    }
}

impl Drop for MigrationProbe {
    fn drop(&mut self) {
        self.stop();
        debug!(
            "migration probe released ({} events, {} short records dropped)",
            self.event_count, self.short_record_count
        );
        // ring and bpf drop in field order: consumer first, program last
    }
}

// aya surfaces permission problems as io errors buried in its error
// chain; walk it so EPERM/EACCES map to PermissionDenied.
fn classify_aya_error(err: &(dyn StdError + 'static), fallback: EbpfError) -> EbpfError {
    let mut source: Option<&(dyn StdError + 'static)> = Some(err);
    while let Some(current) = source {
        if let Some(io_err) = current.downcast_ref::<std::io::Error>() {
            if io_err.kind() == ErrorKind::PermissionDenied {
                return EbpfError::PermissionDenied;
            }
        }
        source = current.source();
    }
    fallback
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_record_is_forty_bytes() {
        assert_eq!(mem::size_of::<MigrationRecord>(), 40);
        assert_eq!(mem::align_of::<MigrationRecord>(), 8);
    }

    #[test]
    fn permission_errors_are_classified_from_the_chain() {
        let io = std::io::Error::from(ErrorKind::PermissionDenied);
        assert_eq!(
            classify_aya_error(&io, EbpfError::LoadFailed),
            EbpfError::PermissionDenied
        );

        let other = std::io::Error::from(ErrorKind::NotFound);
        assert_eq!(
            classify_aya_error(&other, EbpfError::LoadFailed),
            EbpfError::LoadFailed
        );
    }
}
