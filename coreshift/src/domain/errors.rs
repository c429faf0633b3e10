//! Error taxonomies for coreshift
//!
//! Closed, exhaustively matchable enumerations, one per subsystem. Errors
//! are values: every fallible core operation returns one of these instead
//! of panicking. Using thiserror for the Display implementations.

use thiserror::Error;

/// Failures in CPU topology detection.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopologyError {
    /// The sysfs entries for CPU topology were not found.
    #[error("sysfs topology entries not found")]
    SysfsNotFound,

    /// cpu_core exists but cpu_atom does not (or the fallback found only
    /// one class): the CPU is homogeneous.
    #[error("system does not have a hybrid CPU")]
    NotHybridCpu,

    /// A CPU list or core_type string was malformed.
    #[error("failed to parse CPU list format")]
    ParseError,

    /// The requested CPU id is outside the detected topology.
    #[error("invalid CPU ID")]
    InvalidCpuId,

    /// sysfs was present but not readable.
    #[error("permission denied accessing sysfs")]
    PermissionDenied,
}

/// Failures in PMU (performance monitoring unit) operations.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PmuError {
    /// perf_event_open() failed for a reason not covered below.
    #[error("perf_event_open() failed")]
    OpenFailed,

    /// Reading a counter file descriptor failed or returned short.
    #[error("failed to read PMU counter")]
    ReadFailed,

    /// The event is not available on this CPU or kernel.
    #[error("PMU event not supported on this hardware")]
    EventNotSupported,

    /// Needs CAP_PERFMON or perf_event_paranoid <= 1.
    #[error("permission denied for PMU access")]
    PermissionDenied,

    /// The thread or process id was invalid.
    #[error("invalid thread or process ID")]
    InvalidTarget,

    /// Hardware counters or file descriptors exhausted.
    #[error("too many PMU events for available counters")]
    TooManyEvents,

    /// The counter, group or sampler is in the wrong state for the
    /// operation (e.g. `start` while already running).
    #[error("PMU counter in invalid state")]
    InvalidState,
}

/// Failures in the eBPF migration probe.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EbpfError {
    /// Failed to open or parse the BPF object.
    #[error("failed to open BPF object")]
    OpenFailed,

    /// Failed to load the BPF program into the kernel.
    #[error("failed to load BPF program")]
    LoadFailed,

    /// Failed to attach the program to its tracepoint.
    #[error("failed to attach BPF program")]
    AttachFailed,

    /// The probe is not in a valid state for the operation.
    #[error("BPF program in invalid state")]
    InvalidState,

    /// Failed to access a BPF map.
    #[error("failed to access BPF map")]
    MapAccessFailed,

    /// Needs CAP_BPF or root.
    #[error("permission denied for BPF operation")]
    PermissionDenied,
}
