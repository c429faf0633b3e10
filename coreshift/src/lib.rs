//! # coreshift — migration cost profiler for hybrid x86 CPUs
//!
//! coreshift measures what a scheduler migration actually costs a thread
//! on a heterogeneous (P-core/E-core) processor. It captures two
//! correlated streams for a target process — kernel migration events and
//! periodic hardware counter samples — and joins them so a cost can be
//! attributed to each migration.
//!
//! ## Architecture overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        Linux Kernel                          │
//! │                                                              │
//! │   sched/sched_migrate_task tracepoint                        │
//! │            │                                                 │
//! │            ▼                                                 │
//! │   coreshift-ebpf (PID filter, 256 KiB ring buffer)           │
//! └────────────┬─────────────────────────────────────────────────┘
//!              │ migration records            perf_event group reads
//!              ▼                                      ▼
//! ┌──────────────────────┐              ┌──────────────────────┐
//! │ probe::MigrationProbe │              │ pmu::PmuSampler      │
//! │  (ring-buffer drain)  │              │  (1 ms worker loop)  │
//! └──────────┬───────────┘              └──────────┬───────────┘
//!            │ MigrationEvent                      │ PmuSample
//!            └───────────────┬──────────────────────┘
//!                            ▼
//!              ┌───────────────────────────┐
//!              │ analysis::EventStore      │  sorted by timestamp
//!              │  range / thread / nearest │
//!              └────────────┬──────────────┘
//!                           ▼
//!     topology::TopologyMap + classification  →  analysis::ImpactReport
//! ```
//!
//! ## Modules
//!
//! - [`topology`]: P-core/E-core detection from sysfs, CPU→type lookup
//! - [`pmu`]: perf_event counters, the five-counter group, the sampler
//! - [`probe`]: user half of the eBPF migration probe
//! - [`analysis`]: event store, correlation queries, impact report
//! - [`classification`]: migration class tagging (P→P, P→E, E→P, E→E)
//! - [`export`]: JSON session export
//! - [`domain`]: core types and the closed error taxonomies
//! - [`preflight`], [`target`]: driver-side environment checks and
//!   `--pid`/`--name` target resolution
//!
//! ## Privileges
//!
//! The eBPF probe needs CAP_BPF (or root). The PMU layer only needs
//! `perf_event_paranoid <= 1` because every counter excludes kernel and
//! hypervisor events.

pub mod analysis;
pub mod classification;
pub mod cli;
pub mod domain;
pub mod export;
pub mod pmu;
pub mod preflight;
pub mod probe;
pub mod target;
pub mod topology;
