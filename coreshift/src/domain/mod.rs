//! Domain model for coreshift
//!
//! Core types shared across the collection and analysis layers:
//! CPU/core classification, migration and sample events, and the
//! closed error taxonomies.

pub mod errors;
pub mod events;
pub mod types;

pub use errors::{EbpfError, PmuError, TopologyError};
pub use events::{MigrationEvent, PmuSample};
pub use types::{CoreType, CpuId, MigrationType, INVALID_CPU_ID};
