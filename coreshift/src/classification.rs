//! Migration classification
//!
//! Tags a migration with the core-type transition it represents. P→E
//! transitions are the interesting ones: the thread lands on a narrower
//! core and usually pays for it in IPC.

use crate::domain::{CoreType, MigrationEvent, MigrationType};
use crate::topology::TopologyMap;

/// Classifies a migration by the core types of its endpoints.
///
/// Returns [`MigrationType::Unknown`] when either CPU is absent from the
/// topology. No I/O, no allocation.
pub fn classify_migration(event: &MigrationEvent, topology: &TopologyMap) -> MigrationType {
    let (Ok(src), Ok(dst)) = (topology.core_type(event.src_cpu), topology.core_type(event.dst_cpu))
    else {
        return MigrationType::Unknown;
    };

    match (src, dst) {
        (CoreType::PCore, CoreType::PCore) => MigrationType::PToP,
        (CoreType::PCore, CoreType::ECore) => MigrationType::PToE,
        (CoreType::ECore, CoreType::PCore) => MigrationType::EToP,
        (CoreType::ECore, CoreType::ECore) => MigrationType::EToE,
        // core_type never returns Unknown on the Ok path
        _ => MigrationType::Unknown,
    }
}
