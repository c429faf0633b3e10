//! Core type definitions
//!
//! CPU identifiers and classification types for Intel hybrid architectures
//! (Alder Lake and later), which mix Performance and Efficiency cores.

use std::fmt;

/// Logical CPU identifier as seen by the kernel (0-based).
pub type CpuId = u32;

/// Sentinel for an invalid or uninitialized CPU id.
pub const INVALID_CPU_ID: CpuId = CpuId::MAX;

/// Classification of a logical CPU on a hybrid processor.
///
/// Fixed at topology-load time and immutable afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CoreType {
    /// Core type could not be determined.
    #[default]
    Unknown,
    /// Performance core (Golden Cove / Raptor Cove).
    PCore,
    /// Efficiency core (Gracemont).
    ECore,
}

impl fmt::Display for CoreType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            CoreType::PCore => "P-core",
            CoreType::ECore => "E-core",
            CoreType::Unknown => "Unknown",
        };
        f.write_str(label)
    }
}

/// Classification of a migration by source and destination core types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MigrationType {
    /// Either endpoint could not be classified.
    #[default]
    Unknown,
    /// P-core to P-core.
    PToP,
    /// P-core to E-core (potential performance degradation).
    PToE,
    /// E-core to P-core (potential performance improvement).
    EToP,
    /// E-core to E-core.
    EToE,
}

impl fmt::Display for MigrationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            MigrationType::PToP => "P→P",
            MigrationType::PToE => "P→E",
            MigrationType::EToP => "E→P",
            MigrationType::EToE => "E→E",
            MigrationType::Unknown => "Unknown",
        };
        f.write_str(label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_type_labels() {
        assert_eq!(CoreType::PCore.to_string(), "P-core");
        assert_eq!(CoreType::ECore.to_string(), "E-core");
        assert_eq!(CoreType::Unknown.to_string(), "Unknown");
    }

    #[test]
    fn migration_type_labels() {
        assert_eq!(MigrationType::PToE.to_string(), "P→E");
        assert_eq!(MigrationType::EToP.to_string(), "E→P");
    }
}
