//! CPU topology detection for Intel hybrid architectures
//!
//! Discovers which logical CPUs are P-cores and which are E-cores by
//! parsing sysfs, and exposes a dense CPU→type lookup used to classify
//! every migration.
//!
//! Two detection protocols, tried in order:
//! 1. `/sys/devices/cpu_core/cpus` + `/sys/devices/cpu_atom/cpus`
//!    (Linux 5.13+): compact packed-range CPU lists.
//! 2. Per-CPU `/sys/devices/system/cpu/cpu<N>/topology/core_type`
//!    (Linux 5.18+): one `Core`/`Atom` token per CPU.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use log::debug;

use crate::domain::{CoreType, CpuId, TopologyError, INVALID_CPU_ID};

const P_CORE_SYSFS_PATH: &str = "/sys/devices/cpu_core/cpus";
const E_CORE_SYSFS_PATH: &str = "/sys/devices/cpu_atom/cpus";
const CPU_BASE_PATH: &str = "/sys/devices/system/cpu";

/// Maps logical CPU ids to their core type.
///
/// Built once at startup, read-only afterwards. Lookups are O(1) through a
/// dense table sized to the largest CPU id seen.
#[derive(Debug, Default)]
pub struct TopologyMap {
    p_cores: Vec<CpuId>,
    e_cores: Vec<CpuId>,
    cpu_to_type: Vec<CoreType>,
    // Physical core id per logical CPU, INVALID_CPU_ID where unknown.
    // Only populated by from_sysfs; an empty table disables the SMT
    // sibling predicate rather than erroring.
    physical_core_id: Vec<CpuId>,
}

impl TopologyMap {
    /// Builds a map from known P-core and E-core CPU lists.
    ///
    /// Both lists are sorted and deduplicated; the dense lookup table is
    /// sized to the largest id. SMT sibling data is not loaded here, so
    /// [`TopologyMap::is_smt_sibling`] returns `false` for maps built this
    /// way.
    pub fn new(p_cores: &[CpuId], e_cores: &[CpuId]) -> Self {
        let mut p_cores = p_cores.to_vec();
        let mut e_cores = e_cores.to_vec();
        p_cores.sort_unstable();
        p_cores.dedup();
        e_cores.sort_unstable();
        e_cores.dedup();

        let mut map = Self {
            p_cores,
            e_cores,
            cpu_to_type: Vec::new(),
            physical_core_id: Vec::new(),
        };
        map.build_lookup_table();
        map
    }

    /// Loads the topology from sysfs.
    ///
    /// Tries the packed-range lists first, then falls back to per-CPU
    /// `core_type` files. See the module docs for the protocols.
    pub fn from_sysfs() -> Result<Self, TopologyError> {
        let mut map = Self::load(Path::new(P_CORE_SYSFS_PATH), Path::new(E_CORE_SYSFS_PATH))
            .or_else(|err| match err {
                // Primary lists absent: try the per-CPU fallback. Parse
                // and permission failures are real errors, not a reason
                // to switch protocols.
                TopologyError::SysfsNotFound => Self::load_from_core_type(Path::new(CPU_BASE_PATH)),
                other => Err(other),
            })?;

        map.load_smt_data(Path::new(CPU_BASE_PATH));
        Ok(map)
    }

    fn load(p_path: &Path, e_path: &Path) -> Result<Self, TopologyError> {
        let p_content = read_sysfs_file(p_path)?;

        let p_cores = parse_cpu_list(&p_content)?;

        let e_content = match read_sysfs_file(e_path) {
            Ok(content) => content,
            // P-core list exists but the E-core list does not: the CPU
            // is homogeneous, not missing sysfs.
            Err(TopologyError::SysfsNotFound) => return Err(TopologyError::NotHybridCpu),
            Err(other) => return Err(other),
        };

        let e_cores = parse_cpu_list(&e_content)?;

        Ok(Self::new(&p_cores, &e_cores))
    }

    fn load_from_core_type(base: &Path) -> Result<Self, TopologyError> {
        let mut p_cores: Vec<CpuId> = Vec::new();
        let mut e_cores: Vec<CpuId> = Vec::new();

        let entries = fs::read_dir(base).map_err(|_| TopologyError::SysfsNotFound)?;

        for entry in entries.flatten() {
            let Some(cpu) = cpu_id_from_dir_name(&entry.file_name().to_string_lossy()) else {
                continue;
            };

            // Skip CPUs whose core_type is missing or unrecognised
            let core_type_path = entry.path().join("topology/core_type");
            let Ok(content) = fs::read_to_string(&core_type_path) else {
                continue;
            };
            let Ok(core_type) = parse_core_type(&content) else {
                continue;
            };

            match core_type {
                CoreType::PCore => p_cores.push(cpu),
                CoreType::ECore => e_cores.push(cpu),
                CoreType::Unknown => {}
            }
        }

        if p_cores.is_empty() && e_cores.is_empty() {
            return Err(TopologyError::SysfsNotFound);
        }
        if p_cores.is_empty() || e_cores.is_empty() {
            return Err(TopologyError::NotHybridCpu);
        }

        Ok(Self::new(&p_cores, &e_cores))
    }

    /// Core type for a logical CPU.
    ///
    /// Returns [`TopologyError::InvalidCpuId`] when the id is beyond the
    /// lookup table or falls in a gap between the two lists.
    pub fn core_type(&self, cpu: CpuId) -> Result<CoreType, TopologyError> {
        match self.cpu_to_type.get(cpu as usize) {
            Some(CoreType::Unknown) | None => Err(TopologyError::InvalidCpuId),
            Some(core_type) => Ok(*core_type),
        }
    }

    /// All P-core CPU ids, ascending.
    pub fn p_cores(&self) -> &[CpuId] {
        &self.p_cores
    }

    /// All E-core CPU ids, ascending.
    pub fn e_cores(&self) -> &[CpuId] {
        &self.e_cores
    }

    /// Total number of classified CPUs.
    pub fn total_cpu_count(&self) -> usize {
        self.p_cores.len() + self.e_cores.len()
    }

    /// True when both P-cores and E-cores are present.
    pub fn is_hybrid(&self) -> bool {
        !self.p_cores.is_empty() && !self.e_cores.is_empty()
    }

    /// True when two distinct logical CPUs share a physical core.
    ///
    /// On Intel hybrid CPUs only P-cores support SMT. Returns `false`
    /// whenever the SMT data source was absent or either id is unknown.
    pub fn is_smt_sibling(&self, cpu_a: CpuId, cpu_b: CpuId) -> bool {
        if cpu_a == cpu_b {
            return false;
        }
        let core_a = self.physical_core_id.get(cpu_a as usize).copied();
        let core_b = self.physical_core_id.get(cpu_b as usize).copied();
        match (core_a, core_b) {
            (Some(a), Some(b)) => a != INVALID_CPU_ID && a == b,
            _ => false,
        }
    }

    fn build_lookup_table(&mut self) {
        let max_cpu = self
            .p_cores
            .iter()
            .chain(self.e_cores.iter())
            .copied()
            .max();

        let Some(max_cpu) = max_cpu else {
            self.cpu_to_type.clear();
            return;
        };

        // Unlisted ids (gaps between the two lists) stay Unknown
        self.cpu_to_type = vec![CoreType::Unknown; max_cpu as usize + 1];
        for &cpu in &self.p_cores {
            self.cpu_to_type[cpu as usize] = CoreType::PCore;
        }
        for &cpu in &self.e_cores {
            self.cpu_to_type[cpu as usize] = CoreType::ECore;
        }
    }

    fn load_smt_data(&mut self, base: &Path) {
        self.physical_core_id = vec![INVALID_CPU_ID; self.cpu_to_type.len()];

        for &cpu in self.p_cores.iter().chain(self.e_cores.iter()) {
            let path = base.join(format!("cpu{cpu}/topology/core_id"));
            let Ok(content) = fs::read_to_string(&path) else {
                continue;
            };
            match content.trim().parse::<CpuId>() {
                Ok(core_id) => self.physical_core_id[cpu as usize] = core_id,
                Err(_) => debug!("unparseable core_id for cpu{cpu}"),
            }
        }
    }
}

/// Parses a sysfs CPU list such as `0-5,12-19` or `0,2,4`.
///
/// Elements are comma-separated; each element is a decimal id or an
/// inclusive `a-b` range with `a <= b`. Whitespace around tokens and a
/// trailing newline are tolerated. The result preserves input order and
/// keeps duplicates; deduplication is the caller's job.
pub fn parse_cpu_list(content: &str) -> Result<Vec<CpuId>, TopologyError> {
    let content = content.trim();
    if content.is_empty() {
        return Err(TopologyError::ParseError);
    }

    let mut result = Vec::new();

    // A trailing comma produces an empty final element, rejected below
    for element in content.split(',') {
        parse_element(element, &mut result)?;
    }

    Ok(result)
}

fn parse_element(element: &str, result: &mut Vec<CpuId>) -> Result<(), TopologyError> {
    let element = element.trim();
    if element.is_empty() {
        return Err(TopologyError::ParseError);
    }

    let Some((start_str, end_str)) = element.split_once('-') else {
        result.push(parse_number(element)?);
        return Ok(());
    };

    let start = parse_number(start_str)?;
    let end = parse_number(end_str)?;

    // Reject inverted ranges like "5-3"
    if start > end {
        return Err(TopologyError::ParseError);
    }

    result.extend(start..=end);
    Ok(())
}

fn parse_number(text: &str) -> Result<CpuId, TopologyError> {
    let text = text.trim();
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return Err(TopologyError::ParseError);
    }
    text.parse::<CpuId>().map_err(|_| TopologyError::ParseError)
}

/// Parses a `core_type` token.
///
/// Newer kernels report `Core`/`Atom`, older ones `intel_core`/`intel_atom`.
/// Matching is case-sensitive; surrounding whitespace is trimmed.
pub fn parse_core_type(content: &str) -> Result<CoreType, TopologyError> {
    match content.trim() {
        "Core" | "intel_core" => Ok(CoreType::PCore),
        "Atom" | "intel_atom" => Ok(CoreType::ECore),
        _ => Err(TopologyError::ParseError),
    }
}

fn read_sysfs_file(path: &Path) -> Result<String, TopologyError> {
    fs::read_to_string(path).map_err(|err| match err.kind() {
        ErrorKind::PermissionDenied => TopologyError::PermissionDenied,
        _ => TopologyError::SysfsNotFound,
    })
}

fn cpu_id_from_dir_name(name: &str) -> Option<CpuId> {
    // "cpu0".."cpuN"; excludes "cpufreq", "cpuidle" and friends
    let digits = name.strip_prefix("cpu")?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_range() {
        assert_eq!(parse_cpu_list("0-11").unwrap(), (0..=11).collect::<Vec<_>>());
        assert_eq!(parse_cpu_list("12-19").unwrap(), (12..=19).collect::<Vec<_>>());
    }

    #[test]
    fn parses_mixed_elements() {
        assert_eq!(
            parse_cpu_list("0-2,5,8-10,15").unwrap(),
            vec![0, 1, 2, 5, 8, 9, 10, 15]
        );
    }

    #[test]
    fn parses_single_values() {
        assert_eq!(parse_cpu_list("0,2,4").unwrap(), vec![0, 2, 4]);
        assert_eq!(parse_cpu_list("7").unwrap(), vec![7]);
    }

    #[test]
    fn tolerates_whitespace_and_newline() {
        assert_eq!(parse_cpu_list("0-3\n").unwrap(), vec![0, 1, 2, 3]);
        assert_eq!(parse_cpu_list(" 0 , 2 , 4 ").unwrap(), vec![0, 2, 4]);
    }

    #[test]
    fn preserves_input_order_and_duplicates() {
        assert_eq!(parse_cpu_list("4,2,2-3").unwrap(), vec![4, 2, 2, 3]);
    }

    #[test]
    fn rejects_inverted_range() {
        assert_eq!(parse_cpu_list("5-3"), Err(TopologyError::ParseError));
    }

    #[test]
    fn rejects_empty_and_whitespace_input() {
        assert_eq!(parse_cpu_list(""), Err(TopologyError::ParseError));
        assert_eq!(parse_cpu_list("   \n"), Err(TopologyError::ParseError));
    }

    #[test]
    fn rejects_trailing_comma_and_empty_elements() {
        assert_eq!(parse_cpu_list("0-3,"), Err(TopologyError::ParseError));
        assert_eq!(parse_cpu_list("0,,2"), Err(TopologyError::ParseError));
    }

    #[test]
    fn rejects_non_decimal_characters() {
        assert_eq!(parse_cpu_list("0-x"), Err(TopologyError::ParseError));
        assert_eq!(parse_cpu_list("a,b"), Err(TopologyError::ParseError));
        assert_eq!(parse_cpu_list("-3"), Err(TopologyError::ParseError));
        assert_eq!(parse_cpu_list("+3"), Err(TopologyError::ParseError));
    }

    #[test]
    fn round_trips_rendered_lists() {
        let xs = vec![0u32, 1, 5, 9, 10, 64];
        let rendered = xs.iter().map(u32::to_string).collect::<Vec<_>>().join(",");
        assert_eq!(parse_cpu_list(&rendered).unwrap(), xs);
    }

    #[test]
    fn parses_core_type_tokens() {
        assert_eq!(parse_core_type("Core").unwrap(), CoreType::PCore);
        assert_eq!(parse_core_type("intel_core").unwrap(), CoreType::PCore);
        assert_eq!(parse_core_type("Atom\n").unwrap(), CoreType::ECore);
        assert_eq!(parse_core_type("intel_atom").unwrap(), CoreType::ECore);
    }

    #[test]
    fn rejects_unknown_core_type_tokens() {
        assert_eq!(parse_core_type("core"), Err(TopologyError::ParseError));
        assert_eq!(parse_core_type("ATOM"), Err(TopologyError::ParseError));
        assert_eq!(parse_core_type(""), Err(TopologyError::ParseError));
    }

    #[test]
    fn maps_listed_cpus_to_their_type() {
        let map = TopologyMap::new(&[0, 1, 2, 3], &[4, 5, 6, 7]);

        for cpu in [0, 1, 2, 3] {
            assert_eq!(map.core_type(cpu).unwrap(), CoreType::PCore);
        }
        for cpu in [4, 5, 6, 7] {
            assert_eq!(map.core_type(cpu).unwrap(), CoreType::ECore);
        }
    }

    #[test]
    fn rejects_out_of_range_and_gap_cpus() {
        // CPU 5 is a gap between the two lists, 99 is out of range
        let map = TopologyMap::new(&[0, 1], &[6, 7]);

        assert_eq!(map.core_type(5), Err(TopologyError::InvalidCpuId));
        assert_eq!(map.core_type(99), Err(TopologyError::InvalidCpuId));
    }

    #[test]
    fn hybrid_requires_both_lists() {
        assert!(TopologyMap::new(&[0, 1], &[2, 3]).is_hybrid());
        assert!(!TopologyMap::new(&[0, 1], &[]).is_hybrid());
        assert!(!TopologyMap::new(&[], &[2, 3]).is_hybrid());
        assert!(!TopologyMap::new(&[], &[]).is_hybrid());
    }

    #[test]
    fn empty_map_rejects_every_lookup() {
        let map = TopologyMap::default();
        assert_eq!(map.core_type(0), Err(TopologyError::InvalidCpuId));
        assert_eq!(map.total_cpu_count(), 0);
    }

    #[test]
    fn constructor_sorts_and_deduplicates() {
        let map = TopologyMap::new(&[3, 1, 1, 2], &[8, 8, 4]);
        assert_eq!(map.p_cores(), &[1, 2, 3]);
        assert_eq!(map.e_cores(), &[4, 8]);
        assert_eq!(map.total_cpu_count(), 5);
    }

    #[test]
    fn smt_sibling_is_false_without_data() {
        let map = TopologyMap::new(&[0, 1], &[2, 3]);
        assert!(!map.is_smt_sibling(0, 1));
        assert!(!map.is_smt_sibling(0, 0));
        assert!(!map.is_smt_sibling(0, 99));
    }
}
