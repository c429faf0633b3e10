//! Target process resolution
//!
//! Turns the driver's `--pid`/`--name` selection into a concrete,
//! existing PID. Name matching follows the kernel's comm semantics:
//! `/proc/<pid>/comm` carries at most 15 characters plus NUL, the same
//! truncation applied to the comm field of migration records, so a
//! longer requested name is truncated before comparing. Kernel threads
//! are never candidates; they have no user-space counters to sample.

use anyhow::{bail, Context, Result};
use std::fs;

use coreshift_common::MAX_COMM_LEN;

use crate::preflight;

// Usable comm bytes: TASK_COMM_LEN minus the NUL terminator.
const COMM_PAYLOAD_LEN: usize = MAX_COMM_LEN - 1;

/// Resolves the profiling target to a PID that exists right now.
///
/// An explicit `pid` wins over `name`; passing neither is an error.
pub fn resolve_pid(pid: Option<u32>, name: Option<&str>) -> Result<u32> {
    match (pid, name) {
        (Some(pid), _) => {
            preflight::check_process_exists(pid)?;
            Ok(pid)
        }
        (None, Some(name)) => find_by_comm(name),
        (None, None) => bail!("specify a target with --pid <PID> or --name <NAME>"),
    }
}

/// Finds the unique userspace process whose comm equals `name` after
/// kernel truncation.
fn find_by_comm(name: &str) -> Result<u32> {
    let wanted = truncate_to_comm(name);

    let mut matches: Vec<u32> = Vec::new();
    for pid in userspace_pids()? {
        let Ok(comm) = fs::read_to_string(format!("/proc/{pid}/comm")) else {
            // Raced with process exit
            continue;
        };
        if comm.trim_end() == wanted {
            matches.push(pid);
        }
    }

    match matches.as_slice() {
        [] => bail!(
            "no process named '{wanted}' found.\n\
             Check running processes with: pgrep -l {wanted}"
        ),
        [pid] => Ok(*pid),
        candidates => bail!(
            "{} processes are named '{wanted}' (PIDs {}).\n\
             Specify one with --pid <PID>",
            candidates.len(),
            candidates.iter().map(u32::to_string).collect::<Vec<_>>().join(", ")
        ),
    }
}

/// Numeric `/proc` entries backed by a userspace process.
///
/// Kernel threads are filtered out by their empty cmdline.
fn userspace_pids() -> Result<Vec<u32>> {
    let entries = fs::read_dir("/proc").context("failed to read /proc")?;

    let mut pids = Vec::new();
    for entry in entries.flatten() {
        let Some(pid) = entry.file_name().to_str().and_then(|s| s.parse::<u32>().ok()) else {
            continue;
        };
        let cmdline = fs::read(format!("/proc/{pid}/cmdline")).unwrap_or_default();
        if !cmdline.is_empty() {
            pids.push(pid);
        }
    }

    Ok(pids)
}

/// Truncates a requested name the way the kernel truncates comm,
/// backing up to a char boundary so multibyte names stay valid.
fn truncate_to_comm(name: &str) -> &str {
    if name.len() <= COMM_PAYLOAD_LEN {
        return name;
    }
    let mut end = COMM_PAYLOAD_LEN;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    &name[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_names_are_untouched() {
        assert_eq!(truncate_to_comm("nginx"), "nginx");
        assert_eq!(truncate_to_comm("exactly15chars!"), "exactly15chars!");
    }

    #[test]
    fn long_names_truncate_like_the_kernel() {
        // A 16th character never survives into comm
        assert_eq!(truncate_to_comm("a-very-long-process-name"), "a-very-long-pro");
        assert_eq!(truncate_to_comm("sixteen-chars-ab"), "sixteen-chars-a");
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        // 8 two-byte chars: byte 15 falls mid-char, so only 7 survive
        let name = "éééééééé";
        let truncated = truncate_to_comm(name);
        assert_eq!(truncated, "ééééééé");
    }

    #[test]
    fn own_process_is_a_userspace_pid() {
        let pids = userspace_pids().unwrap();
        assert!(pids.contains(&std::process::id()));
    }

    #[test]
    fn explicit_pid_must_exist() {
        assert_eq!(resolve_pid(Some(std::process::id()), None).unwrap(), std::process::id());
        assert!(resolve_pid(Some(999_999_999), None).is_err());
    }

    #[test]
    fn missing_target_selection_is_an_error() {
        let err = resolve_pid(None, None).unwrap_err().to_string();
        assert!(err.contains("--pid"));
        assert!(err.contains("--name"));
    }
}
