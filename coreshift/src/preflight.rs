//! Pre-flight checks
//!
//! Validates system requirements before loading the eBPF probe or opening
//! counters, so failures surface as actionable messages instead of bare
//! EPERM from deep inside a syscall.

#![allow(unsafe_code)] // geteuid() requires unsafe

use anyhow::{bail, Context, Result};
use std::path::Path;

/// Minimum kernel for BPF ring buffers (BPF_MAP_TYPE_RINGBUF).
const MIN_KERNEL_VERSION: (u32, u32) = (5, 8);

/// Highest perf_event_paranoid level at which unprivileged per-thread
/// user-space counters still open.
const MAX_PARANOID_LEVEL: i32 = 1;

/// Runs every environment check needed before a profiling session.
/// Target existence is validated separately during target resolution
/// ([`crate::target::resolve_pid`]).
pub fn run_preflight_checks() -> Result<()> {
    check_privileges()?;
    check_kernel_version()?;
    check_perf_event_paranoid()?;
    Ok(())
}

/// The eBPF probe needs root (or CAP_BPF + CAP_PERFMON on 5.8+).
fn check_privileges() -> Result<()> {
    if unsafe { libc::geteuid() } == 0 {
        return Ok(());
    }

    bail!(
        "Permission denied: loading the migration probe requires root \
         (or CAP_BPF and CAP_PERFMON).\n\n\
         Run with: sudo coreshift ..."
    );
}

fn check_kernel_version() -> Result<()> {
    let version_str = std::fs::read_to_string("/proc/version")
        .context("Failed to read kernel version from /proc/version")?;

    // "Linux version 6.1.0-arch1-1 ..." — third token is the release
    let release = version_str.split_whitespace().nth(2).unwrap_or("unknown");

    let mut parts = release.split('.');
    let major: u32 = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0);
    let minor: u32 = parts
        .next()
        .map(|s| s.chars().take_while(char::is_ascii_digit).collect::<String>())
        .and_then(|s| s.parse().ok())
        .unwrap_or(0);

    // Unparseable release strings are assumed fine
    if major == 0 {
        return Ok(());
    }

    if (major, minor) < MIN_KERNEL_VERSION {
        bail!(
            "Kernel {major}.{minor} is too old: BPF ring buffers need Linux \
             {}.{} or newer (current release: {release})",
            MIN_KERNEL_VERSION.0,
            MIN_KERNEL_VERSION.1,
        );
    }

    Ok(())
}

/// Counters exclude kernel and hypervisor events, so paranoid <= 1 is
/// enough without extra capabilities. Root bypasses the sysctl entirely.
fn check_perf_event_paranoid() -> Result<()> {
    if unsafe { libc::geteuid() } == 0 {
        return Ok(());
    }

    let Ok(content) = std::fs::read_to_string("/proc/sys/kernel/perf_event_paranoid") else {
        // Sysctl missing (unusual kernel config); let perf_event_open decide
        return Ok(());
    };

    let level: i32 = content.trim().parse().unwrap_or(MAX_PARANOID_LEVEL);
    if level > MAX_PARANOID_LEVEL {
        bail!(
            "perf_event_paranoid is {level}; hardware counters need <= {MAX_PARANOID_LEVEL}.\n\n\
             Either run as root or: sudo sysctl kernel.perf_event_paranoid={MAX_PARANOID_LEVEL}"
        );
    }

    Ok(())
}

/// The target process must exist before attaching anything to it.
pub fn check_process_exists(pid: u32) -> Result<()> {
    if !Path::new(&format!("/proc/{pid}")).exists() {
        bail!(
            "Process {pid} not found.\n\n\
             Is the process still running? Check with: ps -p {pid}"
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kernel_version_check_does_not_panic() {
        // Might legitimately fail on an old kernel; just must not panic
        let _ = check_kernel_version();
    }

    #[test]
    fn nonexistent_process_is_reported() {
        let result = check_process_exists(999_999_999);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("not found"));
    }

    #[test]
    fn own_process_exists() {
        assert!(check_process_exists(std::process::id()).is_ok());
    }
}
