//! CLI argument definitions

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "coreshift", about = "Migration cost profiler for hybrid x86 CPUs")]
pub struct Args {
    /// Process ID to profile
    #[arg(short, long, conflicts_with = "name")]
    pub pid: Option<u32>,

    /// Process name to profile (kernel comm, truncated to 15 chars)
    #[arg(short, long)]
    pub name: Option<String>,

    /// Thread ID to sample counters for (defaults to the process itself)
    #[arg(long)]
    pub tid: Option<u32>,

    /// Duration to profile in seconds (0 = until Ctrl+C)
    #[arg(long, default_value = "0")]
    pub duration: u64,

    /// Sampling interval in microseconds (clamped to >= 100)
    #[arg(long, default_value = "1000")]
    pub interval_us: u64,

    /// Skip pre-flight privilege and environment checks
    #[arg(long)]
    pub no_preflight: bool,

    /// Export the captured session to a JSON file
    #[arg(long, value_name = "FILE")]
    pub export: Option<PathBuf>,
}
