//! Build helper for the eBPF member.
//!
//! `cargo xtask build-ebpf` compiles `coreshift-ebpf` for the BPF target
//! with a nightly toolchain, producing the bytecode that the userspace
//! binary embeds at compile time.

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::process::Command;

const EBPF_PACKAGE: &str = "coreshift-ebpf";
const DEFAULT_TARGET: &str = "bpfel-unknown-none";

#[derive(Parser)]
enum Xtask {
    /// Compile the eBPF program to BPF bytecode
    BuildEbpf {
        /// BPF target triple
        #[arg(long, default_value = DEFAULT_TARGET)]
        target: String,
        /// Build in release mode (required for embedding; debug builds
        /// pull in formatting code the BPF linker rejects)
        #[arg(long)]
        release: bool,
    },
}

fn main() -> Result<()> {
    match Xtask::parse() {
        Xtask::BuildEbpf { target, release } => build_ebpf(&target, release),
    }
}

fn build_ebpf(target: &str, release: bool) -> Result<()> {
    let mut cmd = Command::new("cargo");
    cmd.args([
        "+nightly",
        "build",
        "--package",
        EBPF_PACKAGE,
        "--target",
        target,
        "-Z",
        "build-std=core",
    ]);
    if release {
        cmd.arg("--release");
    }

    let status = cmd
        .status()
        .with_context(|| format!("failed to run cargo for {EBPF_PACKAGE}"))?;
    if !status.success() {
        bail!("eBPF build failed (target {target})");
    }

    let profile = if release { "release" } else { "debug" };
    println!("built {EBPF_PACKAGE} for {target} ({profile})");
    Ok(())
}
