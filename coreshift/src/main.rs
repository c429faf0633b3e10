//! # coreshift — driver binary
//!
//! Wires the collection pipeline together for one profiling session:
//!
//! 0. Resolve the target (by PID or name) and run pre-flight checks.
//! 1. Load the CPU topology (degrading to "everything unclassified" on
//!    non-hybrid machines).
//! 2. Create the migration probe, set the target-PID filter, attach.
//! 3. Create a PMU sampler for the target and start it.
//! 4. Drain both streams into the event store until Ctrl+C or the
//!    `--duration` limit.
//! 5. Print the per-class impact report and optionally export JSON.
//!
//! Both collectors hand events to the driver through crossbeam channels;
//! the store itself stays single-threaded.

use std::fs::File;
use std::io::BufWriter;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use crossbeam_channel::unbounded;
use log::{info, warn};

use coreshift::analysis::{EventStore, ImpactReport};
use coreshift::cli::Args;
use coreshift::domain::{MigrationEvent, PmuSample, TopologyError};
use coreshift::export::export_session;
use coreshift::pmu::PmuSampler;
use coreshift::preflight;
use coreshift::probe::MigrationProbe;
use coreshift::target::resolve_pid;
use coreshift::topology::TopologyMap;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let pid = resolve_pid(args.pid, args.name.as_deref())?;
    info!("✓ Profiling PID {pid}");

    if !args.no_preflight {
        preflight::run_preflight_checks()?;
    }

    let topology = load_topology();

    // Collection → driver handoff; the store itself is single-threaded
    let (migration_tx, migration_rx) = unbounded::<MigrationEvent>();
    let (sample_tx, sample_rx) = unbounded::<PmuSample>();

    let mut probe = MigrationProbe::create(Box::new(move |event| {
        let _ = migration_tx.send(*event);
    }))
    .context("failed to set up migration probe (needs CAP_BPF or root)")?;

    probe
        .set_target_pid(Some(pid))
        .context("failed to set target PID filter")?;
    probe.start().context("failed to attach migration probe")?;
    info!("✓ Attached tracepoint: sched/sched_migrate_task (PID {pid})");

    let target_tid = args.tid.unwrap_or(pid);
    let mut sampler = PmuSampler::create(
        target_tid as libc::pid_t,
        Box::new(move |sample| {
            let _ = sample_tx.send(*sample);
        }),
        Duration::from_micros(args.interval_us),
    )
    .context("failed to open PMU counter group (check perf_event_paranoid)")?;

    sampler.start().context("failed to start PMU sampler")?;
    info!(
        "✓ Sampling PMU group for TID {} every {:?}",
        target_tid,
        sampler.interval()
    );

    let mut store = EventStore::new();

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let session_start = Instant::now();
    let duration_limit =
        if args.duration > 0 { Some(Duration::from_secs(args.duration)) } else { None };

    loop {
        if let Some(limit) = duration_limit {
            if session_start.elapsed() >= limit {
                println!("\n✓ Duration limit reached ({}s)", args.duration);
                break;
            }
        }

        // Drain the kernel ring buffer, then both channels
        probe.poll(Duration::ZERO);
        for event in migration_rx.try_iter() {
            store.add_migration(event);
        }
        for sample in sample_rx.try_iter() {
            store.add_pmu_sample(sample);
        }

        tokio::select! {
            () = tokio::time::sleep(Duration::from_millis(100)) => {}
            _ = &mut ctrl_c => {
                println!("\n✓ Received Ctrl+C, shutting down");
                break;
            }
        }
    }

    // Stop collectors, then drain whatever is still buffered
    sampler.stop();
    probe.stop();
    probe.poll(Duration::from_millis(100));
    for event in migration_rx.try_iter() {
        store.add_migration(event);
    }
    for sample in sample_rx.try_iter() {
        store.add_pmu_sample(sample);
    }

    info!(
        "session captured {} migrations ({} dropped short), {} samples",
        store.migration_count(),
        probe.short_record_count(),
        store.pmu_sample_count()
    );

    let report = ImpactReport::build(&store, &topology);
    print_report(&store, &report);

    if let Some(path) = args.export {
        let file = File::create(&path).context("failed to create export file")?;
        export_session(&store, &report, BufWriter::new(file))
            .context("failed to export session")?;
        println!("✓ Session exported to {}", path.display());
    }

    Ok(())
}

/// Loads the topology, degrading gracefully on non-hybrid machines: every
/// lookup then fails and all migrations classify as Unknown.
fn load_topology() -> TopologyMap {
    match TopologyMap::from_sysfs() {
        Ok(topology) => {
            info!(
                "✓ Hybrid topology: {} P-cores, {} E-cores",
                topology.p_cores().len(),
                topology.e_cores().len()
            );
            topology
        }
        Err(TopologyError::NotHybridCpu) => {
            warn!("not a hybrid CPU; migrations will be classified as Unknown");
            TopologyMap::default()
        }
        Err(err) => {
            warn!("topology detection failed ({err}); classification disabled");
            TopologyMap::default()
        }
    }
}

fn print_report(store: &EventStore, report: &ImpactReport) {
    println!("\nMigration impact by class");
    println!("  {:<8} {:>8} {:>11} {:>14} {:>16}", "class", "count", "correlated", "mean Δipc", "mean Δllc-miss");

    for (kind, summary) in report.class_summaries() {
        println!(
            "  {:<8} {:>8} {:>11} {:>14.3} {:>16.4}",
            kind.to_string(),
            summary.count,
            summary.correlated,
            summary.mean_ipc_delta,
            summary.mean_llc_miss_rate_delta,
        );
    }

    println!(
        "\n  {} migrations, {} PMU samples in session",
        store.migration_count(),
        store.pmu_sample_count()
    );
}
