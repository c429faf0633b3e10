//! JSON session export
//!
//! Writes the captured session (migrations, samples, per-class impact
//! summary) as a single JSON document for offline analysis.

use std::io::Write;

use serde::Serialize;
use thiserror::Error;

use crate::analysis::{EventStore, ImpactReport};
use crate::domain::{MigrationEvent, PmuSample};

#[derive(Error, Debug)]
pub enum ExportError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

#[derive(Serialize)]
struct MigrationJson {
    timestamp_ns: u64,
    pid: u32,
    tid: u32,
    src_cpu: u32,
    dst_cpu: u32,
    comm: String,
}

impl From<&MigrationEvent> for MigrationJson {
    fn from(event: &MigrationEvent) -> Self {
        Self {
            timestamp_ns: event.timestamp_ns,
            pid: event.pid,
            tid: event.tid,
            src_cpu: event.src_cpu,
            dst_cpu: event.dst_cpu,
            comm: event.comm_str().into_owned(),
        }
    }
}

#[derive(Serialize)]
struct SampleJson {
    timestamp_ns: u64,
    tid: u32,
    cpu_id: u32,
    instructions: u64,
    cycles: u64,
    llc_misses: u64,
    llc_references: u64,
    branch_misses: u64,
    ipc: f64,
    llc_miss_rate: f64,
}

impl From<&PmuSample> for SampleJson {
    fn from(sample: &PmuSample) -> Self {
        Self {
            timestamp_ns: sample.timestamp_ns,
            tid: sample.tid,
            cpu_id: sample.cpu_id,
            instructions: sample.instructions,
            cycles: sample.cycles,
            llc_misses: sample.llc_misses,
            llc_references: sample.llc_references,
            branch_misses: sample.branch_misses,
            ipc: sample.ipc(),
            llc_miss_rate: sample.llc_miss_rate(),
        }
    }
}

#[derive(Serialize)]
struct ClassSummaryJson {
    class: String,
    count: usize,
    correlated: usize,
    mean_ipc_delta: f64,
    mean_llc_miss_rate_delta: f64,
}

#[derive(Serialize)]
struct SessionJson {
    migrations: Vec<MigrationJson>,
    pmu_samples: Vec<SampleJson>,
    impact_by_class: Vec<ClassSummaryJson>,
}

/// Serializes the whole session to `writer` as pretty-printed JSON.
pub fn export_session<W: Write>(
    store: &EventStore,
    report: &ImpactReport,
    writer: W,
) -> Result<(), ExportError> {
    let session = SessionJson {
        migrations: store.all_migrations().iter().map(MigrationJson::from).collect(),
        pmu_samples: store.all_pmu_samples().iter().map(SampleJson::from).collect(),
        impact_by_class: report
            .class_summaries()
            .into_iter()
            .map(|(kind, summary)| ClassSummaryJson {
                class: kind.to_string(),
                count: summary.count,
                correlated: summary.correlated,
                mean_ipc_delta: summary.mean_ipc_delta,
                mean_llc_miss_rate_delta: summary.mean_llc_miss_rate_delta,
            })
            .collect(),
    };

    serde_json::to_writer_pretty(writer, &session)?;
    Ok(())
}
