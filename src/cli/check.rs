//! taskreg check command implementation
//!
//! Restoring a snapshot already rebuilds affiliation chains; this command
//! reports what was cut and can write the repaired snapshot back.

use std::path::PathBuf;

use serde::Serialize;

use crate::affiliation::ChainRepair;
use crate::cli::Context;
use crate::error::Result;
use crate::output::{emit_success, HumanOutput, OutputOptions};

pub struct CheckOptions {
    pub context: Context,
    pub write: bool,
    pub json: bool,
    pub quiet: bool,
}

#[derive(Serialize)]
struct CheckReport {
    snapshot: PathBuf,
    exists: bool,
    tasks: usize,
    repairs: Vec<ChainRepair>,
    written: bool,
}

pub fn run(options: CheckOptions) -> Result<()> {
    let mut loaded = options.context.load_registry()?;
    let exists = loaded.snapshot_path.exists();

    let written = options.write && exists && !loaded.repairs.is_empty();
    if written {
        loaded.registry.save_snapshot()?;
    }

    let report = CheckReport {
        snapshot: loaded.snapshot_path.clone(),
        exists,
        tasks: loaded.registry.len(),
        repairs: loaded.repairs,
        written,
    };

    let mut human = HumanOutput::new("taskreg check");
    human.push_summary("snapshot", report.snapshot.display().to_string());
    human.push_summary("tasks", report.tasks.to_string());
    human.push_summary("repairs", report.repairs.len().to_string());
    if !exists {
        human.push_warning("no snapshot found");
    }
    for repair in &report.repairs {
        human.push_detail(format!(
            "{}: cut link to {} ({})",
            repair.task, repair.link, repair.kind
        ));
    }
    if written {
        human.push_detail("wrote repaired snapshot");
    } else if !report.repairs.is_empty() {
        human.push_next_step("taskreg check --write");
    }

    emit_success(
        OutputOptions {
            json: options.json,
            quiet: options.quiet,
        },
        "check",
        &report,
        Some(&human),
    )
}
