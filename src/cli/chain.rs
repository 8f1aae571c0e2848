//! taskreg chain command implementation

use serde::Serialize;

use crate::cli::show::TaskSummary;
use crate::cli::Context;
use crate::error::{Error, Result};
use crate::output::{emit_success, HumanOutput, OutputOptions};
use crate::task::TaskId;

pub struct ChainOptions {
    pub context: Context,
    pub task: u32,
    pub json: bool,
    pub quiet: bool,
}

#[derive(Serialize)]
struct ChainReport {
    task: TaskId,
    head: TaskId,
    affiliated_task: TaskId,
    chain: Vec<TaskSummary>,
}

pub fn run(options: ChainOptions) -> Result<()> {
    let loaded = options.context.load_registry()?;
    let registry = &loaded.registry;
    let id = TaskId::new(options.task);
    let task = registry.require_task(id)?;

    let chain = registry
        .affiliation_chain(id)?
        .into_iter()
        .map(|link| {
            registry
                .task(link)
                .map(TaskSummary::of)
                .ok_or(Error::TaskNotFound(link))
        })
        .collect::<Result<Vec<_>>>()?;
    let head = chain.first().map(|summary| summary.id).unwrap_or(id);

    let report = ChainReport {
        task: id,
        head,
        affiliated_task: task.affiliated_task_id(),
        chain,
    };

    let mut human = HumanOutput::new(format!("taskreg chain {id}"));
    human.push_summary("head", head.to_string());
    human.push_summary("length", report.chain.len().to_string());
    human.push_summary("affiliated with", report.affiliated_task.to_string());
    for summary in &report.chain {
        let marker = if summary.id == id { " <" } else { "" };
        human.push_detail(format!("{}{marker}", summary.line()));
    }

    emit_success(
        OutputOptions {
            json: options.json,
            quiet: options.quiet,
        },
        "chain",
        &report,
        Some(&human),
    )
}
