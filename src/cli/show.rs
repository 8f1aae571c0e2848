//! taskreg show command implementation

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::activity::{ActivityEntry, ActivityType};
use crate::cli::Context;
use crate::error::{Error, Result};
use crate::output::{emit_success, HumanOutput, OutputOptions};
use crate::registry::TaskRegistry;
use crate::task::{Task, TaskId};

pub struct ShowOptions {
    pub context: Context,
    pub task: Option<u32>,
    pub json: bool,
    pub quiet: bool,
}

/// One line of the task list.
#[derive(Serialize)]
pub(super) struct TaskSummary {
    pub id: TaskId,
    pub user_id: u32,
    pub task_type: ActivityType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub affinity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub real_activity: Option<String>,
    pub activities: usize,
    pub in_recents: bool,
    pub affiliated_task: TaskId,
    pub last_active: DateTime<Utc>,
}

impl TaskSummary {
    pub(super) fn of(task: &Task) -> Self {
        Self {
            id: task.id(),
            user_id: task.user_id(),
            task_type: task.task_type(),
            affinity: task.affinity().map(str::to_string),
            real_activity: task.real_activity().map(ToString::to_string),
            activities: task.len(),
            in_recents: task.in_recents(),
            affiliated_task: task.affiliated_task_id(),
            last_active: task.last_active_time(),
        }
    }

    pub(super) fn line(&self) -> String {
        format!(
            "{} {} ({} {})",
            self.id,
            self.real_activity.as_deref().unwrap_or("<empty>"),
            self.activities,
            if self.activities == 1 { "activity" } else { "activities" },
        )
    }
}

#[derive(Serialize)]
struct ShowListReport {
    snapshot: PathBuf,
    tasks: Vec<TaskSummary>,
    repairs: usize,
}

#[derive(Serialize)]
struct ActivitySummary {
    id: String,
    component: String,
    fullscreen: bool,
    finishing: bool,
    visible: bool,
}

impl ActivitySummary {
    fn of(entry: &ActivityEntry) -> Self {
        Self {
            id: entry.id().to_string(),
            component: entry.real_activity().to_string(),
            fullscreen: entry.fullscreen,
            finishing: entry.finishing,
            visible: entry.visible,
        }
    }
}

#[derive(Serialize)]
struct ShowTaskReport {
    #[serde(flatten)]
    summary: TaskSummary,
    resize_mode: String,
    lock_task_auth: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    bounds: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    label: Option<String>,
    chain: Vec<TaskId>,
    stack: Vec<ActivitySummary>,
}

pub fn run(options: ShowOptions) -> Result<()> {
    let loaded = options.context.load_registry()?;
    let output = OutputOptions {
        json: options.json,
        quiet: options.quiet,
    };

    match options.task {
        Some(raw) => show_task(&loaded.registry, TaskId::new(raw), output),
        None => {
            let report = ShowListReport {
                snapshot: loaded.snapshot_path.clone(),
                tasks: loaded.registry.tasks().map(TaskSummary::of).collect(),
                repairs: loaded.repairs.len(),
            };

            let mut human = HumanOutput::new("taskreg show");
            human.push_summary("snapshot", loaded.snapshot_path.display().to_string());
            human.push_summary("tasks", report.tasks.len().to_string());
            for task in &report.tasks {
                human.push_detail(task.line());
            }
            if !loaded.repairs.is_empty() {
                human.push_warning(format!(
                    "{} affiliation link(s) needed repair",
                    loaded.repairs.len()
                ));
                human.push_next_step("taskreg check --write");
            }

            emit_success(output, "show", &report, Some(&human))
        }
    }
}

fn show_task(registry: &TaskRegistry, id: TaskId, output: OutputOptions) -> Result<()> {
    let task = registry.task(id).ok_or(Error::TaskNotFound(id))?;
    let report = ShowTaskReport {
        summary: TaskSummary::of(task),
        resize_mode: task.resize_mode().to_string(),
        lock_task_auth: task.lock_task_auth().to_string(),
        bounds: task.bounds().map(|bounds| bounds.to_string()),
        label: task.last_task_description().label.clone(),
        chain: registry.affiliation_chain(id)?,
        stack: task.activities().iter().map(ActivitySummary::of).collect(),
    };

    let mut human = HumanOutput::new(format!("taskreg show {id}"));
    human.push_summary("activity", report.summary.real_activity.clone().unwrap_or_default());
    if let Some(affinity) = &report.summary.affinity {
        human.push_summary("affinity", affinity.clone());
    }
    human.push_summary("resize mode", report.resize_mode.clone());
    human.push_summary("lock task", report.lock_task_auth.clone());
    human.push_summary(
        "bounds",
        report.bounds.clone().unwrap_or_else(|| "fullscreen".to_string()),
    );
    if report.chain.len() > 1 {
        let chain: Vec<String> = report.chain.iter().map(ToString::to_string).collect();
        human.push_summary("chain", chain.join(" -> "));
    }
    // Listed top first.
    for activity in report.stack.iter().rev() {
        let mut line = format!("{} {}", activity.id, activity.component);
        if activity.finishing {
            line.push_str(" (finishing)");
        }
        human.push_detail(line);
    }

    emit_success(output, "show", &report, Some(&human))
}
