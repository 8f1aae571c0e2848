#![allow(dead_code)]

use std::path::{Path, PathBuf};

use taskreg::activity::{ActivityEntry, ActivityId, ActivityInfo, ComponentName};
use taskreg::config::Config;
use taskreg::events::{EventKind, EventLog};
use taskreg::persist::FilePersister;
use taskreg::registry::TaskRegistry;
use taskreg::stack::{StackId, StackKind, StackPosition};
use taskreg::task::TaskId;
use taskreg::window::{RecordingWindowController, WindowCall};
use tempfile::TempDir;

pub const PACKAGE: &str = "com.example";

/// A detached entry for `com.example/.<class>`.
pub fn entry(id: u64, class: &str) -> ActivityEntry {
    entry_with(id, class, |_| {})
}

/// Like [`entry`], with the launch info adjusted by `edit`.
pub fn entry_with(id: u64, class: &str, edit: impl FnOnce(&mut ActivityInfo)) -> ActivityEntry {
    let mut info = ActivityInfo::new(ComponentName::new(PACKAGE, format!("{PACKAGE}.{class}")));
    edit(&mut info);
    ActivityEntry::for_info(ActivityId::new(id), info)
}

pub fn ids(raw: &[u64]) -> Vec<ActivityId> {
    raw.iter().copied().map(ActivityId::new).collect()
}

/// Registry wired to an in-memory window controller and event log.
pub struct Harness {
    pub registry: TaskRegistry,
    pub window: RecordingWindowController,
    pub events: EventLog,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        let window = RecordingWindowController::new();
        let events = EventLog::new();
        let mut registry =
            TaskRegistry::new(config).with_window_controller(Box::new(window.clone()));
        registry.subscribe(Box::new(events.clone()));
        Self {
            registry,
            window,
            events,
        }
    }

    pub fn stack(&mut self, kind: StackKind) -> StackId {
        self.registry.create_stack(kind, None).expect("create stack")
    }

    /// A task rooted at `entries[0]` with the rest added on top, in `stack`.
    pub fn task(&mut self, stack: StackId, entries: Vec<ActivityEntry>) -> TaskId {
        let mut entries = entries.into_iter();
        let root = entries.next().expect("task needs a root entry");
        let task = self
            .registry
            .create_task(root, Some(stack), StackPosition::Top)
            .expect("create task");
        for entry in entries {
            self.registry
                .add_activity_to_top(task, entry)
                .expect("add activity");
        }
        task
    }

    pub fn activity_ids(&self, task: TaskId) -> Vec<ActivityId> {
        self.registry
            .require_task(task)
            .expect("task")
            .activities()
            .iter()
            .map(ActivityEntry::id)
            .collect()
    }

    pub fn event_count(&self, kind: EventKind) -> usize {
        self.events.kinds().iter().filter(|seen| **seen == kind).count()
    }

    pub fn window_calls(&self) -> Vec<WindowCall> {
        self.window.calls()
    }
}

/// A temp directory laid out like a taskreg working directory.
pub struct TestDir {
    dir: TempDir,
}

impl TestDir {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("failed to create tempdir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Default snapshot directory for a config-less working directory.
    pub fn state_dir(&self) -> PathBuf {
        self.dir.path().join(".taskreg")
    }

    pub fn persister(&self) -> FilePersister {
        FilePersister::new(self.state_dir(), 2000)
    }

    pub fn write_config(&self, contents: &str) -> PathBuf {
        let path = self.dir.path().join(".taskreg.toml");
        std::fs::write(&path, contents).expect("write config");
        path
    }

    /// A registry persisting into [`TestDir::state_dir`].
    pub fn registry(&self) -> TaskRegistry {
        TaskRegistry::new(Config::default()).with_persister(Box::new(self.persister()))
    }
}
