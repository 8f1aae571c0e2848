//! Stacks: ordered groups of tasks sharing a windowing mode.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::configuration::{Configuration, ConfigurationHolder, ConfigurationResolver};
use crate::geometry::Rect;
use crate::task::TaskId;

/// Unique identifier of a stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StackId(u32);

impl StackId {
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for StackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

/// Windowing mode of a stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StackKind {
    Home,
    Recents,
    Assistant,
    Fullscreen,
    Freeform,
    Docked,
    Pinned,
}

impl StackKind {
    /// Only freeform stacks remember each task's own bounds.
    pub fn persists_task_bounds(&self) -> bool {
        matches!(self, StackKind::Freeform)
    }

    pub fn is_multi_window(&self) -> bool {
        matches!(self, StackKind::Freeform | StackKind::Docked | StackKind::Pinned)
    }

    pub fn layout_policy(&self) -> LayoutPolicy {
        match self {
            StackKind::Freeform => LayoutPolicy::Cascade,
            StackKind::Docked | StackKind::Pinned => LayoutPolicy::StackBounds,
            _ => LayoutPolicy::Fill,
        }
    }
}

impl fmt::Display for StackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StackKind::Home => "home",
            StackKind::Recents => "recents",
            StackKind::Assistant => "assistant",
            StackKind::Fullscreen => "fullscreen",
            StackKind::Freeform => "freeform",
            StackKind::Docked => "docked",
            StackKind::Pinned => "pinned",
        };
        f.write_str(name)
    }
}

impl FromStr for StackKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "home" => Ok(StackKind::Home),
            "recents" => Ok(StackKind::Recents),
            "assistant" => Ok(StackKind::Assistant),
            "fullscreen" => Ok(StackKind::Fullscreen),
            "freeform" => Ok(StackKind::Freeform),
            "docked" => Ok(StackKind::Docked),
            "pinned" => Ok(StackKind::Pinned),
            _ => Err(format!("unknown stack kind: {s}")),
        }
    }
}

/// Why a task is leaving a stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveMode {
    /// The task is being destroyed.
    Destroying,
    /// The task is moving to another stack.
    Moving,
    /// The task is moving to another stack that will come to the front.
    MovingToTop,
}

/// Where to insert a task in a stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StackPosition {
    #[default]
    Top,
    Bottom,
    Index(usize),
}

/// How a stack places a task that has no bounds of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutPolicy {
    /// Tasks fill the stack.
    Fill,
    /// Tasks take the stack's bounds.
    StackBounds,
    /// New tasks cascade diagonally across the stack.
    Cascade,
}

impl LayoutPolicy {
    /// Bounds for a new task inside `area`, avoiding the top-left corners in
    /// `occupied`.
    ///
    /// Cascading starts at a quarter of the area, sizes windows to half of
    /// it, and steps by a sixteenth. A window that would spill out of the area
    /// wraps back to its top-left corner.
    pub fn layout(&self, area: Option<Rect>, occupied: &[Rect]) -> Option<Rect> {
        match self {
            LayoutPolicy::Fill => None,
            LayoutPolicy::StackBounds => area,
            LayoutPolicy::Cascade => {
                let area = area?;
                let width = area.width() / 2;
                let height = area.height() / 2;
                let step_x = (area.width() / 16).max(1);
                let step_y = (area.height() / 16).max(1);
                let left = area.left.saturating_add(area.width() / 4);
                let top = area.top.saturating_add(area.height() / 4);
                let mut candidate = Rect::new(
                    left,
                    top,
                    left.saturating_add(width),
                    top.saturating_add(height),
                );
                for _ in 0..=occupied.len() {
                    let collides = occupied
                        .iter()
                        .any(|rect| rect.left == candidate.left && rect.top == candidate.top);
                    if !collides {
                        break;
                    }
                    candidate = candidate.offset(step_x, step_y);
                    if candidate.right > area.right || candidate.bottom > area.bottom {
                        candidate = Rect::new(
                            area.left,
                            area.top,
                            area.left.saturating_add(width),
                            area.top.saturating_add(height),
                        );
                    }
                }
                Some(candidate)
            }
        }
    }
}

/// An ordered group of tasks, bottom (index 0) to top.
#[derive(Debug, Clone)]
pub struct Stack {
    id: StackId,
    kind: StackKind,
    bounds: Option<Rect>,
    override_configuration: Configuration,
    configuration: Configuration,
    tasks: Vec<TaskId>,
}

impl Stack {
    pub(crate) fn new(
        id: StackId,
        kind: StackKind,
        bounds: Option<Rect>,
        resolver: &ConfigurationResolver,
    ) -> Self {
        let mut stack = Self {
            id,
            kind,
            bounds: None,
            override_configuration: Configuration::default(),
            configuration: resolver.display_configuration(),
            tasks: Vec::new(),
        };
        stack.set_bounds(bounds, resolver);
        stack
    }

    pub fn id(&self) -> StackId {
        self.id
    }

    pub fn kind(&self) -> StackKind {
        self.kind
    }

    /// `None` for stacks that fill the display.
    pub fn bounds(&self) -> Option<Rect> {
        self.bounds
    }

    /// Display configuration with this stack's overrides applied.
    pub fn configuration(&self) -> &Configuration {
        &self.configuration
    }

    pub fn tasks(&self) -> &[TaskId] {
        &self.tasks
    }

    pub fn contains(&self, task: TaskId) -> bool {
        self.tasks.contains(&task)
    }

    pub fn position_of(&self, task: TaskId) -> Option<usize> {
        self.tasks.iter().position(|id| *id == task)
    }

    pub fn top_task(&self) -> Option<TaskId> {
        self.tasks.last().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn layout_policy(&self) -> LayoutPolicy {
        self.kind.layout_policy()
    }

    /// Concrete index for `position` when inserting a task not yet present.
    pub fn adjusted_position(&self, position: StackPosition) -> usize {
        match position {
            StackPosition::Top => self.tasks.len(),
            StackPosition::Bottom => 0,
            StackPosition::Index(index) => index.min(self.tasks.len()),
        }
    }

    pub(crate) fn set_bounds(&mut self, bounds: Option<Rect>, resolver: &ConfigurationResolver) {
        self.bounds = bounds;
        self.on_override_configuration_changed(resolver.stack_configuration(bounds));
        self.configuration = self.merged_configuration(&resolver.display_configuration());
    }

    /// Insert `task` at `index` (clamped); returns the index used.
    pub(crate) fn add(&mut self, task: TaskId, index: usize) -> usize {
        self.tasks.retain(|id| *id != task);
        let index = index.min(self.tasks.len());
        self.tasks.insert(index, task);
        tracing::debug!(stack = %self.id, task = %task, index, "task added to stack");
        index
    }

    /// Remove `task`; false when it was not here.
    pub(crate) fn remove(&mut self, task: TaskId, mode: RemoveMode) -> bool {
        let Some(index) = self.position_of(task) else {
            return false;
        };
        self.tasks.remove(index);
        tracing::debug!(stack = %self.id, task = %task, ?mode, "task removed from stack");
        true
    }
}

impl ConfigurationHolder for Stack {
    fn override_configuration(&self) -> &Configuration {
        &self.override_configuration
    }

    fn on_override_configuration_changed(&mut self, config: Configuration) {
        self.override_configuration = config;
    }
}
