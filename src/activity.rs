//! Activity entries: the elements of a task's back-stack.
//!
//! An [`ActivityEntry`] is owned by at most one task at a time. The owner is
//! recorded on the entry itself and only the task module may change it, so
//! moving an entry between tasks is always an explicit detach then attach.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::task::{ResizeMode, TaskId};

/// Unique identifier of an activity entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActivityId(u64);

impl ActivityId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ActivityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "a{}", self.0)
    }
}

/// Package + class name of an activity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ComponentName {
    pub package: String,
    pub class: String,
}

impl ComponentName {
    pub fn new(package: impl Into<String>, class: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            class: class.into(),
        }
    }

    /// `pkg/.Class` when the class lives in the package, `pkg/full.Class` otherwise.
    pub fn flatten_to_short_string(&self) -> String {
        match self.class.strip_prefix(self.package.as_str()) {
            Some(rest) if rest.starts_with('.') => format!("{}/{}", self.package, rest),
            _ => format!("{}/{}", self.package, self.class),
        }
    }
}

impl fmt::Display for ComponentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.flatten_to_short_string())
    }
}

/// Launch flags carried by an intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LaunchFlags(u32);

impl LaunchFlags {
    pub const NONE: LaunchFlags = LaunchFlags(0);
    pub const SINGLE_TOP: LaunchFlags = LaunchFlags(0x2000_0000);
    pub const MULTIPLE_TASK: LaunchFlags = LaunchFlags(0x0800_0000);
    pub const CLEAR_TOP: LaunchFlags = LaunchFlags(0x0400_0000);
    pub const RESET_TASK_IF_NEEDED: LaunchFlags = LaunchFlags(0x0020_0000);
    pub const NEW_DOCUMENT: LaunchFlags = LaunchFlags(0x0008_0000);
    /// Older name for [`LaunchFlags::NEW_DOCUMENT`]; same bit.
    pub const CLEAR_WHEN_TASK_RESET: LaunchFlags = LaunchFlags::NEW_DOCUMENT;
    pub const RETAIN_IN_RECENTS: LaunchFlags = LaunchFlags(0x0000_2000);

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn contains(self, other: LaunchFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn intersects(self, other: LaunchFlags) -> bool {
        self.0 & other.0 != 0
    }

    pub const fn union(self, other: LaunchFlags) -> Self {
        Self(self.0 | other.0)
    }

    /// A new-document launch that should land in an existing document task.
    pub const fn is_document_launch_into_existing(self) -> bool {
        self.contains(Self::NEW_DOCUMENT) && !self.contains(Self::MULTIPLE_TASK)
    }
}

impl std::ops::BitOr for LaunchFlags {
    type Output = LaunchFlags;

    fn bitor(self, rhs: Self) -> Self::Output {
        self.union(rhs)
    }
}

/// An intent: target component plus launch flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Intent {
    pub component: ComponentName,
    #[serde(default)]
    pub flags: LaunchFlags,
}

impl Intent {
    pub fn new(component: ComponentName) -> Self {
        Self {
            component,
            flags: LaunchFlags::NONE,
        }
    }

    pub fn with_flags(mut self, flags: LaunchFlags) -> Self {
        self.flags = flags;
        self
    }
}

/// How a new launch of this activity interacts with existing instances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LaunchMode {
    #[default]
    Multiple,
    SingleTop,
    SingleTask,
    SingleInstance,
}

/// Document launch behaviour declared by the activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentLaunchMode {
    #[default]
    None,
    IntoExisting,
    Always,
    Never,
}

/// Requested lock-task behaviour, before privilege checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockTaskLaunchMode {
    #[default]
    Default,
    Never,
    Always,
    IfWhitelisted,
}

/// Kind of activity; a task adopts the kind of its first entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityType {
    #[default]
    Application,
    Home,
    Recents,
    Assistant,
}

/// Static launch information for an activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityInfo {
    pub component: ComponentName,
    /// Alias target: the class that actually runs when this is an alias.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_activity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_affinity: Option<String>,
    #[serde(default)]
    pub launch_mode: LaunchMode,
    #[serde(default)]
    pub relinquish_task_identity: bool,
    #[serde(default)]
    pub auto_remove_from_recents: bool,
    #[serde(default)]
    pub document_launch_mode: DocumentLaunchMode,
    #[serde(default)]
    pub resize_mode: ResizeMode,
    #[serde(default)]
    pub supports_picture_in_picture: bool,
    #[serde(default)]
    pub lock_task_launch_mode: LockTaskLaunchMode,
    #[serde(default)]
    pub privileged: bool,
    #[serde(default)]
    pub uid: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_width: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_height: Option<i32>,
    #[serde(default = "default_max_recents")]
    pub max_recents: u32,
    #[serde(default)]
    pub persistable: bool,
}

fn default_max_recents() -> u32 {
    16
}

impl ActivityInfo {
    /// Launch info with defaults for everything but the component.
    pub fn new(component: ComponentName) -> Self {
        let affinity = component.package.clone();
        Self {
            component,
            target_activity: None,
            task_affinity: Some(affinity),
            launch_mode: LaunchMode::default(),
            relinquish_task_identity: false,
            auto_remove_from_recents: false,
            document_launch_mode: DocumentLaunchMode::default(),
            resize_mode: ResizeMode::default(),
            supports_picture_in_picture: false,
            lock_task_launch_mode: LockTaskLaunchMode::default(),
            privileged: false,
            uid: 0,
            min_width: None,
            min_height: None,
            max_recents: default_max_recents(),
            persistable: false,
        }
    }

    /// The component that actually runs, resolving aliases.
    pub fn real_component(&self) -> ComponentName {
        match &self.target_activity {
            Some(target) => ComponentName::new(self.component.package.clone(), target.clone()),
            None => self.component.clone(),
        }
    }
}

/// Presentation values an activity publishes for the recents list.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TaskDescription {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon_filename: Option<String>,
    #[serde(default)]
    pub primary_color: u32,
    #[serde(default)]
    pub background_color: u32,
}

/// Options attached to a launch, handed to whichever entry survives a clear.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchOptions {
    pub animation: String,
}

/// One entry in a task's back-stack.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityEntry {
    id: ActivityId,
    pub info: ActivityInfo,
    pub intent: Intent,
    #[serde(default)]
    pub activity_type: ActivityType,
    #[serde(default)]
    pub launched_from_uid: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub launched_from_package: Option<String>,
    #[serde(default = "default_fullscreen")]
    pub fullscreen: bool,
    #[serde(default)]
    pub task_overlay: bool,
    #[serde(default)]
    pub finishing: bool,
    #[serde(default)]
    pub front_of_task: bool,
    #[serde(default)]
    pub visible: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_description: Option<TaskDescription>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_options: Option<LaunchOptions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    task: Option<TaskId>,
}

fn default_fullscreen() -> bool {
    true
}

impl ActivityEntry {
    /// A detached entry launched with `intent`.
    pub fn new(id: ActivityId, info: ActivityInfo, intent: Intent) -> Self {
        Self {
            id,
            info,
            intent,
            activity_type: ActivityType::default(),
            launched_from_uid: 0,
            launched_from_package: None,
            fullscreen: true,
            task_overlay: false,
            finishing: false,
            front_of_task: false,
            visible: false,
            task_description: None,
            pending_options: None,
            task: None,
        }
    }

    /// A detached entry whose intent targets its own component.
    pub fn for_info(id: ActivityId, info: ActivityInfo) -> Self {
        let intent = Intent::new(info.component.clone());
        Self::new(id, info, intent)
    }

    pub fn id(&self) -> ActivityId {
        self.id
    }

    /// The task currently owning this entry.
    pub fn task(&self) -> Option<TaskId> {
        self.task
    }

    pub(crate) fn set_task(&mut self, task: Option<TaskId>) {
        self.task = task;
    }

    /// Identity used for clear-top and history matching.
    pub fn real_activity(&self) -> ComponentName {
        match &self.info.target_activity {
            Some(_) => self.info.real_component(),
            None => self.intent.component.clone(),
        }
    }

    pub fn is_persistable(&self) -> bool {
        self.info.persistable
    }

    pub fn take_options(&mut self) -> Option<LaunchOptions> {
        self.pending_options.take()
    }
}

impl fmt::Display for ActivityEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.id, self.real_activity())
    }
}
