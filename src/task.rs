//! Task records.
//!
//! A [`Task`] is a back-stack of [`ActivityEntry`] values (index 0 is the
//! root, the last entry is the top) together with the identity derived from
//! those entries, its bounds and override configuration, and its links into
//! an affiliation chain.
//!
//! Mutators here only touch the task itself. Anything that crosses objects
//! (stacks, other tasks, collaborators) goes through
//! [`crate::registry::TaskRegistry`].
//!
//! # Derived state
//!
//! `resize_mode`, `supports_picture_in_picture` and `lock_task_auth` are
//! written only by [`Task::set_intent`] and [`Task::set_lock_task_auth`],
//! which run whenever the effective root entry changes.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::activity::{
    ActivityEntry, ActivityId, ActivityInfo, ActivityType, ComponentName, DocumentLaunchMode,
    Intent, LaunchFlags, LaunchMode, LockTaskLaunchMode, TaskDescription,
};
use crate::config::{LockTaskConfig, RegistryConfig};
use crate::configuration::{Configuration, ConfigurationHolder, ConfigurationResolver};
use crate::error::{Error, Result};
use crate::geometry::Rect;
use crate::stack::{Stack, StackId, StackKind};

/// Uids are partitioned per user in blocks of this size.
pub const PER_USER_RANGE: u32 = 100_000;

/// Unique identifier of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(u32);

impl TaskId {
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// =============================================================================
// Resize mode
// =============================================================================

/// How a task may be resized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResizeMode {
    Unresizeable,
    #[default]
    Resizeable,
    /// Resizeable, but only to portrait bounds
    ForceResizablePortrait,
    /// Resizeable, but only to landscape bounds
    ForceResizableLandscape,
    /// Resizeable, keeping the current orientation
    ForceResizablePreserveOrientation,
}

impl ResizeMode {
    pub fn is_resizeable(&self) -> bool {
        !matches!(self, ResizeMode::Unresizeable)
    }

    pub fn is_preserve_orientation(&self) -> bool {
        matches!(
            self,
            ResizeMode::ForceResizablePortrait
                | ResizeMode::ForceResizableLandscape
                | ResizeMode::ForceResizablePreserveOrientation
        )
    }
}

impl fmt::Display for ResizeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResizeMode::Unresizeable => write!(f, "unresizeable"),
            ResizeMode::Resizeable => write!(f, "resizeable"),
            ResizeMode::ForceResizablePortrait => write!(f, "force_resizable_portrait"),
            ResizeMode::ForceResizableLandscape => write!(f, "force_resizable_landscape"),
            ResizeMode::ForceResizablePreserveOrientation => {
                write!(f, "force_resizable_preserve_orientation")
            }
        }
    }
}

// =============================================================================
// Lock task authorization
// =============================================================================

/// Whether and how a task may enter lock-task mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockTaskAuth {
    DontLock,
    #[default]
    Pinnable,
    Launchable,
    Whitelisted,
    LaunchablePriv,
}

impl fmt::Display for LockTaskAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockTaskAuth::DontLock => write!(f, "dont_lock"),
            LockTaskAuth::Pinnable => write!(f, "pinnable"),
            LockTaskAuth::Launchable => write!(f, "launchable"),
            LockTaskAuth::Whitelisted => write!(f, "whitelisted"),
            LockTaskAuth::LaunchablePriv => write!(f, "launchable_priv"),
        }
    }
}

/// Registry-wide policy a task consults while deriving its state.
#[derive(Debug, Clone, Copy)]
pub struct TaskPolicy<'a> {
    pub registry: &'a RegistryConfig,
    pub lock_task: &'a LockTaskConfig,
    pub resolver: &'a ConfigurationResolver,
}

/// Result of [`Task::remove_activity`].
#[derive(Debug)]
pub struct RemovedActivity {
    pub entry: ActivityEntry,
    /// The task has no entries left.
    pub task_emptied: bool,
    /// The task is empty and not being cleared for reuse.
    pub should_destroy: bool,
}

/// Result of a clear operation.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ClearOutcome {
    /// Existing entry the caller should deliver the new launch to.
    pub reused: Option<ActivityId>,
    /// Entries marked finishing, in the order they were finished.
    pub finished: Vec<ActivityId>,
}

/// Effect of an override-configuration update.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ConfigUpdate {
    pub changed: bool,
    pub fullscreen_changed: bool,
}

/// A back-stack of activity entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    id: TaskId,
    user_id: u32,
    activities: Vec<ActivityEntry>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    intent: Option<Intent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    real_activity: Option<ComponentName>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    orig_activity: Option<ComponentName>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    affinity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    root_affinity: Option<String>,
    #[serde(default)]
    root_was_reset: bool,
    #[serde(default)]
    never_relinquish_identity: bool,
    #[serde(default)]
    auto_remove_recents: bool,
    #[serde(default)]
    effective_uid: u32,
    #[serde(default)]
    calling_uid: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    calling_package: Option<String>,

    #[serde(default)]
    task_type: ActivityType,
    #[serde(default)]
    persistable: bool,
    #[serde(default = "default_max_recents")]
    max_recents: u32,
    #[serde(skip)]
    num_fullscreen: usize,
    #[serde(skip)]
    reuse_task: bool,

    #[serde(default)]
    resize_mode: ResizeMode,
    #[serde(default)]
    supports_picture_in_picture: bool,
    #[serde(default)]
    lock_task_mode: LockTaskLaunchMode,
    #[serde(default)]
    lock_task_auth: LockTaskAuth,
    #[serde(default)]
    privileged: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    min_width: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    min_height: Option<i32>,
    #[serde(skip)]
    temporarily_unresizable: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    bounds: Option<Rect>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_non_fullscreen_bounds: Option<Rect>,
    #[serde(default)]
    override_configuration: Configuration,

    affiliated_task_id: TaskId,
    #[serde(default)]
    affiliated_task_color: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    prev_affiliate: Option<TaskId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    next_affiliate: Option<TaskId>,

    #[serde(skip)]
    stack: Option<StackId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    first_active_time: Option<DateTime<Utc>>,
    last_active_time: DateTime<Utc>,
    #[serde(default)]
    has_been_visible: bool,
    #[serde(default)]
    in_recents: bool,
    #[serde(default)]
    last_task_description: TaskDescription,
    #[serde(default)]
    task_to_return_to: ActivityType,
}

fn default_max_recents() -> u32 {
    1
}

impl Task {
    /// Create a task whose identity is seeded from `root`.
    ///
    /// `root` is not added; the caller attaches it with
    /// [`Task::add_activity_at_index`].
    pub fn new(id: TaskId, root: &ActivityEntry, policy: &TaskPolicy<'_>) -> Self {
        let now = Utc::now();
        let mut task = Self {
            id,
            user_id: root.info.uid / PER_USER_RANGE,
            activities: Vec::new(),
            intent: None,
            real_activity: None,
            orig_activity: None,
            affinity: None,
            root_affinity: None,
            root_was_reset: false,
            never_relinquish_identity: false,
            auto_remove_recents: false,
            effective_uid: root.info.uid,
            calling_uid: root.launched_from_uid,
            calling_package: root.launched_from_package.clone(),
            task_type: root.activity_type,
            persistable: root.is_persistable(),
            max_recents: default_max_recents(),
            num_fullscreen: 0,
            reuse_task: false,
            resize_mode: ResizeMode::default(),
            supports_picture_in_picture: false,
            lock_task_mode: LockTaskLaunchMode::default(),
            lock_task_auth: LockTaskAuth::default(),
            privileged: false,
            min_width: None,
            min_height: None,
            temporarily_unresizable: false,
            bounds: None,
            last_non_fullscreen_bounds: None,
            override_configuration: Configuration::default(),
            affiliated_task_id: id,
            affiliated_task_color: 0,
            prev_affiliate: None,
            next_affiliate: None,
            stack: None,
            first_active_time: Some(now),
            last_active_time: now,
            has_been_visible: false,
            in_recents: true,
            last_task_description: TaskDescription::default(),
            task_to_return_to: ActivityType::Home,
        };
        task.set_intent(root, policy);
        task.set_min_dimensions(&root.info);
        task
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn user_id(&self) -> u32 {
        self.user_id
    }

    /// Entries from root (index 0) to top.
    pub fn activities(&self) -> &[ActivityEntry] {
        &self.activities
    }

    pub fn activity(&self, id: ActivityId) -> Option<&ActivityEntry> {
        self.activities.iter().find(|entry| entry.id() == id)
    }

    pub(crate) fn activity_mut(&mut self, id: ActivityId) -> Option<&mut ActivityEntry> {
        self.activities.iter_mut().find(|entry| entry.id() == id)
    }

    pub fn index_of(&self, id: ActivityId) -> Option<usize> {
        self.activities.iter().position(|entry| entry.id() == id)
    }

    pub fn is_empty(&self) -> bool {
        self.activities.is_empty()
    }

    pub fn len(&self) -> usize {
        self.activities.len()
    }

    pub fn intent(&self) -> Option<&Intent> {
        self.intent.as_ref()
    }

    pub fn real_activity(&self) -> Option<&ComponentName> {
        self.real_activity.as_ref()
    }

    pub fn orig_activity(&self) -> Option<&ComponentName> {
        self.orig_activity.as_ref()
    }

    pub fn affinity(&self) -> Option<&str> {
        self.affinity.as_deref()
    }

    pub fn root_affinity(&self) -> Option<&str> {
        self.root_affinity.as_deref()
    }

    pub fn root_was_reset(&self) -> bool {
        self.root_was_reset
    }

    pub fn effective_uid(&self) -> u32 {
        self.effective_uid
    }

    pub fn calling_uid(&self) -> u32 {
        self.calling_uid
    }

    pub fn calling_package(&self) -> Option<&str> {
        self.calling_package.as_deref()
    }

    pub fn task_type(&self) -> ActivityType {
        self.task_type
    }

    pub fn is_persistable(&self) -> bool {
        self.persistable
    }

    pub fn max_recents(&self) -> u32 {
        self.max_recents
    }

    /// Number of fullscreen entries currently in the task.
    pub fn num_fullscreen(&self) -> usize {
        self.num_fullscreen
    }

    /// True while the task is being cleared so it can be relaunched into.
    pub fn is_clearing_to_reuse(&self) -> bool {
        self.reuse_task
    }

    pub fn resize_mode(&self) -> ResizeMode {
        self.resize_mode
    }

    pub fn supports_picture_in_picture(&self) -> bool {
        self.supports_picture_in_picture
    }

    pub fn lock_task_mode(&self) -> LockTaskLaunchMode {
        self.lock_task_mode
    }

    pub fn lock_task_auth(&self) -> LockTaskAuth {
        self.lock_task_auth
    }

    pub fn min_dimensions(&self) -> (Option<i32>, Option<i32>) {
        (self.min_width, self.min_height)
    }

    /// `None` means fullscreen.
    pub fn bounds(&self) -> Option<Rect> {
        self.bounds
    }

    pub fn is_fullscreen(&self) -> bool {
        self.bounds.is_none()
    }

    pub fn last_non_fullscreen_bounds(&self) -> Option<Rect> {
        self.last_non_fullscreen_bounds
    }

    pub fn affiliated_task_id(&self) -> TaskId {
        self.affiliated_task_id
    }

    pub fn affiliated_task_color(&self) -> u32 {
        self.affiliated_task_color
    }

    pub fn prev_affiliate(&self) -> Option<TaskId> {
        self.prev_affiliate
    }

    pub fn next_affiliate(&self) -> Option<TaskId> {
        self.next_affiliate
    }

    /// Stack currently hosting the task, `None` when detached.
    pub fn stack(&self) -> Option<StackId> {
        self.stack
    }

    pub fn first_active_time(&self) -> Option<DateTime<Utc>> {
        self.first_active_time
    }

    pub fn last_active_time(&self) -> DateTime<Utc> {
        self.last_active_time
    }

    pub fn has_been_visible(&self) -> bool {
        self.has_been_visible
    }

    pub fn in_recents(&self) -> bool {
        self.in_recents
    }

    pub fn last_task_description(&self) -> &TaskDescription {
        &self.last_task_description
    }

    pub fn task_to_return_to(&self) -> ActivityType {
        self.task_to_return_to
    }

    // =========================================================================
    // Crate-internal setters (registry and affiliation bookkeeping)
    // =========================================================================

    pub(crate) fn set_stack(&mut self, stack: Option<StackId>) {
        self.stack = stack;
    }

    pub(crate) fn set_reuse_task(&mut self, reuse: bool) {
        self.reuse_task = reuse;
    }

    pub(crate) fn set_prev_affiliate(&mut self, prev: Option<TaskId>) {
        self.prev_affiliate = prev;
    }

    pub(crate) fn set_next_affiliate(&mut self, next: Option<TaskId>) {
        self.next_affiliate = next;
    }

    pub(crate) fn set_affiliation(&mut self, affiliated_task_id: TaskId, color: u32) {
        self.affiliated_task_id = affiliated_task_id;
        self.affiliated_task_color = color;
    }

    pub(crate) fn set_in_recents(&mut self, in_recents: bool) {
        self.in_recents = in_recents;
    }

    pub(crate) fn set_has_been_visible(&mut self) {
        self.has_been_visible = true;
    }

    pub fn set_temporarily_unresizable(&mut self, unresizable: bool) {
        self.temporarily_unresizable = unresizable;
    }

    pub fn set_task_to_return_to(&mut self, kind: ActivityType) {
        self.task_to_return_to = match kind {
            ActivityType::Recents => ActivityType::Home,
            other => other,
        };
    }

    /// Re-establish state that is not persisted after loading from a snapshot.
    pub(crate) fn restore_fixup(&mut self) {
        let id = self.id;
        self.stack = None;
        self.reuse_task = false;
        self.num_fullscreen = 0;
        for entry in &mut self.activities {
            entry.set_task(Some(id));
            if entry.fullscreen {
                self.num_fullscreen += 1;
            }
        }
    }

    // =========================================================================
    // Activity list mutators
    // =========================================================================

    pub fn add_activity_to_top(
        &mut self,
        entry: ActivityEntry,
        policy: &TaskPolicy<'_>,
    ) -> Result<usize> {
        let index = self.activities.len();
        self.add_activity_at_index(index, entry, policy)
    }

    pub fn add_activity_at_bottom(
        &mut self,
        entry: ActivityEntry,
        policy: &TaskPolicy<'_>,
    ) -> Result<usize> {
        self.add_activity_at_index(0, entry, policy)
    }

    /// Insert `entry` at `index`, returning the index it landed at.
    ///
    /// The entry must be detached or already owned by this task. Appending
    /// onto a task whose top entry is a task overlay places the entry just
    /// below the overlay.
    pub fn add_activity_at_index(
        &mut self,
        index: usize,
        mut entry: ActivityEntry,
        policy: &TaskPolicy<'_>,
    ) -> Result<usize> {
        if let Some(owner) = entry.task() {
            if owner != self.id {
                return Err(Error::OwnershipConflict {
                    activity: entry.id(),
                    owner,
                    target: self.id,
                });
            }
        }
        entry.set_task(Some(self.id));

        // Only count it when it was not already part of this task.
        let already_present = match self.index_of(entry.id()) {
            Some(existing) => {
                self.activities.remove(existing);
                true
            }
            None => false,
        };
        if !already_present && entry.fullscreen {
            self.num_fullscreen += 1;
        }

        if self.activities.is_empty() {
            self.task_type = entry.activity_type;
            self.persistable = entry.is_persistable();
            self.calling_uid = entry.launched_from_uid;
            self.calling_package = entry.launched_from_package.clone();
            self.max_recents = entry
                .info
                .max_recents
                .clamp(1, policy.registry.max_recents_limit.max(1));
        } else {
            entry.activity_type = self.task_type;
        }

        let size = self.activities.len();
        let mut index = index;
        if index == size && size > 0 && self.activities[size - 1].task_overlay {
            index -= 1;
        }
        let index = index.min(size);

        debug!(task = %self.id, activity = %entry.id(), index, "adding activity");
        self.activities.insert(index, entry);
        self.update_effective_intent(policy);
        Ok(index)
    }

    /// Detach the entry `id` from this task.
    pub fn remove_activity(
        &mut self,
        id: ActivityId,
        reparenting: bool,
        policy: &TaskPolicy<'_>,
    ) -> Result<RemovedActivity> {
        let position = self.index_of(id).ok_or(Error::ActivityNotFound {
            task: self.id,
            activity: id,
        })?;

        let mut entry = self.activities.remove(position);
        entry.set_task(None);
        if entry.fullscreen {
            self.num_fullscreen = self.num_fullscreen.saturating_sub(1);
        }
        debug!(task = %self.id, activity = %id, reparenting, "removed activity");

        let task_emptied = self.activities.is_empty();
        if !task_emptied {
            self.update_effective_intent(policy);
        }
        Ok(RemovedActivity {
            entry,
            task_emptied,
            should_destroy: task_emptied && !self.reuse_task,
        })
    }

    /// Move `id` to the top of the back-stack.
    pub fn move_activity_to_front(&mut self, id: ActivityId, policy: &TaskPolicy<'_>) -> Result<()> {
        let position = self.index_of(id).ok_or(Error::ActivityNotFound {
            task: self.id,
            activity: id,
        })?;
        let entry = self.activities.remove(position);
        self.activities.push(entry);
        self.update_effective_intent(policy);
        self.set_front_of_task();
        Ok(())
    }

    /// Mark the lowest non-finishing entry as the front of the task.
    pub fn set_front_of_task(&mut self) {
        let mut found_front = false;
        for entry in &mut self.activities {
            if found_front || entry.finishing {
                entry.front_of_task = false;
            } else {
                entry.front_of_task = true;
                found_front = true;
            }
        }
        if !found_front {
            // Everything is finishing; the root still has to be the front.
            if let Some(root) = self.activities.first_mut() {
                root.front_of_task = true;
            }
        }
    }

    /// Replace an entry's launch info and re-derive the task identity.
    pub fn update_activity_info(
        &mut self,
        id: ActivityId,
        info: ActivityInfo,
        policy: &TaskPolicy<'_>,
    ) -> Result<()> {
        let task = self.id;
        let entry = self
            .activity_mut(id)
            .ok_or(Error::ActivityNotFound { task, activity: id })?;
        entry.info = info;
        self.update_effective_intent(policy);
        Ok(())
    }

    // =========================================================================
    // Clearing
    // =========================================================================

    /// Clear-top: collapse the back-stack down to the topmost entry running
    /// the same activity as `new_entry`.
    ///
    /// Entries above the match are finished from the match upward. The match
    /// itself is finished too, and `reused` left empty, when it uses the
    /// standard launch mode and the launch neither asks for single-top nor
    /// targets an existing document.
    pub fn perform_clear_task_locked(
        &mut self,
        new_entry: &ActivityEntry,
        launch_flags: LaunchFlags,
    ) -> ClearOutcome {
        let target = new_entry.real_activity();
        let matched = self
            .activities
            .iter()
            .rposition(|entry| !entry.finishing && entry.real_activity() == target);
        let Some(matched) = matched else {
            return ClearOutcome::default();
        };

        let mut outcome = ClearOutcome::default();
        for index in matched + 1..self.activities.len() {
            let entry = &mut self.activities[index];
            if entry.finishing {
                continue;
            }
            let options = entry.take_options();
            entry.finishing = true;
            outcome.finished.push(entry.id());
            if let Some(options) = options {
                self.activities[matched].pending_options = Some(options);
            }
        }

        let found = &mut self.activities[matched];
        if found.info.launch_mode == LaunchMode::Multiple
            && !launch_flags.contains(LaunchFlags::SINGLE_TOP)
            && !launch_flags.is_document_launch_into_existing()
        {
            found.finishing = true;
            outcome.finished.push(found.id());
            debug!(task = %self.id, finished = outcome.finished.len(), "clear-top finished matching activity");
            return outcome;
        }

        outcome.reused = Some(found.id());
        debug!(task = %self.id, reused = %found.id(), "clear-top reusing activity");
        outcome
    }

    /// Finish every non-finishing entry from `index` to the top.
    pub fn perform_clear_task_at_index(&mut self, index: usize) -> ClearOutcome {
        let mut outcome = ClearOutcome::default();
        for entry in self.activities.iter_mut().skip(index) {
            if entry.finishing {
                continue;
            }
            entry.finishing = true;
            outcome.finished.push(entry.id());
        }
        outcome
    }

    /// Ids of entries marked finishing, top first.
    pub fn finishing_activities(&self) -> Vec<ActivityId> {
        self.activities
            .iter()
            .rev()
            .filter(|entry| entry.finishing)
            .map(|entry| entry.id())
            .collect()
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Topmost entry not being finished.
    pub fn top_running_activity(&self) -> Option<&ActivityEntry> {
        self.activities.iter().rev().find(|entry| !entry.finishing)
    }

    /// Topmost non-finishing entry running `component`.
    pub fn find_activity_in_history(&self, component: &ComponentName) -> Option<&ActivityEntry> {
        self.activities
            .iter()
            .rev()
            .find(|entry| !entry.finishing && entry.real_activity() == *component)
    }

    /// Whether every (optionally non-finishing) entry is a task overlay.
    /// False when there are no such entries at all.
    pub fn only_has_task_overlay_activities(&self, exclude_finishing: bool) -> bool {
        let mut count = 0;
        for entry in self.activities.iter().rev() {
            if exclude_finishing && entry.finishing {
                continue;
            }
            if !entry.task_overlay {
                return false;
            }
            count += 1;
        }
        count > 0
    }

    /// Remove automatically when asked to, or when empty and never shown.
    pub fn auto_remove_from_recents(&self) -> bool {
        self.auto_remove_recents || (self.activities.is_empty() && !self.has_been_visible)
    }

    pub fn is_visible(&self) -> bool {
        self.activities.iter().any(|entry| entry.visible)
    }

    pub fn touch_active_time(&mut self) {
        let now = Utc::now();
        self.last_active_time = now;
        if self.first_active_time.is_none() {
            self.first_active_time = Some(now);
        }
    }

    pub fn inactive_duration(&self) -> Duration {
        Utc::now() - self.last_active_time
    }

    pub fn is_home_task(&self) -> bool {
        self.task_type == ActivityType::Home
    }

    pub fn is_recents_task(&self) -> bool {
        self.task_type == ActivityType::Recents
    }

    pub fn is_assistant_task(&self) -> bool {
        self.task_type == ActivityType::Assistant
    }

    pub fn is_application_task(&self) -> bool {
        self.task_type == ActivityType::Application
    }

    pub fn is_resizeable(&self, registry: &RegistryConfig, check_supports_pip: bool) -> bool {
        (registry.force_resizable_activities
            || self.resize_mode.is_resizeable()
            || (check_supports_pip && self.supports_picture_in_picture))
            && !self.temporarily_unresizable
    }

    /// A PiP-only task is resizeable but still cannot be docked.
    pub fn supports_split_screen(&self, registry: &RegistryConfig) -> bool {
        registry.supports_split_screen
            && (registry.force_resizable_activities
                || (self.is_resizeable(registry, false)
                    && !self.resize_mode.is_preserve_orientation()))
    }

    /// Whether `bounds` respects the orientation constraints of the resize
    /// mode. Only freeform stacks honour requested bounds, so every other
    /// stack accepts anything.
    pub fn can_resize_to_bounds(&self, bounds: Option<&Rect>, stack_kind: StackKind) -> bool {
        let Some(bounds) = bounds else {
            return true;
        };
        if stack_kind != StackKind::Freeform {
            return true;
        }
        let landscape = bounds.is_landscape();
        match self.resize_mode {
            ResizeMode::ForceResizablePreserveOrientation => self
                .bounds
                .map_or(true, |current| current.is_landscape() == landscape),
            ResizeMode::ForceResizablePortrait => !landscape,
            ResizeMode::ForceResizableLandscape => landscape,
            _ => true,
        }
    }

    /// The kind of stack this task should launch into, ignoring focus.
    pub fn launch_stack_kind(&self) -> StackKind {
        match self.task_type {
            ActivityType::Recents => StackKind::Recents,
            ActivityType::Home => StackKind::Home,
            ActivityType::Assistant => StackKind::Assistant,
            ActivityType::Application if self.bounds.is_some() => StackKind::Freeform,
            ActivityType::Application => StackKind::Fullscreen,
        }
    }

    /// Bounds this task should use when launched into `stack`.
    pub fn launch_bounds(&self, stack: Option<&Stack>, registry: &RegistryConfig) -> Option<Rect> {
        let stack = stack?;
        match stack.kind() {
            StackKind::Home | StackKind::Recents | StackKind::Assistant | StackKind::Fullscreen => {
                if self.is_resizeable(registry, true) {
                    stack.bounds()
                } else {
                    None
                }
            }
            StackKind::Docked if !self.is_resizeable(registry, true) => None,
            kind if !kind.persists_task_bounds() => stack.bounds(),
            _ => self.last_non_fullscreen_bounds,
        }
    }

    // =========================================================================
    // Identity derivation
    // =========================================================================

    /// Index of the entry that defines the task's outward identity.
    ///
    /// Walks up from the root skipping finishing entries and stops at the
    /// first one that does not relinquish identity to the entries above it.
    pub fn find_effective_root_index(&self) -> usize {
        let mut effective = 0;
        for (index, entry) in self.activities.iter().enumerate() {
            if entry.finishing {
                continue;
            }
            effective = index;
            if !entry.info.relinquish_task_identity {
                break;
            }
        }
        effective
    }

    pub fn update_effective_intent(&mut self, policy: &TaskPolicy<'_>) {
        if self.activities.is_empty() {
            return;
        }
        let index = self.find_effective_root_index();
        let entry = self.activities[index].clone();
        self.set_intent(&entry, policy);
    }

    /// Derive identity and launch policy from `entry`.
    ///
    /// The first call decides whether the task ever relinquishes identity;
    /// when it does not, later calls keep the original identity.
    pub fn set_intent(&mut self, entry: &ActivityEntry, policy: &TaskPolicy<'_>) {
        self.calling_uid = entry.launched_from_uid;
        self.calling_package = entry.launched_from_package.clone();
        self.set_intent_from_info(&entry.intent, &entry.info, policy);
    }

    fn set_intent_from_info(&mut self, intent: &Intent, info: &ActivityInfo, policy: &TaskPolicy<'_>) {
        let first = self.intent.is_none();
        if first {
            self.never_relinquish_identity = !info.relinquish_task_identity;
        } else if self.never_relinquish_identity {
            return;
        }

        self.affinity = info.task_affinity.clone();
        if first {
            // The initially set value sticks, even when it is None.
            self.root_affinity = self.affinity.clone();
        }
        self.effective_uid = info.uid;

        match &info.target_activity {
            None => {
                self.intent = Some(intent.clone());
                self.real_activity = Some(intent.component.clone());
                self.orig_activity = None;
            }
            Some(_) => {
                let target = info.real_component();
                self.intent = Some(Intent {
                    component: target.clone(),
                    flags: intent.flags,
                });
                self.real_activity = Some(target);
                self.orig_activity = Some(intent.component.clone());
            }
        }

        let flags = intent.flags;
        if flags.contains(LaunchFlags::RESET_TASK_IF_NEEDED) {
            self.root_was_reset = true;
        }
        self.user_id = info.uid / PER_USER_RANGE;

        self.auto_remove_recents = if info.auto_remove_from_recents {
            true
        } else if flags.contains(LaunchFlags::NEW_DOCUMENT)
            && !flags.contains(LaunchFlags::RETAIN_IN_RECENTS)
        {
            // Not retained by the caller: auto-remove unless the target
            // declares its own document launch mode.
            info.document_launch_mode == DocumentLaunchMode::None
        } else {
            false
        };

        self.resize_mode = info.resize_mode;
        self.supports_picture_in_picture = info.supports_picture_in_picture;
        self.lock_task_mode = info.lock_task_launch_mode;
        self.privileged = info.privileged;
        self.set_lock_task_auth(policy.lock_task);
    }

    fn set_min_dimensions(&mut self, info: &ActivityInfo) {
        self.min_width = info.min_width;
        self.min_height = info.min_height;
    }

    /// Recompute `lock_task_auth` from the requested mode and the whitelist.
    pub fn set_lock_task_auth(&mut self, lock_task: &LockTaskConfig) {
        if !self.privileged
            && matches!(
                self.lock_task_mode,
                LockTaskLaunchMode::Always | LockTaskLaunchMode::Never
            )
        {
            // Only privileged apps may pick always/never.
            self.lock_task_mode = LockTaskLaunchMode::Default;
        }
        let whitelisted = self.is_lock_task_whitelisted(lock_task);
        self.lock_task_auth = match self.lock_task_mode {
            LockTaskLaunchMode::Default if whitelisted => LockTaskAuth::Whitelisted,
            LockTaskLaunchMode::Default => LockTaskAuth::Pinnable,
            LockTaskLaunchMode::Never => LockTaskAuth::DontLock,
            LockTaskLaunchMode::Always => LockTaskAuth::LaunchablePriv,
            LockTaskLaunchMode::IfWhitelisted if whitelisted => LockTaskAuth::Launchable,
            LockTaskLaunchMode::IfWhitelisted => LockTaskAuth::Pinnable,
        };
        debug!(task = %self.id, auth = %self.lock_task_auth, "lock task auth");
    }

    pub fn is_lock_task_whitelisted(&self, lock_task: &LockTaskConfig) -> bool {
        self.real_activity
            .as_ref()
            .is_some_and(|component| lock_task.is_whitelisted(self.user_id, &component.package))
    }

    /// Refresh the recents presentation from the entries' descriptions.
    ///
    /// Looks below the first break between the main entries and utility
    /// entries (a relinquishing root followed by a non-relinquishing entry,
    /// or an entry launched to be cleared on task reset). The chain colour
    /// follows the primary colour when this task heads its chain.
    pub fn update_task_description(&mut self) {
        let count = self.activities.len();
        let relinquish = count != 0 && self.activities[0].info.relinquish_task_identity;
        let mut index = count.min(1);
        while index < count {
            let entry = &self.activities[index];
            if relinquish && !entry.info.relinquish_task_identity {
                index += 1;
                break;
            }
            if entry.intent.flags.contains(LaunchFlags::CLEAR_WHEN_TASK_RESET) {
                break;
            }
            index += 1;
        }
        if index == 0 {
            return;
        }

        let mut description = TaskDescription::default();
        let mut top = true;
        for entry in self.activities[..index].iter().rev() {
            if let Some(source) = &entry.task_description {
                if description.label.is_none() {
                    description.label = source.label.clone();
                }
                if description.icon_filename.is_none() {
                    description.icon_filename = source.icon_filename.clone();
                }
                if description.primary_color == 0 {
                    description.primary_color = source.primary_color;
                }
                if top {
                    description.background_color = source.background_color;
                }
            }
            top = false;
        }

        if self.id == self.affiliated_task_id {
            self.affiliated_task_color = description.primary_color;
        }
        self.last_task_description = description;
    }

    // =========================================================================
    // Bounds and configuration
    // =========================================================================

    /// Empty bounds make no sense for a task; treat them as fullscreen.
    pub fn validate_bounds(&self, bounds: Option<Rect>) -> Option<Rect> {
        match bounds {
            Some(rect) if rect.is_empty() => {
                warn!(task = %self.id, bounds = %rect, "received strange task bounds");
                None
            }
            other => other,
        }
    }

    /// Apply the task's minimum size to `bounds`.
    ///
    /// Pinned stacks are system-controlled, so only an explicit minimum
    /// applies there.
    pub fn adjust_for_minimal_task_dimensions(
        &self,
        bounds: &Rect,
        stack: Option<&Stack>,
        resolver: &ConfigurationResolver,
    ) -> Rect {
        let use_default = stack.map_or(true, |stack| stack.kind() != StackKind::Pinned);
        resolver.adjust_for_minimal_dimensions(
            bounds,
            self.bounds.as_ref(),
            self.min_width,
            self.min_height,
            use_default,
        )
    }

    /// Set new bounds (None for fullscreen) and recompute the override
    /// configuration against `stack`'s configuration.
    pub fn update_override_configuration(
        &mut self,
        bounds: Option<Rect>,
        inset_bounds: Option<Rect>,
        stack: Option<&Stack>,
        resolver: &ConfigurationResolver,
    ) -> ConfigUpdate {
        if self.bounds == bounds {
            return ConfigUpdate::default();
        }
        let old_config = self.override_configuration;
        let old_fullscreen = self.bounds.is_none();

        match bounds {
            None => {
                if let Some(previous) = self.bounds {
                    if stack.is_some_and(|stack| stack.kind().persists_task_bounds()) {
                        self.last_non_fullscreen_bounds = Some(previous);
                    }
                }
                self.bounds = None;
                self.on_override_configuration_changed(Configuration::default());
            }
            Some(requested) => {
                let adjusted = self.adjust_for_minimal_task_dimensions(&requested, stack, resolver);
                self.bounds = Some(adjusted);
                if stack.map_or(true, |stack| stack.kind().persists_task_bounds()) {
                    self.last_non_fullscreen_bounds = Some(adjusted);
                }
                let parent = match stack {
                    Some(stack) => *stack.configuration(),
                    None => resolver.display_configuration(),
                };
                let config = resolver.compute_override_configuration(
                    &adjusted,
                    inset_bounds.as_ref(),
                    &parent,
                    adjusted.right != requested.right,
                    adjusted.bottom != requested.bottom,
                );
                self.on_override_configuration_changed(config);
            }
        }

        ConfigUpdate {
            changed: old_config != self.override_configuration,
            fullscreen_changed: old_fullscreen != self.bounds.is_none(),
        }
    }
}

impl ConfigurationHolder for Task {
    fn override_configuration(&self) -> &Configuration {
        &self.override_configuration
    }

    fn on_override_configuration_changed(&mut self, config: Configuration) {
        self.override_configuration = config;
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Task{{{} U={}", self.id, self.user_id)?;
        if let Some(affinity) = &self.affinity {
            write!(f, " A={affinity}")?;
        } else if let Some(component) = &self.real_activity {
            write!(f, " C={component}")?;
        }
        write!(f, " n={}}}", self.activities.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    struct Env {
        config: Config,
        resolver: ConfigurationResolver,
    }

    impl Env {
        fn new() -> Self {
            let config = Config::default();
            let resolver = ConfigurationResolver::from_config(&config);
            Self { config, resolver }
        }

        fn policy(&self) -> TaskPolicy<'_> {
            TaskPolicy {
                registry: &self.config.registry,
                lock_task: &self.config.lock_task,
                resolver: &self.resolver,
            }
        }
    }

    fn entry(id: u64, class: &str) -> ActivityEntry {
        let info = ActivityInfo::new(ComponentName::new("com.example", class));
        ActivityEntry::for_info(ActivityId::new(id), info)
    }

    fn task_with(env: &Env, entries: Vec<ActivityEntry>) -> Task {
        let policy = env.policy();
        let mut task = Task::new(TaskId::new(1), &entries[0], &policy);
        for entry in entries {
            task.add_activity_to_top(entry, &policy).expect("add");
        }
        task
    }

    #[test]
    fn first_entry_seeds_type_and_later_entries_are_coerced() {
        let env = Env::new();
        let policy = env.policy();
        let mut root = entry(1, "com.example.Home");
        root.activity_type = ActivityType::Home;
        let mut task = Task::new(TaskId::new(3), &root, &policy);
        task.add_activity_to_top(root, &policy).expect("add root");

        let child = entry(2, "com.example.Child");
        task.add_activity_to_top(child, &policy).expect("add child");

        assert_eq!(task.task_type(), ActivityType::Home);
        assert_eq!(task.activities()[1].activity_type, ActivityType::Home);
    }

    #[test]
    fn bounds_update_sets_then_clears_the_override() {
        let env = Env::new();
        let mut task = task_with(&env, vec![entry(1, "com.example.A")]);
        let display = env.resolver.display_configuration();

        let bounds = Some(Rect::new(0, 0, 1080, 960));
        let update = task.update_override_configuration(bounds, None, None, &env.resolver);
        assert!(update.changed);
        assert!(update.fullscreen_changed);
        assert_eq!(task.override_configuration().screen_height_dp, 365);
        assert_eq!(task.merged_configuration(&display).screen_height_dp, 365);

        let update = task.update_override_configuration(None, None, None, &env.resolver);
        assert!(update.changed);
        assert!(task.override_configuration().is_unset());
        assert_eq!(task.merged_configuration(&display), display);
    }

    #[test]
    fn add_rejects_entry_owned_elsewhere() {
        let env = Env::new();
        let policy = env.policy();
        let mut other = task_with(&env, vec![entry(1, "com.example.A")]);
        let removed = other
            .remove_activity(ActivityId::new(1), false, &policy)
            .expect("remove");
        let mut stolen = removed.entry;
        stolen.set_task(Some(TaskId::new(99)));

        let err = other
            .add_activity_to_top(stolen, &policy)
            .expect_err("ownership conflict");
        assert!(matches!(err, Error::OwnershipConflict { .. }));
    }

    #[test]
    fn append_lands_below_task_overlay() {
        let env = Env::new();
        let policy = env.policy();
        let mut overlay = entry(2, "com.example.Overlay");
        overlay.task_overlay = true;
        let mut task = task_with(&env, vec![entry(1, "com.example.A"), overlay]);

        let index = task
            .add_activity_to_top(entry(3, "com.example.B"), &policy)
            .expect("add");
        assert_eq!(index, 1);
        assert!(task.activities().last().expect("top").task_overlay);
    }

    #[test]
    fn removing_last_entry_signals_destroy_unless_reusing() {
        let env = Env::new();
        let policy = env.policy();
        let mut task = task_with(&env, vec![entry(1, "com.example.A")]);
        task.set_reuse_task(true);
        let removed = task
            .remove_activity(ActivityId::new(1), false, &policy)
            .expect("remove");
        assert!(removed.task_emptied);
        assert!(!removed.should_destroy);
        assert!(removed.entry.task().is_none());
    }

    #[test]
    fn effective_root_skips_relinquishing_and_finishing_entries() {
        let env = Env::new();
        let mut root = entry(1, "com.example.Root");
        root.info.relinquish_task_identity = true;
        let mut finishing = entry(2, "com.example.Gone");
        finishing.finishing = true;
        let child = entry(3, "com.example.Child");
        let task = task_with(&env, vec![root, finishing, child]);
        assert_eq!(task.find_effective_root_index(), 2);
    }

    #[test]
    fn relinquishing_root_hands_identity_to_child() {
        let env = Env::new();
        let mut root = entry(1, "com.example.Root");
        root.info.relinquish_task_identity = true;
        root.info.task_affinity = Some("root".to_string());
        let mut child = entry(2, "com.example.Child");
        child.info.task_affinity = Some("child".to_string());
        let task = task_with(&env, vec![root, child]);

        assert_eq!(task.affinity(), Some("child"));
        assert_eq!(task.root_affinity(), Some("root"));
        assert_eq!(
            task.real_activity(),
            Some(&ComponentName::new("com.example", "com.example.Child"))
        );
    }

    #[test]
    fn lock_task_auth_derivation() {
        let mut env = Env::new();
        env.config.lock_task.users.push(crate::config::LockTaskUser {
            user_id: 0,
            packages: vec!["com.example".to_string()],
        });
        let policy = env.policy();

        let mut info_entry = entry(1, "com.example.A");
        info_entry.info.lock_task_launch_mode = LockTaskLaunchMode::IfWhitelisted;
        let task = Task::new(TaskId::new(1), &info_entry, &policy);
        assert_eq!(task.lock_task_auth(), LockTaskAuth::Launchable);

        let mut never = entry(2, "com.example.B");
        never.info.lock_task_launch_mode = LockTaskLaunchMode::Never;
        let task = Task::new(TaskId::new(2), &never, &policy);
        // Not privileged, so `never` falls back to the default mode.
        assert_eq!(task.lock_task_mode(), LockTaskLaunchMode::Default);
        assert_eq!(task.lock_task_auth(), LockTaskAuth::Whitelisted);

        never.info.privileged = true;
        let task = Task::new(TaskId::new(3), &never, &policy);
        assert_eq!(task.lock_task_auth(), LockTaskAuth::DontLock);
    }

    #[test]
    fn new_document_without_retain_auto_removes() {
        let env = Env::new();
        let policy = env.policy();
        let mut doc = entry(1, "com.example.Doc");
        doc.intent = doc.intent.clone().with_flags(LaunchFlags::NEW_DOCUMENT);
        let task = Task::new(TaskId::new(1), &doc, &policy);
        assert!(task.auto_remove_recents);

        doc.intent = doc
            .intent
            .clone()
            .with_flags(LaunchFlags::NEW_DOCUMENT | LaunchFlags::RETAIN_IN_RECENTS);
        let task = Task::new(TaskId::new(2), &doc, &policy);
        assert!(!task.auto_remove_recents);
    }

    #[test]
    fn orientation_constraints_only_apply_in_freeform() {
        let env = Env::new();
        let mut portrait_only = entry(1, "com.example.A");
        portrait_only.info.resize_mode = ResizeMode::ForceResizablePortrait;
        let task = task_with(&env, vec![portrait_only]);

        let landscape = Rect::new(0, 0, 800, 400);
        assert!(!task.can_resize_to_bounds(Some(&landscape), StackKind::Freeform));
        assert!(task.can_resize_to_bounds(Some(&landscape), StackKind::Fullscreen));
        assert!(task.can_resize_to_bounds(None, StackKind::Freeform));
    }

    #[test]
    fn task_description_prefers_top_values_below_break() {
        let env = Env::new();
        let mut root = entry(1, "com.example.A");
        root.task_description = Some(TaskDescription {
            label: Some("Root".to_string()),
            icon_filename: None,
            primary_color: 0xff0000,
            background_color: 0x111111,
        });
        let mut child = entry(2, "com.example.B");
        child.task_description = Some(TaskDescription {
            label: Some("Child".to_string()),
            icon_filename: None,
            primary_color: 0,
            background_color: 0x222222,
        });
        let mut task = task_with(&env, vec![root, child]);
        task.update_task_description();

        let description = task.last_task_description();
        assert_eq!(description.label.as_deref(), Some("Child"));
        assert_eq!(description.primary_color, 0xff0000);
        assert_eq!(description.background_color, 0x222222);
        assert_eq!(task.affiliated_task_color(), 0xff0000);
    }

    #[test]
    fn empty_bounds_are_treated_as_fullscreen() {
        let env = Env::new();
        let task = task_with(&env, vec![entry(1, "com.example.A")]);
        assert_eq!(task.validate_bounds(Some(Rect::new(10, 10, 10, 50))), None);
    }
}
