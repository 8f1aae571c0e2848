//! The task registry: owner of every task and stack.
//!
//! [`TaskRegistry`] performs all mutations that cross object boundaries:
//! moving entries between tasks, clearing, reparenting a task to another
//! stack, resizing, affiliation and removal. Each public `&mut self` method
//! is one atomic step; collaborators (window controller, persister, event
//! subscribers) are called synchronously once the change is committed.
//!
//! [`SharedRegistry`] wraps a registry in a mutex for callers on more than
//! one thread.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::activity::{ActivityEntry, ActivityId, LaunchFlags, TaskDescription};
use crate::affiliation::{self, ChainRepair, TaskMap};
use crate::config::Config;
use crate::configuration::{ConfigurationHolder, ConfigurationResolver};
use crate::error::{Error, Result};
use crate::events::{Event, EventBus, EventKind, EventSubscriber};
use crate::geometry::Rect;
use crate::persist::{NoopPersister, RegistrySnapshot, TaskPersister};
use crate::stack::{RemoveMode, Stack, StackId, StackKind, StackPosition};
use crate::task::{ClearOutcome, Task, TaskId, TaskPolicy};
use crate::window::{NoopWindowController, WindowContainerController};

/// Who asked for a resize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResizeSource {
    #[default]
    User,
    System,
    /// Apply even when the bounds did not change.
    Forced,
}

impl ResizeSource {
    pub fn is_forced(&self) -> bool {
        matches!(self, ResizeSource::Forced)
    }
}

/// Stack focus handling for [`TaskRegistry::reparent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MoveStackMode {
    /// Bring the destination stack to the front.
    ToFront,
    /// Bring it to the front only if the task was focused or frontmost.
    #[default]
    KeepAtFront,
    /// Leave stack order alone.
    InPlace,
}

/// What a resize did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResizeOutcome {
    /// False when the request was ignored (task not resizeable).
    pub applied: bool,
    pub config_changed: bool,
    /// False when the running activity has to be relaunched to pick up the
    /// new configuration.
    pub windows_kept: bool,
    /// The task has no stack; only its own configuration was updated.
    pub deferred: bool,
}

impl ResizeOutcome {
    pub fn skipped() -> Self {
        Self {
            applied: false,
            config_changed: false,
            windows_kept: true,
            deferred: false,
        }
    }

    fn unchanged() -> Self {
        Self {
            applied: true,
            ..Self::skipped()
        }
    }
}

/// What a reparent did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReparentOutcome {
    /// Stack the task ended up in.
    pub destination: StackId,
    pub moved: bool,
    /// The destination is the stack that was asked for.
    pub preferred_honored: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resize: Option<ResizeOutcome>,
}

impl ReparentOutcome {
    pub fn succeeded(&self) -> bool {
        self.moved && self.preferred_honored
    }
}

fn policy<'a>(config: &'a Config, resolver: &'a ConfigurationResolver) -> TaskPolicy<'a> {
    TaskPolicy {
        registry: &config.registry,
        lock_task: &config.lock_task,
        resolver,
    }
}

/// The id `next` would hand out, or an error once the id space is used up.
fn peek_id(next: u64, kind: &str) -> Result<u32> {
    u32::try_from(next).map_err(|_| Error::InvalidArgument(format!("{kind} ids are exhausted")))
}

pub struct TaskRegistry {
    config: Config,
    resolver: ConfigurationResolver,
    tasks: TaskMap,
    stacks: BTreeMap<StackId, Stack>,
    /// Bottom to top.
    stack_order: Vec<StackId>,
    focused_stack: Option<StackId>,
    /// Wider than the ids so exhaustion is a value, not an overflow.
    next_task_id: u64,
    next_stack_id: u64,
    window: Box<dyn WindowContainerController>,
    persister: Box<dyn TaskPersister>,
    events: EventBus,
}

impl TaskRegistry {
    pub fn new(config: Config) -> Self {
        let resolver = ConfigurationResolver::from_config(&config);
        Self {
            config,
            resolver,
            tasks: TaskMap::new(),
            stacks: BTreeMap::new(),
            stack_order: Vec::new(),
            focused_stack: None,
            next_task_id: 1,
            next_stack_id: 1,
            window: Box::new(NoopWindowController),
            persister: Box::new(NoopPersister),
            events: EventBus::new(),
        }
    }

    pub fn with_window_controller(mut self, controller: Box<dyn WindowContainerController>) -> Self {
        self.window = controller;
        self
    }

    pub fn with_persister(mut self, persister: Box<dyn TaskPersister>) -> Self {
        self.persister = persister;
        self
    }

    pub fn subscribe(&mut self, subscriber: Box<dyn EventSubscriber>) {
        self.events.subscribe(subscriber);
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn resolver(&self) -> &ConfigurationResolver {
        &self.resolver
    }

    pub fn task(&self, id: TaskId) -> Option<&Task> {
        self.tasks.get(&id)
    }

    pub fn require_task(&self, id: TaskId) -> Result<&Task> {
        self.tasks.get(&id).ok_or(Error::TaskNotFound(id))
    }

    /// The task currently holding `activity`, whatever the entry itself claims.
    pub fn activity_owner(&self, activity: ActivityId) -> Option<TaskId> {
        self.tasks
            .values()
            .find(|task| task.activity(activity).is_some())
            .map(Task::id)
    }

    /// Tasks in id order.
    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.values()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn stack(&self, id: StackId) -> Option<&Stack> {
        self.stacks.get(&id)
    }

    /// Stacks bottom to top.
    pub fn stacks(&self) -> impl Iterator<Item = &Stack> {
        self.stack_order.iter().filter_map(|id| self.stacks.get(id))
    }

    pub fn focused_stack(&self) -> Option<StackId> {
        self.focused_stack
    }

    pub fn front_stack(&self) -> Option<StackId> {
        self.stack_order.last().copied()
    }

    /// Lowest stack of `kind`.
    pub fn stack_of_kind(&self, kind: StackKind) -> Option<StackId> {
        self.stacks().find(|stack| stack.kind() == kind).map(Stack::id)
    }

    // =========================================================================
    // Stacks
    // =========================================================================

    /// Create a stack on top of all others. The first stack gets focus.
    pub fn create_stack(&mut self, kind: StackKind, bounds: Option<Rect>) -> Result<StackId> {
        let id = StackId::new(peek_id(self.next_stack_id, "stack")?);
        self.next_stack_id += 1;
        let bounds = bounds.filter(|rect| !rect.is_empty());
        self.stacks.insert(id, Stack::new(id, kind, bounds, &self.resolver));
        self.stack_order.push(id);
        if self.focused_stack.is_none() {
            self.focused_stack = Some(id);
        }
        debug!(stack = %id, %kind, "created stack");
        Ok(id)
    }

    /// Raise `stack` to the top of the z-order and focus it.
    pub fn move_stack_to_front(&mut self, stack: StackId) -> Result<()> {
        if !self.stacks.contains_key(&stack) {
            return Err(Error::StackNotFound(stack));
        }
        self.stack_order.retain(|id| *id != stack);
        self.stack_order.push(stack);
        self.focused_stack = Some(stack);
        Ok(())
    }

    // =========================================================================
    // Task lifecycle
    // =========================================================================

    /// Create a task rooted at `root`, optionally attached to `stack`.
    pub fn create_task(
        &mut self,
        root: ActivityEntry,
        stack: Option<StackId>,
        position: StackPosition,
    ) -> Result<TaskId> {
        let id = TaskId::new(peek_id(self.next_task_id, "task")?);
        if let Some(owner) = root.task().or_else(|| self.activity_owner(root.id())) {
            return Err(Error::OwnershipConflict {
                activity: root.id(),
                owner,
                target: id,
            });
        }
        if let Some(stack) = stack {
            if !self.stacks.contains_key(&stack) {
                return Err(Error::StackNotFound(stack));
            }
        }

        self.next_task_id += 1;
        let policy = policy(&self.config, &self.resolver);
        self.tasks.insert(id, Task::new(id, &root, &policy));
        if let Some(stack) = stack {
            if let Err(err) = self.attach_task(id, stack, position) {
                self.tasks.remove(&id);
                return Err(err);
            }
        }

        self.persister.notify_task_created(id);
        self.events.dispatch(Event::new(EventKind::TaskCreated, id).with_value(json!({
            "stack": stack.map(StackId::get),
            "root": root.id().get(),
        })));
        info!(task = %id, root = %root, "created task");
        self.add_activity_to_top(id, root)?;
        Ok(id)
    }

    /// Put a detached task (new or restored) into `stack`.
    pub fn attach_task(&mut self, id: TaskId, stack_id: StackId, position: StackPosition) -> Result<()> {
        let task = self.tasks.get(&id).ok_or(Error::TaskNotFound(id))?;
        if let Some(current) = task.stack() {
            return Err(Error::InvalidArgument(format!(
                "task {id} is already in stack {current}; reparent it instead"
            )));
        }
        let stack = self.stacks.get(&stack_id).ok_or(Error::StackNotFound(stack_id))?;
        let bounds = self.bounds_for_stack(task, stack)?;

        let Some(stack) = self.stacks.get_mut(&stack_id) else {
            return Err(Error::StackNotFound(stack_id));
        };
        let index = stack.add(id, stack.adjusted_position(position));
        let Some(task) = self.tasks.get_mut(&id) else {
            return Err(Error::TaskNotFound(id));
        };
        task.set_stack(Some(stack_id));
        self.window.reparent(id, stack_id, index, false);

        if let Some(bounds) = bounds {
            let update = task.update_override_configuration(
                bounds,
                None,
                self.stacks.get(&stack_id),
                &self.resolver,
            );
            if update.changed {
                self.window
                    .resize(id, task.bounds(), task.override_configuration(), true, false);
            }
        }
        debug!(task = %id, stack = %stack_id, index, "attached task");
        Ok(())
    }

    /// Bounds a task should take when it joins `stack`; `None` keeps the
    /// current bounds.
    fn bounds_for_stack(&self, task: &Task, stack: &Stack) -> Result<Option<Option<Rect>>> {
        if stack.kind() != StackKind::Freeform {
            return Ok(Some(stack.bounds()));
        }
        if !task.is_resizeable(&self.config.registry, true) {
            return Err(Error::InvalidArgument(format!(
                "task {} is not resizeable and cannot join freeform stack {}",
                task.id(),
                stack.id()
            )));
        }
        if task.bounds().is_some() {
            return Ok(None);
        }
        Ok(Some(
            task.last_non_fullscreen_bounds()
                .or_else(|| self.layout_bounds(stack)),
        ))
    }

    fn layout_bounds(&self, stack: &Stack) -> Option<Rect> {
        let occupied: Vec<Rect> = stack
            .tasks()
            .iter()
            .filter_map(|id| self.tasks.get(id).and_then(Task::bounds))
            .collect();
        let area = stack.bounds().or(Some(self.resolver.display_bounds()));
        stack.layout_policy().layout(area, &occupied)
    }

    /// Remove a task completely: chain, stack, thumbnail and record.
    pub fn remove_task(&mut self, id: TaskId) -> Result<Task> {
        if !self.tasks.contains_key(&id) {
            return Err(Error::TaskNotFound(id));
        }
        affiliation::close_recents_chain(&mut self.tasks, id);
        let Some(mut task) = self.tasks.remove(&id) else {
            return Err(Error::TaskNotFound(id));
        };
        if let Some(stack_id) = task.stack() {
            if let Some(stack) = self.stacks.get_mut(&stack_id) {
                stack.remove(id, RemoveMode::Destroying);
            }
            task.set_stack(None);
        }
        if let Err(err) = self.persister.remove_image(id) {
            warn!(task = %id, error = %err, "failed to remove task thumbnail");
        }
        self.persister.notify_task_removed(id);
        self.events.dispatch(Event::new(EventKind::TaskRemoved, id));
        info!(task = %id, "removed task");
        Ok(task)
    }

    /// Take a task out of recents; it stays in the registry.
    pub fn remove_from_recents(&mut self, id: TaskId) -> Result<()> {
        if !self.tasks.contains_key(&id) {
            return Err(Error::TaskNotFound(id));
        }
        affiliation::close_recents_chain(&mut self.tasks, id);
        if let Some(task) = self.tasks.get_mut(&id) {
            task.set_in_recents(false);
        }
        self.persister.notify_task_changed(id, false);
        if let Err(err) = self.persister.remove_image(id) {
            warn!(task = %id, error = %err, "failed to remove task thumbnail");
        }
        self.events
            .dispatch(Event::new(EventKind::TaskRemovedFromRecents, id));
        Ok(())
    }

    /// Detach an emptied task and drop it if it should leave recents.
    fn handle_task_emptied(&mut self, id: TaskId) -> Result<()> {
        let Some(task) = self.tasks.get_mut(&id) else {
            return Ok(());
        };
        if let Some(stack_id) = task.stack() {
            if let Some(stack) = self.stacks.get_mut(&stack_id) {
                stack.remove(id, RemoveMode::Destroying);
            }
            task.set_stack(None);
        }
        if task.auto_remove_from_recents() {
            self.remove_task(id)?;
        } else {
            debug!(task = %id, "emptied task kept in recents");
            self.persister.notify_task_changed(id, false);
        }
        Ok(())
    }

    // =========================================================================
    // Activities
    // =========================================================================

    pub fn add_activity_to_top(&mut self, task: TaskId, entry: ActivityEntry) -> Result<usize> {
        let index = self.require_task(task)?.len();
        self.add_activity(task, entry, index)
    }

    /// Insert `entry` into `task` at `index`; returns the index used.
    pub fn add_activity(&mut self, task_id: TaskId, entry: ActivityEntry, index: usize) -> Result<usize> {
        let policy = policy(&self.config, &self.resolver);
        if !self.tasks.contains_key(&task_id) {
            return Err(Error::TaskNotFound(task_id));
        }
        let activity = entry.id();
        if let Some(owner) = self.activity_owner(activity).filter(|owner| *owner != task_id) {
            return Err(Error::OwnershipConflict {
                activity,
                owner,
                target: task_id,
            });
        }
        let task = self.tasks.get_mut(&task_id).ok_or(Error::TaskNotFound(task_id))?;
        let persistable = entry.is_persistable();
        let index = task.add_activity_at_index(index, entry, &policy)?;

        if persistable {
            self.persister.notify_task_changed(task_id, false);
        }

        // Detached tasks keep their bounds until they have a stack again.
        if let Some(stack_id) = task.stack() {
            let stack = self.stacks.get(&stack_id);
            let bounds = task.validate_bounds(task.launch_bounds(stack, &self.config.registry));
            let update = task.update_override_configuration(bounds, None, stack, &self.resolver);
            if update.changed {
                self.window
                    .resize(task_id, task.bounds(), task.override_configuration(), true, false);
            }
            if update.fullscreen_changed {
                self.events.dispatch(
                    Event::new(EventKind::MultiWindowModeChanged, task_id)
                        .with_value(json!({ "fullscreen": task.is_fullscreen() })),
                );
            }
        }

        self.window.position_child_at(task_id, activity, index);
        self.events.dispatch(
            Event::new(EventKind::ActivityAdded, task_id)
                .with_value(json!({ "activity": activity.get(), "index": index })),
        );
        Ok(index)
    }

    /// Detach `activity` from `task` and hand it back.
    ///
    /// An emptied task leaves its stack, and leaves the registry too when it
    /// should not stay in recents.
    pub fn remove_activity(
        &mut self,
        task_id: TaskId,
        activity: ActivityId,
        reparenting: bool,
    ) -> Result<ActivityEntry> {
        let policy = policy(&self.config, &self.resolver);
        let task = self.tasks.get_mut(&task_id).ok_or(Error::TaskNotFound(task_id))?;
        let removed = task.remove_activity(activity, reparenting, &policy)?;

        if removed.entry.is_persistable() {
            self.persister.notify_task_changed(task_id, false);
        }
        let in_pinned = task
            .stack()
            .and_then(|id| self.stacks.get(&id))
            .is_some_and(|stack| stack.kind() == StackKind::Pinned);
        if in_pinned {
            self.events
                .dispatch(Event::new(EventKind::PinnedStackChanged, task_id));
        }
        self.events.dispatch(Event::new(EventKind::ActivityRemoved, task_id).with_value(json!({
            "activity": activity.get(),
            "reparenting": reparenting,
            "task_emptied": removed.task_emptied,
        })));

        if removed.should_destroy {
            self.handle_task_emptied(task_id)?;
        }
        Ok(removed.entry)
    }

    /// Move an entry to another task (or to another index in the same one).
    pub fn move_activity(
        &mut self,
        activity: ActivityId,
        from: TaskId,
        to: TaskId,
        index: usize,
    ) -> Result<usize> {
        let entry = self
            .require_task(from)?
            .activity(activity)
            .cloned()
            .ok_or(Error::ActivityNotFound {
                task: from,
                activity,
            })?;
        if from == to {
            return self.add_activity(to, entry, index);
        }
        self.require_task(to)?;

        let entry = self.remove_activity(from, activity, true)?;
        self.add_activity(to, entry, index)
    }

    pub fn move_activity_to_front(&mut self, task_id: TaskId, activity: ActivityId) -> Result<()> {
        let policy = policy(&self.config, &self.resolver);
        let task = self.tasks.get_mut(&task_id).ok_or(Error::TaskNotFound(task_id))?;
        task.move_activity_to_front(activity, &policy)?;
        let index = task.len().saturating_sub(1);
        self.window.position_child_at(task_id, activity, index);
        Ok(())
    }

    /// Replace an entry's launch info and re-derive the task's identity.
    pub fn update_activity_info(
        &mut self,
        task_id: TaskId,
        activity: ActivityId,
        info: crate::activity::ActivityInfo,
    ) -> Result<()> {
        let policy = policy(&self.config, &self.resolver);
        let task = self.tasks.get_mut(&task_id).ok_or(Error::TaskNotFound(task_id))?;
        task.update_activity_info(activity, info, &policy)?;
        self.persister.notify_task_changed(task_id, false);
        Ok(())
    }

    /// Mark an entry (in)visible; a visible entry marks its task as seen.
    pub fn set_activity_visible(&mut self, task_id: TaskId, activity: ActivityId, visible: bool) -> Result<()> {
        let task = self.tasks.get_mut(&task_id).ok_or(Error::TaskNotFound(task_id))?;
        let entry = task.activity_mut(activity).ok_or(Error::ActivityNotFound {
            task: task_id,
            activity,
        })?;
        entry.visible = visible;
        if visible {
            task.set_has_been_visible();
            task.touch_active_time();
        }
        Ok(())
    }

    /// Set an entry's presentation and refresh the task's recents entry.
    pub fn set_task_description(
        &mut self,
        task_id: TaskId,
        activity: ActivityId,
        description: Option<TaskDescription>,
    ) -> Result<()> {
        let task = self.tasks.get_mut(&task_id).ok_or(Error::TaskNotFound(task_id))?;
        let entry = task.activity_mut(activity).ok_or(Error::ActivityNotFound {
            task: task_id,
            activity,
        })?;
        entry.task_description = description;
        task.update_task_description();
        self.persister.notify_task_changed(task_id, false);
        self.events.dispatch(
            Event::new(EventKind::TaskDescriptionChanged, task_id)
                .with_value(json!({ "label": task.last_task_description().label })),
        );
        Ok(())
    }

    pub fn touch_active_time(&mut self, task_id: TaskId) -> Result<()> {
        let task = self.tasks.get_mut(&task_id).ok_or(Error::TaskNotFound(task_id))?;
        task.touch_active_time();
        Ok(())
    }

    pub fn set_temporarily_unresizable(&mut self, task_id: TaskId, unresizable: bool) -> Result<()> {
        let task = self.tasks.get_mut(&task_id).ok_or(Error::TaskNotFound(task_id))?;
        task.set_temporarily_unresizable(unresizable);
        Ok(())
    }

    // =========================================================================
    // Clearing
    // =========================================================================

    /// Clear-top. Finished entries stay in the task, marked finishing, until
    /// [`TaskRegistry::reap_finished`] removes them, so the caller can add
    /// the new entry before the task could become empty.
    pub fn perform_clear_task_locked(
        &mut self,
        task_id: TaskId,
        new_entry: &ActivityEntry,
        launch_flags: LaunchFlags,
    ) -> Result<ClearOutcome> {
        let task = self.tasks.get_mut(&task_id).ok_or(Error::TaskNotFound(task_id))?;
        let outcome = task.perform_clear_task_locked(new_entry, launch_flags);
        self.dispatch_cleared(task_id, &outcome);
        Ok(outcome)
    }

    /// Clear-top, removing finished entries right away while the task is
    /// held for reuse. The task survives even if nothing is left in it.
    pub fn perform_clear_task_for_reuse(
        &mut self,
        task_id: TaskId,
        new_entry: &ActivityEntry,
        launch_flags: LaunchFlags,
    ) -> Result<ClearOutcome> {
        let task = self.tasks.get_mut(&task_id).ok_or(Error::TaskNotFound(task_id))?;
        task.set_reuse_task(true);
        let outcome = task.perform_clear_task_locked(new_entry, launch_flags);
        self.reap_while_reusing(task_id)?;
        self.dispatch_cleared(task_id, &outcome);
        Ok(outcome)
    }

    /// Remove every entry while the task is held for reuse.
    pub fn perform_clear_task(&mut self, task_id: TaskId) -> Result<ClearOutcome> {
        let task = self.tasks.get_mut(&task_id).ok_or(Error::TaskNotFound(task_id))?;
        task.set_reuse_task(true);
        let outcome = task.perform_clear_task_at_index(0);
        self.reap_while_reusing(task_id)?;
        self.dispatch_cleared(task_id, &outcome);
        Ok(outcome)
    }

    /// Finish entries from `index` to the top and remove them. The task is
    /// destroyed if that empties it.
    pub fn perform_clear_task_at_index(&mut self, task_id: TaskId, index: usize) -> Result<ClearOutcome> {
        let task = self.tasks.get_mut(&task_id).ok_or(Error::TaskNotFound(task_id))?;
        let outcome = task.perform_clear_task_at_index(index);
        self.dispatch_cleared(task_id, &outcome);
        self.reap_finished(task_id)?;
        Ok(outcome)
    }

    /// Remove every finishing entry of `task`, top first.
    pub fn reap_finished(&mut self, task_id: TaskId) -> Result<Vec<ActivityEntry>> {
        let finishing = self.require_task(task_id)?.finishing_activities();
        let mut removed = Vec::with_capacity(finishing.len());
        for activity in finishing {
            if !self.tasks.contains_key(&task_id) {
                break;
            }
            removed.push(self.remove_activity(task_id, activity, false)?);
        }
        Ok(removed)
    }

    fn reap_while_reusing(&mut self, task_id: TaskId) -> Result<()> {
        let result = self.reap_finished(task_id);
        if let Some(task) = self.tasks.get_mut(&task_id) {
            task.set_reuse_task(false);
        }
        result.map(|_| ())
    }

    fn dispatch_cleared(&mut self, task_id: TaskId, outcome: &ClearOutcome) {
        if outcome.finished.is_empty() && outcome.reused.is_none() {
            return;
        }
        let finished: Vec<u64> = outcome.finished.iter().map(|id| id.get()).collect();
        self.events.dispatch(Event::new(EventKind::TaskCleared, task_id).with_value(json!({
            "finished": finished,
            "reused": outcome.reused.map(ActivityId::get),
        })));
    }

    // =========================================================================
    // Resize
    // =========================================================================

    /// Give `task` new bounds (None for fullscreen).
    pub fn resize_task(
        &mut self,
        task_id: TaskId,
        bounds: Option<Rect>,
        source: ResizeSource,
        preserve_window: bool,
        defer_resume: bool,
    ) -> Result<ResizeOutcome> {
        let task = self.tasks.get_mut(&task_id).ok_or(Error::TaskNotFound(task_id))?;
        if !task.is_resizeable(&self.config.registry, true) {
            warn!(task = %task_id, "resize requested for non-resizeable task");
            return Ok(ResizeOutcome::skipped());
        }

        let bounds = task.validate_bounds(bounds);
        let forced = source.is_forced();
        if task.bounds() == bounds && !forced {
            return Ok(ResizeOutcome::unchanged());
        }

        let Some(stack_id) = task.stack() else {
            let update = task.update_override_configuration(bounds, None, None, &self.resolver);
            debug!(task = %task_id, "resized detached task");
            return Ok(ResizeOutcome {
                applied: true,
                config_changed: update.changed,
                windows_kept: true,
                deferred: true,
            });
        };
        let stack = self.stacks.get(&stack_id).ok_or(Error::StackNotFound(stack_id))?;
        if let Some(rect) = bounds {
            if !task.can_resize_to_bounds(Some(&rect), stack.kind()) {
                return Err(Error::InvalidBounds {
                    task: task_id,
                    bounds: rect,
                    resize_mode: task.resize_mode(),
                });
            }
        }

        let update = task.update_override_configuration(bounds, None, Some(stack), &self.resolver);
        let has_running = task.top_running_activity().is_some();
        let windows_kept = !(update.changed && has_running && !preserve_window && !defer_resume);
        self.window.resize(
            task_id,
            task.bounds(),
            task.override_configuration(),
            windows_kept,
            forced,
        );
        if update.changed {
            self.persister.notify_task_changed(task_id, false);
        }
        if update.fullscreen_changed {
            self.events.dispatch(
                Event::new(EventKind::MultiWindowModeChanged, task_id)
                    .with_value(json!({ "fullscreen": task.is_fullscreen() })),
            );
        }
        self.events.dispatch(Event::new(EventKind::TaskResized, task_id).with_value(json!({
            "bounds": task.bounds().map(|rect| rect.to_string()),
            "config_changed": update.changed,
            "windows_kept": windows_kept,
        })));

        Ok(ResizeOutcome {
            applied: true,
            config_changed: update.changed,
            windows_kept,
            deferred: false,
        })
    }

    // =========================================================================
    // Reparent
    // =========================================================================

    /// Move `task` to `preferred` (or the stack substituted for it).
    ///
    /// The resize that follows the move is planned and validated first, so
    /// invalid bounds leave everything untouched.
    pub fn reparent(
        &mut self,
        task_id: TaskId,
        preferred: StackId,
        position: StackPosition,
        move_mode: MoveStackMode,
        defer_resume: bool,
    ) -> Result<ReparentOutcome> {
        let task = self.tasks.get(&task_id).ok_or(Error::TaskNotFound(task_id))?;
        let source = task.stack().ok_or(Error::StaleContainer(task_id))?;
        if !self.stacks.contains_key(&preferred) {
            return Err(Error::StackNotFound(preferred));
        }

        let destination = self.resolve_reparent_target(task, preferred)?;
        if destination == source {
            debug!(task = %task_id, stack = %source, "reparent target is the current stack");
            return Ok(ReparentOutcome {
                destination,
                moved: false,
                preferred_honored: destination == preferred,
                resize: None,
            });
        }
        let planned = self.plan_reparent_resize(task, destination)?;

        let has_running = task.top_running_activity().is_some();
        let was_focused = has_running && self.focused_stack == Some(source);
        let was_front = has_running
            && self.front_stack() == Some(source)
            && self.stacks.get(&source).and_then(Stack::top_task) == Some(task_id);
        let move_to_front = match move_mode {
            MoveStackMode::ToFront => true,
            MoveStackMode::KeepAtFront => was_focused || was_front,
            MoveStackMode::InPlace => false,
        };

        let saved_order = self.stack_order.clone();
        let saved_focus = self.focused_stack;
        let source_index = self
            .stacks
            .get(&source)
            .and_then(|stack| stack.position_of(task_id))
            .unwrap_or(0);
        let index = self.move_between_stacks(task_id, source, destination, position, move_to_front)?;
        if move_to_front {
            self.move_stack_to_front(destination)?;
        }

        let resize = match planned {
            Some((bounds, source_kind)) => {
                match self.resize_task(task_id, bounds, source_kind, true, defer_resume) {
                    Ok(outcome) => Some(outcome),
                    Err(err) => {
                        warn!(task = %task_id, error = %err, "resize after reparent failed; rolling back");
                        self.move_between_stacks(
                            task_id,
                            destination,
                            source,
                            StackPosition::Index(source_index),
                            false,
                        )?;
                        self.stack_order = saved_order;
                        self.focused_stack = saved_focus;
                        return Err(err);
                    }
                }
            }
            None => None,
        };

        self.persister.notify_task_changed(task_id, false);
        self.events.dispatch(Event::new(EventKind::TaskReparented, task_id).with_value(json!({
            "from": source.get(),
            "to": destination.get(),
            "index": index,
            "move_to_front": move_to_front,
        })));
        info!(task = %task_id, from = %source, to = %destination, "reparented task");

        Ok(ReparentOutcome {
            destination,
            moved: true,
            preferred_honored: destination == preferred,
            resize,
        })
    }

    fn move_between_stacks(
        &mut self,
        task_id: TaskId,
        from: StackId,
        to: StackId,
        position: StackPosition,
        move_to_front: bool,
    ) -> Result<usize> {
        let index = self
            .stacks
            .get(&to)
            .map(|stack| stack.adjusted_position(position))
            .ok_or(Error::StackNotFound(to))?;
        self.window.reparent(task_id, to, index, move_to_front);

        let mode = if move_to_front {
            RemoveMode::MovingToTop
        } else {
            RemoveMode::Moving
        };
        if let Some(stack) = self.stacks.get_mut(&from) {
            stack.remove(task_id, mode);
        }
        let index = match self.stacks.get_mut(&to) {
            Some(stack) => stack.add(task_id, index),
            None => return Err(Error::StackNotFound(to)),
        };
        if let Some(task) = self.tasks.get_mut(&task_id) {
            task.set_stack(Some(to));
        }
        Ok(index)
    }

    /// Substitute a fullscreen stack when the preferred one cannot host the
    /// task.
    fn resolve_reparent_target(&self, task: &Task, preferred: StackId) -> Result<StackId> {
        let kind = self
            .stacks
            .get(&preferred)
            .map(Stack::kind)
            .ok_or(Error::StackNotFound(preferred))?;
        let registry = &self.config.registry;
        let reason = if kind.is_multi_window() && !registry.supports_multi_window {
            Some("multi-window is disabled")
        } else if kind == StackKind::Docked && !task.supports_split_screen(registry) {
            Some("task does not support split screen")
        } else if kind == StackKind::Freeform && !task.is_resizeable(registry, false) {
            Some("task is not resizeable")
        } else if kind == StackKind::Pinned && !task.is_resizeable(registry, true) {
            Some("task does not support picture-in-picture")
        } else {
            None
        };
        let Some(reason) = reason else {
            return Ok(preferred);
        };

        let fallback = self.stack_of_kind(StackKind::Fullscreen).ok_or_else(|| {
            Error::OperationFailed(format!(
                "cannot move task {} to {kind} stack ({reason}) and there is no fullscreen stack",
                task.id()
            ))
        })?;
        warn!(task = %task.id(), stack = %preferred, %kind, reason, "substituting fullscreen stack");
        Ok(fallback)
    }

    /// The resize that has to follow a move to `destination`, validated.
    fn plan_reparent_resize(
        &self,
        task: &Task,
        destination: StackId,
    ) -> Result<Option<(Option<Rect>, ResizeSource)>> {
        let stack = self
            .stacks
            .get(&destination)
            .ok_or(Error::StackNotFound(destination))?;
        let planned = match stack.kind() {
            StackKind::Fullscreen if task.bounds() != stack.bounds() => {
                Some((stack.bounds(), ResizeSource::System))
            }
            StackKind::Freeform => {
                let bounds = task
                    .last_non_fullscreen_bounds()
                    .or_else(|| self.layout_bounds(stack));
                Some((bounds, ResizeSource::Forced))
            }
            StackKind::Docked | StackKind::Pinned => Some((stack.bounds(), ResizeSource::System)),
            _ => None,
        };

        if let Some((Some(bounds), _)) = planned {
            if task.is_resizeable(&self.config.registry, true)
                && !task.can_resize_to_bounds(Some(&bounds), stack.kind())
            {
                return Err(Error::InvalidBounds {
                    task: task.id(),
                    bounds,
                    resize_mode: task.resize_mode(),
                });
            }
        }
        Ok(planned)
    }

    // =========================================================================
    // Affiliation
    // =========================================================================

    /// Join `task` to the chain `target` belongs to, at its tail.
    pub fn set_task_to_affiliate_with(&mut self, task: TaskId, target: TaskId) -> Result<Vec<ChainRepair>> {
        let repairs = affiliation::set_task_to_affiliate_with(&mut self.tasks, task, target)?;
        self.persister.notify_task_changed(task, false);
        self.dispatch_repairs(&repairs);
        let affiliated = self.require_task(task)?.affiliated_task_id();
        self.events.dispatch(
            Event::new(EventKind::AffiliationChanged, task)
                .with_value(json!({ "affiliated_task": affiliated.get() })),
        );
        Ok(repairs)
    }

    /// Detach `task` from its chain, leaving its neighbours linked.
    pub fn close_recents_chain(&mut self, task: TaskId) -> Result<()> {
        self.require_task(task)?;
        affiliation::close_recents_chain(&mut self.tasks, task);
        self.events.dispatch(Event::new(EventKind::AffiliationChanged, task));
        Ok(())
    }

    /// Every task in the chain containing `task`, head first.
    pub fn affiliation_chain(&self, task: TaskId) -> Result<Vec<TaskId>> {
        self.require_task(task)?;
        let head = affiliation::chain_head(&self.tasks, task);
        Ok(affiliation::chain_from(&self.tasks, head))
    }

    /// Check every chain and cut inconsistent links.
    pub fn rebuild_chains(&mut self) -> Vec<ChainRepair> {
        let repairs = affiliation::rebuild_chains(&mut self.tasks);
        self.dispatch_repairs(&repairs);
        repairs
    }

    fn dispatch_repairs(&mut self, repairs: &[ChainRepair]) {
        for repair in repairs {
            self.events.dispatch(Event::new(EventKind::ChainRepaired, repair.task).with_value(json!({
                "link": repair.link.get(),
                "kind": repair.kind.to_string(),
            })));
        }
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    pub fn save_thumbnail(&mut self, task: TaskId, image: &[u8]) -> Result<()> {
        self.require_task(task)?;
        self.persister.save_image(task, image)
    }

    pub fn thumbnail(&self, task: TaskId) -> Result<Option<Vec<u8>>> {
        self.require_task(task)?;
        self.persister.get_image(task)
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        RegistrySnapshot::new(self.tasks.values().cloned().collect())
    }

    pub fn save_snapshot(&mut self) -> Result<()> {
        let snapshot = self.snapshot();
        self.persister.write_snapshot(&snapshot)
    }

    /// Load the persister's snapshot, if it has one.
    pub fn load_snapshot(&mut self) -> Result<Vec<ChainRepair>> {
        match self.persister.read_snapshot()? {
            Some(snapshot) => self.restore(snapshot),
            None => Ok(Vec::new()),
        }
    }

    /// Add the tasks of `snapshot` as detached tasks and repair their chains.
    pub fn restore(&mut self, snapshot: RegistrySnapshot) -> Result<Vec<ChainRepair>> {
        let mut seen = HashSet::new();
        for task in &snapshot.tasks {
            if self.tasks.contains_key(&task.id()) || !seen.insert(task.id()) {
                return Err(Error::InvalidArgument(format!(
                    "snapshot contains duplicate task {}",
                    task.id()
                )));
            }
        }
        let mut claimed = HashMap::new();
        for task in &snapshot.tasks {
            for entry in task.activities() {
                let owner = claimed
                    .insert(entry.id(), task.id())
                    .or_else(|| self.activity_owner(entry.id()));
                if let Some(owner) = owner {
                    return Err(Error::OwnershipConflict {
                        activity: entry.id(),
                        owner,
                        target: task.id(),
                    });
                }
            }
        }

        let count = snapshot.tasks.len();
        for mut task in snapshot.tasks {
            task.restore_fixup();
            self.next_task_id = self.next_task_id.max(u64::from(task.id().get()) + 1);
            self.tasks.insert(task.id(), task);
        }
        let repairs = self.rebuild_chains();
        info!(tasks = count, repairs = repairs.len(), "restored tasks");
        Ok(repairs)
    }
}

impl std::fmt::Debug for TaskRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRegistry")
            .field("tasks", &self.tasks.len())
            .field("stacks", &self.stack_order)
            .field("focused_stack", &self.focused_stack)
            .field("events", &self.events)
            .finish()
    }
}

/// A registry behind a mutex; clones share it.
#[derive(Clone)]
pub struct SharedRegistry {
    inner: Arc<Mutex<TaskRegistry>>,
}

impl SharedRegistry {
    pub fn new(registry: TaskRegistry) -> Self {
        Self {
            inner: Arc::new(Mutex::new(registry)),
        }
    }

    /// Run `f` with exclusive access to the registry.
    pub fn with<R>(&self, f: impl FnOnce(&mut TaskRegistry) -> Result<R>) -> Result<R> {
        let mut guard = self.inner.lock().map_err(|_| Error::RegistryPoisoned)?;
        f(&mut guard)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::{ActivityInfo, ComponentName};
    use crate::events::EventLog;

    fn entry(id: u64, class: &str) -> ActivityEntry {
        let info = ActivityInfo::new(ComponentName::new("com.example", class));
        ActivityEntry::for_info(ActivityId::new(id), info)
    }

    #[test]
    fn emptied_task_is_detached_and_auto_removed() {
        let mut registry = TaskRegistry::new(Config::default());
        let stack = registry.create_stack(StackKind::Fullscreen, None).expect("stack");
        let task = registry
            .create_task(entry(1, "com.example.A"), Some(stack), StackPosition::Top)
            .expect("create");

        registry
            .remove_activity(task, ActivityId::new(1), false)
            .expect("remove");
        // Never visible, so it does not stay in recents.
        assert!(registry.task(task).is_none());
        assert!(registry.stack(stack).expect("stack").is_empty());
    }

    #[test]
    fn emptied_visible_task_stays_detached() {
        let mut registry = TaskRegistry::new(Config::default());
        let stack = registry.create_stack(StackKind::Fullscreen, None).expect("stack");
        let task = registry
            .create_task(entry(1, "com.example.A"), Some(stack), StackPosition::Top)
            .expect("create");
        registry
            .set_activity_visible(task, ActivityId::new(1), true)
            .expect("visible");

        registry
            .remove_activity(task, ActivityId::new(1), false)
            .expect("remove");
        let kept = registry.task(task).expect("kept in recents");
        assert!(kept.stack().is_none());
        assert!(registry.stack(stack).expect("stack").is_empty());
    }

    #[test]
    fn clear_for_reuse_keeps_empty_task() {
        let mut registry = TaskRegistry::new(Config::default());
        let stack = registry.create_stack(StackKind::Fullscreen, None).expect("stack");
        let task = registry
            .create_task(entry(1, "com.example.A"), Some(stack), StackPosition::Top)
            .expect("create");

        let relaunch = entry(2, "com.example.A");
        let outcome = registry
            .perform_clear_task_for_reuse(task, &relaunch, LaunchFlags::NONE)
            .expect("clear");
        assert_eq!(outcome.reused, None);
        let cleared = registry.task(task).expect("task survives");
        assert!(cleared.is_empty());
        assert!(!cleared.is_clearing_to_reuse());

        registry.add_activity_to_top(task, relaunch).expect("relaunch");
        assert_eq!(registry.task(task).expect("task").len(), 1);
    }

    #[test]
    fn events_follow_lifecycle() {
        let log = EventLog::new();
        let mut registry = TaskRegistry::new(Config::default());
        registry.subscribe(Box::new(log.clone()));
        let stack = registry.create_stack(StackKind::Fullscreen, None).expect("stack");
        let task = registry
            .create_task(entry(1, "com.example.A"), Some(stack), StackPosition::Top)
            .expect("create");
        registry.remove_task(task).expect("remove");

        assert_eq!(
            log.kinds(),
            vec![
                EventKind::TaskCreated,
                EventKind::ActivityAdded,
                EventKind::TaskRemoved
            ]
        );
    }

    #[test]
    fn shared_registry_runs_closures_under_lock() {
        let shared = SharedRegistry::new(TaskRegistry::new(Config::default()));
        let other = shared.clone();
        let stack = shared
            .with(|registry| registry.create_stack(StackKind::Fullscreen, None))
            .expect("stack");
        let task = other
            .with(|registry| {
                registry.create_task(entry(1, "com.example.A"), Some(stack), StackPosition::Top)
            })
            .expect("task");
        let count = shared.with(|registry| Ok(registry.len())).expect("len");
        assert_eq!(count, 1);
        assert!(shared.with(|registry| registry.require_task(task).map(|_| ())).is_ok());
    }

    #[test]
    fn exhausted_stack_ids_are_an_error() {
        let mut registry = TaskRegistry::new(Config::default());
        registry.next_stack_id = u64::from(u32::MAX);
        let last = registry
            .create_stack(StackKind::Fullscreen, None)
            .expect("last stack id");
        assert_eq!(last.get(), u32::MAX);

        let err = registry
            .create_stack(StackKind::Fullscreen, None)
            .expect_err("no ids left");
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert_eq!(registry.stacks().count(), 1);
    }
}
