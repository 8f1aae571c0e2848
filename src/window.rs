//! Window container collaborator.
//!
//! The registry decides where tasks live and how big they are; whatever
//! draws them is told through [`WindowContainerController`]. Calls are
//! notifications: the registry has already committed the change when it
//! makes them.

use std::sync::{Arc, Mutex};

use crate::activity::ActivityId;
use crate::configuration::Configuration;
use crate::geometry::Rect;
use crate::stack::StackId;
use crate::task::TaskId;

pub trait WindowContainerController: Send {
    /// `task` moved to `stack` at `position`.
    fn reparent(&mut self, task: TaskId, stack: StackId, position: usize, move_to_front: bool);

    /// `task` has new bounds (None for fullscreen) and configuration.
    ///
    /// `relayout` is false when the windows had to be recreated instead of
    /// resized in place. `forced` mirrors a forced resize request.
    fn resize(
        &mut self,
        task: TaskId,
        bounds: Option<Rect>,
        configuration: &Configuration,
        relayout: bool,
        forced: bool,
    );

    /// `activity` now sits at `index` within `task`.
    fn position_child_at(&mut self, task: TaskId, activity: ActivityId, index: usize);
}

/// Controller for headless use.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopWindowController;

impl WindowContainerController for NoopWindowController {
    fn reparent(&mut self, _task: TaskId, _stack: StackId, _position: usize, _move_to_front: bool) {}

    fn resize(
        &mut self,
        _task: TaskId,
        _bounds: Option<Rect>,
        _configuration: &Configuration,
        _relayout: bool,
        _forced: bool,
    ) {
    }

    fn position_child_at(&mut self, _task: TaskId, _activity: ActivityId, _index: usize) {}
}

/// One call received by a [`RecordingWindowController`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WindowCall {
    Reparent {
        task: TaskId,
        stack: StackId,
        position: usize,
        move_to_front: bool,
    },
    Resize {
        task: TaskId,
        bounds: Option<Rect>,
        relayout: bool,
        forced: bool,
    },
    PositionChild {
        task: TaskId,
        activity: ActivityId,
        index: usize,
    },
}

/// Controller that keeps every call, for dry runs and tests.
///
/// Clones share the same log, so a clone can be handed to the registry
/// while the caller keeps one to inspect.
#[derive(Debug, Default, Clone)]
pub struct RecordingWindowController {
    calls: Arc<Mutex<Vec<WindowCall>>>,
}

impl RecordingWindowController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<WindowCall> {
        match self.calls.lock() {
            Ok(calls) => calls.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn record(&self, call: WindowCall) {
        tracing::trace!(?call, "window container call");
        match self.calls.lock() {
            Ok(mut calls) => calls.push(call),
            Err(poisoned) => poisoned.into_inner().push(call),
        }
    }
}

impl WindowContainerController for RecordingWindowController {
    fn reparent(&mut self, task: TaskId, stack: StackId, position: usize, move_to_front: bool) {
        self.record(WindowCall::Reparent {
            task,
            stack,
            position,
            move_to_front,
        });
    }

    fn resize(
        &mut self,
        task: TaskId,
        bounds: Option<Rect>,
        _configuration: &Configuration,
        relayout: bool,
        forced: bool,
    ) {
        self.record(WindowCall::Resize {
            task,
            bounds,
            relayout,
            forced,
        });
    }

    fn position_child_at(&mut self, task: TaskId, activity: ActivityId, index: usize) {
        self.record(WindowCall::PositionChild {
            task,
            activity,
            index,
        });
    }
}
