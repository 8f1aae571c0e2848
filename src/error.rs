//! Error types for taskreg
//!
//! Exit codes:
//! - 0: Success
//! - 2: User error (bad args, unknown task/stack/activity, bad config)
//! - 3: Contract violation (ownership conflict, invalid bounds, stale container)
//! - 4: Operation failed (io, serialization, lock contention)
//!
//! Affiliation-chain inconsistencies are not errors. They are repaired in
//! place and reported as [`crate::affiliation::ChainRepair`] values.

use std::path::PathBuf;

use serde_json::json;
use thiserror::Error;

use crate::activity::ActivityId;
use crate::geometry::Rect;
use crate::stack::StackId;
use crate::task::{ResizeMode, TaskId};

/// Exit codes for the taskreg CLI
pub mod exit_codes {
    pub const SUCCESS: i32 = 0;
    pub const USER_ERROR: i32 = 2;
    pub const CONTRACT_VIOLATION: i32 = 3;
    pub const OPERATION_FAILED: i32 = 4;
}

/// Main error type for registry operations
#[derive(Error, Debug)]
pub enum Error {
    // User errors (exit code 2)
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Task not found: {0}")]
    TaskNotFound(TaskId),

    #[error("Stack not found: {0}")]
    StackNotFound(StackId),

    #[error("Activity {activity} not found in task {task}")]
    ActivityNotFound { task: TaskId, activity: ActivityId },

    // Contract violations (exit code 3)
    #[error("Activity {activity} is owned by task {owner}, cannot attach to task {target}")]
    OwnershipConflict {
        activity: ActivityId,
        owner: TaskId,
        target: TaskId,
    },

    #[error("Cannot resize task {task} to {bounds} with resize mode {resize_mode}")]
    InvalidBounds {
        task: TaskId,
        bounds: Rect,
        resize_mode: ResizeMode,
    },

    #[error("Task {0} has no stack yet")]
    StaleContainer(TaskId),

    // Operation failures (exit code 4)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Lock acquisition failed: {0}")]
    LockFailed(PathBuf),

    #[error("Registry lock poisoned")]
    RegistryPoisoned,

    #[error("Operation failed: {0}")]
    OperationFailed(String),
}

impl Error {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            // User errors
            Error::InvalidConfig(_)
            | Error::InvalidArgument(_)
            | Error::TaskNotFound(_)
            | Error::StackNotFound(_)
            | Error::ActivityNotFound { .. } => exit_codes::USER_ERROR,

            // Contract violations
            Error::OwnershipConflict { .. }
            | Error::InvalidBounds { .. }
            | Error::StaleContainer(_) => exit_codes::CONTRACT_VIOLATION,

            // Operation failures
            Error::Io(_)
            | Error::Json(_)
            | Error::TomlParse(_)
            | Error::TomlSerialize(_)
            | Error::LockFailed(_)
            | Error::RegistryPoisoned
            | Error::OperationFailed(_) => exit_codes::OPERATION_FAILED,
        }
    }

    /// Structured fields for machine-readable output, when the variant has any.
    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            Error::InvalidConfig(message) | Error::InvalidArgument(message) => {
                Some(json!({ "message": message }))
            }
            Error::TaskNotFound(task) | Error::StaleContainer(task) => {
                Some(json!({ "task": task.get() }))
            }
            Error::StackNotFound(stack) => Some(json!({ "stack": stack.get() })),
            Error::ActivityNotFound { task, activity } => Some(json!({
                "task": task.get(),
                "activity": activity.get(),
            })),
            Error::OwnershipConflict {
                activity,
                owner,
                target,
            } => Some(json!({
                "activity": activity.get(),
                "owner": owner.get(),
                "target": target.get(),
            })),
            Error::InvalidBounds {
                task,
                bounds,
                resize_mode,
            } => Some(json!({
                "task": task.get(),
                "bounds": bounds.to_string(),
                "resize_mode": resize_mode.to_string(),
            })),
            Error::LockFailed(path) => Some(json!({ "path": path.display().to_string() })),
            _ => None,
        }
    }
}

/// Result type alias for registry operations
pub type Result<T> = std::result::Result<T, Error>;

/// Wrapper for displaying errors in JSON format
#[derive(serde::Serialize)]
pub struct JsonError {
    pub error: String,
    pub code: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl From<&Error> for JsonError {
    fn from(err: &Error) -> Self {
        JsonError {
            error: err.to_string(),
            code: err.exit_code(),
            details: err.details(),
        }
    }
}
