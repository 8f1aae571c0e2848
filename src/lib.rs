//! taskreg - Task Registry Library
//!
//! Keeps the model behind a recents list: tasks with their activity
//! back-stacks, the stacks those tasks live in, and the affiliation chains
//! that group related tasks.
//!
//! # Core Concepts
//!
//! - **Tasks**: ordered activity entries plus the identity derived from them
//! - **Stacks**: z-ordered groups of tasks sharing a windowing mode
//! - **Affiliation chains**: doubly linked task groups, repaired when broken
//! - **Configurations**: per-task screen configuration computed from bounds
//!
//! # Module Organization
//!
//! - `activity`: activity entries, launch info and flags
//! - `task`: the task record and its local mutators
//! - `stack`: stacks, stack kinds and layout policies
//! - `registry`: cross-object operations (clear, reparent, resize, remove)
//! - `affiliation`: chain maintenance and repair
//! - `configuration`: configuration computation for bounds
//! - `geometry`: rectangles and insets
//! - `window`: window container collaborator
//! - `persist`: snapshot and thumbnail persistence
//! - `events`: registry events and JSONL sinks
//! - `config`: configuration loading from `.taskreg.toml`
//! - `lock`: file locking and atomic writes
//! - `cli` / `output`: the `taskreg` command line
//! - `error`: error types and result aliases

pub mod activity;
pub mod affiliation;
pub mod cli;
pub mod config;
pub mod configuration;
pub mod error;
pub mod events;
pub mod geometry;
pub mod lock;
pub mod output;
pub mod persist;
pub mod registry;
pub mod stack;
pub mod task;
pub mod window;

pub use error::{Error, Result};
pub use registry::{SharedRegistry, TaskRegistry};
