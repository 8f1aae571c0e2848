//! Command-line interface for taskreg
//!
//! This module defines the CLI structure using clap derive macros.
//! Each subcommand is defined in its own submodule.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};

use crate::affiliation::ChainRepair;
use crate::config::{Config, CONFIG_FILENAME};
use crate::error::Result;
use crate::events::EventDestination;
use crate::geometry::Rect;
use crate::persist::FilePersister;
use crate::registry::TaskRegistry;
use crate::stack::StackKind;

mod chain;
mod check;
mod init;
mod resolve;
mod show;

/// taskreg - task registry inspector
///
/// Loads a persisted task snapshot and reports on tasks, their affiliation
/// chains and the configurations the registry would compute for them.
#[derive(Parser, Debug)]
#[command(name = "taskreg")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Directory holding .taskreg.toml (defaults to current directory)
    #[arg(long, global = true, env = "TASKREG_DIR")]
    pub dir: Option<PathBuf>,

    /// Explicit config file, overriding <dir>/.taskreg.toml
    #[arg(long, global = true, env = "TASKREG_CONFIG")]
    pub config: Option<PathBuf>,

    /// Snapshot directory, overriding persist.dir from the config
    #[arg(long, global = true, env = "TASKREG_STATE_DIR")]
    pub state_dir: Option<PathBuf>,

    /// Stream registry events as JSONL to a file, or "-" for stdout
    #[arg(long, global = true)]
    pub events: Option<String>,

    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write a default .taskreg.toml and create the snapshot directory
    Init {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },

    /// List persisted tasks, or show one task in detail
    Show {
        /// Task id
        task: Option<u32>,
    },

    /// Show the affiliation chain containing a task, head first
    Chain {
        /// Task id
        task: u32,
    },

    /// Load the snapshot, repair affiliation chains and report what changed
    Check {
        /// Write the repaired snapshot back
        #[arg(long)]
        write: bool,
    },

    /// Compute the configuration a task with the given bounds would get
    Resolve {
        /// Requested bounds: left,top,right,bottom
        #[arg(long)]
        bounds: Rect,

        /// Bounds before this request, used to anchor minimum-size growth
        #[arg(long)]
        previous: Option<Rect>,

        /// Minimum width in px (defaults to the registry minimum)
        #[arg(long)]
        min_width: Option<i32>,

        /// Minimum height in px (defaults to the registry minimum)
        #[arg(long)]
        min_height: Option<i32>,

        /// Stack kind the task would live in
        #[arg(long, default_value = "freeform")]
        stack: StackKind,
    },
}

/// Where a command finds its configuration and snapshot.
#[derive(Debug, Clone)]
pub(crate) struct Context {
    dir: Option<PathBuf>,
    config: Option<PathBuf>,
    state_dir: Option<PathBuf>,
    events: Option<EventDestination>,
}

/// A registry restored from the snapshot on disk.
pub(crate) struct LoadedRegistry {
    pub registry: TaskRegistry,
    pub snapshot_path: PathBuf,
    pub repairs: Vec<ChainRepair>,
}

impl Context {
    pub(crate) fn base_dir(&self) -> Result<PathBuf> {
        match &self.dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(std::env::current_dir()?),
        }
    }

    pub(crate) fn config_path(&self) -> Result<PathBuf> {
        match &self.config {
            Some(path) => Ok(path.clone()),
            None => Ok(self.base_dir()?.join(CONFIG_FILENAME)),
        }
    }

    /// An explicit `--config` must load; the implicit one falls back to defaults.
    pub(crate) fn load_config(&self) -> Result<Config> {
        match &self.config {
            Some(path) => Config::load(path),
            None => Ok(Config::load_from_dir(&self.base_dir()?)),
        }
    }

    pub(crate) fn persister(&self, config: &Config) -> Result<FilePersister> {
        match &self.state_dir {
            Some(dir) => Ok(FilePersister::new(dir.clone(), config.persist.lock_timeout_ms)),
            None => Ok(FilePersister::from_config(&self.config_base()?, &config.persist)),
        }
    }

    /// Build a registry and restore the snapshot into it.
    pub(crate) fn load_registry(&self) -> Result<LoadedRegistry> {
        let config = self.load_config()?;
        let persister = self.persister(&config)?;
        let snapshot_path = persister.snapshot_path();

        let mut registry = TaskRegistry::new(config).with_persister(Box::new(persister));
        if let Some(destination) = &self.events {
            registry.subscribe(Box::new(destination.open()?));
        }
        let repairs = registry.load_snapshot()?;
        tracing::debug!(
            path = %snapshot_path.display(),
            tasks = registry.len(),
            repairs = repairs.len(),
            "loaded registry"
        );
        Ok(LoadedRegistry {
            registry,
            snapshot_path,
            repairs,
        })
    }

    /// Relative persist dirs resolve against the config file's directory.
    fn config_base(&self) -> Result<PathBuf> {
        match self.config.as_deref().and_then(Path::parent) {
            Some(parent) if !parent.as_os_str().is_empty() => Ok(parent.to_path_buf()),
            _ => self.base_dir(),
        }
    }
}

impl Cli {
    /// Execute the CLI command
    pub fn run(self) -> Result<()> {
        let context = Context {
            dir: self.dir,
            config: self.config,
            state_dir: self.state_dir,
            events: EventDestination::parse(self.events.as_deref()),
        };
        let json = self.json;
        let quiet = self.quiet;

        match self.command {
            Commands::Init { force } => init::run(init::InitOptions {
                context,
                force,
                json,
                quiet,
            }),
            Commands::Show { task } => show::run(show::ShowOptions {
                context,
                task,
                json,
                quiet,
            }),
            Commands::Chain { task } => chain::run(chain::ChainOptions {
                context,
                task,
                json,
                quiet,
            }),
            Commands::Check { write } => check::run(check::CheckOptions {
                context,
                write,
                json,
                quiet,
            }),
            Commands::Resolve {
                bounds,
                previous,
                min_width,
                min_height,
                stack,
            } => resolve::run(resolve::ResolveOptions {
                context,
                bounds,
                previous,
                min_width,
                min_height,
                stack,
                json,
                quiet,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn resolve_parses_bounds() {
        let cli = Cli::try_parse_from([
            "taskreg", "resolve", "--bounds", "0,0,400,300", "--stack", "docked",
        ])
        .expect("parse");
        match cli.command {
            Commands::Resolve { bounds, stack, .. } => {
                assert_eq!(bounds, Rect::new(0, 0, 400, 300));
                assert_eq!(stack, StackKind::Docked);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn explicit_config_dir_anchors_persist_dir() {
        let context = Context {
            dir: Some(PathBuf::from("/work")),
            config: Some(PathBuf::from("/etc/taskreg/.taskreg.toml")),
            state_dir: None,
            events: None,
        };
        let persister = context.persister(&Config::default()).expect("persister");
        assert_eq!(persister.dir(), Path::new("/etc/taskreg/.taskreg"));
    }
}
