//! taskreg init command implementation
//!
//! Writes a default `.taskreg.toml` and creates the snapshot directory.

use std::path::{Path, PathBuf};

use crate::cli::Context;
use crate::config::Config;
use crate::error::Result;
use crate::output::{emit_success, HumanOutput, OutputOptions};

pub struct InitOptions {
    pub context: Context,
    pub force: bool,
    pub json: bool,
    pub quiet: bool,
}

#[derive(serde::Serialize)]
struct InitReport {
    config: PathBuf,
    state_dir: PathBuf,
    created: InitCreated,
}

#[derive(serde::Serialize)]
struct InitCreated {
    config: bool,
    state_dir: bool,
}

pub fn run(options: InitOptions) -> Result<()> {
    let config_path = options.context.config_path()?;
    let write_config = options.force || !config_path.exists();

    let config = if write_config {
        let config = Config::default();
        if let Some(parent) = config_path.parent() {
            ensure_dir(parent)?;
        }
        config.save(&config_path)?;
        config
    } else {
        Config::load(&config_path)?
    };

    let persister = options.context.persister(&config)?;
    let created_state_dir = ensure_dir(persister.dir())?;

    let report = InitReport {
        config: config_path.clone(),
        state_dir: persister.dir().to_path_buf(),
        created: InitCreated {
            config: write_config,
            state_dir: created_state_dir,
        },
    };

    let mut human = HumanOutput::new("taskreg init");
    human.push_summary("config", config_path.display().to_string());
    human.push_summary("state dir", persister.dir().display().to_string());
    if !write_config && !created_state_dir {
        human.push_detail("already initialized");
    }
    if write_config {
        human.push_detail(format!("wrote {}", config_path.display()));
    }
    if created_state_dir {
        human.push_detail(format!("created {}", persister.dir().display()));
    }
    human.push_next_step("taskreg show");

    emit_success(
        OutputOptions {
            json: options.json,
            quiet: options.quiet,
        },
        "init",
        &report,
        Some(&human),
    )
}

fn ensure_dir(path: &Path) -> Result<bool> {
    if path.as_os_str().is_empty() || path.exists() {
        return Ok(false);
    }
    std::fs::create_dir_all(path)?;
    Ok(true)
}
