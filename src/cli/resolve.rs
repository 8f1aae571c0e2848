//! taskreg resolve command implementation
//!
//! Runs the minimum-size pass and configuration computation the registry
//! applies when a task is resized, without touching any snapshot.

use serde::Serialize;

use crate::cli::Context;
use crate::configuration::{Configuration, ConfigurationResolver};
use crate::error::{Error, Result};
use crate::geometry::{Rect, MAX_COORDINATE};
use crate::output::{emit_success, HumanOutput, OutputOptions};
use crate::stack::StackKind;

pub struct ResolveOptions {
    pub context: Context,
    pub bounds: Rect,
    pub previous: Option<Rect>,
    pub min_width: Option<i32>,
    pub min_height: Option<i32>,
    pub stack: StackKind,
    pub json: bool,
    pub quiet: bool,
}

#[derive(Serialize)]
struct ResolveReport {
    stack: StackKind,
    requested: Rect,
    /// None when the stack only holds fullscreen tasks.
    bounds: Option<Rect>,
    width_adjusted: bool,
    height_adjusted: bool,
    configuration: Configuration,
}

pub fn run(options: ResolveOptions) -> Result<()> {
    if options.bounds.is_empty() {
        return Err(Error::InvalidArgument(format!(
            "bounds {} enclose no area",
            options.bounds
        )));
    }

    for (name, value) in [
        ("--min-width", options.min_width),
        ("--min-height", options.min_height),
    ] {
        if let Some(value) = value.filter(|value| !(0..=MAX_COORDINATE).contains(value)) {
            return Err(Error::InvalidArgument(format!(
                "{name} {value} must be between 0 and {MAX_COORDINATE}"
            )));
        }
    }

    let config = options.context.load_config()?;
    let resolver = ConfigurationResolver::from_config(&config);
    let display = resolver.display_configuration();
    let requested = options.bounds;

    let report = if options.stack.is_multi_window() {
        // Pinned stacks are sized by the system; only explicit minimums apply.
        let use_default = options.stack != StackKind::Pinned;
        let adjusted = resolver.adjust_for_minimal_dimensions(
            &requested,
            options.previous.as_ref(),
            options.min_width,
            options.min_height,
            use_default,
        );
        let width_adjusted = adjusted.right != requested.right;
        let height_adjusted = adjusted.bottom != requested.bottom;
        ResolveReport {
            stack: options.stack,
            requested,
            bounds: Some(adjusted),
            width_adjusted,
            height_adjusted,
            configuration: resolver.compute_override_configuration(
                &adjusted,
                None,
                &display,
                width_adjusted,
                height_adjusted,
            ),
        }
    } else {
        ResolveReport {
            stack: options.stack,
            requested,
            bounds: None,
            width_adjusted: false,
            height_adjusted: false,
            configuration: display,
        }
    };

    let configuration = &report.configuration;
    let mut human = HumanOutput::new(format!("taskreg resolve {requested}"));
    human.push_summary("stack", report.stack.to_string());
    human.push_summary(
        "bounds",
        report
            .bounds
            .map(|bounds| bounds.to_string())
            .unwrap_or_else(|| "fullscreen".to_string()),
    );
    human.push_summary(
        "screen",
        format!(
            "{}x{}dp (smallest {}dp)",
            configuration.screen_width_dp,
            configuration.screen_height_dp,
            configuration.smallest_screen_width_dp
        ),
    );
    human.push_summary("density", format!("{}dpi", configuration.density_dpi));
    human.push_summary("orientation", configuration.orientation.to_string());
    human.push_summary("layout", configuration.screen_layout.size.to_string());
    if report.width_adjusted || report.height_adjusted {
        human.push_detail("bounds grown to the minimum task size");
    }
    if !options.stack.is_multi_window() {
        human.push_warning(format!(
            "{} stacks ignore task bounds",
            options.stack
        ));
    }

    emit_success(
        OutputOptions {
            json: options.json,
            quiet: options.quiet,
        },
        "resolve",
        &report,
        Some(&human),
    )
}
