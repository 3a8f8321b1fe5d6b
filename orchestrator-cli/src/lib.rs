//! Command-line front end: arg parsing, config loading, logger setup, and
//! the top-level run loop over all missions.
//!
//! Grounded on `av1an_cli::run`'s shape (`CliOpts::parse` -> build config
//! -> init logger -> drive the engine -> map errors to an exit code), with
//! the mission loop generalized from one encode to a batch.

mod args;
mod config;
mod exit;
mod logging;

use clap::Parser;
use log::{error, info, warn};

use orchestrator_core::mission_planner::{self, title_concurrency};
use orchestrator_core::state::mission::{MissionConfigDocument, ParameterTemplatesDocument};
use orchestrator_core::title_pipeline::{ToolPaths, TitlePipeline};

pub use args::CliOpts;

pub fn main() -> anyhow::Result<()> {
    let code = run()?;
    std::process::exit(code);
}

fn run() -> anyhow::Result<i32> {
    let cli = CliOpts::parse();

    let document: MissionConfigDocument = config::load_document(&cli.config)?;
    let templates: ParameterTemplatesDocument = match &cli.templates {
        Some(path) => config::load_document(path)?,
        None => ParameterTemplatesDocument::default(),
    };

    let log_file = cli
        .log_file
        .clone()
        .unwrap_or_else(|| std::env::temp_dir().join("transcode-orchestrator.log"));
    logging::init(&log_file, cli.log_level)?;

    match drive(&document, &templates, cli.dry_run) {
        Ok(()) => Ok(exit::EXIT_OK),
        Err(err) => {
            error!("{err:#}");
            Ok(exit::exit_code_for(&err))
        }
    }
}

/// Plan every mission, validate, and (unless `dry_run`) hand each resolved
/// title to the pipeline. `fail_fast` from `basic_config` controls whether
/// the first title failure aborts the remaining batch (spec §6, §7).
fn drive(document: &MissionConfigDocument, templates: &ParameterTemplatesDocument, dry_run: bool) -> anyhow::Result<()> {
    let titles = mission_planner::plan_batch(&document.all_mission_config, templates)?;
    info!("planned {} title(s)", titles.len());

    let concurrency = document
        .all_mission_config
        .iter()
        .any(|m| matches!(m, orchestrator_core::state::mission::Mission::Single(s) if s.universal.thread_bool)
            || matches!(m, orchestrator_core::state::mission::Mission::Series(s) if s.universal.thread_bool));
    info!("title concurrency: {}", title_concurrency(concurrency));

    if dry_run {
        for title in &titles {
            info!("would process {} -> {}", title.input.display(), title.output_name);
        }
        return Ok(());
    }

    let tools = ToolPaths::resolve(document.basic_config.tool_directory.as_deref())?;

    let mut failures = Vec::new();
    for title in &titles {
        info!("processing {}", title.input.display());
        let pipeline = TitlePipeline::new(title.universal.cache_dir.clone(), &title.universal);
        match pipeline.run_title(&tools, templates, title) {
            Ok(outcome) => info!("produced {}", outcome.output_path.display()),
            Err(err) => {
                warn!("title {} failed: {err}", title.input.display());
                if document.basic_config.fail_fast {
                    return Err(err.into());
                }
                failures.push(err);
            }
        }
    }

    if let Some(first) = failures.into_iter().next() {
        return Err(first.into());
    }
    Ok(())
}
