//! Run command handler.
//!
//! Generates, validates and repairs tests for every selected module and
//! records the outcome under a fresh run directory.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use chrono::Local;
use tracing::debug;

use crate::config::{get_effective_config, validate_config, Config};
use crate::error::{Result, TinyTestError};
use crate::ollama::OllamaClient;
use crate::output::{
    print_header, print_interrupted, print_run_complete, print_run_info, print_run_summary,
    print_warning,
};
use crate::pipeline::{discover_modules, DisplayMode, ModuleRange, Pipeline, RunDirectory, RunSummary};
use crate::pytest::PytestValidator;
use crate::runner::RepairLoop;
use crate::signal::SignalHandler;

use super::build_renderer;

/// Command-line overrides for `tinytest run`. `None` keeps the configured value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunOptions {
    pub model: Option<String>,
    pub template: Option<String>,
    pub max_attempts: Option<u32>,
    pub range: Option<ModuleRange>,
    pub jobs: Option<usize>,
    pub modules_dir: Option<PathBuf>,
    pub runs_dir: Option<PathBuf>,
    pub templates_dir: Option<PathBuf>,
    pub verbose: bool,
    pub no_hint: bool,
}

impl RunOptions {
    pub fn apply_to(&self, config: &mut Config) {
        if let Some(model) = &self.model {
            config.model = model.clone();
        }
        if let Some(template) = &self.template {
            config.template = template.clone();
        }
        if let Some(max_attempts) = self.max_attempts {
            config.max_attempts = max_attempts;
        }
        if let Some(jobs) = self.jobs {
            config.jobs = jobs;
        }
        if let Some(dir) = &self.modules_dir {
            config.modules_dir = dir.clone();
        }
        if let Some(dir) = &self.runs_dir {
            config.runs_dir = dir.clone();
        }
        if let Some(dir) = &self.templates_dir {
            config.templates_dir = Some(dir.clone());
        }
        if self.no_hint {
            config.signature_hint = false;
        }
    }

    fn display_mode(&self, config: &Config) -> DisplayMode {
        if config.jobs > 1 {
            DisplayMode::Compact
        } else {
            DisplayMode::Detailed {
                verbose: self.verbose,
            }
        }
    }
}

/// Run the pipeline over the modules selected by the effective config and
/// `options`.
///
/// Returns [`TinyTestError::Cancelled`] when the run was interrupted; the
/// summary and every artifact written so far are kept.
pub fn run_command(options: &RunOptions, signal: SignalHandler) -> Result<()> {
    let (mut config, source) = get_effective_config()?;
    debug!(%source, "loaded configuration");
    options.apply_to(&mut config);
    validate_config(&config).map_err(|e| TinyTestError::Config(e.to_string()))?;
    let strategy = config.strategy()?;

    let modules = discover_modules(&config.modules_dir, options.range.as_ref())?;
    if modules.is_empty() {
        print_warning(&format!(
            "no module_*.py files selected in {}",
            config.modules_dir.display()
        ));
        return Ok(());
    }

    let client = OllamaClient::new(config.model.as_str())
        .with_program(config.generator_command.as_str())
        .with_timeout(Duration::from_secs(config.generation_timeout_secs));
    let validator = PytestValidator::new(std::env::current_dir()?)
        .with_command(&config.pytest_command)
        .with_timeout(Duration::from_secs(config.validation_timeout_secs));
    let repair_loop = RepairLoop::new(build_renderer(&config)?, client, validator);

    let pipeline = Pipeline::new(
        repair_loop,
        config.model.as_str(),
        strategy,
        config.max_attempts,
    )
    .with_metadata_dir(Some(config.metadata_dir.clone()))
    .with_jobs(config.jobs)
    .with_display(options.display_mode(&config))
    .with_signal_handler(signal.clone());

    let run_dir = RunDirectory::create(&config.runs_dir, &config.model, strategy)?;
    print_header();
    print_run_info(
        &config.model,
        strategy,
        config.max_attempts,
        modules.len(),
        run_dir.root(),
    );

    let started_at = Local::now();
    let timer = Instant::now();
    let reports = pipeline.run(&modules, &run_dir);

    let summary = RunSummary {
        model: config.model.clone(),
        template: strategy,
        max_attempts: config.max_attempts,
        started_at,
        finished_at: Local::now(),
        modules: reports,
    };
    run_dir.write_summary(&summary)?;
    print_run_summary(&summary, timer.elapsed().as_secs());

    if signal.is_shutdown_requested() {
        print_interrupted(run_dir.root());
        return Err(TinyTestError::Cancelled {
            attempts_used: summary.modules.iter().map(|m| m.attempts_used).sum(),
        });
    }

    print_run_complete(run_dir.root());
    Ok(())
}
