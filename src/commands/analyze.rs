//! Analyze command handler.
//!
//! Aggregates the `metadata.json` records of every past run.

use std::path::PathBuf;

use crate::analysis::{analyze_runs, RunAnalysis};
use crate::config::{get_effective_config, Config};
use crate::error::Result;
use crate::output::{print_analysis, print_info, print_module_list};
use crate::pipeline::ModuleStatus;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnalyzeOptions {
    /// Overrides the configured `runs_dir`.
    pub runs_dir: Option<PathBuf>,
    pub list_passed: bool,
    pub list_failed: bool,
    /// Write the full statistics as JSON here.
    pub output: Option<PathBuf>,
}

impl AnalyzeOptions {
    fn runs_dir(&self, config: &Config) -> PathBuf {
        self.runs_dir
            .clone()
            .unwrap_or_else(|| config.runs_dir.clone())
    }
}

/// Analyze the runs selected by `options` and write the JSON report if asked.
pub fn analyze(options: &AnalyzeOptions, config: &Config) -> Result<RunAnalysis> {
    let analysis = analyze_runs(&options.runs_dir(config))?;
    if let Some(path) = &options.output {
        analysis.write_json(path)?;
    }
    Ok(analysis)
}

pub fn analyze_command(options: &AnalyzeOptions) -> Result<()> {
    let (config, _) = get_effective_config()?;
    let analysis = analyze(options, &config)?;

    print_info(&format!(
        "Found {} module record(s) under {}",
        analysis.total_modules + analysis.unreadable.len(),
        options.runs_dir(&config).display()
    ));
    if analysis.total_modules == 0 {
        print_info("No module records to analyze.");
        return Ok(());
    }

    print_analysis(&analysis);
    if options.list_passed {
        print_module_list(
            "Converged modules",
            analysis.modules_with(ModuleStatus::Converged),
        );
    }
    if options.list_failed {
        print_module_list(
            "Modules that did not converge",
            analysis.modules_with(ModuleStatus::NotConverged),
        );
    }
    if let Some(path) = &options.output {
        print_info(&format!("Detailed stats saved to {}", path.display()));
    }
    Ok(())
}
