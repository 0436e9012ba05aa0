//! Batch runs: discover modules, run one repair loop per module, and keep
//! every candidate and pytest log on disk.
//!
//! Layout of one run:
//!
//! ```text
//! runs/<timestamp>_<model>_<template>/
//!     summary.json
//!     module_001/
//!         module_001_test_raw.py
//!         pytest_log.txt
//!         module_001_test_repaired_1.py
//!         pytest_log_retry_1.txt
//!         module_001_test_final.py
//!         metadata.json
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Instant;

use chrono::{DateTime, Local};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Result, TinyTestError};
use crate::generation::GenerationClient;
use crate::output::{
    print_attempt_result, print_module_banner, print_module_line, print_phase_footer,
    print_state_transition, print_verbose_block, print_warning, BannerColor,
};
use crate::progress::CallSpinner;
use crate::runner::{LoopEvent, RepairLoop};
use crate::signal::SignalHandler;
use crate::target::{ModuleMetadata, TargetFunction};
use crate::template::Strategy;
use crate::validation::{FailureKind, TestValidator};

const MODULE_PREFIX: &str = "module_";
const SUMMARY_FILE: &str = "summary.json";
pub const MODULE_METADATA_FILE: &str = "metadata.json";

// ============================================================================
// Module discovery
// ============================================================================

/// Inclusive range of module numbers, e.g. `1-20`, `5-` or `-10`.
///
/// A single number such as `7` selects module 7 and everything after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ModuleRange {
    pub start: Option<u32>,
    pub end: Option<u32>,
}

impl ModuleRange {
    pub fn contains(&self, number: u32) -> bool {
        self.start.is_none_or(|start| number >= start) && self.end.is_none_or(|end| number <= end)
    }
}

impl FromStr for ModuleRange {
    type Err = TinyTestError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid =
            || TinyTestError::Config(format!("range `{}` must look like 1-20 (start-end)", s));
        let parse_bound = |part: &str| -> Result<Option<u32>> {
            let part = part.trim();
            if part.is_empty() {
                Ok(None)
            } else {
                part.parse().map(Some).map_err(|_| invalid())
            }
        };

        let (start, end) = match s.split_once('-') {
            Some((start, end)) => (parse_bound(start)?, parse_bound(end)?),
            None => (parse_bound(s)?, None),
        };
        if let (Some(start), Some(end)) = (start, end) {
            if start > end {
                return Err(invalid());
            }
        }
        Ok(Self { start, end })
    }
}

/// Numeric suffix of a module file, e.g. `module_012.py` -> 12.
pub fn module_number(path: &Path) -> Option<u32> {
    path.file_stem()?
        .to_str()?
        .rsplit('_')
        .next()?
        .parse()
        .ok()
}

/// Sorted `module_*.py` files in `dir`, filtered by `range`.
pub fn discover_modules(dir: &Path, range: Option<&ModuleRange>) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(TinyTestError::ModuleNotFound(dir.to_path_buf()));
    }

    let mut modules = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let is_module = path.is_file()
            && path.extension().is_some_and(|ext| ext == "py")
            && path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with(MODULE_PREFIX));
        if !is_module {
            continue;
        }
        if let Some(range) = range {
            match module_number(&path) {
                Some(number) if range.contains(number) => {}
                _ => continue,
            }
        }
        modules.push(path);
    }
    modules.sort();
    Ok(modules)
}

/// Build the target for a module file: its first top-level function, plus
/// the matching entry of `<metadata_dir>/<stem>.json` when present.
pub fn load_target(module_path: &Path, metadata_dir: Option<&Path>) -> Result<TargetFunction> {
    if !module_path.is_file() {
        return Err(TinyTestError::ModuleNotFound(module_path.to_path_buf()));
    }
    let stem = module_stem(module_path)?;
    let source = fs::read_to_string(module_path)?;
    let target = TargetFunction::from_source(stem, source)?;

    let metadata = match metadata_dir.map(|dir| dir.join(format!("{}.json", stem))) {
        Some(path) if path.is_file() => match ModuleMetadata::load(&path) {
            Ok(metadata) => metadata.function(target.function_name()).cloned(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring unreadable metadata");
                None
            }
        },
        _ => None,
    };

    Ok(target.with_metadata(metadata))
}

fn module_stem(path: &Path) -> Result<&str> {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .ok_or_else(|| {
            TinyTestError::InvalidTarget(format!("unusable module file name {}", path.display()))
        })
}

// ============================================================================
// Run directory and artifacts
// ============================================================================

/// Name of the candidate file written for `attempt` (1-based).
pub fn candidate_file_name(stem: &str, attempt: u32) -> String {
    if attempt <= 1 {
        format!("{}_test_raw.py", stem)
    } else {
        format!("{}_test_repaired_{}.py", stem, attempt - 1)
    }
}

/// Name of the pytest log written for `attempt` (1-based).
pub fn log_file_name(attempt: u32) -> String {
    if attempt <= 1 {
        "pytest_log.txt".to_string()
    } else {
        format!("pytest_log_retry_{}.txt", attempt - 1)
    }
}

pub fn final_file_name(stem: &str) -> String {
    format!("{}_test_final.py", stem)
}

/// `runs/<timestamp>_<model>_<template>/`, one per `tinytest run`.
#[derive(Debug, Clone)]
pub struct RunDirectory {
    root: PathBuf,
}

impl RunDirectory {
    pub fn create(runs_dir: &Path, model: &str, strategy: Strategy) -> Result<Self> {
        Self::create_at(runs_dir, model, strategy, Local::now())
    }

    fn create_at(
        runs_dir: &Path,
        model: &str,
        strategy: Strategy,
        timestamp: DateTime<Local>,
    ) -> Result<Self> {
        let name = format!(
            "{}_{}_{}",
            timestamp.format("%Y-%m-%d_%H-%M-%S"),
            sanitize_model_name(model),
            strategy
        );
        let root = runs_dir.join(name);
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn module_dir(&self, stem: &str) -> Result<PathBuf> {
        let dir = self.root.join(stem);
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    pub fn write_summary(&self, summary: &RunSummary) -> Result<PathBuf> {
        let path = self.root.join(SUMMARY_FILE);
        fs::write(&path, serde_json::to_string_pretty(summary)?)?;
        Ok(path)
    }
}

/// Model names like `llama3.2:1b` or `org/model` made safe for a directory name.
fn sanitize_model_name(model: &str) -> String {
    model
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '-'
            }
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttemptKind {
    Initial,
    Repair,
}

/// One generation call and what became of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub attempt: u32,
    pub kind: AttemptKind,
    pub strategy: Strategy,
    pub test_file: Option<PathBuf>,
    pub passed: bool,
    pub failure_type: Option<FailureKind>,
    pub generation_error: Option<String>,
}

/// Per-module `metadata.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleRecord {
    pub module: String,
    pub function: String,
    pub model: String,
    pub template: Strategy,
    pub attempts: Vec<AttemptRecord>,
    pub final_status: ModuleStatus,
    /// Failure class of the last validated candidate, unless it converged.
    #[serde(default)]
    pub final_failure_type: Option<FailureKind>,
    pub final_test_file: Option<PathBuf>,
}

/// Writes artifacts as loop events arrive.
///
/// Events cannot fail, so the first write error is kept and reported once
/// the loop has finished.
struct ArtifactRecorder {
    dir: PathBuf,
    stem: String,
    attempts: Vec<AttemptRecord>,
    error: Option<io::Error>,
}

impl ArtifactRecorder {
    fn new(dir: PathBuf, stem: &str) -> Self {
        Self {
            dir,
            stem: stem.to_string(),
            attempts: Vec::new(),
            error: None,
        }
    }

    fn record(&mut self, event: &LoopEvent<'_>) {
        match event {
            LoopEvent::Prompted { attempt, prompt } => {
                let kind = if prompt.strategy() == Strategy::AutoRepair {
                    AttemptKind::Repair
                } else {
                    AttemptKind::Initial
                };
                self.attempts.push(AttemptRecord {
                    attempt: *attempt,
                    kind,
                    strategy: prompt.strategy(),
                    test_file: None,
                    passed: false,
                    failure_type: None,
                    generation_error: None,
                });
            }
            LoopEvent::Generated { attempt, candidate } => {
                let path = self.dir.join(candidate_file_name(&self.stem, *attempt));
                if self.write(&path, candidate.source()) {
                    if let Some(record) = self.attempts.last_mut() {
                        record.test_file = Some(path);
                    }
                }
            }
            LoopEvent::GenerationFailed { error, .. } => {
                if let Some(record) = self.attempts.last_mut() {
                    record.generation_error = Some(error.to_string());
                }
            }
            LoopEvent::Validated { attempt, result } => {
                let path = self.dir.join(log_file_name(*attempt));
                self.write(&path, &result.log);
                if let Some(record) = self.attempts.last_mut() {
                    record.passed = result.passed;
                    record.failure_type = result.failure_kind();
                }
            }
            _ => {}
        }
    }

    fn write(&mut self, path: &Path, content: &str) -> bool {
        match fs::write(path, content) {
            Ok(()) => true,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to write artifact");
                if self.error.is_none() {
                    self.error = Some(e);
                }
                false
            }
        }
    }

    fn finish(self) -> Result<Vec<AttemptRecord>> {
        match self.error {
            Some(e) => Err(e.into()),
            None => Ok(self.attempts),
        }
    }
}

// ============================================================================
// Reports
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleStatus {
    Converged,
    NotConverged,
    Errored,
    Cancelled,
}

impl ModuleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModuleStatus::Converged => "converged",
            ModuleStatus::NotConverged => "not converged",
            ModuleStatus::Errored => "error",
            ModuleStatus::Cancelled => "cancelled",
        }
    }
}

/// Result of processing one module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleReport {
    pub module: String,
    pub function: Option<String>,
    pub status: ModuleStatus,
    pub attempts_used: u32,
    /// Failure class of the last validated candidate, if it failed.
    pub failure_type: Option<FailureKind>,
    pub error: Option<String>,
    pub duration_ms: u64,
    pub final_test_file: Option<PathBuf>,
}

impl ModuleReport {
    fn new(module: &str, status: ModuleStatus, started: Instant) -> Self {
        Self {
            module: module.to_string(),
            function: None,
            status,
            attempts_used: 0,
            failure_type: None,
            error: None,
            duration_ms: started.elapsed().as_millis() as u64,
            final_test_file: None,
        }
    }

    fn errored(module: &str, error: &TinyTestError, started: Instant) -> Self {
        Self {
            error: Some(error.to_string()),
            ..Self::new(module, ModuleStatus::Errored, started)
        }
    }
}

/// `summary.json` at the root of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub model: String,
    pub template: Strategy,
    pub max_attempts: u32,
    pub started_at: DateTime<Local>,
    pub finished_at: DateTime<Local>,
    pub modules: Vec<ModuleReport>,
}

impl RunSummary {
    pub fn count(&self, status: ModuleStatus) -> usize {
        self.modules.iter().filter(|m| m.status == status).count()
    }
}

// ============================================================================
// Pipeline
// ============================================================================

/// How much the pipeline prints while it runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayMode {
    Silent,
    /// One line per finished module; used when modules run in parallel.
    Compact,
    /// Banners, state transitions and spinners for one module at a time.
    /// `verbose` prints candidates and logs instead of spinners.
    Detailed { verbose: bool },
}

/// Runs a [`RepairLoop`] over many modules.
pub struct Pipeline<G, V> {
    repair_loop: RepairLoop<G, V>,
    model: String,
    strategy: Strategy,
    max_attempts: u32,
    metadata_dir: Option<PathBuf>,
    jobs: usize,
    display: DisplayMode,
    signal: Option<SignalHandler>,
}

impl<G, V> Pipeline<G, V>
where
    G: GenerationClient + Sync,
    V: TestValidator + Sync,
{
    pub fn new(
        repair_loop: RepairLoop<G, V>,
        model: impl Into<String>,
        strategy: Strategy,
        max_attempts: u32,
    ) -> Self {
        Self {
            repair_loop,
            model: model.into(),
            strategy,
            max_attempts,
            metadata_dir: None,
            jobs: 1,
            display: DisplayMode::Silent,
            signal: None,
        }
    }

    pub fn with_metadata_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.metadata_dir = dir;
        self
    }

    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    pub fn with_display(mut self, display: DisplayMode) -> Self {
        self.display = display;
        self
    }

    /// Cancel every loop, and skip modules not started yet, once `signal` is raised.
    pub fn with_signal_handler(mut self, signal: SignalHandler) -> Self {
        self.repair_loop = self.repair_loop.with_signal_handler(signal.clone());
        self.signal = Some(signal);
        self
    }

    /// Process `modules`, writing artifacts under `run_dir`. Reports come
    /// back in the order of `modules`.
    pub fn run(&self, modules: &[PathBuf], run_dir: &RunDirectory) -> Vec<ModuleReport> {
        if self.jobs <= 1 || modules.len() <= 1 {
            return modules
                .iter()
                .map(|module| self.process_module(module, run_dir))
                .collect();
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.jobs)
            .build();
        match pool {
            Ok(pool) => pool.install(|| {
                modules
                    .par_iter()
                    .map(|module| self.process_module(module, run_dir))
                    .collect()
            }),
            Err(e) => {
                warn!(error = %e, "could not build thread pool, running sequentially");
                modules
                    .iter()
                    .map(|module| self.process_module(module, run_dir))
                    .collect()
            }
        }
    }

    fn is_cancelled(&self) -> bool {
        self.signal
            .as_ref()
            .is_some_and(|signal| signal.is_shutdown_requested())
    }

    fn process_module(&self, module_path: &Path, run_dir: &RunDirectory) -> ModuleReport {
        let started = Instant::now();
        let stem = module_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        if self.is_cancelled() {
            return ModuleReport::new(&stem, ModuleStatus::Cancelled, started);
        }

        let report = match self.run_module(module_path, &stem, run_dir, started) {
            Ok(report) => report,
            Err(e) => {
                warn!(module = %stem, error = %e, "module failed");
                ModuleReport::errored(&stem, &e, started)
            }
        };

        match self.display {
            DisplayMode::Silent => {}
            DisplayMode::Compact => print_module_line(&report, self.max_attempts),
            DisplayMode::Detailed { .. } => {
                print_module_line(&report, self.max_attempts);
                print_phase_footer(banner_color(report.status));
            }
        }
        report
    }

    fn run_module(
        &self,
        module_path: &Path,
        stem: &str,
        run_dir: &RunDirectory,
        started: Instant,
    ) -> Result<ModuleReport> {
        let target = load_target(module_path, self.metadata_dir.as_deref())?;
        let module_dir = run_dir.module_dir(stem)?;
        debug!(module = stem, function = target.function_name(), "processing module");

        if let DisplayMode::Detailed { .. } = self.display {
            print_module_banner(stem, target.function_name());
        }

        let mut recorder = ArtifactRecorder::new(module_dir.clone(), stem);
        let mut spinner: Option<CallSpinner> = None;
        let outcome = self.repair_loop.run_with_events(
            &target,
            self.strategy,
            self.max_attempts,
            |event| {
                recorder.record(event);
                if let DisplayMode::Detailed { verbose } = self.display {
                    self.show_event(stem, event, verbose, &mut spinner);
                }
            },
        );
        drop(spinner);
        let attempts = recorder.finish()?;

        let mut report = ModuleReport::new(stem, ModuleStatus::NotConverged, started);
        report.function = Some(target.function_name().to_string());
        report.attempts_used = attempts.len() as u32;
        report.failure_type = attempts
            .iter()
            .rev()
            .find(|a| a.test_file.is_some())
            .and_then(|a| a.failure_type);

        match outcome {
            Ok(outcome) => {
                report.attempts_used = outcome.attempts_used;
                if outcome.converged {
                    report.status = ModuleStatus::Converged;
                    report.failure_type = None;
                    if let Some(candidate) = outcome.final_test_file {
                        let path = module_dir.join(final_file_name(stem));
                        fs::write(&path, candidate.into_source())?;
                        report.final_test_file = Some(path);
                    }
                }
            }
            Err(TinyTestError::Cancelled { attempts_used }) => {
                report.status = ModuleStatus::Cancelled;
                report.attempts_used = attempts_used;
            }
            Err(e) => {
                report.status = ModuleStatus::Errored;
                report.error = Some(e.to_string());
            }
        }

        let record = ModuleRecord {
            module: format!("{}.py", stem),
            function: target.function_name().to_string(),
            model: self.model.clone(),
            template: self.strategy,
            attempts,
            final_status: report.status,
            final_failure_type: report.failure_type,
            final_test_file: report.final_test_file.clone(),
        };
        fs::write(
            module_dir.join(MODULE_METADATA_FILE),
            serde_json::to_string_pretty(&record)?,
        )?;

        report.duration_ms = started.elapsed().as_millis() as u64;
        Ok(report)
    }

    fn show_event(
        &self,
        stem: &str,
        event: &LoopEvent<'_>,
        verbose: bool,
        spinner: &mut Option<CallSpinner>,
    ) {
        match event {
            LoopEvent::Transition { from, to } => print_state_transition(*from, *to),
            LoopEvent::Prompted { attempt, prompt } => {
                if verbose {
                    print_verbose_block(
                        &format!("prompt ({}, attempt {})", prompt.strategy(), attempt),
                        prompt.as_str(),
                    );
                } else {
                    *spinner = Some(CallSpinner::new_for_generation(
                        stem,
                        *attempt,
                        self.max_attempts,
                    ));
                }
            }
            LoopEvent::Generated { candidate, .. } => {
                let message = format!("{} test functions", candidate.test_names().len());
                match spinner.take() {
                    Some(s) => s.finish_success(&message),
                    None => print_verbose_block("candidate", candidate.source()),
                }
            }
            LoopEvent::GenerationFailed { error, .. } => match spinner.take() {
                Some(s) => s.finish_error(&error.to_string()),
                None => print_warning(&format!("generation failed: {}", error)),
            },
            LoopEvent::Rejected { defect, .. } => {
                print_warning(&format!("candidate rejected without running: {}", defect));
            }
            LoopEvent::Validating { attempt } => {
                if !verbose {
                    *spinner = Some(CallSpinner::new_for_validation(
                        stem,
                        *attempt,
                        self.max_attempts,
                    ));
                }
            }
            LoopEvent::Validated { attempt, result } => {
                *spinner = None;
                print_attempt_result(*attempt, self.max_attempts, result);
                if verbose && !result.passed {
                    print_verbose_block("pytest log", &result.log);
                }
            }
        }
    }
}

fn banner_color(status: ModuleStatus) -> BannerColor {
    match status {
        ModuleStatus::Converged => BannerColor::Green,
        ModuleStatus::NotConverged | ModuleStatus::Cancelled => BannerColor::Yellow,
        ModuleStatus::Errored => BannerColor::Red,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidate::CandidateTestFile;
    use crate::generation::GenerationError;
    use crate::render::{PromptRenderer, RenderedPrompt};
    use crate::template::{TemplateRegistry, DEFAULT_PACKAGE};
    use crate::validation::{ValidationError, ValidationResult};
    use chrono::TimeZone;
    use std::collections::BTreeSet;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Answers with a correct test file for whatever function the prompt names.
    struct EchoClient {
        calls: Mutex<u32>,
    }

    impl GenerationClient for EchoClient {
        fn generate(
            &self,
            prompt: &RenderedPrompt,
        ) -> std::result::Result<String, GenerationError> {
            *self.calls.lock().unwrap() += 1;
            let import = prompt
                .as_str()
                .lines()
                .find_map(|line| line.split("MUST be exactly: ").nth(1))
                .unwrap_or("")
                .to_string();
            Ok(format!("{}\n\ndef test_it():\n    assert True\n", import))
        }
    }

    /// Fails the first validation of every module, passes the rest.
    struct FlakyValidator {
        seen: Mutex<BTreeSet<String>>,
    }

    impl TestValidator for FlakyValidator {
        fn validate(
            &self,
            _candidate: &CandidateTestFile,
            target: &TargetFunction,
        ) -> std::result::Result<ValidationResult, ValidationError> {
            let first = self
                .seen
                .lock()
                .unwrap()
                .insert(target.module_name().to_string());
            if first {
                Ok(ValidationResult::failed(
                    ["test_it".to_string()].into(),
                    "FAILED t.py::test_it - assert False\n1 failed",
                ))
            } else {
                Ok(ValidationResult::passed("1 passed"))
            }
        }
    }

    fn pipeline(max_attempts: u32, jobs: usize) -> Pipeline<EchoClient, FlakyValidator> {
        let repair_loop = RepairLoop::new(
            PromptRenderer::new(TemplateRegistry::new(DEFAULT_PACKAGE).unwrap()),
            EchoClient {
                calls: Mutex::new(0),
            },
            FlakyValidator {
                seen: Mutex::new(BTreeSet::new()),
            },
        );
        Pipeline::new(repair_loop, "phi3", Strategy::FewShot, max_attempts).with_jobs(jobs)
    }

    fn write_modules(dir: &Path, count: u32) {
        for i in 1..=count {
            fs::write(
                dir.join(format!("module_{:03}.py", i)),
                format!("def func_{}(x):\n    return x + {}\n", i, i),
            )
            .unwrap();
        }
    }

    #[test]
    fn test_module_range_parsing() {
        assert_eq!(
            "1-20".parse::<ModuleRange>().unwrap(),
            ModuleRange {
                start: Some(1),
                end: Some(20)
            }
        );
        assert_eq!(
            "5-".parse::<ModuleRange>().unwrap(),
            ModuleRange {
                start: Some(5),
                end: None
            }
        );
        assert_eq!(
            "-3".parse::<ModuleRange>().unwrap(),
            ModuleRange {
                start: None,
                end: Some(3)
            }
        );
        assert_eq!(
            "7".parse::<ModuleRange>().unwrap(),
            ModuleRange {
                start: Some(7),
                end: None
            }
        );
        assert!("a-b".parse::<ModuleRange>().is_err());
        assert!("9-2".parse::<ModuleRange>().is_err());
    }

    #[test]
    fn test_module_range_contains_is_inclusive() {
        let range = ModuleRange {
            start: Some(2),
            end: Some(4),
        };
        assert!(!range.contains(1));
        assert!(range.contains(2));
        assert!(range.contains(4));
        assert!(!range.contains(5));
        assert!(ModuleRange::default().contains(999));
    }

    #[test]
    fn test_module_number() {
        assert_eq!(module_number(Path::new("data/module_012.py")), Some(12));
        assert_eq!(module_number(Path::new("module_abc.py")), None);
    }

    #[test]
    fn test_discover_modules_sorted_and_filtered() {
        let dir = TempDir::new().unwrap();
        write_modules(dir.path(), 4);
        fs::write(dir.path().join("helper.py"), "def h(): pass\n").unwrap();
        fs::write(dir.path().join("module_notes.txt"), "").unwrap();

        let all = discover_modules(dir.path(), None).unwrap();
        let names: Vec<_> = all
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            vec!["module_001.py", "module_002.py", "module_003.py", "module_004.py"]
        );

        let range: ModuleRange = "2-3".parse().unwrap();
        let some = discover_modules(dir.path(), Some(&range)).unwrap();
        assert_eq!(some.len(), 2);
        assert!(some[0].ends_with("module_002.py"));
    }

    #[test]
    fn test_discover_modules_missing_dir() {
        let err = discover_modules(Path::new("/nonexistent/tinytest/modules"), None).unwrap_err();
        assert!(matches!(err, TinyTestError::ModuleNotFound(_)));
    }

    #[test]
    fn test_load_target_with_metadata() {
        let dir = TempDir::new().unwrap();
        let modules = dir.path().join("modules");
        let metadata = dir.path().join("metadata");
        fs::create_dir_all(&modules).unwrap();
        fs::create_dir_all(&metadata).unwrap();
        fs::write(
            modules.join("module_001.py"),
            "import math\n\ndef circle_area(r):\n    return math.pi * r * r\n",
        )
        .unwrap();
        fs::write(
            metadata.join("module_001.json"),
            r#"{"functions": [{"name": "circle_area", "args": [{"name": "r"}], "returns": "float"}]}"#,
        )
        .unwrap();

        let target =
            load_target(&modules.join("module_001.py"), Some(metadata.as_path())).unwrap();
        assert_eq!(target.module_name(), "module_001");
        assert_eq!(target.function_name(), "circle_area");
        assert_eq!(
            target.metadata().unwrap().hint(),
            "HINT - Function: circle_area, Args: r, Returns: float"
        );

        let without = load_target(&modules.join("module_001.py"), None).unwrap();
        assert!(without.metadata().is_none());
    }

    #[test]
    fn test_load_target_ignores_broken_metadata() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("module_002.py"), "def f(x):\n    return x\n").unwrap();
        fs::write(dir.path().join("module_002.json"), "{oops").unwrap();
        let target = load_target(&dir.path().join("module_002.py"), Some(dir.path())).unwrap();
        assert!(target.metadata().is_none());
    }

    #[test]
    fn test_artifact_file_names() {
        assert_eq!(candidate_file_name("module_001", 1), "module_001_test_raw.py");
        assert_eq!(
            candidate_file_name("module_001", 3),
            "module_001_test_repaired_2.py"
        );
        assert_eq!(log_file_name(1), "pytest_log.txt");
        assert_eq!(log_file_name(2), "pytest_log_retry_1.txt");
        assert_eq!(final_file_name("module_001"), "module_001_test_final.py");
    }

    #[test]
    fn test_run_directory_name() {
        let runs = TempDir::new().unwrap();
        let timestamp = Local.with_ymd_and_hms(2025, 3, 4, 5, 6, 7).unwrap();
        let run_dir =
            RunDirectory::create_at(runs.path(), "llama3.2:1b", Strategy::Structured, timestamp)
                .unwrap();
        assert_eq!(
            run_dir.root().file_name().unwrap(),
            "2025-03-04_05-06-07_llama3.2-1b_structured"
        );
        assert!(run_dir.root().is_dir());
    }

    #[test]
    fn test_pipeline_writes_artifacts_for_repaired_module() {
        let work = TempDir::new().unwrap();
        let modules = work.path().join("modules");
        fs::create_dir_all(&modules).unwrap();
        write_modules(&modules, 1);
        let run_dir = RunDirectory::create(&work.path().join("runs"), "phi3", Strategy::FewShot)
            .unwrap();

        let paths = discover_modules(&modules, None).unwrap();
        let reports = pipeline(3, 1).run(&paths, &run_dir);

        assert_eq!(reports.len(), 1);
        let report = &reports[0];
        assert_eq!(report.status, ModuleStatus::Converged);
        assert_eq!(report.attempts_used, 2);
        assert_eq!(report.function.as_deref(), Some("func_1"));

        let dir = run_dir.root().join("module_001");
        for name in [
            "module_001_test_raw.py",
            "pytest_log.txt",
            "module_001_test_repaired_1.py",
            "pytest_log_retry_1.txt",
            "module_001_test_final.py",
            "metadata.json",
        ] {
            assert!(dir.join(name).is_file(), "missing {}", name);
        }
        assert!(fs::read_to_string(dir.join("module_001_test_raw.py"))
            .unwrap()
            .starts_with("from data.modules.module_001 import func_1"));

        let record: ModuleRecord =
            serde_json::from_str(&fs::read_to_string(dir.join("metadata.json")).unwrap()).unwrap();
        assert_eq!(record.attempts.len(), 2);
        assert_eq!(record.attempts[0].kind, AttemptKind::Initial);
        assert_eq!(
            record.attempts[0].failure_type,
            Some(FailureKind::AssertionFailure)
        );
        assert_eq!(record.attempts[1].kind, AttemptKind::Repair);
        assert!(record.attempts[1].passed);
        assert_eq!(record.final_status, ModuleStatus::Converged);
        assert_eq!(record.final_failure_type, None);
    }

    #[test]
    fn test_pipeline_single_attempt_does_not_converge() {
        let work = TempDir::new().unwrap();
        write_modules(work.path(), 1);
        let run_dir = RunDirectory::create(&work.path().join("runs"), "phi3", Strategy::FewShot)
            .unwrap();
        let reports = pipeline(1, 1).run(&discover_modules(work.path(), None).unwrap(), &run_dir);

        assert_eq!(reports[0].status, ModuleStatus::NotConverged);
        assert_eq!(reports[0].attempts_used, 1);
        assert_eq!(reports[0].failure_type, Some(FailureKind::AssertionFailure));
        let dir = run_dir.root().join("module_001");
        assert!(!dir.join("module_001_test_final.py").exists());

        let record: ModuleRecord =
            serde_json::from_str(&fs::read_to_string(dir.join(MODULE_METADATA_FILE)).unwrap())
                .unwrap();
        assert_eq!(record.final_status, ModuleStatus::NotConverged);
        assert_eq!(
            record.final_failure_type,
            Some(FailureKind::AssertionFailure)
        );
    }

    #[test]
    fn test_pipeline_parallel_keeps_module_order() {
        let work = TempDir::new().unwrap();
        write_modules(work.path(), 6);
        let run_dir = RunDirectory::create(&work.path().join("runs"), "phi3", Strategy::FewShot)
            .unwrap();
        let paths = discover_modules(work.path(), None).unwrap();
        let reports = pipeline(2, 3).run(&paths, &run_dir);

        let modules: Vec<_> = reports.iter().map(|r| r.module.as_str()).collect();
        assert_eq!(
            modules,
            vec![
                "module_001",
                "module_002",
                "module_003",
                "module_004",
                "module_005",
                "module_006"
            ]
        );
        assert!(reports.iter().all(|r| r.status == ModuleStatus::Converged));
    }

    #[test]
    fn test_pipeline_reports_unloadable_module_as_error() {
        let work = TempDir::new().unwrap();
        fs::write(work.path().join("module_001.py"), "VALUE = 1\n").unwrap();
        let run_dir = RunDirectory::create(&work.path().join("runs"), "phi3", Strategy::FewShot)
            .unwrap();
        let reports = pipeline(2, 1).run(&discover_modules(work.path(), None).unwrap(), &run_dir);

        assert_eq!(reports[0].status, ModuleStatus::Errored);
        assert!(reports[0].error.as_deref().unwrap().contains("no function definition"));
    }

    #[test]
    fn test_pipeline_cancelled_skips_modules() {
        let work = TempDir::new().unwrap();
        write_modules(work.path(), 2);
        let run_dir = RunDirectory::create(&work.path().join("runs"), "phi3", Strategy::FewShot)
            .unwrap();
        let signal = SignalHandler::detached();
        signal.request_shutdown();
        let reports = pipeline(2, 1)
            .with_signal_handler(signal)
            .run(&discover_modules(work.path(), None).unwrap(), &run_dir);

        assert!(reports.iter().all(|r| r.status == ModuleStatus::Cancelled));
        assert!(!run_dir.root().join("module_001").exists());
    }

    #[test]
    fn test_run_summary_serialization_and_counts() {
        let work = TempDir::new().unwrap();
        let run_dir = RunDirectory::create(work.path(), "phi3", Strategy::ZeroShot).unwrap();
        let started = Instant::now();
        let summary = RunSummary {
            model: "phi3".to_string(),
            template: Strategy::ZeroShot,
            max_attempts: 3,
            started_at: Local::now(),
            finished_at: Local::now(),
            modules: vec![
                ModuleReport::new("module_001", ModuleStatus::Converged, started),
                ModuleReport::new("module_002", ModuleStatus::NotConverged, started),
                ModuleReport::new("module_003", ModuleStatus::Converged, started),
            ],
        };
        assert_eq!(summary.count(ModuleStatus::Converged), 2);
        assert_eq!(summary.count(ModuleStatus::Errored), 0);

        let path = run_dir.write_summary(&summary).unwrap();
        let text = fs::read_to_string(path).unwrap();
        assert!(text.contains("\"not_converged\""));
        assert!(text.contains("\"zero_shot\""));
    }
}
