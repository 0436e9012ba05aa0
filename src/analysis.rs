//! Aggregate statistics over every `metadata.json` under a runs directory.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{Result, TinyTestError};
use crate::pipeline::{ModuleRecord, ModuleStatus, MODULE_METADATA_FILE};
use crate::template::Strategy;
use crate::validation::FailureKind;

/// Converged count out of a total.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Tally {
    pub total: usize,
    pub converged: usize,
}

impl Tally {
    fn add(&mut self, status: ModuleStatus) {
        self.total += 1;
        if status == ModuleStatus::Converged {
            self.converged += 1;
        }
    }

    pub fn failed(&self) -> usize {
        self.total - self.converged
    }

    pub fn percent(&self) -> f64 {
        percent(self.converged, self.total)
    }
}

/// One module of one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModuleEntry {
    pub module: String,
    pub function: String,
    pub model: String,
    pub template: Strategy,
    pub status: ModuleStatus,
    pub failure_type: Option<FailureKind>,
    /// `metadata.json` path relative to the runs directory.
    pub path: PathBuf,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunAnalysis {
    pub total_modules: usize,
    pub by_status: BTreeMap<ModuleStatus, usize>,
    pub by_failure_type: BTreeMap<FailureKind, usize>,
    pub by_model: BTreeMap<String, Tally>,
    pub by_template: BTreeMap<Strategy, Tally>,
    pub modules: Vec<ModuleEntry>,
    /// Records that could not be read or parsed.
    pub unreadable: Vec<PathBuf>,
}

impl RunAnalysis {
    pub fn count(&self, status: ModuleStatus) -> usize {
        self.by_status.get(&status).copied().unwrap_or(0)
    }

    pub fn percent(&self, status: ModuleStatus) -> f64 {
        percent(self.count(status), self.total_modules)
    }

    /// Failure types, most frequent first; ties keep their natural order.
    pub fn failure_types_by_frequency(&self) -> Vec<(FailureKind, usize)> {
        let mut counts: Vec<_> = self
            .by_failure_type
            .iter()
            .map(|(kind, count)| (*kind, *count))
            .collect();
        counts.sort_by(|a, b| b.1.cmp(&a.1));
        counts
    }

    pub fn modules_with(&self, status: ModuleStatus) -> impl Iterator<Item = &ModuleEntry> {
        self.modules.iter().filter(move |m| m.status == status)
    }

    fn add(&mut self, record: ModuleRecord, path: PathBuf) {
        let status = record.final_status;
        self.total_modules += 1;
        *self.by_status.entry(status).or_insert(0) += 1;
        if let Some(kind) = record.final_failure_type {
            *self.by_failure_type.entry(kind).or_insert(0) += 1;
        }
        self.by_model
            .entry(record.model.clone())
            .or_default()
            .add(status);
        self.by_template
            .entry(record.template)
            .or_default()
            .add(status);

        self.modules.push(ModuleEntry {
            module: record.module,
            function: record.function,
            model: record.model,
            template: record.template,
            status,
            failure_type: record.final_failure_type,
            path,
        });
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

fn percent(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 * 100.0 / total as f64
    }
}

/// Read every module record below `runs_dir`, in path order.
///
/// Unreadable records are skipped and listed in `unreadable`.
pub fn analyze_runs(runs_dir: &Path) -> Result<RunAnalysis> {
    if !runs_dir.is_dir() {
        return Err(TinyTestError::RunsNotFound(runs_dir.to_path_buf()));
    }

    let mut files = Vec::new();
    collect_metadata_files(runs_dir, &mut files)?;
    files.sort();
    debug!(runs_dir = %runs_dir.display(), count = files.len(), "found module records");

    let mut analysis = RunAnalysis::default();
    for file in files {
        let relative = file
            .strip_prefix(runs_dir)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| file.clone());
        let parsed = fs::read_to_string(&file)
            .map_err(TinyTestError::from)
            .and_then(|content| Ok(serde_json::from_str::<ModuleRecord>(&content)?));
        match parsed {
            Ok(record) => analysis.add(record, relative),
            Err(e) => {
                warn!(path = %file.display(), error = %e, "skipping unreadable module record");
                analysis.unreadable.push(relative);
            }
        }
    }
    Ok(analysis)
}

fn collect_metadata_files(dir: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_metadata_files(&path, files)?;
        } else if path.file_name().is_some_and(|name| name == MODULE_METADATA_FILE) {
            files.push(path);
        }
    }
    Ok(())
}
