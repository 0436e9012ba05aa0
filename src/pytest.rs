//! Test Validator that runs pytest in a subprocess.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use tracing::debug;

use crate::candidate::CandidateTestFile;
use crate::process::{run_with_timeout, ProcessError};
use crate::target::TargetFunction;
use crate::validation::{parse_failing_tests, TestValidator, ValidationError, ValidationResult};

pub const DEFAULT_PYTEST_COMMAND: &str = "pytest";

/// Flags always passed to pytest: quiet, short summary of failures and
/// errors (parsed for test names), and no `.pytest_cache` left behind.
const PYTEST_ARGS: [&str; 4] = ["-q", "-rfE", "-p", "no:cacheprovider"];

/// Runs each candidate from a fresh temporary directory with the project
/// root on `PYTHONPATH`, so `from <package>.<module> import ...` resolves.
#[derive(Debug, Clone)]
pub struct PytestValidator {
    command: Vec<String>,
    project_root: PathBuf,
    timeout: Duration,
}

impl PytestValidator {
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            command: vec![DEFAULT_PYTEST_COMMAND.to_string()],
            project_root: project_root.into(),
            timeout: Duration::from_secs(120),
        }
    }

    /// Command line used to start pytest, e.g. `python -m pytest`.
    pub fn with_command(mut self, command: &str) -> Self {
        let words: Vec<String> = command.split_whitespace().map(str::to_string).collect();
        if !words.is_empty() {
            self.command = words;
        }
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    fn python_path(&self) -> OsString {
        let mut value = self.project_root.as_os_str().to_os_string();
        if let Some(existing) = std::env::var_os("PYTHONPATH").filter(|v| !v.is_empty()) {
            value.push(":");
            value.push(existing);
        }
        value
    }
}

impl TestValidator for PytestValidator {
    fn validate(
        &self,
        candidate: &CandidateTestFile,
        target: &TargetFunction,
    ) -> Result<ValidationResult, ValidationError> {
        let unavailable = |e: std::io::Error| ValidationError::Unavailable(e.to_string());

        // Dropped at the end of the call, removing the candidate file.
        let dir = tempfile::Builder::new()
            .prefix("tinytest-")
            .tempdir()
            .map_err(unavailable)?;
        let test_path = dir.path().join(format!("test_{}.py", target.module_name()));
        fs::write(&test_path, candidate.source()).map_err(unavailable)?;

        let (program, extra) = self
            .command
            .split_first()
            .ok_or_else(|| ValidationError::Unavailable("empty pytest command".to_string()))?;
        let mut command = Command::new(program);
        command
            .args(extra)
            .args(PYTEST_ARGS)
            .arg(&test_path)
            .current_dir(&self.project_root)
            .env("PYTHONPATH", self.python_path());

        debug!(file = %test_path.display(), "running pytest");
        let output = match run_with_timeout(&mut command, None, self.timeout) {
            Ok(output) => output,
            Err(ProcessError::TimedOut { .. }) => {
                return Err(ValidationError::Timeout(self.timeout.as_secs()))
            }
            Err(e) => return Err(ValidationError::Unavailable(e.to_string())),
        };

        let log = output.combined();
        if output.success() {
            Ok(ValidationResult::passed(log))
        } else {
            Ok(ValidationResult::failed(parse_failing_tests(&log), log))
        }
    }
}
