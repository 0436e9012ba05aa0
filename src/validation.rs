//! Test Validator boundary.
//!
//! A validator runs a candidate test file against the target function and
//! reports which tests failed together with the raw diagnostic text.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::candidate::{CandidateTestFile, StructuralDefect};
use crate::target::TargetFunction;

/// Failure of the validator itself, as opposed to failing tests.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// The run did not finish in time. Treated as a failing result.
    #[error("validation timed out after {0} seconds")]
    Timeout(u64),

    /// The validator cannot run at all (missing executable, unwritable temp dir).
    #[error("validator unavailable: {0}")]
    Unavailable(String),
}

/// Runs candidate test files.
pub trait TestValidator {
    /// Execute `candidate` against `target`. Must not keep the candidate
    /// around after returning.
    fn validate(
        &self,
        candidate: &CandidateTestFile,
        target: &TargetFunction,
    ) -> Result<ValidationResult, ValidationError>;
}

impl<T: TestValidator + ?Sized> TestValidator for &T {
    fn validate(
        &self,
        candidate: &CandidateTestFile,
        target: &TargetFunction,
    ) -> Result<ValidationResult, ValidationError> {
        (**self).validate(candidate, target)
    }
}

impl<T: TestValidator + ?Sized> TestValidator for Box<T> {
    fn validate(
        &self,
        candidate: &CandidateTestFile,
        target: &TargetFunction,
    ) -> Result<ValidationResult, ValidationError> {
        (**self).validate(candidate, target)
    }
}

/// Coarse classification of a failing run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    ImportError,
    AssertionFailure,
    Exception,
    Timeout,
    CollectionError,
    Structural,
    Unknown,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::ImportError => "import_error",
            FailureKind::AssertionFailure => "assertion_failure",
            FailureKind::Exception => "exception",
            FailureKind::Timeout => "timeout",
            FailureKind::CollectionError => "collection_error",
            FailureKind::Structural => "structural",
            FailureKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a pytest log. Checks run in a fixed order; the first match wins.
pub fn tag_failure(log: &str) -> FailureKind {
    let lower = log.to_lowercase();
    if log.contains("ImportError")
        || log.contains("ModuleNotFoundError")
        || lower.contains("import error")
    {
        FailureKind::ImportError
    } else if lower.contains("assert") && (lower.contains("failed") || lower.contains("assertion"))
    {
        FailureKind::AssertionFailure
    } else if log.contains("E   ") || log.contains("Traceback (most recent call last)") {
        FailureKind::Exception
    } else if lower.contains("timeout") {
        FailureKind::Timeout
    } else if lower.contains("errors during collection") || lower.contains("collected 0 items") {
        FailureKind::CollectionError
    } else {
        FailureKind::Unknown
    }
}

fn summary_line_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)^(?:FAILED|ERROR)[ \t]+\S*?::(?:[A-Za-z_][A-Za-z0-9_]*::)*(test_[A-Za-z0-9_]*)")
            .expect("invalid summary line regex")
    })
}

/// Names of failing tests from pytest's short test summary (`-rfE`).
///
/// Parametrized ids such as `test_add[1-2]` collapse to `test_add`.
pub fn parse_failing_tests(log: &str) -> BTreeSet<String> {
    summary_line_regex()
        .captures_iter(log)
        .map(|caps| caps[1].to_string())
        .collect()
}

/// Outcome of validating one candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationResult {
    pub passed: bool,
    pub failing_test_names: BTreeSet<String>,
    pub log: String,
    kind: Option<FailureKind>,
}

impl ValidationResult {
    pub fn passed(log: impl Into<String>) -> Self {
        Self {
            passed: true,
            failing_test_names: BTreeSet::new(),
            log: log.into(),
            kind: None,
        }
    }

    pub fn failed(failing_test_names: BTreeSet<String>, log: impl Into<String>) -> Self {
        Self {
            passed: false,
            failing_test_names,
            log: log.into(),
            kind: None,
        }
    }

    /// Failing result for a candidate rejected before reaching the validator.
    pub fn structural(defect: &StructuralDefect) -> Self {
        Self {
            passed: false,
            failing_test_names: BTreeSet::new(),
            log: defect.synthetic_log(),
            kind: Some(FailureKind::Structural),
        }
    }

    /// Failing result standing in for a validator that ran out of time.
    pub fn timed_out(secs: u64) -> Self {
        Self {
            passed: false,
            failing_test_names: BTreeSet::new(),
            log: format!("validation timed out after {}s", secs),
            kind: Some(FailureKind::Timeout),
        }
    }

    /// `None` for a passing result.
    pub fn failure_kind(&self) -> Option<FailureKind> {
        if self.passed {
            return None;
        }
        Some(self.kind.unwrap_or_else(|| tag_failure(&self.log)))
    }
}
