use std::fmt;

use serde::{Deserialize, Serialize};

use crate::candidate::CandidateTestFile;
use crate::validation::ValidationResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LoopState {
    Generate,
    Validate,
    Repair,
    Succeeded,
    Exhausted,
}

impl LoopState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoopState::Generate => "generate",
            LoopState::Validate => "validate",
            LoopState::Repair => "repair",
            LoopState::Succeeded => "succeeded",
            LoopState::Exhausted => "exhausted",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, LoopState::Succeeded | LoopState::Exhausted)
    }
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The only state carried from one attempt to the next: the latest
/// candidate and the diagnostic produced for it.
///
/// A new snapshot replaces the old one wholesale after every validation, so
/// a repair prompt can only ever be built from the most recent diagnostic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepairSnapshot {
    attempt: u32,
    candidate: CandidateTestFile,
    diagnostic: ValidationResult,
}

impl RepairSnapshot {
    pub fn new(attempt: u32, candidate: CandidateTestFile, diagnostic: ValidationResult) -> Self {
        Self {
            attempt,
            candidate,
            diagnostic,
        }
    }

    /// Attempt that produced the candidate.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn candidate(&self) -> &CandidateTestFile {
        &self.candidate
    }

    pub fn diagnostic(&self) -> &ValidationResult {
        &self.diagnostic
    }

    /// `failing_tests` text for the repair prompt, cut from this snapshot's
    /// candidate using this snapshot's failing test names.
    pub fn failing_tests(&self) -> String {
        self.candidate
            .failing_tests_text(&self.diagnostic.failing_test_names)
    }

    pub fn into_candidate(self) -> CandidateTestFile {
        self.candidate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidate::NO_FAILING_TESTS_REPORTED;
    use std::collections::BTreeSet;

    const SOURCE: &str = "from data.modules.mathutils import add

def test_add_one():
    assert add(1, 0) == 1

def test_add_zero():
    assert add(0, 0) == 1
";

    #[test]
    fn test_loop_state_terminal() {
        assert!(LoopState::Succeeded.is_terminal());
        assert!(LoopState::Exhausted.is_terminal());
        for state in [LoopState::Generate, LoopState::Validate, LoopState::Repair] {
            assert!(!state.is_terminal());
        }
    }

    #[test]
    fn test_loop_state_serialization() {
        assert_eq!(
            serde_json::to_string(&LoopState::Exhausted).unwrap(),
            "\"exhausted\""
        );
        assert_eq!(LoopState::Repair.to_string(), "repair");
    }

    #[test]
    fn test_snapshot_failing_tests_uses_own_diagnostic() {
        let candidate = CandidateTestFile::parse(SOURCE).unwrap();
        let names: BTreeSet<String> = ["test_add_zero".to_string()].into();
        let snapshot = RepairSnapshot::new(
            1,
            candidate,
            ValidationResult::failed(names, "FAILED t.py::test_add_zero"),
        );
        let text = snapshot.failing_tests();
        assert_eq!(text, "def test_add_zero():\n    assert add(0, 0) == 1");
        assert_eq!(snapshot.attempt(), 1);
    }

    #[test]
    fn test_snapshot_without_named_failures() {
        let snapshot = RepairSnapshot::new(
            2,
            CandidateTestFile::parse(SOURCE).unwrap(),
            ValidationResult::failed(BTreeSet::new(), "collected 0 items"),
        );
        assert_eq!(snapshot.failing_tests(), NO_FAILING_TESTS_REPORTED);
    }
}
