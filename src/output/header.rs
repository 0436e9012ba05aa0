//! Run header, state transitions and per-attempt output.

use std::path::Path;

use crate::pipeline::{ModuleReport, ModuleStatus};
use crate::state::LoopState;
use crate::template::Strategy;
use crate::validation::ValidationResult;

use super::colors::*;

pub fn print_header() {
    println!("{CYAN}{BOLD}");
    println!("+---------------------------------------------------------+");
    println!("|  tinytest v{:<45}|", env!("CARGO_PKG_VERSION"));
    println!("+---------------------------------------------------------+");
    println!("{RESET}");
}

pub fn print_run_info(
    model: &str,
    strategy: Strategy,
    max_attempts: u32,
    module_count: usize,
    run_root: &Path,
) {
    println!("{BLUE}Model:{RESET}    {}", model);
    println!("{BLUE}Template:{RESET} {}", strategy);
    println!("{BLUE}Attempts:{RESET} up to {} per module", max_attempts);
    println!("{BLUE}Modules:{RESET}  {}", module_count);
    println!("{BLUE}Outputs:{RESET}  {}", run_root.display());
    println!();
}

pub fn print_state_transition(from: LoopState, to: LoopState) {
    println!("{CYAN}[state]{RESET} {} -> {}", from, to);
}

/// One line per validated candidate.
pub fn print_attempt_result(attempt: u32, max_attempts: u32, result: &ValidationResult) {
    match result.failure_kind() {
        None => println!(
            "{GREEN}Attempt {}/{}: all tests passed{RESET}",
            attempt, max_attempts
        ),
        Some(kind) => {
            let failing = if result.failing_test_names.is_empty() {
                String::new()
            } else {
                format!(
                    " ({})",
                    result
                        .failing_test_names
                        .iter()
                        .cloned()
                        .collect::<Vec<_>>()
                        .join(", ")
                )
            };
            println!(
                "{YELLOW}Attempt {}/{}: {}{}{RESET}",
                attempt, max_attempts, kind, failing
            );
        }
    }
}

/// `[PASS] module_001 (add) converged in 2/3 attempts [1.4s]`, colored.
pub fn format_module_line(report: &ModuleReport, max_attempts: u32) -> String {
    let (tag, color) = match report.status {
        ModuleStatus::Converged => ("PASS", GREEN),
        ModuleStatus::NotConverged => ("FAIL", RED),
        ModuleStatus::Errored => ("ERR ", RED),
        ModuleStatus::Cancelled => ("SKIP", YELLOW),
    };
    let function = report
        .function
        .as_deref()
        .map(|f| format!(" ({})", f))
        .unwrap_or_default();
    let detail = match report.status {
        ModuleStatus::Converged | ModuleStatus::NotConverged => {
            let mut detail = format!(
                "{} in {}/{} attempts",
                report.status.as_str(),
                report.attempts_used,
                max_attempts
            );
            if let Some(kind) = report.failure_type {
                detail.push_str(&format!(", last failure: {}", kind));
            }
            detail
        }
        ModuleStatus::Errored => report.error.clone().unwrap_or_else(|| "error".to_string()),
        ModuleStatus::Cancelled => report.status.as_str().to_string(),
    };

    format!(
        "[{color}{tag}{RESET}] {BOLD}{}{RESET}{} {} {GRAY}[{:.1}s]{RESET}",
        report.module,
        function,
        detail,
        report.duration_ms as f64 / 1000.0
    )
}

pub fn print_module_line(report: &ModuleReport, max_attempts: u32) {
    println!("{}", format_module_line(report, max_attempts));
}
