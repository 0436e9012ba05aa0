//! Progress bars and the end-of-run summary.

use std::path::Path;

use crate::pipeline::{ModuleStatus, RunSummary};

use super::colors::*;

pub fn make_progress_bar(completed: usize, total: usize, width: usize) -> String {
    if total == 0 {
        return " ".repeat(width);
    }
    let filled = (completed.min(total) * width) / total;
    let empty = width - filled;
    format!(
        "{GREEN}{}{RESET}{GRAY}{}{RESET}",
        "█".repeat(filled),
        "░".repeat(empty)
    )
}

/// "Xh Ym Zs" for hours, "Xm Ys" for minutes, "Xs" for seconds.
fn format_run_duration(secs: u64) -> String {
    if secs >= 3600 {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    } else if secs >= 60 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}s", secs)
    }
}

pub fn print_run_summary(summary: &RunSummary, total_duration_secs: u64) {
    let total = summary.modules.len();
    let converged = summary.count(ModuleStatus::Converged);
    let attempts: u32 = summary.modules.iter().map(|m| m.attempts_used).sum();

    println!();
    println!("{CYAN}{BOLD}Run Summary{RESET}");
    println!("{GRAY}{}{RESET}", "-".repeat(57));
    println!(
        "{BLUE}Converged:{RESET}  [{}] {}/{}",
        make_progress_bar(converged, total, 12),
        converged,
        total
    );
    for (label, status) in [
        ("Failed:", ModuleStatus::NotConverged),
        ("Errors:", ModuleStatus::Errored),
        ("Cancelled:", ModuleStatus::Cancelled),
    ] {
        let count = summary.count(status);
        if count > 0 {
            println!("{BLUE}{:<11}{RESET} {}", label, count);
        }
    }
    println!("{BLUE}Attempts:{RESET}   {}", attempts);
    println!(
        "{BLUE}Total time:{RESET} {}",
        format_run_duration(total_duration_secs)
    );
    println!("{GRAY}{}{RESET}", "-".repeat(57));
}

pub fn print_run_complete(run_root: &Path) {
    println!();
    println!(
        "{GREEN}\u{2714} Run complete.{RESET} Outputs saved under: {}",
        run_root.display()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::ModuleReport;
    use crate::template::Strategy;
    use chrono::Local;

    #[test]
    fn test_make_progress_bar_proportions() {
        let bar = make_progress_bar(1, 4, 8);
        assert_eq!(bar.matches('█').count(), 2);
        assert_eq!(bar.matches('░').count(), 6);
        assert_eq!(make_progress_bar(0, 0, 5), "     ");
        assert_eq!(make_progress_bar(9, 3, 6).matches('█').count(), 6);
    }

    #[test]
    fn test_format_run_duration() {
        assert_eq!(format_run_duration(0), "0s");
        assert_eq!(format_run_duration(59), "59s");
        assert_eq!(format_run_duration(90), "1m 30s");
        assert_eq!(format_run_duration(3661), "1h 1m 1s");
    }

    #[test]
    fn test_print_run_summary_does_not_panic() {
        let module = |name: &str, status| ModuleReport {
            module: name.to_string(),
            function: None,
            status,
            attempts_used: 2,
            failure_type: None,
            error: None,
            duration_ms: 10,
            final_test_file: None,
        };
        let summary = RunSummary {
            model: "phi3".to_string(),
            template: Strategy::Structured,
            max_attempts: 3,
            started_at: Local::now(),
            finished_at: Local::now(),
            modules: vec![
                module("module_001", ModuleStatus::Converged),
                module("module_002", ModuleStatus::Errored),
            ],
        };
        print_run_summary(&summary, 75);
        print_run_complete(Path::new("runs/x"));
    }
}
