//! Results analysis across runs.

use crate::analysis::{ModuleEntry, RunAnalysis, Tally};
use crate::pipeline::ModuleStatus;

use super::colors::*;
use super::progress::make_progress_bar;

const RULE_WIDTH: usize = 57;

fn print_tally_line(label: &str, tally: &Tally) {
    println!(
        "  {:<20} [{}] {:>3}/{:<3} converged ({:.1}%), {} not",
        label,
        make_progress_bar(tally.converged, tally.total, 12),
        tally.converged,
        tally.total,
        tally.percent(),
        tally.failed()
    );
}

pub fn print_analysis(analysis: &RunAnalysis) {
    println!();
    println!("{CYAN}{BOLD}Analysis Summary{RESET}");
    println!("{GRAY}{}{RESET}", "-".repeat(RULE_WIDTH));
    println!("{BLUE}Modules:{RESET} {}", analysis.total_modules);

    println!();
    println!("{BOLD}Final status{RESET}");
    for status in [
        ModuleStatus::Converged,
        ModuleStatus::NotConverged,
        ModuleStatus::Errored,
        ModuleStatus::Cancelled,
    ] {
        println!(
            "  {:<14} {:>4} ({:.1}%)",
            status.as_str(),
            analysis.count(status),
            analysis.percent(status)
        );
    }

    let failure_types = analysis.failure_types_by_frequency();
    if !failure_types.is_empty() {
        println!();
        println!("{BOLD}Failure types{RESET}");
        for (kind, count) in failure_types {
            println!("  {:<18} {:>4}", kind.as_str(), count);
        }
    }

    if !analysis.by_model.is_empty() {
        println!();
        println!("{BOLD}By model{RESET}");
        for (model, tally) in &analysis.by_model {
            print_tally_line(model, tally);
        }
    }

    if !analysis.by_template.is_empty() {
        println!();
        println!("{BOLD}By template{RESET}");
        for (template, tally) in &analysis.by_template {
            print_tally_line(template.as_str(), tally);
        }
    }

    if !analysis.unreadable.is_empty() {
        println!();
        println!(
            "{YELLOW}Skipped {} unreadable record(s):{RESET}",
            analysis.unreadable.len()
        );
        for path in &analysis.unreadable {
            println!("  {GRAY}{}{RESET}", path.display());
        }
    }
    println!("{GRAY}{}{RESET}", "-".repeat(RULE_WIDTH));
}

/// One line per module: `module | model | template | failure | path`.
pub fn format_module_entry(entry: &ModuleEntry) -> String {
    format!(
        "{:<15} | {:<20} | {:<10} | {:<17} | {}",
        entry.module,
        entry.model,
        entry.template.as_str(),
        entry.failure_type.map(|kind| kind.as_str()).unwrap_or("-"),
        entry.path.display()
    )
}

pub fn print_module_list<'a>(title: &str, entries: impl Iterator<Item = &'a ModuleEntry>) {
    println!();
    println!("{BOLD}{}{RESET}", title);
    let mut any = false;
    for entry in entries {
        any = true;
        println!("  {}", format_module_entry(entry));
    }
    if !any {
        println!("  {GRAY}(none){RESET}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::Strategy;
    use crate::validation::FailureKind;
    use std::path::PathBuf;

    fn entry(failure_type: Option<FailureKind>) -> ModuleEntry {
        ModuleEntry {
            module: "module_004.py".to_string(),
            function: "parse".to_string(),
            model: "phi3".to_string(),
            template: Strategy::ZeroShot,
            status: ModuleStatus::NotConverged,
            failure_type,
            path: PathBuf::from("run/module_004/metadata.json"),
        }
    }

    #[test]
    fn test_format_module_entry_columns() {
        let line = format_module_entry(&entry(Some(FailureKind::Timeout)));
        let columns: Vec<_> = line.split(" | ").map(str::trim).collect();
        assert_eq!(
            columns,
            vec![
                "module_004.py",
                "phi3",
                "zero_shot",
                "timeout",
                "run/module_004/metadata.json"
            ]
        );
        assert!(format_module_entry(&entry(None)).contains("| -"));
    }

    #[test]
    fn test_print_analysis_does_not_panic() {
        let mut analysis = RunAnalysis::default();
        print_analysis(&analysis);

        analysis.total_modules = 1;
        analysis.by_status.insert(ModuleStatus::NotConverged, 1);
        analysis
            .by_failure_type
            .insert(FailureKind::CollectionError, 1);
        analysis.by_model.insert(
            "phi3".to_string(),
            Tally {
                total: 1,
                converged: 0,
            },
        );
        analysis.modules.push(entry(Some(FailureKind::CollectionError)));
        analysis.unreadable.push(PathBuf::from("broken/metadata.json"));
        print_analysis(&analysis);
        print_module_list("Not converged", analysis.modules.iter());
        print_module_list("Converged", std::iter::empty());
    }
}
