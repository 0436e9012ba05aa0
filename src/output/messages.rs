//! Basic message output functions.

use super::colors::*;

pub fn print_error(msg: &str) {
    println!("{RED}{BOLD}Error:{RESET} {}", msg);
}

pub fn print_warning(msg: &str) {
    println!("{YELLOW}Warning:{RESET} {}", msg);
}

pub fn print_info(msg: &str) {
    println!("{CYAN}Info:{RESET} {}", msg);
}

/// Printed once a run stops early because of Ctrl+C.
pub fn print_interrupted(run_root: &std::path::Path) {
    println!();
    println!(
        "{YELLOW}Interrupted.{RESET} Partial outputs kept under {}",
        run_root.display()
    );
}

/// A titled block of raw text (prompt, candidate, pytest log), dimmed.
pub fn print_verbose_block(title: &str, body: &str) {
    println!("{BLUE}{BOLD}{}{RESET}", title);
    println!("{GRAY}{}{RESET}", "-".repeat(57));
    for line in body.lines() {
        println!("{GRAY}{}{RESET}", line);
    }
    println!("{GRAY}{}{RESET}", "-".repeat(57));
}
