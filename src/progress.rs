use crate::output::{GREEN, RED, RESET, YELLOW};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::{Duration, Instant};
use terminal_size::{terminal_size, Width};

const SPINNER_CHARS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏";
const DEFAULT_TERMINAL_WIDTH: u16 = 80;
// Spinner (2) + " [HH:MM:SS]" (11) + margin
const SPINNER_OVERHEAD: usize = 16;

fn get_terminal_width() -> usize {
    terminal_size()
        .map(|(Width(w), _)| w as usize)
        .unwrap_or(DEFAULT_TERMINAL_WIDTH as usize)
}

/// Cut `text` to at most `max_chars` characters, marking the cut with `...`.
pub fn truncate_for_display(text: &str, max_chars: usize) -> String {
    let first_line = text.lines().next().unwrap_or("");
    if first_line.chars().count() <= max_chars {
        return first_line.to_string();
    }
    if max_chars <= 3 {
        return ".".repeat(max_chars);
    }
    let kept: String = first_line.chars().take(max_chars - 3).collect();
    format!("{}...", kept)
}

/// Spinner shown while one blocking external call (model or pytest) runs.
///
/// The line is cleared when the spinner finishes or is dropped, so a
/// cancelled call leaves nothing behind.
pub struct CallSpinner {
    spinner: ProgressBar,
    label: String,
    start_time: Instant,
}

impl CallSpinner {
    pub fn new(label: &str) -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::default_spinner()
                .tick_chars(SPINNER_CHARS)
                .template("{spinner:.cyan} {msg} [{elapsed_precise}]")
                .expect("invalid template"),
        );
        let available = get_terminal_width().saturating_sub(SPINNER_OVERHEAD).max(20);
        spinner.set_message(truncate_for_display(label, available));
        spinner.enable_steady_tick(Duration::from_millis(80));

        Self {
            spinner,
            label: label.to_string(),
            start_time: Instant::now(),
        }
    }

    /// Spinner for a generation call of `attempt` out of `max_attempts`.
    pub fn new_for_generation(module: &str, attempt: u32, max_attempts: u32) -> Self {
        Self::new(&format!(
            "{} | generating tests (attempt {}/{})",
            module, attempt, max_attempts
        ))
    }

    pub fn new_for_validation(module: &str, attempt: u32, max_attempts: u32) -> Self {
        Self::new(&format!(
            "{} | running pytest (attempt {}/{})",
            module, attempt, max_attempts
        ))
    }

    pub fn elapsed_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub fn finish_success(self, message: &str) {
        self.spinner.finish_and_clear();
        println!("{GREEN}\u{2714} {}: {}{RESET}", self.label, message);
    }

    pub fn finish_warning(self, message: &str) {
        self.spinner.finish_and_clear();
        println!("{YELLOW}\u{26A0} {}: {}{RESET}", self.label, message);
    }

    pub fn finish_error(self, error: &str) {
        let available = get_terminal_width()
            .saturating_sub(self.label.chars().count() + 6)
            .max(20);
        self.spinner.finish_and_clear();
        println!(
            "{RED}\u{2718} {}: {}{RESET}",
            self.label,
            truncate_for_display(error, available)
        );
    }
}

impl Drop for CallSpinner {
    fn drop(&mut self) {
        self.spinner.finish_and_clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_short_text_unchanged() {
        assert_eq!(truncate_for_display("short", 20), "short");
    }

    #[test]
    fn test_truncate_long_text_adds_ellipsis() {
        assert_eq!(truncate_for_display("abcdefghij", 8), "abcde...");
        assert_eq!(truncate_for_display("abcdefghij", 2), "..");
    }

    #[test]
    fn test_truncate_uses_first_line_only() {
        assert_eq!(
            truncate_for_display("model not found\nsecond line", 40),
            "model not found"
        );
    }

    #[test]
    fn test_truncate_counts_characters_not_bytes() {
        assert_eq!(truncate_for_display("ééééé", 5), "ééééé");
        assert_eq!(truncate_for_display("éééééé", 5), "éé...");
    }

    #[test]
    fn test_spinner_lifecycle_does_not_panic() {
        let spinner = CallSpinner::new_for_generation("module_001", 1, 3);
        assert!(spinner.elapsed_secs() < 5);
        spinner.finish_success("candidate received");

        CallSpinner::new_for_validation("module_001", 2, 3).finish_error("1 failed");
        drop(CallSpinner::new("dropped"));
    }
}
