//! Terminal output formatting for tinytest.
//!
//! - [`banner`] - Module banners and footers
//! - [`messages`] - Error, warning, and info messages
//! - [`header`] - Run header, state transitions and per-attempt lines
//! - [`progress`] - Progress bars and the run summary
//! - [`analysis`] - Statistics across past runs

pub mod analysis;
pub mod banner;
pub mod header;
pub mod messages;
pub mod progress;

/// ANSI color codes for terminal output.
pub mod colors {
    pub const RESET: &str = "\x1b[0m";
    pub const BOLD: &str = "\x1b[1m";
    pub const DIM: &str = "\x1b[2m";
    pub const GREEN: &str = "\x1b[32m";
    pub const YELLOW: &str = "\x1b[33m";
    pub const BLUE: &str = "\x1b[34m";
    pub const CYAN: &str = "\x1b[36m";
    pub const RED: &str = "\x1b[31m";
    pub const GRAY: &str = "\x1b[90m";
}

pub use colors::*;

pub use analysis::{format_module_entry, print_analysis, print_module_list};
pub use banner::{print_module_banner, print_phase_banner, print_phase_footer, BannerColor};
pub use header::{
    format_module_line, print_attempt_result, print_header, print_module_line, print_run_info,
    print_state_transition,
};
pub use messages::{print_error, print_info, print_interrupted, print_verbose_block, print_warning};
pub use progress::{make_progress_bar, print_run_complete, print_run_summary};
