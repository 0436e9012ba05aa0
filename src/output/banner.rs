//! Module banners.
//!
//! Each module processed in detailed mode is framed by a banner naming the
//! module and its target function, and a footer colored by the outcome.

use terminal_size::{terminal_size, Width};

use super::colors::*;

const DEFAULT_TERMINAL_WIDTH: u16 = 80;
const MIN_BANNER_WIDTH: usize = 20;
const MAX_BANNER_WIDTH: usize = 80;
const BANNER_CHAR: &str = "━";

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BannerColor {
    /// Starting a module
    Cyan,
    /// Converged
    Green,
    /// Errored
    Red,
    /// Not converged or cancelled
    Yellow,
}

impl BannerColor {
    pub fn ansi_code(&self) -> &'static str {
        match self {
            BannerColor::Cyan => CYAN,
            BannerColor::Green => GREEN,
            BannerColor::Red => RED,
            BannerColor::Yellow => YELLOW,
        }
    }
}

fn banner_width() -> usize {
    terminal_size()
        .map(|(Width(w), _)| w as usize)
        .unwrap_or(DEFAULT_TERMINAL_WIDTH as usize)
        .clamp(MIN_BANNER_WIDTH, MAX_BANNER_WIDTH)
}

/// `━━━ title ━━━` padded to `width` columns. A title longer than `width`
/// is kept whole with no padding.
fn format_banner(title: &str, width: usize) -> String {
    let title = format!(" {} ", title);
    let remaining = width.saturating_sub(title.chars().count());
    let left = remaining / 2;
    format!(
        "{}{}{}",
        BANNER_CHAR.repeat(left),
        title,
        BANNER_CHAR.repeat(remaining - left)
    )
}

pub fn print_phase_banner(title: &str, color: BannerColor) {
    println!(
        "{}{BOLD}{}{RESET}",
        color.ansi_code(),
        format_banner(title, banner_width())
    );
}

/// Banner opening the output of one module, e.g. `━━ module_001 :: add ━━`.
pub fn print_module_banner(module: &str, function_name: &str) {
    print_phase_banner(
        &format!("{} :: {}", module, function_name),
        BannerColor::Cyan,
    );
}

/// Closing rule for a module section, followed by a blank line.
pub fn print_phase_footer(color: BannerColor) {
    println!(
        "{}{BOLD}{}{RESET}",
        color.ansi_code(),
        BANNER_CHAR.repeat(banner_width())
    );
    println!();
}
