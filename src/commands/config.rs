//! Config command handler.
//!
//! Shows the effective configuration or writes a commented default file.

use std::path::PathBuf;

use crate::config::{
    generate_config_with_comments, get_effective_config, global_config_path, project_config_path,
    validate_config, write_config, Config,
};
use crate::error::Result;
use crate::output::{print_warning, BOLD, GRAY, GREEN, RESET};

/// Print the effective configuration and where it came from.
pub fn config_show_command() -> Result<()> {
    let (config, source) = get_effective_config()?;

    println!("{BOLD}# Effective config{RESET}");
    println!("{GRAY}# source: {}{RESET}", source);
    println!();
    print!("{}", generate_config_with_comments(&config));

    if let Err(e) = validate_config(&config) {
        println!();
        print_warning(&e.to_string());
    }
    Ok(())
}

/// Write a default config to `./tinytest.toml`, or to the global config
/// path with `global`. Never overwrites an existing file.
pub fn config_init_command(global: bool) -> Result<()> {
    let path = config_init_path(global)?;
    write_config(&path, &Config::default())?;
    println!("{GREEN}Created{RESET} {}", path.display());
    Ok(())
}

fn config_init_path(global: bool) -> Result<PathBuf> {
    if global {
        global_config_path()
    } else {
        Ok(project_config_path(&std::env::current_dir()?))
    }
}
