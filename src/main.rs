//! tinytest CLI entry point.
//!
//! Parses command-line arguments and dispatches to the command handlers.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tinytest::commands::{
    analyze_command, config_init_command, config_show_command, prompt_command, run_command,
    AnalyzeOptions, RunOptions,
};
use tinytest::error::TinyTestError;
use tinytest::output::print_error;
use tinytest::pipeline::ModuleRange;
use tinytest::SignalHandler;
use tracing_subscriber::EnvFilter;

const INTERRUPTED_EXIT_CODE: i32 = 130;

#[derive(Parser)]
#[command(name = "tinytest")]
#[command(
    version,
    about = "Generate pytest unit tests with a local model and repair them until they pass",
    after_help = "EXAMPLES:
    tinytest run                                  # All modules with the configured model
    tinytest run --model llama3 --range 1-20      # Modules 1 to 20
    tinytest run --template structured --jobs 4   # Four modules at a time
    tinytest prompt --module data/modules/module_001.py
    tinytest analyze --list-failed                # Statistics across past runs
    tinytest config init                          # Write ./tinytest.toml

LOGGING:
    Set RUST_LOG (e.g. RUST_LOG=tinytest=debug) for diagnostic logs on stderr."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate, validate and repair tests for each module
    #[command(after_help = "OUTPUTS:
    <runs_dir>/<timestamp>_<model>_<template>/<module>/
        <module>_test_raw.py, pytest_log.txt        first attempt
        <module>_test_repaired_<n>.py,
        pytest_log_retry_<n>.txt                    repair n
        <module>_test_final.py                      passing file, if any
        metadata.json                               per-attempt record
    <runs_dir>/<timestamp>_<model>_<template>/summary.json")]
    Run {
        /// Model name passed to `ollama run`
        #[arg(short, long)]
        model: Option<String>,

        /// Initial strategy: zero_shot, few_shot or structured
        #[arg(short, long)]
        template: Option<String>,

        /// Generation calls per module, the first one included
        #[arg(long)]
        max_attempts: Option<u32>,

        /// Module numbers to process, e.g. 1-20, 5- or -10
        #[arg(short, long)]
        range: Option<ModuleRange>,

        /// Modules processed in parallel
        #[arg(short, long)]
        jobs: Option<usize>,

        /// Directory holding module_*.py files
        #[arg(long)]
        modules_dir: Option<PathBuf>,

        /// Directory receiving run outputs
        #[arg(long)]
        runs_dir: Option<PathBuf>,

        /// Directory of <strategy>.md files replacing the built-in templates
        #[arg(long)]
        templates_dir: Option<PathBuf>,

        /// Print prompts, candidates and pytest logs instead of spinners
        #[arg(short, long)]
        verbose: bool,

        /// Do not append the signature hint to prompts
        #[arg(long)]
        no_hint: bool,
    },

    /// Print the initial prompt for one module without calling a model
    Prompt {
        /// Path to a module file
        #[arg(long)]
        module: PathBuf,

        /// Initial strategy: zero_shot, few_shot or structured
        #[arg(short, long)]
        template: Option<String>,

        /// Do not append the signature hint
        #[arg(long)]
        no_hint: bool,
    },

    /// Summarize every run's metadata.json records
    Analyze {
        /// Directory holding run outputs (defaults to the configured runs_dir)
        #[arg(long)]
        runs_dir: Option<PathBuf>,

        /// List modules that converged
        #[arg(long)]
        list_passed: bool,

        /// List modules that did not converge
        #[arg(long)]
        list_failed: bool,

        /// Write the full statistics as JSON to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show the effective configuration
    #[command(after_help = "CONFIG FILES:
    Project: ./tinytest.toml
    Global:  ~/.config/tinytest/config.toml

    The project file wins when both exist; defaults apply when neither does.
    Command-line flags override the file.")]
    Config {
        #[command(subcommand)]
        subcommand: Option<ConfigSubcommand>,
    },
}

#[derive(Subcommand)]
enum ConfigSubcommand {
    /// Write a commented default config file
    Init {
        /// Write ~/.config/tinytest/config.toml instead of ./tinytest.toml
        #[arg(short, long)]
        global: bool,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing();

    let result = match cli.command {
        Commands::Run {
            model,
            template,
            max_attempts,
            range,
            jobs,
            modules_dir,
            runs_dir,
            templates_dir,
            verbose,
            no_hint,
        } => {
            let options = RunOptions {
                model,
                template,
                max_attempts,
                range,
                jobs,
                modules_dir,
                runs_dir,
                templates_dir,
                verbose,
                no_hint,
            };
            SignalHandler::new().and_then(|signal| run_command(&options, signal))
        }
        Commands::Prompt {
            module,
            template,
            no_hint,
        } => prompt_command(&module, template.as_deref(), no_hint),
        Commands::Analyze {
            runs_dir,
            list_passed,
            list_failed,
            output,
        } => analyze_command(&AnalyzeOptions {
            runs_dir,
            list_passed,
            list_failed,
            output,
        }),
        Commands::Config { subcommand } => match subcommand {
            None => config_show_command(),
            Some(ConfigSubcommand::Init { global }) => config_init_command(global),
        },
    };

    match result {
        Ok(()) => {}
        Err(TinyTestError::Cancelled { .. }) => std::process::exit(INTERRUPTED_EXIT_CODE),
        Err(e) => {
            print_error(&e.to_string());
            std::process::exit(1);
        }
    }
}
