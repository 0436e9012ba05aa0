use crate::error::{Result, TinyTestError};
use crate::ollama::DEFAULT_GENERATOR_COMMAND;
use crate::pytest::DEFAULT_PYTEST_COMMAND;
use crate::target::is_dotted_path;
use crate::template::{Strategy, DEFAULT_PACKAGE};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// The base config directory name under ~/.config/
const CONFIG_DIR_NAME: &str = "tinytest";

/// File name of the global config inside the config directory.
const GLOBAL_CONFIG_FILENAME: &str = "config.toml";

/// File name of a project config, looked up in the working directory.
pub const PROJECT_CONFIG_FILENAME: &str = "tinytest.toml";

// ============================================================================
// Configuration
// ============================================================================

/// Settings for a tinytest run.
///
/// Every field has a serde default, so a config file only needs the keys it
/// changes.
///
/// # Example
///
/// ```toml
/// model = "qwen2.5-coder:1.5b"
/// template = "structured"
/// max_attempts = 4
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Model name passed to `<generator_command> run <model>`.
    pub model: String,

    /// Initial strategy: `zero_shot`, `few_shot` or `structured`.
    pub template: String,

    /// Total generation calls allowed per module, the first one included.
    pub max_attempts: u32,

    /// Dotted import prefix of the modules under test, as in
    /// `from <package>.<module> import <function>`.
    pub package: String,

    /// Directory holding `module_*.py` files.
    pub modules_dir: PathBuf,

    /// Directory holding `<module_stem>.json` signature metadata.
    pub metadata_dir: PathBuf,

    /// Where run artifacts are written.
    pub runs_dir: PathBuf,

    /// Optional directory of `<strategy>.md` files replacing the built-in templates.
    pub templates_dir: Option<PathBuf>,

    pub generator_command: String,
    pub generation_timeout_secs: u64,

    /// pytest command line; may include a launcher, e.g. `python -m pytest`.
    pub pytest_command: String,
    pub validation_timeout_secs: u64,

    /// Modules processed in parallel.
    pub jobs: usize,

    /// Append the signature hint from metadata to prompts.
    pub signature_hint: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model: "phi3".to_string(),
            template: Strategy::FewShot.as_str().to_string(),
            max_attempts: 3,
            package: DEFAULT_PACKAGE.to_string(),
            modules_dir: PathBuf::from("data/modules"),
            metadata_dir: PathBuf::from("data/metadata"),
            runs_dir: PathBuf::from("runs"),
            templates_dir: None,
            generator_command: DEFAULT_GENERATOR_COMMAND.to_string(),
            generation_timeout_secs: 300,
            pytest_command: DEFAULT_PYTEST_COMMAND.to_string(),
            validation_timeout_secs: 120,
            jobs: 1,
            signature_hint: true,
        }
    }
}

impl Config {
    /// The initial strategy named by `template`.
    pub fn strategy(&self) -> Result<Strategy> {
        self.template.parse()
    }
}

// ============================================================================
// Config Validation
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    ZeroAttempts,
    ZeroTimeout(&'static str),
    ZeroJobs,
    EmptyModel,
    UnknownTemplate(String),
    RepairTemplateAsInitial,
    InvalidPackage(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ZeroAttempts => {
                write!(f, "`max_attempts` must be at least 1")
            }
            ConfigError::ZeroTimeout(field) => {
                write!(f, "`{}` must be greater than 0", field)
            }
            ConfigError::ZeroJobs => write!(f, "`jobs` must be at least 1"),
            ConfigError::EmptyModel => write!(f, "`model` must not be empty"),
            ConfigError::UnknownTemplate(name) => write!(
                f,
                "Unknown template `{}`. Use zero_shot, few_shot or structured",
                name
            ),
            ConfigError::RepairTemplateAsInitial => write!(
                f,
                "`auto_repair` is only used for repairs. \
                Set `template` to zero_shot, few_shot or structured"
            ),
            ConfigError::InvalidPackage(package) => write!(
                f,
                "`package = \"{}\"` is not a dotted Python import path",
                package
            ),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Validate a configuration before any module is processed.
///
/// # Validation Rules
///
/// - `max_attempts`, both timeouts and `jobs` are non-zero
/// - `model` is not blank
/// - `template` names an initial strategy (not `auto_repair`)
/// - `package` is a dotted identifier path
pub fn validate_config(config: &Config) -> std::result::Result<(), ConfigError> {
    if config.max_attempts == 0 {
        return Err(ConfigError::ZeroAttempts);
    }
    if config.generation_timeout_secs == 0 {
        return Err(ConfigError::ZeroTimeout("generation_timeout_secs"));
    }
    if config.validation_timeout_secs == 0 {
        return Err(ConfigError::ZeroTimeout("validation_timeout_secs"));
    }
    if config.jobs == 0 {
        return Err(ConfigError::ZeroJobs);
    }
    if config.model.trim().is_empty() {
        return Err(ConfigError::EmptyModel);
    }
    match config.template.parse::<Strategy>() {
        Ok(strategy) if !strategy.is_initial() => {
            return Err(ConfigError::RepairTemplateAsInitial)
        }
        Ok(_) => {}
        Err(_) => return Err(ConfigError::UnknownTemplate(config.template.clone())),
    }
    if !is_dotted_path(&config.package) {
        return Err(ConfigError::InvalidPackage(config.package.clone()));
    }
    Ok(())
}

// ============================================================================
// Config Files
// ============================================================================

/// Render `config` as a commented TOML file.
pub fn generate_config_with_comments(config: &Config) -> String {
    let templates_dir = match &config.templates_dir {
        Some(dir) => format!("templates_dir = {}", toml_string(&dir.to_string_lossy())),
        None => "# templates_dir = \"templates\"".to_string(),
    };

    format!(
        r#"# tinytest configuration

# Model passed to `<generator_command> run <model>`
model = {model}

# Initial prompt strategy: zero_shot, few_shot or structured
# (auto_repair is used automatically for repairs)
template = {template}

# Generation calls allowed per module, including the first one.
# 3 means one initial generation and up to two repairs.
max_attempts = {max_attempts}

# Import prefix of the modules under test. Generated tests must start with
#   from <package>.<module> import <function>
package = {package}

# Where module_*.py files and their <stem>.json metadata live
modules_dir = {modules_dir}
metadata_dir = {metadata_dir}

# Run artifacts are written to <runs_dir>/<timestamp>_<model>_<template>/
runs_dir = {runs_dir}

# Directory with zero_shot.md, few_shot.md, structured.md or auto_repair.md
# replacing the built-in templates
{templates_dir}

# Model CLI and its per-call timeout
generator_command = {generator_command}
generation_timeout_secs = {generation_timeout_secs}

# pytest command line (e.g. "python -m pytest") and its per-run timeout
pytest_command = {pytest_command}
validation_timeout_secs = {validation_timeout_secs}

# Modules processed in parallel
jobs = {jobs}

# Append "HINT - Function: ..., Args: ..., Returns: ..." from metadata to prompts
signature_hint = {signature_hint}
"#,
        model = toml_string(&config.model),
        template = toml_string(&config.template),
        max_attempts = config.max_attempts,
        package = toml_string(&config.package),
        modules_dir = toml_string(&config.modules_dir.to_string_lossy()),
        metadata_dir = toml_string(&config.metadata_dir.to_string_lossy()),
        runs_dir = toml_string(&config.runs_dir.to_string_lossy()),
        templates_dir = templates_dir,
        generator_command = toml_string(&config.generator_command),
        generation_timeout_secs = config.generation_timeout_secs,
        pytest_command = toml_string(&config.pytest_command),
        validation_timeout_secs = config.validation_timeout_secs,
        jobs = config.jobs,
        signature_hint = config.signature_hint,
    )
}

fn toml_string(value: &str) -> String {
    toml::Value::String(value.to_string()).to_string()
}

/// Parse a config file.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = fs::read_to_string(path)?;
    toml::from_str(&content).map_err(|e| {
        TinyTestError::Config(format!(
            "Failed to parse config file at {:?}: {}",
            path, e
        ))
    })
}

/// Write a commented config file, creating parent directories.
///
/// Refuses to overwrite an existing file.
pub fn write_config(path: &Path, config: &Config) -> Result<()> {
    if path.exists() {
        return Err(TinyTestError::Config(format!(
            "{} already exists",
            path.display()
        )));
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, generate_config_with_comments(config))?;
    Ok(())
}

/// Get the path to the tinytest config directory: `~/.config/tinytest/`.
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| TinyTestError::Config("Could not determine home directory".into()))?;
    Ok(home.join(".config").join(CONFIG_DIR_NAME))
}

/// Returns the path to `~/.config/tinytest/config.toml`.
pub fn global_config_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(GLOBAL_CONFIG_FILENAME))
}

/// Returns `./tinytest.toml` relative to `dir`.
pub fn project_config_path(dir: &Path) -> PathBuf {
    dir.join(PROJECT_CONFIG_FILENAME)
}

/// Where the effective configuration came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    Project(PathBuf),
    Global(PathBuf),
    Defaults,
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigSource::Project(path) => write!(f, "project config {}", path.display()),
            ConfigSource::Global(path) => write!(f, "global config {}", path.display()),
            ConfigSource::Defaults => write!(f, "built-in defaults"),
        }
    }
}

/// Get the effective configuration for the current directory.
///
/// Resolution order:
/// 1. `./tinytest.toml`
/// 2. `~/.config/tinytest/config.toml`
/// 3. built-in defaults
///
/// Nothing is created on disk. The result is not validated yet, because
/// command-line overrides are applied on top of it first.
pub fn get_effective_config() -> Result<(Config, ConfigSource)> {
    let cwd = std::env::current_dir()?;
    let global = global_config_path().ok();
    get_effective_config_at(&cwd, global.as_deref())
}

fn get_effective_config_at(
    project_dir: &Path,
    global_path: Option<&Path>,
) -> Result<(Config, ConfigSource)> {
    let project_path = project_config_path(project_dir);
    if project_path.is_file() {
        let config = load_config(&project_path)?;
        return Ok((config, ConfigSource::Project(project_path)));
    }

    if let Some(global_path) = global_path.filter(|p| p.is_file()) {
        let config = load_config(global_path)?;
        return Ok((config, ConfigSource::Global(global_path.to_path_buf())));
    }

    Ok((Config::default(), ConfigSource::Defaults))
}
