use std::path::PathBuf;
use thiserror::Error;

use crate::template::{Binding, Strategy};

#[derive(Error, Debug)]
pub enum TinyTestError {
    #[error("Missing binding `{binding}` for the {strategy} template")]
    MissingBinding { strategy: Strategy, binding: Binding },

    #[error("Binding `{binding}` is not accepted by the {strategy} template")]
    UnexpectedBinding { strategy: Strategy, binding: Binding },

    #[error("Invalid {strategy} template: {message}")]
    Template { strategy: Strategy, message: String },

    #[error("Strategy {0} cannot start a loop; use zero_shot, few_shot or structured")]
    InvalidStrategy(Strategy),

    #[error("Unknown strategy: {0}")]
    UnknownStrategy(String),

    #[error("max_attempts must be at least 1, got {0}")]
    InvalidMaxAttempts(u32),

    #[error("Invalid target function: {0}")]
    InvalidTarget(String),

    #[error("Module not found: {0}")]
    ModuleNotFound(PathBuf),

    #[error("Runs directory not found: {0}")]
    RunsNotFound(PathBuf),

    #[error("Test validator unavailable: {0}")]
    Validator(String),

    #[error("Interrupted after {attempts_used} attempt(s)")]
    Cancelled { attempts_used: u32 },

    #[error("Signal handler error: {0}")]
    SignalHandler(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, TinyTestError>;
