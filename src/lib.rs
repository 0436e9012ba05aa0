pub mod analysis;
pub mod candidate;
pub mod commands;
pub mod config;
pub mod error;
pub mod generation;
pub mod ollama;
pub mod output;
pub mod pipeline;
pub mod process;
pub mod progress;
pub mod prompts;
pub mod pytest;
pub mod render;
pub mod runner;
pub mod signal;
pub mod state;
pub mod target;
pub mod template;
pub mod validation;

pub use analysis::{analyze_runs, RunAnalysis};
pub use candidate::{CandidateTestFile, StructuralDefect};
pub use error::{Result, TinyTestError};
pub use generation::{GenerationClient, GenerationError};
pub use ollama::OllamaClient;
pub use pipeline::{Pipeline, RunDirectory};
pub use pytest::PytestValidator;
pub use render::{PromptRenderer, PromptRequest, RenderedPrompt};
pub use runner::{LoopEvent, LoopOutcome, RepairLoop};
pub use signal::SignalHandler;
pub use state::{LoopState, RepairSnapshot};
pub use target::TargetFunction;
pub use template::{Binding, Bindings, Strategy, TemplateRegistry};
pub use validation::{FailureKind, TestValidator, ValidationError, ValidationResult};
