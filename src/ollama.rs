//! Generation Client backed by a local model CLI (`ollama run <model>`).

use std::process::Command;
use std::time::Duration;

use tracing::debug;

use crate::candidate::clean_output;
use crate::generation::{GenerationClient, GenerationError};
use crate::process::{run_with_timeout, ProcessError};
use crate::render::RenderedPrompt;

pub const DEFAULT_GENERATOR_COMMAND: &str = "ollama";

/// Sends the prompt on stdin to `<program> run <model>` and returns the
/// cleaned answer.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    program: String,
    model: String,
    timeout: Duration,
}

impl OllamaClient {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            program: DEFAULT_GENERATOR_COMMAND.to_string(),
            model: model.into(),
            timeout: Duration::from_secs(300),
        }
    }

    /// Use a different executable speaking the same `run <model>` protocol.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

impl GenerationClient for OllamaClient {
    fn generate(&self, prompt: &RenderedPrompt) -> Result<String, GenerationError> {
        debug!(
            model = %self.model,
            strategy = %prompt.strategy(),
            prompt_len = prompt.as_str().len(),
            "calling model"
        );

        let mut command = Command::new(&self.program);
        command.arg("run").arg(&self.model);

        let output = run_with_timeout(&mut command, Some(prompt.as_str()), self.timeout)
            .map_err(|e| match e {
                ProcessError::TimedOut { .. } => GenerationError::Timeout(self.timeout.as_secs()),
                other => GenerationError::Failed(other.to_string()),
            })?;

        if !output.success() {
            let stderr = output.stderr.trim();
            return Err(GenerationError::Failed(if stderr.is_empty() {
                format!("`{} run {}` exited with {}", self.program, self.model, output.status)
            } else {
                stderr.to_string()
            }));
        }

        Ok(clean_output(output.stdout.trim()))
    }
}
