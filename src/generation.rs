//! Generation Client boundary.
//!
//! A client turns a rendered prompt into raw candidate source text. The
//! controller treats the client as a black box and counts every failure,
//! timeouts included, against the attempt budget.

use thiserror::Error;

use crate::render::RenderedPrompt;

/// Failure of one generation call. Always retried within budget.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GenerationError {
    #[error("generation failed: {0}")]
    Failed(String),

    #[error("generation timed out after {0} seconds")]
    Timeout(u64),

    #[error("model returned empty output")]
    Empty,

    #[error("model output contains no `test_` function")]
    NoTestFunctions,
}

/// Produces candidate test source for a prompt.
pub trait GenerationClient {
    /// Return the model's raw answer for `prompt`.
    ///
    /// Implementations enforce their own timeout and report it as
    /// [`GenerationError::Timeout`].
    fn generate(&self, prompt: &RenderedPrompt) -> Result<String, GenerationError>;
}

impl<T: GenerationClient + ?Sized> GenerationClient for &T {
    fn generate(&self, prompt: &RenderedPrompt) -> Result<String, GenerationError> {
        (**self).generate(prompt)
    }
}

impl<T: GenerationClient + ?Sized> GenerationClient for Box<T> {
    fn generate(&self, prompt: &RenderedPrompt) -> Result<String, GenerationError> {
        (**self).generate(prompt)
    }
}
