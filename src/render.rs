//! Prompt Renderer: binds a [`PromptRequest`] to its strategy's template.

use std::fmt;

use crate::error::{Result, TinyTestError};
use crate::target::TargetFunction;
use crate::template::{Binding, Bindings, Strategy, TemplateRegistry};

/// One rendering request. Created per attempt and dropped after rendering.
///
/// `previous_test`, `failing_tests` and `pytest_log` are present if and only
/// if `strategy` is [`Strategy::AutoRepair`]; [`PromptRenderer::build`]
/// enforces this.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PromptRequest<'a> {
    pub strategy: Strategy,
    pub target: &'a TargetFunction,
    pub previous_test: Option<&'a str>,
    pub failing_tests: Option<&'a str>,
    pub pytest_log: Option<&'a str>,
}

impl<'a> PromptRequest<'a> {
    /// Request for a first generation with `strategy`.
    pub fn initial(strategy: Strategy, target: &'a TargetFunction) -> Self {
        Self {
            strategy,
            target,
            previous_test: None,
            failing_tests: None,
            pytest_log: None,
        }
    }

    /// Request for an auto-repair generation.
    pub fn repair(
        target: &'a TargetFunction,
        previous_test: &'a str,
        failing_tests: &'a str,
        pytest_log: &'a str,
    ) -> Self {
        Self {
            strategy: Strategy::AutoRepair,
            target,
            previous_test: Some(previous_test),
            failing_tests: Some(failing_tests),
            pytest_log: Some(pytest_log),
        }
    }

    fn repair_fields(&self) -> [(Binding, Option<&'a str>); 3] {
        [
            (Binding::PreviousTest, self.previous_test),
            (Binding::FailingTests, self.failing_tests),
            (Binding::PytestLog, self.pytest_log),
        ]
    }
}

/// Fully substituted prompt text. Never mutated after rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPrompt {
    strategy: Strategy,
    text: String,
}

impl RenderedPrompt {
    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }
}

impl fmt::Display for RenderedPrompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Validates requests and renders them through a [`TemplateRegistry`].
#[derive(Debug, Clone)]
pub struct PromptRenderer {
    registry: TemplateRegistry,
    signature_hint: bool,
}

impl PromptRenderer {
    pub fn new(registry: TemplateRegistry) -> Self {
        Self {
            registry,
            signature_hint: true,
        }
    }

    /// Append the target's metadata hint to rendered prompts (default on).
    pub fn with_signature_hint(mut self, enabled: bool) -> Self {
        self.signature_hint = enabled;
        self
    }

    pub fn registry(&self) -> &TemplateRegistry {
        &self.registry
    }

    /// Render `request`. Deterministic: equal requests give identical text.
    pub fn build(&self, request: &PromptRequest<'_>) -> Result<RenderedPrompt> {
        let strategy = request.strategy;
        let target = request.target;

        let mut bindings = Bindings::new()
            .with(Binding::ModuleName, target.module_name())
            .with(Binding::FunctionName, target.function_name())
            .with(Binding::Code, target.source_code());

        if strategy.is_initial() {
            if let Some((binding, _)) = request
                .repair_fields()
                .into_iter()
                .find(|(_, value)| value.is_some())
            {
                return Err(TinyTestError::UnexpectedBinding { strategy, binding });
            }
        } else {
            let pytest_log = request.pytest_log.ok_or(TinyTestError::MissingBinding {
                strategy,
                binding: Binding::PytestLog,
            })?;
            // The previous file may stand in for the failing tests.
            let failing_tests = request
                .failing_tests
                .or(request.previous_test)
                .ok_or(TinyTestError::MissingBinding {
                    strategy,
                    binding: Binding::FailingTests,
                })?;

            bindings.insert(Binding::FailingTests, failing_tests);
            bindings.insert(Binding::PytestLog, pytest_log);
            if let Some(previous_test) = request.previous_test {
                bindings.insert(Binding::PreviousTest, previous_test);
            }
        }

        let mut text = self.registry.render(strategy, &bindings)?;

        if self.signature_hint {
            if let Some(metadata) = target.metadata() {
                text.push_str("\n\n");
                text.push_str(&metadata.hint());
                text.push('\n');
            }
        }

        Ok(RenderedPrompt { strategy, text })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::{ArgMetadata, FunctionMetadata};
    use crate::template::DEFAULT_PACKAGE;

    fn renderer() -> PromptRenderer {
        PromptRenderer::new(TemplateRegistry::new(DEFAULT_PACKAGE).unwrap())
    }

    fn target() -> TargetFunction {
        TargetFunction::new("mathutils", "add", "def add(a,b): return a+b").unwrap()
    }

    #[test]
    fn test_build_initial_request() {
        let target = target();
        let prompt = renderer()
            .build(&PromptRequest::initial(Strategy::Structured, &target))
            .unwrap();
        assert_eq!(prompt.strategy(), Strategy::Structured);
        assert!(prompt.as_str().contains("def add(a,b): return a+b"));
        assert!(prompt
            .as_str()
            .contains("from data.modules.mathutils import add"));
    }

    #[test]
    fn test_build_is_pure() {
        let target = target();
        let renderer = renderer();
        let request = PromptRequest::repair(&target, "old file", "def test_a(): ...", "1 failed");
        let a = renderer.build(&request).unwrap();
        let b = renderer.build(&request.clone()).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_str().as_bytes(), b.as_str().as_bytes());
    }

    #[test]
    fn test_build_repair_contains_failing_tests_and_log() {
        let target = target();
        let failing = "def test_add_zero():\n    assert add(0, 0) == 1";
        let log = "E       assert 0 == 1\nFAILED t.py::test_add_zero";
        let prompt = renderer()
            .build(&PromptRequest::repair(&target, "whole file", failing, log))
            .unwrap();
        assert_eq!(prompt.strategy(), Strategy::AutoRepair);
        assert!(prompt.as_str().contains(failing));
        assert!(prompt.as_str().contains(log));
        assert!(prompt.as_str().contains("whole file"));
    }

    #[test]
    fn test_build_rejects_repair_fields_on_initial_strategy() {
        let target = target();
        let mut request = PromptRequest::initial(Strategy::ZeroShot, &target);
        request.pytest_log = Some("log");
        match renderer().build(&request) {
            Err(TinyTestError::UnexpectedBinding { strategy, binding }) => {
                assert_eq!(strategy, Strategy::ZeroShot);
                assert_eq!(binding, Binding::PytestLog);
            }
            other => panic!("expected UnexpectedBinding, got {:?}", other),
        }
    }

    #[test]
    fn test_build_repair_without_log_is_missing_binding() {
        let target = target();
        let mut request = PromptRequest::repair(&target, "file", "tests", "log");
        request.pytest_log = None;
        assert!(matches!(
            renderer().build(&request),
            Err(TinyTestError::MissingBinding {
                binding: Binding::PytestLog,
                ..
            })
        ));
    }

    #[test]
    fn test_build_repair_uses_previous_test_in_place_of_failing_tests() {
        let target = target();
        let mut request = PromptRequest::repair(&target, "PREVIOUS FILE BODY", "unused", "log");
        request.failing_tests = None;
        let prompt = renderer().build(&request).unwrap();
        assert_eq!(prompt.as_str().matches("PREVIOUS FILE BODY").count(), 2);

        request.previous_test = None;
        assert!(matches!(
            renderer().build(&request),
            Err(TinyTestError::MissingBinding {
                binding: Binding::FailingTests,
                ..
            })
        ));
    }

    #[test]
    fn test_build_auto_repair_via_initial_constructor_is_missing_binding() {
        let target = target();
        let request = PromptRequest::initial(Strategy::AutoRepair, &target);
        assert!(matches!(
            renderer().build(&request),
            Err(TinyTestError::MissingBinding { .. })
        ));
    }

    #[test]
    fn test_build_appends_signature_hint_when_enabled() {
        let target = target().with_metadata(Some(FunctionMetadata {
            name: "add".to_string(),
            args: vec![
                ArgMetadata {
                    name: "a".to_string(),
                    arg_type: None,
                },
                ArgMetadata {
                    name: "b".to_string(),
                    arg_type: None,
                },
            ],
            returns: None,
            docstring: None,
        }));
        let request = PromptRequest::initial(Strategy::FewShot, &target);

        let with_hint = renderer().build(&request).unwrap();
        assert!(with_hint
            .as_str()
            .ends_with("HINT - Function: add, Args: a, b, Returns: None\n"));

        let without_hint = renderer()
            .with_signature_hint(false)
            .build(&request)
            .unwrap();
        assert!(!without_hint.as_str().contains("HINT - Function"));
    }
}
