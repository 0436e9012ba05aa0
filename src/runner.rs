//! Repair Loop Controller.
//!
//! Drives one target function through GENERATE -> VALIDATE -> REPAIR ->
//! VALIDATE ... until a candidate passes or the attempt budget runs out.
//! Every generation call, successful or not, consumes one attempt.

use tracing::{debug, info, warn};

use crate::candidate::{CandidateTestFile, StructuralDefect};
use crate::error::{Result, TinyTestError};
use crate::generation::{GenerationClient, GenerationError};
use crate::render::{PromptRenderer, PromptRequest, RenderedPrompt};
use crate::signal::SignalHandler;
use crate::state::{LoopState, RepairSnapshot};
use crate::target::TargetFunction;
use crate::template::Strategy;
use crate::validation::{TestValidator, ValidationError, ValidationResult};

/// Terminal artifact of one loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopOutcome {
    /// Last conforming candidate, `None` if every generation call failed.
    pub final_test_file: Option<CandidateTestFile>,
    pub attempts_used: u32,
    pub converged: bool,
}

/// Progress notifications, in the order they happen.
#[derive(Debug, Clone, Copy)]
pub enum LoopEvent<'a> {
    Transition {
        from: LoopState,
        to: LoopState,
    },
    /// A prompt is about to be sent; `attempt` is 1-based.
    Prompted {
        attempt: u32,
        prompt: &'a RenderedPrompt,
    },
    Generated {
        attempt: u32,
        candidate: &'a CandidateTestFile,
    },
    GenerationFailed {
        attempt: u32,
        error: &'a GenerationError,
    },
    /// Rejected by the structural checks; the validator is not called.
    Rejected {
        attempt: u32,
        defect: &'a StructuralDefect,
    },
    Validating {
        attempt: u32,
    },
    Validated {
        attempt: u32,
        result: &'a ValidationResult,
    },
}

/// Bounded generate/validate/repair loop over one generation client and one
/// validator. Holds no per-run state, so one instance may serve many targets.
pub struct RepairLoop<G, V> {
    renderer: PromptRenderer,
    client: G,
    validator: V,
    signal: Option<SignalHandler>,
}

impl<G: GenerationClient, V: TestValidator> RepairLoop<G, V> {
    pub fn new(renderer: PromptRenderer, client: G, validator: V) -> Self {
        Self {
            renderer,
            client,
            validator,
            signal: None,
        }
    }

    /// Stop before the next external call once `signal` is raised.
    pub fn with_signal_handler(mut self, signal: SignalHandler) -> Self {
        self.signal = Some(signal);
        self
    }

    pub fn renderer(&self) -> &PromptRenderer {
        &self.renderer
    }

    pub fn run(
        &self,
        target: &TargetFunction,
        strategy: Strategy,
        max_attempts: u32,
    ) -> Result<LoopOutcome> {
        self.run_with_events(target, strategy, max_attempts, |_| {})
    }

    /// Run the loop, reporting each step to `on_event`.
    ///
    /// Non-convergence is `Ok` with `converged == false`. Errors are reserved
    /// for malformed input, an unusable validator, and cancellation.
    pub fn run_with_events<F>(
        &self,
        target: &TargetFunction,
        strategy: Strategy,
        max_attempts: u32,
        mut on_event: F,
    ) -> Result<LoopOutcome>
    where
        F: FnMut(&LoopEvent<'_>),
    {
        if max_attempts == 0 {
            return Err(TinyTestError::InvalidMaxAttempts(max_attempts));
        }
        if !strategy.is_initial() {
            return Err(TinyTestError::InvalidStrategy(strategy));
        }

        let required_import = self
            .renderer
            .registry()
            .required_import(target.module_name(), target.function_name());

        let mut attempts_used: u32 = 0;
        let mut snapshot: Option<RepairSnapshot> = None;
        let mut state = LoopState::Generate;

        debug!(
            module = target.module_name(),
            function = target.function_name(),
            %strategy,
            max_attempts,
            "starting repair loop"
        );

        let converged = loop {
            // GENERATE or REPAIR
            self.check_cancelled(attempts_used)?;

            let prompt = match (state, &snapshot) {
                (LoopState::Repair, Some(snapshot)) => {
                    debug!(
                        from_attempt = snapshot.attempt(),
                        failing = snapshot.diagnostic().failing_test_names.len(),
                        "building repair prompt"
                    );
                    let failing_tests = snapshot.failing_tests();
                    self.renderer.build(&PromptRequest::repair(
                        target,
                        snapshot.candidate().source(),
                        &failing_tests,
                        &snapshot.diagnostic().log,
                    ))?
                }
                _ => self
                    .renderer
                    .build(&PromptRequest::initial(strategy, target))?,
            };

            attempts_used += 1;
            let attempt = attempts_used;
            on_event(&LoopEvent::Prompted {
                attempt,
                prompt: &prompt,
            });

            let generated = self
                .client
                .generate(&prompt)
                .and_then(|raw| CandidateTestFile::parse(raw));
            let candidate = match generated {
                Ok(candidate) => {
                    on_event(&LoopEvent::Generated {
                        attempt,
                        candidate: &candidate,
                    });
                    candidate
                }
                Err(error) => {
                    warn!(attempt, %error, "generation failed");
                    on_event(&LoopEvent::GenerationFailed {
                        attempt,
                        error: &error,
                    });
                    // Keep the previous snapshot: the next repair still
                    // targets the latest candidate and its own diagnostic.
                    let next = if attempts_used >= max_attempts {
                        LoopState::Exhausted
                    } else if snapshot.is_some() {
                        LoopState::Repair
                    } else {
                        LoopState::Generate
                    };
                    transition(&mut state, next, &mut on_event);
                    if next.is_terminal() {
                        break false;
                    }
                    continue;
                }
            };

            transition(&mut state, LoopState::Validate, &mut on_event);

            // VALIDATE
            self.check_cancelled(attempts_used)?;

            let result = match candidate.check_structure(&required_import, target.function_name())
            {
                Err(defect) => {
                    warn!(attempt, %defect, "candidate rejected before validation");
                    on_event(&LoopEvent::Rejected {
                        attempt,
                        defect: &defect,
                    });
                    ValidationResult::structural(&defect)
                }
                Ok(()) => {
                    on_event(&LoopEvent::Validating { attempt });
                    match self.validator.validate(&candidate, target) {
                        Ok(result) => result,
                        Err(ValidationError::Timeout(secs)) => {
                            warn!(attempt, secs, "validation timed out");
                            ValidationResult::timed_out(secs)
                        }
                        Err(ValidationError::Unavailable(message)) => {
                            return Err(TinyTestError::Validator(message));
                        }
                    }
                }
            };
            on_event(&LoopEvent::Validated {
                attempt,
                result: &result,
            });

            let passed = result.passed;
            snapshot = Some(RepairSnapshot::new(attempt, candidate, result));

            let next = if passed {
                LoopState::Succeeded
            } else if attempts_used >= max_attempts {
                LoopState::Exhausted
            } else {
                LoopState::Repair
            };
            transition(&mut state, next, &mut on_event);
            if next.is_terminal() {
                break passed;
            }
        };

        info!(
            module = target.module_name(),
            attempts_used,
            converged,
            "repair loop finished"
        );

        Ok(LoopOutcome {
            final_test_file: snapshot.map(RepairSnapshot::into_candidate),
            attempts_used,
            converged,
        })
    }

    fn check_cancelled(&self, attempts_used: u32) -> Result<()> {
        match &self.signal {
            Some(signal) if signal.is_shutdown_requested() => {
                debug!(attempts_used, "repair loop cancelled");
                Err(TinyTestError::Cancelled { attempts_used })
            }
            _ => Ok(()),
        }
    }
}

fn transition<F>(state: &mut LoopState, to: LoopState, on_event: &mut F)
where
    F: FnMut(&LoopEvent<'_>),
{
    debug!(from = %state, %to, "state transition");
    on_event(&LoopEvent::Transition { from: *state, to });
    *state = to;
}
