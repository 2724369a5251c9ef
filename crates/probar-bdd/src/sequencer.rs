//! Step sequencing.
//!
//! Drains a scenario's queues in phase order (setup, given, when, then,
//! teardown), one step at a time. A callback-style step suspends the run
//! until its [`Done`](crate::step::Done) is called.
//!
//! Failure policy:
//!
//! - setup/given/when: record the error and discard everything up to
//!   teardown
//! - then: record the error and keep going
//! - teardown: record the error and keep going; teardown always drains
//!
//! Nothing a step does escapes as a panic; every failure becomes a
//! recorded [`BddError`].

use crate::result::{BddError, BddResult};
use crate::scenario::Scenario;
use crate::step::{Done, Phase, Step, StepBody};
use crate::world::World;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;
use std::time::{Duration, Instant};

/// Result of one scenario run
#[derive(Debug)]
#[must_use]
pub struct Outcome {
    description: String,
    errors: Vec<BddError>,
    steps_run: usize,
    duration: Duration,
}

impl Outcome {
    /// Description of the scenario that produced this outcome
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Check if no error was recorded
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }

    /// The scenario's failure: the first recorded error
    #[must_use]
    pub fn primary(&self) -> Option<&BddError> {
        self.errors.first()
    }

    /// Errors recorded after the first one
    #[must_use]
    pub fn secondary(&self) -> &[BddError] {
        self.errors.get(1..).unwrap_or_default()
    }

    /// Every recorded error, in order
    #[must_use]
    pub fn errors(&self) -> &[BddError] {
        &self.errors
    }

    /// Number of steps that were executed
    #[must_use]
    pub const fn steps_run(&self) -> usize {
        self.steps_run
    }

    /// Wall-clock time of the run
    #[must_use]
    pub const fn duration(&self) -> Duration {
        self.duration
    }

    /// Split into the primary error and the remaining diagnostics
    #[must_use]
    pub fn into_parts(self) -> (Option<BddError>, Vec<BddError>) {
        let mut errors = self.errors.into_iter();
        let primary = errors.next();
        (primary, errors.collect())
    }

    /// The primary error as a `Result`, discarding diagnostics
    ///
    /// # Errors
    ///
    /// Returns the first recorded error if the scenario failed.
    pub fn into_result(self) -> BddResult<()> {
        match self.into_parts().0 {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Runs scenarios step by step
#[derive(Debug, Default, Clone, Copy)]
pub struct StepSequencer;

impl StepSequencer {
    /// Create a sequencer
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Run a scenario on the current thread, blocking on async steps
    pub fn run_blocking(&self, scenario: Scenario) -> Outcome {
        futures::executor::block_on(self.run(scenario))
    }

    /// Run a scenario to completion
    pub async fn run(&self, mut scenario: Scenario) -> Outcome {
        let start = Instant::now();
        let mut world = World::new(Rc::clone(&scenario.teardown));

        if let Some(err) = scenario.definition_error.take() {
            tracing::warn!(scenario = %scenario.description, error = %err, "scenario is invalid");
            scenario.errors.push(err);
            discard_until_teardown(&mut scenario);
        } else if scenario.then.is_empty() {
            tracing::warn!(scenario = %scenario.description, "scenario has no then step");
            scenario.errors.push(BddError::MissingThen);
            discard_until_teardown(&mut scenario);
        }

        let mut steps_run = 0;
        while let Some((phase, step)) = next_step(&mut scenario) {
            steps_run += 1;
            if let Err(err) = execute(phase, step, &mut world).await {
                let aborting = phase.aborts_on_failure();
                tracing::warn!(
                    scenario = %scenario.description,
                    %phase,
                    aborting,
                    error = %err,
                    "step failed"
                );
                scenario.errors.push(err);
                if aborting {
                    discard_until_teardown(&mut scenario);
                }
            }
        }

        Outcome {
            description: scenario.description,
            errors: scenario.errors,
            steps_run,
            duration: start.elapsed(),
        }
    }
}

/// Drop every queued setup/given/when/then step
fn discard_until_teardown(scenario: &mut Scenario) {
    scenario.setup.clear();
    scenario.given.clear();
    scenario.when.clear();
    scenario.then.clear();
}

fn next_step(scenario: &mut Scenario) -> Option<(Phase, Step)> {
    if let Some(step) = scenario.setup.pop_front() {
        return Some((Phase::Setup, step));
    }
    if let Some(step) = scenario.given.pop_front() {
        return Some((Phase::Given, step));
    }
    if let Some(step) = scenario.when.pop_front() {
        return Some((Phase::When, step));
    }
    if let Some(step) = scenario.then.pop_front() {
        return Some((Phase::Then, step));
    }
    // Teardown steps may queue more teardown; pop one at a time.
    let step = scenario.teardown.borrow_mut().pop_front()?;
    Some((Phase::Teardown, step))
}

async fn execute(phase: Phase, step: Step, world: &mut World) -> BddResult<()> {
    let label = step.label.unwrap_or_default();
    tracing::debug!(%phase, label = %label, "step started");

    let result = match step.body {
        StepBody::Sync(f) => match catch_unwind(AssertUnwindSafe(|| f(world))) {
            Ok(Ok(())) => Ok(()),
            Ok(Err(source)) => Err(BddError::StepFailed {
                phase,
                label: label.clone(),
                source,
            }),
            Err(payload) => Err(BddError::StepPanicked {
                phase,
                label: label.clone(),
                message: panic_message(payload.as_ref()),
            }),
        },
        StepBody::Async(f) => {
            let (done, completion) = Done::channel();
            match catch_unwind(AssertUnwindSafe(|| f(world, done))) {
                Err(payload) => Err(BddError::StepPanicked {
                    phase,
                    label: label.clone(),
                    message: panic_message(payload.as_ref()),
                }),
                Ok(()) => match completion.await {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(source)) => Err(BddError::StepFailed {
                        phase,
                        label: label.clone(),
                        source,
                    }),
                    Err(_canceled) => Err(BddError::CompletionDropped {
                        phase,
                        label: label.clone(),
                    }),
                },
            }
        }
    };

    tracing::debug!(%phase, label = %label, ok = result.is_ok(), "step finished");
    result
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
