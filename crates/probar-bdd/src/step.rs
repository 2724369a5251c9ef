//! Steps and phases.
//!
//! A step is either synchronous (returns its result) or callback-style
//! (receives a [`Done`] handle and completes whenever it calls it). The
//! kind is chosen when the step is declared; nothing inspects closures.

use crate::mock::{LayerId, TargetId};
use crate::result::{BoxError, StepResult};
use crate::world::World;
use futures::channel::oneshot;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the five ordered phases of a scenario
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Phase {
    /// `before` hooks
    Setup,
    /// Preconditions
    Given,
    /// Actions
    When,
    /// Assertions
    Then,
    /// `after` hooks and mock removal
    Teardown,
}

impl Phase {
    /// All phases in execution order
    pub const ALL: [Self; 5] = [
        Self::Setup,
        Self::Given,
        Self::When,
        Self::Then,
        Self::Teardown,
    ];

    /// Whether a failure in this phase skips everything up to teardown
    #[must_use]
    pub const fn aborts_on_failure(self) -> bool {
        matches!(self, Self::Setup | Self::Given | Self::When)
    }

    /// Display name
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Setup => "setup",
            Self::Given => "given",
            Self::When => "when",
            Self::Then => "then",
            Self::Teardown => "teardown",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Synchronous step body
pub type SyncStepFn = Box<dyn FnOnce(&mut World) -> StepResult>;

/// Callback-style step body
pub type AsyncStepFn = Box<dyn FnOnce(&mut World, Done)>;

/// How a step completes
pub enum StepBody {
    /// Completes when it returns
    Sync(SyncStepFn),
    /// Completes when it calls its [`Done`]
    Async(AsyncStepFn),
}

impl fmt::Debug for StepBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sync(_) => f.write_str("Sync(..)"),
            Self::Async(_) => f.write_str("Async(..)"),
        }
    }
}

/// A single unit of behavior within a phase
#[derive(Debug)]
pub struct Step {
    pub(crate) label: Option<String>,
    pub(crate) body: StepBody,
    /// Mock layer this step removes, for teardown entries
    pub(crate) releases: Option<(TargetId, LayerId)>,
}

impl Step {
    /// Create a synchronous step
    pub fn sync<F>(f: F) -> Self
    where
        F: FnOnce(&mut World) -> StepResult + 'static,
    {
        Self::from_body(StepBody::Sync(Box::new(f)))
    }

    /// Create a callback-style step
    pub fn callback<F>(f: F) -> Self
    where
        F: FnOnce(&mut World, Done) + 'static,
    {
        Self::from_body(StepBody::Async(Box::new(f)))
    }

    const fn from_body(body: StepBody) -> Self {
        Self {
            label: None,
            body,
            releases: None,
        }
    }

    /// Attach a human-readable label
    #[must_use]
    pub fn labeled(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Human-readable label, if any
    #[must_use]
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Check if this step completes through a callback
    #[must_use]
    pub const fn is_async(&self) -> bool {
        matches!(self.body, StepBody::Async(_))
    }
}

/// Completion handle passed to callback-style steps
///
/// Consuming it resumes the scenario. It can be moved to another thread or
/// stored and called later; dropping it without calling counts as a failure.
#[derive(Debug)]
pub struct Done {
    tx: oneshot::Sender<StepResult>,
}

impl Done {
    pub(crate) fn channel() -> (Self, oneshot::Receiver<StepResult>) {
        let (tx, rx) = oneshot::channel();
        (Self { tx }, rx)
    }

    /// Complete successfully
    pub fn ok(self) {
        self.complete(Ok(()));
    }

    /// Complete with an error
    pub fn fail(self, error: impl Into<BoxError>) {
        self.complete(Err(error.into()));
    }

    /// Complete with a result
    pub fn complete(self, result: StepResult) {
        // The sequencer is gone only if the scenario itself was dropped.
        let _ = self.tx.send(result);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_order() {
        let mut sorted = Phase::ALL;
        sorted.sort();
        assert_eq!(sorted, Phase::ALL);
        assert!(Phase::Setup < Phase::Teardown);
    }

    #[test]
    fn test_abort_policy() {
        assert!(Phase::Setup.aborts_on_failure());
        assert!(Phase::Given.aborts_on_failure());
        assert!(Phase::When.aborts_on_failure());
        assert!(!Phase::Then.aborts_on_failure());
        assert!(!Phase::Teardown.aborts_on_failure());
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(Phase::Given.to_string(), "given");
        assert_eq!(Phase::Teardown.to_string(), "teardown");
    }

    #[test]
    fn test_step_kinds() {
        let step = Step::sync(|_| Ok(())).labeled("sync");
        assert!(!step.is_async());
        assert_eq!(step.label(), Some("sync"));

        let step = Step::callback(|_, done| done.ok());
        assert!(step.is_async());
        assert!(step.label().is_none());
    }

    #[test]
    fn test_done_delivers_result() {
        let (done, mut rx) = Done::channel();
        done.fail("nope");
        let result = rx.try_recv().unwrap().unwrap();
        assert_eq!(result.unwrap_err().to_string(), "nope");
    }

    #[test]
    fn test_dropped_done_cancels() {
        let (done, mut rx) = Done::channel();
        drop(done);
        assert!(rx.try_recv().is_err());
    }
}
