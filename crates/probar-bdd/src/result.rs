//! Result and error types for Probar BDD.

use crate::step::Phase;
use thiserror::Error;

/// Boxed error returned by step bodies and mock functions
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type for Probar BDD operations
pub type BddResult<T> = Result<T, BddError>;

/// Result of a single step body
pub type StepResult = Result<(), BoxError>;

/// Errors that can occur while declaring or running a scenario
#[derive(Debug, Error)]
pub enum BddError {
    /// A phase was declared after a later phase
    #[error("Declaration order error: {message}")]
    DeclarationOrder {
        /// Error message
        message: String,
    },

    /// Scenario has no `then` step
    #[error("A scenario must have at least one test (\"then\" clause).")]
    MissingThen,

    /// Scenario definition closure failed
    #[error("Scenario definition failed: {message}")]
    Definition {
        /// Error message
        message: String,
    },

    /// A step returned an error or completed its callback with one
    #[error("{phase} step {label:?} failed: {source}")]
    StepFailed {
        /// Phase the step belonged to
        phase: Phase,
        /// Step label (empty for hooks)
        label: String,
        /// The error the step produced
        source: BoxError,
    },

    /// A step panicked
    #[error("{phase} step {label:?} panicked: {message}")]
    StepPanicked {
        /// Phase the step belonged to
        phase: Phase,
        /// Step label (empty for hooks)
        label: String,
        /// Panic payload rendered as text
        message: String,
    },

    /// An async step dropped its completion handle without calling it
    #[error("{phase} step {label:?} dropped its completion callback")]
    CompletionDropped {
        /// Phase the step belonged to
        phase: Phase,
        /// Step label (empty for hooks)
        label: String,
    },

    /// A member was called that is missing or not a function
    #[error("{target}.{member} is not callable")]
    NotCallable {
        /// Target name
        target: String,
        /// Member name
        member: String,
    },
}

impl BddError {
    /// Create a declaration order error
    #[must_use]
    pub fn declaration_order(message: impl Into<String>) -> Self {
        Self::DeclarationOrder {
            message: message.into(),
        }
    }

    /// Create a not-callable error
    #[must_use]
    pub fn not_callable(target: impl Into<String>, member: impl Into<String>) -> Self {
        Self::NotCallable {
            target: target.into(),
            member: member.into(),
        }
    }

    /// Phase in which the error was recorded, if it came from a step
    #[must_use]
    pub const fn phase(&self) -> Option<Phase> {
        match self {
            Self::StepFailed { phase, .. }
            | Self::StepPanicked { phase, .. }
            | Self::CompletionDropped { phase, .. } => Some(*phase),
            _ => None,
        }
    }

    /// The error a failing step produced, downcast to its concrete type
    #[must_use]
    pub fn step_error<E: std::error::Error + 'static>(&self) -> Option<&E> {
        match self {
            Self::StepFailed { source, .. } => source.downcast_ref::<E>(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Error, PartialEq)]
    #[error("boom {0}")]
    struct Boom(u32);

    #[test]
    fn test_missing_then_message() {
        assert_eq!(
            BddError::MissingThen.to_string(),
            "A scenario must have at least one test (\"then\" clause)."
        );
    }

    #[test]
    fn test_step_error_downcast() {
        let err = BddError::StepFailed {
            phase: Phase::Then,
            label: "it works".to_string(),
            source: Box::new(Boom(7)),
        };
        assert_eq!(err.step_error::<Boom>(), Some(&Boom(7)));
        assert_eq!(err.phase(), Some(Phase::Then));
        assert!(err.to_string().contains("boom 7"));
    }

    #[test]
    fn test_non_step_errors_have_no_phase() {
        assert!(BddError::MissingThen.phase().is_none());
        assert!(BddError::declaration_order("x").phase().is_none());
        assert!(BddError::not_callable("obj", "foo")
            .step_error::<Boom>()
            .is_none());
    }
}
