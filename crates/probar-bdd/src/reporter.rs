//! Reporting scenario outcomes to the host runner.
//!
//! The host sees exactly one error per failed scenario, the first one
//! recorded. Anything recorded after it goes to a [`DiagnosticSink`] and
//! never changes the pass/fail signal.

use crate::result::{BddError, BddResult};
use crate::sequencer::Outcome;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Destination for secondary errors
pub trait DiagnosticSink {
    /// Receive one secondary error of a scenario
    fn diagnostic(&self, scenario: &str, error: &BddError);
}

/// Emits diagnostics as `tracing` error events
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn diagnostic(&self, scenario: &str, error: &BddError) {
        tracing::error!(scenario, error = %error, "additional scenario error");
    }
}

/// Keeps diagnostics in memory
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    entries: Rc<RefCell<Vec<String>>>,
}

impl MemorySink {
    /// Create an empty sink
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Collected diagnostics as `"<scenario>: <error>"`
    #[must_use]
    pub fn entries(&self) -> Vec<String> {
        self.entries.borrow().clone()
    }
}

impl DiagnosticSink for MemorySink {
    fn diagnostic(&self, scenario: &str, error: &BddError) {
        self.entries.borrow_mut().push(format!("{scenario}: {error}"));
    }
}

/// Converts outcomes into the host runner's completion contract
pub struct ResultReporter {
    sink: Box<dyn DiagnosticSink>,
}

impl fmt::Debug for ResultReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultReporter").finish_non_exhaustive()
    }
}

impl Default for ResultReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ResultReporter {
    /// Reporter that sends diagnostics to `tracing`
    #[must_use]
    pub fn new() -> Self {
        Self::with_sink(TracingSink)
    }

    /// Reporter with a custom diagnostic sink
    #[must_use]
    pub fn with_sink(sink: impl DiagnosticSink + 'static) -> Self {
        Self {
            sink: Box::new(sink),
        }
    }

    /// Synchronous completion: `Ok` on success, the primary error otherwise
    ///
    /// # Errors
    ///
    /// Returns the scenario's first recorded error.
    pub fn report(&self, outcome: Outcome) -> BddResult<()> {
        let description = outcome.description().to_string();
        let (primary, secondary) = outcome.into_parts();
        match primary {
            None => Ok(()),
            Some(err) => {
                for extra in &secondary {
                    self.sink.diagnostic(&description, extra);
                }
                Err(err)
            }
        }
    }

    /// Callback completion: `done(None)` on success, `done(Some(error))` otherwise
    ///
    /// The callback runs before secondary errors are emitted.
    pub fn complete<F>(&self, outcome: Outcome, done: F)
    where
        F: FnOnce(Option<BddError>),
    {
        let description = outcome.description().to_string();
        let (primary, secondary) = outcome.into_parts();
        done(primary);
        for extra in &secondary {
            self.sink.diagnostic(&description, extra);
        }
    }
}
