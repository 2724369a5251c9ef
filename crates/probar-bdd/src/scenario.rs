//! Scenario declaration.
//!
//! [`ScenarioBuilder`] collects steps into phase queues. Phase order is
//! checked as each step is declared: once a `when` exists no `given` may
//! follow, and once a `then` exists neither may follow.
//!
//! ```rust,ignore
//! let scenario = Scenario::define("withdrawing cash", |s| {
//!     s.given("an account with 100", |w| { w.set("balance", 100_i64); Ok(()) })?
//!         .when("50 is withdrawn", |w| { *w.get_mut::<i64>("balance").unwrap() -= 50; Ok(()) })?
//!         .then("the balance is 50", |w| { assert_eq!(w.get::<i64>("balance"), Some(&50)); Ok(()) })?;
//!     Ok(())
//! });
//! let outcome = scenario.run_blocking();
//! ```

use crate::config::Verbosity;
use crate::mock::{LayerHandle, Overrides, Target};
use crate::result::{BddError, BddResult, BoxError, StepResult};
use crate::sequencer::{Outcome, StepSequencer};
use crate::step::{Done, Phase, Step};
use crate::world::{self, TeardownQueue, World};
use std::collections::VecDeque;

/// Separator between lines of a verbose scenario title
pub const TITLE_SEPARATOR: &str = "\n       ";

/// Declaration verbs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    /// Precondition
    Given,
    /// Action
    When,
    /// Assertion
    Then,
}

impl Verb {
    /// Phase the verb's steps run in
    #[must_use]
    pub const fn phase(self) -> Phase {
        match self {
            Self::Given => Phase::Given,
            Self::When => Phase::When,
            Self::Then => Phase::Then,
        }
    }

    const fn keyword(self) -> &'static str {
        match self {
            Self::Given => "Given",
            Self::When => "When",
            Self::Then => "Then",
        }
    }

    const fn bit(self) -> u8 {
        match self {
            Self::Given => 0b001,
            Self::When => 0b010,
            Self::Then => 0b100,
        }
    }
}

/// Connectives that reuse the most recent verb
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connective {
    /// `And`
    And,
    /// `But`
    But,
    /// `With`
    With,
}

impl Connective {
    const fn keyword(self) -> &'static str {
        match self {
            Self::And => "And",
            Self::But => "But",
            Self::With => "With",
        }
    }
}

/// Verbs still allowed; only ever shrinks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct AllowedVerbs(u8);

impl AllowedVerbs {
    const ALL: Self = Self(0b111);

    const fn permits(self, verb: Verb) -> bool {
        self.0 & verb.bit() != 0
    }

    fn narrow(&mut self, verb: Verb) {
        self.0 &= match verb {
            Verb::Given => 0b111,
            Verb::When => 0b110,
            Verb::Then => 0b100,
        };
    }
}

/// A declared scenario, ready to run once
#[derive(Debug)]
pub struct Scenario {
    pub(crate) description: String,
    pub(crate) lines: Vec<String>,
    pub(crate) setup: VecDeque<Step>,
    pub(crate) given: VecDeque<Step>,
    pub(crate) when: VecDeque<Step>,
    pub(crate) then: VecDeque<Step>,
    pub(crate) teardown: TeardownQueue,
    pub(crate) definition_error: Option<BddError>,
    pub(crate) errors: Vec<BddError>,
}

impl Scenario {
    /// Start declaring a scenario
    #[must_use]
    pub fn builder(description: impl Into<String>) -> ScenarioBuilder {
        ScenarioBuilder::new(description)
    }

    /// Declare a scenario through a closure
    ///
    /// An error from the closure does not escape: the scenario is still
    /// returned, and running it fails with that error before any
    /// setup, given, when or then step executes. Teardown still runs, so
    /// mocks installed before the error are released.
    pub fn define<F, E>(description: impl Into<String>, f: F) -> Self
    where
        F: FnOnce(&mut ScenarioBuilder) -> Result<(), E>,
        E: Into<BoxError>,
    {
        let mut builder = ScenarioBuilder::new(description);
        if let Err(err) = f(&mut builder) {
            let boxed: BoxError = err.into();
            let err = match boxed.downcast::<BddError>() {
                Ok(bdd) => *bdd,
                Err(other) => BddError::Definition {
                    message: other.to_string(),
                },
            };
            tracing::debug!(scenario = %builder.description, error = %err, "scenario definition failed");
            builder.definition_error = Some(err);
        }
        builder.build()
    }

    /// Scenario description
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Display name for the host runner
    ///
    /// Verbose titles list every declared step on its own line.
    #[must_use]
    pub fn title(&self, verbosity: Verbosity) -> String {
        let mut parts = vec![format!("Scenario: {}", self.description)];
        if verbosity.is_verbose() {
            parts.extend(self.lines.iter().cloned());
        }
        parts.join(TITLE_SEPARATOR)
    }

    /// Number of steps queued for a phase
    #[must_use]
    pub fn step_count(&self, phase: Phase) -> usize {
        match phase {
            Phase::Setup => self.setup.len(),
            Phase::Given => self.given.len(),
            Phase::When => self.when.len(),
            Phase::Then => self.then.len(),
            Phase::Teardown => self.teardown.borrow().len(),
        }
    }

    /// Error raised while the scenario was being defined
    #[must_use]
    pub const fn definition_error(&self) -> Option<&BddError> {
        self.definition_error.as_ref()
    }

    /// Run to completion on the current thread
    #[must_use]
    pub fn run_blocking(self) -> Outcome {
        StepSequencer::new().run_blocking(self)
    }

    /// Run to completion
    pub async fn run(self) -> Outcome {
        StepSequencer::new().run(self).await
    }
}

/// Fluent step declaration
///
/// Every verb returns `BddResult<&mut Self>` so declarations chain with `?`.
#[derive(Debug)]
pub struct ScenarioBuilder {
    description: String,
    lines: Vec<String>,
    setup: VecDeque<Step>,
    given: VecDeque<Step>,
    when: VecDeque<Step>,
    then: VecDeque<Step>,
    teardown: TeardownQueue,
    allowed: AllowedVerbs,
    last_verb: Option<Verb>,
    definition_error: Option<BddError>,
}

impl ScenarioBuilder {
    /// Create a builder with empty queues
    #[must_use]
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            lines: Vec::new(),
            setup: VecDeque::new(),
            given: VecDeque::new(),
            when: VecDeque::new(),
            then: VecDeque::new(),
            teardown: TeardownQueue::default(),
            allowed: AllowedVerbs::ALL,
            last_verb: None,
            definition_error: None,
        }
    }

    /// Declare a step for `verb`, optionally introduced by a connective
    ///
    /// # Errors
    ///
    /// Returns [`BddError::DeclarationOrder`] if `verb` is no longer allowed.
    pub fn step(
        &mut self,
        verb: Verb,
        connective: Option<Connective>,
        label: impl Into<String>,
        step: Step,
    ) -> BddResult<&mut Self> {
        if !self.allowed.permits(verb) {
            return Err(BddError::declaration_order(match verb {
                Verb::Given => "Givens must come before whens and thens.",
                Verb::When => "Whens must come before thens.",
                Verb::Then => "Thens cannot be declared here.",
            }));
        }
        let label = label.into();
        let keyword = match connective {
            Some(c) => c.keyword(),
            None if self.last_verb == Some(verb) => Connective::And.keyword(),
            None => verb.keyword(),
        };
        // Continuation lines sit one level deeper than the verb they follow.
        let indent = if keyword == verb.keyword() { "  " } else { "    " };
        self.lines.push(format!("{indent}{keyword} {label}"));

        let step = step.labeled(label);
        self.allowed.narrow(verb);
        self.last_verb = Some(verb);
        match verb {
            Verb::Given => self.given.push_back(step),
            Verb::When => self.when.push_back(step),
            Verb::Then => self.then.push_back(step),
        }
        Ok(self)
    }

    fn connect(
        &mut self,
        connective: Connective,
        label: impl Into<String>,
        step: Step,
    ) -> BddResult<&mut Self> {
        let verb = self.last_verb.ok_or_else(|| {
            BddError::declaration_order(format!(
                "\"{}\" must follow a given, when or then.",
                connective.keyword()
            ))
        })?;
        self.step(verb, Some(connective), label, step)
    }

    /// Declare a precondition
    ///
    /// # Errors
    ///
    /// Fails if a `when` or `then` has already been declared.
    pub fn given<F>(&mut self, label: impl Into<String>, f: F) -> BddResult<&mut Self>
    where
        F: FnOnce(&mut World) -> StepResult + 'static,
    {
        self.step(Verb::Given, None, label, Step::sync(f))
    }

    /// Declare a callback-style precondition
    ///
    /// # Errors
    ///
    /// Fails if a `when` or `then` has already been declared.
    pub fn given_async<F>(&mut self, label: impl Into<String>, f: F) -> BddResult<&mut Self>
    where
        F: FnOnce(&mut World, Done) + 'static,
    {
        self.step(Verb::Given, None, label, Step::callback(f))
    }

    /// Declare an action
    ///
    /// # Errors
    ///
    /// Fails if a `then` has already been declared.
    pub fn when<F>(&mut self, label: impl Into<String>, f: F) -> BddResult<&mut Self>
    where
        F: FnOnce(&mut World) -> StepResult + 'static,
    {
        self.step(Verb::When, None, label, Step::sync(f))
    }

    /// Declare a callback-style action
    ///
    /// # Errors
    ///
    /// Fails if a `then` has already been declared.
    pub fn when_async<F>(&mut self, label: impl Into<String>, f: F) -> BddResult<&mut Self>
    where
        F: FnOnce(&mut World, Done) + 'static,
    {
        self.step(Verb::When, None, label, Step::callback(f))
    }

    /// Declare an assertion
    pub fn then<F>(&mut self, label: impl Into<String>, f: F) -> BddResult<&mut Self>
    where
        F: FnOnce(&mut World) -> StepResult + 'static,
    {
        self.step(Verb::Then, None, label, Step::sync(f))
    }

    /// Declare a callback-style assertion
    pub fn then_async<F>(&mut self, label: impl Into<String>, f: F) -> BddResult<&mut Self>
    where
        F: FnOnce(&mut World, Done) + 'static,
    {
        self.step(Verb::Then, None, label, Step::callback(f))
    }

    /// Another step for the most recent verb
    ///
    /// # Errors
    ///
    /// Fails if no verb has been declared yet.
    pub fn and<F>(&mut self, label: impl Into<String>, f: F) -> BddResult<&mut Self>
    where
        F: FnOnce(&mut World) -> StepResult + 'static,
    {
        self.connect(Connective::And, label, Step::sync(f))
    }

    /// Callback-style [`and`](Self::and)
    pub fn and_async<F>(&mut self, label: impl Into<String>, f: F) -> BddResult<&mut Self>
    where
        F: FnOnce(&mut World, Done) + 'static,
    {
        self.connect(Connective::And, label, Step::callback(f))
    }

    /// Contrasting step for the most recent verb
    ///
    /// # Errors
    ///
    /// Fails if no verb has been declared yet.
    pub fn but<F>(&mut self, label: impl Into<String>, f: F) -> BddResult<&mut Self>
    where
        F: FnOnce(&mut World) -> StepResult + 'static,
    {
        self.connect(Connective::But, label, Step::sync(f))
    }

    /// Callback-style [`but`](Self::but)
    pub fn but_async<F>(&mut self, label: impl Into<String>, f: F) -> BddResult<&mut Self>
    where
        F: FnOnce(&mut World, Done) + 'static,
    {
        self.connect(Connective::But, label, Step::callback(f))
    }

    /// Qualifying step for the most recent verb
    ///
    /// # Errors
    ///
    /// Fails if no verb has been declared yet.
    pub fn with<F>(&mut self, label: impl Into<String>, f: F) -> BddResult<&mut Self>
    where
        F: FnOnce(&mut World) -> StepResult + 'static,
    {
        self.connect(Connective::With, label, Step::sync(f))
    }

    /// Callback-style [`with`](Self::with)
    pub fn with_async<F>(&mut self, label: impl Into<String>, f: F) -> BddResult<&mut Self>
    where
        F: FnOnce(&mut World, Done) + 'static,
    {
        self.connect(Connective::With, label, Step::callback(f))
    }

    /// Add a setup step, run before every given
    pub fn before<F>(&mut self, f: F) -> &mut Self
    where
        F: FnOnce(&mut World) -> StepResult + 'static,
    {
        self.setup.push_back(Step::sync(f));
        self
    }

    /// Add a callback-style setup step
    pub fn before_async<F>(&mut self, f: F) -> &mut Self
    where
        F: FnOnce(&mut World, Done) + 'static,
    {
        self.setup.push_back(Step::callback(f));
        self
    }

    /// Add a teardown step, run after everything else even on failure
    pub fn after<F>(&mut self, f: F) -> &mut Self
    where
        F: FnOnce(&mut World) -> StepResult + 'static,
    {
        self.teardown.borrow_mut().push_back(Step::sync(f));
        self
    }

    /// Add a callback-style teardown step
    pub fn after_async<F>(&mut self, f: F) -> &mut Self
    where
        F: FnOnce(&mut World, Done) + 'static,
    {
        self.teardown.borrow_mut().push_back(Step::callback(f));
        self
    }

    /// Install a mock layer now; it is removed at teardown
    pub fn mock(&mut self, target: &Target, overrides: Overrides) -> LayerHandle {
        world::install_with_teardown(&self.teardown, target, overrides)
    }

    /// Remove this scenario's most recent layer on `target` now
    pub fn unmock(&mut self, target: &Target) -> bool {
        world::unmock_from_teardown(&self.teardown, target)
    }

    /// Finish declaring
    #[must_use]
    pub fn build(self) -> Scenario {
        Scenario {
            description: self.description,
            lines: self.lines,
            setup: self.setup,
            given: self.given,
            when: self.when,
            then: self.then,
            teardown: self.teardown,
            definition_error: self.definition_error,
            errors: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(_: &mut World) -> StepResult {
        Ok(())
    }

    mod ordering_tests {
        use super::*;

        #[test]
        fn test_given_after_when_is_rejected() {
            let mut s = ScenarioBuilder::new("order");
            let _ = s.when("act", noop).unwrap();
            let err = s.given("too late", noop).unwrap_err();
            assert!(matches!(err, BddError::DeclarationOrder { .. }));
            assert!(err.to_string().contains("Givens must come before whens and thens."));
        }

        #[test]
        fn test_given_after_then_is_rejected() {
            let mut s = ScenarioBuilder::new("order");
            let _ = s.then("check", noop).unwrap();
            assert!(s.given("too late", noop).is_err());
        }

        #[test]
        fn test_when_after_then_is_rejected() {
            let mut s = ScenarioBuilder::new("order");
            let _ = s.given("ctx", noop).unwrap().then("check", noop).unwrap();
            let err = s.when("too late", noop).unwrap_err();
            assert!(err.to_string().contains("Whens must come before thens."));
        }

        #[test]
        fn test_rejected_step_is_not_queued() {
            let mut s = ScenarioBuilder::new("order");
            let _ = s.then("check", noop).unwrap();
            let _ = s.when("too late", noop);
            let scenario = s.build();
            assert_eq!(scenario.step_count(Phase::When), 0);
            assert_eq!(scenario.step_count(Phase::Then), 1);
        }

        #[test]
        fn test_connective_without_verb_is_rejected() {
            let mut s = ScenarioBuilder::new("order");
            assert!(matches!(
                s.and("dangling", noop),
                Err(BddError::DeclarationOrder { .. })
            ));
        }

        #[test]
        fn test_connectives_follow_last_verb() {
            let mut s = ScenarioBuilder::new("connect");
            let _ = s
                .given("a", noop)
                .unwrap()
                .and("b", noop)
                .unwrap()
                .when("c", noop)
                .unwrap()
                .but("d", noop)
                .unwrap()
                .then("e", noop)
                .unwrap()
                .with("f", noop)
                .unwrap();
            let scenario = s.build();
            assert_eq!(scenario.step_count(Phase::Given), 2);
            assert_eq!(scenario.step_count(Phase::When), 2);
            assert_eq!(scenario.step_count(Phase::Then), 2);
        }

        #[test]
        fn test_and_after_when_cannot_add_given() {
            let mut s = ScenarioBuilder::new("connect");
            let _ = s.given("a", noop).unwrap().when("b", noop).unwrap();
            let _ = s.and("c", noop).unwrap();
            let scenario = s.build();
            assert_eq!(scenario.step_count(Phase::Given), 1);
            assert_eq!(scenario.step_count(Phase::When), 2);
        }
    }

    mod title_tests {
        use super::*;

        fn sample() -> Scenario {
            let mut s = ScenarioBuilder::new("cash withdrawal");
            let _ = s
                .given("an account", noop)
                .unwrap()
                .and("a card", noop)
                .unwrap()
                .when("withdrawing", noop)
                .unwrap()
                .then("cash is dispensed", noop)
                .unwrap()
                .but("no receipt", noop)
                .unwrap()
                .then("balance drops", noop)
                .unwrap();
            s.build()
        }

        #[test]
        fn test_plain_title() {
            assert_eq!(
                sample().title(Verbosity::Normal),
                "Scenario: cash withdrawal"
            );
        }

        #[test]
        fn test_verbose_title_lists_steps() {
            let expected = [
                "Scenario: cash withdrawal",
                "  Given an account",
                "    And a card",
                "  When withdrawing",
                "  Then cash is dispensed",
                "    But no receipt",
                "    And balance drops",
            ]
            .join(TITLE_SEPARATOR);
            assert_eq!(sample().title(Verbosity::Verbose), expected);
        }
    }

    mod define_tests {
        use super::*;
        use serde_json::json;

        #[test]
        fn test_define_collects_steps() {
            let scenario = Scenario::define("ok", |s| {
                let _ = s.when("act", noop)?.then("check", noop)?;
                Ok::<_, BddError>(())
            });
            assert!(scenario.definition_error().is_none());
            assert_eq!(scenario.description(), "ok");
            assert_eq!(scenario.step_count(Phase::Then), 1);
        }

        #[test]
        fn test_define_keeps_declaration_error() {
            let scenario = Scenario::define("bad", |s| {
                let _ = s.then("check", noop)?.given("late", noop)?;
                Ok::<_, BddError>(())
            });
            assert!(matches!(
                scenario.definition_error(),
                Some(BddError::DeclarationOrder { .. })
            ));
        }

        #[test]
        fn test_define_wraps_foreign_error() {
            let scenario = Scenario::define("bad", |_| Err("no fixtures"));
            match scenario.definition_error() {
                Some(BddError::Definition { message }) => assert_eq!(message, "no fixtures"),
                other => panic!("unexpected {other:?}"),
            }
        }

        #[test]
        fn test_builder_mock_queues_teardown() {
            let target = Target::new("obj").with_value("x", json!(1));
            let mut s = ScenarioBuilder::new("mocking");
            let _ = s.mock(&target, Overrides::new().value("x", json!(2)));
            let _ = s.after(noop).before(noop);
            let scenario = s.build();
            assert_eq!(target.value("x"), Some(json!(2)));
            assert_eq!(scenario.step_count(Phase::Teardown), 2);
            assert_eq!(scenario.step_count(Phase::Setup), 1);
            drop(scenario.run_blocking());
            assert_eq!(target.value("x"), Some(json!(1)));
        }
    }
}
