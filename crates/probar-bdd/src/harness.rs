//! Feature grouping and host-runner results.

use crate::config::{BddConfig, Verbosity};
use crate::reporter::ResultReporter;
use crate::result::BoxError;
use crate::scenario::{Scenario, ScenarioBuilder};
use crate::sequencer::{Outcome, StepSequencer};
use std::time::{Duration, Instant};

/// A named group of scenarios
#[derive(Debug)]
pub struct Feature {
    /// Feature description
    pub description: String,
    scenarios: Vec<Scenario>,
}

impl Feature {
    /// Create an empty feature
    #[must_use]
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            scenarios: Vec::new(),
        }
    }

    /// Group name shown by the host runner
    #[must_use]
    pub fn name(&self) -> String {
        format!("Feature: {}", self.description)
    }

    /// Define and add a scenario
    pub fn scenario<F, E>(&mut self, description: impl Into<String>, f: F) -> &mut Self
    where
        F: FnOnce(&mut ScenarioBuilder) -> Result<(), E>,
        E: Into<BoxError>,
    {
        self.scenarios.push(Scenario::define(description, f));
        self
    }

    /// Add an already built scenario
    pub fn add(&mut self, scenario: Scenario) -> &mut Self {
        self.scenarios.push(scenario);
        self
    }

    /// Get the number of scenarios
    #[must_use]
    pub fn scenario_count(&self) -> usize {
        self.scenarios.len()
    }

    /// Run every scenario with the process configuration
    #[must_use]
    pub fn run(self) -> FeatureResults {
        futures::executor::block_on(self.run_async())
    }

    /// Run every scenario with the process configuration
    pub async fn run_async(self) -> FeatureResults {
        let verbosity = BddConfig::global().verbosity;
        self.run_with(&ResultReporter::new(), verbosity).await
    }

    /// Run every scenario, one after another
    pub async fn run_with(self, reporter: &ResultReporter, verbosity: Verbosity) -> FeatureResults {
        let start = Instant::now();
        let feature = self.name();
        let sequencer = StepSequencer::new();
        let mut results = Vec::with_capacity(self.scenarios.len());

        for scenario in self.scenarios {
            let title = scenario.title(verbosity);
            let outcome = sequencer.run(scenario).await;
            results.push(ScenarioResult::from_outcome(title, &outcome));
            // Hands secondary errors to the diagnostic sink.
            let _ = reporter.report(outcome);
        }

        tracing::debug!(
            feature = %feature,
            total = results.len(),
            failed = results.iter().filter(|r| !r.passed()).count(),
            "feature finished"
        );
        FeatureResults {
            feature,
            scenarios: results,
            duration: start.elapsed(),
        }
    }
}

/// How one scenario ended, as the host runner sees it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioResult {
    /// Scenario title at the verbosity it was run with
    pub title: String,
    /// Primary error, `None` when the scenario passed
    pub error: Option<String>,
    /// Errors recorded after the primary one
    pub secondary_errors: usize,
    /// Time spent running the scenario's steps
    pub duration: Duration,
}

impl ScenarioResult {
    fn from_outcome(title: String, outcome: &Outcome) -> Self {
        Self {
            title,
            error: outcome.primary().map(ToString::to_string),
            secondary_errors: outcome.secondary().len(),
            duration: outcome.duration(),
        }
    }

    /// Check whether the scenario passed
    #[must_use]
    pub const fn passed(&self) -> bool {
        self.error.is_none()
    }
}

/// Results of running every scenario of a feature
#[derive(Debug, Clone)]
pub struct FeatureResults {
    /// `"Feature: <description>"`
    pub feature: String,
    /// One entry per scenario, in declaration order
    pub scenarios: Vec<ScenarioResult>,
    /// Wall time for the whole feature
    pub duration: Duration,
}

impl FeatureResults {
    /// Check if every scenario passed
    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.scenarios.iter().all(ScenarioResult::passed)
    }

    /// Count passing scenarios
    #[must_use]
    pub fn passed_count(&self) -> usize {
        self.scenarios.iter().filter(|r| r.passed()).count()
    }

    /// Count failing scenarios
    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.scenarios.len() - self.passed_count()
    }

    /// Failing scenarios, in declaration order
    pub fn failures(&self) -> impl Iterator<Item = &ScenarioResult> {
        self.scenarios.iter().filter(|r| !r.passed())
    }

    /// One line per scenario plus a count line
    #[must_use]
    pub fn summary(&self) -> String {
        let mut out = format!("{}\n", self.feature);
        for result in &self.scenarios {
            match &result.error {
                None => out.push_str(&format!("  {} ... ok\n", result.title)),
                Some(err) => {
                    out.push_str(&format!("  {} ... FAILED\n    {err}\n", result.title));
                    if result.secondary_errors > 0 {
                        out.push_str(&format!(
                            "    (+{} more, see diagnostics)\n",
                            result.secondary_errors
                        ));
                    }
                }
            }
        }
        out.push_str(&format!(
            "{} passed; {} failed",
            self.passed_count(),
            self.failed_count()
        ));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::BddError;
    use crate::reporter::MemorySink;

    fn sample_feature() -> Feature {
        let mut feature = Feature::new("accounts");
        let _ = feature
            .scenario("passing", |s| {
                let _ = s.when("act", |_| Ok(()))?.then("check", |_| Ok(()))?;
                Ok::<_, BddError>(())
            })
            .scenario("failing", |s| {
                let _ = s
                    .then("first", |_| Err("first".into()))?
                    .and("second", |_| Err("second".into()))?;
                Ok::<_, BddError>(())
            })
            .scenario("no then", |s| {
                let _ = s.given("setup", |_| Ok(()))?;
                Ok::<_, BddError>(())
            });
        feature
    }

    #[test]
    fn test_feature_name() {
        let feature = sample_feature();
        assert_eq!(feature.name(), "Feature: accounts");
        assert_eq!(feature.scenario_count(), 3);
    }

    #[test]
    fn test_run_collects_results() {
        let sink = MemorySink::new();
        let reporter = ResultReporter::with_sink(sink.clone());
        let results =
            futures::executor::block_on(sample_feature().run_with(&reporter, Verbosity::Normal));

        assert_eq!(results.feature, "Feature: accounts");
        assert_eq!(results.scenarios.len(), 3);
        assert_eq!(results.passed_count(), 1);
        assert_eq!(results.failed_count(), 2);
        assert!(!results.all_passed());

        let failures: Vec<_> = results.failures().collect();
        assert_eq!(failures[0].title, "Scenario: failing");
        assert!(failures[0].error.as_deref().unwrap().contains("first"));
        assert_eq!(failures[0].secondary_errors, 1);
        assert!(failures[1]
            .error
            .as_deref()
            .unwrap()
            .contains("at least one test"));
        assert_eq!(failures[1].secondary_errors, 0);
        assert_eq!(sink.entries().len(), 1);
    }

    #[test]
    fn test_verbose_titles() {
        let reporter = ResultReporter::with_sink(MemorySink::new());
        let results =
            futures::executor::block_on(sample_feature().run_with(&reporter, Verbosity::Verbose));
        assert_eq!(
            results.scenarios[0].title,
            "Scenario: passing\n         When act\n         Then check"
        );
    }

    #[test]
    fn test_summary() {
        let reporter = ResultReporter::with_sink(MemorySink::new());
        let results =
            futures::executor::block_on(sample_feature().run_with(&reporter, Verbosity::Normal));
        let summary = results.summary();
        assert!(summary.starts_with("Feature: accounts\n"));
        assert!(summary.contains("Scenario: passing ... ok"));
        assert!(summary.contains("Scenario: failing ... FAILED"));
        assert!(summary.contains("(+1 more, see diagnostics)"));
        assert!(summary.ends_with("1 passed; 2 failed"));
    }

    #[test]
    fn test_empty_feature_passes() {
        let results = Feature::new("nothing").run();
        assert!(results.all_passed());
        assert!(results.scenarios.is_empty());
        assert_eq!(results.summary(), "Feature: nothing\n0 passed; 0 failed");
    }
}
