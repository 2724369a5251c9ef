//! Probar BDD: given/when/then scenarios with layered mocks
//!
//! A scenario is a list of steps in five phases: setup, given, when, then
//! and teardown. Steps share one [`World`] per run, may be synchronous or
//! complete through a callback, and can override members of shared
//! [`Target`](mock::Target) objects. Every override is removed at teardown,
//! whatever happened before.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────┐    ┌────────────────┐    ┌────────────────┐
//! │ScenarioBuilder │───►│ StepSequencer  │───►│ ResultReporter │
//! │ phase queues   │    │ setup → given  │    │ primary error  │
//! │ order checks   │    │ → when → then  │    │ + diagnostics  │
//! └────────────────┘    │ → teardown     │    └────────────────┘
//!                       └───────┬────────┘
//!                               │ mock / unmock
//!                       ┌───────▼────────┐
//!                       │  MockRegistry  │
//!                       │ layers per     │
//!                       │ target         │
//!                       └────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use probar_bdd::prelude::*;
//!
//! let mut feature = Feature::new("greeting");
//! feature.scenario("a mocked greeting", |s| {
//!     let greeter = Target::new("greeter").with_fn("greet", |_| Ok(json!("hello")));
//!     let g = greeter.clone();
//!     s.given("a louder greeter", move |w| {
//!         w.mock(&g, Overrides::new().function("greet", |base, args| {
//!             Ok(json!(base.call(args)?.as_str().unwrap_or_default().to_uppercase()))
//!         }));
//!         Ok(())
//!     })?
//!     .when("greeting", move |w| { w.set("said", greeter.call("greet", &[])?); Ok(()) })?
//!     .then("it shouts", |w| { assert_eq!(w.get::<Value>("said"), Some(&json!("HELLO"))); Ok(()) })?;
//!     Ok::<_, BddError>(())
//! });
//! assert!(feature.run().all_passed());
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod harness;
pub mod mock;
pub mod reporter;
mod result;
pub mod scenario;
pub mod sequencer;
pub mod step;
mod tracing_support;
pub mod world;

pub use config::{BddConfig, Verbosity, VERBOSE_FLAG};
pub use harness::{Feature, FeatureResults, ScenarioResult};
pub use reporter::{DiagnosticSink, MemorySink, ResultReporter, TracingSink};
pub use result::{BddError, BddResult, BoxError, StepResult};
pub use scenario::{Connective, Scenario, ScenarioBuilder, Verb};
pub use sequencer::{Outcome, StepSequencer};
pub use step::{Done, Phase, Step, StepBody};
pub use tracing_support::init_tracing;
pub use world::World;

/// Common imports for writing scenarios
pub mod prelude {
    pub use crate::mock::{CallThrough, CallTracker, LayerHandle, Overrides, Target};
    pub use crate::{
        BddError, BddResult, Done, Feature, Phase, Scenario, ScenarioBuilder, StepResult, World,
    };
    pub use serde_json::{json, Value};
}
