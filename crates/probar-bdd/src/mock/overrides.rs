//! Override declarations and call tracking.

use super::stack::CallThrough;
use crate::result::BddResult;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

/// Override function: receives the call-through and the call arguments
pub type OverrideFn = Rc<dyn Fn(&CallThrough, &[Value]) -> BddResult<Value>>;

/// Replacement for a single member
#[derive(Clone)]
pub enum Override {
    /// Replace the member with a literal value; never tracked
    Value(Value),
    /// Replace the member with a function that can call through
    Function(OverrideFn),
    /// Pass calls through unchanged while recording them
    Track,
}

impl fmt::Debug for Override {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Self::Function(_) => f.write_str("Function(..)"),
            Self::Track => f.write_str("Track"),
        }
    }
}

/// Set of member overrides for one mock layer
///
/// # Example
///
/// ```ignore
/// let overrides = Overrides::new()
///     .value("retries", json!(0))
///     .function("fetch", |base, args| {
///         let real = base.call(args)?;
///         Ok(json!(format!("{}!", real.as_str().unwrap_or_default())))
///     })
///     .track("log");
/// ```
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub(crate) entries: BTreeMap<String, Override>,
    pub(crate) track_all: bool,
    pub(crate) tracker: Option<CallTracker>,
}

impl Overrides {
    /// Create an empty override set
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Track every function member of the target, passing calls through
    #[must_use]
    pub fn track_all() -> Self {
        Self {
            track_all: true,
            ..Self::default()
        }
    }

    /// Replace a member with a literal value
    #[must_use]
    pub fn value(mut self, name: impl Into<String>, value: Value) -> Self {
        let _ = self.entries.insert(name.into(), Override::Value(value));
        self
    }

    /// Replace a member with a function
    #[must_use]
    pub fn function<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&CallThrough, &[Value]) -> BddResult<Value> + 'static,
    {
        let _ = self
            .entries
            .insert(name.into(), Override::Function(Rc::new(f)));
        self
    }

    /// Record calls to a member without changing its behavior
    #[must_use]
    pub fn track(mut self, name: impl Into<String>) -> Self {
        let _ = self.entries.insert(name.into(), Override::Track);
        self
    }

    /// Record calls into an external tracker instead of the layer's own
    #[must_use]
    pub fn tracked_by(mut self, tracker: &CallTracker) -> Self {
        self.tracker = Some(tracker.clone());
        self
    }

    /// Number of explicit entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if there are no explicit entries and tracking is not total
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && !self.track_all
    }
}

/// Calls recorded for one overridden function
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CallRecord {
    /// Number of invocations
    pub count: usize,
    /// Arguments of every invocation, in call order
    pub calls: Vec<Vec<Value>>,
}

/// Shared receptacle for call records, keyed by member name
#[derive(Clone, Default)]
pub struct CallTracker {
    records: Rc<RefCell<BTreeMap<String, CallRecord>>>,
}

impl fmt::Debug for CallTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.records.borrow().iter()).finish()
    }
}

impl CallTracker {
    /// Create an empty tracker
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the record for a member, if it is tracked
    #[must_use]
    pub fn record(&self, name: &str) -> Option<CallRecord> {
        self.records.borrow().get(name).cloned()
    }

    /// Number of calls to a member (0 if untracked)
    #[must_use]
    pub fn count(&self, name: &str) -> usize {
        self.records.borrow().get(name).map_or(0, |r| r.count)
    }

    /// Ordered call arguments for a member (empty if untracked)
    #[must_use]
    pub fn calls(&self, name: &str) -> Vec<Vec<Value>> {
        self.records
            .borrow()
            .get(name)
            .map(|r| r.calls.clone())
            .unwrap_or_default()
    }

    /// Names of tracked members
    #[must_use]
    pub fn tracked(&self) -> Vec<String> {
        self.records.borrow().keys().cloned().collect()
    }

    pub(crate) fn reset(&self, name: &str) {
        let _ = self
            .records
            .borrow_mut()
            .insert(name.to_string(), CallRecord::default());
    }

    pub(crate) fn push(&self, name: &str, args: &[Value]) {
        let mut records = self.records.borrow_mut();
        let record = records.entry(name.to_string()).or_default();
        record.count += 1;
        record.calls.push(args.to_vec());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builder_collects_entries() {
        let overrides = Overrides::new()
            .value("a", json!(1))
            .function("b", |_, _| Ok(Value::Null))
            .track("c");
        assert_eq!(overrides.len(), 3);
        assert!(!overrides.is_empty());
        assert!(matches!(overrides.entries["a"], Override::Value(_)));
        assert!(matches!(overrides.entries["b"], Override::Function(_)));
        assert!(matches!(overrides.entries["c"], Override::Track));
    }

    #[test]
    fn test_track_all_is_not_empty() {
        let overrides = Overrides::track_all();
        assert_eq!(overrides.len(), 0);
        assert!(!overrides.is_empty());
        assert!(Overrides::new().is_empty());
    }

    #[test]
    fn test_tracker_records_in_order() {
        let tracker = CallTracker::new();
        tracker.reset("f");
        tracker.push("f", &[json!(1)]);
        tracker.push("f", &[json!(2), json!("x")]);
        assert_eq!(tracker.count("f"), 2);
        assert_eq!(
            tracker.calls("f"),
            vec![vec![json!(1)], vec![json!(2), json!("x")]]
        );
        assert_eq!(tracker.tracked(), vec!["f"]);
    }

    #[test]
    fn test_reset_clears_record() {
        let tracker = CallTracker::new();
        tracker.push("f", &[]);
        tracker.reset("f");
        assert_eq!(tracker.record("f"), Some(CallRecord::default()));
        assert!(tracker.record("g").is_none());
        assert_eq!(tracker.count("g"), 0);
    }

    #[test]
    fn test_clones_share_records() {
        let tracker = CallTracker::new();
        let other = tracker.clone();
        other.push("f", &[json!(true)]);
        assert_eq!(tracker.count("f"), 1);
    }
}
