//! Per-scenario shared state.

use crate::mock::{self, stack, LayerHandle, Overrides, Target};
use crate::result::StepResult;
use crate::step::{Done, Step};
use std::any::Any;
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::rc::Rc;

/// Teardown queue shared between a scenario's builder, world and sequencer
pub(crate) type TeardownQueue = Rc<RefCell<VecDeque<Step>>>;

/// Schedule removal of a freshly installed layer
pub(crate) fn install_with_teardown(
    teardown: &TeardownQueue,
    target: &Target,
    overrides: Overrides,
) -> LayerHandle {
    let handle = mock::install(target, overrides);
    let owned = target.clone();
    let layer = handle.id();
    let mut step = Step::sync(move |_| {
        let _ = stack::remove_layer(&owned, Some(layer));
        Ok(())
    });
    step.releases = Some((target.id(), layer));
    teardown.borrow_mut().push_back(step);
    handle
}

/// Remove the most recent layer the queue's owner installed on `target`
pub(crate) fn unmock_from_teardown(teardown: &TeardownQueue, target: &Target) -> bool {
    let released = {
        let mut queue = teardown.borrow_mut();
        let index = queue
            .iter()
            .rposition(|s| s.releases.is_some_and(|(id, _)| id == target.id()));
        index
            .and_then(|i| queue.remove(i))
            .and_then(|s| s.releases)
    };
    released.is_some_and(|(_, layer)| stack::remove_layer(target, Some(layer)))
}

/// Mutable context shared by every step of one scenario run
///
/// Created fresh for each scenario and dropped when it finishes. Values are
/// stored by name and retrieved by type.
pub struct World {
    values: HashMap<String, Box<dyn Any>>,
    teardown: TeardownQueue,
}

impl fmt::Debug for World {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<_> = self.values.keys().collect();
        keys.sort();
        f.debug_struct("World")
            .field("values", &keys)
            .field("teardown", &self.teardown.borrow().len())
            .finish()
    }
}

impl World {
    pub(crate) fn new(teardown: TeardownQueue) -> Self {
        Self {
            values: HashMap::new(),
            teardown,
        }
    }

    #[cfg(test)]
    pub(crate) fn detached() -> Self {
        Self::new(TeardownQueue::default())
    }

    /// Store a value under `key`, replacing any previous value
    pub fn set<T: Any>(&mut self, key: impl Into<String>, value: T) {
        let _ = self.values.insert(key.into(), Box::new(value));
    }

    /// Borrow a value, `None` if missing or of another type
    #[must_use]
    pub fn get<T: Any>(&self, key: &str) -> Option<&T> {
        self.values.get(key).and_then(|v| v.downcast_ref::<T>())
    }

    /// Mutably borrow a value, `None` if missing or of another type
    #[must_use]
    pub fn get_mut<T: Any>(&mut self, key: &str) -> Option<&mut T> {
        self.values.get_mut(key).and_then(|v| v.downcast_mut::<T>())
    }

    /// Remove and return a value of type `T`
    ///
    /// A value of another type is left in place.
    pub fn take<T: Any>(&mut self, key: &str) -> Option<T> {
        if !self.values.get(key).is_some_and(|v| v.is::<T>()) {
            return None;
        }
        self.values
            .remove(key)
            .and_then(|v| v.downcast::<T>().ok())
            .map(|v| *v)
    }

    /// Check whether a key is present
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Install a mock layer that is removed at teardown
    pub fn mock(&mut self, target: &Target, overrides: Overrides) -> LayerHandle {
        install_with_teardown(&self.teardown, target, overrides)
    }

    /// Remove this scenario's most recent layer on `target` right away
    ///
    /// Returns `false` if this scenario has no layer on it.
    pub fn unmock(&mut self, target: &Target) -> bool {
        unmock_from_teardown(&self.teardown, target)
    }

    /// Schedule a synchronous teardown step
    pub fn after<F>(&mut self, f: F)
    where
        F: FnOnce(&mut World) -> StepResult + 'static,
    {
        self.teardown.borrow_mut().push_back(Step::sync(f));
    }

    /// Schedule a callback-style teardown step
    pub fn after_async<F>(&mut self, f: F)
    where
        F: FnOnce(&mut World, Done) + 'static,
    {
        self.teardown.borrow_mut().push_back(Step::callback(f));
    }

    /// Number of pending teardown steps
    #[must_use]
    pub fn pending_teardown(&self) -> usize {
        self.teardown.borrow().len()
    }
}
