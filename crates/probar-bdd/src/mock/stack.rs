//! Layered mock stacks.
//!
//! Every mocked target has a stack of layers in a thread-local
//! [`MockRegistry`], keyed by [`TargetId`]. The target always shows the
//! merge of its layers (oldest first, later layers win); installing or
//! removing a layer reverts the flat patch and re-applies the new merge.
//!
//! ```text
//!   layer 2  { fetch: wrap(f2) }            <- top, wins on "fetch"
//!   layer 1  { fetch: wrap(f1), retries: 0 }
//!   originals { fetch: <real fetch>, retries: 3 }
//! ```
//!
//! Call-through is resolved when the override runs, so `f2` reaches `f1`
//! and `f1` reaches the real `fetch`. Removing layer 1 makes `f2` reach the
//! real `fetch` directly.

use super::overrides::{CallRecord, CallTracker, Override, OverrideFn, Overrides};
use super::patch;
use super::target::{Member, Target, TargetId, TargetInner};
use crate::result::{BddError, BddResult};
use serde_json::Value;
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::rc::Weak;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_LAYER_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static REGISTRY: RefCell<MockRegistry> = RefCell::new(MockRegistry::default());
}

/// Identity of one installed layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LayerId(u64);

impl LayerId {
    fn next() -> Self {
        Self(NEXT_LAYER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// One installed set of overrides
#[derive(Debug)]
struct MockLayer {
    id: LayerId,
    members: BTreeMap<String, Member>,
}

/// All active layers of one target, oldest first
#[derive(Debug, Default)]
struct MockStack {
    layers: Vec<MockLayer>,
    /// Pristine member for every key any layer has overridden
    originals: BTreeMap<String, Option<Member>>,
}

impl MockStack {
    fn merged(&self) -> BTreeMap<String, Member> {
        let mut merged = BTreeMap::new();
        for layer in &self.layers {
            for (name, member) in &layer.members {
                let _ = merged.insert(name.clone(), member.clone());
            }
        }
        merged
    }

    /// Member directly beneath `layer` for `name`; `None` if the layer is gone
    fn beneath(&self, layer: LayerId, name: &str) -> Option<Option<Member>> {
        let index = self.layers.iter().position(|l| l.id == layer)?;
        let lower = self.layers[..index]
            .iter()
            .rev()
            .find_map(|l| l.members.get(name).cloned());
        Some(lower.or_else(|| self.originals.get(name).cloned().flatten()))
    }
}

/// Registry of mock stacks, one per mocked target
///
/// A target has an entry only while at least one layer is installed on
/// it. The registry is per thread; targets are not `Send`, so every call
/// site that can reach a target shares its stack.
#[derive(Debug, Default)]
pub struct MockRegistry {
    stacks: HashMap<TargetId, MockStack>,
}

impl MockRegistry {
    /// Number of layers currently installed on `target`
    #[must_use]
    pub fn depth(target: &Target) -> usize {
        REGISTRY.with(|r| {
            r.borrow()
                .stacks
                .get(&target.id())
                .map_or(0, |s| s.layers.len())
        })
    }

    /// Check whether `target` has any layer installed
    #[must_use]
    pub fn is_mocked(target: &Target) -> bool {
        Self::depth(target) > 0
    }

    /// Layer ids installed on `target`, oldest first
    #[must_use]
    pub fn layers(target: &Target) -> Vec<LayerId> {
        REGISTRY.with(|r| {
            r.borrow()
                .stacks
                .get(&target.id())
                .map(|s| s.layers.iter().map(|l| l.id).collect())
                .unwrap_or_default()
        })
    }

    /// Number of targets with at least one layer on this thread
    #[must_use]
    pub fn active_targets() -> usize {
        REGISTRY.with(|r| r.borrow().stacks.len())
    }
}

/// Reference to the implementation an override replaced
///
/// Passed explicitly to every override function.
#[derive(Debug, Clone)]
pub struct CallThrough {
    target: Weak<TargetInner>,
    target_id: TargetId,
    layer: LayerId,
    member: String,
}

impl CallThrough {
    /// Name of the overridden member
    #[must_use]
    pub fn member(&self) -> &str {
        &self.member
    }

    /// The member as it would be without this layer
    #[must_use]
    pub fn resolve(&self) -> Option<Member> {
        let beneath = REGISTRY.with(|r| {
            r.borrow()
                .stacks
                .get(&self.target_id)
                .and_then(|s| s.beneath(self.layer, &self.member))
        });
        match beneath {
            Some(member) => member,
            // Layer already removed: whatever the target shows now.
            None => Target::from_weak(&self.target)?.member(&self.member),
        }
    }

    /// Invoke the implementation beneath this layer
    ///
    /// # Errors
    ///
    /// Returns [`BddError::NotCallable`] if nothing callable lies beneath,
    /// otherwise whatever the lower implementation returns. A literal value
    /// beneath is returned as-is.
    pub fn call(&self, args: &[Value]) -> BddResult<Value> {
        match self.resolve() {
            Some(Member::Function(f)) => f(args),
            Some(Member::Value(v)) => Ok(v),
            None => {
                let target = Target::from_weak(&self.target)
                    .map_or_else(|| "<dropped>".to_string(), |t| t.name().to_string());
                Err(BddError::not_callable(target, self.member.clone()))
            }
        }
    }
}

/// Handle to an installed layer
#[derive(Debug, Clone)]
pub struct LayerHandle {
    target: TargetId,
    layer: LayerId,
    tracker: CallTracker,
}

impl LayerHandle {
    /// Layer identity
    #[must_use]
    pub const fn id(&self) -> LayerId {
        self.layer
    }

    /// Identity of the mocked target
    #[must_use]
    pub const fn target_id(&self) -> TargetId {
        self.target
    }

    /// Tracker receiving this layer's call records
    #[must_use]
    pub const fn tracker(&self) -> &CallTracker {
        &self.tracker
    }

    /// Call record for an overridden function
    #[must_use]
    pub fn record(&self, name: &str) -> Option<CallRecord> {
        self.tracker.record(name)
    }

    /// Number of calls to an overridden function
    #[must_use]
    pub fn count(&self, name: &str) -> usize {
        self.tracker.count(name)
    }

    /// Ordered arguments of every call to an overridden function
    #[must_use]
    pub fn calls(&self, name: &str) -> Vec<Vec<Value>> {
        self.tracker.calls(name)
    }

    /// Check whether this layer is still installed
    #[must_use]
    pub fn is_installed(&self) -> bool {
        REGISTRY.with(|r| {
            r.borrow()
                .stacks
                .get(&self.target)
                .is_some_and(|s| s.layers.iter().any(|l| l.id == self.layer))
        })
    }
}

fn tracked_member(
    target: &Target,
    layer: LayerId,
    name: &str,
    tracker: &CallTracker,
    f: Option<OverrideFn>,
) -> Member {
    let through = CallThrough {
        target: target.downgrade(),
        target_id: target.id(),
        layer,
        member: name.to_string(),
    };
    let tracker = tracker.clone();
    Member::function(move |args| {
        tracker.push(&through.member, args);
        match &f {
            Some(f) => f(&through, args),
            None => through.call(args),
        }
    })
}

/// Push a new layer of overrides onto `target`
///
/// The layer stays until [`uninstall`] removes it or `target` is dropped.
/// Nothing removes it at the end of a scenario; inside steps use
/// [`World::mock`](crate::world::World::mock), which queues the removal as
/// a teardown step.
pub fn install(target: &Target, overrides: Overrides) -> LayerHandle {
    let Overrides {
        mut entries,
        track_all,
        tracker,
    } = overrides;
    if track_all {
        for name in target.function_names() {
            let _ = entries.entry(name).or_insert(Override::Track);
        }
    }

    let id = LayerId::next();
    let tracker = tracker.unwrap_or_default();
    let mut members = BTreeMap::new();
    for (name, entry) in entries {
        let member = match entry {
            Override::Value(value) => Member::Value(value),
            Override::Function(f) => {
                tracker.reset(&name);
                tracked_member(target, id, &name, &tracker, Some(f))
            }
            Override::Track => {
                tracker.reset(&name);
                tracked_member(target, id, &name, &tracker, None)
            }
        };
        let _ = members.insert(name, member);
    }

    let (merged, depth) = REGISTRY.with(|r| {
        let mut registry = r.borrow_mut();
        let stack = registry.stacks.entry(target.id()).or_default();
        for name in members.keys() {
            if !stack.originals.contains_key(name) {
                let _ = stack.originals.insert(name.clone(), target.member(name));
            }
        }
        stack.layers.push(MockLayer { id, members });
        (stack.merged(), stack.layers.len())
    });

    patch::revert(target);
    patch::apply(target, merged);
    tracing::trace!(target_name = target.name(), ?id, depth, "mock layer installed");

    LayerHandle {
        target: target.id(),
        layer: id,
        tracker,
    }
}

/// Remove a layer from `target` and re-apply the remaining ones
///
/// Removes the layer named by `handle`, or the most recent layer when
/// `handle` is `None`. Returns `false` (and changes nothing) if there is
/// no such layer.
pub fn uninstall(target: &Target, handle: Option<&LayerHandle>) -> bool {
    remove_layer(target, handle.map(LayerHandle::id))
}

pub(crate) fn remove_layer(target: &Target, layer: Option<LayerId>) -> bool {
    let removed = REGISTRY.with(|r| {
        let mut registry = r.borrow_mut();
        let stack = registry.stacks.get_mut(&target.id())?;
        let index = match layer {
            Some(id) => stack.layers.iter().position(|l| l.id == id)?,
            None => stack.layers.len().checked_sub(1)?,
        };
        let layer = stack.layers.remove(index);
        let (remaining, emptied) = if stack.layers.is_empty() {
            (None, registry.stacks.remove(&target.id()))
        } else {
            (Some(stack.merged()), None)
        };
        Some((layer, remaining, emptied))
    });

    // Dropped outside the registry borrow; captured targets may release theirs.
    let Some((layer, remaining, _emptied)) = removed else {
        tracing::trace!(target_name = target.name(), "no mock layer to remove");
        return false;
    };

    patch::revert(target);
    let depth = remaining.as_ref().map_or(0, |_| MockRegistry::depth(target));
    if let Some(merged) = remaining {
        patch::apply(target, merged);
    }
    tracing::trace!(target_name = target.name(), id = ?layer.id, depth, "mock layer removed");
    true
}

/// Forget the stack of a target that is being dropped
pub(crate) fn release(id: TargetId) {
    let stack = REGISTRY
        .try_with(|r| {
            r.try_borrow_mut()
                .ok()
                .and_then(|mut registry| registry.stacks.remove(&id))
        })
        .ok()
        .flatten();
    if let Some(stack) = stack {
        tracing::trace!(?id, depth = stack.layers.len(), "mocked target dropped");
    }
}
