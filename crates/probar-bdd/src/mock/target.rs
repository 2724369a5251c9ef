//! Mockable target objects.
//!
//! A [`Target`] is a shared, named table of members. Clones share the same
//! table, so a mock installed through one handle is visible through all of
//! them.

use crate::result::{BddError, BddResult};
use serde_json::Value;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

/// Function stored as a target member
pub type MemberFn = Rc<dyn Fn(&[Value]) -> BddResult<Value>>;

static NEXT_TARGET_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a target, stable across clones
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TargetId(u64);

impl TargetId {
    fn next() -> Self {
        Self(NEXT_TARGET_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// A single member of a target
#[derive(Clone)]
pub enum Member {
    /// Literal value
    Value(Value),
    /// Callable member
    Function(MemberFn),
}

impl Member {
    /// Wrap a closure as a function member
    pub fn function<F>(f: F) -> Self
    where
        F: Fn(&[Value]) -> BddResult<Value> + 'static,
    {
        Self::Function(Rc::new(f))
    }

    /// Check if this member is callable
    #[must_use]
    pub const fn is_function(&self) -> bool {
        matches!(self, Self::Function(_))
    }
}

impl fmt::Debug for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Self::Function(_) => f.write_str("Function(..)"),
        }
    }
}

pub(crate) struct TargetInner {
    pub(crate) id: TargetId,
    pub(crate) name: String,
    pub(crate) members: RefCell<BTreeMap<String, Member>>,
    /// Pre-patch state of every member the flat patch has touched
    pub(crate) snapshot: RefCell<Option<BTreeMap<String, Option<Member>>>>,
}

impl Drop for TargetInner {
    fn drop(&mut self) {
        super::stack::release(self.id);
    }
}

/// A shared object whose members can be overridden
#[derive(Clone)]
pub struct Target {
    pub(crate) inner: Rc<TargetInner>,
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Target")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("members", &self.member_names())
            .field("patched", &self.is_patched())
            .finish()
    }
}

impl PartialEq for Target {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Target {}

impl Target {
    /// Create an empty target
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: Rc::new(TargetInner {
                id: TargetId::next(),
                name: name.into(),
                members: RefCell::new(BTreeMap::new()),
                snapshot: RefCell::new(None),
            }),
        }
    }

    /// Add a literal member
    #[must_use]
    pub fn with_value(self, name: impl Into<String>, value: Value) -> Self {
        self.set_value(name, value);
        self
    }

    /// Add a function member
    #[must_use]
    pub fn with_fn<F>(self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&[Value]) -> BddResult<Value> + 'static,
    {
        self.set_fn(name, f);
        self
    }

    /// Set a literal member
    pub fn set_value(&self, name: impl Into<String>, value: Value) {
        self.set_member(name, Member::Value(value));
    }

    /// Set a function member
    pub fn set_fn<F>(&self, name: impl Into<String>, f: F)
    where
        F: Fn(&[Value]) -> BddResult<Value> + 'static,
    {
        self.set_member(name, Member::function(f));
    }

    /// Set a member directly
    pub fn set_member(&self, name: impl Into<String>, member: Member) {
        let _ = self.inner.members.borrow_mut().insert(name.into(), member);
    }

    /// Remove a member
    pub fn remove_member(&self, name: &str) -> Option<Member> {
        self.inner.members.borrow_mut().remove(name)
    }

    /// Identity of this target
    #[must_use]
    pub fn id(&self) -> TargetId {
        self.inner.id
    }

    /// Target name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Current member by name
    #[must_use]
    pub fn member(&self, name: &str) -> Option<Member> {
        self.inner.members.borrow().get(name).cloned()
    }

    /// Current literal value of a member, `None` for functions and missing members
    #[must_use]
    pub fn value(&self, name: &str) -> Option<Value> {
        match self.member(name)? {
            Member::Value(v) => Some(v),
            Member::Function(_) => None,
        }
    }

    /// Call a function member
    ///
    /// # Errors
    ///
    /// Returns [`BddError::NotCallable`] if the member is missing or a
    /// literal value, otherwise whatever the member returns.
    pub fn call(&self, name: &str, args: &[Value]) -> BddResult<Value> {
        // Clone out of the table so the member may touch this target again.
        match self.member(name) {
            Some(Member::Function(f)) => f(args),
            _ => Err(BddError::not_callable(self.name(), name)),
        }
    }

    /// Names of all members
    #[must_use]
    pub fn member_names(&self) -> Vec<String> {
        self.inner.members.borrow().keys().cloned().collect()
    }

    /// Names of all function members
    #[must_use]
    pub fn function_names(&self) -> Vec<String> {
        self.inner
            .members
            .borrow()
            .iter()
            .filter(|(_, m)| m.is_function())
            .map(|(k, _)| k.clone())
            .collect()
    }

    /// Check whether the flat patch is currently applied
    #[must_use]
    pub fn is_patched(&self) -> bool {
        self.inner.snapshot.borrow().is_some()
    }

    pub(crate) fn downgrade(&self) -> Weak<TargetInner> {
        Rc::downgrade(&self.inner)
    }

    pub(crate) fn from_weak(weak: &Weak<TargetInner>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }
}
