//! Flat property patching.
//!
//! `apply` replaces members and remembers what was there before; `revert`
//! puts it all back. There is exactly one patch per target: layering is the
//! job of [`crate::mock::stack`], which reverts and re-applies a merged view.

use super::target::{Member, Target};
use std::collections::BTreeMap;

/// Replace members of `target`, remembering their pre-patch state
pub fn apply(target: &Target, members: BTreeMap<String, Member>) {
    let mut snapshot = target.inner.snapshot.borrow_mut();
    let saved = snapshot.get_or_insert_with(BTreeMap::new);
    let mut table = target.inner.members.borrow_mut();
    for (name, member) in members {
        let previous = table.insert(name.clone(), member);
        // Only the first touch holds the original.
        let _ = saved.entry(name).or_insert(previous);
    }
}

/// Restore every member touched since the last revert
pub fn revert(target: &Target) {
    let Some(saved) = target.inner.snapshot.borrow_mut().take() else {
        return;
    };
    let mut table = target.inner.members.borrow_mut();
    for (name, original) in saved {
        match original {
            Some(member) => {
                let _ = table.insert(name, member);
            }
            None => {
                let _ = table.remove(&name);
            }
        }
    }
}
