//! Layered mocks with guaranteed restoration.
//!
//! Several independent call sites can override members of the same
//! [`Target`]. Each `install` pushes a layer, each `uninstall` pops one and
//! re-applies the rest, and once the last layer is gone the target is back
//! to its pristine state.
//!
//! ## Example
//!
//! ```rust,ignore
//! use probar_bdd::mock::{install, uninstall, Overrides, Target};
//!
//! let clock = Target::new("clock").with_fn("now", |_| Ok(json!(1000)));
//! let handle = install(&clock, Overrides::new().function("now", |base, args| {
//!     let real = base.call(args)?;
//!     Ok(json!(real.as_i64().unwrap_or(0) + 60))
//! }));
//! assert_eq!(clock.call("now", &[])?, json!(1060));
//! assert_eq!(handle.count("now"), 1);
//! uninstall(&clock, None);
//! assert_eq!(clock.call("now", &[])?, json!(1000));
//! ```

pub mod overrides;
pub mod patch;
pub mod stack;
pub mod target;

pub use overrides::{CallRecord, CallTracker, Override, OverrideFn, Overrides};
pub use stack::{install, uninstall, CallThrough, LayerHandle, LayerId, MockRegistry};
pub use target::{Member, MemberFn, Target, TargetId};
