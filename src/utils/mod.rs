//! Miscellaneous utility structs and functions.

mod task_spawner;

use derive_more::Display;

#[doc(inline)]
pub use self::task_spawner::{
    HasTaskHandlesStorage, ObservableSpawner, TaskDisposer, TaskHandlesStorage,
};

/// Error raised when a [`Weak`] reference to a destroyed object is
/// upgraded.
///
/// [`Weak`]: std::rc::Weak
#[derive(Clone, Copy, Debug, Display)]
#[display(fmt = "Object was unexpectedly dropped")]
pub struct Detached;

/// Upgrades a newtyped [`Weak`] reference stored as `self.0`, `break`ing out
/// of the enclosing loop instead of returning, for use in spawned watcher
/// tasks that should just stop silently once their owner is gone.
///
/// [`Weak`]: std::rc::Weak
macro_rules! upgrade_or_break {
    ($weak:expr) => {
        match $weak.upgrade() {
            Some(strong) => strong,
            None => break,
        }
    };
}

pub(crate) use upgrade_or_break;

/// Trait for errors that optionally carry an underlying cause of a fixed
/// type (typically a [`platform::Error`]).
///
/// Implemented via `#[derive(Caused)]` from the `sipphone-macro` crate.
///
/// [`platform::Error`]: crate::platform::Error
pub trait Caused {
    /// Type of an error this [`Caused`] error may be caused by.
    type Error;

    /// Returns the cause of this error, if it has a structured one.
    fn cause(self) -> Option<Self::Error>;
}
