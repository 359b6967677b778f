//! Small formatting helpers shared across this crate's `Display`/`Debug` impls.

use std::fmt;

/// Wraps a `Display` value so it prints via `Display` when formatted with
/// `{:?}` -- useful for embedding hash types (whose `Debug` impl would
/// otherwise add a distracting tuple-struct wrapper) inside a `debug_struct`.
pub struct DisplayToDebug<T>(pub T);

impl<T: fmt::Display> fmt::Debug for DisplayToDebug<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}
