//! Walking error source chains.
//!
//! [`chain`] iterates over an error and every error reachable through
//! [`Error::source`], outermost first. [`collect`] uses it to pull every
//! instance of one concrete error type out of the chain, which is how the
//! context attached at each wrap layer is recovered:
//!
//! ```
//! use errorcontext::{BaseError, collect_from};
//!
//! let inner = BaseError::new("connection refused", vec!["x"]);
//! let outer = BaseError::new(inner, vec!["y"]);
//!
//! let context: Vec<&str> = collect_from::<BaseError<Vec<&str>>>(&outer)
//!     .into_iter()
//!     .flat_map(|err| err.context().iter().copied())
//!     .collect();
//! assert_eq!(context, ["y", "x"]);
//! ```

use core::{iter::FusedIterator, ptr};
use std::error::Error;

/// An iterator over an error and its transitive [sources](Error::source).
///
/// Created by [`chain`]. The first item is the error the iterator was created
/// from, the last item is the innermost cause.
#[must_use]
#[derive(Clone)]
pub struct Chain<'a> {
    next: Option<&'a (dyn Error + 'static)>,
}

/// Iterates over `err` and everything reachable from it through
/// [`Error::source`]. A `None` input yields an empty iterator.
pub fn chain<'a>(err: Option<&'a (dyn Error + 'static)>) -> Chain<'a> {
    Chain { next: err }
}

impl<'a> Iterator for Chain<'a> {
    type Item = &'a (dyn Error + 'static);

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = current.source();
        Some(current)
    }
}

impl FusedIterator for Chain<'_> {}

/// Collects every error of type `E` found in the chain of `err`.
///
/// The result is ordered outermost first, i.e. the most recently wrapped
/// error comes first and the innermost match comes last. A match is skipped
/// when it is the very same error value (by address) as the previously
/// collected one.
///
/// There is no "zero" sentinel: the first match is always kept, even if it is
/// a zero [`BaseError`](crate::BaseError).
///
/// Returns an empty vector for a `None` input or when nothing matches.
pub fn collect<'a, E>(err: Option<&'a (dyn Error + 'static)>) -> Vec<&'a E>
where
    E: Error + 'static,
{
    let mut found: Vec<&'a E> = Vec::new();
    for current in chain(err) {
        let Some(target) = current.downcast_ref::<E>() else {
            continue;
        };
        if found.last().is_some_and(|last| ptr::eq(*last, target)) {
            continue;
        }
        found.push(target);
    }
    found
}

/// Same as [`collect`], for callers holding a reference to a concrete error.
pub fn collect_from<'a, E>(err: &'a (dyn Error + 'static)) -> Vec<&'a E>
where
    E: Error + 'static,
{
    collect(Some(err))
}
