//! The context-carrying error wrapper.
//!
//! [`BaseError`] pairs an underlying cause with an arbitrary, typed context
//! payload. The wrapper is invisible to anyone who only looks at the error
//! message: [`Display`](core::fmt::Display) forwards to the cause, and
//! [`Error::source`] returns the cause so that downcasting and chain walking
//! keep working through any number of wrap layers.
//!
//! Adapters usually put a thin newtype around `BaseError<T>` for their own
//! concrete context type, see the `errorcontext-tracing` and
//! `errorcontext-opentelemetry` crates.
//!
//! ```
//! use errorcontext::BaseError;
//!
//! let io = std::io::Error::other("disk full");
//! let mut err = BaseError::new(io, vec!["path=/tmp/a"]);
//! err.context_mut().push("attempt=3");
//!
//! assert_eq!(err.to_string(), "disk full");
//! assert_eq!(err.context(), &["path=/tmp/a", "attempt=3"]);
//! ```

use core::fmt;
use std::error::Error;

/// A boxed, thread-safe error trait object.
///
/// This is the cause type held by [`BaseError`] and the error type produced by
/// [`default_error_generator`](crate::default_error_generator).
pub type BoxError = Box<dyn Error + Send + Sync + 'static>;

/// An error wrapper that carries a typed context payload next to its cause.
///
/// The wrapper never changes the textual representation of the error it
/// decorates. The payload is a side channel, reachable only by code that
/// explicitly asks for it via [`BaseError::context`] or
/// [`collect`](crate::collect).
///
/// A wrapper without a cause is the *zero* wrapper, see
/// [`BaseError::is_zero`]. No observation other than `is_zero` and
/// `is_panic` is meaningful on a zero wrapper.
pub struct BaseError<T> {
    cause: Option<BoxError>,
    context: T,
    is_panic: bool,
}

impl<T> BaseError<T> {
    /// Wraps `cause`, attaching `context` to it.
    ///
    /// ```
    /// use errorcontext::BaseError;
    ///
    /// let err = BaseError::new("connection reset", ("peer", 42));
    /// assert_eq!(err.to_string(), "connection reset");
    /// assert_eq!(err.context(), &("peer", 42));
    /// ```
    pub fn new<E>(cause: E, context: T) -> Self
    where
        E: Into<BoxError>,
    {
        Self {
            cause: Some(cause.into()),
            context,
            is_panic: false,
        }
    }

    /// Builds a wrapper from its raw parts. A `None` cause yields a zero
    /// wrapper.
    pub fn from_parts(cause: Option<BoxError>, context: T) -> Self {
        Self {
            cause,
            context,
            is_panic: false,
        }
    }

    /// Returns `true` if this wrapper has no cause.
    ///
    /// For the "unset receiver" case use `Option::is_none_or(BaseError::is_zero)`
    /// on an `Option<&BaseError<T>>`.
    pub fn is_zero(&self) -> bool {
        self.cause.is_none()
    }

    /// The wrapped error.
    pub fn cause(&self) -> Option<&(dyn Error + Send + Sync + 'static)> {
        self.cause.as_deref()
    }

    /// Consumes the wrapper, returning the wrapped error.
    pub fn into_cause(self) -> Option<BoxError> {
        self.cause
    }

    /// Consumes the wrapper, returning the wrapped error and the context.
    pub fn into_parts(self) -> (Option<BoxError>, T) {
        (self.cause, self.context)
    }

    /// The attached context.
    pub fn context(&self) -> &T {
        &self.context
    }

    /// Mutable access to the attached context.
    ///
    /// Appending is a caller policy; nothing here merges values.
    pub fn context_mut(&mut self) -> &mut T {
        &mut self.context
    }

    /// Replaces the attached context.
    pub fn set_context(&mut self, context: T) {
        self.context = context;
    }

    /// Replaces the context with `f(old_context)`.
    ///
    /// This is the `set_context(combine(context(), more))` idiom adapters use
    /// to append values.
    pub fn update_context(&mut self, f: impl FnOnce(T) -> T)
    where
        T: Default,
    {
        let old = core::mem::take(&mut self.context);
        self.context = f(old);
    }

    /// Flags this error as originating from a recovered panic.
    ///
    /// ```
    /// use errorcontext::BaseError;
    ///
    /// let err = BaseError::new("boom", ()).mark_as_panic();
    /// assert!(err.is_panic());
    /// ```
    #[must_use]
    pub fn mark_as_panic(mut self) -> Self {
        self.is_panic = true;
        self
    }

    /// Whether this error was flagged by [`BaseError::mark_as_panic`].
    pub fn is_panic(&self) -> bool {
        self.is_panic
    }
}

impl<T: Default> Default for BaseError<T> {
    fn default() -> Self {
        Self::from_parts(None, T::default())
    }
}

impl<T> fmt::Display for BaseError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.cause {
            Some(cause) => fmt::Display::fmt(cause, f),
            None => Ok(()),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for BaseError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BaseError")
            .field("cause", &self.cause)
            .field("context", &self.context)
            .field("is_panic", &self.is_panic)
            .finish()
    }
}

impl<T: fmt::Debug> Error for BaseError<T> {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.cause
            .as_deref()
            .map(|cause| cause as &(dyn Error + 'static))
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::*;

    static_assertions::assert_impl_all!(BaseError<Vec<String>>: Send, Sync, Error);
    static_assertions::assert_not_impl_any!(BaseError<Vec<String>>: Clone);

    #[test]
    fn test_zero_wrapper() {
        let err = BaseError::<Vec<String>>::default();
        assert!(err.is_zero());
        assert!(!err.is_panic());
        assert!(err.source().is_none());

        let unset: Option<&BaseError<Vec<String>>> = None;
        assert!(unset.is_none_or(BaseError::is_zero));

        let err = BaseError::from_parts(None, 7u8);
        assert!(err.is_zero());

        let err = BaseError::new(io::Error::other("boom"), ());
        assert!(!err.is_zero());
    }

    #[test]
    fn test_message_is_unchanged_by_wrapping() {
        let mut err: BoxError = Box::new(io::Error::other("original error"));
        for depth in 0..5 {
            err = Box::new(BaseError::new(err, depth));
        }
        assert_eq!(err.to_string(), "original error");
    }

    #[test]
    fn test_source_is_the_cause() {
        let err = BaseError::new(io::Error::new(io::ErrorKind::NotFound, "missing"), ());
        let source = err.source().expect("wrapper must expose its cause");
        let io_err = source
            .downcast_ref::<io::Error>()
            .expect("cause must downcast to io::Error");
        assert_eq!(io_err.kind(), io::ErrorKind::NotFound);

        let cause = err.into_cause().expect("cause must be present");
        assert!(cause.downcast_ref::<io::Error>().is_some());
    }

    #[test]
    fn test_context_accessors() {
        let mut err = BaseError::new("failed", vec!["attr1".to_string()]);
        err.context_mut().push("attr2".to_string());
        assert_eq!(err.context(), &["attr1", "attr2"]);

        err.set_context(vec!["attr3".to_string()]);
        assert_eq!(err.context(), &["attr3"]);

        err.update_context(|mut ctx| {
            ctx.push("attr4".to_string());
            ctx
        });
        assert_eq!(err.context(), &["attr3", "attr4"]);

        let (cause, context) = err.into_parts();
        assert_eq!(cause.map(|c| c.to_string()).as_deref(), Some("failed"));
        assert_eq!(context.len(), 2);
    }

    #[test]
    fn test_mark_as_panic() {
        let err = BaseError::new("boom", ());
        assert!(!err.is_panic());
        let err = err.mark_as_panic();
        assert!(err.is_panic());

        let zero = BaseError::<()>::default().mark_as_panic();
        assert!(zero.is_panic());
    }

    #[test]
    fn test_zero_wrapper_display_is_empty() {
        let err = BaseError::<()>::default();
        assert_eq!(err.to_string(), "");
    }
}
