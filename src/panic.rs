//! Panic records and the hooks that turn them into errors.

use core::{any::Any, fmt};
use std::sync::Arc;

use crate::BoxError;

/// Conventional field name for the formatted panic message.
///
/// Adapters store [`Panic::message`] under this name in their context type.
/// It is also the prefix of every formatted panic message.
pub const FIELD_NAME_PANIC_MESSAGE: &str = "panic";

/// Conventional field name for the captured panic stack trace.
///
/// Adapters store [`Panic::stack`] under this name in their context type.
pub const FIELD_NAME_PANIC_STACK_TRACE: &str = "stack";

/// A recovered panic: the formatted panic value and the captured call stack.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Panic {
    /// The formatted panic message, always starting with `"panic: "`.
    pub message: String,
    /// The captured stack, one frame per line, innermost frame first.
    pub stack: Vec<String>,
}

impl fmt::Display for Panic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.message)?;
        for (i, line) in self.stack.iter().enumerate() {
            if i > 0 {
                f.write_str("\n")?;
            }
            f.write_str(line)?;
        }
        Ok(())
    }
}

/// Converts a [`Panic`] into the error type a
/// [`Recoverer`](crate::Recoverer) returns.
///
/// Runs on the recovery path, so it should be cheap and must not panic.
pub type ErrorGenerator<E> = Arc<dyn Fn(Panic) -> E + Send + Sync>;

/// Renders panic payloads that are neither strings nor errors.
///
/// An `Err` is not fatal: the formatter falls back to the default rendering
/// and appends the failure reason to the message.
pub type ValueTransform =
    Arc<dyn Fn(&(dyn Any + Send)) -> Result<String, BoxError> + Send + Sync>;

/// The error produced by [`default_error_generator`].
#[derive(Debug, thiserror::Error)]
#[error("{panic}")]
pub struct PanicError {
    /// The recovered panic.
    pub panic: Panic,
}

/// The fallback [`ErrorGenerator`] for callers that do not need a
/// context-carrying error type.
///
/// The resulting error message is the panic message, a newline, and the stack
/// lines joined by newlines. The newline is written even when the stack is
/// empty.
///
/// ```
/// use errorcontext::{Panic, default_error_generator};
///
/// let err = default_error_generator(Panic {
///     message: "panic: something bad happened".to_string(),
///     stack: vec!["line1".to_string(), "line2".to_string()],
/// });
/// assert_eq!(err.to_string(), "panic: something bad happened\nline1\nline2");
/// ```
pub fn default_error_generator(panic: Panic) -> BoxError {
    Box::new(PanicError { panic })
}
