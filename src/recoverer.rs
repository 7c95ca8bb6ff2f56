//! Converting panics into errors.
//!
//! A [`Recoverer`] runs an operation inside [`std::panic::catch_unwind`]. A
//! normal return, `Ok` or `Err`, is passed through untouched. A panic is
//! formatted into a [`Panic`] record and handed to the recoverer's
//! [`ErrorGenerator`], whose output becomes the returned error.
//!
//! Only panics raised on the calling thread, inside the wrapped operation, are
//! recovered. Work that is handed off to other threads has to be wrapped at
//! its own entry point, which is what [`Recoverer::wrap_fn`] is for:
//!
//! ```
//! use errorcontext::{BoxError, Recoverer};
//!
//! let recoverer = Recoverer::<BoxError>::default();
//! let handle = std::thread::spawn(recoverer.wrap_fn(|| -> Result<(), BoxError> {
//!     panic!("something bad happened");
//! }));
//!
//! let err = handle.join().expect("the panic was recovered").unwrap_err();
//! assert!(err.to_string().starts_with("panic: something bad happened"));
//! ```
//!
//! The formatting of the panic value follows a fallback chain: strings and
//! error payloads are printed directly, anything else goes through the
//! optional value transform, and payloads that remain opaque are printed as
//! `Box<dyn Any>`.
//!
//! # Panic hook
//!
//! The first call to [`Recoverer::wrap`] installs a process-wide panic hook
//! on top of the existing one. For panics raised inside `wrap` it records the
//! stack at the panic site, so [`Panic::stack`] starts at the frame that
//! panicked, and the previous hook is not run: recovered panics are not
//! printed to stderr. Every other panic still reaches the previous hook.

use core::{any::Any, fmt};
use std::{
    error::Error,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
};

use crate::{
    BoxError, StackCapture, hook,
    panic::{
        ErrorGenerator, FIELD_NAME_PANIC_MESSAGE, Panic, ValueTransform, default_error_generator,
    },
};

/// The rendering of a panic payload that is neither a string nor an error and
/// could not be transformed. Matches what the standard library panic hook
/// prints for such payloads.
const OPAQUE_PANIC_VALUE: &str = "Box<dyn Any>";

/// Errors raised while configuring a [`Recoverer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum RecovererError {
    /// [`RecovererBuilder::build`] was called without an error generator.
    #[error("error generator function is not set")]
    GeneratorNotSet,
}

/// Catches panics and converts them into errors of type `E`.
///
/// A recoverer holds no mutable state. Cloning is cheap and a single instance
/// can be shared between threads.
///
/// # Examples
///
/// ```
/// use errorcontext::{BaseError, FIELD_NAME_PANIC_MESSAGE, Recoverer};
///
/// type Fields = Vec<(&'static str, String)>;
///
/// let recoverer = Recoverer::new(|panic: errorcontext::Panic| {
///     let fields = vec![(FIELD_NAME_PANIC_MESSAGE, panic.message.clone())];
///     BaseError::<Fields>::new(panic.message, fields).mark_as_panic()
/// });
///
/// let err = recoverer
///     .wrap(|| -> Result<(), BaseError<Fields>> { panic!("boom") })
///     .unwrap_err();
/// assert!(err.is_panic());
/// assert_eq!(err.to_string(), "panic: boom");
/// ```
pub struct Recoverer<E> {
    generator: ErrorGenerator<E>,
    value_transform: Option<ValueTransform>,
    skipped_stack_lines: usize,
    stack_capture: StackCapture,
}

impl<E> Recoverer<E> {
    /// Creates a recoverer that uses `generator` to build its errors.
    ///
    /// The stack capture settings come from the environment, see
    /// [`StackCapture::new_from_env`].
    pub fn new<F>(generator: F) -> Self
    where
        F: Fn(Panic) -> E + Send + Sync + 'static,
    {
        Self {
            generator: Arc::new(generator),
            value_transform: None,
            skipped_stack_lines: 0,
            stack_capture: StackCapture::new_from_env(),
        }
    }

    /// Starts building a recoverer with optional settings.
    pub fn builder() -> RecovererBuilder<E> {
        RecovererBuilder::new()
    }

    /// Number of leading stack lines dropped from every [`Panic::stack`].
    pub fn skipped_stack_lines(&self) -> usize {
        self.skipped_stack_lines
    }

    /// The stack capture settings.
    pub fn stack_capture(&self) -> &StackCapture {
        &self.stack_capture
    }

    /// Runs `f`, converting a panic into an error.
    ///
    /// If `f` returns, its result is returned unchanged, including an `Err`.
    /// If `f` panics, the generator's error is returned, converted into `R`.
    /// The stack in the [`Panic`] is the one at the panic site.
    pub fn wrap<T, R, F>(&self, f: F) -> Result<T, R>
    where
        F: FnOnce() -> Result<T, R>,
        R: From<E>,
    {
        let scope = hook::enter(self.stack_capture);
        let result = panic::catch_unwind(AssertUnwindSafe(f));
        let captured = hook::take_captured();
        drop(scope);

        match result {
            Ok(result) => result,
            Err(payload) => {
                let stack = captured.unwrap_or_else(|| self.stack_capture.capture());
                Err(R::from(self.recover(&*payload, stack)))
            }
        }
    }

    /// Returns a closure that behaves exactly like [`Recoverer::wrap`] on `f`.
    ///
    /// The closure owns a clone of the recoverer, so it is `Send + 'static`
    /// whenever `f` is and can be handed to a thread or a worker pool.
    pub fn wrap_fn<T, R, F>(&self, f: F) -> impl FnOnce() -> Result<T, R> + use<E, T, R, F>
    where
        F: FnOnce() -> Result<T, R>,
        R: From<E>,
    {
        let recoverer = self.clone();
        move || recoverer.wrap(f)
    }

    /// Formats a panic payload and captures the current call stack.
    ///
    /// This is how [`Recoverer::wrap`] formats payloads; it is public so that
    /// payloads obtained elsewhere (for example from
    /// [`JoinHandle::join`](std::thread::JoinHandle::join)) can be converted
    /// the same way. The stack is the one of the caller, not of the original
    /// panic site.
    ///
    /// Payloads of type `&'static str`, `String`,
    /// `Box<dyn Error + Send + Sync>` and `Box<dyn Error + Send>` are printed
    /// directly. A concrete error type passed to
    /// [`panic_any`](std::panic::panic_any) without boxing it as a trait
    /// object cannot be recognized and goes through the value transform like
    /// any other value.
    ///
    /// ```
    /// use errorcontext::{BoxError, Recoverer};
    ///
    /// let recoverer = Recoverer::<BoxError>::default();
    /// let panic = recoverer.format(&"something bad happened");
    /// assert_eq!(panic.message, "panic: something bad happened");
    /// assert!(!panic.stack.is_empty());
    /// ```
    pub fn format(&self, value: &(dyn Any + Send)) -> Panic {
        self.format_with_stack(value, self.stack_capture.capture())
    }

    fn format_with_stack(&self, value: &(dyn Any + Send), mut stack: Vec<String>) -> Panic {
        let message = match panic_value_text(value) {
            Some(text) => format!("{FIELD_NAME_PANIC_MESSAGE}: {text}"),
            None => self.format_opaque(value),
        };

        let skipped = self.skipped_stack_lines.min(stack.len());
        stack.drain(..skipped);

        Panic { message, stack }
    }

    fn format_opaque(&self, value: &(dyn Any + Send)) -> String {
        let Some(transform) = &self.value_transform else {
            return format!("{FIELD_NAME_PANIC_MESSAGE}: {OPAQUE_PANIC_VALUE}");
        };

        let transformed = panic::catch_unwind(AssertUnwindSafe(|| transform(value)))
            .unwrap_or_else(|_| Err("value transform panicked".into()));
        match transformed {
            Ok(formatted) if !formatted.is_empty() => {
                format!("{FIELD_NAME_PANIC_MESSAGE}: {formatted}")
            }
            Ok(_) => format!("{FIELD_NAME_PANIC_MESSAGE}: {OPAQUE_PANIC_VALUE}"),
            Err(err) => {
                tracing::trace!(target: "errorcontext", error = %err, "panic value transform failed");
                format!(
                    "{FIELD_NAME_PANIC_MESSAGE}: {OPAQUE_PANIC_VALUE}\nfailed to transform: {err}"
                )
            }
        }
    }

    fn recover(&self, value: &(dyn Any + Send), stack: Vec<String>) -> E {
        let panic = self.format_with_stack(value, stack);
        tracing::debug!(
            target: "errorcontext",
            panic = %panic.message,
            frames = panic.stack.len(),
            "recovered panic"
        );
        (self.generator)(panic)
    }
}

fn panic_value_text(value: &(dyn Any + Send)) -> Option<String> {
    if let Some(s) = value.downcast_ref::<&'static str>() {
        Some((*s).to_string())
    } else if let Some(s) = value.downcast_ref::<String>() {
        Some(s.clone())
    } else if let Some(err) = value.downcast_ref::<Box<dyn Error + Send + Sync>>() {
        Some(err.to_string())
    } else {
        value
            .downcast_ref::<Box<dyn Error + Send>>()
            .map(|err| err.to_string())
    }
}

impl Default for Recoverer<BoxError> {
    fn default() -> Self {
        Self::new(default_error_generator)
    }
}

impl<E> Clone for Recoverer<E> {
    fn clone(&self) -> Self {
        Self {
            generator: Arc::clone(&self.generator),
            value_transform: self.value_transform.clone(),
            skipped_stack_lines: self.skipped_stack_lines,
            stack_capture: self.stack_capture,
        }
    }
}

impl<E> fmt::Debug for Recoverer<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Recoverer")
            .field("has_value_transform", &self.value_transform.is_some())
            .field("skipped_stack_lines", &self.skipped_stack_lines)
            .field("stack_capture", &self.stack_capture)
            .finish_non_exhaustive()
    }
}

/// Builder for a [`Recoverer`].
///
/// The error generator is required; [`RecovererBuilder::build`] fails with
/// [`RecovererError::GeneratorNotSet`] without one.
///
/// ```
/// use errorcontext::{BoxError, Recoverer, RecovererError};
///
/// let missing = Recoverer::<BoxError>::builder().skipped_stack_lines(2).build();
/// assert_eq!(missing.unwrap_err(), RecovererError::GeneratorNotSet);
///
/// let recoverer = Recoverer::builder()
///     .generator(errorcontext::default_error_generator)
///     .value_transform(|value| match value.downcast_ref::<u32>() {
///         Some(code) => Ok(format!("exit code {code}")),
///         None => Err("unsupported panic value".into()),
///     })
///     .build()
///     .expect("a generator is set");
///
/// let panic = recoverer.format(&7u32);
/// assert_eq!(panic.message, "panic: exit code 7");
/// ```
pub struct RecovererBuilder<E> {
    generator: Option<ErrorGenerator<E>>,
    value_transform: Option<ValueTransform>,
    skipped_stack_lines: usize,
    stack_capture: StackCapture,
}

impl<E> RecovererBuilder<E> {
    /// Creates a builder with no generator, no value transform, no skipped
    /// stack lines and environment-derived stack capture settings.
    pub fn new() -> Self {
        Self {
            generator: None,
            value_transform: None,
            skipped_stack_lines: 0,
            stack_capture: StackCapture::new_from_env(),
        }
    }

    /// Sets the function converting a [`Panic`] into an `E`.
    pub fn generator<F>(mut self, generator: F) -> Self
    where
        F: Fn(Panic) -> E + Send + Sync + 'static,
    {
        self.generator = Some(Arc::new(generator));
        self
    }

    /// Sets or clears an already shared generator.
    pub fn generator_opt(mut self, generator: Option<ErrorGenerator<E>>) -> Self {
        self.generator = generator;
        self
    }

    /// Sets the function rendering panic payloads that are neither strings nor
    /// errors.
    pub fn value_transform<F>(mut self, transform: F) -> Self
    where
        F: Fn(&(dyn Any + Send)) -> Result<String, BoxError> + Send + Sync + 'static,
    {
        self.value_transform = Some(Arc::new(transform));
        self
    }

    /// Sets the number of leading stack lines to drop, typically the frames of
    /// helpers that raise panics on behalf of their callers.
    pub fn skipped_stack_lines(mut self, count: usize) -> Self {
        self.skipped_stack_lines = count;
        self
    }

    /// Overrides the stack capture settings.
    pub fn stack_capture(mut self, stack_capture: StackCapture) -> Self {
        self.stack_capture = stack_capture;
        self
    }

    /// Builds the recoverer.
    ///
    /// # Errors
    ///
    /// Returns [`RecovererError::GeneratorNotSet`] if no generator was set.
    pub fn build(self) -> Result<Recoverer<E>, RecovererError> {
        let generator = self.generator.ok_or(RecovererError::GeneratorNotSet)?;
        Ok(Recoverer {
            generator,
            value_transform: self.value_transform,
            skipped_stack_lines: self.skipped_stack_lines,
            stack_capture: self.stack_capture,
        })
    }
}

impl<E> Default for RecovererBuilder<E> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::*;
    use crate::PanicError;

    fn recoverer() -> Recoverer<BoxError> {
        Recoverer::builder()
            .generator(default_error_generator)
            .stack_capture(StackCapture::DEFAULT)
            .build()
            .expect("generator is set")
    }

    static_assertions::assert_impl_all!(Recoverer<BoxError>: Send, Sync, Clone);
    static_assertions::assert_impl_all!(RecovererError: Send, Sync, Copy, Error);

    #[test]
    fn test_build_without_generator() {
        let result = Recoverer::<BoxError>::builder()
            .value_transform(|_| Ok(String::new()))
            .build();
        assert_eq!(result.unwrap_err(), RecovererError::GeneratorNotSet);

        let result = Recoverer::<BoxError>::builder().generator_opt(None).build();
        assert_eq!(
            result.unwrap_err().to_string(),
            "error generator function is not set"
        );
    }

    #[test]
    fn test_format_strings_and_errors() {
        let r = recoverer();
        assert_eq!(r.format(&"boom").message, "panic: boom");
        assert_eq!(r.format(&String::from("boom")).message, "panic: boom");

        let err: Box<dyn Error + Send + Sync> = Box::new(io::Error::other("disk full"));
        assert_eq!(r.format(&err).message, "panic: disk full");

        let err: Box<dyn Error + Send> = Box::new(io::Error::other("disk full"));
        assert_eq!(r.format(&err).message, "panic: disk full");
    }

    #[test]
    fn test_format_without_transform() {
        let panic = recoverer().format(&vec!["test1", "test2"]);
        assert_eq!(panic.message, "panic: Box<dyn Any>");
        assert!(!panic.stack.is_empty());
    }

    #[test]
    fn test_format_with_transform() {
        let r = Recoverer::builder()
            .generator(default_error_generator)
            .value_transform(|value| match value.downcast_ref::<Vec<&'static str>>() {
                Some(items) => Ok(format!("formatted: [{}]", items.join(" "))),
                None => Ok(String::new()),
            })
            .build()
            .expect("generator is set");

        let panic = r.format(&vec!["test1", "test2"]);
        assert_eq!(panic.message, "panic: formatted: [test1 test2]");
        assert!(!panic.stack.is_empty());

        // An empty rendering falls back to the default one.
        assert_eq!(r.format(&42u8).message, "panic: Box<dyn Any>");

        // Strings never reach the transform.
        assert_eq!(r.format(&"boom").message, "panic: boom");
    }

    #[test]
    fn test_format_with_failing_transform() {
        let r = Recoverer::builder()
            .generator(default_error_generator)
            .value_transform(|_| Err("formatter failed".into()))
            .build()
            .expect("generator is set");

        let panic = r.format(&vec!["test1", "test2"]);
        assert_eq!(
            panic.message,
            "panic: Box<dyn Any>\nfailed to transform: formatter failed"
        );
    }

    #[test]
    fn test_format_with_panicking_transform() {
        let r = Recoverer::builder()
            .generator(default_error_generator)
            .value_transform(|_| panic!("transform is broken"))
            .build()
            .expect("generator is set");

        let panic = r.format(&1u64);
        assert_eq!(
            panic.message,
            "panic: Box<dyn Any>\nfailed to transform: value transform panicked"
        );
    }

    #[test]
    fn test_format_unboxed_error_is_opaque() {
        let panic = recoverer().format(&io::Error::other("disk full"));
        assert_eq!(panic.message, "panic: Box<dyn Any>");
    }

    #[inline(never)]
    fn fail_at_depth(depth: u32) -> Result<(), BoxError> {
        if depth == 0 {
            panic!("nested failure");
        }
        fail_at_depth(depth - 1)
    }

    #[test]
    fn test_wrap_stack_starts_at_panic_site() {
        let err = recoverer().wrap(|| fail_at_depth(3)).unwrap_err();
        let panic = &err
            .downcast_ref::<PanicError>()
            .expect("default generator produces a PanicError")
            .panic;

        assert!(
            panic.stack[0].contains("fail_at_depth"),
            "{}",
            panic.stack.join("\n")
        );
        let helper_frames = panic
            .stack
            .iter()
            .filter(|line| line.contains("fail_at_depth"))
            .count();
        assert_eq!(helper_frames, 4, "{}", panic.stack.join("\n"));
        assert!(
            panic
                .stack
                .iter()
                .any(|line| line.contains("test_wrap_stack_starts_at_panic_site")),
            "{}",
            panic.stack.join("\n")
        );
    }

    #[test]
    fn test_nested_wrap_recovers_inner_panic_site() {
        let r = recoverer();
        let outer: Result<Result<(), BoxError>, BoxError> =
            r.wrap(|| Ok(r.wrap(|| fail_at_depth(0))));

        let inner = outer.expect("outer operation returned").unwrap_err();
        let panic = &inner
            .downcast_ref::<PanicError>()
            .expect("default generator produces a PanicError")
            .panic;
        assert!(panic.stack[0].contains("fail_at_depth"), "{}", panic.stack.join("\n"));
    }

    #[test]
    fn test_skipped_stack_lines() {
        let payload = "boom";
        let panics: Vec<Panic> = [0, 2]
            .into_iter()
            .map(|skipped| {
                Recoverer::builder()
                    .generator(default_error_generator)
                    .stack_capture(StackCapture::DEFAULT)
                    .skipped_stack_lines(skipped)
                    .build()
                    .expect("generator is set")
            })
            .map(|r| r.format(&payload))
            .collect();

        let (full, trimmed) = (&panics[0], &panics[1]);
        assert!(full.stack.len() > 2, "{}", full.stack.join("\n"));
        assert_eq!(trimmed.stack.len(), full.stack.len() - 2);
        assert_eq!(trimmed.stack[..], full.stack[2..]);
    }

    #[test]
    fn test_skipping_more_lines_than_captured() {
        let r = Recoverer::builder()
            .generator(default_error_generator)
            .skipped_stack_lines(usize::MAX)
            .build()
            .expect("generator is set");
        let panic = r.format(&"boom");
        assert!(panic.stack.is_empty());
        assert_eq!(panic.message, "panic: boom");
    }

    #[test]
    fn test_debug_output() {
        let debug = format!("{:?}", recoverer());
        assert!(debug.starts_with("Recoverer {"), "{debug}");
        assert!(debug.contains("skipped_stack_lines: 0"), "{debug}");
    }
}
