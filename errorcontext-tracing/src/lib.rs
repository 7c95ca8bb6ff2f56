#![deny(
    missing_docs,
    unsafe_code,
    rustdoc::invalid_rust_codeblocks,
    rustdoc::broken_intra_doc_links,
    missing_copy_implementations,
    unused_doc_comments
)]

//! Key/value error context for the `tracing` ecosystem.
//!
//! This crate instantiates [`errorcontext::BaseError`] with an ordered
//! key/value dictionary ([`Fields`]) and emits the collected context through
//! `tracing` events.
//!
//! # How It Works
//!
//! Wrap errors with [`Error::new`] wherever you have something worth
//! recording. When the error is finally handled, [`chain_context`] returns
//! the fields of every layer, outermost first, and [`log_error`] emits them
//! as a single `tracing` event.
//!
//! Optionally add [`ErrorContextLayer`] to your subscriber so that
//! [`Error::with_span_fields`] can copy the fields of the active spans onto
//! the error.
//!
//! # Quick Start
//!
//! ```
//! use errorcontext_tracing::{Error, Fields, chain_context};
//!
//! fn open(path: &str) -> Result<(), Error> {
//!     Err(Error::new(
//!         std::io::Error::other("permission denied"),
//!         Fields::new().with("path", path.to_string()),
//!     ))
//! }
//!
//! fn start() -> Result<(), Error> {
//!     open("/etc/app.toml").map_err(|err| Error::new(err, Fields::new().with("stage", "init")))
//! }
//!
//! let err = start().unwrap_err();
//! assert_eq!(err.to_string(), "permission denied");
//!
//! let err_ref: &(dyn std::error::Error + 'static) = &err;
//! let rendered: Vec<String> = chain_context(Some(err_ref))
//!     .iter()
//!     .map(|pair| pair.fields.to_string())
//!     .collect();
//! assert_eq!(
//!     rendered,
//!     [
//!         "stage=init error=permission denied",
//!         "path=/etc/app.toml error=permission denied",
//!     ]
//! );
//! ```
//!
//! ## Panics
//!
//! [`from_panic`] is an error generator for [`errorcontext::Recoverer`]:
//!
//! ```
//! use errorcontext::Recoverer;
//! use errorcontext_tracing::{Error, from_panic};
//!
//! let recoverer = Recoverer::new(from_panic);
//! let err = recoverer
//!     .wrap(|| -> Result<(), Error> { panic!("boom") })
//!     .unwrap_err();
//! assert!(err.is_panic());
//! assert_eq!(err.to_string(), "panic: boom");
//! ```

use std::{borrow::Cow, error::Error as StdError, fmt};

use errorcontext::{
    BaseError, BoxError, FIELD_NAME_PANIC_MESSAGE, FIELD_NAME_PANIC_STACK_TRACE, Panic, chain,
    collect,
};

mod fields;
mod layer;

pub use self::{
    fields::{FieldValue, Fields},
    layer::{ErrorContextLayer, current_span_fields},
};

/// Field under which [`Error::new`] records the cause's message.
pub const FIELD_NAME_ERROR: &str = "error";

/// An error carrying a [`Fields`] dictionary.
///
/// The message and source are those of the wrapped cause.
#[derive(Debug)]
pub struct Error(BaseError<Fields>);

impl Error {
    /// Wraps `cause`, recording its message under [`FIELD_NAME_ERROR`] next
    /// to the given fields.
    pub fn new<E>(cause: E, mut fields: Fields) -> Self
    where
        E: Into<BoxError>,
    {
        let cause = cause.into();
        fields.insert(FIELD_NAME_ERROR, cause.to_string());
        Self(BaseError::new(cause, fields))
    }

    /// The fields attached at this layer.
    pub fn context(&self) -> &Fields {
        self.0.context()
    }

    /// Merges more fields into this layer, overriding existing keys.
    pub fn add_context_fields<K, V>(&mut self, fields: impl IntoIterator<Item = (K, V)>)
    where
        K: Into<Cow<'static, str>>,
        V: Into<FieldValue>,
    {
        self.0.context_mut().extend(fields);
    }

    /// Adds a single field.
    #[must_use]
    pub fn with_field(
        mut self,
        key: impl Into<Cow<'static, str>>,
        value: impl Into<FieldValue>,
    ) -> Self {
        self.0.context_mut().insert(key, value);
        self
    }

    /// Copies the fields of the current span scope onto this layer.
    ///
    /// Fields already present on the error are kept. Requires
    /// [`ErrorContextLayer`] in the subscriber.
    #[must_use]
    pub fn with_span_fields(mut self) -> Self {
        let context = self.0.context_mut();
        for (key, value) in current_span_fields() {
            if context.get(&key).is_none() {
                context.insert(key, value);
            }
        }
        self
    }

    /// Whether this error was produced from a recovered panic.
    pub fn is_panic(&self) -> bool {
        self.0.is_panic()
    }

    /// The underlying wrapper.
    pub fn inner(&self) -> &BaseError<Fields> {
        &self.0
    }

    /// Consumes the error, returning the underlying wrapper.
    pub fn into_inner(self) -> BaseError<Fields> {
        self.0
    }
}

impl From<BaseError<Fields>> for Error {
    fn from(inner: BaseError<Fields>) -> Self {
        Self(inner)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.0.source()
    }
}

/// An [`Error`] in a chain paired with its fields.
#[derive(Copy, Clone, Debug)]
pub struct ErrorFields<'a> {
    /// The matching error.
    pub error: &'a Error,
    /// Its fields.
    pub fields: &'a Fields,
}

/// Returns the outermost [`Error`] in the chain of `err`.
pub fn as_error<'a>(err: Option<&'a (dyn StdError + 'static)>) -> Option<&'a Error> {
    chain(err).find_map(|e| e.downcast_ref::<Error>())
}

/// Returns the fields of the outermost [`Error`] in the chain of `err`.
pub fn as_context<'a>(err: Option<&'a (dyn StdError + 'static)>) -> Option<&'a Fields> {
    as_error(err).map(Error::context)
}

/// Returns every [`Error`] in the chain of `err` together with its fields,
/// outermost first.
pub fn chain_context<'a>(err: Option<&'a (dyn StdError + 'static)>) -> Vec<ErrorFields<'a>> {
    collect::<Error>(err)
        .into_iter()
        .map(|error| ErrorFields {
            error,
            fields: error.context(),
        })
        .collect()
}

/// Error generator for [`errorcontext::Recoverer`].
///
/// The result is marked as a panic and carries exactly two fields: the panic
/// message under [`FIELD_NAME_PANIC_MESSAGE`] and the stack lines under
/// [`FIELD_NAME_PANIC_STACK_TRACE`].
pub fn from_panic(panic: Panic) -> Error {
    let Panic { message, stack } = panic;
    let fields = Fields::new()
        .with(FIELD_NAME_PANIC_MESSAGE, message.clone())
        .with(FIELD_NAME_PANIC_STACK_TRACE, stack);
    Error(BaseError::new(message, fields).mark_as_panic())
}

/// Emits `err` as a `tracing` error event.
///
/// The event carries the error message, whether it came from a panic, and the
/// fields of every [`Error`] in the chain rendered as `key=value` pairs,
/// outermost first.
pub fn log_error(err: &(dyn StdError + 'static)) {
    let is_panic = as_error(Some(err)).is_some_and(Error::is_panic);
    let context = chain_context(Some(err))
        .iter()
        .map(|pair| pair.fields.to_string())
        .filter(|rendered| !rendered.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    tracing::error!(
        target: "errorcontext",
        error = %err,
        is_panic,
        context = %context,
        "operation failed"
    );
}
