#![deny(
    missing_docs,
    unsafe_code,
    rustdoc::invalid_rust_codeblocks,
    rustdoc::broken_intra_doc_links,
    missing_copy_implementations,
    unused_doc_comments
)]

//! OpenTelemetry attribute context for errorcontext errors.
//!
//! [`Error`] instantiates [`errorcontext::BaseError`] with a list of
//! OpenTelemetry [`KeyValue`] attributes. The attributes of every layer can
//! be collected with [`chain_context`] and recorded on the active span with
//! [`record_error`].
//!
//! ```
//! use errorcontext_opentelemetry::{Error, chain_context};
//! use opentelemetry::KeyValue;
//!
//! let err = Error::new("connection refused", [KeyValue::new("net.peer.port", 5432_i64)]);
//! let err = Error::new(err, [KeyValue::new("db.system", "postgresql")]);
//!
//! let err_ref: &(dyn std::error::Error + 'static) = &err;
//! let keys: Vec<String> = chain_context(Some(err_ref))
//!     .into_iter()
//!     .map(|attribute| attribute.key.as_str().to_string())
//!     .collect();
//! assert_eq!(keys, ["db.system", "net.peer.port"]);
//! ```

use std::{error::Error as StdError, fmt};

use errorcontext::{
    BaseError, BoxError, FIELD_NAME_PANIC_MESSAGE, FIELD_NAME_PANIC_STACK_TRACE, Panic, chain,
    collect,
};
use opentelemetry::{
    Array, KeyValue, StringValue, Value,
    trace::{Status, get_active_span},
};

/// An error carrying OpenTelemetry attributes.
#[derive(Debug)]
pub struct Error(BaseError<Vec<KeyValue>>);

impl Error {
    /// Wraps `cause` with the given attributes.
    pub fn new<E>(cause: E, attributes: impl IntoIterator<Item = KeyValue>) -> Self
    where
        E: Into<BoxError>,
    {
        Self(BaseError::new(cause, attributes.into_iter().collect()))
    }

    /// The attributes attached at this layer.
    pub fn context(&self) -> &[KeyValue] {
        self.0.context()
    }

    /// Appends attributes to this layer.
    pub fn add_attributes(&mut self, attributes: impl IntoIterator<Item = KeyValue>) {
        self.0.context_mut().extend(attributes);
    }

    /// Whether this error was produced from a recovered panic.
    pub fn is_panic(&self) -> bool {
        self.0.is_panic()
    }

    /// Consumes the error, returning the underlying wrapper.
    pub fn into_inner(self) -> BaseError<Vec<KeyValue>> {
        self.0
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

/// Returns the outermost [`Error`] in the chain of `err`.
pub fn as_error<'a>(err: Option<&'a (dyn StdError + 'static)>) -> Option<&'a Error> {
    chain(err).find_map(|e| e.downcast_ref::<Error>())
}

/// Returns the attributes of the outermost [`Error`] in the chain of `err`,
/// or an empty list.
pub fn as_context(err: Option<&(dyn StdError + 'static)>) -> Vec<KeyValue> {
    as_error(err)
        .map(|e| e.context().to_vec())
        .unwrap_or_default()
}

/// Returns the attributes of every [`Error`] in the chain of `err`,
/// outermost layer first.
pub fn chain_context(err: Option<&(dyn StdError + 'static)>) -> Vec<KeyValue> {
    collect::<Error>(err)
        .into_iter()
        .flat_map(|e| e.context().iter().cloned())
        .collect()
}

/// Error generator for [`errorcontext::Recoverer`].
///
/// The result is marked as a panic and carries a string attribute with the
/// panic message and a string array attribute with the stack lines.
pub fn from_panic(panic: Panic) -> Error {
    let Panic { message, stack } = panic;
    let stack = stack.into_iter().map(StringValue::from).collect();
    let attributes = vec![
        KeyValue::new(FIELD_NAME_PANIC_MESSAGE, message.clone()),
        KeyValue::new(
            FIELD_NAME_PANIC_STACK_TRACE,
            Value::Array(Array::String(stack)),
        ),
    ];
    Error(BaseError::new(message, attributes).mark_as_panic())
}

/// Records `err` on the active span.
///
/// Adds the chain attributes, an exception event and an error status. Does
/// nothing when no span is active.
pub fn record_error(err: &(dyn StdError + 'static)) {
    get_active_span(|span| {
        span.set_attributes(chain_context(Some(err)));
        span.record_error(err);
        span.set_status(Status::error(err.to_string()));
    });
}
