#![deny(
    missing_docs,
    unsafe_code,
    rustdoc::invalid_rust_codeblocks,
    rustdoc::broken_intra_doc_links,
    missing_copy_implementations,
    unused_doc_comments
)]
// Make docs.rs generate better docs
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Typed error context and panic recovery for Rust.
//!
//! ## Overview
//!
//! This crate lets you enrich an error with structured diagnostic data at the
//! point where it is created or re-wrapped, recover all of that data later by
//! walking the error's source chain, and convert panics into ordinary error
//! values without losing their stack trace.
//!
//! It is built from three cooperating pieces:
//!
//! - [`BaseError<T>`] wraps a cause and carries a context payload of any type
//!   `T`. Its message is the cause's message, and [`Error::source`] returns
//!   the cause, so wrapping is invisible to code that does not ask for the
//!   context.
//! - [`collect`] walks a source chain and returns every error of a given
//!   type, outermost first. Applied to `BaseError<T>` it yields the context
//!   attached at every wrap layer.
//! - [`Recoverer<E>`] runs an operation and turns a panic into an `E` through
//!   a pluggable [`ErrorGenerator`], including the formatted panic value and
//!   the captured call stack.
//!
//! [`Error::source`]: std::error::Error::source
//!
//! ## Quick Example
//!
//! ```
//! use errorcontext::{BaseError, collect_from};
//!
//! type Tags = Vec<&'static str>;
//!
//! fn read_config() -> Result<String, BaseError<Tags>> {
//!     std::fs::read_to_string("/definitely/not/here.toml")
//!         .map_err(|err| BaseError::new(err, vec!["stage=read"]))
//! }
//!
//! fn load() -> Result<String, BaseError<Tags>> {
//!     read_config().map_err(|err| BaseError::new(err, vec!["stage=load"]))
//! }
//!
//! let err = load().unwrap_err();
//! let tags: Vec<&str> = collect_from::<BaseError<Tags>>(&err)
//!     .into_iter()
//!     .flat_map(|e| e.context().iter().copied())
//!     .collect();
//! assert_eq!(tags, ["stage=load", "stage=read"]);
//! ```
//!
//! ## Panics
//!
//! ```
//! use errorcontext::{BoxError, Recoverer};
//!
//! let recoverer = Recoverer::<BoxError>::default();
//!
//! let ok: Result<u32, BoxError> = recoverer.wrap(|| Ok(7));
//! assert_eq!(ok.unwrap(), 7);
//!
//! let err = recoverer
//!     .wrap(|| -> Result<u32, BoxError> { panic!("boom") })
//!     .unwrap_err();
//! assert!(err.to_string().starts_with("panic: boom\n"));
//! ```
//!
//! ## Ecosystem
//!
//! The core is generic over the context type. Companion crates instantiate it
//! with concrete types:
//!
//! - **`errorcontext-tracing`** - an ordered key/value dictionary, emitted
//!   through `tracing` events, plus a layer that captures span fields.
//! - **`errorcontext-opentelemetry`** - OpenTelemetry attribute lists.
//!
//! Adapters store panic diagnostics under [`FIELD_NAME_PANIC_MESSAGE`] and
//! [`FIELD_NAME_PANIC_STACK_TRACE`] so that tooling can find them regardless
//! of the concrete context type.

mod base_error;
mod collect;
mod hook;
mod panic;
pub mod prelude;
mod recoverer;
mod stack;

pub use self::{
    base_error::{BaseError, BoxError},
    collect::{Chain, chain, collect, collect_from},
    panic::{
        ErrorGenerator, FIELD_NAME_PANIC_MESSAGE, FIELD_NAME_PANIC_STACK_TRACE, Panic, PanicError,
        ValueTransform, default_error_generator,
    },
    recoverer::{Recoverer, RecovererBuilder, RecovererError},
    stack::StackCapture,
};
