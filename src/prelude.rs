//! Commonly used items for convenient importing.
//!
//! ```rust
//! use errorcontext::prelude::*;
//!
//! let recoverer = Recoverer::<BoxError>::default();
//! let err = recoverer
//!     .wrap(|| -> Result<(), BoxError> {
//!         Err(BaseError::new("io failure", vec!["retry=1"]).into())
//!     })
//!     .unwrap_err();
//! assert_eq!(collect_from::<BaseError<Vec<&str>>>(&*err).len(), 1);
//! ```

pub use crate::{BaseError, BoxError, Panic, Recoverer, collect, collect_from};
