//! # Sprig
//!
//! Pulls together the session engine and the reference runtime for the Sprig REPL.
//!
//! Snippets are evaluated one at a time with the [Sprig] struct, with each successful snippet
//! extending the session's state.
//!
//! ## Example
//!
//! ```
//! use sprig::prelude::*;
//!
//! let mut sprig = Sprig::default();
//! sprig.evaluate("int x = 20;").unwrap();
//! let result = sprig.evaluate("x * 2 + 2").unwrap();
//! assert_eq!(result.value.as_deref(), Some("42"));
//! ```

#![warn(missing_docs)]

mod error;
mod sprig;
pub mod prelude;

pub use sprig_parser as parser;
pub use sprig_runtime as runtime;
pub use sprig_shell as shell;

pub use crate::{
    error::{Error, Result},
    sprig::{Sprig, SprigSession, SprigSettings},
};
