use crate::SessionState;
use sprig_parser::QuotedIdentifier;
use thiserror::Error;

/// An invariant violation inside the session
///
/// Internal errors can't be recovered from, the session is poisoned until it's reset.
#[derive(Error, Clone, Debug, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum InternalError {
    #[error("the import registry's prefix/module bindings are no longer a bijection")]
    BrokenImportBijection,
    #[error("the declaration '{0}' was committed but can't be found")]
    MissingCommittedDeclaration(QuotedIdentifier),
    #[error("invalid session state transition from {from:?} to {to:?}")]
    InvalidTransition {
        from: SessionState,
        to: SessionState,
    },
}

/// The errors that can be returned by a [Session](crate::Session)
///
/// Problems with the evaluated input are reported as diagnostics, not as errors.
#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum Error {
    /// An internal error occurred, the session has been poisoned
    #[error("internal error: {0}")]
    Internal(#[from] InternalError),
    /// A previous evaluation didn't run to completion
    #[error("the session was left in the {0:?} state by an incomplete evaluation")]
    Busy(SessionState),
    /// The session has been poisoned and needs to be reset
    #[error("the session is unusable after an internal error, reset it to continue")]
    Poisoned,
}

/// The result type used by the session
pub type Result<T> = std::result::Result<T, Error>;
