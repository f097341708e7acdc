use std::{io, path::PathBuf};
use thiserror::Error;

/// The different error types that can result from [Sprig](crate::Sprig) operations
///
/// Problems with evaluated input are reported as diagnostics in the evaluation's result, the
/// errors here are for failures that prevent evaluation from happening at all.
#[derive(Debug, Error)]
#[allow(missing_docs)]
pub enum Error {
    #[error(transparent)]
    Session(#[from] sprig_shell::Error),
    #[error("failed to read '{}': {source}", path.display())]
    ReadFailed { path: PathBuf, source: io::Error },
}

impl Error {
    /// Returns true if the session needs to be reset before it can be used again
    pub fn requires_reset(&self) -> bool {
        matches!(
            self,
            Self::Session(
                sprig_shell::Error::Poisoned
                    | sprig_shell::Error::Busy(_)
                    | sprig_shell::Error::Internal(_)
            )
        )
    }
}

/// The Result type returned by [Sprig](crate::Sprig) operations
pub type Result<T> = std::result::Result<T, Error>;
