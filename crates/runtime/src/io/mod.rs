mod stdio;

pub use self::stdio::{DefaultStderr, DefaultStdout};

use crate::{Error, Result};

/// A trait used for the output sinks of the Sprig runtime
///
/// Only `write` needs to be implemented, e.g. for capturing program output in tests.
pub trait SprigWrite {
    /// Writes bytes to the sink
    fn write(&self, bytes: &[u8]) -> Result<()>;

    /// Writes text to the sink, followed by a newline
    fn write_line(&self, text: &str) -> Result<()> {
        self.write(text.as_bytes())?;
        self.write(b"\n")
    }

    /// Flushes any buffered output
    fn flush(&self) -> Result<()> {
        Ok(())
    }
}

/// Converts an I/O error into a runtime error
pub fn map_io_err(e: std::io::Error) -> Error {
    e.to_string().into()
}
