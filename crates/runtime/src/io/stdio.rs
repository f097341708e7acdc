use super::{SprigWrite, map_io_err};
use crate::Result;
use std::io::{self, Write};

/// The process's stdout, used by default for program output
#[derive(Default)]
pub struct DefaultStdout;

/// The process's stderr
#[derive(Default)]
pub struct DefaultStderr;

impl SprigWrite for DefaultStdout {
    fn write(&self, bytes: &[u8]) -> Result<()> {
        io::stdout().write_all(bytes).map_err(map_io_err)
    }

    fn write_line(&self, text: &str) -> Result<()> {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        handle.write_all(text.as_bytes()).map_err(map_io_err)?;
        handle.write_all(b"\n").map_err(map_io_err)
    }

    fn flush(&self) -> Result<()> {
        io::stdout().flush().map_err(map_io_err)
    }
}

impl SprigWrite for DefaultStderr {
    fn write(&self, bytes: &[u8]) -> Result<()> {
        io::stderr().write_all(bytes).map_err(map_io_err)
    }

    fn write_line(&self, text: &str) -> Result<()> {
        let stderr = io::stderr();
        let mut handle = stderr.lock();
        handle.write_all(text.as_bytes()).map_err(map_io_err)?;
        handle.write_all(b"\n").map_err(map_io_err)
    }

    fn flush(&self) -> Result<()> {
        io::stderr().flush().map_err(map_io_err)
    }
}
