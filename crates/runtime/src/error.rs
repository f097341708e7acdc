use crate::Value;
use sprig_parser::{BinaryOp, QuotedIdentifier, Span};
use sprig_shell::{RuntimeFailure, RuntimeFailureKind};
use std::{error, fmt, time::Duration};
use thiserror::Error;

/// The different error types that can be produced by the Sprig runtime
#[derive(Error, Clone, Debug, PartialEq)]
#[allow(missing_docs)]
pub enum ErrorKind {
    #[error("{0}")]
    StringError(String),
    /// An error raised by `interop:panic`
    #[error("panic: {0}")]
    Panic(String),
    #[error("expected {expected}, but found '{found}'")]
    UnexpectedType { expected: String, found: String },
    #[error("unable to perform operation '{op}' with '{lhs}' and '{rhs}'")]
    InvalidBinaryOp {
        lhs: &'static str,
        rhs: &'static str,
        op: BinaryOp,
    },
    #[error("division by zero")]
    DivideByZero,
    #[error("integer overflow")]
    Overflow,
    #[error("index {index} is out of bounds for a list with {len} elements")]
    IndexOutOfBounds { index: i64, len: usize },
    #[error("undefined symbol '{0}'")]
    UndefinedSymbol(QuotedIdentifier),
    #[error("the call depth limit of {0} was exceeded")]
    CallDepthExceeded(usize),
    #[error("execution timed out after {0:?}")]
    Timeout(Duration),
    #[error("execution was interrupted")]
    Interrupted,
}

/// An error produced by the Sprig runtime
#[derive(Clone, Debug, PartialEq)]
pub struct Error {
    /// The error itself
    pub error: ErrorKind,
    /// The location in the program's source where the error occurred
    pub span: Option<Span>,
}

impl Error {
    /// Initializes an error with the given error type
    pub fn new(error: ErrorKind) -> Self {
        Self { error, span: None }
    }

    /// Sets the error's location, unless it already has one
    ///
    /// Errors are raised in the innermost expression first, so the most precise span wins.
    #[must_use]
    pub fn with_span(self, span: Span) -> Self {
        Self {
            span: self.span.or(Some(span)),
            ..self
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)
    }
}

impl error::Error for Error {}

impl From<String> for Error {
    fn from(error: String) -> Self {
        Self::new(ErrorKind::StringError(error))
    }
}

impl From<&str> for Error {
    fn from(error: &str) -> Self {
        Self::new(ErrorKind::StringError(error.into()))
    }
}

impl From<ErrorKind> for Error {
    fn from(error: ErrorKind) -> Self {
        Self::new(error)
    }
}

impl From<Error> for RuntimeFailure {
    fn from(error: Error) -> Self {
        let kind = match &error.error {
            ErrorKind::Timeout(_) => RuntimeFailureKind::Timeout,
            ErrorKind::Interrupted => RuntimeFailureKind::Interrupted,
            _ => RuntimeFailureKind::Error,
        };
        let failure = RuntimeFailure::with_kind(kind, error.to_string());
        match error.span {
            Some(span) => failure.with_span(span),
            None => failure,
        }
    }
}

/// The Result type used by the Sprig runtime
pub type Result<T> = std::result::Result<T, Error>;

/// Creates a [crate::Error] from a message (with format-like behaviour), wrapped in `Err`
#[macro_export]
macro_rules! runtime_error {
    ($error:literal) => {
        Err($crate::Error::from(format!($error)))
    };
    ($error:expr) => {
        Err($crate::Error::from($error))
    };
    ($error:literal, $($y:expr),+ $(,)?) => {
        Err($crate::Error::from(format!($error, $($y),+)))
    };
}

/// Creates an error that describes a type mismatch
pub fn unexpected_type<T>(expected: &str, unexpected: &Value) -> Result<T> {
    runtime_error!(ErrorKind::UnexpectedType {
        expected: expected.into(),
        found: unexpected.type_name().into(),
    })
}

/// Creates an error that describes unexpected arguments passed to a native function
pub fn unexpected_args<T>(expected: &str, args: &[Value]) -> Result<T> {
    let found = match args {
        [] => "no args".to_string(),
        [single] => single.type_name().to_string(),
        _ => {
            let types: Vec<_> = args.iter().map(Value::type_name).collect();
            format!("({})", types.join(", "))
        }
    };
    runtime_error!(ErrorKind::UnexpectedType {
        expected: format!("|{expected}|"),
        found,
    })
}
