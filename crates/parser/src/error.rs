use sprig_lexer::Span;
use std::fmt::Write;
use thiserror::Error;

/// An error that represents a problem with the Parser's internal logic, rather than a user error
#[derive(Error, Clone, Debug)]
#[allow(missing_docs)]
pub enum InternalError {
    #[error("failed to parse ID")]
    IdParseFailure,
    #[error("failed to parse number")]
    NumberParseFailure,
}

/// A syntax error encountered by the [Parser](crate::Parser)
#[derive(Error, Clone, Debug)]
#[allow(missing_docs)]
pub enum SyntaxError {
    #[error("expected '=' in assignment")]
    ExpectedAssignment,
    #[error("expected '{{' to start a block")]
    ExpectedBlockStart,
    #[error("expected '}}' at the end of the block")]
    ExpectedBlockEnd,
    #[error("expected end of arguments ')'")]
    ExpectedArgsEnd,
    #[error("expected closing parenthesis ')'")]
    ExpectedCloseParen,
    #[error("expected expression")]
    ExpectedExpression,
    #[error("expected function name")]
    ExpectedFunctionName,
    #[error("expected '(' after the function name")]
    ExpectedFunctionArgsStart,
    #[error("expected ID")]
    ExpectedId,
    #[error("expected ID after 'as'")]
    ExpectedIdAfterAs,
    #[error("expected ID after ':'")]
    ExpectedIdAfterPrefix,
    #[error("expected 'in' keyword in foreach loop")]
    ExpectedForeachInKeyword,
    #[error("expected index end ']'")]
    ExpectedIndexEnd,
    #[error("expected List end ']'")]
    ExpectedListEnd,
    #[error("expected a module name after '/'")]
    ExpectedModuleName,
    #[error("expected '/' after the organization name")]
    ExpectedModuleSeparator,
    #[error("expected a parameter name")]
    ExpectedParameterName,
    #[error("expected ';'")]
    ExpectedSemicolon,
    #[error("expected a type")]
    ExpectedType,
    #[error("expected a variable name")]
    ExpectedVariableName,
    #[error("imports are only allowed at the top level")]
    ImportNotAtTopLevel,
    #[error("integer literal out of range")]
    IntegerOutOfRange,
    #[error("only variables and indexed variables can be assigned to")]
    InvalidAssignmentTarget,
    #[error("the maximum nesting depth of {max} was exceeded", max = crate::parser::MAX_NESTING_DEPTH)]
    NestingTooDeep,
    #[error("type and function definitions are only allowed at the top level")]
    DefinitionNotAtTopLevel,
    #[error("unexpected character in numeric escape code")]
    UnexpectedCharInNumericEscapeCode,
    #[error("unexpected escape pattern in string")]
    UnexpectedEscapeInString,
    #[error("unexpected token")]
    UnexpectedToken,
    #[error("unicode value out of range, the maximum is \\u{{10ffff}}")]
    UnicodeEscapeCodeOutOfRange,
    #[error("unterminated numeric escape code")]
    UnterminatedNumericEscapeCode,
    #[error("unterminated string")]
    UnterminatedString,
}

/// See [`Error`]
#[derive(Error, Clone, Debug)]
#[allow(missing_docs)]
pub enum ErrorKind {
    #[error(transparent)]
    InternalError(#[from] InternalError),
    #[error(transparent)]
    SyntaxError(#[from] SyntaxError),
}

/// An error that can be produced by the [Parser](crate::Parser)
#[derive(Error, Clone, Debug)]
#[error("{error}")]
pub struct Error {
    /// The error itself
    pub error: ErrorKind,
    /// The span in the source string where the error occurred
    pub span: Span,
    /// True when the error was caused by the input ending early
    pub incomplete_input: bool,
}

impl Error {
    /// Initializes a parser error with the specific error type and its associated span
    pub fn new(error: ErrorKind, span: Span) -> Self {
        Self {
            error,
            span,
            incomplete_input: false,
        }
    }

    /// Returns true if the error was caused by the input ending before an item was complete
    ///
    /// Interactive input can use this to decide whether to ask for a continuation line,
    /// e.g. after an unclosed `{` or a trailing binary operator.
    pub fn is_incomplete_input(&self) -> bool {
        self.incomplete_input
    }
}

/// The result type used by the [Parser](crate::Parser)
pub type Result<T> = std::result::Result<T, Error>;

/// Renders the excerpt of the source corresponding to the given span
pub fn format_source_excerpt(source: &str, span: &Span, source_path: Option<&str>) -> String {
    let Span { start, end } = span;
    let end_line = end.line.max(start.line);

    let excerpt_lines = source
        .lines()
        .skip(start.line as usize)
        .take((end_line - start.line + 1) as usize)
        .collect::<Vec<_>>();

    let line_numbers = (start.line..=end_line)
        .map(|n| (n + 1).to_string())
        .collect::<Vec<_>>();

    let number_width = line_numbers.last().map_or(1, |n| n.len());
    let padding = " ".repeat(number_width + 2);

    let mut excerpt = String::new();
    if start.line == end_line {
        let line = excerpt_lines.first().copied().unwrap_or_default();
        writeln!(excerpt, " {:>number_width$} | {line}", start.line + 1).ok();
        write!(
            excerpt,
            "{padding}|{}{}",
            " ".repeat(start.column as usize + 1),
            "^".repeat(end.column.saturating_sub(start.column).max(1) as usize)
        )
        .ok();
    } else {
        for (excerpt_line, line_number) in excerpt_lines.iter().zip(line_numbers.iter()) {
            writeln!(excerpt, " {line_number:>number_width$} | {excerpt_line}").ok();
        }
    }

    let position_info = match source_path {
        Some(path) => format!("{path} - {}:{}", start.line + 1, start.column + 1),
        None => format!("{}:{}", start.line + 1, start.column + 1),
    };

    format!("{position_info}\n{padding}|\n{excerpt}")
}
