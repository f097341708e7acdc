use sprig_parser::{QuotedIdentifier, Span, format_source_excerpt};
use std::fmt;

/// The stage of evaluation that produced a diagnostic
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum DiagnosticKind {
    Parse,
    Semantic,
    Compile,
    Runtime,
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Parse => "parse error",
            Self::Semantic => "error",
            Self::Compile => "compile error",
            Self::Runtime => "runtime error",
        })
    }
}

/// The severity of a diagnostic
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[allow(missing_docs)]
pub enum Severity {
    Warning,
    Error,
}

/// Where a diagnostic's span points to
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DiagnosticOrigin {
    /// The input passed to evaluate, the span is relative to the input
    Input,
    /// A committed declaration, the span is relative to the declaration's source
    Declaration(QuotedIdentifier),
    /// The assembled compilation unit, the span is relative to the unit's source
    Unit,
}

/// A message produced while evaluating a snippet
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Diagnostic {
    /// The stage that produced the diagnostic
    pub kind: DiagnosticKind,
    /// The diagnostic's severity
    pub severity: Severity,
    /// The message
    pub message: String,
    /// The location the diagnostic refers to, if known
    pub span: Option<Span>,
    /// What the span is relative to
    pub origin: DiagnosticOrigin,
}

impl Diagnostic {
    /// Makes an error diagnostic without a location
    pub fn error(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity: Severity::Error,
            message: message.into(),
            span: None,
            origin: DiagnosticOrigin::Unit,
        }
    }

    /// Makes a warning diagnostic without a location
    pub fn warning(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            ..Self::error(kind, message)
        }
    }

    /// Sets the diagnostic's location
    #[must_use]
    pub fn with_span(self, span: Span, origin: DiagnosticOrigin) -> Self {
        Self {
            span: Some(span),
            origin,
            ..self
        }
    }

    /// Returns true if the diagnostic has error severity
    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    /// Renders the diagnostic, with a source excerpt if the span refers to the given input
    pub fn render(&self, input: &str) -> String {
        match (&self.span, &self.origin) {
            (Some(span), DiagnosticOrigin::Input) => {
                format!("{self}\n{}", format_source_excerpt(input, span, None))
            }
            (Some(span), DiagnosticOrigin::Declaration(name)) => format!(
                "{self}\n  in '{name}' at {}:{}",
                span.start.line + 1,
                span.start.column + 1
            ),
            _ => self.to_string(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.severity {
            Severity::Error => write!(f, "{}: {}", self.kind, self.message),
            Severity::Warning => write!(f, "warning: {}", self.message),
        }
    }
}
