use crate::{
    ClassifiedSnippet, DeclarationId, Diagnostic, DiagnosticOrigin, ImportRecord, ImportRegistry,
    Resolution, SnippetKind,
};
use sprig_parser::{Position, QuotedIdentifier, Span};
use std::{collections::BTreeSet, ops::Range};
use tracing::trace;

/// The name of the function that wraps statement and expression snippets
pub const ENTRY_POINT: &str = "__run";

/// Where a range of lines in a compilation unit came from
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SegmentOrigin {
    /// An import statement rendered by the registry
    Import,
    /// A committed declaration
    Declaration {
        /// The declaration's id
        id: DeclarationId,
        /// The declaration's name
        name: QuotedIdentifier,
    },
    /// The snippet being evaluated
    Snippet,
    /// Lines generated around the snippet to make it invocable
    Wrapper,
}

/// A range of lines in a compilation unit
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Segment {
    /// Where the lines came from
    pub origin: SegmentOrigin,
    /// The unit's lines that the segment covers, counting from 0
    pub lines: Range<u32>,
}

/// The source that's passed to the analyzer and the backend for a single snippet
#[derive(Clone, Debug)]
pub struct CompilationUnit {
    /// The unit's source text
    pub source: String,
    /// The unit's segments, in order
    pub segments: Vec<Segment>,
    /// The function to invoke after loading, if the snippet is executable
    pub entry_point: Option<QuotedIdentifier>,
    /// The names defined by the snippet itself
    ///
    /// Fresh names replace any earlier values that the executor has for them.
    pub fresh_names: BTreeSet<QuotedIdentifier>,
    /// The kind of the snippet that the unit was assembled for
    pub snippet_kind: SnippetKind,
    /// The import bindings emitted at the start of the unit
    pub imports: Vec<ImportRecord>,
    snippet_span: Span,
}

impl CompilationUnit {
    /// Returns the segment containing the given line of the unit
    pub fn segment_at(&self, line: u32) -> Option<&Segment> {
        self.segments
            .iter()
            .find(|segment| segment.lines.contains(&line))
    }

    /// The unit's lines that contain the snippet
    pub fn snippet_lines(&self) -> Option<Range<u32>> {
        self.segments
            .iter()
            .find(|segment| segment.origin == SegmentOrigin::Snippet)
            .map(|segment| segment.lines.clone())
    }

    /// Maps a span in the unit back to the source it came from
    ///
    /// Spans within the snippet map to the evaluated input, spans within a committed declaration
    /// map to the declaration's source, and spans within the generated wrapper map to the whole
    /// snippet.
    pub fn map_span(&self, span: Span) -> (Span, DiagnosticOrigin) {
        let Some(segment) = self.segment_at(span.start.line) else {
            return (span, DiagnosticOrigin::Unit);
        };

        match &segment.origin {
            SegmentOrigin::Snippet => {
                let start = self.snippet_span.start;
                let map = |position: Position| {
                    let line = position.line.saturating_sub(segment.lines.start);
                    Position {
                        line: line + start.line,
                        column: if line == 0 {
                            position.column + start.column
                        } else {
                            position.column
                        },
                    }
                };
                let end = if segment.lines.contains(&span.end.line) {
                    map(span.end)
                } else {
                    self.snippet_span.end
                };
                (
                    Span {
                        start: map(span.start),
                        end,
                    },
                    DiagnosticOrigin::Input,
                )
            }
            SegmentOrigin::Wrapper => (self.snippet_span, DiagnosticOrigin::Input),
            SegmentOrigin::Declaration { name, .. } => (
                span.shifted(-i64::from(segment.lines.start)),
                DiagnosticOrigin::Declaration(name.clone()),
            ),
            SegmentOrigin::Import => (span, DiagnosticOrigin::Unit),
        }
    }

    /// Remaps a diagnostic with a span in the unit
    ///
    /// Diagnostics that already refer to another origin are returned unchanged.
    pub fn locate(&self, diagnostic: Diagnostic) -> Diagnostic {
        match (diagnostic.span, &diagnostic.origin) {
            (Some(span), DiagnosticOrigin::Unit) => {
                let (span, origin) = self.map_span(span);
                diagnostic.with_span(span, origin)
            }
            _ => diagnostic,
        }
    }
}

/// Renders a snippet together with the state it depends on into a [CompilationUnit]
pub struct CompilationUnitAssembler;

impl CompilationUnitAssembler {
    /// Assembles the unit for a snippet
    ///
    /// The unit contains the import statements for the resolved prefixes ordered by prefix, then
    /// the sources of the resolved declarations in commit order, and then the snippet.
    /// Statements and expressions are wrapped in an entry point function, declarations and
    /// imports are emitted as they are.
    pub fn assemble(
        registry: &ImportRegistry,
        resolution: &Resolution,
        snippet: &ClassifiedSnippet,
    ) -> CompilationUnit {
        let mut builder = UnitBuilder::default();
        let snippet_import = snippet.import_record();

        let mut imports = Vec::with_capacity(resolution.import_prefixes.len());
        for prefix in &resolution.import_prefixes {
            let Some(record) = registry.record_for(prefix) else {
                continue;
            };
            // The snippet's own import rebinds the prefix or the module
            let shadowed = snippet_import.as_ref().is_some_and(|new_import| {
                new_import.prefix == record.prefix || new_import.module == record.module
            });
            if shadowed {
                trace!(%record, "import shadowed by snippet");
                continue;
            }
            builder.push(SegmentOrigin::Import, &record.to_string());
            imports.push(record);
        }

        for declaration in &resolution.declarations {
            builder.push(
                SegmentOrigin::Declaration {
                    id: declaration.id,
                    name: declaration.name.clone(),
                },
                &declaration.source,
            );
        }

        let entry_point = match snippet.kind {
            SnippetKind::Statement => {
                builder.push(SegmentOrigin::Wrapper, &format!("function {ENTRY_POINT}() {{"));
                builder.push(SegmentOrigin::Snippet, &snippet.terminated_source());
                builder.push(SegmentOrigin::Wrapper, "}");
                Some(QuotedIdentifier::new(ENTRY_POINT))
            }
            SnippetKind::Expression => {
                builder.push(
                    SegmentOrigin::Wrapper,
                    &format!("function {ENTRY_POINT}() returns any {{\nreturn ("),
                );
                builder.push(SegmentOrigin::Snippet, snippet.source());
                builder.push(SegmentOrigin::Wrapper, ");\n}");
                Some(QuotedIdentifier::new(ENTRY_POINT))
            }
            _ => {
                builder.push(SegmentOrigin::Snippet, &snippet.terminated_source());
                None
            }
        };

        trace!(
            lines = builder.line,
            imports = imports.len(),
            declarations = resolution.declarations.len(),
            "compilation unit assembled"
        );

        CompilationUnit {
            source: builder.source,
            segments: builder.segments,
            entry_point,
            fresh_names: snippet.defined_names.clone(),
            snippet_kind: snippet.kind,
            imports,
            snippet_span: snippet.span(),
        }
    }
}

#[derive(Default)]
struct UnitBuilder {
    source: String,
    segments: Vec<Segment>,
    line: u32,
}

impl UnitBuilder {
    fn push(&mut self, origin: SegmentOrigin, text: &str) {
        let line_count = text.lines().count().max(1) as u32;
        let lines = self.line..self.line + line_count;
        self.line = lines.end;

        self.source.push_str(text);
        self.source.push('\n');

        match self.segments.last_mut() {
            // Adjacent wrapper lines are merged
            Some(last) if last.origin == origin && origin == SegmentOrigin::Wrapper => {
                last.lines.end = lines.end;
            }
            _ => self.segments.push(Segment { origin, lines }),
        }
    }
}
