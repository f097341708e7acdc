/// Represents a line/column position in a script
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Position {
    /// The position's line, counting from 0
    pub line: u32,
    /// The position's column, counting from 0
    pub column: u32,
}

/// A span is a range in the source code, represented by a start and end position
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Span {
    /// The span's start position
    pub start: Position,
    /// The span's end position
    pub end: Position,
}

impl Span {
    /// Returns a span that starts at `self` and ends at the end of `other`
    #[must_use]
    pub fn to(self, other: Span) -> Span {
        Span {
            start: self.start,
            end: other.end,
        }
    }

    /// Returns the span shifted down by the given number of lines
    ///
    /// Used when a snippet's source is embedded in a larger compilation unit, or vice versa.
    #[must_use]
    pub fn shifted(self, lines: i64) -> Span {
        let shift = |position: Position| Position {
            line: (position.line as i64 + lines).max(0) as u32,
            column: position.column,
        };

        Span {
            start: shift(self.start),
            end: shift(self.end),
        }
    }
}
